//! Serde data structures for the Gatehouse startup configuration file.
//!
//! Contains [`Config`] (the root) and its sections. All types derive
//! `Serialize` and `Deserialize` with `deny_unknown_fields` for strict
//! parsing. Routes, redirects, domains and favicons are not configured
//! here; they live in the database and change at runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Database path that selects a private in-memory SQLite database.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

const fn default_timeout_ms() -> u64 {
    5000
}

const fn default_max_body() -> usize {
    1_048_576
}

fn default_inkscape() -> String {
    "inkscape".to_string()
}

const fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub listen: Listen,

    /// SQLite database file, or `:memory:`.
    pub database: PathBuf,

    pub auth: AuthConfig,

    /// Directory of `<code>.html` pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_pages: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certs: Option<CertsConfig>,

    #[serde(default)]
    pub favicons: FaviconsConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Recompile everything on this interval; 0 disables the loop.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reload_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Listen {
    /// Administrative API address, e.g. `127.0.0.1:8081`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,

    /// Public gateway address, e.g. `0.0.0.0:8080`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// RSA public key (PEM) for RS256 tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PathBuf>,

    /// Shared secret for HS256 tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CertsConfig {
    pub cert_dir: PathBuf,
    pub key_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FaviconsConfig {
    /// SVG to PNG converter command.
    #[serde(default = "default_inkscape")]
    pub inkscape: String,
}

impl Default for FaviconsConfig {
    fn default() -> Self {
        Self {
            inkscape: default_inkscape(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Max request body size in bytes.
    #[serde(default = "default_max_body")]
    pub max_body: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_body: default_max_body(),
        }
    }
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl Config {
    /// Make every relative path absolute against `base` (the config file's
    /// directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.database.as_os_str() != IN_MEMORY_DATABASE {
            resolve(base, &mut self.database);
        }
        if let Some(key) = self.auth.public_key.as_mut() {
            resolve(base, key);
        }
        if let Some(dir) = self.error_pages.as_mut() {
            resolve(base, dir);
        }
        if let Some(certs) = self.certs.as_mut() {
            resolve(base, &mut certs.cert_dir);
            resolve(base, &mut certs.key_dir);
        }
    }

    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database.as_os_str() == IN_MEMORY_DATABASE
    }
}
