//! Startup configuration: loading, parsing and validation.
//!
//! The file format is picked from the extension (`.yaml`/`.yml` by default,
//! `.json` and `.toml` behind cargo features). [`load`] parses, validates
//! and resolves relative paths against the file's directory. Submodules
//! provide the data model and the validation logic.

pub mod model;
pub mod validation;

use std::path::Path;

use crate::error::GatehouseError;
use model::Config;

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Config, GatehouseError> {
    let parse_error = |source: Box<dyn std::error::Error + Send + Sync>| {
        GatehouseError::ConfigParse {
            path: path_display.to_string(),
            source,
        }
    };

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| parse_error(Box::new(e))),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| parse_error(Box::new(e))),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| parse_error(Box::new(e))),

        other => Err(GatehouseError::UnsupportedFormat(other.to_string())),
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

/// Parse and validate `content` as if read from `path`, without touching
/// relative paths.
pub fn parse_and_validate(path: &Path, content: &str) -> Result<Config, GatehouseError> {
    let config = parse_config_str(extension(path), content, &path.display().to_string())?;
    validation::validate(&config).map_err(|errors| GatehouseError::ConfigValidation { errors })?;
    Ok(config)
}

/// Read, parse and validate the config file at `path`, then resolve its
/// relative paths against the file's parent directory.
pub async fn load(path: &Path) -> Result<Config, GatehouseError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GatehouseError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            GatehouseError::Io(e)
        }
    })?;

    let mut config = parse_and_validate(path, &content)?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);
    Ok(config)
}
