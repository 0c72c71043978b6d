//! TLS certificates loaded from PEM files on disk.
//!
//! Each `<domain>.cert.pem` in the certificate directory is paired with
//! `<domain>.key.pem` in the key directory. A wildcard certificate is
//! stored under its wildcard name, e.g. `*.example.com.cert.pem`.

use std::collections::HashMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;

use crate::compile::{Coalescer, Compilable, Snapshot};
use crate::domain::{drop_port, wildcard_form};
use crate::error::GatehouseError;

const CERT_SUFFIX: &str = ".cert.pem";
const KEY_SUFFIX: &str = ".key.pem";

type CertMap = HashMap<String, Arc<CertifiedKey>>;

/// Where certificate and key PEM files live. Both may be the same directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertDirs {
    pub cert_dir: PathBuf,
    pub key_dir: PathBuf,
}

struct Shared {
    dirs: Option<CertDirs>,
    certs: Snapshot<CertMap>,
}

#[derive(Clone)]
pub struct CertificateProvider {
    shared: Arc<Shared>,
    coalescer: Coalescer,
}

fn cert_error(domain: &str, message: impl Into<String>) -> GatehouseError {
    GatehouseError::Certificate {
        domain: domain.to_string(),
        message: message.into(),
    }
}

/// Build a signing key pair from PEM bytes.
pub fn certified_key(
    domain: &str,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<CertifiedKey, GatehouseError> {
    let chain: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(cert_pem))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| cert_error(domain, format!("failed to parse certificate: {e}")))?;
    if chain.is_empty() {
        return Err(cert_error(domain, "no certificate found in PEM"));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
        .map_err(|e| cert_error(domain, format!("failed to parse key: {e}")))?
        .ok_or_else(|| cert_error(domain, "no private key found in PEM"))?;

    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| cert_error(domain, format!("unsupported key type: {e}")))?;

    Ok(CertifiedKey::new(chain, signing_key))
}

async fn load_dir(cert_dir: &Path, key_dir: &Path) -> Result<CertMap, GatehouseError> {
    let mut certs = CertMap::new();
    let mut entries = tokio::fs::read_dir(cert_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(domain) = file_name
            .to_str()
            .and_then(|name| name.strip_suffix(CERT_SUFFIX))
        else {
            continue;
        };

        let cert_pem = tokio::fs::read(entry.path()).await?;
        let key_path = key_dir.join(format!("{domain}{KEY_SUFFIX}"));
        let key_pem = tokio::fs::read(&key_path)
            .await
            .map_err(|e| cert_error(domain, format!("{}: {e}", key_path.display())))?;

        let key = certified_key(domain, &cert_pem, &key_pem)?;
        certs.insert(domain.to_string(), Arc::new(key));
    }
    Ok(certs)
}

impl CertificateProvider {
    /// Without directories the provider stays empty.
    pub fn new(dirs: Option<CertDirs>) -> Self {
        let shared = Arc::new(Shared {
            dirs,
            certs: Snapshot::default(),
        });
        let for_rebuild = Arc::clone(&shared);
        let coalescer = Coalescer::new("certificates", move || {
            let shared = Arc::clone(&for_rebuild);
            async move {
                let certs = match &shared.dirs {
                    Some(dirs) => load_dir(&dirs.cert_dir, &dirs.key_dir).await?,
                    None => CertMap::new(),
                };
                tracing::info!(certificates = certs.len(), "certificates compiled");
                shared.certs.publish(certs).await;
                Ok(())
            }
        });
        Self { shared, coalescer }
    }

    /// Certificate for `host`, trying the exact name before the wildcard form.
    pub async fn get_cert(&self, host: &str) -> Option<Arc<CertifiedKey>> {
        let domain = drop_port(host)?;
        let certs = self.shared.certs.load().await;
        certs
            .get(domain)
            .or_else(|| certs.get(&wildcard_form(domain)))
            .cloned()
    }

    pub async fn count(&self) -> usize {
        self.shared.certs.load().await.len()
    }
}

impl Compilable for CertificateProvider {
    fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }
}
