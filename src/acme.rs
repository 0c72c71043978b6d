//! In-memory ACME HTTP-01 challenge store.
//!
//! Challenges are set through the admin API and answered on the public
//! listener at `/.well-known/acme-challenge/<key>` for the request host.
//! They are short-lived and deliberately not persisted.

use std::collections::HashMap;

use tokio::sync::RwLock;

pub const CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

#[derive(Debug, Default)]
pub struct AcmeChallenges {
    by_domain: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl AcmeChallenges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, domain: &str, key: &str, value: &str) {
        self.by_domain
            .write()
            .await
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub async fn delete(&self, domain: &str, key: &str) {
        let mut by_domain = self.by_domain.write().await;
        if let Some(keys) = by_domain.get_mut(domain) {
            keys.remove(key);
            if keys.is_empty() {
                by_domain.remove(domain);
            }
        }
    }

    pub async fn get(&self, domain: &str, key: &str) -> Option<String> {
        self.by_domain
            .read()
            .await
            .get(domain)
            .and_then(|keys| keys.get(key))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let acme = AcmeChallenges::new();
        acme.put("example.com", "token", "token.thumbprint").await;
        assert_eq!(
            acme.get("example.com", "token").await.as_deref(),
            Some("token.thumbprint")
        );
        assert!(acme.get("other.com", "token").await.is_none());

        acme.delete("example.com", "token").await;
        assert!(acme.get("example.com", "token").await.is_none());
        assert!(acme.by_domain.read().await.is_empty());
    }
}
