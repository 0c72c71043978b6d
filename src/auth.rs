//! Bearer-token verification for the admin API.
//!
//! Tokens are JWTs carrying a `perms` list. Endpoint access needs a
//! `gatehouse:*` permission; mutating a host's records additionally needs
//! an `owns=<domain>` entry for the host's last two labels.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::{drop_port, top_fqdn};
use crate::error::GatehouseError;

pub const PERM_COMPILE: &str = "gatehouse:compile";
pub const PERM_DOMAINS: &str = "gatehouse:domains";
pub const PERM_ROUTE: &str = "gatehouse:route";
pub const PERM_REDIRECT: &str = "gatehouse:redirect";
pub const PERM_ACME_CHALLENGE: &str = "gatehouse:acme-challenge";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    #[serde(default)]
    pub perms: Vec<String>,
}

impl Claims {
    #[must_use]
    pub fn has(&self, perm: &str) -> bool {
        self.perms.iter().any(|p| p == perm)
    }

    /// The token carries `owns=<TopFqdn(host)>`.
    #[must_use]
    pub fn owns(&self, host: &str) -> bool {
        let Some(domain) = drop_port(host) else {
            return false;
        };
        self.has(&format!("owns={}", top_fqdn(domain)))
    }
}

pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

fn validation(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.validate_aud = false;
    validation.validate_nbf = false;
    validation
}

impl TokenVerifier {
    /// HMAC-SHA256 with a shared secret.
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: validation(Algorithm::HS256),
        }
    }

    /// RS256 with a PEM-encoded public key.
    pub fn from_rsa_pem(public_key_pem: &[u8]) -> Result<Self, GatehouseError> {
        Ok(Self {
            decoding_key: DecodingKey::from_rsa_pem(public_key_pem)?,
            validation: validation(Algorithm::RS256),
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, GatehouseError> {
        Ok(decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims)
    }
}

/// Sign claims with HMAC-SHA256. Used by tooling and tests.
pub fn sign_hs256(secret: &[u8], claims: &Claims) -> Result<String, GatehouseError> {
    Ok(encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )?)
}
