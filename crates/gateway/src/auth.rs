//! Fingerprint authentication boundary.
//!
//! The visitor-fingerprint service is an external collaborator; the
//! gateway only verifies the credential it issued and recovers the
//! fingerprint. Credentials are `{fingerprint}.{signature}` where the
//! signature is the hex SHA-256 of `{shared-token}:{fingerprint}` —
//! verified in constant time. With no shared token configured (dev mode),
//! the credential is the bare fingerprint.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use rg_domain::error::{Error, Result};

pub trait FingerprintAuth: Send + Sync {
    /// Validate an opaque bearer credential and return the fingerprint.
    fn authenticate(&self, credential: &str) -> Result<String>;
}

pub struct SharedSecretAuth {
    /// `None` = dev mode, credential is the fingerprint itself.
    token: Option<String>,
}

impl SharedSecretAuth {
    pub fn from_env(env_var: &str) -> Self {
        match std::env::var(env_var) {
            Ok(token) if !token.is_empty() => {
                tracing::info!(env_var, "fingerprint credential verification enabled");
                Self { token: Some(token) }
            }
            _ => {
                tracing::warn!(
                    env_var,
                    "fingerprint credential verification DISABLED — set {env_var} to enable"
                );
                Self { token: None }
            }
        }
    }

    /// Verification against an explicit shared token.
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Some(token.to_owned()),
        }
    }

    /// Dev-mode auth: the credential is the bare fingerprint.
    pub fn open() -> Self {
        Self { token: None }
    }

    /// The signature the fingerprint service computes for a fingerprint.
    pub fn sign(token: &str, fingerprint: &str) -> String {
        hex::encode(Sha256::digest(format!("{token}:{fingerprint}").as_bytes()))
    }
}

fn valid_fingerprint(fingerprint: &str) -> bool {
    !fingerprint.is_empty()
        && fingerprint.len() <= 128
        && fingerprint
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl FingerprintAuth for SharedSecretAuth {
    fn authenticate(&self, credential: &str) -> Result<String> {
        let Some(ref token) = self.token else {
            return if valid_fingerprint(credential) {
                Ok(credential.to_owned())
            } else {
                Err(Error::Auth("invalid fingerprint credential".into()))
            };
        };

        let Some((fingerprint, signature)) = credential.rsplit_once('.') else {
            return Err(Error::Auth("malformed credential".into()));
        };
        if !valid_fingerprint(fingerprint) {
            return Err(Error::Auth("invalid fingerprint credential".into()));
        }

        let expected = Self::sign(token, fingerprint);
        let matches: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
        if matches {
            Ok(fingerprint.to_owned())
        } else {
            Err(Error::Auth("credential signature mismatch".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_mode_accepts_bare_fingerprint() {
        let auth = SharedSecretAuth::open();
        assert_eq!(auth.authenticate("fp-123").unwrap(), "fp-123");
        assert!(auth.authenticate("").is_err());
        assert!(auth.authenticate("fp with spaces").is_err());
    }

    #[test]
    fn signed_credential_round_trip() {
        let auth = SharedSecretAuth::with_token("s3cret");
        let credential = format!("fp-123.{}", SharedSecretAuth::sign("s3cret", "fp-123"));
        assert_eq!(auth.authenticate(&credential).unwrap(), "fp-123");
    }

    #[test]
    fn forged_signature_is_rejected() {
        let auth = SharedSecretAuth::with_token("s3cret");
        let forged = format!("fp-123.{}", SharedSecretAuth::sign("wrong", "fp-123"));
        assert!(auth.authenticate(&forged).is_err());
        assert!(auth.authenticate("fp-123").is_err());
    }
}
