//! Pre-signed upload URLs.
//!
//! A URL authorizes `PUT`s of one `(bucket, key)` until it expires. A repeated
//! `PUT` overwrites the object, and ingestion sees the new content:
//!
//! ```text
//! {public_base}/blobs/{bucket}/{key}?expires={unix}&signature={hex}
//! signature = HMAC-SHA256(secret, "PUT\n{bucket}\n{key}\n{expires}")
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

use super::{BlobError, validate_bucket, validate_key};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUrl {
    pub url: String,
    pub bucket: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("upload url expired")]
    Expired,

    #[error("upload url signature invalid")]
    Invalid,
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    public_base: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("public_base", &self.public_base)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, public_base: &str) -> Self {
        Self {
            secret: secret.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(b"PUT\n");
        mac.update(bucket.as_bytes());
        mac.update(b"\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    pub fn sign(&self, bucket: &str, key: &str, expires: i64) -> String {
        hex::encode(self.mac(bucket, key, expires).finalize().into_bytes())
    }

    /// Issue a write URL for `(bucket, key)` valid for `ttl` from `now`.
    pub fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<PresignedUrl, BlobError> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        let expires = now.timestamp().saturating_add(ttl.as_secs() as i64);
        let signature = self.sign(bucket, key, expires);
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| BlobError::InvalidKey(format!("expiry out of range: {expires}")))?;

        Ok(PresignedUrl {
            url: format!(
                "{}/blobs/{bucket}/{key}?expires={expires}&signature={signature}",
                self.public_base
            ),
            bucket: bucket.to_string(),
            key: key.to_string(),
            expires_at,
        })
    }

    /// Check a presented signature. Comparison is constant-time.
    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let presented = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        self.mac(bucket, key, expires)
            .verify_slice(&presented)
            .map_err(|_| SignatureError::Invalid)?;

        if now.timestamp() > expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new(b"test-secret".to_vec(), "http://localhost:8080/")
    }

    #[test]
    fn presigned_url_has_expected_shape() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let url = signer()
            .presign_put("inventory-uploads", "uploads/1/a.csv", Duration::from_secs(900), now)
            .unwrap();

        assert!(url.url.starts_with(
            "http://localhost:8080/blobs/inventory-uploads/uploads/1/a.csv?expires=1700000900&signature="
        ));
        assert_eq!(url.expires_at.timestamp(), 1_700_000_900);
    }

    #[test]
    fn valid_signature_verifies_until_expiry() {
        let s = signer();
        let sig = s.sign("inventory-uploads", "k.csv", 1_000);
        let before = Utc.timestamp_opt(999, 0).unwrap();
        let after = Utc.timestamp_opt(1_001, 0).unwrap();

        assert!(s.verify("inventory-uploads", "k.csv", 1_000, &sig, before).is_ok());
        assert_eq!(
            s.verify("inventory-uploads", "k.csv", 1_000, &sig, after),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn tampering_is_detected() {
        let s = signer();
        let now = Utc.timestamp_opt(0, 0).unwrap();
        let sig = s.sign("inventory-uploads", "k.csv", 1_000);

        assert_eq!(
            s.verify("template-uploads", "k.csv", 1_000, &sig, now),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            s.verify("inventory-uploads", "k.csv", 2_000, &sig, now),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            s.verify("inventory-uploads", "k.csv", 1_000, "zz", now),
            Err(SignatureError::Invalid)
        );
        let other = UrlSigner::new(b"other".to_vec(), "http://x");
        assert!(other.verify("inventory-uploads", "k.csv", 1_000, &sig, now).is_err());
    }
}
