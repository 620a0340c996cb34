//! Download links for pin images
//!
//! Original images are private; clients get a time-limited link that is
//! issued while an envelope is being built, so the link is fresh when it
//! reaches the client. Thumbnails are public and keep their stored URL.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PinstreamError, Result};
use crate::pin::SavedPin;

type HmacSha256 = Hmac<Sha256>;

/// Rewrites ephemeral links inside a pin snapshot
pub trait LinkResolver: Send + Sync {
    fn resolve(&self, pin: SavedPin) -> SavedPin;
}

/// Leaves snapshots untouched
pub struct PassthroughLinks;

impl LinkResolver for PassthroughLinks {
    fn resolve(&self, pin: SavedPin) -> SavedPin {
        pin
    }
}

/// Plain object-store URLs for a local development endpoint
pub struct LocalEndpointLinks {
    endpoint: String,
    bucket: String,
}

impl LocalEndpointLinks {
    pub fn new(endpoint: &str, bucket: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        }
    }
}

impl LinkResolver for LocalEndpointLinks {
    fn resolve(&self, mut pin: SavedPin) -> SavedPin {
        if let Some(image) = pin.image.as_mut() {
            image.url = Some(format!("{}/{}/{}", self.endpoint, self.bucket, image.s3key));
        }
        pin
    }
}

/// Issues HMAC-signed links that expire after `ttl`
pub struct SignedLinkResolver {
    base_url: String,
    bucket: String,
    /// Keyed once; cloned per link
    mac: HmacSha256,
    ttl: Duration,
}

impl SignedLinkResolver {
    pub fn new(base_url: &str, bucket: &str, secret: &[u8], ttl: Duration) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| PinstreamError::Config {
            message: format!("Invalid link signing key: {}", e),
        })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            mac,
            ttl,
        })
    }

    fn keyed(&self, s3key: &str, expires: i64, disposition: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{}/{}\n{}\n{}", self.bucket, s3key, expires, disposition).as_bytes());
        mac
    }

    fn signature(&self, s3key: &str, expires: i64, disposition: &str) -> String {
        hex::encode(self.keyed(s3key, expires, disposition).finalize().into_bytes())
    }

    fn object_prefix(&self) -> String {
        format!("{}/{}/", self.base_url, self.bucket)
    }

    /// Link for `s3key` as seen at `now` (unix seconds)
    pub fn sign_at(&self, s3key: &str, file_name: &str, now: i64) -> String {
        let expires = now + self.ttl.as_secs() as i64;
        let disposition = format!("attachment; filename=\"{}\"", file_name);
        let signature = self.signature(s3key, expires, &disposition);
        let path = s3key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}{}?expires={}&disposition={}&signature={}",
            self.object_prefix(),
            path,
            expires,
            urlencoding::encode(&disposition),
            signature
        )
    }

    /// Check a link issued by [`Self::sign_at`] is authentic and unexpired at `now`
    pub fn verify(&self, url: &str, now: i64) -> bool {
        let Some(rest) = url.strip_prefix(&self.object_prefix()) else {
            return false;
        };
        let Some((path, query)) = rest.split_once('?') else {
            return false;
        };

        let mut s3key_parts = Vec::new();
        for segment in path.split('/') {
            match urlencoding::decode(segment) {
                Ok(decoded) => s3key_parts.push(decoded.into_owned()),
                Err(_) => return false,
            }
        }
        let s3key = s3key_parts.join("/");

        let mut expires = None;
        let mut disposition = None;
        let mut signature = None;
        for pair in query.split('&') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            match name {
                "expires" => expires = value.parse::<i64>().ok(),
                "disposition" => disposition = urlencoding::decode(value).ok().map(|v| v.into_owned()),
                "signature" => signature = Some(value.to_string()),
                _ => {}
            }
        }

        match (expires, disposition, signature) {
            (Some(expires), Some(disposition), Some(signature)) => {
                let Ok(signature) = hex::decode(signature) else {
                    return false;
                };
                expires >= now
                    && self
                        .keyed(&s3key, expires, &disposition)
                        .verify_slice(&signature)
                        .is_ok()
            }
            _ => false,
        }
    }
}

impl LinkResolver for SignedLinkResolver {
    fn resolve(&self, mut pin: SavedPin) -> SavedPin {
        if let Some(image) = pin.image.as_mut() {
            let now = chrono::Utc::now().timestamp();
            image.url = Some(self.sign_at(&image.s3key, &image.name, now));
        }
        pin
    }
}
