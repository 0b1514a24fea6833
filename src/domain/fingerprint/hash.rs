use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::foundation::ValidationError;

/// The header fields that feed the fingerprint, trimmed.
///
/// Field order is part of the digest and must not change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSnapshot {
    pub user_agent: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub connection: String,
    pub dnt: String,
    pub accept: String,
    pub cache_control: String,
    pub pragma: String,
}

impl HeaderSnapshot {
    /// Builds a snapshot from `(name, value)` pairs. Names are matched
    /// case-insensitively; unrelated headers are ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut snapshot = Self::default();
        for (name, value) in pairs {
            snapshot.set(name, value);
        }
        snapshot
    }

    /// Records one header. Returns false if the name is not a fingerprint field.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        let slot = match name.to_ascii_lowercase().as_str() {
            "user-agent" => &mut self.user_agent,
            "accept-language" => &mut self.accept_language,
            "accept-encoding" => &mut self.accept_encoding,
            "connection" => &mut self.connection,
            "dnt" => &mut self.dnt,
            "accept" => &mut self.accept,
            "cache-control" => &mut self.cache_control,
            "pragma" => &mut self.pragma,
            _ => return false,
        };
        *slot = value.trim().to_string();
        true
    }

    fn fields(&self) -> [&str; 8] {
        [
            self.user_agent.trim(),
            self.accept_language.trim(),
            self.accept_encoding.trim(),
            self.connection.trim(),
            self.dnt.trim(),
            self.accept.trim(),
            self.cache_control.trim(),
            self.pragma.trim(),
        ]
    }
}

/// Salted SHA-256 of a client IP, hex encoded. The raw IP is never kept.
pub fn hash_ip(ip: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.trim().as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lowercase hex SHA-256 digest identifying a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintHash(String);

impl FingerprintHash {
    /// Digest of the `|`-joined header fields followed by the IP hash.
    pub fn derive(headers: &HeaderSnapshot, ip_hash: &str) -> Self {
        let mut material: Vec<&str> = headers.fields().to_vec();
        material.push(ip_hash);

        let mut hasher = Sha256::new();
        hasher.update(material.join("|").as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Accepts exactly 64 lowercase hex characters.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let well_formed = value.len() == 64
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(ValidationError::invalid_format(
                "fingerprint",
                "expected 64 lowercase hex characters",
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters, enough to tell devices apart in logs.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
