//! The blacklist: a flat ordered collection of unique IPv4 strings.
//!
//! Stored as one serialized JSON array under a single KV key, so every
//! mutation is a get-modify-put sequence. Concurrent writers race
//! last-write-wins; see the concurrency notes in `DESIGN.md`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// KV key holding the serialized blacklist array.
pub const BLACKLIST_KEY: &str = "blacklist";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlacklistError {
    #[error("IP {0} is already blacklisted")]
    Duplicate(String),

    #[error("IP {0} is not in the blacklist")]
    Missing(String),

    #[error("invalid IPv4 address: {0}")]
    InvalidIp(String),
}

/// Ordered set of blacklisted IPv4 addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blacklist(Vec<String>);

impl Blacklist {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        // a Vec<String> always serializes
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.0.iter().any(|entry| entry == ip)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    /// Append an address, rejecting malformed input and duplicates.
    /// Returns the new length.
    pub fn add(&mut self, ip: &str) -> Result<usize, BlacklistError> {
        if !is_valid_ipv4(ip) {
            return Err(BlacklistError::InvalidIp(ip.to_string()));
        }
        if self.contains(ip) {
            return Err(BlacklistError::Duplicate(ip.to_string()));
        }
        self.0.push(ip.to_string());
        Ok(self.0.len())
    }

    /// Remove an address. Returns the new length.
    pub fn remove(&mut self, ip: &str) -> Result<usize, BlacklistError> {
        let before = self.0.len();
        self.0.retain(|entry| entry != ip);
        if self.0.len() == before {
            return Err(BlacklistError::Missing(ip.to_string()));
        }
        Ok(self.0.len())
    }
}

/// Validate a dotted-quad IPv4 string: four decimal octets, each in [0,255].
pub fn is_valid_ipv4(ip: &str) -> bool {
    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    octets.iter().all(|part| {
        !part.is_empty()
            && part.len() <= 3
            && part.bytes().all(|b| b.is_ascii_digit())
            && part.parse::<u16>().map(|n| n <= 255).unwrap_or(false)
    })
}
