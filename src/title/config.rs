// title/config.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Implements the read-only configuration handed to every verifying or decrypting entry point.

use std::collections::HashSet;
use thiserror::Error;
use crate::title::cert::{Certificate, KeyType};
use crate::title::commonkeys::CommonKeys;
use crate::title::ErrorClass;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("common key at index {0} is not a 16 byte hex string")]
    InvalidCommonKey(usize),
    #[error("at least one trusted root certificate is required")]
    NoTrustedRoots,
    #[error("trusted root `{0}` must carry an RSA key (found `{1}`)")]
    UnsupportedRootKey(String, KeyType),
    #[error("trusted root `{0}` carries an unusable public key")]
    InvalidRootKey(String),
    #[error("trusted root `{0}` is listed more than once")]
    DuplicateRoot(String),
}

impl ConfigError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Configuration
    }
}

/// The common keys and trusted root certificates used to unwrap and verify titles. This is
/// checked once when created and never changes afterwards.
#[derive(Debug, Clone)]
pub struct TitleConfig {
    common_keys: CommonKeys,
    trusted_roots: Vec<Certificate>,
}

impl TitleConfig {
    /// Creates a new TitleConfig, rejecting it if there are no usable trusted roots.
    pub fn new(common_keys: CommonKeys, trusted_roots: Vec<Certificate>) -> Result<Self, ConfigError> {
        if trusted_roots.is_empty() {
            return Err(ConfigError::NoTrustedRoots);
        }
        let mut names = HashSet::new();
        for root in &trusted_roots {
            let name = root.full_name();
            if root.key_type() == KeyType::Ecc {
                return Err(ConfigError::UnsupportedRootKey(name, root.key_type()));
            }
            if root.public_key().to_rsa().is_err() {
                return Err(ConfigError::InvalidRootKey(name));
            }
            if !names.insert(name.clone()) {
                return Err(ConfigError::DuplicateRoot(name));
            }
        }
        Ok(TitleConfig { common_keys, trusted_roots })
    }

    pub fn common_keys(&self) -> &CommonKeys {
        &self.common_keys
    }

    pub fn trusted_roots(&self) -> &[Certificate] {
        &self.trusted_roots
    }
}
