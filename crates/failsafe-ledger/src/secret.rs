use rand::RngCore;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{LedgerError, LedgerResult};

const GENERATED_SECRET_BYTES: usize = 32;

/// HMAC key for ledger entry signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct LedgerSecret(Vec<u8>);

impl fmt::Debug for LedgerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LedgerSecret(<redacted>)")
    }
}

impl LedgerSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> LedgerResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(LedgerError::Secret("secret is empty".into()));
        }
        Ok(Self(bytes))
    }

    /// A fresh random secret, hex encoded.
    pub fn generate() -> Self {
        let mut raw = [0u8; GENERATED_SECRET_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        Self(hex::encode(raw).into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Use `$env_var` when set, otherwise the key file, creating it on first use.
    pub fn resolve(env_var: &str, key_file: &Path) -> LedgerResult<Self> {
        if let Ok(value) = std::env::var(env_var) {
            if !value.trim().is_empty() {
                return Self::new(value.trim());
            }
        }
        Self::load_or_create(key_file)
    }

    pub fn load_or_create(key_file: &Path) -> LedgerResult<Self> {
        match fs::read_to_string(key_file) {
            Ok(text) => return Self::new(text.trim()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(LedgerError::io(key_file, e)),
        }

        let secret = Self::generate();
        match failsafe_core::atomic::write_new_private(key_file, secret.as_bytes()) {
            Ok(()) => {
                tracing::info!(path = %key_file.display(), "generated ledger secret");
                Ok(secret)
            }
            // Another process created it first.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let text = fs::read_to_string(key_file).map_err(|e| LedgerError::io(key_file, e))?;
                Self::new(text.trim())
            }
            Err(e) => Err(LedgerError::io(key_file, e)),
        }
    }
}
