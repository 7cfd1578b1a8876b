//! SSH keypair for the rsync transit channel

use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("error generating keypair: {0}")]
    Generate(#[from] ssh_key::Error),
}

/// An OpenSSH encoded keypair
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Private key in OpenSSH PEM format
    pub private_key: String,
    /// Public key in `authorized_keys` format
    pub public_key: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl KeyPair {
    /// Generate a fresh Ed25519 keypair
    pub fn generate() -> Result<Self, KeyError> {
        let private = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)?;
        let private_key = private.to_openssh(LineEnding::LF)?.to_string();
        let public_key = format!("{}\n", private.public_key().to_openssh()?);

        Ok(Self {
            private_key,
            public_key,
        })
    }
}
