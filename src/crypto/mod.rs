//! Cryptographic primitives and helpers used by the TLS engine.

use std::ops::Deref;

#[cfg(feature = "rust-crypto")]
pub mod rust_crypto;

mod aead;
pub mod key_schedule;
pub mod provider;

pub use aead::{Aad, Nonce};
pub(crate) use aead::{NONCE_LEN, RECORD_HEADER_LEN};

pub use provider::{ActiveKeyExchange, Cipher, CryptoProvider, CryptoSafe, HashContext};
pub use provider::{HashProvider, HkdfProvider, HmacProvider, SecureRandom};
pub use provider::{SupportedCipherSuite, SupportedKxGroup};

pub use crate::buffer::{Buf, TmpBuf};
pub use crate::types::{CipherSuite, HashAlgorithm, NamedGroup};

impl Deref for Aad {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for Nonce {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
