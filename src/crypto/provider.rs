//! Cryptographic provider traits for pluggable crypto backends.
//!
//! The TLS engine never touches a primitive directly. Every hash, HMAC,
//! HKDF, AEAD and key exchange goes through a [`CryptoProvider`], a struct of
//! static trait object references, one per capability.
//!
//! # Architecture
//!
//! - **Cipher Suites** ([`SupportedCipherSuite`]): factory for AEAD [`Cipher`]s
//! - **Key Exchange Groups** ([`SupportedKxGroup`]): factory for ephemeral
//!   [`ActiveKeyExchange`]s
//! - **Secure Random** ([`SecureRandom`]): client random and key generation
//! - **Hash Provider** ([`HashProvider`]): factory for [`HashContext`]s
//! - **HMAC Provider** ([`HmacProvider`]): Finished and binder MACs, with a
//!   constant-time verify
//! - **HKDF Provider** ([`HkdfProvider`]): the TLS 1.3 key schedule
//!
//! # Using a Custom Provider
//!
//! ```
//! # #[cfg(feature = "rust-crypto")]
//! # fn main() {
//! use std::sync::Arc;
//! use psktls::{Config, Connection};
//! use psktls::crypto::rust_crypto;
//!
//! let provider = rust_crypto::default_provider();
//! let config = Arc::new(
//!     Config::builder()
//!         .with_crypto_provider(provider)
//!         .build()
//!         .unwrap(),
//! );
//! let _conn = Connection::new(config);
//! # }
//! # #[cfg(not(feature = "rust-crypto"))]
//! # fn main() {}
//! ```
//!
//! # Implementing a Custom Provider
//!
//! 1. Implement the traits for your backend
//! 2. Create static instances of your implementations
//! 3. Build a [`CryptoProvider`] with references to those statics
//!
//! ```
//! use psktls::crypto::{Aad, Buf, Cipher, CipherSuite, HashAlgorithm, Nonce};
//! use psktls::crypto::{SupportedCipherSuite, TmpBuf};
//!
//! #[derive(Debug)]
//! struct MyCipher;
//!
//! impl Cipher for MyCipher {
//!     fn encrypt(&mut self, _: &mut Buf, _: Aad, _: Nonce) -> Result<(), String> {
//!         Ok(())
//!     }
//!     fn decrypt(&mut self, _: &mut TmpBuf, _: Aad, _: Nonce) -> Result<(), String> {
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MySuite;
//!
//! impl SupportedCipherSuite for MySuite {
//!     fn suite(&self) -> CipherSuite {
//!         CipherSuite::AES_128_GCM_SHA256
//!     }
//!     fn hash_algorithm(&self) -> HashAlgorithm {
//!         HashAlgorithm::SHA256
//!     }
//!     fn key_len(&self) -> usize {
//!         16
//!     }
//!     fn iv_len(&self) -> usize {
//!         12
//!     }
//!     fn tag_len(&self) -> usize {
//!         16
//!     }
//!     fn create_cipher(&self, _key: &[u8]) -> Result<Box<dyn Cipher>, String> {
//!         Ok(Box::new(MyCipher))
//!     }
//! }
//!
//! static MY_SUITE: MySuite = MySuite;
//! static ALL_SUITES: &[&dyn SupportedCipherSuite] = &[&MY_SUITE];
//! ```
//!
//! # Thread Safety
//!
//! All provider traits require `Send + Sync + UnwindSafe + RefUnwindSafe`.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::sync::OnceLock;

use crate::buffer::{Buf, TmpBuf};
use crate::crypto::{Aad, Nonce, NONCE_LEN};
use crate::types::{CipherSuite, HashAlgorithm, NamedGroup};
use crate::Error;

// ============================================================================
// Marker Trait
// ============================================================================

/// Marker trait for types that are safe to use in crypto provider components.
///
/// Automatically implemented for every type that is
/// `Send + Sync + Debug + UnwindSafe + RefUnwindSafe`.
pub trait CryptoSafe: Send + Sync + Debug + UnwindSafe + RefUnwindSafe {}

impl<T: Send + Sync + Debug + UnwindSafe + RefUnwindSafe> CryptoSafe for T {}

// ============================================================================
// Instance Traits (created by factories)
// ============================================================================

/// AEAD cipher for in-place encryption/decryption.
pub trait Cipher: CryptoSafe {
    /// Encrypt plaintext in-place, appending authentication tag.
    fn encrypt(&mut self, plaintext: &mut Buf, aad: Aad, nonce: Nonce) -> Result<(), String>;

    /// Decrypt ciphertext in-place, verifying and removing authentication tag.
    fn decrypt(&mut self, ciphertext: &mut TmpBuf, aad: Aad, nonce: Nonce) -> Result<(), String>;
}

/// Stateful hash context for incremental hashing.
pub trait HashContext: CryptoSafe {
    /// The algorithm of this context.
    fn algorithm(&self) -> HashAlgorithm;

    /// Update the hash with new data.
    fn update(&mut self, data: &[u8]);

    /// Clone the context and finalize it, writing the hash to `out`.
    /// The original context can continue to be updated.
    fn clone_and_finalize(&self, out: &mut Buf);

    /// Duplicate the running state into an independent context.
    fn fork(&self) -> Box<dyn HashContext>;
}

/// Active key exchange instance (ephemeral keypair for one handshake).
pub trait ActiveKeyExchange: CryptoSafe {
    /// Get the public key for this exchange.
    fn pub_key(&self) -> &[u8];

    /// Complete exchange with peer's public key, returning shared secret.
    fn complete(self: Box<Self>, peer_pub: &[u8], out: &mut Buf) -> Result<(), String>;

    /// Get the named group for this exchange.
    fn group(&self) -> NamedGroup;
}

// ============================================================================
// Factory Traits (used by CryptoProvider)
// ============================================================================

/// TLS 1.3 cipher suite support (factory for Cipher instances).
pub trait SupportedCipherSuite: CryptoSafe {
    /// The cipher suite this supports.
    fn suite(&self) -> CipherSuite;

    /// Hash algorithm used by this suite.
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// AEAD key length in bytes.
    fn key_len(&self) -> usize;

    /// AEAD nonce/IV length in bytes.
    fn iv_len(&self) -> usize;

    /// AEAD tag length in bytes.
    fn tag_len(&self) -> usize;

    /// Create a cipher instance with the given key.
    fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, String>;
}

/// Key exchange group support (factory for ActiveKeyExchange).
pub trait SupportedKxGroup: CryptoSafe {
    /// Named group for this key exchange group.
    fn name(&self) -> NamedGroup;

    /// Start a new key exchange, generating ephemeral keypair.
    /// The provided `buf` will be used to store the public key.
    fn start_exchange(&self, buf: Buf) -> Result<Box<dyn ActiveKeyExchange>, String>;
}

/// Secure random number generator.
pub trait SecureRandom: CryptoSafe {
    /// Fill buffer with cryptographically secure random bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), String>;
}

/// Hash provider (factory for HashContext).
pub trait HashProvider: CryptoSafe {
    /// Create a new hash context for the specified algorithm.
    fn create_hash(&self, algorithm: HashAlgorithm) -> Box<dyn HashContext>;
}

/// HMAC provider.
pub trait HmacProvider: CryptoSafe {
    /// Compute HMAC(key, data) into `out`.
    fn hmac(
        &self,
        hash: HashAlgorithm,
        key: &[u8],
        data: &[u8],
        out: &mut Buf,
    ) -> Result<(), String>;

    /// Check `tag == HMAC(key, data)` in constant time.
    fn verify(&self, hash: HashAlgorithm, key: &[u8], data: &[u8], tag: &[u8]) -> bool;
}

/// HKDF provider for TLS 1.3 key derivation (RFC 5869).
pub trait HkdfProvider: CryptoSafe {
    /// HKDF-Extract: PRK = HKDF-Extract(salt, IKM).
    ///
    /// An empty salt means a string of `Hash.length` zeros.
    fn hkdf_extract(
        &self,
        hash: HashAlgorithm,
        salt: &[u8],
        ikm: &[u8],
        out: &mut Buf,
    ) -> Result<(), String>;

    /// HKDF-Expand: OKM = HKDF-Expand(PRK, info, L).
    fn hkdf_expand(
        &self,
        hash: HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        out: &mut Buf,
        output_len: usize,
    ) -> Result<(), String>;

    /// HKDF-Expand-Label for TLS 1.3 (RFC 8446 Section 7.1).
    ///
    /// ```text
    /// HkdfLabel = struct {
    ///     uint16 length;
    ///     opaque label<7..255> = "tls13 " + Label;
    ///     opaque context<0..255> = Context;
    /// }
    /// OKM = HKDF-Expand(Secret, HkdfLabel, Length)
    /// ```
    fn hkdf_expand_label(
        &self,
        hash: HashAlgorithm,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
        out: &mut Buf,
        output_len: usize,
    ) -> Result<(), String> {
        let full_label_len = 6 + label.len();
        if full_label_len > 255 {
            return Err("Label too long for HKDF-Expand-Label".to_string());
        }
        if context.len() > 255 {
            return Err("Context too long for HKDF-Expand-Label".to_string());
        }
        if output_len > 65535 {
            return Err("Output length too large for HKDF-Expand-Label".to_string());
        }

        let mut info = Vec::with_capacity(2 + 1 + full_label_len + 1 + context.len());
        info.extend_from_slice(&(output_len as u16).to_be_bytes());
        info.push(full_label_len as u8);
        info.extend_from_slice(b"tls13 ");
        info.extend_from_slice(label);
        info.push(context.len() as u8);
        info.extend_from_slice(context);

        self.hkdf_expand(hash, secret, &info, out, output_len)
    }
}

// ============================================================================
// Core Provider Struct
// ============================================================================

/// Cryptographic provider for TLS 1.3 operations.
///
/// Holds static references to every component needed by a connection. The
/// order of `cipher_suites` and `kx_groups` is the order they are offered
/// in the ClientHello.
#[derive(Debug, Clone)]
pub struct CryptoProvider {
    /// Supported TLS 1.3 cipher suites, in preference order.
    pub cipher_suites: &'static [&'static dyn SupportedCipherSuite],

    /// Supported key exchange groups, in preference order.
    ///
    /// A key share is generated for every group in this list.
    pub kx_groups: &'static [&'static dyn SupportedKxGroup],

    /// Secure random number generator.
    pub secure_random: &'static dyn SecureRandom,

    /// Hash provider for transcript hashing.
    pub hash_provider: &'static dyn HashProvider,

    /// HMAC provider for Finished and binder MACs.
    pub hmac_provider: &'static dyn HmacProvider,

    /// HKDF provider for the key schedule.
    pub hkdf_provider: &'static dyn HkdfProvider,
}

/// Static storage for the default crypto provider.
static DEFAULT: OnceLock<CryptoProvider> = OnceLock::new();

impl CryptoProvider {
    /// Install a default crypto provider for the process.
    ///
    /// Used by [`Config::builder()`](crate::Config::builder) when no
    /// explicit provider is set. Can be set once per process. A second call
    /// returns the rejected provider.
    pub fn install_default(provider: CryptoProvider) -> Result<(), CryptoProvider> {
        DEFAULT.set(provider)
    }

    /// Get the default crypto provider, if one has been installed.
    pub fn get_default() -> Option<&'static CryptoProvider> {
        DEFAULT.get()
    }

    /// Look up the provider's implementation of `suite`.
    pub fn find_cipher_suite(
        &self,
        suite: CipherSuite,
    ) -> Option<&'static dyn SupportedCipherSuite> {
        self.cipher_suites
            .iter()
            .copied()
            .find(|cs| cs.suite() == suite)
    }

    /// Look up the provider's implementation of `group`.
    pub fn find_kx_group(&self, group: NamedGroup) -> Option<&'static dyn SupportedKxGroup> {
        self.kx_groups.iter().copied().find(|g| g.name() == group)
    }

    /// Check the provider can drive a TLS 1.3 connection.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cipher_suites.is_empty() {
            return Err(Error::Config("crypto provider has no cipher suites".into()));
        }
        if self.kx_groups.is_empty() {
            return Err(Error::Config("crypto provider has no key exchange groups".into()));
        }
        for cs in self.cipher_suites {
            if cs.iv_len() != NONCE_LEN {
                return Err(Error::Config(format!(
                    "cipher suite {:?} has iv length {}, expected {}",
                    cs.suite(),
                    cs.iv_len(),
                    NONCE_LEN
                )));
            }
            if cs.suite().hash_algorithm() != Some(cs.hash_algorithm()) {
                return Err(Error::Config(format!(
                    "cipher suite {:?} reports a mismatching hash",
                    cs.suite()
                )));
            }
        }
        Ok(())
    }
}
