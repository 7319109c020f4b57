//! RustCrypto cryptographic provider implementation.
//!
//! A pure Rust backend built from crates of the
//! [RustCrypto](https://github.com/RustCrypto) organization plus
//! `x25519-dalek`.
//!
//! # Feature Flag
//!
//! Only available with the `rust-crypto` feature, which is on by default.
//! Without it a provider must be supplied through
//! [`ConfigBuilder::with_crypto_provider`](crate::ConfigBuilder::with_crypto_provider)
//! or [`CryptoProvider::install_default`].

mod cipher_suite;
mod hash;
mod hkdf;
mod hmac;
mod kx_group;
mod random;

use crate::crypto::provider::CryptoProvider;

/// Get the default RustCrypto-based crypto provider.
///
/// # Supported Cipher Suites
///
/// - `TLS_AES_128_GCM_SHA256` (0x1301)
/// - `TLS_AES_256_GCM_SHA384` (0x1302)
/// - `TLS_CHACHA20_POLY1305_SHA256` (0x1303)
///
/// # Supported Key Exchange Groups
///
/// - `x25519`
/// - `secp256r1` (P-256)
/// - `secp384r1` (P-384)
///
/// # Random Number Generation
///
/// Uses `OsRng` from `rand_core`.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: cipher_suite::ALL_CIPHER_SUITES,
        kx_groups: kx_group::ALL_KX_GROUPS,
        secure_random: &random::SECURE_RANDOM,
        hash_provider: &hash::HASH_PROVIDER,
        hmac_provider: &hmac::HMAC_PROVIDER,
        hkdf_provider: &hkdf::HKDF_PROVIDER,
    }
}
