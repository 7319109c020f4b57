//! TLS 1.3 cipher suite implementations using RustCrypto.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;

use crate::buffer::{Buf, TmpBuf};
use crate::crypto::provider::{Cipher, SupportedCipherSuite};
use crate::crypto::{Aad, Nonce};
use crate::types::{CipherSuite, HashAlgorithm};

/// AEAD tag length shared by every suite below.
const TAG_LEN: usize = 16;

/// AEAD cipher implementation using RustCrypto.
enum RustCryptoAead {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
    ChaCha20(Box<ChaCha20Poly1305>),
}

impl std::fmt::Debug for RustCryptoAead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RustCryptoAead::Aes128(_) => f.debug_tuple("RustCryptoAead::Aes128").finish(),
            RustCryptoAead::Aes256(_) => f.debug_tuple("RustCryptoAead::Aes256").finish(),
            RustCryptoAead::ChaCha20(_) => f.debug_tuple("RustCryptoAead::ChaCha20").finish(),
        }
    }
}

impl RustCryptoAead {
    fn aes_gcm(key: &[u8]) -> Result<Self, String> {
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .map(|c| RustCryptoAead::Aes128(Box::new(c)))
                .map_err(|_| "Invalid AES-128-GCM key".to_string()),
            32 => Aes256Gcm::new_from_slice(key)
                .map(|c| RustCryptoAead::Aes256(Box::new(c)))
                .map_err(|_| "Invalid AES-256-GCM key".to_string()),
            _ => Err(format!("Invalid key size for AES-GCM: {}", key.len())),
        }
    }

    fn chacha20_poly1305(key: &[u8]) -> Result<Self, String> {
        ChaCha20Poly1305::new_from_slice(key)
            .map(|c| RustCryptoAead::ChaCha20(Box::new(c)))
            .map_err(|_| format!("Invalid key size for ChaCha20-Poly1305: {}", key.len()))
    }
}

fn seal<A: AeadInPlace>(cipher: &A, data: &mut Buf, aad: &Aad, nonce: &Nonce) -> Result<(), String> {
    let nonce = aes_gcm::aead::Nonce::<A>::from_slice(&nonce.0);
    cipher
        .encrypt_in_place(nonce, aad, data)
        .map_err(|_| "AEAD encryption failed".to_string())
}

fn open<A: AeadInPlace>(
    cipher: &A,
    data: &mut TmpBuf,
    aad: &Aad,
    nonce: &Nonce,
) -> Result<(), String> {
    if data.len() < TAG_LEN {
        return Err(format!("Ciphertext too short: {}", data.len()));
    }
    let nonce = aes_gcm::aead::Nonce::<A>::from_slice(&nonce.0);
    cipher
        .decrypt_in_place(nonce, aad, data)
        .map_err(|_| "AEAD decryption failed".to_string())
}

impl Cipher for RustCryptoAead {
    fn encrypt(&mut self, data: &mut Buf, aad: Aad, nonce: Nonce) -> Result<(), String> {
        match self {
            RustCryptoAead::Aes128(c) => seal(c.as_ref(), data, &aad, &nonce),
            RustCryptoAead::Aes256(c) => seal(c.as_ref(), data, &aad, &nonce),
            RustCryptoAead::ChaCha20(c) => seal(c.as_ref(), data, &aad, &nonce),
        }
    }

    fn decrypt(&mut self, ciphertext: &mut TmpBuf, aad: Aad, nonce: Nonce) -> Result<(), String> {
        // decrypt_in_place removes the tag and shortens the buffer.
        match self {
            RustCryptoAead::Aes128(c) => open(c.as_ref(), ciphertext, &aad, &nonce),
            RustCryptoAead::Aes256(c) => open(c.as_ref(), ciphertext, &aad, &nonce),
            RustCryptoAead::ChaCha20(c) => open(c.as_ref(), ciphertext, &aad, &nonce),
        }
    }
}

/// TLS_AES_128_GCM_SHA256 cipher suite.
#[derive(Debug)]
struct Tls13Aes128GcmSha256;

impl SupportedCipherSuite for Tls13Aes128GcmSha256 {
    fn suite(&self) -> CipherSuite {
        CipherSuite::AES_128_GCM_SHA256
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::SHA256
    }

    fn key_len(&self) -> usize {
        16
    }

    fn iv_len(&self) -> usize {
        12
    }

    fn tag_len(&self) -> usize {
        TAG_LEN
    }

    fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, String> {
        Ok(Box::new(RustCryptoAead::aes_gcm(key)?))
    }
}

/// TLS_AES_256_GCM_SHA384 cipher suite.
#[derive(Debug)]
struct Tls13Aes256GcmSha384;

impl SupportedCipherSuite for Tls13Aes256GcmSha384 {
    fn suite(&self) -> CipherSuite {
        CipherSuite::AES_256_GCM_SHA384
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::SHA384
    }

    fn key_len(&self) -> usize {
        32
    }

    fn iv_len(&self) -> usize {
        12
    }

    fn tag_len(&self) -> usize {
        TAG_LEN
    }

    fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, String> {
        Ok(Box::new(RustCryptoAead::aes_gcm(key)?))
    }
}

/// TLS_CHACHA20_POLY1305_SHA256 cipher suite.
#[derive(Debug)]
struct Tls13ChaCha20Poly1305Sha256;

impl SupportedCipherSuite for Tls13ChaCha20Poly1305Sha256 {
    fn suite(&self) -> CipherSuite {
        CipherSuite::CHACHA20_POLY1305_SHA256
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::SHA256
    }

    fn key_len(&self) -> usize {
        32
    }

    fn iv_len(&self) -> usize {
        12
    }

    fn tag_len(&self) -> usize {
        TAG_LEN
    }

    fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, String> {
        Ok(Box::new(RustCryptoAead::chacha20_poly1305(key)?))
    }
}

static TLS13_AES_128_GCM_SHA256: Tls13Aes128GcmSha256 = Tls13Aes128GcmSha256;
static TLS13_AES_256_GCM_SHA384: Tls13Aes256GcmSha384 = Tls13Aes256GcmSha384;
static TLS13_CHACHA20_POLY1305_SHA256: Tls13ChaCha20Poly1305Sha256 = Tls13ChaCha20Poly1305Sha256;

/// All supported TLS 1.3 cipher suites, in preference order.
pub(super) static ALL_CIPHER_SUITES: &[&dyn SupportedCipherSuite] = &[
    &TLS13_AES_128_GCM_SHA256,
    &TLS13_AES_256_GCM_SHA384,
    &TLS13_CHACHA20_POLY1305_SHA256,
];
