//! TLS 1.3 record protection inputs: per-record nonce and additional data.

use arrayvec::ArrayVec;

use crate::types::ContentType;

/// Length of a TLS 1.3 AEAD nonce and of every supported IV.
pub(crate) const NONCE_LEN: usize = 12;

/// Length of the TLS record header, which doubles as the AAD.
pub(crate) const RECORD_HEADER_LEN: usize = 5;

/// Full AEAD nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_LEN]);

impl Nonce {
    /// Per-record nonce, RFC 8446 Section 5.3.
    ///
    /// The 64-bit sequence number is encoded big-endian, left padded to the
    /// IV length and XORed with the static IV.
    pub(crate) fn xor(iv: &[u8; NONCE_LEN], seq: u64) -> Self {
        let mut nonce = *iv;
        let seq_bytes = seq.to_be_bytes();
        for (n, s) in nonce[NONCE_LEN - 8..].iter_mut().zip(seq_bytes) {
            *n ^= s;
        }
        Self(nonce)
    }
}

/// Additional Authenticated Data for a protected record.
///
/// This is the outer TLSCiphertext header: opaque_type, legacy_record_version
/// and the length of the encrypted record including the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aad(pub ArrayVec<u8, RECORD_HEADER_LEN>);

impl Aad {
    pub(crate) fn new(ciphertext_len: u16) -> Self {
        let mut aad = ArrayVec::new();
        aad.push(ContentType::ApplicationData.as_u8());
        aad.push(0x03);
        aad.push(0x03);
        let len = ciphertext_len.to_be_bytes();
        aad.push(len[0]);
        aad.push(len[1]);
        Aad(aad)
    }
}
