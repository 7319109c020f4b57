//! HMAC using RustCrypto.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};

use crate::buffer::Buf;
use crate::crypto::provider::HmacProvider;
use crate::types::HashAlgorithm;

/// HMAC provider implementation.
#[derive(Debug)]
pub(super) struct RustCryptoHmacProvider;

impl HmacProvider for RustCryptoHmacProvider {
    fn hmac(
        &self,
        hash: HashAlgorithm,
        key: &[u8],
        data: &[u8],
        out: &mut Buf,
    ) -> Result<(), String> {
        out.clear();
        match hash {
            HashAlgorithm::SHA256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key)
                    .map_err(|_| "Invalid HMAC key".to_string())?;
                mac.update(data);
                out.extend_from_slice(&mac.finalize().into_bytes());
            }
            HashAlgorithm::SHA384 => {
                let mut mac = Hmac::<Sha384>::new_from_slice(key)
                    .map_err(|_| "Invalid HMAC key".to_string())?;
                mac.update(data);
                out.extend_from_slice(&mac.finalize().into_bytes());
            }
        }
        Ok(())
    }

    fn verify(&self, hash: HashAlgorithm, key: &[u8], data: &[u8], tag: &[u8]) -> bool {
        // verify_slice compares in constant time.
        match hash {
            HashAlgorithm::SHA256 => match Hmac::<Sha256>::new_from_slice(key) {
                Ok(mut mac) => {
                    mac.update(data);
                    mac.verify_slice(tag).is_ok()
                }
                Err(_) => false,
            },
            HashAlgorithm::SHA384 => match Hmac::<Sha384>::new_from_slice(key) {
                Ok(mut mac) => {
                    mac.update(data);
                    mac.verify_slice(tag).is_ok()
                }
                Err(_) => false,
            },
        }
    }
}

/// Static instance of the HMAC provider.
pub(super) static HMAC_PROVIDER: RustCryptoHmacProvider = RustCryptoHmacProvider;
