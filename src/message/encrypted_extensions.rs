use super::extension::{parse_extensions, Extension};
use crate::Error;

/// EncryptedExtensions (RFC 8446 Section 4.3.1): only an extension block.
#[derive(Debug, PartialEq, Eq)]
pub struct EncryptedExtensions {
    pub extensions: Vec<Extension>,
}

impl EncryptedExtensions {
    pub fn parse(input: &[u8], base_offset: usize) -> Result<EncryptedExtensions, Error> {
        Ok(EncryptedExtensions {
            extensions: parse_extensions(input, base_offset)?,
        })
    }
}
