use nom::bytes::complete::take;
use nom::IResult;

use crate::buffer::Buf;
use crate::crypto::SecureRandom;
use crate::Error;

/// ServerHello.random of a HelloRetryRequest (RFC 8446 Section 4.1.3),
/// SHA-256("HelloRetryRequest").
pub const HRR_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91,
    0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Random {
    pub bytes: [u8; 32],
}

impl Random {
    /// 32 fresh bytes from the provider. TLS 1.3 drops the timestamp prefix.
    pub fn new(rng: &dyn SecureRandom) -> Result<Self, Error> {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes).map_err(Error::Internal)?;
        Ok(Random { bytes })
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, data) = take(32_usize)(input)?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(data);
        Ok((input, Random { bytes }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.bytes);
    }

    pub fn is_hello_retry_request(&self) -> bool {
        self.bytes == HRR_RANDOM
    }
}
