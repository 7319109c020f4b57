use arrayvec::ArrayVec;
use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use super::extension::{parse_extensions, Extension};
use super::Random;
use crate::types::{CipherSuite, ProtocolVersion};
use crate::Error;

/// ServerHello or HelloRetryRequest body (RFC 8446 Section 4.1.3).
#[derive(Debug, PartialEq, Eq)]
pub struct ServerHello {
    pub legacy_version: ProtocolVersion,
    pub random: Random,
    pub legacy_session_id: ArrayVec<u8, 32>,
    pub cipher_suite: CipherSuite,
    pub legacy_compression_method: u8,
    /// Ranges are relative to the buffer `parse` was given `base_offset` for.
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    /// Returns true if this ServerHello is actually a HelloRetryRequest.
    pub fn is_hello_retry_request(&self) -> bool {
        self.random.is_hello_retry_request()
    }

    fn parse_fixed(input: &[u8]) -> IResult<&[u8], (ProtocolVersion, Random, &[u8], CipherSuite, u8)> {
        let (input, legacy_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id_len) = be_u8(input)?;
        let (input, session_id) = take(session_id_len)(input)?;
        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, compression) = be_u8(input)?;
        Ok((
            input,
            (legacy_version, random, session_id, cipher_suite, compression),
        ))
    }

    pub fn parse(input: &[u8], base_offset: usize) -> Result<ServerHello, Error> {
        let (rest, (legacy_version, random, session_id, cipher_suite, compression)) =
            Self::parse_fixed(input)?;

        if session_id.len() > 32 {
            return Err(Error::Decode("legacy_session_id longer than 32".into()));
        }
        let mut legacy_session_id = ArrayVec::new();
        legacy_session_id
            .try_extend_from_slice(session_id)
            .map_err(|_| Error::Decode("legacy_session_id".into()))?;

        // A ServerHello without extensions cannot be TLS 1.3; leave the
        // verdict to the missing supported_versions check.
        let extensions = if rest.is_empty() {
            Vec::new()
        } else {
            let consumed = input.len() - rest.len();
            parse_extensions(rest, base_offset + consumed)?
        };

        Ok(ServerHello {
            legacy_version,
            random,
            legacy_session_id,
            cipher_suite,
            legacy_compression_method: compression,
            extensions,
        })
    }
}
