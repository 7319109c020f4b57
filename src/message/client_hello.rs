use super::extension::{write_extensions, ExtensionType, SendHandler};
use super::Random;
use crate::buffer::Buf;
use crate::codec::BufExt;
use crate::types::{CipherSuite, ProtocolVersion};
use crate::Error;

/// ClientHello body (RFC 8446 Section 4.1.2).
///
/// The extension block is produced by a send table so that the caller
/// controls which extensions appear and in what order.
#[derive(Debug)]
pub struct ClientHello<'a> {
    pub random: &'a Random,
    pub cipher_suites: &'a [CipherSuite],
}

impl<'a> ClientHello<'a> {
    pub fn serialize<S>(
        &self,
        extensions: &[(ExtensionType, SendHandler<S>)],
        state: &mut S,
        output: &mut Buf,
    ) -> Result<(), Error> {
        // legacy_version is frozen at TLS 1.2
        output.put_u16(ProtocolVersion::TLS1_2.as_u16());
        self.random.serialize(output);

        // Empty legacy_session_id, no middlebox compatibility mode.
        output.put_u8(0);

        let suites = output.open_length(2);
        for suite in self.cipher_suites {
            output.put_u16(suite.as_u16());
        }
        output.close_length(suites)?;

        // legacy_compression_methods: null only
        output.put_u8(1);
        output.put_u8(0);

        let block = output.open_length(2);
        write_extensions(extensions, state, output)?;
        output.close_length(block)?;
        Ok(())
    }
}
