use nom::number::complete::be_u16;

use crate::buffer::Buf;
use crate::codec::{expect_empty, BufExt};
use crate::message::extension::{expect_len, ExtensionType};
use crate::types::{AlertDescription, ProtocolVersion};
use crate::Error;

/// SupportedVersions extension in ClientHello (RFC 8446 Section 4.2.1).
///
/// We only ever offer TLS 1.3.
pub fn serialize_client_hello(output: &mut Buf) -> Result<(), Error> {
    let mark = output.open_length(1);
    output.put_u16(ProtocolVersion::TLS1_3.as_u16());
    output.close_length(mark)?;
    Ok(())
}

/// SupportedVersions extension in ServerHello and HelloRetryRequest.
///
/// The body is exactly one `ProtocolVersion` which must be TLS 1.3.
pub fn parse_server_hello(data: &[u8]) -> Result<ProtocolVersion, Error> {
    expect_len(data, 2, ExtensionType::SupportedVersions)?;
    let (rest, value) = be_u16::<_, nom::error::Error<&[u8]>>(data)?;
    expect_empty(rest, "supported_versions")?;

    let version = ProtocolVersion::from_u16(value);
    if version != ProtocolVersion::TLS1_3 {
        return Err(Error::protocol(
            AlertDescription::ProtocolVersion,
            format!("server selected version {}", version),
        ));
    }
    Ok(version)
}
