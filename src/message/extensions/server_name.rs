use crate::buffer::Buf;
use crate::codec::BufExt;
use crate::message::extension::{expect_len, ExtensionType};
use crate::Error;

const HOST_NAME: u8 = 0;

/// ServerNameList with one host_name entry (RFC 6066 Section 3).
pub fn serialize_client_hello(host_name: &str, output: &mut Buf) -> Result<(), Error> {
    let list = output.open_length(2);
    output.put_u8(HOST_NAME);
    output.put_vec(2, host_name.as_bytes())?;
    output.close_length(list)?;
    Ok(())
}

/// The server acknowledges server_name with an empty extension.
pub fn parse_encrypted_extensions(data: &[u8]) -> Result<(), Error> {
    expect_len(data, 0, ExtensionType::ServerName)
}
