use nom::number::complete::be_u32;

use crate::codec::expect_empty;
use crate::message::extension::{expect_len, ExtensionType};
use crate::Error;

// EarlyDataIndication (RFC 8446 Section 4.2.10) is empty in ClientHello
// and EncryptedExtensions, and carries max_early_data_size in
// NewSessionTicket.

/// Empty indication in EncryptedExtensions.
pub fn parse_encrypted_extensions(data: &[u8]) -> Result<(), Error> {
    expect_len(data, 0, ExtensionType::EarlyData)
}

/// `uint32 max_early_data_size` in NewSessionTicket.
pub fn parse_new_session_ticket(data: &[u8]) -> Result<u32, Error> {
    expect_len(data, 4, ExtensionType::EarlyData)?;
    let (rest, max) = be_u32::<_, nom::error::Error<&[u8]>>(data)?;
    expect_empty(rest, "early_data")?;
    Ok(max)
}
