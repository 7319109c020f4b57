//! pre_shared_key extension (RFC 8446 Section 4.2.11).
//!
//! ```text
//! struct {
//!     opaque identity<1..2^16-1>;
//!     uint32 obfuscated_ticket_age;
//! } PskIdentity;
//!
//! opaque PskBinderEntry<32..255>;
//!
//! struct {
//!     PskIdentity identities<7..2^16-1>;
//!     PskBinderEntry binders<33..2^16-1>;
//! } OfferedPsks;
//! ```
//!
//! The binders cover the ClientHello up to the binders list, so the
//! extension is written with zeroed binders first and patched once the
//! message lengths are final.

use nom::number::complete::be_u16;

use crate::buffer::Buf;
use crate::codec::{expect_empty, BufExt};
use crate::message::extension::{expect_len, ExtensionType};
use crate::Error;

/// One offered PSK.
#[derive(Debug, Clone, Copy)]
pub struct PskOffer<'a> {
    pub identity: &'a [u8],
    pub obfuscated_ticket_age: u32,
    /// Binder length, the hash length of the PSK.
    pub binder_len: usize,
}

/// Write OfferedPsks with placeholder binders.
///
/// Returns the length of the binders list including its u16 prefix. Those
/// are the trailing bytes of the ClientHello excluded from the binder hash.
pub fn serialize_client_hello(offers: &[PskOffer], output: &mut Buf) -> Result<usize, Error> {
    if offers.is_empty() {
        return Err(Error::Internal("pre_shared_key without identities".into()));
    }

    let identities = output.open_length(2);
    for offer in offers {
        if offer.identity.is_empty() {
            return Err(Error::Internal("empty PSK identity".into()));
        }
        output.put_vec(2, offer.identity)?;
        output.put_u32(offer.obfuscated_ticket_age);
    }
    output.close_length(identities)?;

    let start = output.len();
    let binders = output.open_length(2);
    for offer in offers {
        output.put_u8(offer.binder_len as u8);
        output.resize(output.len() + offer.binder_len, 0);
    }
    output.close_length(binders)?;
    Ok(output.len() - start)
}

/// Patch computed binders into the tail of a finished ClientHello.
pub fn fill_binders(message: &mut [u8], binders: &[Buf]) -> Result<(), Error> {
    let total: usize = 2 + binders.iter().map(|b| 1 + b.len()).sum::<usize>();
    if total > message.len() {
        return Err(Error::Internal("binders exceed ClientHello".into()));
    }
    let mut pos = message.len() - total;

    let declared = u16::from_be_bytes([message[pos], message[pos + 1]]) as usize;
    if declared != total - 2 {
        return Err(Error::Internal("binder placeholder length mismatch".into()));
    }
    pos += 2;

    for binder in binders {
        if message[pos] as usize != binder.len() {
            return Err(Error::Internal("binder length mismatch".into()));
        }
        pos += 1;
        message[pos..pos + binder.len()].copy_from_slice(binder);
        pos += binder.len();
    }
    Ok(())
}

/// `uint16 selected_identity` in ServerHello.
pub fn parse_server_hello(data: &[u8]) -> Result<u16, Error> {
    expect_len(data, 2, ExtensionType::PreSharedKey)?;
    let (rest, selected) = be_u16::<_, nom::error::Error<&[u8]>>(data)?;
    expect_empty(rest, "pre_shared_key")?;
    Ok(selected)
}
