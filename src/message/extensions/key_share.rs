use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::codec::{expect_empty, BufExt};
use crate::crypto::ActiveKeyExchange;
use crate::message::extension::{expect_len, ExtensionType};
use crate::types::NamedGroup;
use crate::Error;

/// KeyShareEntry (RFC 8446 Section 4.2.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyShareEntry<'a> {
    pub group: NamedGroup,
    pub key_exchange: &'a [u8],
}

impl<'a> KeyShareEntry<'a> {
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], KeyShareEntry<'a>> {
        let (input, group) = NamedGroup::parse(input)?;
        let (input, ke_len) = be_u16(input)?;
        let (input, key_exchange) = take(ke_len)(input)?;
        Ok((
            input,
            KeyShareEntry {
                group,
                key_exchange,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) -> Result<(), Error> {
        output.put_u16(self.group.as_u16());
        output.put_vec(2, self.key_exchange)
    }
}

/// KeyShareClientHello: one entry per live key share, in offer order.
pub fn serialize_client_hello(
    shares: &[Box<dyn ActiveKeyExchange>],
    output: &mut Buf,
) -> Result<(), Error> {
    let mark = output.open_length(2);
    for share in shares {
        KeyShareEntry {
            group: share.group(),
            key_exchange: share.pub_key(),
        }
        .serialize(output)?;
    }
    output.close_length(mark)?;
    Ok(())
}

/// KeyShareServerHello: a single entry filling the whole extension.
pub fn parse_server_hello(data: &[u8]) -> Result<KeyShareEntry<'_>, Error> {
    let (rest, entry) = KeyShareEntry::parse(data)?;
    expect_empty(rest, "key_share")?;
    Ok(entry)
}

/// KeyShareHelloRetryRequest: the group the server wants a share for.
pub fn parse_hello_retry_request(data: &[u8]) -> Result<NamedGroup, Error> {
    expect_len(data, 2, ExtensionType::KeyShare)?;
    let (_, group) = NamedGroup::parse(data)?;
    Ok(group)
}
