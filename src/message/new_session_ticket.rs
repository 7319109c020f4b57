use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::IResult;

use super::extension::{parse_extensions, Extension};
use crate::Error;

/// NewSessionTicket (RFC 8446 Section 4.6.1).
///
/// ```text
/// struct {
///     uint32 ticket_lifetime;
///     uint32 ticket_age_add;
///     opaque ticket_nonce<0..255>;
///     opaque ticket<1..2^16-1>;
///     Extension extensions<0..2^16-2>;
/// } NewSessionTicket;
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct NewSessionTicket<'a> {
    pub ticket_lifetime: u32,
    pub ticket_age_add: u32,
    pub ticket_nonce: &'a [u8],
    pub ticket: &'a [u8],
    pub extensions: Vec<Extension>,
}

/// Seven days, the longest lifetime a server may announce.
pub const MAX_TICKET_LIFETIME: u32 = 604_800;

impl<'a> NewSessionTicket<'a> {
    #[allow(clippy::type_complexity)]
    fn parse_fixed(input: &'a [u8]) -> IResult<&'a [u8], (u32, u32, &'a [u8], &'a [u8])> {
        let (input, lifetime) = be_u32(input)?;
        let (input, age_add) = be_u32(input)?;
        let (input, nonce_len) = be_u8(input)?;
        let (input, nonce) = take(nonce_len)(input)?;
        let (input, ticket_len) = be_u16(input)?;
        let (input, ticket) = take(ticket_len)(input)?;
        Ok((input, (lifetime, age_add, nonce, ticket)))
    }

    pub fn parse(input: &'a [u8], base_offset: usize) -> Result<NewSessionTicket<'a>, Error> {
        let (rest, (ticket_lifetime, ticket_age_add, ticket_nonce, ticket)) =
            Self::parse_fixed(input)?;
        if ticket.is_empty() {
            return Err(Error::Decode("empty ticket".into()));
        }
        if ticket_lifetime > MAX_TICKET_LIFETIME {
            return Err(Error::illegal(format!(
                "ticket lifetime {} exceeds seven days",
                ticket_lifetime
            )));
        }
        let consumed = input.len() - rest.len();
        let extensions = parse_extensions(rest, base_offset + consumed)?;

        Ok(NewSessionTicket {
            ticket_lifetime,
            ticket_age_add,
            ticket_nonce,
            ticket,
            extensions,
        })
    }
}
