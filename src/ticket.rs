//! Resumption tickets and their persistence format.
//!
//! ```text
//! u32 lifetime | u32 age_add | u32 max_early_data |
//! bytes[hash_len] master_key | u16 cipher_id | u16 ticket_len |
//! bytes[ticket_len] ticket
//! ```
//!
//! `hash_len` follows from the cipher id, which sits after the key. The
//! parser therefore tries each hash length and keeps the one whose cipher
//! id agrees.

use std::fmt;

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32};
use nom::IResult;
use zeroize::Zeroize;

use crate::buffer::Buf;
use crate::codec::BufExt;
use crate::types::{CipherSuite, HashAlgorithm};
use crate::Error;

/// A session ticket the server handed out, together with the PSK it
/// unlocks.
#[derive(Clone, PartialEq, Eq)]
pub struct Ticket {
    lifetime: u32,
    age_add: u32,
    max_early_data: u32,
    master_key: Buf,
    cipher_suite: CipherSuite,
    ticket: Vec<u8>,
}

impl Ticket {
    pub(crate) fn new(
        lifetime: u32,
        age_add: u32,
        max_early_data: u32,
        master_key: Buf,
        cipher_suite: CipherSuite,
        ticket: &[u8],
    ) -> Self {
        Ticket {
            lifetime,
            age_add,
            max_early_data,
            master_key,
            cipher_suite,
            ticket: ticket.to_vec(),
        }
    }

    /// Lifetime in seconds announced by the server.
    pub fn lifetime(&self) -> u32 {
        self.lifetime
    }

    /// Value added to the ticket age to obscure it.
    pub fn age_add(&self) -> u32 {
        self.age_add
    }

    /// Most 0-RTT bytes the server accepts with this ticket. Zero disables
    /// early data.
    pub fn max_early_data(&self) -> u32 {
        self.max_early_data
    }

    /// The resumption PSK.
    pub fn master_key(&self) -> &[u8] {
        &self.master_key
    }

    /// Suite of the connection that issued the ticket.
    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// The opaque ticket, sent back as the PSK identity.
    pub fn ticket(&self) -> &[u8] {
        &self.ticket
    }

    pub(crate) fn hash_algorithm(&self) -> HashAlgorithm {
        // A ticket is only ever built for a suite with a hash.
        self.cipher_suite
            .hash_algorithm()
            .unwrap_or(HashAlgorithm::SHA256)
    }

    /// obfuscated_ticket_age for an age of zero.
    ///
    /// The persistence format carries no issue time, so the real age is
    /// unknown and reported as zero.
    pub(crate) fn obfuscated_age(&self) -> u32 {
        self.age_add
    }

    /// Serialize into the persistence format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Buf::with_capacity(16 + self.master_key.len() + self.ticket.len());
        out.put_u32(self.lifetime);
        out.put_u32(self.age_add);
        out.put_u32(self.max_early_data);
        out.extend_from_slice(&self.master_key);
        out.put_u16(self.cipher_suite.as_u16());
        out.put_u16(self.ticket.len() as u16);
        out.extend_from_slice(&self.ticket);
        out.into_vec()
    }

    /// Parse the persistence format.
    ///
    /// The input must be consumed exactly. Unknown cipher ids are rejected.
    pub fn from_bytes(data: &[u8]) -> Result<Ticket, Error> {
        for hash in HashAlgorithm::all() {
            if let Ok((rest, ticket)) = parse_with_hash(data, *hash) {
                if rest.is_empty() && ticket.cipher_suite.hash_algorithm() == Some(*hash) {
                    return Ok(ticket);
                }
            }
        }
        Err(Error::InvalidTicket(
            "malformed ticket or unknown cipher suite".into(),
        ))
    }
}

fn parse_with_hash(input: &[u8], hash: HashAlgorithm) -> IResult<&[u8], Ticket> {
    let (input, lifetime) = be_u32(input)?;
    let (input, age_add) = be_u32(input)?;
    let (input, max_early_data) = be_u32(input)?;
    let (input, master_key) = take(hash.output_len())(input)?;
    let (input, cipher_suite) = CipherSuite::parse(input)?;
    let (input, ticket_len) = be_u16(input)?;
    let (input, ticket) = take(ticket_len)(input)?;
    if ticket.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::LengthValue,
        )));
    }
    Ok((
        input,
        Ticket::new(
            lifetime,
            age_add,
            max_early_data,
            Buf::from_slice(master_key),
            cipher_suite,
            ticket,
        ),
    ))
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.master_key.zeroize();
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("lifetime", &self.lifetime)
            .field("max_early_data", &self.max_early_data)
            .field("cipher_suite", &self.cipher_suite)
            .field("ticket_len", &self.ticket.len())
            .finish()
    }
}
