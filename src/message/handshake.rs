use nom::number::complete::{be_u24, be_u8};
use nom::IResult;

use crate::buffer::Buf;
use crate::codec::BufExt;
use crate::types::HandshakeType;
use crate::Error;

/// msg_type (1) + length (3).
pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// Upper bound of a single handshake message we are willing to buffer.
pub const MAX_HANDSHAKE_LEN: usize = 1 << 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: HandshakeType,
    pub length: u32,
}

impl Header {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Header> {
        let (input, msg_type) = be_u8(input)?;
        let (input, length) = be_u24(input)?;
        Ok((
            input,
            Header {
                msg_type: HandshakeType::from_u8(msg_type),
                length,
            },
        ))
    }
}

/// Append a complete handshake message, back-writing its length.
pub fn write_message(
    out: &mut Buf,
    msg_type: HandshakeType,
    body: impl FnOnce(&mut Buf) -> Result<(), Error>,
) -> Result<(), Error> {
    out.put_u8(msg_type.as_u8());
    let mark = out.open_length(3);
    body(out)?;
    out.close_length(mark)?;
    Ok(())
}

/// A complete handshake message: header and body bytes as sent on the wire.
#[derive(Debug)]
pub struct Message {
    pub msg_type: HandshakeType,
    /// Full encoding including the 4 byte header, as hashed into the transcript.
    pub bytes: Buf,
}

impl Message {
    pub fn body(&self) -> &[u8] {
        &self.bytes[HANDSHAKE_HEADER_LEN..]
    }
}

/// Reassembles handshake messages from record payloads.
///
/// A record may carry several messages and a message may span several
/// records.
#[derive(Debug, Default)]
pub struct HandshakeReader {
    buf: Buf,
}

impl HandshakeReader {
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// True when no partial message is pending.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Pop the next complete message, if one is buffered.
    pub fn next_message(&mut self) -> Result<Option<Message>, Error> {
        if self.buf.len() < HANDSHAKE_HEADER_LEN {
            return Ok(None);
        }
        let (_, header) = Header::parse(&self.buf)?;
        let length = header.length as usize;
        if length > MAX_HANDSHAKE_LEN {
            return Err(Error::Decode(format!(
                "{:?} of {} bytes exceeds limit",
                header.msg_type, length
            )));
        }
        let total = HANDSHAKE_HEADER_LEN + length;
        if self.buf.len() < total {
            return Ok(None);
        }

        let bytes = Buf::from_slice(&self.buf[..total]);
        self.buf.consume(total);
        Ok(Some(Message {
            msg_type: header.msg_type,
            bytes,
        }))
    }
}
