//! TLS 1.3 record layer (RFC 8446 Section 5).
//!
//! Outgoing records are collected in a flight buffer and written out by
//! [`RecordLayer::flush`]. A flight survives a `WouldBlock` so the next call
//! continues where the transport stopped. Incoming bytes accumulate until a
//! complete record is available.
//!
//! ```text
//! struct {
//!     ContentType opaque_type = application_data; /* 23 */
//!     ProtocolVersion legacy_record_version = 0x0303;
//!     uint16 length;
//!     opaque encrypted_record[TLSCiphertext.length];
//! } TLSCiphertext;
//!
//! struct {
//!     opaque content[TLSPlaintext.length];
//!     ContentType type;
//!     uint8 zeros[length_of_padding];
//! } TLSInnerPlaintext;
//! ```

use std::time::Duration;

use zeroize::Zeroize;

use crate::buffer::{Buf, TmpBuf};
use crate::codec::BufExt;
use crate::crypto::key_schedule::TrafficKeys;
use crate::crypto::{Aad, Cipher, Nonce, SupportedCipherSuite, NONCE_LEN, RECORD_HEADER_LEN};
use crate::socket::Transport;
use crate::types::{AlertDescription, ContentType};
use crate::Error;

/// Largest plaintext fragment, 2^14.
pub(crate) const MAX_PLAINTEXT_LEN: usize = 1 << 14;

/// Largest protected record body, 2^14 + 256.
pub(crate) const MAX_CIPHERTEXT_LEN: usize = MAX_PLAINTEXT_LEN + 256;

const LEGACY_RECORD_VERSION: u16 = 0x0303;

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = RECORD_HEADER_LEN + MAX_CIPHERTEXT_LEN;

/// One direction of record protection.
struct Protection {
    cipher: Box<dyn Cipher>,
    iv: [u8; NONCE_LEN],
    tag_len: usize,
    seq: u64,
}

impl Protection {
    fn new(suite: &dyn SupportedCipherSuite, keys: &TrafficKeys) -> Result<Self, Error> {
        let cipher = suite.create_cipher(&keys.key).map_err(Error::Internal)?;
        Ok(Protection {
            cipher,
            iv: keys.iv,
            tag_len: suite.tag_len(),
            seq: 0,
        })
    }

    /// Nonce for the next record. The sequence number must never wrap.
    fn next_nonce(&mut self) -> Result<Nonce, Error> {
        if self.seq == u64::MAX {
            return Err(Error::Internal("record sequence number exhausted".into()));
        }
        let nonce = Nonce::xor(&self.iv, self.seq);
        self.seq += 1;
        Ok(nonce)
    }
}

impl Drop for Protection {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

/// A decoded record. For protected records this is the inner content.
#[derive(Debug)]
pub(crate) struct Record {
    pub content_type: ContentType,
    pub fragment: Buf,
}

pub(crate) struct RecordLayer {
    read: Option<Protection>,
    write: Option<Protection>,
    flight: Buf,
    flushed: usize,
    incoming: Buf,
    max_fragment: usize,
}

impl RecordLayer {
    pub fn new(max_fragment: usize) -> Self {
        RecordLayer {
            read: None,
            write: None,
            flight: Buf::new(),
            flushed: 0,
            incoming: Buf::new(),
            max_fragment,
        }
    }

    /// Protect incoming records with new keys. The sequence number restarts.
    pub fn install_read(
        &mut self,
        suite: &dyn SupportedCipherSuite,
        keys: &TrafficKeys,
    ) -> Result<(), Error> {
        self.read = Some(Protection::new(suite, keys)?);
        Ok(())
    }

    /// Protect outgoing records with new keys. The sequence number restarts.
    pub fn install_write(
        &mut self,
        suite: &dyn SupportedCipherSuite,
        keys: &TrafficKeys,
    ) -> Result<(), Error> {
        self.write = Some(Protection::new(suite, keys)?);
        Ok(())
    }

    /// Go back to plaintext writes.
    pub fn clear_write(&mut self) {
        self.write = None;
    }

    pub fn is_read_protected(&self) -> bool {
        self.read.is_some()
    }

    pub fn is_write_protected(&self) -> bool {
        self.write.is_some()
    }

    /// True if bytes were read past the end of the last record returned.
    pub fn has_buffered_input(&self) -> bool {
        !self.incoming.is_empty()
    }

    pub fn has_unflushed(&self) -> bool {
        self.flushed < self.flight.len()
    }

    /// Drop keys and every buffered byte.
    pub fn reset(&mut self) {
        self.read = None;
        self.write = None;
        self.flight.zeroize();
        self.flushed = 0;
        self.incoming.zeroize();
    }

    pub fn set_max_fragment(&mut self, max_fragment: usize) {
        self.max_fragment = max_fragment;
    }

    /// Append `data` to the flight as one or more records of `content_type`.
    ///
    /// Empty application data becomes a single zero-length protected
    /// record. Empty handshake or alert data queues nothing.
    pub fn queue(&mut self, content_type: ContentType, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            if content_type == ContentType::ApplicationData && self.write.is_some() {
                self.push_record(content_type, data)?;
            }
            return Ok(());
        }
        for chunk in data.chunks(self.max_fragment) {
            self.push_record(content_type, chunk)?;
        }
        Ok(())
    }

    fn push_record(&mut self, content_type: ContentType, chunk: &[u8]) -> Result<(), Error> {
        match &mut self.write {
            Some(p) => {
                let len = chunk.len() + 1 + p.tag_len;
                let mut inner = Buf::with_capacity(len);
                inner.extend_from_slice(chunk);
                inner.push(content_type.as_u8());

                let nonce = p.next_nonce()?;
                p.cipher
                    .encrypt(&mut inner, Aad::new(len as u16), nonce)
                    .map_err(Error::Internal)?;

                self.flight.put_u8(ContentType::ApplicationData.as_u8());
                self.flight.put_u16(LEGACY_RECORD_VERSION);
                self.flight.put_u16(inner.len() as u16);
                self.flight.extend_from_slice(&inner);
            }
            None => {
                self.flight.put_u8(content_type.as_u8());
                self.flight.put_u16(LEGACY_RECORD_VERSION);
                self.flight.put_u16(chunk.len() as u16);
                self.flight.extend_from_slice(chunk);
            }
        }
        Ok(())
    }

    /// Write the pending flight. Partial progress is kept on error.
    pub fn flush(&mut self, writer: &mut dyn Transport, timeout: Duration) -> Result<(), Error> {
        while self.flushed < self.flight.len() {
            let n = writer.send(&self.flight[self.flushed..], timeout)?;
            if n == 0 {
                return Err(Error::Closed);
            }
            self.flushed += n;
        }
        self.flight.clear();
        self.flushed = 0;
        Ok(())
    }

    /// Read the next record, blocking on the transport as needed.
    ///
    /// ChangeCipherSpec records are passed up as-is. Protected records are
    /// opened and their padding removed.
    pub fn read_record(
        &mut self,
        reader: &mut dyn Transport,
        timeout: Duration,
    ) -> Result<Record, Error> {
        loop {
            if let Some(record) = self.next_buffered()? {
                return Ok(record);
            }

            let start = self.incoming.len();
            self.incoming.resize(start + READ_CHUNK, 0);
            let res = reader.recv(&mut self.incoming[start..], timeout);
            let n = *res.as_ref().unwrap_or(&0);
            self.incoming.truncate(start + n);
            if res? == 0 {
                return Err(Error::Closed);
            }
        }
    }

    fn next_buffered(&mut self) -> Result<Option<Record>, Error> {
        if self.incoming.len() < RECORD_HEADER_LEN {
            return Ok(None);
        }
        let content_type = ContentType::from_u8(self.incoming[0]);
        if self.incoming[1] != 0x03 {
            return Err(Error::Decode(format!(
                "record version {:02x}{:02x}",
                self.incoming[1], self.incoming[2]
            )));
        }
        let length = u16::from_be_bytes([self.incoming[3], self.incoming[4]]) as usize;
        if length > MAX_CIPHERTEXT_LEN {
            return Err(overflow(length));
        }
        if length == 0 {
            return Err(Error::Decode("empty record".into()));
        }
        if self.incoming.len() < RECORD_HEADER_LEN + length {
            return Ok(None);
        }

        let mut fragment = Buf::from_slice(&self.incoming[RECORD_HEADER_LEN..][..length]);
        self.incoming.consume(RECORD_HEADER_LEN + length);

        let record = match (content_type, &mut self.read) {
            (ContentType::ChangeCipherSpec, _) => {
                if fragment[..] != [1] {
                    return Err(Error::Decode("change_cipher_spec body".into()));
                }
                Record {
                    content_type,
                    fragment,
                }
            }
            (ContentType::ApplicationData, Some(p)) => {
                let nonce = p.next_nonce()?;
                let mut tmp = TmpBuf::new(&mut fragment);
                p.cipher
                    .decrypt(&mut tmp, Aad::new(length as u16), nonce)
                    .map_err(|_| Error::Crypto {
                        alert: AlertDescription::BadRecordMac,
                    })?;
                let plain_len = tmp.len();
                fragment.truncate(plain_len);
                if fragment.len() > MAX_PLAINTEXT_LEN + 1 {
                    return Err(overflow(fragment.len()));
                }
                let content_type = strip_padding(&mut fragment)?;
                Record {
                    content_type,
                    fragment,
                }
            }
            (_, Some(_)) => {
                return Err(Error::unexpected(format!(
                    "plaintext {:?} record after keys were installed",
                    content_type
                )));
            }
            (ContentType::Handshake | ContentType::Alert, None) => {
                if length > MAX_PLAINTEXT_LEN {
                    return Err(overflow(length));
                }
                Record {
                    content_type,
                    fragment,
                }
            }
            (_, None) => {
                return Err(Error::unexpected(format!(
                    "{:?} record before keys were installed",
                    content_type
                )));
            }
        };

        trace!(
            "Record {:?} len {}",
            record.content_type,
            record.fragment.len()
        );
        Ok(Some(record))
    }

    /// Move the pending flight into the inbound buffer, as if the peer had
    /// sent it.
    #[cfg(test)]
    pub fn loop_back(&mut self) {
        let flight = std::mem::take(&mut self.flight);
        self.incoming.extend_from_slice(&flight);
        self.flushed = 0;
    }

    #[cfg(test)]
    pub fn read_buffered(&mut self) -> Result<Option<Record>, Error> {
        self.next_buffered()
    }
}

fn overflow(length: usize) -> Error {
    Error::protocol(
        AlertDescription::RecordOverflow,
        format!("record length {}", length),
    )
}

/// Remove zero padding and the trailing content type.
fn strip_padding(inner: &mut Buf) -> Result<ContentType, Error> {
    let pos = inner
        .iter()
        .rposition(|b| *b != 0)
        .ok_or_else(|| Error::unexpected("inner plaintext has no content type"))?;
    let content_type = ContentType::from_u8(inner[pos]);
    inner.truncate(pos);
    match content_type {
        ContentType::Handshake | ContentType::Alert | ContentType::ApplicationData => {
            Ok(content_type)
        }
        _ => Err(Error::unexpected(format!(
            "inner content type {:?}",
            content_type
        ))),
    }
}
