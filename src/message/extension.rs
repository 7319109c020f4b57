use std::ops::Range;

use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::codec::BufExt;
use crate::types::AlertDescription;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub extension_data_range: Range<usize>,
}

impl Extension {
    pub fn parse(input: &[u8], base_offset: usize) -> IResult<&[u8], Extension> {
        let original_input = input;
        let (input, extension_type) = ExtensionType::parse(input)?;
        let (input, extension_length) = be_u16(input)?;
        let (input, extension_data_slice) = take(extension_length)(input)?;

        // Calculate absolute range in root buffer
        let relative_offset =
            extension_data_slice.as_ptr() as usize - original_input.as_ptr() as usize;
        let start = base_offset + relative_offset;
        let end = start + extension_data_slice.len();

        Ok((
            input,
            Extension {
                extension_type,
                extension_data_range: start..end,
            },
        ))
    }

    pub fn extension_data<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.extension_data_range.clone()]
    }
}

/// Parse an extension block: `u16 length` followed by extensions.
///
/// The length must cover exactly the rest of `input`, which is the tail of
/// the enclosing message.
pub fn parse_extensions(input: &[u8], base_offset: usize) -> Result<Vec<Extension>, Error> {
    let (rest, block_len) = be_u16::<_, nom::error::Error<&[u8]>>(input)?;
    if block_len as usize != rest.len() {
        return Err(Error::Decode(format!(
            "extension block length {} but {} bytes remain",
            block_len,
            rest.len()
        )));
    }

    let mut extensions = Vec::new();
    let mut current = rest;
    let mut offset = base_offset + 2;
    while !current.is_empty() {
        let before = current.len();
        let (next, ext) = Extension::parse(current, offset)?;
        offset += before - next.len();
        extensions.push(ext);
        current = next;
    }
    Ok(extensions)
}

/// Receive handler: validates one extension body and applies it to `S`.
pub type RecvHandler<S> = fn(&mut S, &[u8]) -> Result<(), Error>;

/// Send handler: writes one extension body to `out`, or returns `false`
/// to leave the extension out of this message.
pub type SendHandler<S> = fn(&mut S, &mut Buf) -> Result<bool, Error>;

/// Dispatch table for one message context, scanned linearly by id.
pub struct ExtensionTable<S: 'static> {
    pub context: &'static str,
    pub handlers: &'static [(ExtensionType, RecvHandler<S>)],
    /// Skip ids that have no handler instead of failing.
    pub skip_unknown: bool,
}

impl<S> ExtensionTable<S> {
    fn lookup(&self, ty: ExtensionType) -> Option<RecvHandler<S>> {
        self.handlers
            .iter()
            .find(|(t, _)| *t == ty)
            .map(|(_, handler)| *handler)
    }

    /// Run every extension of a parsed block through the table.
    pub fn dispatch(&self, state: &mut S, buf: &[u8], extensions: &[Extension]) -> Result<(), Error> {
        for (i, ext) in extensions.iter().enumerate() {
            let ty = ext.extension_type;
            if extensions[..i].iter().any(|e| e.extension_type == ty) {
                return Err(Error::illegal(format!(
                    "duplicate {:?} extension in {}",
                    ty, self.context
                )));
            }

            match self.lookup(ty) {
                Some(handler) => {
                    trace!("{} extension {:?}", self.context, ty);
                    handler(state, ext.extension_data(buf))?;
                }
                None if self.skip_unknown => {
                    trace!("{} skipping extension {:?}", self.context, ty);
                }
                None => {
                    return Err(Error::protocol(
                        AlertDescription::UnsupportedExtension,
                        format!("{:?} extension not allowed in {}", ty, self.context),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Write every extension of a send table, in table order.
pub fn write_extensions<S>(
    table: &[(ExtensionType, SendHandler<S>)],
    state: &mut S,
    out: &mut Buf,
) -> Result<(), Error> {
    for (ty, handler) in table {
        let start = out.len();
        out.put_u16(ty.as_u16());
        let mark = out.open_length(2);
        if handler(state, out)? {
            out.close_length(mark)?;
        } else {
            out.truncate(start);
        }
    }
    Ok(())
}

/// Check that an extension body has exactly `expected` bytes.
pub fn expect_len(data: &[u8], expected: usize, ty: ExtensionType) -> Result<(), Error> {
    if data.len() != expected {
        return Err(Error::Decode(format!(
            "{:?} extension length {} expected {}",
            ty,
            data.len(),
            expected
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionType {
    ServerName,
    MaxFragmentLength,
    SupportedGroups,
    SignatureAlgorithms,
    Padding,
    SessionTicket,
    PreSharedKey,
    EarlyData,
    SupportedVersions,
    Cookie,
    PskKeyExchangeModes,
    CertificateAuthorities,
    PostHandshakeAuth,
    SignatureAlgorithmsCert,
    KeyShare,
    Unknown(u16),
}

impl Default for ExtensionType {
    fn default() -> Self {
        Self::Unknown(0xFFFF)
    }
}

impl ExtensionType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => ExtensionType::ServerName,
            0x0001 => ExtensionType::MaxFragmentLength,
            0x000A => ExtensionType::SupportedGroups,
            0x000D => ExtensionType::SignatureAlgorithms,
            0x0015 => ExtensionType::Padding,
            0x0023 => ExtensionType::SessionTicket,
            0x0029 => ExtensionType::PreSharedKey,
            0x002A => ExtensionType::EarlyData,
            0x002B => ExtensionType::SupportedVersions,
            0x002C => ExtensionType::Cookie,
            0x002D => ExtensionType::PskKeyExchangeModes,
            0x002F => ExtensionType::CertificateAuthorities,
            0x0031 => ExtensionType::PostHandshakeAuth,
            0x0032 => ExtensionType::SignatureAlgorithmsCert,
            0x0033 => ExtensionType::KeyShare,
            _ => ExtensionType::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ExtensionType::ServerName => 0x0000,
            ExtensionType::MaxFragmentLength => 0x0001,
            ExtensionType::SupportedGroups => 0x000A,
            ExtensionType::SignatureAlgorithms => 0x000D,
            ExtensionType::Padding => 0x0015,
            ExtensionType::SessionTicket => 0x0023,
            ExtensionType::PreSharedKey => 0x0029,
            ExtensionType::EarlyData => 0x002A,
            ExtensionType::SupportedVersions => 0x002B,
            ExtensionType::Cookie => 0x002C,
            ExtensionType::PskKeyExchangeModes => 0x002D,
            ExtensionType::CertificateAuthorities => 0x002F,
            ExtensionType::PostHandshakeAuth => 0x0031,
            ExtensionType::SignatureAlgorithmsCert => 0x0032,
            ExtensionType::KeyShare => 0x0033,
            ExtensionType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ExtensionType> {
        let (input, value) = be_u16(input)?;
        Ok((input, ExtensionType::from_u16(value)))
    }
}
