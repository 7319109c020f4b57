use nom::number::complete::be_u16;

use crate::buffer::Buf;
use crate::codec::BufExt;
use crate::types::NamedGroup;
use crate::Error;

/// NamedGroupList (RFC 8446 Section 4.2.7).
pub fn serialize(groups: &[NamedGroup], output: &mut Buf) -> Result<(), Error> {
    let mark = output.open_length(2);
    for group in groups {
        output.put_u16(group.as_u16());
    }
    output.close_length(mark)?;
    Ok(())
}

/// A server may list its groups in EncryptedExtensions. The list is only
/// checked for well-formedness.
pub fn parse(data: &[u8]) -> Result<Vec<NamedGroup>, Error> {
    let (mut rest, len) = be_u16::<_, nom::error::Error<&[u8]>>(data)?;
    if len as usize != rest.len() || len % 2 != 0 {
        return Err(Error::Decode("supported_groups length".into()));
    }
    let mut groups = Vec::with_capacity(rest.len() / 2);
    while !rest.is_empty() {
        let (r, group) = NamedGroup::parse(rest)?;
        groups.push(group);
        rest = r;
    }
    Ok(groups)
}
