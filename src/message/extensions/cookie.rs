use nom::bytes::complete::take;
use nom::number::complete::be_u16;

use crate::buffer::Buf;
use crate::codec::{expect_empty, BufExt};
use crate::Error;

/// Cookie extension (RFC 8446 Section 4.2.2).
///
/// `opaque cookie<1..2^16-1>`. The inner length must equal the extension
/// length minus the two length bytes.
pub fn parse(data: &[u8]) -> Result<&[u8], Error> {
    let (rest, len) = be_u16::<_, nom::error::Error<&[u8]>>(data)?;
    if len as usize != rest.len() {
        return Err(Error::Decode(format!(
            "cookie length {} but extension carries {}",
            len,
            rest.len()
        )));
    }
    if len == 0 {
        return Err(Error::Decode("empty cookie".into()));
    }
    let (rest, cookie) = take::<_, _, nom::error::Error<&[u8]>>(len)(rest)?;
    expect_empty(rest, "cookie")?;
    Ok(cookie)
}

/// Echo a cookie back in the second ClientHello.
pub fn serialize(cookie: &[u8], output: &mut Buf) -> Result<(), Error> {
    output.put_vec(2, cookie)
}
