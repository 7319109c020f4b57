use crate::buffer::Buf;
use crate::Error;

/// Finished (RFC 8446 Section 4.4.4): the body is `verify_data`, whose
/// length is the hash length of the negotiated suite.
pub fn parse(body: &[u8], hash_len: usize) -> Result<&[u8], Error> {
    if body.len() != hash_len {
        return Err(Error::Decode(format!(
            "Finished of {} bytes, expected {}",
            body.len(),
            hash_len
        )));
    }
    Ok(body)
}

pub fn serialize(verify_data: &[u8], output: &mut Buf) {
    output.extend_from_slice(verify_data);
}
