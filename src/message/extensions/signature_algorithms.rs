use crate::buffer::Buf;
use crate::codec::BufExt;
use crate::types::SignatureScheme;
use crate::Error;

/// signature_algorithms (RFC 8446 Section 4.2.3).
///
/// Advertised for servers that insist on it. A PSK handshake never
/// carries a signature.
pub fn serialize(schemes: &[SignatureScheme], output: &mut Buf) -> Result<(), Error> {
    let mark = output.open_length(2);
    for scheme in schemes {
        output.put_u16(scheme.as_u16());
    }
    output.close_length(mark)?;
    Ok(())
}
