use crate::buffer::Buf;
use crate::codec::BufExt;
use crate::types::PskKeyExchangeMode;
use crate::Error;

/// psk_key_exchange_modes (RFC 8446 Section 4.2.9), client side only.
pub fn serialize(modes: &[PskKeyExchangeMode], output: &mut Buf) -> Result<(), Error> {
    let mark = output.open_length(1);
    for mode in modes {
        output.put_u8(mode.as_u8());
    }
    output.close_length(mark)?;
    Ok(())
}
