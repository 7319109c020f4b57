use crate::buffer::Buf;
use crate::codec::BufExt;
use crate::Error;

/// KeyUpdateRequest (RFC 8446 Section 4.6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdateRequest {
    UpdateNotRequested,
    UpdateRequested,
}

impl KeyUpdateRequest {
    pub fn parse(body: &[u8]) -> Result<KeyUpdateRequest, Error> {
        if body.len() != 1 {
            return Err(Error::Decode(format!("KeyUpdate of {} bytes", body.len())));
        }
        match body[0] {
            0 => Ok(KeyUpdateRequest::UpdateNotRequested),
            1 => Ok(KeyUpdateRequest::UpdateRequested),
            v => Err(Error::illegal(format!("KeyUpdate request value {}", v))),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            KeyUpdateRequest::UpdateNotRequested => 0,
            KeyUpdateRequest::UpdateRequested => 1,
        }
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.put_u8(self.as_u8());
    }
}
