//! TLS 1.3 handshake message parsing and serialization.
//!
//! Parsers take the message body plus its offset in the enclosing buffer so
//! that extension data can be referenced by range instead of copied.

mod client_hello;
mod encrypted_extensions;
pub mod extension;
pub mod extensions;
pub mod finished;
mod handshake;
mod key_update;
mod new_session_ticket;
mod random;
mod server_hello;

pub use client_hello::ClientHello;
pub use encrypted_extensions::EncryptedExtensions;
pub use extension::{ExtensionTable, ExtensionType, SendHandler};
pub use handshake::{write_message, HandshakeReader, Message, HANDSHAKE_HEADER_LEN};
pub use key_update::KeyUpdateRequest;
pub use new_session_ticket::NewSessionTicket;
pub use random::Random;
pub use server_hello::ServerHello;
