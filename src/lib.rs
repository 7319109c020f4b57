//! psktls: a client-side TLS 1.3 engine for pre-shared keys.
//!
//! Authenticates purely through a PSK, either an external key looked up from
//! a hint or a resumption ticket from an earlier session. Certificates are
//! never involved. Supports `psk_ke` and `psk_dhe_ke`, HelloRetryRequest,
//! 0-RTT early data, KeyUpdate, NewSessionTicket and the exporter.
//!
//! ```no_run
//! use std::net::TcpStream;
//! use std::sync::Arc;
//!
//! use psktls::{Config, Connection};
//!
//! # fn main() -> Result<(), psktls::Error> {
//! let config = Arc::new(Config::builder().server_name("sensor.local").build()?);
//!
//! let mut conn = Connection::new(config);
//! conn.set_stream(TcpStream::connect("192.0.2.10:4433")?);
//! conn.set_psk_hint(b"client-1")?;
//! conn.set_psk_callback(|_| Some(vec![0x0b; 32]));
//! conn.set_new_ticket_callback(|ticket| {
//!     // Persist ticket.to_bytes() to resume later.
//!     let _ = ticket.to_bytes();
//! });
//!
//! conn.connect()?;
//! conn.send(b"hello")?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]
// #![deny(missing_docs)]

#[macro_use]
extern crate log;

mod buffer;
mod codec;
mod config;
mod connection;
pub mod crypto;
mod error;
mod handshake;
pub(crate) mod message;
mod record;
mod socket;
mod ticket;
mod transcript;
mod types;

pub use config::{Config, ConfigBuilder};
pub use connection::{Connection, NewTicketCallback, PskCallback};
pub use error::Error;
pub use handshake::State;
pub use socket::Transport;
pub use ticket::Ticket;
pub use types::{AlertDescription, AlertLevel, CipherSuite, HashAlgorithm, NamedGroup};
pub use types::{ContentType, HandshakeType, ProtocolVersion, PskKeyExchangeMode};
