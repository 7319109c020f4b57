use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use zeroize::Zeroize;

use crate::buffer::Buf;
use crate::config::Config;
use crate::crypto::SupportedCipherSuite;
use crate::handshake::post_handshake;
use crate::handshake::{HandshakeState, SessionSecrets, State};
use crate::message::{HandshakeReader, KeyUpdateRequest, Message};
use crate::record::{Record, RecordLayer};
use crate::socket::{Transport, Transports};
use crate::ticket::Ticket;
use crate::types::{AlertDescription, AlertLevel, CipherSuite, ContentType};
use crate::Error;

/// Looks up the PSK for a hint. Returning `None` leaves the external PSK out.
pub type PskCallback = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// Receives every ticket the server issues.
pub type NewTicketCallback = Box<dyn FnMut(&Ticket) + Send>;

/// 0-RTT payload for the handshake in progress.
pub(crate) struct EarlyData {
    pub payload: Buf,
    pub sent: usize,
}

impl Drop for EarlyData {
    fn drop(&mut self) {
        self.payload.zeroize();
    }
}

/// A client-side TLS 1.3 connection authenticated by a pre-shared key.
///
/// The connection owns its transport and drives it synchronously. Every
/// blocking call waits at most the socket timeout on each transport read
/// and write. [`Error::WouldBlock`] and [`Error::Timeout`] leave the state
/// intact and the call can be repeated; any other error resets the
/// connection to [`State::Init`].
///
/// ```no_run
/// # use std::net::TcpStream;
/// # use std::sync::Arc;
/// # use psktls::{Config, Connection};
/// # fn main() -> Result<(), psktls::Error> {
/// let config = Arc::new(Config::builder().build()?);
/// let mut conn = Connection::new(config);
///
/// conn.set_stream(TcpStream::connect("127.0.0.1:4433")?);
/// conn.set_psk_hint(b"device-17")?;
/// conn.set_psk_callback(|_hint| Some(vec![0x42; 32]));
///
/// conn.connect()?;
/// conn.send(b"ping")?;
///
/// let mut buf = [0u8; 64];
/// let n = conn.recv(&mut buf)?;
/// # let _ = n;
/// conn.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    pub(crate) config: Arc<Config>,
    pub(crate) state: State,

    /// Alert that ended the session, if any.
    pub(crate) shutdown: Option<AlertDescription>,

    pub(crate) transports: Transports,
    pub(crate) socket_timeout: Duration,

    pub(crate) record: RecordLayer,
    pub(crate) reader: HandshakeReader,

    /// Scratch state, present only while the handshake runs.
    pub(crate) handshake: Option<Box<HandshakeState>>,
    pub(crate) session: Option<SessionSecrets>,
    pub(crate) cipher_suite: Option<&'static dyn SupportedCipherSuite>,

    pub(crate) ticket: Option<Ticket>,
    pub(crate) psk_hint: Option<Buf>,
    pub(crate) psk_callback: Option<PskCallback>,
    pub(crate) new_ticket_callback: Option<NewTicketCallback>,

    pub(crate) early_data: Option<EarlyData>,
    pub(crate) early_data_accepted: bool,

    /// Decrypted application data not yet handed to the caller.
    pub(crate) app_data: Buf,
}

impl Connection {
    /// Create a connection in [`State::Init`].
    pub fn new(config: Arc<Config>) -> Connection {
        Connection {
            socket_timeout: config.socket_timeout(),
            record: RecordLayer::new(config.max_fragment_length()),
            config,
            state: State::Init,
            shutdown: None,
            transports: Transports::None,
            reader: HandshakeReader::default(),
            handshake: None,
            session: None,
            cipher_suite: None,
            ticket: None,
            psk_hint: None,
            psk_callback: None,
            new_ticket_callback: None,
            early_data: None,
            early_data_accepted: false,
            app_data: Buf::new(),
        }
    }

    // ===== Setup =====

    /// Use separate transports for reading and writing.
    pub fn set_socket<R, W>(&mut self, reader: R, writer: W)
    where
        R: Transport + 'static,
        W: Transport + 'static,
    {
        self.transports = Transports::Split {
            reader: Box::new(reader),
            writer: Box::new(writer),
        };
    }

    /// Use one duplex stream for both directions.
    pub fn set_stream<T: Transport + 'static>(&mut self, stream: T) {
        self.transports = Transports::Duplex(Box::new(stream));
    }

    /// Override the configured per-operation timeout.
    pub fn set_socket_timeout(&mut self, timeout: Duration) {
        self.socket_timeout = timeout;
    }

    /// Identity sent for the external PSK, resolved through the PSK callback.
    pub fn set_psk_hint(&mut self, hint: &[u8]) -> Result<(), Error> {
        if hint.is_empty() {
            return Err(Error::InvalidArgument("empty PSK hint"));
        }
        if hint.len() > u16::MAX as usize {
            return Err(Error::InvalidArgument("PSK hint longer than 65535 bytes"));
        }
        self.psk_hint = Some(Buf::from_slice(hint));
        Ok(())
    }

    /// Register the lookup from PSK hint to key.
    pub fn set_psk_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.psk_callback = Some(Box::new(callback));
    }

    /// Resume with a ticket in the persistence format of [`Ticket::to_bytes`].
    pub fn set_ticket(&mut self, data: &[u8]) -> Result<(), Error> {
        self.ticket = Some(Ticket::from_bytes(data)?);
        Ok(())
    }

    /// Register a callback for tickets received after the handshake.
    ///
    /// Also makes the ClientHello ask for tickets.
    pub fn set_new_ticket_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&Ticket) + Send + 'static,
    {
        self.new_ticket_callback = Some(Box::new(callback));
    }

    // ===== Handshake =====

    /// Run the handshake until the connection is established.
    ///
    /// Safe to call again after [`Error::WouldBlock`] or [`Error::Timeout`].
    /// Returns immediately once established.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.state == State::Init {
            self.shutdown = None;
        }
        match self.make_progress() {
            Ok(()) => Ok(()),
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Start the handshake with 0-RTT data.
    ///
    /// Requires a ticket whose max_early_data covers `data`, and a
    /// connection in [`State::Init`]. Returns the number of early bytes the
    /// server accepted, 0 if it rejected them. Rejected data must be sent
    /// again with [`Connection::send`]. On a retryable error continue with
    /// [`Connection::connect`].
    pub fn send_early_data(&mut self, data: &[u8]) -> Result<usize, Error> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("empty early data"));
        }
        let ticket = self
            .ticket
            .as_ref()
            .ok_or(Error::InvalidArgument("early data needs a ticket"))?;
        if data.len() > ticket.max_early_data() as usize {
            return Err(Error::InvalidArgument(
                "early data exceeds the ticket's max_early_data",
            ));
        }
        if self.state != State::Init {
            return Err(Error::InvalidArgument("handshake already started"));
        }

        self.early_data = Some(EarlyData {
            payload: Buf::from_slice(data),
            sent: 0,
        });
        self.connect()?;

        let sent = self.early_data.take().map(|e| e.sent).unwrap_or(0);
        Ok(if self.early_data_accepted { sent } else { 0 })
    }

    fn make_progress(&mut self) -> Result<(), Error> {
        loop {
            if self.shutdown.is_some() && self.state != State::Init {
                return Err(Error::ShutDown);
            }

            let prev_state = self.state;
            let new_state = prev_state.make_progress(self)?;
            if prev_state != new_state {
                self.state = new_state;
                trace!("{:?} -> {:?}", prev_state, new_state);
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Send an alert for a fatal error and drop back to `Init`.
    fn fail(&mut self, error: Error) -> Error {
        if self.state != State::Init {
            warn!("Connection failed in {:?}: {}", self.state, error);
            if let Some(alert) = error.alert() {
                let _ = self.send_alert(AlertLevel::Fatal, alert);
            }
        } else {
            debug!("Connection setup failed: {}", error);
        }
        self.reset();
        error
    }

    fn reset(&mut self) {
        self.handshake = None;
        self.session = None;
        self.record.reset();
        self.reader.clear();
        self.app_data.zeroize();
        self.early_data = None;
        self.early_data_accepted = false;
        self.cipher_suite = None;
        self.state = State::Init;
    }

    // ===== Application data =====

    /// Encrypt and send `data`, returning the number of bytes accepted.
    ///
    /// If the transport stalls after the records were built, the rest of
    /// the flight goes out with the next call.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.require_open()?;
        match self.send_inner(data) {
            Ok(n) => Ok(n),
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn send_inner(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.flush()?;
        self.record.queue(ContentType::ApplicationData, data)?;
        match self.flush() {
            Ok(()) => {}
            Err(e) if e.is_retryable() => trace!("Application data left in flight: {}", e),
            Err(e) => return Err(e),
        }
        Ok(data.len())
    }

    /// Receive decrypted application data into `buf`.
    ///
    /// Handles NewSessionTicket and KeyUpdate messages on the way. Returns
    /// `Ok(0)` once the peer has sent close_notify.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.state != State::Established {
            return Err(Error::NotEstablished);
        }
        if self.shutdown.is_some() {
            return Ok(0);
        }
        match self.recv_inner(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn recv_inner(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        // Buffered plaintext is served without touching either transport.
        if let Some(n) = self.take_app_data(buf) {
            return Ok(n);
        }
        self.flush()?;

        loop {
            if let Some(n) = self.take_app_data(buf) {
                return Ok(n);
            }

            let record = self.read_record()?;
            match record.content_type {
                ContentType::ApplicationData => {
                    self.app_data.extend_from_slice(&record.fragment);
                }
                ContentType::Handshake => {
                    self.reader.push(&record.fragment);
                    while let Some(msg) = self.reader.next_message()? {
                        post_handshake::handle_message(self, msg)?;
                    }
                    self.flush()?;
                }
                ContentType::Alert => {
                    let error = self.on_alert(&record.fragment);
                    if self.shutdown == Some(AlertDescription::CloseNotify) {
                        return Ok(0);
                    }
                    return Err(error);
                }
                other => {
                    return Err(Error::unexpected(format!(
                        "{:?} record after the handshake",
                        other
                    )));
                }
            }
        }
    }

    fn take_app_data(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.app_data.is_empty() {
            return None;
        }
        let n = buf.len().min(self.app_data.len());
        buf[..n].copy_from_slice(&self.app_data[..n]);
        self.app_data[..n].zeroize();
        self.app_data.consume(n);
        Some(n)
    }

    /// Bytes already decrypted and waiting to be read.
    pub fn pending(&self) -> usize {
        self.app_data.len()
    }

    // ===== Established session =====

    /// Rotate our traffic key, optionally asking the peer to rotate too.
    pub fn key_update(&mut self, request_peer_update: bool) -> Result<(), Error> {
        self.require_open()?;
        let request = if request_peer_update {
            KeyUpdateRequest::UpdateRequested
        } else {
            KeyUpdateRequest::UpdateNotRequested
        };
        match self.key_update_inner(request) {
            Ok(()) => Ok(()),
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn key_update_inner(&mut self, request: KeyUpdateRequest) -> Result<(), Error> {
        self.flush()?;
        post_handshake::update_write_key(self, request)?;
        self.flush()
    }

    /// Fill `out` with keying material (RFC 8446 Section 7.5).
    pub fn export_key(&self, label: &[u8], context: &[u8], out: &mut [u8]) -> Result<(), Error> {
        if out.is_empty() {
            return Err(Error::InvalidArgument("empty export buffer"));
        }
        let session = match (&self.session, self.state) {
            (Some(session), State::Established) => session,
            _ => return Err(Error::NotEstablished),
        };
        let mut key = session.key_schedule.export(
            &session.exporter_master,
            label,
            context,
            out.len(),
        )?;
        out.copy_from_slice(&key);
        key.zeroize();
        Ok(())
    }

    /// Send close_notify and return to [`State::Init`].
    ///
    /// The connection is reset even if the alert cannot be written.
    pub fn shutdown(&mut self) -> Result<(), Error> {
        let result = if self.state != State::Init {
            self.send_alert(AlertLevel::Warning, AlertDescription::CloseNotify)
        } else {
            Ok(())
        };
        debug!("Shutting down from {:?}", self.state);
        self.reset();
        self.shutdown = Some(AlertDescription::CloseNotify);
        result
    }

    // ===== Status =====

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }

    /// Negotiated cipher suite, once the ServerHello is processed.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite.map(|cs| cs.suite())
    }

    /// The alert that ended the session, if it has ended.
    pub fn shutdown_reason(&self) -> Option<AlertDescription> {
        self.shutdown
    }

    /// Whether the server accepted the 0-RTT data of the last handshake.
    pub fn early_data_accepted(&self) -> bool {
        self.early_data_accepted
    }

    // ===== Record plumbing =====

    fn require_open(&self) -> Result<(), Error> {
        if self.state != State::Established {
            return Err(Error::NotEstablished);
        }
        if self.shutdown.is_some() {
            return Err(Error::ShutDown);
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<(), Error> {
        let writer = self.transports.writer().ok_or(Error::NoTransport)?;
        self.record.flush(writer, self.socket_timeout)
    }

    pub(crate) fn read_record(&mut self) -> Result<Record, Error> {
        let reader = self.transports.reader().ok_or(Error::NoTransport)?;
        self.record.read_record(reader, self.socket_timeout)
    }

    /// Next complete handshake message while the handshake runs.
    pub(crate) fn next_handshake_message(&mut self) -> Result<Message, Error> {
        loop {
            if let Some(msg) = self.reader.next_message()? {
                trace!("Received {:?}", msg.msg_type);
                return Ok(msg);
            }

            let record = self.read_record()?;
            match record.content_type {
                ContentType::Handshake => self.reader.push(&record.fragment),
                ContentType::ChangeCipherSpec => trace!("Ignoring change_cipher_spec"),
                ContentType::Alert => return Err(self.on_alert(&record.fragment)),
                other => {
                    return Err(Error::unexpected(format!(
                        "{:?} record during the handshake",
                        other
                    )));
                }
            }
        }
    }

    fn on_alert(&mut self, fragment: &[u8]) -> Error {
        if fragment.len() != 2 {
            return Error::Decode(format!("alert of {} bytes", fragment.len()));
        }
        let level = AlertLevel::from_u8(fragment[0]);
        let description = AlertDescription::from_u8(fragment[1]);
        self.shutdown = Some(description);
        if description == AlertDescription::CloseNotify {
            debug!("Peer sent close_notify");
        } else {
            warn!("Peer sent {:?} alert: {}", level, description);
        }
        Error::AlertReceived(description)
    }

    fn send_alert(&mut self, level: AlertLevel, description: AlertDescription) -> Result<(), Error> {
        self.record
            .queue(ContentType::Alert, &[level.as_u8(), description.as_u8()])?;
        self.flush()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("cipher_suite", &self.cipher_suite())
            .field("shutdown", &self.shutdown)
            .field("has_ticket", &self.ticket.is_some())
            .field("read_protected", &self.record.is_read_protected())
            .field("write_protected", &self.record.is_write_protected())
            .field("buffered_input", &self.record.has_buffered_input())
            .field("unflushed", &self.record.has_unflushed())
            .finish()
    }
}
