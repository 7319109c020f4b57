// TLS 1.3 PSK Client Handshake Flow (RFC 8446):
//
// 1. Client sends ClientHello (plaintext) with pre_shared_key last
//    - binders are HMACs over the ClientHello up to the binders list
// 2. Client may send 0-RTT application data under client_early_traffic_secret
// 3. Server may respond with HelloRetryRequest (ServerHello with magic random)
//    - Client replaces transcript with message_hash and sends a new ClientHello
// 4. Server sends ServerHello (plaintext)
//    - Client derives handshake secrets, installs the server handshake key
// 5. Server sends EncryptedExtensions (encrypted)
//    - early_data here means the server accepted 0-RTT
// 6. Server sends Finished (encrypted)
// 7. Client sends EndOfEarlyData if 0-RTT was accepted (early key)
// 8. Client installs its handshake key and sends Finished
// 9. Both sides switch to application traffic secrets
//
// Certificates are never negotiated: both sides authenticate through the PSK.

use arrayvec::ArrayVec;
use zeroize::Zeroize;

use crate::buffer::Buf;
use crate::connection::Connection;
use crate::crypto::key_schedule::{EarlySecret, KeySchedule, PskKind};
use crate::crypto::{CryptoProvider, SupportedCipherSuite};
use crate::message::extensions::pre_shared_key;
use crate::message::{
    finished, write_message, ClientHello, EncryptedExtensions, Message, Random, ServerHello,
    HANDSHAKE_HEADER_LEN,
};
use crate::transcript::Transcript;
use crate::types::{AlertDescription, ContentType, HandshakeType, HashAlgorithm};
use crate::Error;

pub(crate) mod post_handshake;
mod scratch;
mod tables;

pub(crate) use scratch::{HandshakeState, OfferedPsk, SessionSecrets};

/// Where a [`Connection`] is in its life cycle.
///
/// The handshake walks these in order. A HelloRetryRequest sends the
/// machine from `RecvServerHello` back to `SendClientHello` once. Any
/// fatal error returns it to `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    SendClientHello,
    SendEarlyData,
    RecvServerHello,
    RecvEncryptedExtensions,
    RecvServerFinished,
    SendEndOfEarlyData,
    SendClientFinished,
    PreEstablished,
    Established,
}

impl State {
    pub(crate) fn make_progress(self, conn: &mut Connection) -> Result<Self, Error> {
        match self {
            State::Init => self.init(conn),
            State::SendClientHello => self.send_client_hello(conn),
            State::SendEarlyData => self.send_early_data(conn),
            State::RecvServerHello => self.recv_server_hello(conn),
            State::RecvEncryptedExtensions => self.recv_encrypted_extensions(conn),
            State::RecvServerFinished => self.recv_server_finished(conn),
            State::SendEndOfEarlyData => self.send_end_of_early_data(conn),
            State::SendClientFinished => self.send_client_finished(conn),
            State::PreEstablished => self.pre_established(conn),
            State::Established => self.established(conn),
        }
    }

    fn init(self, conn: &mut Connection) -> Result<Self, Error> {
        let config = conn.config.clone();
        let provider = config.crypto_provider();

        let mut psks = ArrayVec::new();

        if let Some(ticket) = &conn.ticket {
            if provider.find_cipher_suite(ticket.cipher_suite()).is_some() {
                let hash = ticket.hash_algorithm();
                let ks = KeySchedule::new(provider, hash);
                psks.push(OfferedPsk {
                    identity: Buf::from_slice(ticket.ticket()),
                    obfuscated_age: ticket.obfuscated_age(),
                    hash,
                    early: EarlySecret::new(&ks, PskKind::Resumption, ticket.master_key())?,
                });
            } else {
                debug!(
                    "Ticket cipher suite {:?} not available; not resuming",
                    ticket.cipher_suite()
                );
            }
        }

        if let (Some(hint), Some(callback)) = (&conn.psk_hint, conn.psk_callback.as_mut()) {
            match callback(&hint[..]) {
                Some(mut psk) if !psk.is_empty() => {
                    let hash = HashAlgorithm::SHA256;
                    let ks = KeySchedule::new(provider, hash);
                    let early = EarlySecret::new(&ks, PskKind::External, &psk);
                    psk.zeroize();
                    psks.push(OfferedPsk {
                        identity: hint.clone(),
                        obfuscated_age: 0,
                        hash,
                        early: early?,
                    });
                }
                _ => debug!("PSK callback has no key for the hint"),
            }
        }

        if psks.is_empty() {
            return Err(Error::NoPsk);
        }
        if conn.transports.writer().is_none() || conn.transports.reader().is_none() {
            return Err(Error::NoTransport);
        }

        let random = Random::new(provider.secure_random)?;

        let mut key_shares = Vec::with_capacity(provider.kx_groups.len());
        for group in provider.kx_groups {
            let share = group.start_exchange(Buf::new()).map_err(Error::Internal)?;
            key_shares.push(share);
        }

        let early_data_offered = match (&conn.early_data, &conn.ticket) {
            (Some(early), Some(ticket)) => {
                psks[0].early.kind() == PskKind::Resumption
                    && early.payload.len() <= ticket.max_early_data() as usize
            }
            _ => false,
        };

        debug!(
            "Offering {} PSK(s) and {} key share(s){}",
            psks.len(),
            key_shares.len(),
            if early_data_offered { " with early data" } else { "" }
        );

        let transcript = Transcript::new(provider.hash_provider);
        let mut hs = HandshakeState::new(random, transcript, psks, key_shares);
        hs.cipher_suites = provider.cipher_suites.iter().map(|cs| cs.suite()).collect();
        hs.groups = provider.kx_groups.iter().map(|g| g.name()).collect();
        hs.server_name = config.server_name().map(str::to_string);
        hs.request_ticket = conn.new_ticket_callback.is_some();
        hs.early_data_offered = early_data_offered;

        conn.record.reset();
        conn.record.set_max_fragment(config.max_fragment_length());
        conn.reader.clear();
        conn.app_data.zeroize();
        conn.session = None;
        conn.cipher_suite = None;
        conn.early_data_accepted = false;
        conn.handshake = Some(Box::new(hs));

        Ok(Self::SendClientHello)
    }

    fn send_client_hello(self, conn: &mut Connection) -> Result<Self, Error> {
        let provider = conn.config.crypto_provider();
        let hs = scratch(&mut conn.handshake)?;

        let random = hs.random;
        let cipher_suites = hs.cipher_suites.clone();

        let mut msg = Buf::new();
        write_message(&mut msg, HandshakeType::ClientHello, |body| {
            ClientHello {
                random: &random,
                cipher_suites: &cipher_suites,
            }
            .serialize(tables::CLIENT_HELLO, hs, body)
        })?;

        // The binders cover everything up to the binders list, with every
        // length already final.
        let partial_len = msg.len() - hs.binders_len;
        let mut binders = Vec::with_capacity(hs.psks.len());
        for psk in &hs.psks {
            let ks = KeySchedule::new(provider, psk.hash);
            let mut ctx = hs.transcript.fork(psk.hash)?;
            ctx.update(&msg[..partial_len]);
            let mut partial_hash = Buf::new();
            ctx.clone_and_finalize(&mut partial_hash);
            binders.push(psk.early.binder(&ks, &partial_hash)?);
        }
        pre_shared_key::fill_binders(&mut msg, &binders)?;

        hs.transcript.update(&msg);
        hs.ch = Some(hs.transcript.snapshot(hs.psks[0].hash)?);

        debug!(
            "Sending ClientHello{} ({} bytes)",
            if hs.hello_retry { " after HelloRetryRequest" } else { "" },
            msg.len()
        );
        conn.record.queue(ContentType::Handshake, &msg)?;

        Ok(Self::SendEarlyData)
    }

    fn send_early_data(self, conn: &mut Connection) -> Result<Self, Error> {
        let hs = scratch(&mut conn.handshake)?;
        let (Some(early), Some(ticket)) = (conn.early_data.as_mut(), conn.ticket.as_ref()) else {
            return Ok(Self::RecvServerHello);
        };
        if !hs.early_data_offered || hs.hello_retry {
            return Ok(Self::RecvServerHello);
        }

        let provider = conn.config.crypto_provider();
        let suite = provider
            .find_cipher_suite(ticket.cipher_suite())
            .ok_or_else(|| Error::Internal("ticket cipher suite vanished".into()))?;

        let psk = &hs.psks[0];
        let ks = KeySchedule::new(provider, psk.hash);
        let ch = hs.ch.as_ref().ok_or_else(|| missing("ClientHello hash"))?;

        let mut secret = psk.early.client_early_traffic_secret(&ks, ch)?;
        let keys = ks.traffic_keys(&secret, suite.key_len());
        secret.zeroize();
        conn.record.install_write(suite, &keys?)?;

        conn.record
            .queue(ContentType::ApplicationData, &early.payload)?;
        early.sent = early.payload.len();
        debug!("Sending {} bytes of early data", early.sent);

        Ok(Self::RecvServerHello)
    }

    fn recv_server_hello(self, conn: &mut Connection) -> Result<Self, Error> {
        conn.flush()?;

        let msg = conn.next_handshake_message()?;
        expect_type(&msg, HandshakeType::ServerHello)?;
        let sh = ServerHello::parse(msg.body(), HANDSHAKE_HEADER_LEN)?;

        if sh.is_hello_retry_request() {
            process_hello_retry_request(conn, &msg, &sh)
        } else {
            process_server_hello(conn, &msg, &sh)
        }
    }

    fn recv_encrypted_extensions(self, conn: &mut Connection) -> Result<Self, Error> {
        let msg = conn.next_handshake_message()?;
        expect_type(&msg, HandshakeType::EncryptedExtensions)?;
        let ee = EncryptedExtensions::parse(msg.body(), HANDSHAKE_HEADER_LEN)?;

        let hs = scratch(&mut conn.handshake)?;
        tables::ENCRYPTED_EXTENSIONS.dispatch(hs, &msg.bytes, &ee.extensions)?;

        if hs.early_data_accepted && hs.selected_psk != Some(0) {
            return Err(Error::illegal("early data accepted for another PSK"));
        }
        if hs.early_data_offered {
            debug!(
                "Early data {}",
                if hs.early_data_accepted { "accepted" } else { "rejected" }
            );
        }
        conn.early_data_accepted = hs.early_data_accepted;

        hs.transcript.update(&msg.bytes);
        Ok(Self::RecvServerFinished)
    }

    fn recv_server_finished(self, conn: &mut Connection) -> Result<Self, Error> {
        let msg = conn.next_handshake_message()?;
        expect_type(&msg, HandshakeType::Finished)?;

        let hs = scratch(&mut conn.handshake)?;
        let ks = hs.key_schedule.ok_or_else(|| missing("key schedule"))?;
        let server_hs = hs.server_hs.as_ref().ok_or_else(|| missing("server secret"))?;

        let verify_data = finished::parse(msg.body(), ks.hash_len())?;
        let transcript_hash = hs.transcript.snapshot(ks.hash())?;

        let mut finished_key = ks.finished_key(server_hs)?;
        let valid = ks.check_verify_data(&finished_key, &transcript_hash, verify_data);
        finished_key.zeroize();
        if !valid {
            warn!("Server Finished does not verify");
            return Err(Error::Crypto {
                alert: AlertDescription::HandshakeFailure,
            });
        }
        trace!("Server Finished verified");

        hs.transcript.update(&msg.bytes);
        hs.ch_to_sf = Some(hs.transcript.snapshot(ks.hash())?);

        if !conn.reader.is_empty() {
            return Err(Error::unexpected("handshake data after server Finished"));
        }
        Ok(Self::SendEndOfEarlyData)
    }

    fn send_end_of_early_data(self, conn: &mut Connection) -> Result<Self, Error> {
        let hs = scratch(&mut conn.handshake)?;
        let ks = hs.key_schedule.ok_or_else(|| missing("key schedule"))?;
        let suite = hs.suite.ok_or_else(|| missing("cipher suite"))?;

        if hs.early_data_accepted {
            let mut msg = Buf::new();
            write_message(&mut msg, HandshakeType::EndOfEarlyData, |_| Ok(()))?;
            conn.record.queue(ContentType::Handshake, &msg)?;
            hs.transcript.update(&msg);
            debug!("Sending EndOfEarlyData");
        }

        let client_hs = hs.client_hs.as_ref().ok_or_else(|| missing("client secret"))?;
        let keys = ks.traffic_keys(client_hs, suite.key_len())?;
        conn.record.install_write(suite, &keys)?;
        trace!("Installed client handshake key");

        Ok(Self::SendClientFinished)
    }

    fn send_client_finished(self, conn: &mut Connection) -> Result<Self, Error> {
        let hs = scratch(&mut conn.handshake)?;
        let ks = hs.key_schedule.ok_or_else(|| missing("key schedule"))?;
        let client_hs = hs.client_hs.as_ref().ok_or_else(|| missing("client secret"))?;

        let transcript_hash = hs.transcript.snapshot(ks.hash())?;
        let mut finished_key = ks.finished_key(client_hs)?;
        let verify_data = ks.verify_data(&finished_key, &transcript_hash);
        finished_key.zeroize();
        let verify_data = verify_data?;

        let mut msg = Buf::new();
        write_message(&mut msg, HandshakeType::Finished, |body| {
            finished::serialize(&verify_data, body);
            Ok(())
        })?;
        conn.record.queue(ContentType::Handshake, &msg)?;

        hs.transcript.update(&msg);
        hs.ch_to_cf = Some(hs.transcript.snapshot(ks.hash())?);
        trace!("Sending Finished");

        Ok(Self::PreEstablished)
    }

    fn pre_established(self, conn: &mut Connection) -> Result<Self, Error> {
        let mut hs = conn.handshake.take().ok_or_else(|| missing("handshake"))?;
        let ks = hs.key_schedule.ok_or_else(|| missing("key schedule"))?;
        let suite = hs.suite.ok_or_else(|| missing("cipher suite"))?;
        let ch_to_sf = hs.ch_to_sf.take().ok_or_else(|| missing("ClientHello..server Finished"))?;
        let ch_to_cf = hs.ch_to_cf.take().ok_or_else(|| missing("ClientHello..client Finished"))?;

        let master = hs
            .handshake_secret
            .take()
            .ok_or_else(|| missing("handshake secret"))?
            .into_master_secret(&ks)?;

        let (client_app, server_app) = master.application_secrets(&ks, &ch_to_sf)?;
        let resumption_master = master.resumption_master_secret(&ks, &ch_to_cf)?;
        let exporter_master = master.exporter_master_secret(&ks, &ch_to_sf)?;

        conn.record
            .install_read(suite, &ks.traffic_keys(&server_app, suite.key_len())?)?;
        conn.record
            .install_write(suite, &ks.traffic_keys(&client_app, suite.key_len())?)?;

        conn.session = Some(SessionSecrets {
            key_schedule: ks,
            suite,
            client_app,
            server_app,
            resumption_master,
            exporter_master,
        });
        drop(hs);

        debug!("Handshake complete; {:?}", suite.suite());
        Ok(Self::Established)
    }

    fn established(self, conn: &mut Connection) -> Result<Self, Error> {
        // The client Finished may still sit in the flight.
        conn.flush()?;
        Ok(self)
    }
}

fn process_hello_retry_request(
    conn: &mut Connection,
    msg: &Message,
    hrr: &ServerHello,
) -> Result<State, Error> {
    let provider = conn.config.crypto_provider();
    let hs = scratch(&mut conn.handshake)?;

    if hs.hello_retry {
        return Err(Error::unexpected("second HelloRetryRequest"));
    }
    let suite = negotiated_suite(hs, provider, hrr)?;

    tables::HELLO_RETRY_REQUEST.dispatch(hs, &msg.bytes, &hrr.extensions)?;
    require_tls13(hs)?;

    if hs.cookie.is_none() && hs.hrr_group.is_none() {
        return Err(Error::illegal(
            "HelloRetryRequest would not change the ClientHello",
        ));
    }

    if let Some(group) = hs.hrr_group {
        if hs.offered_groups.contains(&group) {
            return Err(Error::illegal(format!(
                "HelloRetryRequest for already offered {:?}",
                group
            )));
        }
        let kx = provider
            .find_kx_group(group)
            .ok_or_else(|| Error::illegal(format!("HelloRetryRequest for unsupported {:?}", group)))?;
        hs.key_shares.clear();
        hs.key_shares
            .push(kx.start_exchange(Buf::new()).map_err(Error::Internal)?);
        hs.offered_groups.push(group);
    }

    let hash = suite.hash_algorithm();
    hs.psks.retain(|p| p.hash == hash);
    if hs.psks.is_empty() {
        return Err(Error::protocol(
            AlertDescription::HandshakeFailure,
            format!("no offered PSK uses {:?}", hash),
        ));
    }

    hs.transcript
        .restart_with_message_hash(provider.hash_provider, hash)?;
    hs.transcript.update(&msg.bytes);

    if hs.early_data_offered {
        debug!("Early data rejected by HelloRetryRequest");
    }
    hs.early_data_offered = false;
    hs.hello_retry = true;
    hs.hrr_suite = Some(hrr.cipher_suite);
    hs.version_ok = false;

    // The second ClientHello goes out in plaintext again.
    conn.record.clear_write();

    debug!(
        "Received HelloRetryRequest for {:?} (group {:?}, cookie {})",
        hrr.cipher_suite,
        hs.hrr_group,
        hs.cookie.is_some()
    );
    Ok(State::SendClientHello)
}

fn process_server_hello(
    conn: &mut Connection,
    msg: &Message,
    sh: &ServerHello,
) -> Result<State, Error> {
    let provider = conn.config.crypto_provider();
    let hs = scratch(&mut conn.handshake)?;

    let suite = negotiated_suite(hs, provider, sh)?;
    if let Some(hrr_suite) = hs.hrr_suite {
        if hrr_suite != sh.cipher_suite {
            return Err(Error::illegal(format!(
                "ServerHello {:?} differs from HelloRetryRequest {:?}",
                sh.cipher_suite, hrr_suite
            )));
        }
    }

    tables::SERVER_HELLO.dispatch(hs, &msg.bytes, &sh.extensions)?;
    require_tls13(hs)?;

    let selected = hs.selected_psk.ok_or_else(|| {
        Error::protocol(
            AlertDescription::HandshakeFailure,
            "ServerHello without pre_shared_key",
        )
    })?;
    let hash = suite.hash_algorithm();
    if hs.psks[selected].hash != hash {
        return Err(Error::illegal(format!(
            "PSK {} does not use the {:?} of {:?}",
            selected,
            hash,
            suite.suite()
        )));
    }
    if hs.shared_secret.is_none() {
        trace!("No key_share in ServerHello; psk_ke mode");
        hs.key_shares.clear();
    }

    hs.transcript.select(hash)?;
    hs.transcript.update(&msg.bytes);
    let ch_to_sh = hs.transcript.snapshot(hash)?;

    let ks = KeySchedule::new(provider, hash);
    let psk = hs.psks.remove(selected);
    hs.psks.clear();

    let handshake_secret = psk
        .early
        .into_handshake_secret(&ks, hs.shared_secret.as_deref())?;
    if let Some(mut shared) = hs.shared_secret.take() {
        shared.zeroize();
    }
    let (client_hs, server_hs) = handshake_secret.traffic_secrets(&ks, &ch_to_sh)?;

    if !conn.reader.is_empty() {
        return Err(Error::unexpected("handshake data before key change"));
    }
    let keys = ks.traffic_keys(&server_hs, suite.key_len())?;
    conn.record.install_read(suite, &keys)?;

    hs.ch_to_sh = Some(ch_to_sh);
    hs.suite = Some(suite);
    hs.key_schedule = Some(ks);
    hs.handshake_secret = Some(handshake_secret);
    hs.client_hs = Some(client_hs);
    hs.server_hs = Some(server_hs);
    conn.cipher_suite = Some(suite);

    debug!("ServerHello selected {:?} with PSK {}", suite.suite(), selected);
    Ok(State::RecvEncryptedExtensions)
}

/// Checks shared by ServerHello and HelloRetryRequest.
fn negotiated_suite(
    hs: &HandshakeState,
    provider: &CryptoProvider,
    sh: &ServerHello,
) -> Result<&'static dyn SupportedCipherSuite, Error> {
    if sh.legacy_version.as_u16() < 0x0303 {
        return Err(Error::protocol(
            AlertDescription::ProtocolVersion,
            format!("legacy_version {}", sh.legacy_version),
        ));
    }
    if !sh.legacy_session_id.is_empty() {
        return Err(Error::illegal("legacy_session_id_echo was not sent"));
    }
    if sh.legacy_compression_method != 0 {
        return Err(Error::illegal("legacy_compression_method must be null"));
    }

    let offered = hs.cipher_suites.contains(&sh.cipher_suite);
    provider
        .find_cipher_suite(sh.cipher_suite)
        .filter(|_| offered)
        .ok_or_else(|| {
            Error::protocol(
                AlertDescription::HandshakeFailure,
                format!("server chose {:?}, which was not offered", sh.cipher_suite),
            )
        })
}

fn require_tls13(hs: &HandshakeState) -> Result<(), Error> {
    if hs.version_ok {
        Ok(())
    } else {
        Err(Error::protocol(
            AlertDescription::ProtocolVersion,
            "server did not negotiate TLS 1.3",
        ))
    }
}

fn expect_type(msg: &Message, expected: HandshakeType) -> Result<(), Error> {
    if msg.msg_type != expected {
        return Err(Error::unexpected(format!(
            "{:?} while waiting for {:?}",
            msg.msg_type, expected
        )));
    }
    Ok(())
}

fn scratch(handshake: &mut Option<Box<HandshakeState>>) -> Result<&mut HandshakeState, Error> {
    handshake
        .as_deref_mut()
        .ok_or_else(|| missing("handshake"))
}

fn missing(what: &str) -> Error {
    Error::Internal(format!("{} not available in this state", what))
}
