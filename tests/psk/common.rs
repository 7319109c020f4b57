//! A scripted TLS 1.3 PSK server for driving a client over loopback TCP.
//!
//! Implements just enough of RFC 8446 with TLS_AES_128_GCM_SHA256 and
//! x25519, computing its own key schedule so that the client is checked
//! against an independent implementation.

#![allow(unused)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};

use psktls::{Config, Connection};

pub const EXPORTER_LABEL: &[u8] = b"EXPORTER-psktls-test";
pub const EXPORTER_CONTEXT: &[u8] = b"context";

pub const EXTERNAL_IDENTITY: &[u8] = b"client-1";
pub const EXTERNAL_PSK: [u8; 32] = [0x0b; 32];

const HRR_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91,
    0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
];

// Record content types
const CCS: u8 = 20;
const ALERT: u8 = 21;
const HANDSHAKE: u8 = 22;
const APP_DATA: u8 = 23;

// Handshake message types
const CLIENT_HELLO: u8 = 1;
const SERVER_HELLO: u8 = 2;
const NEW_SESSION_TICKET: u8 = 4;
const END_OF_EARLY_DATA: u8 = 5;
const ENCRYPTED_EXTENSIONS: u8 = 8;
const FINISHED: u8 = 20;
const KEY_UPDATE: u8 = 24;
const MESSAGE_HASH: u8 = 254;

// Extension types
pub const EXT_SERVER_NAME: u16 = 0;
pub const EXT_SUPPORTED_GROUPS: u16 = 10;
pub const EXT_SIGNATURE_ALGORITHMS: u16 = 13;
pub const EXT_SESSION_TICKET: u16 = 35;
pub const EXT_PRE_SHARED_KEY: u16 = 41;
pub const EXT_EARLY_DATA: u16 = 42;
pub const EXT_SUPPORTED_VERSIONS: u16 = 43;
pub const EXT_COOKIE: u16 = 44;
pub const EXT_PSK_MODES: u16 = 45;
pub const EXT_KEY_SHARE: u16 = 51;

const X25519: u16 = 0x001d;

/// How the server answers the first ClientHello.
#[derive(Debug, Clone, Default)]
pub enum Retry {
    #[default]
    None,
    /// HelloRetryRequest carrying a cookie.
    Cookie(Vec<u8>),
    /// HelloRetryRequest selecting a group.
    Group(u16),
    /// Two cookie HelloRetryRequests in a row.
    Twice,
}

/// A resumption PSK the server recognizes.
#[derive(Debug, Clone)]
pub struct KnownTicket {
    pub identity: Vec<u8>,
    pub psk: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub external: bool,
    pub tickets: Vec<KnownTicket>,
    pub retry: Retry,
    /// Answer with psk_ke even if the client offers psk_dhe_ke.
    pub psk_only: bool,
    pub accept_early_data: bool,
    pub corrupt_finished: bool,
    /// Advertise TLS 1.2 in supported_versions.
    pub bad_version: bool,
    /// Send a three byte supported_versions body.
    pub malformed_version: bool,
    pub send_ccs: bool,
    /// Issue a NewSessionTicket with this max_early_data right after the handshake.
    pub issue_ticket: Option<u32>,
    /// Send KeyUpdate(update_requested) right after the handshake.
    pub key_update_first: bool,
    /// Acknowledge the ServerName extension in EncryptedExtensions.
    pub ack_server_name: bool,
    /// Put early_data in EncryptedExtensions even if the client did not offer it.
    pub force_early_data_ack: bool,
    /// Select this identity index instead of the first one that matches.
    pub select_identity: Option<u16>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            external: true,
            tickets: Vec::new(),
            retry: Retry::None,
            psk_only: false,
            accept_early_data: false,
            corrupt_finished: false,
            bad_version: false,
            malformed_version: false,
            send_ccs: false,
            issue_ticket: None,
            key_update_first: false,
            ack_server_name: false,
            force_early_data_ack: false,
            select_identity: None,
        }
    }
}

/// What the server observed.
#[derive(Debug, Default)]
pub struct Report {
    pub client_hellos: usize,
    /// Extension ids of the last ClientHello, in order.
    pub extensions: Vec<u16>,
    pub identities: Vec<Vec<u8>>,
    pub selected: Option<usize>,
    pub binders_verified: bool,
    pub server_name: Option<String>,
    pub early_data: Vec<u8>,
    pub skipped_early_records: usize,
    pub handshake_complete: bool,
    pub received: Vec<Vec<u8>>,
    pub key_updates_received: usize,
    pub alert: Option<u8>,
    pub exporter: Vec<u8>,
    pub issued: Option<KnownTicket>,
}

pub fn client_config() -> Arc<Config> {
    Arc::new(
        Config::builder()
            .socket_timeout(Duration::from_secs(5))
            .build()
            .expect("build config"),
    )
}

/// A client that offers the external PSK.
pub fn external_client(addr: SocketAddr) -> Connection {
    let mut conn = Connection::new(client_config());
    conn.set_stream(TcpStream::connect(addr).expect("connect"));
    conn.set_psk_hint(EXTERNAL_IDENTITY).expect("hint");
    conn.set_psk_callback(|hint| {
        assert_eq!(hint, EXTERNAL_IDENTITY);
        Some(EXTERNAL_PSK.to_vec())
    });
    conn
}

/// Start a server for one connection.
pub fn spawn(options: ServerOptions) -> (SocketAddr, JoinHandle<Report>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let mut server = Server {
            stream,
            options,
            report: Report::default(),
            transcript: Vec::new(),
            handshake: Vec::new(),
            read: None,
            write: None,
            eof: false,
        };
        server.run();
        server.report
    });
    (addr, handle)
}

// ===== Key schedule =====

fn hash(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

fn extract(salt: &[u8], ikm: &[u8]) -> Vec<u8> {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    prk.to_vec()
}

fn expand_label(secret: &[u8], label: &[u8], context: &[u8], len: usize) -> Vec<u8> {
    let mut info = Vec::new();
    info.extend_from_slice(&(len as u16).to_be_bytes());
    info.push((6 + label.len()) as u8);
    info.extend_from_slice(b"tls13 ");
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);

    let mut out = vec![0u8; len];
    Hkdf::<Sha256>::from_prk(secret)
        .expect("prk")
        .expand(&info, &mut out)
        .expect("expand");
    out
}

fn derive_secret(secret: &[u8], label: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    expand_label(secret, label, transcript_hash, 32)
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).expect("hmac key");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn finished(base_key: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    let key = expand_label(base_key, b"finished", &[], 32);
    hmac(&key, transcript_hash)
}

pub fn resumption_psk(resumption_master: &[u8], nonce: &[u8]) -> Vec<u8> {
    expand_label(resumption_master, b"resumption", nonce, 32)
}

struct Keys {
    cipher: Aes128Gcm,
    iv: [u8; 12],
    seq: u64,
    secret: Vec<u8>,
}

impl Keys {
    fn new(secret: &[u8]) -> Keys {
        let key = expand_label(secret, b"key", &[], 16);
        let mut iv = [0u8; 12];
        iv.copy_from_slice(&expand_label(secret, b"iv", &[], 12));
        Keys {
            cipher: Aes128Gcm::new_from_slice(&key).expect("aes key"),
            iv,
            seq: 0,
            secret: secret.to_vec(),
        }
    }

    fn next(&self) -> Keys {
        Keys::new(&expand_label(&self.secret, b"traffic upd", &[], 32))
    }

    fn nonce(&mut self) -> [u8; 12] {
        let mut nonce = self.iv;
        for (n, s) in nonce[4..].iter_mut().zip(self.seq.to_be_bytes()) {
            *n ^= s;
        }
        self.seq += 1;
        nonce
    }

    fn seal(&mut self, content_type: u8, data: &[u8]) -> Vec<u8> {
        let mut inner = data.to_vec();
        inner.push(content_type);
        let len = (inner.len() + 16) as u16;
        let aad = [APP_DATA, 3, 3, (len >> 8) as u8, len as u8];
        let nonce = self.nonce();
        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &inner,
                    aad: &aad[..],
                },
            )
            .expect("seal");
        let mut record = aad.to_vec();
        record.extend_from_slice(&sealed);
        record
    }

    /// None if the record does not authenticate. The sequence number only
    /// advances on success.
    fn open(&mut self, header: &[u8; 5], body: &[u8]) -> Option<(u8, Vec<u8>)> {
        let mut nonce = self.iv;
        for (n, s) in nonce[4..].iter_mut().zip(self.seq.to_be_bytes()) {
            *n ^= s;
        }
        let mut plain = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: body,
                    aad: &header[..],
                },
            )
            .ok()?;
        self.seq += 1;
        while plain.last() == Some(&0) {
            plain.pop();
        }
        let content_type = plain.pop()?;
        Some((content_type, plain))
    }
}

// ===== ClientHello =====

struct ClientHello {
    /// Full message including the handshake header.
    bytes: Vec<u8>,
    extensions: Vec<(u16, Vec<u8>)>,
    /// Offset in `bytes` where the binders list starts.
    binders_offset: usize,
}

impl ClientHello {
    fn parse(bytes: Vec<u8>) -> ClientHello {
        assert_eq!(bytes[0], CLIENT_HELLO, "expected ClientHello");
        let mut pos = 4;
        assert_eq!(&bytes[pos..pos + 2], &[3, 3], "legacy_version");
        pos += 2 + 32;
        let session_id_len = bytes[pos] as usize;
        assert_eq!(session_id_len, 0, "legacy_session_id");
        pos += 1;
        let suites_len = be16(&bytes[pos..]) as usize;
        pos += 2 + suites_len;
        assert_eq!(&bytes[pos..pos + 2], &[1, 0], "legacy_compression_methods");
        pos += 2;
        let ext_end = pos + 2 + be16(&bytes[pos..]) as usize;
        assert_eq!(ext_end, bytes.len(), "extension block length");
        pos += 2;

        let mut extensions = Vec::new();
        let mut binders_offset = 0;
        while pos < ext_end {
            let ty = be16(&bytes[pos..]);
            let len = be16(&bytes[pos + 2..]) as usize;
            let data = bytes[pos + 4..pos + 4 + len].to_vec();
            if ty == EXT_PRE_SHARED_KEY {
                binders_offset = pos + 4 + 2 + be16(&data) as usize;
            }
            extensions.push((ty, data));
            pos += 4 + len;
        }

        ClientHello {
            bytes,
            extensions,
            binders_offset,
        }
    }

    fn extension(&self, ty: u16) -> Option<&[u8]> {
        self.extensions
            .iter()
            .find(|(t, _)| *t == ty)
            .map(|(_, d)| d.as_slice())
    }

    fn identities(&self) -> Vec<Vec<u8>> {
        let data = self.extension(EXT_PRE_SHARED_KEY).expect("pre_shared_key");
        let end = 2 + be16(data) as usize;
        let mut pos = 2;
        let mut out = Vec::new();
        while pos < end {
            let len = be16(&data[pos..]) as usize;
            out.push(data[pos + 2..pos + 2 + len].to_vec());
            pos += 2 + len + 4;
        }
        out
    }

    fn binders(&self) -> Vec<Vec<u8>> {
        let list = &self.bytes[self.binders_offset..];
        let end = 2 + be16(list) as usize;
        assert_eq!(end, list.len(), "binders must end the ClientHello");
        let mut pos = 2;
        let mut out = Vec::new();
        while pos < end {
            let len = list[pos] as usize;
            out.push(list[pos + 1..pos + 1 + len].to_vec());
            pos += 1 + len;
        }
        out
    }

    fn x25519_share(&self) -> Option<[u8; 32]> {
        let data = self.extension(EXT_KEY_SHARE)?;
        let mut pos = 2;
        while pos < data.len() {
            let group = be16(&data[pos..]);
            let len = be16(&data[pos + 2..]) as usize;
            if group == X25519 && len == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(&data[pos + 4..pos + 36]);
                return Some(key);
            }
            pos += 4 + len;
        }
        None
    }

    fn server_name(&self) -> Option<String> {
        let data = self.extension(EXT_SERVER_NAME)?;
        let len = be16(&data[3..]) as usize;
        String::from_utf8(data[5..5 + len].to_vec()).ok()
    }
}

fn be16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn message(ty: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len() as u32;
    let mut out = vec![ty, (len >> 16) as u8, (len >> 8) as u8, len as u8];
    out.extend_from_slice(body);
    out
}

fn extension(out: &mut Vec<u8>, ty: u16, data: &[u8]) {
    out.extend_from_slice(&ty.to_be_bytes());
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

fn server_hello(random: &[u8; 32], extensions: &[u8]) -> Vec<u8> {
    let mut body = vec![3, 3];
    body.extend_from_slice(random);
    body.push(0); // legacy_session_id_echo
    body.extend_from_slice(&[0x13, 0x01]);
    body.push(0); // legacy_compression_method
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(extensions);
    message(SERVER_HELLO, &body)
}

// ===== Server =====

struct Server {
    stream: TcpStream,
    options: ServerOptions,
    report: Report,
    transcript: Vec<u8>,
    handshake: Vec<u8>,
    read: Option<Keys>,
    write: Option<Keys>,
    eof: bool,
}

impl Server {
    fn run(&mut self) {
        let mut ch = self.read_client_hello();

        let first_retry = self.options.retry.clone();
        match first_retry {
            Retry::None => {}
            Retry::Cookie(cookie) => {
                self.hello_retry(&ch, Some(cookie.as_slice()));
                ch = self.read_client_hello();
                assert_eq!(ch.extension(EXT_COOKIE).map(|c| c[2..].to_vec()), Some(cookie));
            }
            Retry::Group(_) => {
                self.hello_retry(&ch, None);
                self.read_alert();
                return;
            }
            Retry::Twice => {
                self.hello_retry(&ch, Some(&b"first"[..]));
                ch = self.read_client_hello();
                self.hello_retry_again(Some(&b"second"[..]));
                self.read_alert();
                return;
            }
        }

        // PSK selection and binder check
        let identities = ch.identities();
        self.report.identities = identities.clone();
        let known: Vec<Option<(bool, Vec<u8>)>> = identities
            .iter()
            .map(|id| {
                if self.options.external && id.as_slice() == EXTERNAL_IDENTITY {
                    return Some((false, EXTERNAL_PSK.to_vec()));
                }
                self.options
                    .tickets
                    .iter()
                    .find(|t| &t.identity == id)
                    .map(|t| (true, t.psk.clone()))
            })
            .collect();

        let binders = ch.binders();
        assert_eq!(binders.len(), identities.len());
        let mut partial = self.transcript.clone();
        partial.extend_from_slice(&ch.bytes[..ch.binders_offset]);
        let partial_hash = hash(&partial);
        let mut verified = true;
        for (k, binder) in known.iter().zip(&binders) {
            if let Some((resumption, psk)) = k {
                let early = extract(&[0u8; 32], psk);
                let label: &[u8] = if *resumption { b"res binder" } else { b"ext binder" };
                let binder_key = derive_secret(&early, label, &hash(&[]));
                verified &= &finished(&binder_key, &partial_hash) == binder;
            }
        }
        self.report.binders_verified = verified;
        if !verified {
            self.send_plain(ALERT, &[2, 51]); // decrypt_error
            return;
        }

        let selected = match self.options.select_identity {
            Some(i) => i as usize,
            None => match known.iter().position(|k| k.is_some()) {
                Some(i) => i,
                None => {
                    self.send_plain(ALERT, &[2, 115]); // unknown_psk_identity
                    return;
                }
            },
        };
        self.report.selected = Some(selected);
        let (resumption, psk) = known
            .get(selected)
            .cloned()
            .flatten()
            .unwrap_or((false, EXTERNAL_PSK.to_vec()));

        self.transcript.extend_from_slice(&ch.bytes);
        let early_secret = extract(&[0u8; 32], &psk);

        let offered_early = ch.extension(EXT_EARLY_DATA).is_some();
        let accept_early =
            offered_early && self.options.accept_early_data && resumption && selected == 0;
        let early_keys = offered_early.then(|| {
            Keys::new(&derive_secret(
                &early_secret,
                b"c e traffic",
                &hash(&self.transcript),
            ))
        });

        // ServerHello
        let client_share = ch.x25519_share();
        let use_dhe = !self.options.psk_only && client_share.is_some();
        let mut exts = Vec::new();
        let version: &[u8] = if self.options.bad_version {
            &[3, 3]
        } else if self.options.malformed_version {
            &[3, 4, 0]
        } else {
            &[3, 4]
        };
        extension(&mut exts, EXT_SUPPORTED_VERSIONS, version);
        let mut shared = vec![0u8; 32];
        if use_dhe {
            let secret = EphemeralSecret::random_from_rng(OsRng);
            let public = PublicKey::from(&secret);
            let peer = PublicKey::from(client_share.expect("x25519 share"));
            shared = secret.diffie_hellman(&peer).as_bytes().to_vec();
            let mut ks = X25519.to_be_bytes().to_vec();
            ks.extend_from_slice(&32u16.to_be_bytes());
            ks.extend_from_slice(public.as_bytes());
            extension(&mut exts, EXT_KEY_SHARE, &ks);
        }
        extension(
            &mut exts,
            EXT_PRE_SHARED_KEY,
            &(selected as u16).to_be_bytes(),
        );
        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);
        let sh = server_hello(&random, &exts);
        self.send_plain(HANDSHAKE, &sh);
        if self.options.bad_version || self.options.malformed_version {
            self.read_alert();
            return;
        }
        self.transcript.extend_from_slice(&sh);
        if self.options.send_ccs {
            self.send_plain(CCS, &[1]);
        }

        let derived = derive_secret(&early_secret, b"derived", &hash(&[]));
        let handshake_secret = extract(&derived, &shared);
        let ch_to_sh = hash(&self.transcript);
        let c_hs = derive_secret(&handshake_secret, b"c hs traffic", &ch_to_sh);
        let s_hs = derive_secret(&handshake_secret, b"s hs traffic", &ch_to_sh);
        self.write = Some(Keys::new(&s_hs));

        // EncryptedExtensions
        let mut ee = Vec::new();
        if accept_early || self.options.force_early_data_ack {
            extension(&mut ee, EXT_EARLY_DATA, &[]);
        }
        if self.options.ack_server_name {
            extension(&mut ee, EXT_SERVER_NAME, &[]);
        }
        self.report.server_name = ch.server_name();
        let mut body = (ee.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(&ee);
        let ee = message(ENCRYPTED_EXTENSIONS, &body);
        self.send_protected(HANDSHAKE, &ee);
        self.transcript.extend_from_slice(&ee);

        // Server Finished
        let mut verify_data = finished(&s_hs, &hash(&self.transcript));
        if self.options.corrupt_finished {
            verify_data[0] ^= 0x80;
        }
        let fin = message(FINISHED, &verify_data);
        self.send_protected(HANDSHAKE, &fin);
        if self.options.corrupt_finished || self.options.force_early_data_ack {
            self.read_alert();
            return;
        }
        self.transcript.extend_from_slice(&fin);
        let ch_to_sf = hash(&self.transcript);

        let derived = derive_secret(&handshake_secret, b"derived", &hash(&[]));
        let master = extract(&derived, &[0u8; 32]);
        let c_ap = derive_secret(&master, b"c ap traffic", &ch_to_sf);
        let s_ap = derive_secret(&master, b"s ap traffic", &ch_to_sf);
        let exporter_master = derive_secret(&master, b"exp master", &ch_to_sf);

        // 0-RTT, then the client's Finished
        if accept_early {
            self.read = early_keys;
            loop {
                let (ty, data) = self.read_record().expect("early record");
                match ty {
                    APP_DATA => self.report.early_data.extend_from_slice(&data),
                    HANDSHAKE => {
                        assert_eq!(data, message(END_OF_EARLY_DATA, &[]));
                        self.transcript.extend_from_slice(&data);
                        break;
                    }
                    other => panic!("unexpected record {} in 0-RTT", other),
                }
            }
        }
        self.read = Some(Keys::new(&c_hs));
        let client_fin = match self.read_handshake_skipping(offered_early && !accept_early) {
            Some(m) => m,
            None => return,
        };
        if client_fin[0] == FINISHED {
            let expected = message(FINISHED, &finished(&c_hs, &hash(&self.transcript)));
            assert_eq!(client_fin, expected, "client Finished");
        } else {
            panic!("expected Finished, got {}", client_fin[0]);
        }
        self.transcript.extend_from_slice(&client_fin);
        let resumption_master = derive_secret(&master, b"res master", &hash(&self.transcript));

        self.read = Some(Keys::new(&c_ap));
        self.write = Some(Keys::new(&s_ap));
        self.report.handshake_complete = true;

        let secret = derive_secret(&exporter_master, EXPORTER_LABEL, &hash(&[]));
        self.report.exporter = expand_label(&secret, b"exporter", &hash(EXPORTER_CONTEXT), 32);

        if let Some(max_early_data) = self.options.issue_ticket {
            self.issue_ticket(&resumption_master, max_early_data);
        }
        if self.options.key_update_first {
            self.send_key_update(true);
        }

        self.serve();
    }

    fn hello_retry(&mut self, ch: &ClientHello, cookie: Option<&[u8]>) {
        let mut message_hash = vec![MESSAGE_HASH, 0, 0, 32];
        message_hash.extend_from_slice(&hash(&ch.bytes));
        self.transcript = message_hash;
        self.hello_retry_again(cookie);
    }

    fn hello_retry_again(&mut self, cookie: Option<&[u8]>) {
        let mut exts = Vec::new();
        extension(&mut exts, EXT_SUPPORTED_VERSIONS, &[3, 4]);
        if let Some(cookie) = cookie {
            let mut data = (cookie.len() as u16).to_be_bytes().to_vec();
            data.extend_from_slice(cookie);
            extension(&mut exts, EXT_COOKIE, &data);
        }
        if let Retry::Group(group) = self.options.retry {
            extension(&mut exts, EXT_KEY_SHARE, &group.to_be_bytes());
        }
        let hrr = server_hello(&HRR_RANDOM, &exts);
        self.send_plain(HANDSHAKE, &hrr);
        self.transcript.extend_from_slice(&hrr);
    }

    fn issue_ticket(&mut self, resumption_master: &[u8], max_early_data: u32) {
        let nonce = [0x00u8, 0x01];
        let identity = format!("ticket-{}", OsRng.next_u32()).into_bytes();

        let mut body = Vec::new();
        body.extend_from_slice(&7200u32.to_be_bytes());
        body.extend_from_slice(&OsRng.next_u32().to_be_bytes());
        body.push(nonce.len() as u8);
        body.extend_from_slice(&nonce);
        body.extend_from_slice(&(identity.len() as u16).to_be_bytes());
        body.extend_from_slice(&identity);
        let mut exts = Vec::new();
        if max_early_data > 0 {
            extension(&mut exts, EXT_EARLY_DATA, &max_early_data.to_be_bytes());
        }
        extension(&mut exts, 0xfafa, &[]); // GREASE, ignored by the client
        body.extend_from_slice(&(exts.len() as u16).to_be_bytes());
        body.extend_from_slice(&exts);

        self.send_protected(HANDSHAKE, &message(NEW_SESSION_TICKET, &body));
        self.report.issued = Some(KnownTicket {
            identity,
            psk: resumption_psk(resumption_master, &nonce),
        });
    }

    fn send_key_update(&mut self, request: bool) {
        self.send_protected(HANDSHAKE, &message(KEY_UPDATE, &[request as u8]));
        let next = self.write.as_ref().expect("write keys").next();
        self.write = Some(next);
    }

    /// Echo application data until the client closes.
    fn serve(&mut self) {
        while let Some((ty, data)) = self.read_record() {
            match ty {
                APP_DATA => {
                    if data == b"bye" {
                        self.send_protected(ALERT, &[1, 0]);
                    } else {
                        self.send_protected(APP_DATA, &data);
                    }
                    self.report.received.push(data);
                }
                HANDSHAKE => {
                    assert_eq!(&data[..4], &[KEY_UPDATE, 0, 0, 1]);
                    self.report.key_updates_received += 1;
                    let next = self.read.as_ref().expect("read keys").next();
                    self.read = Some(next);
                    if data[4] == 1 {
                        self.send_key_update(false);
                    }
                }
                ALERT => {
                    self.report.alert = Some(data[1]);
                    if data[1] == 0 {
                        let _ = self.try_send_protected(ALERT, &[1, 0]);
                    }
                    return;
                }
                other => panic!("unexpected record type {}", other),
            }
        }
    }

    // ===== Records =====

    fn read_client_hello(&mut self) -> ClientHello {
        self.read = None;
        let msg = self.read_handshake_skipping(false).expect("ClientHello");
        let ch = ClientHello::parse(msg);
        self.report.client_hellos += 1;
        self.report.extensions = ch.extensions.iter().map(|(t, _)| *t).collect();
        ch
    }

    /// Next handshake message. Undecryptable records are dropped when
    /// `skip_early` is set.
    fn read_handshake_skipping(&mut self, skip_early: bool) -> Option<Vec<u8>> {
        loop {
            if self.handshake.len() >= 4 {
                let len = (self.handshake[1] as usize) << 16
                    | (self.handshake[2] as usize) << 8
                    | self.handshake[3] as usize;
                if self.handshake.len() >= 4 + len {
                    let rest = self.handshake.split_off(4 + len);
                    return Some(std::mem::replace(&mut self.handshake, rest));
                }
            }

            let (header, body) = self.read_raw()?;
            let (ty, data) = match self.read.as_mut() {
                Some(keys) if header[0] == APP_DATA => match keys.open(&header, &body) {
                    Some(plain) => plain,
                    None if skip_early => {
                        self.report.skipped_early_records += 1;
                        continue;
                    }
                    None => panic!("record does not authenticate"),
                },
                _ => (header[0], body),
            };
            match ty {
                HANDSHAKE => self.handshake.extend_from_slice(&data),
                ALERT => {
                    self.report.alert = Some(data[1]);
                    return None;
                }
                CCS => {}
                other => panic!("unexpected record type {} during handshake", other),
            }
        }
    }

    fn read_alert(&mut self) {
        while let Some((ty, data)) = self.read_record() {
            if ty == ALERT {
                self.report.alert = Some(data[1]);
                return;
            }
        }
    }

    fn read_record(&mut self) -> Option<(u8, Vec<u8>)> {
        let (header, body) = self.read_raw()?;
        match self.read.as_mut() {
            Some(keys) if header[0] == APP_DATA => {
                Some(keys.open(&header, &body).expect("record does not authenticate"))
            }
            _ => Some((header[0], body)),
        }
    }

    fn read_raw(&mut self) -> Option<([u8; 5], Vec<u8>)> {
        if self.eof {
            return None;
        }
        let mut header = [0u8; 5];
        if self.stream.read_exact(&mut header).is_err() {
            self.eof = true;
            return None;
        }
        assert_eq!(header[1], 3, "record version major");
        let len = be16(&header[3..]) as usize;
        let mut body = vec![0u8; len];
        if self.stream.read_exact(&mut body).is_err() {
            self.eof = true;
            return None;
        }
        Some((header, body))
    }

    fn send_plain(&mut self, content_type: u8, data: &[u8]) {
        let mut record = vec![content_type, 3, 3];
        record.extend_from_slice(&(data.len() as u16).to_be_bytes());
        record.extend_from_slice(data);
        let _ = self.stream.write_all(&record);
    }

    fn send_protected(&mut self, content_type: u8, data: &[u8]) {
        self.try_send_protected(content_type, data)
            .expect("write record");
    }

    fn try_send_protected(&mut self, content_type: u8, data: &[u8]) -> std::io::Result<()> {
        let record = self
            .write
            .as_mut()
            .expect("write keys")
            .seal(content_type, data);
        self.stream.write_all(&record)
    }
}
