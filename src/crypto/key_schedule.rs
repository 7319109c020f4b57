//! TLS 1.3 Key Schedule (RFC 8446 Section 7.1)
//!
//! ```text
//!              0
//!              |
//!              v
//!    PSK ->  HKDF-Extract = Early Secret
//!              |
//!              +-----> Derive-Secret(., "ext binder" | "res binder", "")
//!              |                     = binder_key
//!              |
//!              +-----> Derive-Secret(., "c e traffic", ClientHello)
//!              |                     = client_early_traffic_secret
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!    (EC)DHE -> HKDF-Extract = Handshake Secret
//!              |
//!              +-----> Derive-Secret(., "c hs traffic",
//!              |                     ClientHello...ServerHello)
//!              |                     = client_handshake_traffic_secret
//!              |
//!              +-----> Derive-Secret(., "s hs traffic",
//!              |                     ClientHello...ServerHello)
//!              |                     = server_handshake_traffic_secret
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!    0 -> HKDF-Extract = Master Secret
//!              |
//!              +-----> Derive-Secret(., "c ap traffic",
//!              |                     ClientHello...server Finished)
//!              |                     = client_application_traffic_secret_0
//!              |
//!              +-----> Derive-Secret(., "s ap traffic",
//!              |                     ClientHello...server Finished)
//!              |                     = server_application_traffic_secret_0
//!              |
//!              +-----> Derive-Secret(., "exp master",
//!              |                     ClientHello...server Finished)
//!              |                     = exporter_master_secret
//!              |
//!              +-----> Derive-Secret(., "res master",
//!                                    ClientHello...client Finished)
//!                                    = resumption_master_secret
//! ```
//!
//! Each stage is its own type. [`HandshakeSecret`] can only be obtained by
//! consuming an [`EarlySecret`], and [`MasterSecret`] only by consuming a
//! `HandshakeSecret`, so application secrets cannot be derived before the
//! handshake secret exists. Every stage wipes its secret on drop.

use zeroize::Zeroize;

use crate::buffer::Buf;
use crate::crypto::provider::{CryptoProvider, HashProvider, HkdfProvider, HmacProvider};
use crate::crypto::NONCE_LEN;
use crate::types::HashAlgorithm;
use crate::Error;

/// Which binder label an early secret is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PskKind {
    /// PSK from a NewSessionTicket of an earlier connection.
    Resumption,
    /// Externally provisioned PSK.
    External,
}

impl PskKind {
    fn binder_label(&self) -> &'static [u8] {
        match self {
            PskKind::Resumption => b"res binder",
            PskKind::External => b"ext binder",
        }
    }
}

/// HKDF ladder bound to one hash algorithm.
#[derive(Debug, Clone, Copy)]
pub struct KeySchedule {
    hkdf: &'static dyn HkdfProvider,
    hmac: &'static dyn HmacProvider,
    hashes: &'static dyn HashProvider,
    hash: HashAlgorithm,
}

impl KeySchedule {
    pub fn new(provider: &CryptoProvider, hash: HashAlgorithm) -> Self {
        KeySchedule {
            hkdf: provider.hkdf_provider,
            hmac: provider.hmac_provider,
            hashes: provider.hash_provider,
            hash,
        }
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn hash_len(&self) -> usize {
        self.hash.output_len()
    }

    /// HKDF-Expand-Label(secret, label, context, length).
    pub fn expand_label(
        &self,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
        length: usize,
    ) -> Result<Buf, Error> {
        let mut out = Buf::new();
        self.hkdf
            .hkdf_expand_label(self.hash, secret, label, context, &mut out, length)
            .map_err(Error::Internal)?;
        Ok(out)
    }

    /// Derive-Secret(secret, label, messages) given Transcript-Hash(messages).
    pub fn derive_secret(
        &self,
        secret: &[u8],
        label: &[u8],
        transcript_hash: &[u8],
    ) -> Result<Buf, Error> {
        self.expand_label(secret, label, transcript_hash, self.hash_len())
    }

    /// Hash of `data` with this schedule's hash.
    pub fn hash_of(&self, data: &[u8]) -> Buf {
        let mut ctx = self.hashes.create_hash(self.hash);
        ctx.update(data);
        let mut out = Buf::new();
        ctx.clone_and_finalize(&mut out);
        out
    }

    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Result<Buf, Error> {
        let mut out = Buf::new();
        self.hkdf
            .hkdf_extract(self.hash, salt, ikm, &mut out)
            .map_err(Error::Internal)?;
        Ok(out)
    }

    /// Derive-Secret(secret, "derived", "") used between ladder stages.
    fn derived(&self, secret: &[u8]) -> Result<Buf, Error> {
        let empty = self.hash_of(&[]);
        self.derive_secret(secret, b"derived", &empty)
    }

    /// Traffic key and IV for one direction.
    ///
    /// key = HKDF-Expand-Label(secret, "key", "", key_length)
    /// iv  = HKDF-Expand-Label(secret, "iv", "", iv_length)
    pub fn traffic_keys(&self, traffic_secret: &[u8], key_len: usize) -> Result<TrafficKeys, Error> {
        let key = self.expand_label(traffic_secret, b"key", &[], key_len)?;
        let mut iv_buf = self.expand_label(traffic_secret, b"iv", &[], NONCE_LEN)?;
        let mut iv = [0u8; NONCE_LEN];
        iv.copy_from_slice(&iv_buf);
        iv_buf.zeroize();
        Ok(TrafficKeys { key, iv })
    }

    /// finished_key = HKDF-Expand-Label(base_key, "finished", "", Hash.length)
    pub fn finished_key(&self, base_key: &[u8]) -> Result<Buf, Error> {
        self.expand_label(base_key, b"finished", &[], self.hash_len())
    }

    /// verify_data = HMAC(finished_key, transcript_hash)
    pub fn verify_data(&self, finished_key: &[u8], transcript_hash: &[u8]) -> Result<Buf, Error> {
        let mut out = Buf::new();
        self.hmac
            .hmac(self.hash, finished_key, transcript_hash, &mut out)
            .map_err(Error::Internal)?;
        Ok(out)
    }

    /// Constant-time check of a received verify_data.
    pub fn check_verify_data(
        &self,
        finished_key: &[u8],
        transcript_hash: &[u8],
        received: &[u8],
    ) -> bool {
        self.hmac
            .verify(self.hash, finished_key, transcript_hash, received)
    }

    /// application_traffic_secret_N+1 =
    ///     HKDF-Expand-Label(application_traffic_secret_N, "traffic upd", "", Hash.length)
    pub fn next_traffic_secret(&self, current: &[u8]) -> Result<Buf, Error> {
        self.expand_label(current, b"traffic upd", &[], self.hash_len())
    }

    /// PSK for a ticket: HKDF-Expand-Label(resumption_master_secret,
    /// "resumption", ticket_nonce, Hash.length).
    pub fn resumption_psk(&self, resumption_master: &[u8], nonce: &[u8]) -> Result<Buf, Error> {
        self.expand_label(resumption_master, b"resumption", nonce, self.hash_len())
    }

    /// TLS 1.3 Exporter (RFC 8446 Section 7.5)
    ///
    /// ```text
    /// TLS-Exporter(label, context_value, key_length) =
    ///     HKDF-Expand-Label(Derive-Secret(Secret, label, ""),
    ///                       "exporter", Hash(context_value), key_length)
    /// ```
    pub fn export(
        &self,
        exporter_master: &[u8],
        label: &[u8],
        context: &[u8],
        length: usize,
    ) -> Result<Buf, Error> {
        let empty = self.hash_of(&[]);
        let mut secret = self.derive_secret(exporter_master, label, &empty)?;
        let context_hash = self.hash_of(context);
        let out = self.expand_label(&secret, b"exporter", &context_hash, length);
        secret.zeroize();
        out
    }
}

/// Key and IV derived from a traffic secret. Wiped on drop.
pub struct TrafficKeys {
    pub key: Buf,
    pub iv: [u8; NONCE_LEN],
}

impl Drop for TrafficKeys {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

/// Early Secret = HKDF-Extract(0, PSK).
#[derive(Debug)]
pub struct EarlySecret {
    kind: PskKind,
    secret: Buf,
}

impl EarlySecret {
    pub fn new(ks: &KeySchedule, kind: PskKind, psk: &[u8]) -> Result<Self, Error> {
        let secret = ks.extract(&[], psk)?;
        Ok(EarlySecret { kind, secret })
    }

    pub fn kind(&self) -> PskKind {
        self.kind
    }

    /// binder = HMAC(finished_key(binder_key), partial_transcript_hash)
    pub fn binder(&self, ks: &KeySchedule, partial_transcript_hash: &[u8]) -> Result<Buf, Error> {
        let empty = ks.hash_of(&[]);
        let mut binder_key = ks.derive_secret(&self.secret, self.kind.binder_label(), &empty)?;
        let finished_key = ks.finished_key(&binder_key);
        binder_key.zeroize();
        let mut finished_key = finished_key?;
        let binder = ks.verify_data(&finished_key, partial_transcript_hash);
        finished_key.zeroize();
        binder
    }

    /// client_early_traffic_secret = Derive-Secret(., "c e traffic", ClientHello)
    pub fn client_early_traffic_secret(
        &self,
        ks: &KeySchedule,
        client_hello_hash: &[u8],
    ) -> Result<Buf, Error> {
        ks.derive_secret(&self.secret, b"c e traffic", client_hello_hash)
    }

    /// Handshake Secret = HKDF-Extract(Derive-Secret(., "derived", ""), (EC)DHE).
    ///
    /// Without a (EC)DHE share (psk_ke mode) the input is Hash.length zeros.
    pub fn into_handshake_secret(
        self,
        ks: &KeySchedule,
        shared_secret: Option<&[u8]>,
    ) -> Result<HandshakeSecret, Error> {
        let mut salt = ks.derived(&self.secret)?;
        let zeros = vec![0u8; ks.hash_len()];
        let ikm = shared_secret.unwrap_or(&zeros);
        let secret = ks.extract(&salt, ikm);
        salt.zeroize();
        Ok(HandshakeSecret { secret: secret? })
    }
}

impl Drop for EarlySecret {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Handshake Secret stage.
#[derive(Debug)]
pub struct HandshakeSecret {
    secret: Buf,
}

impl HandshakeSecret {
    /// (client_handshake_traffic_secret, server_handshake_traffic_secret)
    pub fn traffic_secrets(&self, ks: &KeySchedule, ch_to_sh: &[u8]) -> Result<(Buf, Buf), Error> {
        let client = ks.derive_secret(&self.secret, b"c hs traffic", ch_to_sh)?;
        let server = ks.derive_secret(&self.secret, b"s hs traffic", ch_to_sh)?;
        Ok((client, server))
    }

    /// Master Secret = HKDF-Extract(Derive-Secret(., "derived", ""), 0).
    pub fn into_master_secret(self, ks: &KeySchedule) -> Result<MasterSecret, Error> {
        let mut salt = ks.derived(&self.secret)?;
        let zeros = vec![0u8; ks.hash_len()];
        let secret = ks.extract(&salt, &zeros);
        salt.zeroize();
        Ok(MasterSecret { secret: secret? })
    }
}

impl Drop for HandshakeSecret {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Master Secret stage.
#[derive(Debug)]
pub struct MasterSecret {
    secret: Buf,
}

impl MasterSecret {
    /// (client_application_traffic_secret_0, server_application_traffic_secret_0)
    pub fn application_secrets(
        &self,
        ks: &KeySchedule,
        ch_to_sf: &[u8],
    ) -> Result<(Buf, Buf), Error> {
        let client = ks.derive_secret(&self.secret, b"c ap traffic", ch_to_sf)?;
        let server = ks.derive_secret(&self.secret, b"s ap traffic", ch_to_sf)?;
        Ok((client, server))
    }

    pub fn exporter_master_secret(&self, ks: &KeySchedule, ch_to_sf: &[u8]) -> Result<Buf, Error> {
        ks.derive_secret(&self.secret, b"exp master", ch_to_sf)
    }

    pub fn resumption_master_secret(
        &self,
        ks: &KeySchedule,
        ch_to_cf: &[u8],
    ) -> Result<Buf, Error> {
        ks.derive_secret(&self.secret, b"res master", ch_to_cf)
    }
}

impl Drop for MasterSecret {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}
