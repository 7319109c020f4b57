//! Per-handshake and per-session secret holders.

use arrayvec::ArrayVec;
use zeroize::Zeroize;

use crate::buffer::Buf;
use crate::crypto::key_schedule::{EarlySecret, HandshakeSecret, KeySchedule};
use crate::crypto::{ActiveKeyExchange, SupportedCipherSuite};
use crate::message::Random;
use crate::transcript::Transcript;
use crate::types::{CipherSuite, HashAlgorithm, NamedGroup};

/// One PSK offered in the ClientHello.
pub(crate) struct OfferedPsk {
    pub identity: Buf,
    pub obfuscated_age: u32,
    pub hash: HashAlgorithm,
    pub early: EarlySecret,
}

/// State that lives only while the handshake is in flight.
///
/// Dropped as soon as the connection is established or fails. Every
/// secret it holds is wiped on drop.
pub(crate) struct HandshakeState {
    pub random: Random,
    pub cipher_suites: Vec<CipherSuite>,
    pub groups: Vec<NamedGroup>,
    pub server_name: Option<String>,
    pub request_ticket: bool,

    pub transcript: Transcript,
    pub ch: Option<Buf>,
    pub ch_to_sh: Option<Buf>,
    pub ch_to_sf: Option<Buf>,
    pub ch_to_cf: Option<Buf>,

    /// Resumption ticket first, then the external PSK.
    pub psks: ArrayVec<OfferedPsk, 2>,
    /// Length of the binders list at the tail of the last ClientHello.
    pub binders_len: usize,
    pub selected_psk: Option<usize>,

    /// Live key shares, one per group offered in the current ClientHello.
    pub key_shares: Vec<Box<dyn ActiveKeyExchange>>,
    /// Every group a share was ever sent for.
    pub offered_groups: Vec<NamedGroup>,
    pub shared_secret: Option<Buf>,

    pub hello_retry: bool,
    pub hrr_suite: Option<CipherSuite>,
    pub hrr_group: Option<NamedGroup>,
    pub cookie: Option<Buf>,
    pub version_ok: bool,

    pub early_data_offered: bool,
    pub early_data_accepted: bool,

    pub suite: Option<&'static dyn SupportedCipherSuite>,
    pub key_schedule: Option<KeySchedule>,
    pub handshake_secret: Option<HandshakeSecret>,
    pub client_hs: Option<Buf>,
    pub server_hs: Option<Buf>,
}

impl HandshakeState {
    pub fn new(
        random: Random,
        transcript: Transcript,
        psks: ArrayVec<OfferedPsk, 2>,
        key_shares: Vec<Box<dyn ActiveKeyExchange>>,
    ) -> Self {
        let offered_groups = key_shares.iter().map(|k| k.group()).collect();
        HandshakeState {
            random,
            cipher_suites: Vec::new(),
            groups: Vec::new(),
            server_name: None,
            request_ticket: false,
            transcript,
            ch: None,
            ch_to_sh: None,
            ch_to_sf: None,
            ch_to_cf: None,
            psks,
            binders_len: 0,
            selected_psk: None,
            key_shares,
            offered_groups,
            shared_secret: None,
            hello_retry: false,
            hrr_suite: None,
            hrr_group: None,
            cookie: None,
            version_ok: false,
            early_data_offered: false,
            early_data_accepted: false,
            suite: None,
            key_schedule: None,
            handshake_secret: None,
            client_hs: None,
            server_hs: None,
        }
    }
}

impl Drop for HandshakeState {
    fn drop(&mut self) {
        self.random.bytes.zeroize();
        for secret in [
            &mut self.shared_secret,
            &mut self.client_hs,
            &mut self.server_hs,
            &mut self.cookie,
        ]
        .into_iter()
        .flatten()
        {
            secret.zeroize();
        }
    }
}

/// Application secrets kept for the life of an established session.
pub(crate) struct SessionSecrets {
    pub key_schedule: KeySchedule,
    pub suite: &'static dyn SupportedCipherSuite,
    pub client_app: Buf,
    pub server_app: Buf,
    pub resumption_master: Buf,
    pub exporter_master: Buf,
}

impl Drop for SessionSecrets {
    fn drop(&mut self) {
        self.client_app.zeroize();
        self.server_app.zeroize();
        self.resumption_master.zeroize();
        self.exporter_master.zeroize();
    }
}
