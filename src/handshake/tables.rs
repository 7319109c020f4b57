//! Extension tables, one per message context.
//!
//! The ClientHello send order is fixed: pre_shared_key must come last so
//! that the binders form the tail of the message.

use super::scratch::HandshakeState;
use crate::buffer::Buf;
use crate::message::extensions::{
    cookie, early_data, key_share, pre_shared_key, psk_key_exchange_modes, server_name,
    signature_algorithms, supported_groups, supported_versions,
};
use crate::message::extensions::pre_shared_key::PskOffer;
use crate::message::{ExtensionTable, ExtensionType, SendHandler};
use crate::types::{AlertDescription, PskKeyExchangeMode, SignatureScheme};
use crate::Error;

// ===== ClientHello =====

pub(crate) static CLIENT_HELLO: &[(ExtensionType, SendHandler<HandshakeState>)] = &[
    (ExtensionType::SupportedVersions, send_supported_versions),
    (ExtensionType::Cookie, send_cookie),
    (ExtensionType::ServerName, send_server_name),
    (ExtensionType::PskKeyExchangeModes, send_psk_modes),
    (ExtensionType::SupportedGroups, send_supported_groups),
    (ExtensionType::KeyShare, send_key_share),
    (ExtensionType::EarlyData, send_early_data),
    (ExtensionType::SessionTicket, send_session_ticket),
    (ExtensionType::SignatureAlgorithms, send_signature_algorithms),
    (ExtensionType::PreSharedKey, send_pre_shared_key),
];

fn send_supported_versions(_: &mut HandshakeState, out: &mut Buf) -> Result<bool, Error> {
    supported_versions::serialize_client_hello(out)?;
    Ok(true)
}

fn send_cookie(hs: &mut HandshakeState, out: &mut Buf) -> Result<bool, Error> {
    match &hs.cookie {
        Some(c) => {
            cookie::serialize(c, out)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn send_server_name(hs: &mut HandshakeState, out: &mut Buf) -> Result<bool, Error> {
    match &hs.server_name {
        Some(name) => {
            server_name::serialize_client_hello(name, out)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn send_psk_modes(_: &mut HandshakeState, out: &mut Buf) -> Result<bool, Error> {
    psk_key_exchange_modes::serialize(
        &[PskKeyExchangeMode::PskKe, PskKeyExchangeMode::PskDheKe],
        out,
    )?;
    Ok(true)
}

fn send_supported_groups(hs: &mut HandshakeState, out: &mut Buf) -> Result<bool, Error> {
    supported_groups::serialize(&hs.groups, out)?;
    Ok(true)
}

fn send_key_share(hs: &mut HandshakeState, out: &mut Buf) -> Result<bool, Error> {
    key_share::serialize_client_hello(&hs.key_shares, out)?;
    Ok(true)
}

fn send_early_data(hs: &mut HandshakeState, _: &mut Buf) -> Result<bool, Error> {
    Ok(hs.early_data_offered && !hs.hello_retry)
}

fn send_session_ticket(hs: &mut HandshakeState, _: &mut Buf) -> Result<bool, Error> {
    Ok(hs.request_ticket)
}

fn send_signature_algorithms(_: &mut HandshakeState, out: &mut Buf) -> Result<bool, Error> {
    signature_algorithms::serialize(&[SignatureScheme::EcdsaSecp256r1Sha256], out)?;
    Ok(true)
}

fn send_pre_shared_key(hs: &mut HandshakeState, out: &mut Buf) -> Result<bool, Error> {
    let offers: Vec<PskOffer> = hs
        .psks
        .iter()
        .map(|p| PskOffer {
            identity: &p.identity,
            obfuscated_ticket_age: p.obfuscated_age,
            binder_len: p.hash.output_len(),
        })
        .collect();
    hs.binders_len = pre_shared_key::serialize_client_hello(&offers, out)?;
    Ok(true)
}

// ===== ServerHello =====

pub(crate) static SERVER_HELLO: ExtensionTable<HandshakeState> = ExtensionTable {
    context: "ServerHello",
    handlers: &[
        (ExtensionType::SupportedVersions, recv_supported_versions),
        (ExtensionType::KeyShare, recv_key_share),
        (ExtensionType::PreSharedKey, recv_pre_shared_key),
    ],
    skip_unknown: false,
};

fn recv_supported_versions(hs: &mut HandshakeState, data: &[u8]) -> Result<(), Error> {
    supported_versions::parse_server_hello(data)?;
    hs.version_ok = true;
    Ok(())
}

fn recv_key_share(hs: &mut HandshakeState, data: &[u8]) -> Result<(), Error> {
    let entry = key_share::parse_server_hello(data)?;
    let pos = hs
        .key_shares
        .iter()
        .position(|k| k.group() == entry.group)
        .ok_or_else(|| Error::illegal(format!("key_share for unoffered {:?}", entry.group)))?;

    let expected = hs.key_shares[pos].pub_key().len();
    if entry.key_exchange.len() != expected {
        return Err(Error::illegal(format!(
            "{:?} key_exchange of {} bytes, expected {}",
            entry.group,
            entry.key_exchange.len(),
            expected
        )));
    }

    let share = hs.key_shares.swap_remove(pos);
    hs.key_shares.clear();

    let mut secret = Buf::new();
    share
        .complete(entry.key_exchange, &mut secret)
        .map_err(Error::illegal)?;
    hs.shared_secret = Some(secret);
    Ok(())
}

fn recv_pre_shared_key(hs: &mut HandshakeState, data: &[u8]) -> Result<(), Error> {
    let selected = pre_shared_key::parse_server_hello(data)? as usize;
    if selected >= hs.psks.len() {
        return Err(Error::illegal(format!(
            "selected_identity {} of {} offered",
            selected,
            hs.psks.len()
        )));
    }
    hs.selected_psk = Some(selected);
    Ok(())
}

// ===== HelloRetryRequest =====

pub(crate) static HELLO_RETRY_REQUEST: ExtensionTable<HandshakeState> = ExtensionTable {
    context: "HelloRetryRequest",
    handlers: &[
        (ExtensionType::SupportedVersions, recv_supported_versions),
        (ExtensionType::Cookie, recv_cookie),
        (ExtensionType::KeyShare, recv_selected_group),
    ],
    skip_unknown: false,
};

fn recv_cookie(hs: &mut HandshakeState, data: &[u8]) -> Result<(), Error> {
    hs.cookie = Some(Buf::from_slice(cookie::parse(data)?));
    Ok(())
}

fn recv_selected_group(hs: &mut HandshakeState, data: &[u8]) -> Result<(), Error> {
    hs.hrr_group = Some(key_share::parse_hello_retry_request(data)?);
    Ok(())
}

// ===== EncryptedExtensions =====

pub(crate) static ENCRYPTED_EXTENSIONS: ExtensionTable<HandshakeState> = ExtensionTable {
    context: "EncryptedExtensions",
    handlers: &[
        (ExtensionType::SupportedGroups, recv_supported_groups),
        (ExtensionType::ServerName, recv_server_name),
        (ExtensionType::EarlyData, recv_early_data),
    ],
    skip_unknown: false,
};

fn recv_supported_groups(_: &mut HandshakeState, data: &[u8]) -> Result<(), Error> {
    // Informational only in TLS 1.3.
    supported_groups::parse(data)?;
    Ok(())
}

fn recv_server_name(hs: &mut HandshakeState, data: &[u8]) -> Result<(), Error> {
    if hs.server_name.is_none() {
        return Err(not_offered(ExtensionType::ServerName));
    }
    server_name::parse_encrypted_extensions(data)
}

fn recv_early_data(hs: &mut HandshakeState, data: &[u8]) -> Result<(), Error> {
    if !hs.early_data_offered {
        return Err(not_offered(ExtensionType::EarlyData));
    }
    early_data::parse_encrypted_extensions(data)?;
    hs.early_data_accepted = true;
    Ok(())
}

fn not_offered(ty: ExtensionType) -> Error {
    Error::protocol(
        AlertDescription::UnsupportedExtension,
        format!("{:?} was not offered", ty),
    )
}

// ===== NewSessionTicket =====

/// What a NewSessionTicket's extensions tell us.
#[derive(Debug, Default)]
pub(crate) struct TicketExtensions {
    pub max_early_data: u32,
}

pub(crate) static NEW_SESSION_TICKET: ExtensionTable<TicketExtensions> = ExtensionTable {
    context: "NewSessionTicket",
    handlers: &[(ExtensionType::EarlyData, recv_max_early_data)],
    skip_unknown: true,
};

fn recv_max_early_data(ext: &mut TicketExtensions, data: &[u8]) -> Result<(), Error> {
    ext.max_early_data = early_data::parse_new_session_ticket(data)?;
    Ok(())
}
