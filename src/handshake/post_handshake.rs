//! Handshake messages after the connection is established.

use zeroize::Zeroize;

use super::tables::{TicketExtensions, NEW_SESSION_TICKET};
use crate::buffer::Buf;
use crate::connection::Connection;
use crate::message::{
    write_message, KeyUpdateRequest, Message, NewSessionTicket, HANDSHAKE_HEADER_LEN,
};
use crate::ticket::Ticket;
use crate::types::{ContentType, HandshakeType};
use crate::Error;

pub(crate) fn handle_message(conn: &mut Connection, msg: Message) -> Result<(), Error> {
    match msg.msg_type {
        HandshakeType::NewSessionTicket => new_session_ticket(conn, &msg),
        HandshakeType::KeyUpdate => key_update(conn, &msg),
        other => Err(Error::unexpected(format!(
            "{:?} after the handshake",
            other
        ))),
    }
}

fn new_session_ticket(conn: &mut Connection, msg: &Message) -> Result<(), Error> {
    let nst = NewSessionTicket::parse(msg.body(), HANDSHAKE_HEADER_LEN)?;
    let mut ext = TicketExtensions::default();
    NEW_SESSION_TICKET.dispatch(&mut ext, &msg.bytes, &nst.extensions)?;

    let session = conn.session.as_ref().ok_or(Error::NotEstablished)?;
    let psk = session
        .key_schedule
        .resumption_psk(&session.resumption_master, nst.ticket_nonce)?;
    let ticket = Ticket::new(
        nst.ticket_lifetime,
        nst.ticket_age_add,
        ext.max_early_data,
        psk,
        session.suite.suite(),
        nst.ticket,
    );

    debug!(
        "Received NewSessionTicket: lifetime {}s, max_early_data {}",
        ticket.lifetime(),
        ticket.max_early_data()
    );
    match conn.new_ticket_callback.as_mut() {
        Some(callback) => callback(&ticket),
        None => trace!("No ticket callback; discarding ticket"),
    }
    Ok(())
}

fn key_update(conn: &mut Connection, msg: &Message) -> Result<(), Error> {
    let request = KeyUpdateRequest::parse(msg.body())?;
    if !conn.reader.is_empty() {
        return Err(Error::unexpected("handshake data after KeyUpdate"));
    }

    let session = conn.session.as_mut().ok_or(Error::NotEstablished)?;
    let ks = session.key_schedule;
    let next = ks.next_traffic_secret(&session.server_app)?;
    session.server_app.zeroize();
    session.server_app = next;
    let keys = ks.traffic_keys(&session.server_app, session.suite.key_len())?;
    conn.record.install_read(session.suite, &keys)?;
    debug!("Peer rotated its traffic key");

    if request == KeyUpdateRequest::UpdateRequested {
        update_write_key(conn, KeyUpdateRequest::UpdateNotRequested)?;
    }
    Ok(())
}

/// Queue a KeyUpdate under the current key, then rotate the write key.
pub(crate) fn update_write_key(
    conn: &mut Connection,
    request: KeyUpdateRequest,
) -> Result<(), Error> {
    let mut msg = Buf::new();
    write_message(&mut msg, HandshakeType::KeyUpdate, |body| {
        request.serialize(body);
        Ok(())
    })?;
    conn.record.queue(ContentType::Handshake, &msg)?;

    let session = conn.session.as_mut().ok_or(Error::NotEstablished)?;
    let ks = session.key_schedule;
    let next = ks.next_traffic_secret(&session.client_app)?;
    session.client_app.zeroize();
    session.client_app = next;
    let keys = ks.traffic_keys(&session.client_app, session.suite.key_len())?;
    conn.record.install_write(session.suite, &keys)?;
    debug!("Rotated own traffic key ({:?})", request);
    Ok(())
}
