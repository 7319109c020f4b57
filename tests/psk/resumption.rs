//! Tickets, resumption and 0-RTT.

use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};

use psktls::{AlertDescription, CipherSuite, Connection, Error, State, Ticket};

use crate::common::*;

/// Run a full handshake that is issued one ticket, returning the persisted
/// ticket and what the server knows about it.
fn obtain_ticket(max_early_data: u32) -> (Vec<u8>, KnownTicket) {
    let (addr, server) = spawn(ServerOptions {
        issue_ticket: Some(max_early_data),
        ..Default::default()
    });

    let tickets = Arc::new(Mutex::new(Vec::new()));
    let sink = tickets.clone();

    let mut client = external_client(addr);
    client.set_new_ticket_callback(move |ticket: &Ticket| {
        sink.lock().unwrap().push(ticket.to_bytes());
    });
    client.connect().expect("connect");

    // The ticket arrives ahead of the echo.
    client.send(b"ticket please").expect("send");
    let mut buf = [0u8; 32];
    let n = client.recv(&mut buf).expect("recv");
    assert_eq!(&buf[..n], b"ticket please");
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    assert!(report.extensions.contains(&EXT_SESSION_TICKET));

    let mut tickets = tickets.lock().unwrap();
    assert_eq!(tickets.len(), 1);
    (tickets.remove(0), report.issued.expect("issued ticket"))
}

fn ticket_client(addr: SocketAddr, ticket: &[u8]) -> Connection {
    let mut client = Connection::new(client_config());
    client.set_stream(TcpStream::connect(addr).expect("connect"));
    client.set_ticket(ticket).expect("ticket");
    client
}

#[test]
fn ticket_contents() {
    let _ = env_logger::try_init();

    let (bytes, known) = obtain_ticket(1024);
    let ticket = Ticket::from_bytes(&bytes).expect("parse ticket");

    assert_eq!(ticket.lifetime(), 7200);
    assert_eq!(ticket.max_early_data(), 1024);
    assert_eq!(ticket.cipher_suite(), CipherSuite::AES_128_GCM_SHA256);
    assert_eq!(ticket.ticket(), known.identity.as_slice());
    assert_eq!(ticket.master_key(), known.psk.as_slice());
}

#[test]
fn resume_with_ticket() {
    let _ = env_logger::try_init();

    let (bytes, known) = obtain_ticket(0);

    let (addr, server) = spawn(ServerOptions {
        external: false,
        tickets: vec![known.clone()],
        ..Default::default()
    });
    let mut client = ticket_client(addr, &bytes);
    client.connect().expect("resume");
    assert!(client.is_established());

    client.send(b"resumed").expect("send");
    let mut buf = [0u8; 16];
    let n = client.recv(&mut buf).expect("recv");
    assert_eq!(&buf[..n], b"resumed");
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    assert_eq!(report.identities, vec![known.identity]);
    assert!(report.binders_verified);
    assert_eq!(report.selected, Some(0));
}

#[test]
fn ticket_offered_before_external_psk() {
    let _ = env_logger::try_init();

    let (bytes, known) = obtain_ticket(0);

    let (addr, server) = spawn(ServerOptions {
        tickets: vec![known.clone()],
        select_identity: Some(1),
        ..Default::default()
    });
    let mut client = ticket_client(addr, &bytes);
    client.set_psk_hint(EXTERNAL_IDENTITY).expect("hint");
    client.set_psk_callback(|_| Some(EXTERNAL_PSK.to_vec()));
    client.connect().expect("connect");
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    assert_eq!(
        report.identities,
        vec![known.identity, EXTERNAL_IDENTITY.to_vec()]
    );
    assert!(report.binders_verified);
    assert_eq!(report.selected, Some(1));
}

#[test]
fn early_data_accepted() {
    let _ = env_logger::try_init();

    let (bytes, known) = obtain_ticket(16384);

    let (addr, server) = spawn(ServerOptions {
        external: false,
        tickets: vec![known],
        accept_early_data: true,
        ..Default::default()
    });
    let mut client = ticket_client(addr, &bytes);

    let sent = client.send_early_data(b"early hello").expect("0-RTT");
    assert_eq!(sent, 11);
    assert!(client.early_data_accepted());
    assert_eq!(client.state(), State::Established);

    client.send(b"late hello").expect("send");
    let mut buf = [0u8; 16];
    let n = client.recv(&mut buf).expect("recv");
    assert_eq!(&buf[..n], b"late hello");
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    assert!(report.extensions.contains(&EXT_EARLY_DATA));
    assert_eq!(report.early_data, b"early hello");
    assert_eq!(report.received, vec![b"late hello".to_vec()]);
}

#[test]
fn early_data_rejected() {
    let _ = env_logger::try_init();

    let (bytes, known) = obtain_ticket(16384);

    let (addr, server) = spawn(ServerOptions {
        external: false,
        tickets: vec![known],
        accept_early_data: false,
        ..Default::default()
    });
    let mut client = ticket_client(addr, &bytes);

    let sent = client.send_early_data(b"early hello").expect("handshake");
    assert_eq!(sent, 0);
    assert!(!client.early_data_accepted());
    assert!(client.is_established());

    // Rejected data is the caller's to resend.
    client.send(b"early hello").expect("send");
    let mut buf = [0u8; 16];
    let n = client.recv(&mut buf).expect("recv");
    assert_eq!(&buf[..n], b"early hello");
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    assert!(report.early_data.is_empty());
    assert_eq!(report.skipped_early_records, 1);
}

#[test]
fn early_data_beyond_ticket_limit() {
    let _ = env_logger::try_init();

    let (bytes, _) = obtain_ticket(4);

    let mut client = Connection::new(client_config());
    client.set_ticket(&bytes).expect("ticket");
    let err = client.send_early_data(b"too long").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(client.state(), State::Init);
}

#[test]
fn unknown_ticket() {
    let _ = env_logger::try_init();

    let (bytes, _) = obtain_ticket(0);

    let (addr, server) = spawn(ServerOptions {
        external: false,
        ..Default::default()
    });
    let mut client = ticket_client(addr, &bytes);

    let err = client.connect().unwrap_err();
    assert!(
        matches!(
            err,
            Error::AlertReceived(AlertDescription::UnknownPskIdentity)
        ),
        "{:?}",
        err
    );
    assert_eq!(
        client.shutdown_reason(),
        Some(AlertDescription::UnknownPskIdentity)
    );
    assert_eq!(client.state(), State::Init);
    let _ = server.join();
}

#[test]
fn corrupt_ticket_is_rejected() {
    let (mut bytes, _) = obtain_ticket(0);
    bytes.push(0);

    let mut client = Connection::new(client_config());
    assert!(matches!(
        client.set_ticket(&bytes),
        Err(Error::InvalidTicket(_))
    ));
    assert!(matches!(
        client.set_ticket(&[0u8; 8]),
        Err(Error::InvalidTicket(_))
    ));
}

#[test]
fn provisioned_ticket_with_early_data() {
    let _ = env_logger::try_init();

    let master_key = [0x42u8; 32];
    let identity = b"provisioned".to_vec();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&3600u32.to_be_bytes()); // lifetime
    bytes.extend_from_slice(&0x0102_0304u32.to_be_bytes()); // age_add
    bytes.extend_from_slice(&128u32.to_be_bytes()); // max_early_data
    bytes.extend_from_slice(&master_key);
    bytes.extend_from_slice(&[0x13, 0x01]); // TLS_AES_128_GCM_SHA256
    bytes.extend_from_slice(&(identity.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&identity);

    let (addr, server) = spawn(ServerOptions {
        external: false,
        tickets: vec![KnownTicket {
            identity: identity.clone(),
            psk: master_key.to_vec(),
        }],
        accept_early_data: true,
        ..Default::default()
    });
    let mut client = ticket_client(addr, &bytes);

    assert_eq!(client.send_early_data(b"hello").expect("0-RTT"), 5);
    assert!(client.is_established());
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    assert_eq!(report.identities, vec![identity]);
    assert_eq!(report.early_data, b"hello");
    assert!(report.handshake_complete);
}
