//! Application data, KeyUpdate, exporter and closure.

use std::net::TcpStream;

use psktls::{AlertDescription, Connection, Error, State};

use crate::common::*;

fn recv_exact(client: &mut Connection, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; 4096];
    while out.len() < len {
        let n = client.recv(&mut buf).expect("recv");
        assert!(n > 0, "closed after {} of {} bytes", out.len(), len);
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[test]
fn large_payload_is_fragmented() {
    let _ = env_logger::try_init();

    let (addr, server) = spawn(ServerOptions::default());
    let mut client = external_client(addr);
    client.connect().expect("connect");

    let payload: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(client.send(&payload).expect("send"), payload.len());
    assert_eq!(recv_exact(&mut client, payload.len()), payload);
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    let sizes: Vec<usize> = report.received.iter().map(|r| r.len()).collect();
    assert_eq!(sizes, vec![16384, 16384, 7232]);
}

#[test]
fn small_reads_drain_pending() {
    let _ = env_logger::try_init();

    let (addr, server) = spawn(ServerOptions::default());
    let mut client = external_client(addr);
    client.connect().expect("connect");

    client.send(b"0123456789").expect("send");
    let mut buf = [0u8; 4];
    assert_eq!(client.recv(&mut buf).expect("recv"), 4);
    assert_eq!(&buf, b"0123");
    assert_eq!(client.pending(), 6);
    assert_eq!(client.recv(&mut buf).expect("recv"), 4);
    assert_eq!(client.recv(&mut buf).expect("recv"), 2);
    assert_eq!(&buf[..2], b"89");
    assert_eq!(client.pending(), 0);

    client.shutdown().expect("shutdown");
    server.join().expect("server");
}

#[test]
fn client_key_update_with_request() {
    let _ = env_logger::try_init();

    let (addr, server) = spawn(ServerOptions::default());
    let mut client = external_client(addr);
    client.connect().expect("connect");

    for round in 0..3 {
        client.key_update(true).expect("key update");
        let msg = format!("round {}", round);
        client.send(msg.as_bytes()).expect("send");
        assert_eq!(recv_exact(&mut client, msg.len()), msg.as_bytes());
    }
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    assert_eq!(report.key_updates_received, 3);
    assert_eq!(report.received.len(), 3);
}

#[test]
fn client_key_update_without_request() {
    let _ = env_logger::try_init();

    let (addr, server) = spawn(ServerOptions::default());
    let mut client = external_client(addr);
    client.connect().expect("connect");

    client.key_update(false).expect("key update");
    client.send(b"rotated").expect("send");
    assert_eq!(recv_exact(&mut client, 7), b"rotated");
    client.shutdown().expect("shutdown");

    assert_eq!(server.join().expect("server").key_updates_received, 1);
}

#[test]
fn server_requests_key_update() {
    let _ = env_logger::try_init();

    let (addr, server) = spawn(ServerOptions {
        key_update_first: true,
        ..Default::default()
    });
    let mut client = external_client(addr);
    client.connect().expect("connect");

    client.send(b"one").expect("send");
    assert_eq!(recv_exact(&mut client, 3), b"one");
    // Our reply KeyUpdate went out with the first recv.
    client.send(b"two").expect("send");
    assert_eq!(recv_exact(&mut client, 3), b"two");
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    assert_eq!(report.key_updates_received, 1);
    assert_eq!(report.received, vec![b"one".to_vec(), b"two".to_vec()]);
}

#[test]
fn exporter_matches_server() {
    let _ = env_logger::try_init();

    let (addr, server) = spawn(ServerOptions::default());
    let mut client = external_client(addr);
    client.connect().expect("connect");

    let mut key = [0u8; 32];
    client
        .export_key(EXPORTER_LABEL, EXPORTER_CONTEXT, &mut key)
        .expect("export");

    let mut other = [0u8; 32];
    client
        .export_key(b"EXPORTER-other", EXPORTER_CONTEXT, &mut other)
        .expect("export");
    assert_ne!(key, other);

    assert!(matches!(
        client.export_key(EXPORTER_LABEL, b"", &mut [0u8; 0]),
        Err(Error::InvalidArgument(_))
    ));
    client.shutdown().expect("shutdown");

    let report = server.join().expect("server");
    assert_eq!(report.exporter, key.to_vec());
}

#[test]
fn peer_close_notify() {
    let _ = env_logger::try_init();

    let (addr, server) = spawn(ServerOptions::default());
    let mut client = external_client(addr);
    client.connect().expect("connect");

    client.send(b"bye").expect("send");
    let mut buf = [0u8; 8];
    assert_eq!(client.recv(&mut buf).expect("recv"), 0);
    assert_eq!(client.shutdown_reason(), Some(AlertDescription::CloseNotify));
    assert_eq!(client.state(), State::Established);

    assert_eq!(client.recv(&mut buf).expect("recv"), 0);
    assert!(matches!(client.send(b"more"), Err(Error::ShutDown)));
    assert!(matches!(client.key_update(false), Err(Error::ShutDown)));

    drop(client);
    let report = server.join().expect("server");
    assert_eq!(report.received, vec![b"bye".to_vec()]);
}

#[test]
fn reconnect_after_shutdown() {
    let _ = env_logger::try_init();

    let (addr, server) = spawn(ServerOptions::default());
    let mut client = external_client(addr);
    client.connect().expect("connect");
    client.shutdown().expect("shutdown");
    assert_eq!(client.state(), State::Init);
    assert!(matches!(client.send(b"x"), Err(Error::NotEstablished)));
    server.join().expect("server");

    // A fresh transport and the same configuration resume from Init.
    let (addr, server) = spawn(ServerOptions::default());
    client.set_stream(TcpStream::connect(addr).expect("connect"));
    client.connect().expect("reconnect");
    assert!(client.shutdown_reason().is_none());
    client.shutdown().expect("shutdown");
    assert!(server.join().expect("server").handshake_complete);
}

#[test]
fn split_transports() {
    let _ = env_logger::try_init();

    let (addr, server) = spawn(ServerOptions::default());
    let stream = TcpStream::connect(addr).expect("connect");
    let reader = stream.try_clone().expect("clone");

    let mut client = Connection::new(client_config());
    client.set_socket(reader, stream);
    client.set_psk_hint(EXTERNAL_IDENTITY).expect("hint");
    client.set_psk_callback(|_| Some(EXTERNAL_PSK.to_vec()));

    client.connect().expect("connect");
    client.send(b"split").expect("send");
    assert_eq!(recv_exact(&mut client, 5), b"split");
    client.shutdown().expect("shutdown");

    server.join().expect("server");
}
