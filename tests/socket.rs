//! End-to-end transport tests: message exchange, setup probing, peer-close
//! and timeout behavior over real loopback connections.

use std::time::Duration;

use rand::{Rng, RngCore};
use sbdp::{Message, SbdpError, Socket, Value};
use tokio::io::AsyncWriteExt;

/// Creates a listening socket on an OS-assigned port and returns it with the
/// port number.
fn listen_on_free_port() -> (Socket, u16) {
    let mut listener = Socket::new();
    assert!(listener.create());
    assert!(listener.bind(0));
    assert!(listener.listen());
    let port = listener.local_addr().expect("listening socket has an address").port();
    (listener, port)
}

async fn connect_to(port: u16) -> Socket {
    let mut client = Socket::new();
    assert!(client.create());
    assert!(client.connect("127.0.0.1", port).await);
    client
}

#[tokio::test]
async fn send_recv_round_trip() {
    let (mut listener, port) = listen_on_free_port();

    let mut request = Message::new();
    request.insert("type", "hello");
    request.insert("value", 123i64);
    let expected_request = request.clone();

    let server = tokio::spawn(async move {
        let mut conn = listener.accept().await.expect("accept");
        let received = conn.recv_message(1000).await.expect("server recv");
        assert_eq!(received, expected_request);

        let mut reply = Message::new();
        reply.insert("type", "ack");
        reply.insert("ok", 1u64);
        conn.send_message(&reply).await.expect("server send");
    });

    let mut client = connect_to(port).await;
    client.send_message(&request).await.expect("client send");

    let reply = client.recv_message(1000).await.expect("client recv");
    server.await.unwrap();

    let mut expected_reply = Message::new();
    expected_reply.insert("type", "ack");
    expected_reply.insert("ok", 1u64);
    assert_eq!(reply, expected_reply);
}

#[tokio::test]
async fn second_bind_on_taken_port_returns_false() {
    let mut first = Socket::new();
    assert!(first.create());
    assert!(first.bind(0));
    let port = first.local_addr().unwrap().port();

    let mut second = Socket::new();
    assert!(second.create());
    assert!(!second.bind(port));
}

#[tokio::test]
async fn connect_without_listener_returns_false() {
    // Bind a port to learn a number that is free, then release it.
    let mut probe = Socket::new();
    assert!(probe.create());
    assert!(probe.bind(0));
    let port = probe.local_addr().unwrap().port();
    probe.close();

    let mut client = Socket::new();
    assert!(client.create());
    assert!(!client.connect("127.0.0.1", port).await);
}

#[tokio::test]
async fn send_on_unconnected_socket_raises() {
    let mut client = Socket::new();
    assert!(client.create());

    let mut msg = Message::new();
    msg.insert("k", "v");

    assert!(matches!(
        client.send_message(&msg).await,
        Err(SbdpError::NotConnected)
    ));
}

#[tokio::test]
async fn recv_after_peer_close_raises_connection_closed() {
    let (mut listener, port) = listen_on_free_port();

    let server = tokio::spawn(async move {
        let mut conn = listener.accept().await.expect("accept");
        conn.close();
    });

    let mut client = connect_to(port).await;
    server.await.unwrap();

    assert!(matches!(
        client.recv_message(1000).await,
        Err(SbdpError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn recv_against_silent_peer_times_out() {
    let (mut listener, port) = listen_on_free_port();

    let server = tokio::spawn(async move {
        let mut conn = listener.accept().await.expect("accept");
        // Hold the connection open well past the client's deadline.
        tokio::time::sleep(Duration::from_millis(300)).await;
        conn.close();
    });

    let mut client = connect_to(port).await;
    assert!(matches!(
        client.recv_message(50).await,
        Err(SbdpError::TimedOut)
    ));

    server.await.unwrap();
}

#[tokio::test]
async fn close_is_idempotent_and_fails_later_io() {
    let (mut listener, port) = listen_on_free_port();

    let server = tokio::spawn(async move {
        let _conn = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let mut client = connect_to(port).await;
    client.close();
    client.close();

    let mut msg = Message::new();
    msg.insert("k", 1i64);
    assert!(matches!(
        client.send_message(&msg).await,
        Err(SbdpError::NotConnected)
    ));
    assert!(matches!(
        client.recv_message(10).await,
        Err(SbdpError::NotConnected)
    ));

    server.await.unwrap();
}

#[tokio::test]
async fn malformed_frame_surfaces_codec_error_through_recv() {
    let (mut listener, port) = listen_on_free_port();

    let peer = tokio::spawn(async move {
        let mut raw = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("raw connect");
        // A complete 12-byte-payload frame for key "k", but with type tag
        // 0x07, which no kind uses.
        let frame = [
            0x00, 0x00, 0x00, 0x0C, 0x00, 0x01, 0x6B, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        raw.write_all(&frame).await.expect("raw write");
        // Keep the stream open until the server has read the frame.
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let mut conn = listener.accept().await.expect("accept");
    assert!(matches!(
        conn.recv_message(2000).await,
        Err(SbdpError::MalformedMessage(_))
    ));

    peer.await.unwrap();
}

#[tokio::test]
async fn connect_resolves_hostnames() {
    let (mut listener, port) = listen_on_free_port();

    let server = tokio::spawn(async move {
        let _conn = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let mut client = Socket::new();
    assert!(client.create());
    assert!(client.connect("localhost", port).await);

    server.await.unwrap();
}

#[tokio::test]
async fn listener_accepts_multiple_peers() {
    let (mut listener, port) = listen_on_free_port();

    let server = tokio::spawn(async move {
        for i in 0..3i64 {
            let mut conn = listener.accept().await.expect("accept");
            let mut msg = Message::new();
            msg.insert("seq", i);
            conn.send_message(&msg).await.expect("server send");
        }
    });

    for i in 0..3i64 {
        let mut client = connect_to(port).await;
        let msg = client.recv_message(1000).await.expect("client recv");
        assert_eq!(msg.get("seq"), Some(&Value::Int64(i)));
    }

    server.await.unwrap();
}

#[tokio::test]
async fn randomized_payloads_echo_intact() {
    let (mut listener, port) = listen_on_free_port();

    let server = tokio::spawn(async move {
        let mut conn = listener.accept().await.expect("accept");
        for _ in 0..10 {
            let msg = conn.recv_message(2000).await.expect("server recv");
            conn.send_message(&msg).await.expect("server send");
        }
    });

    let mut rng = rand::thread_rng();
    let mut client = connect_to(port).await;

    for _ in 0..10 {
        let mut blob = vec![0u8; rng.gen_range(0..4096)];
        rng.fill_bytes(&mut blob);

        let mut msg = Message::new();
        msg.insert("id", rng.gen::<u64>());
        msg.insert("signed", rng.gen::<i64>());
        msg.insert("ratio", rng.gen::<f64>());
        msg.insert("blob", blob);

        client.send_message(&msg).await.expect("client send");
        let echoed = client.recv_message(2000).await.expect("client recv");
        assert_eq!(echoed, msg);
    }

    server.await.unwrap();
}
