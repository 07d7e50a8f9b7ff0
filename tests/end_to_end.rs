//! End-to-end tests over real TCP sockets: raw wire exchanges against the
//! server, and the client talking to the server.

mod harness;

use barews::protocol::http::read_head;
use barews::protocol::{Frame, OpCode, encode};
use barews::{
    ClientConfig, ClientEvent, Error, Limits, ServerConfig, ServerEvent, WebSocketClient,
    WebSocketServer,
};
use bytes::BytesMut;
use harness::{TestClient, TestServer, WAIT, eventually};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const RFC_UPGRADE: &str = "GET /chat HTTP/1.1\r\n\
    Host: server.example.com\r\n\
    Upgrade: websocket\r\n\
    Connection: Upgrade\r\n\
    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    Sec-WebSocket-Version: 13\r\n\r\n";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn raw_upgrade(addr: SocketAddr) -> (TcpStream, String, BytesMut) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(RFC_UPGRADE.as_bytes()).await.unwrap();

    let mut buf = BytesMut::new();
    let head = read_head(&mut stream, &mut buf, &Limits::default())
        .await
        .unwrap();
    (stream, String::from_utf8(head.to_vec()).unwrap(), buf)
}

async fn read_frame(stream: &mut TcpStream) -> Frame {
    let mut buf = Vec::new();
    loop {
        match Frame::parse(&buf) {
            Ok((frame, _)) => return frame,
            Err(Error::Truncated { .. }) => {
                let mut chunk = [0u8; 1024];
                let n = tokio::time::timeout(WAIT, stream.read(&mut chunk))
                    .await
                    .expect("timed out reading frame")
                    .unwrap();
                assert!(n > 0, "stream ended before a full frame");
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(e) => panic!("bad frame from server: {}", e),
        }
    }
}

#[tokio::test]
async fn test_raw_upgrade_gets_rfc_accept_key() {
    init_logging();
    let (server, addr) = TestServer::spawn().await;

    let (_stream, response, leftover) = raw_upgrade(addr).await;
    assert!(response.starts_with("HTTP/1.1 101 Web Socket Protocol Handshake\r\n"));
    assert!(response.contains("Upgrade: Websocket\r\n"));
    assert!(response.contains("Connection: Upgrade\r\n"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    assert!(leftover.is_empty());

    assert!(eventually(|| server.handle.connection_count() == 1).await);
    server.shutdown().await;
}

#[tokio::test]
async fn test_masked_and_unmasked_frames_keep_first_byte() {
    let (server, addr) = TestServer::spawn().await;
    let (mut stream, _, _) = raw_upgrade(addr).await;

    let masked = Frame::new(true, OpCode::Text, b"Hello".to_vec())
        .to_wire(Some(0x37fa_213d))
        .unwrap();
    stream.write_all(&masked).await.unwrap();
    assert_eq!(read_frame(&mut stream).await.payload(), b"Hello");

    stream.write_all(&encode(b"Hello").unwrap()).await.unwrap();
    assert_eq!(read_frame(&mut stream).await.payload(), b"Hello");

    server.shutdown().await;
}

#[tokio::test]
async fn test_frame_trickled_byte_by_byte() {
    let (server, addr) = TestServer::spawn().await;
    let (mut stream, _, _) = raw_upgrade(addr).await;
    stream.set_nodelay(true).unwrap();

    let wire = Frame::new(true, OpCode::Binary, vec![7u8; 300])
        .to_wire(Some(0x0102_0304))
        .unwrap();
    for byte in &wire {
        stream.write_all(std::slice::from_ref(byte)).await.unwrap();
        tokio::task::yield_now().await;
    }

    let echoed = read_frame(&mut stream).await;
    assert_eq!(echoed.payload(), &[7u8; 300][..]);
    assert_eq!(echoed.opcode, OpCode::Text);

    server.shutdown().await;
}

#[tokio::test]
async fn test_non_websocket_upgrade_gets_400() {
    let (server, addr) = TestServer::spawn().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nUpgrade: h2c\r\n\r\n")
        .await
        .unwrap();

    let mut received = Vec::new();
    tokio::time::timeout(WAIT, stream.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"HTTP/1.1 400 Bad Request");
    assert_eq!(server.handle.connection_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_plain_request_forwarded_to_application() {
    let (server, addr) = TestServer::spawn().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut received = String::new();
    tokio::time::timeout(WAIT, stream.read_to_string(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert!(received.starts_with("HTTP/1.1 404 Not Found\r\n"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_server_echo_and_close() {
    init_logging();
    let (server, addr) = TestServer::spawn_with(ServerConfig::default().with_verbose(true)).await;

    let mut client = TestClient::connect(addr).await.unwrap();
    client.send_text("ping");
    assert_eq!(client.recv_text().await, Some("ping".to_string()));

    let empty: &[u8] = &[];
    client.send(empty);
    assert_eq!(client.recv().await, Some(Vec::new()));

    assert_eq!(client.close().await, "Connection closed by client");
    assert!(eventually(|| server.handle.connection_count() == 0).await);
    assert!(eventually(|| server.disconnects().len() == 1).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_server_destroy_disconnects_client() {
    let (server, addr) = TestServer::spawn().await;
    let mut client = TestClient::connect(addr).await.unwrap();
    assert!(eventually(|| server.handle.connection_count() == 1).await);

    let id = server.handle.connection_ids().remove(0);
    assert!(server.handle.destroy(&id));

    assert_eq!(client.disconnected().await, "Connection closed");
    assert!(eventually(|| server.handle.connection_count() == 0).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_connection_event_precedes_data() {
    let (server, mut events) = WebSocketServer::bind("127.0.0.1:0", ServerConfig::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client = TestClient::connect(addr).await.unwrap();
    client.send_text("first");

    let connected = match tokio::time::timeout(WAIT, events.recv()).await.unwrap() {
        Some(ServerEvent::Connection(socket)) => socket,
        other => panic!("unexpected event {:?}", other),
    };
    match tokio::time::timeout(WAIT, events.recv()).await.unwrap() {
        Some(ServerEvent::Data(socket, payload)) => {
            assert_eq!(socket, connected);
            assert_eq!(payload, b"first");
        }
        other => panic!("unexpected event {:?}", other),
    }

    // The client's close byte has opcode nibble 0x9: an empty payload,
    // then end of stream.
    client.close().await;
    match tokio::time::timeout(WAIT, events.recv()).await.unwrap() {
        Some(ServerEvent::Data(socket, payload)) => {
            assert_eq!(socket, connected);
            assert!(payload.is_empty());
        }
        other => panic!("unexpected event {:?}", other),
    }
    match tokio::time::timeout(WAIT, events.recv()).await.unwrap() {
        Some(ServerEvent::Disconnect { id, reason }) => {
            assert_eq!(&id, connected.id());
            assert_eq!(reason, "Connection ended");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_peer_close_opcode_disconnects() {
    let (server, addr) = TestServer::spawn().await;
    let (mut stream, _, _) = raw_upgrade(addr).await;
    assert!(eventually(|| server.handle.connection_count() == 1).await);

    stream.write_all(&[0x88, 0x00]).await.unwrap();

    let mut rest = Vec::new();
    tokio::time::timeout(WAIT, stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());
    assert!(eventually(|| server.handle.connection_count() == 0).await);
    assert!(eventually(|| server.disconnects() == vec!["Connection closed".to_string()]).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_rejects_non_101_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = BytesMut::new();
        read_head(&mut stream, &mut buf, &Limits::default())
            .await
            .unwrap();
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nX-Reason: nope\r\n\r\n")
            .await
            .unwrap();
    });

    let err = TestClient::connect(addr).await.err().unwrap();
    assert_eq!(
        err,
        Error::HandshakeRejected(
            "Server responded with non-101 status: 404 Not Found\n\
             Response Headers Follow:\n\
             x-reason:nope\n"
                .into()
        )
    );
}

#[tokio::test]
async fn test_client_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, mut events) = WebSocketClient::new(ClientConfig::default());
    client.connect(&format!("ws://{}/", addr)).unwrap();

    match tokio::time::timeout(WAIT, events.recv()).await.unwrap() {
        Some(ClientEvent::ConnectFail(Error::Io(_))) => {}
        other => panic!("unexpected event {:?}", other),
    }
}
