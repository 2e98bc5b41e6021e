mod common;
use common::*;
use phocus_bridge::prelude::*;
use phocus_bridge::transport::codec::MAX_FRAME_LEN;
use phocus_bridge::transport::{FrameDecoder, LineTransport, StreamTransport};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Decoder;

const TIMEOUT: Duration = Duration::from_millis(200);

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn connected(port: u16) -> StreamTransport {
    let mut transport = StreamTransport::new("127.0.0.1", port, 1);
    transport.open().await.unwrap();
    transport
}

#[tokio::test]
async fn stream_round_trip_across_partial_reads() {
    common_setup();
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let expected = crc::encode(b"QPGS1");
        let mut request = vec![0; expected.len()];
        socket.read_exact(&mut request).await.unwrap();
        assert_eq!(request, expected);

        let reply = Factory::status_frame();
        let (head, tail) = reply.split_at(40);
        socket.write_all(head).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        socket.write_all(tail).await.unwrap();
        socket
    });

    let mut transport = connected(port).await;
    assert!(transport.is_open());
    assert_eq!(transport.write(b"QPGS1").await.unwrap(), 8);

    let frame = transport.read(TIMEOUT).await.unwrap();
    assert_eq!(frame, Factory::status_frame());
    assert!(crc::verify(&frame));

    let _socket = server.await.unwrap();
    transport.close().await.unwrap();
}

#[tokio::test]
async fn stream_silence_is_no_data() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move { listener.accept().await.unwrap().0 });

    let mut transport = connected(port).await;
    let _socket = server.await.unwrap();

    assert!(matches!(transport.read(Duration::from_millis(50)).await, Err(Error::NoData)));
}

#[tokio::test]
async fn stream_partial_frame_is_incomplete() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"(ACK").await.unwrap();
        socket
    });

    let mut transport = connected(port).await;
    let _socket = server.await.unwrap();

    match transport.read(Duration::from_millis(50)).await {
        Err(Error::Incomplete(bytes)) => assert_eq!(bytes, b"(ACK"),
        other => panic!("expected Incomplete, got {:?}", other),
    }
}

#[tokio::test]
async fn stream_peer_close_is_an_error() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let mut transport = connected(port).await;
    server.await.unwrap();

    match transport.read(TIMEOUT).await {
        Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected Io(UnexpectedEof), got {:?}", other),
    }
}

#[tokio::test]
async fn stream_returns_one_frame_per_read() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut both = Factory::frame("(ACK");
        both.extend(Factory::frame("(NAK"));
        socket.write_all(&both).await.unwrap();
        socket
    });

    let mut transport = connected(port).await;
    let _socket = server.await.unwrap();
    // give both frames time to land in one read
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(transport.read(TIMEOUT).await.unwrap(), Factory::frame("(ACK"));
}

#[tokio::test]
async fn stream_requires_open() {
    let mut transport = StreamTransport::new("127.0.0.1", 1, 1);
    assert!(!transport.is_open());
    assert!(matches!(transport.read(TIMEOUT).await, Err(Error::NotOpen)));
    assert!(matches!(transport.write(b"QID").await, Err(Error::NotOpen)));

    // closing a closed stream is fine
    transport.close().await.unwrap();
    transport.close().await.unwrap();
}

#[tokio::test]
async fn stream_open_gives_up_after_retries() {
    // grab a free port, then stop listening on it
    let (listener, port) = listener().await;
    drop(listener);

    let mut transport = StreamTransport::new("127.0.0.1", port, 2);
    match transport.open().await {
        Err(Error::OpenFailed { target, attempts, .. }) => {
            assert_eq!(target, format!("127.0.0.1:{}", port));
            assert_eq!(attempts, 2);
        }
        other => panic!("expected OpenFailed, got {:?}", other.map(|_| ())),
    }
    assert!(!transport.is_open());
}

#[tokio::test]
async fn port_delegates_to_stream() {
    let (listener, tcp_port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _): (TcpStream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 6];
        socket.read_exact(&mut request).await.unwrap();
        assert_eq!(&request[..], &crc::encode(b"QID")[..]);
        socket.write_all(&Factory::identification_frame()).await.unwrap();
        socket
    });

    let mut port = Port::from_config(&config::Connection::Ip {
        host: "127.0.0.1".to_owned(),
        port: tcp_port,
        retries: 1,
    });
    assert!(matches!(port, Port::Stream(_)));
    assert_eq!(port.describe(), format!("127.0.0.1:{}", tcp_port));

    port.open().await.unwrap();
    port.write(b"QID").await.unwrap();
    assert_eq!(port.read(TIMEOUT).await.unwrap(), Factory::identification_frame());

    let _socket = server.await.unwrap();
    port.close().await.unwrap();
}

#[test]
fn port_from_serial_config() {
    let port = Port::from_config(&config::Connection::Serial {
        port: "/dev/ttyUSB0".to_owned(),
        baud: 2400,
        retries: 5,
    });
    assert!(matches!(port, Port::Line(_)));
    assert_eq!(port.describe(), "/dev/ttyUSB0@2400");
}

#[tokio::test]
async fn line_requires_open() {
    let mut transport = LineTransport::new("/dev/does-not-exist", 2400, 1);
    assert_eq!(transport.describe(), "/dev/does-not-exist@2400");
    assert!(!transport.is_open());

    assert!(matches!(transport.read(TIMEOUT).await, Err(Error::NotOpen)));
    assert!(matches!(transport.write(b"QID").await, Err(Error::NotOpen)));
    // unlike the stream, closing a closed line is an error
    assert!(matches!(transport.close().await, Err(Error::NotOpen)));
}

#[tokio::test]
async fn line_open_failure_is_reported() {
    let mut transport = LineTransport::new("/dev/does-not-exist", 2400, 2);
    assert!(matches!(
        transport.open().await,
        Err(Error::OpenFailed { attempts: 2, .. })
    ));
}

#[test]
fn decoder_splits_on_delimiter() {
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::from(&b"(AC"[..]);
    assert!(decoder.decode(&mut buf).unwrap().is_none());

    buf.extend_from_slice(b"K\x39\x20\r(NA");
    let frame = decoder.decode(&mut buf).unwrap().unwrap();
    assert_eq!(&frame[..], b"(ACK\x39\x20\r");
    assert_eq!(&buf[..], b"(NA");
}

#[test]
fn decoder_rejects_runaway_frames() {
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::from(&vec![b'x'; MAX_FRAME_LEN + 1][..]);
    assert!(matches!(decoder.decode(&mut buf), Err(Error::FrameTooLong { max }) if max == MAX_FRAME_LEN));
}
