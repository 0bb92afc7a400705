//! Integration tests: full classifier sessions over a real TCP
//! connection on localhost, with the stub engine behind the proxy.

use std::time::Duration;

use nna_core::{
    ACK_BYTE, AcceleratorConfig, AcceleratorProxy, ClassifierClient, ConnectionInfo,
    PACKET_BYTES, PACKET_COUNT, SAMPLE_COUNT, Session, SessionConfig, SessionId,
    SharedAccelerator, StubDriver, StubModel, TcpTransport, encode_samples,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ── Helpers ──────────────────────────────────────────────────────

/// Votes for `input[0] / 256` when every sample is equal, class 9
/// otherwise. A frame mixed from two clients therefore shows up as 9.
fn uniform_model() -> StubModel {
    StubModel::custom(|input, classes| {
        let first = input[0];
        let class = if input.iter().all(|&v| v == first) {
            (first / 256) as usize % classes
        } else {
            9
        };
        let mut out = vec![0; classes];
        out[class] = 100;
        out
    })
}

fn accelerator(driver: StubDriver, timeout: Duration) -> SharedAccelerator {
    let config = AcceleratorConfig {
        timeout,
        ..AcceleratorConfig::default()
    };
    AcceleratorProxy::configure(Box::new(driver), config)
        .unwrap()
        .into_shared()
}

/// Accept connections forever, one session task per connection.
async fn spawn_server(accelerator: SharedAccelerator) -> ConnectionInfo {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut next_id = 0;
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            next_id += 1;
            let accelerator = accelerator.clone();
            tokio::spawn(async move {
                let mut transport = TcpTransport::from_tcp(stream).unwrap();
                let mut session =
                    Session::new(SessionId::new(next_id), &SessionConfig::default(), accelerator)
                        .unwrap();
                let _ = session.run(&mut transport).await;
            });
        }
    });

    ConnectionInfo::new(addr.ip().to_string(), addr.port())
}

async fn read_reply(stream: &mut TcpStream) -> u8 {
    tokio::time::timeout(Duration::from_secs(5), stream.read_u8())
        .await
        .expect("timeout")
        .expect("read")
}

/// Assert nothing arrives within a short window.
async fn assert_silent(stream: &mut TcpStream) {
    let mut byte = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_millis(200), stream.read(&mut byte)).await;
    assert!(read.is_err(), "unexpected reply: {byte:?}");
}

/// Send one full frame and return every reply byte in order.
async fn send_frame(stream: &mut TcpStream, frame: &[u8]) -> Vec<u8> {
    let mut replies = Vec::new();
    for packet in frame.chunks(PACKET_BYTES) {
        stream.write_all(packet).await.unwrap();
        replies.push(read_reply(stream).await);
    }
    replies
}

// ── Protocol ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_acks_then_class() {
    let model = StubModel::custom(|_, classes| {
        let mut out = vec![0; classes];
        out[3] = 7;
        out
    });
    let accel = accelerator(StubDriver::default().with_model(model), Duration::from_secs(5));
    let info = spawn_server(accel).await;

    let mut stream = TcpStream::connect(info.to_string()).await.unwrap();
    let frame = encode_samples(&vec![0.5; SAMPLE_COUNT]);
    let replies = send_frame(&mut stream, &frame).await;

    assert_eq!(replies, vec![ACK_BYTE, ACK_BYTE, ACK_BYTE, 3]);
}

#[tokio::test]
async fn test_connection_persists_across_frames() {
    let accel = accelerator(
        StubDriver::default().with_model(uniform_model()),
        Duration::from_secs(5),
    );
    let info = spawn_server(accel).await;
    let mut stream = TcpStream::connect(info.to_string()).await.unwrap();

    for value in [1.0, 4.0, 2.0] {
        let replies = send_frame(&mut stream, &encode_samples(&vec![value; SAMPLE_COUNT])).await;
        assert_eq!(replies[PACKET_COUNT - 1], value as u8);
    }
}

#[tokio::test]
async fn test_wrong_size_fragment_is_dropped_silently() {
    let accel = accelerator(
        StubDriver::default().with_model(uniform_model()),
        Duration::from_secs(5),
    );
    let info = spawn_server(accel).await;
    let mut stream = TcpStream::connect(info.to_string()).await.unwrap();

    stream.write_all(&[0u8; 600]).await.unwrap();
    assert_silent(&mut stream).await;

    // The next full-size fragment still counts as the first of the frame.
    let replies = send_frame(&mut stream, &encode_samples(&vec![6.0; SAMPLE_COUNT])).await;
    assert_eq!(replies, vec![ACK_BYTE, ACK_BYTE, ACK_BYTE, 6]);
}

#[tokio::test]
async fn test_stalled_engine_keeps_server_live() {
    let accel = accelerator(
        StubDriver::default().never_completes(),
        Duration::from_millis(100),
    );
    let info = spawn_server(accel).await;
    let mut stream = TcpStream::connect(info.to_string()).await.unwrap();

    let frame = encode_samples(&vec![1.0; SAMPLE_COUNT]);
    for packet in frame.chunks(PACKET_BYTES).take(PACKET_COUNT - 1) {
        stream.write_all(packet).await.unwrap();
        assert_eq!(read_reply(&mut stream).await, ACK_BYTE);
    }
    stream.write_all(&frame[(PACKET_COUNT - 1) * PACKET_BYTES..]).await.unwrap();
    assert_silent(&mut stream).await;

    // A new frame starts and is acknowledged.
    stream.write_all(&frame[..PACKET_BYTES]).await.unwrap();
    assert_eq!(read_reply(&mut stream).await, ACK_BYTE);
}

#[tokio::test]
async fn test_concurrent_connections_do_not_mix() {
    let accel = accelerator(
        StubDriver::default().with_model(uniform_model()),
        Duration::from_secs(5),
    );
    let info = spawn_server(accel).await;

    let mut a = TcpStream::connect(info.to_string()).await.unwrap();
    let mut b = TcpStream::connect(info.to_string()).await.unwrap();
    let frame_a = encode_samples(&vec![1.0; SAMPLE_COUNT]);
    let frame_b = encode_samples(&vec![5.0; SAMPLE_COUNT]);

    let mut last = (0, 0);
    for (pa, pb) in frame_a.chunks(PACKET_BYTES).zip(frame_b.chunks(PACKET_BYTES)) {
        a.write_all(pa).await.unwrap();
        b.write_all(pb).await.unwrap();
        last = (read_reply(&mut a).await, read_reply(&mut b).await);
    }

    assert_eq!(last, (1, 5));
}

#[tokio::test]
async fn test_peer_close_mid_frame() {
    let accel = accelerator(
        StubDriver::default().with_model(uniform_model()),
        Duration::from_secs(5),
    );
    let info = spawn_server(accel).await;

    {
        let mut partial = TcpStream::connect(info.to_string()).await.unwrap();
        partial.write_all(&[0u8; PACKET_BYTES]).await.unwrap();
        assert_eq!(read_reply(&mut partial).await, ACK_BYTE);
    }

    let mut stream = TcpStream::connect(info.to_string()).await.unwrap();
    let replies = send_frame(&mut stream, &encode_samples(&vec![2.0; SAMPLE_COUNT])).await;
    assert_eq!(replies, vec![ACK_BYTE, ACK_BYTE, ACK_BYTE, 2]);
}

// ── Client ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_client_round_trip() {
    let accel = accelerator(
        StubDriver::default().with_model(uniform_model()),
        Duration::from_secs(5),
    );
    let info = spawn_server(accel).await;

    let mut client = ClassifierClient::connect(&info).await.unwrap();
    assert_eq!(client.classify(&vec![3.0; SAMPLE_COUNT]).await.unwrap(), 3);

    // White ROI normalises to 1.0 everywhere.
    assert_eq!(client.classify_roi(&[255u8; SAMPLE_COUNT]).await.unwrap(), 1);
}
