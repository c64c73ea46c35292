//! Integration test: UDP sender and receiver on loopback.

use std::net::SocketAddr;
use std::time::Duration;

use remote_km_protocol::{ReceiverEvent, UdpReceiver, UdpSender};
use remote_km_types::{MouseButtonId, WireMessage};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_receiver() -> (
    SocketAddr,
    watch::Sender<bool>,
    mpsc::Receiver<ReceiverEvent>,
    tokio::task::JoinHandle<()>,
) {
    let receiver = UdpReceiver::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = receiver.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (tx, rx) = mpsc::channel(64);
    let handle = tokio::spawn(receiver.run(shutdown_rx, tx));
    (addr, shutdown_tx, rx, handle)
}

async fn next(rx: &mut mpsc::Receiver<ReceiverEvent>) -> ReceiverEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for receiver event")
        .expect("receiver channel closed")
}

#[tokio::test]
async fn messages_arrive_in_order_after_peer_change() {
    let (addr, shutdown_tx, mut rx, handle) = spawn_receiver().await;

    let sender = UdpSender::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    sender.set_target(addr);
    let sender_addr = sender.local_addr().unwrap();

    let msgs = [
        WireMessage::MouseMove { dx: -5, dy: 12 },
        WireMessage::MouseButton {
            button: MouseButtonId::Aux1,
            down: true,
        },
        WireMessage::Key {
            vk_code: 0x41,
            down: true,
        },
        WireMessage::Scroll { delta: -120 },
    ];
    for msg in &msgs {
        sender.send(msg).unwrap();
    }
    assert_eq!(sender.datagrams_sent(), msgs.len() as u64);

    assert_eq!(next(&mut rx).await, ReceiverEvent::PeerChanged(sender_addr));
    for msg in msgs {
        assert_eq!(next(&mut rx).await, ReceiverEvent::Message(msg));
    }

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn peer_change_reported_once_per_new_sender() {
    let (addr, shutdown_tx, mut rx, handle) = spawn_receiver().await;

    let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let key = [0x03, 0x41, 0x01];

    a.send_to(&key, addr).await.unwrap();
    assert_eq!(
        next(&mut rx).await,
        ReceiverEvent::PeerChanged(a.local_addr().unwrap())
    );
    assert!(matches!(next(&mut rx).await, ReceiverEvent::Message(_)));

    a.send_to(&key, addr).await.unwrap();
    assert!(matches!(next(&mut rx).await, ReceiverEvent::Message(_)));

    b.send_to(&key, addr).await.unwrap();
    assert_eq!(
        next(&mut rx).await,
        ReceiverEvent::PeerChanged(b.local_addr().unwrap())
    );
    assert!(matches!(next(&mut rx).await, ReceiverEvent::Message(_)));

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_datagrams_are_skipped() {
    let (addr, shutdown_tx, mut rx, handle) = spawn_receiver().await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&[0x09, 0x00, 0x00], addr).await.unwrap();
    socket.send_to(&[0x01, 0x02], addr).await.unwrap();
    socket.send_to(&[0x02, 0x07, 0x01], addr).await.unwrap();
    socket.send_to(&[0x04, 0x78, 0x00], addr).await.unwrap();

    // The peer is reported on the first datagram even though it is garbage.
    assert_eq!(
        next(&mut rx).await,
        ReceiverEvent::PeerChanged(socket.local_addr().unwrap())
    );
    assert_eq!(
        next(&mut rx).await,
        ReceiverEvent::Message(WireMessage::Scroll { delta: 120 })
    );

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn receiver_stops_when_consumer_dropped() {
    let (addr, _shutdown_tx, rx, handle) = spawn_receiver().await;
    drop(rx);

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&[0x03, 0x41, 0x01], addr).await.unwrap();

    timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn receiver_stops_on_shutdown_without_traffic() {
    let (_addr, shutdown_tx, _rx, handle) = spawn_receiver().await;
    shutdown_tx.send(true).unwrap();
    timeout(WAIT, handle).await.unwrap().unwrap();
}
