//! Integration tests exercising the full daemon event loop on loopback.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use remote_km_daemon::config::{Config, ControllerConfig, DaemonConfig};
use remote_km_daemon::{Backends, Daemon, DaemonError, DaemonEvent, DaemonStatus, Mode};
use remote_km_input::mock::{
    MockInterception, MockInterceptionHandle, MockSynthesis, MockSynthesisHandle, SynthesizedCall,
};
use remote_km_input::{Disposition, HookClass, RawEvent};
use remote_km_types::{Point, VK_SCROLL};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// A running daemon wired to mock backends.
struct TestDaemon {
    events: mpsc::Sender<DaemonEvent>,
    status: watch::Receiver<DaemonStatus>,
    interception: MockInterceptionHandle,
    synthesis: MockSynthesisHandle,
    handle: JoinHandle<Result<(), DaemonError>>,
}

impl TestDaemon {
    async fn shutdown(self) -> Result<(), DaemonError> {
        let _ = self.events.send(DaemonEvent::Shutdown).await;
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("daemon did not stop")
            .expect("daemon task panicked")
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn test_config(mode: Mode, target_port: u16) -> Config {
    Config {
        daemon: DaemonConfig {
            mode,
            port: target_port,
            bind: "127.0.0.1".to_string(),
            ..DaemonConfig::default()
        },
        controller: ControllerConfig {
            target: "127.0.0.1".to_string(),
        },
        ..Config::default()
    }
}

fn spawn_daemon(config: Config, setup: impl FnOnce(&MockInterceptionHandle)) -> TestDaemon {
    init_tracing();
    let interception = MockInterception::new();
    let interception_handle = interception.handle();
    setup(&interception_handle);
    let synthesis = MockSynthesis::new();
    let synthesis_handle = synthesis.handle();

    let mut daemon = Daemon::new(
        config,
        Backends::with_synthesis(Arc::new(interception), Box::new(synthesis)),
    );
    let events = daemon.event_sender();
    let status = daemon.status_receiver();
    let handle = tokio::spawn(async move { daemon.run().await });

    TestDaemon {
        events,
        status,
        interception: interception_handle,
        synthesis: synthesis_handle,
        handle,
    }
}

/// Wait for a condition on a status receiver with timeout.
async fn wait_for_status(
    rx: &mut watch::Receiver<DaemonStatus>,
    timeout: Duration,
    pred: impl Fn(&DaemonStatus) -> bool,
) -> Result<DaemonStatus, &'static str> {
    tokio::time::timeout(timeout, async {
        loop {
            {
                let status = rx.borrow_and_update().clone();
                if pred(&status) {
                    return Ok(status);
                }
            }
            if rx.changed().await.is_err() {
                return Err("watch closed");
            }
        }
    })
    .await
    .map_err(|_| "timeout")?
}

/// Wait until the mock synthesis has recorded at least `n` calls.
async fn wait_for_calls(handle: &MockSynthesisHandle, n: usize) -> Vec<SynthesizedCall> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let calls = handle.calls();
            if calls.len() >= n {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for synthesis calls")
}

async fn recv_datagram(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = [0u8; 64];
    let (n, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for datagram")
        .unwrap();
    buf[..n].to_vec()
}

#[tokio::test]
async fn test_controller_toggle_and_send() {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = peer.local_addr().unwrap().port();
    let mut d = spawn_daemon(test_config(Mode::Controller, port), |h| {
        h.set_cursor(Point::new(500, 300));
    });

    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Controller)
    })
    .await
    .unwrap();
    assert_eq!(status.to_string(), "Ready - Press Scroll Lock to control");
    assert!(d.interception.is_installed(HookClass::Keyboard));
    assert!(d.interception.is_installed(HookClass::Mouse));

    // Idle: input passes through and nothing is sent.
    d.interception.feed(RawEvent::Key {
        vk_code: 0x41,
        down: true,
    });

    d.events.send(DaemonEvent::ToggleCapture).await.unwrap();
    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| s.capturing)
        .await
        .unwrap();
    assert_eq!(status.to_string(), "ACTIVE - Sending to 127.0.0.1");
    assert!(d.interception.current_confinement().unwrap().is_single_point());

    d.interception.feed(RawEvent::MouseMove {
        point: Point::new(495, 312),
    });
    d.interception.feed(RawEvent::Key {
        vk_code: 0x42,
        down: true,
    });

    assert_eq!(recv_datagram(&peer).await, vec![0x01, 0xFB, 0xFF, 0x0C, 0x00]);
    assert_eq!(recv_datagram(&peer).await, vec![0x03, 0x42, 0x01]);

    // Releasing the toggle key ends capture.
    d.interception.feed(RawEvent::Key {
        vk_code: VK_SCROLL,
        down: true,
    });
    d.interception.feed(RawEvent::Key {
        vk_code: VK_SCROLL,
        down: false,
    });
    wait_for_status(&mut d.status, Duration::from_secs(5), |s| !s.capturing)
        .await
        .unwrap();
    assert_eq!(d.interception.current_confinement(), None);

    d.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_receiver_replays_keys() {
    let mut d = spawn_daemon(test_config(Mode::Receiver, 0), |_| {});

    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Receiver)
    })
    .await
    .unwrap();
    let port = status.listen_port.unwrap();
    assert_eq!(status.to_string(), format!("Listening on port {port}"));
    assert!(d.interception.installed_classes().is_empty());

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    client.send_to(&[0x03, 0x41, 0x01], addr).await.unwrap();
    client.send_to(&[0x03, 0x41, 0x00], addr).await.unwrap();

    let calls = wait_for_calls(&d.synthesis, 2).await;
    assert_eq!(
        calls,
        vec![
            SynthesizedCall::Key {
                vk_code: 0x41,
                down: true
            },
            SynthesizedCall::Key {
                vk_code: 0x41,
                down: false
            },
        ]
    );

    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| s.peer.is_some())
        .await
        .unwrap();
    assert_eq!(status.peer, Some(client.local_addr().unwrap()));
    assert_eq!(status.to_string(), "Receiving from 127.0.0.1");

    d.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_receiver_drops_malformed_and_continues() {
    let mut d = spawn_daemon(test_config(Mode::Receiver, 0), |_| {});
    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.listen_port.is_some()
    })
    .await
    .unwrap();
    let addr: SocketAddr = format!("127.0.0.1:{}", status.listen_port.unwrap())
        .parse()
        .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&[0x09, 0x00], addr).await.unwrap();
    client.send_to(&[0x01, 0x05], addr).await.unwrap();
    client.send_to(&[0x04, 0x88, 0xFF], addr).await.unwrap();

    let calls = wait_for_calls(&d.synthesis, 1).await;
    assert_eq!(calls, vec![SynthesizedCall::Scroll { delta: -120 }]);

    d.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_set_mode_tears_down_controller() {
    let mut d = spawn_daemon(test_config(Mode::Controller, 0), |_| {});

    wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Controller)
    })
    .await
    .unwrap();
    d.events.send(DaemonEvent::ToggleCapture).await.unwrap();
    wait_for_status(&mut d.status, Duration::from_secs(5), |s| s.capturing)
        .await
        .unwrap();

    d.events
        .send(DaemonEvent::SetTarget("not-an-ip".to_string()))
        .await
        .unwrap();
    d.events
        .send(DaemonEvent::SetTarget("127.0.0.2".to_string()))
        .await
        .unwrap();
    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.target.map(|t| t.ip().to_string()) == Some("127.0.0.2".to_string())
    })
    .await
    .unwrap();
    assert_eq!(status.target.unwrap().port(), 0);

    // Toggle is ignored once the controller is gone.
    d.events.send(DaemonEvent::SetMode(Mode::Receiver)).await.unwrap();
    d.events.send(DaemonEvent::ToggleCapture).await.unwrap();
    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Receiver)
    })
    .await
    .unwrap();
    assert!(!status.capturing);
    assert!(d.interception.installed_classes().is_empty());
    assert_eq!(d.interception.current_confinement(), None);

    d.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_mode_round_trip_reuses_synthesis() {
    let mut d = spawn_daemon(test_config(Mode::Receiver, 0), |_| {});
    wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Receiver)
    })
    .await
    .unwrap();

    d.events.send(DaemonEvent::SetMode(Mode::Controller)).await.unwrap();
    wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Controller)
    })
    .await
    .unwrap();
    assert!(d.interception.is_installed(HookClass::Keyboard));

    d.events.send(DaemonEvent::SetMode(Mode::Receiver)).await.unwrap();
    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Receiver) && s.listen_port.is_some()
    })
    .await
    .unwrap();
    assert!(status.error.is_none());
    assert!(d.interception.installed_classes().is_empty());

    let synthesis = d.synthesis.clone();
    d.shutdown().await.unwrap();
    assert!(synthesis.is_shutdown());
}

#[tokio::test]
async fn test_hook_failure_on_mode_switch() {
    let mut d = spawn_daemon(test_config(Mode::Receiver, 0), |h| {
        h.fail_install(Some(HookClass::Keyboard));
    });
    wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Receiver)
    })
    .await
    .unwrap();

    d.events.send(DaemonEvent::SetMode(Mode::Controller)).await.unwrap();
    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| s.error.is_some())
        .await
        .unwrap();
    assert_eq!(status.mode, None);
    assert!(status.error.unwrap().contains("keyboard"));
    assert!(d.interception.installed_classes().is_empty());

    // The daemon keeps running and can recover.
    d.interception.fail_install(None);
    d.events.send(DaemonEvent::SetMode(Mode::Controller)).await.unwrap();
    wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Controller) && s.error.is_none()
    })
    .await
    .unwrap();

    d.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_hook_failure_at_startup_is_fatal() {
    let d = spawn_daemon(test_config(Mode::Controller, 9876), |h| {
        h.fail_install(Some(HookClass::Mouse));
    });

    let result = tokio::time::timeout(Duration::from_secs(5), d.handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(DaemonError::Input(_))));
    assert!(d.interception.installed_classes().is_empty());
}

#[tokio::test]
async fn test_invalid_target_is_fatal() {
    let mut config = test_config(Mode::Controller, 9876);
    config.controller.target = "receiver.local".to_string();
    let d = spawn_daemon(config, |_| {});

    let result = tokio::time::timeout(Duration::from_secs(5), d.handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(DaemonError::Protocol(_))));
}

#[tokio::test]
async fn test_receiver_ignores_target() {
    for target in ["", "receiver.local"] {
        let mut config = test_config(Mode::Receiver, 0);
        config.controller.target = target.to_string();
        let mut d = spawn_daemon(config, |_| {});

        let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
            s.mode == Some(Mode::Receiver)
        })
        .await
        .unwrap();
        assert!(status.error.is_none());
        assert_eq!(status.target, None);

        d.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn test_controller_without_target_sends_nothing() {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = peer.local_addr().unwrap().port();
    let mut config = test_config(Mode::Controller, port);
    config.controller.target = String::new();
    let mut d = spawn_daemon(config, |_| {});

    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| {
        s.mode == Some(Mode::Controller)
    })
    .await
    .unwrap();
    assert_eq!(status.target, None);

    d.events.send(DaemonEvent::ToggleCapture).await.unwrap();
    let status = wait_for_status(&mut d.status, Duration::from_secs(5), |s| s.capturing)
        .await
        .unwrap();
    assert_eq!(status.to_string(), "ACTIVE - No target");

    // Captured input is still swallowed locally, it just goes nowhere.
    let key = RawEvent::Key {
        vk_code: 0x41,
        down: true,
    };
    assert_eq!(d.interception.feed(key), Disposition::Consume);
    assert_eq!(
        d.interception.feed(RawEvent::Other {
            class: HookClass::Mouse
        }),
        Disposition::Consume
    );
    let mut buf = [0u8; 64];
    assert!(
        tokio::time::timeout(Duration::from_millis(200), peer.recv_from(&mut buf))
            .await
            .is_err()
    );

    // Setting a target at runtime starts the flow.
    d.events
        .send(DaemonEvent::SetTarget("127.0.0.1".to_string()))
        .await
        .unwrap();
    wait_for_status(&mut d.status, Duration::from_secs(5), |s| s.target.is_some())
        .await
        .unwrap();
    d.interception.feed(RawEvent::Key {
        vk_code: 0x42,
        down: true,
    });
    assert_eq!(recv_datagram(&peer).await, vec![0x03, 0x42, 0x01]);

    d.shutdown().await.unwrap();
}
