use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time;

use bgh_local_climate::climate::protocol;
use bgh_local_climate::climate::types::{AcMode, ClimateConfig, FanSpeed, LinkError};
use bgh_local_climate::climate::{Climate, ClimateError};

fn status_frame(mode: u8, fan: u8, current_hundredths: u16, target_hundredths: u16) -> Vec<u8> {
    let mut frame = vec![0u8; protocol::STATUS_MIN_LEN];
    frame[protocol::STATUS_MODE_OFFSET] = mode;
    frame[protocol::STATUS_FAN_OFFSET] = fan;
    frame[protocol::STATUS_CURRENT_TEMP_RANGE].copy_from_slice(&current_hundredths.to_le_bytes());
    frame[protocol::STATUS_TARGET_TEMP_RANGE].copy_from_slice(&target_hundredths.to_le_bytes());
    frame
}

fn test_config(unit_addr: SocketAddr) -> ClimateConfig {
    let mut config = ClimateConfig::new("test-unit", unit_addr.ip());
    config.port = unit_addr.port();
    config.local_port = 0;
    // keep the scheduled poller out of the way; tests drive polls themselves
    config.poll_interval = Duration::from_secs(3600);
    config.response_timeout = Duration::from_millis(250);
    config.settle_delay = Duration::from_millis(50);
    config
}

async fn bind_unit() -> (UdpSocket, SocketAddr) {
    let unit = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = unit.local_addr().unwrap();
    (unit, addr)
}

/// A unit that applies command frames to its own state and reports that
/// state back on every status request. Every received frame is forwarded
/// to `seen` when a channel is given.
fn spawn_scripted_unit(unit: UdpSocket, seen: Option<mpsc::UnboundedSender<Vec<u8>>>) {
    tokio::spawn(async move {
        let mut mode = 1u8;
        let mut fan = 254u8;
        let mut target = 2400u16;
        let mut buf = [0u8; 64];
        loop {
            let (len, from) = match unit.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(_) => return,
            };
            if let Some(seen) = &seen {
                if seen.send(buf[..len].to_vec()).is_err() {
                    return;
                }
            }
            if buf[..len] == protocol::STATUS_REQUEST {
                let frame = status_frame(mode, fan, 2210, target);
                let _ = unit.send_to(&frame, from).await;
            } else if len >= protocol::COMMAND_HEADER.len() {
                mode = buf[protocol::COMMAND_MODE_OFFSET];
                fan = buf[protocol::COMMAND_FAN_OFFSET];
                if len >= protocol::COMMAND_TEMP_FRAME_LEN {
                    target = u16::from_le_bytes([buf[23], buf[24]]);
                }
            }
        }
    });
}

#[tokio::test]
async fn poll_merges_reported_state() {
    let (unit, unit_addr) = bind_unit().await;
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        loop {
            let (len, from) = unit.recv_from(&mut buf).await.unwrap();
            if buf[..len] == protocol::STATUS_REQUEST {
                let frame = status_frame(1, 3, 2210, 2550);
                unit.send_to(&frame, from).await.unwrap();
            }
        }
    });

    let climate = Climate::start(test_config(unit_addr)).await.unwrap();
    climate.poll().await.unwrap();

    let status = climate.status();
    assert_eq!(status.mode, AcMode::Cool);
    assert_eq!(status.fan, FanSpeed::High);
    assert_eq!(status.current_temperature, Some(22.1));
    assert_eq!(status.target_temperature, 25.5);
    assert!(status.available);
    climate.stop();
}

#[tokio::test]
async fn timeout_keeps_last_known_state() {
    let (unit, unit_addr) = bind_unit().await;
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        // answer the startup poll, then go silent
        let (len, from) = unit.recv_from(&mut buf).await.unwrap();
        if buf[..len] == protocol::STATUS_REQUEST {
            let frame = status_frame(2, 254, 2000, 2400);
            unit.send_to(&frame, from).await.unwrap();
        }
        loop {
            unit.recv_from(&mut buf).await.unwrap();
        }
    });

    let climate = Climate::start(test_config(unit_addr)).await.unwrap();
    let mut updates = climate.subscribe();
    updates.changed().await.unwrap();
    assert!(updates.borrow().available);

    let err = climate.poll().await.unwrap_err();
    assert!(matches!(err, ClimateError::Link(LinkError::Timeout(_))));

    let status = climate.status();
    assert!(!status.available);
    assert_eq!(status.mode, AcMode::Heat);
    assert_eq!(status.current_temperature, Some(20.0));
    assert_eq!(status.target_temperature, 24.0);
    climate.stop();
}

#[tokio::test]
async fn out_of_range_target_is_rejected_before_transmission() {
    let (unit, unit_addr) = bind_unit().await;
    let (seen_sender, mut seen_receiver) = mpsc::unbounded_channel();
    spawn_scripted_unit(unit, Some(seen_sender));

    let climate = Climate::start(test_config(unit_addr)).await.unwrap();
    let mut updates = climate.subscribe();
    updates.changed().await.unwrap();

    let err = climate.set_target_temperature(16.9).await.unwrap_err();
    assert!(matches!(
        err,
        ClimateError::TargetTemperatureOutOfRange(_)
    ));

    time::sleep(Duration::from_millis(100)).await;
    let mut frames = Vec::new();
    while let Ok(frame) = seen_receiver.try_recv() {
        frames.push(frame);
    }
    // only the startup poll went out, no command frame
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|f| f[..] == protocol::STATUS_REQUEST));
    climate.stop();
}

#[tokio::test]
async fn target_temperature_change_is_confirmed_by_poll() {
    let (unit, unit_addr) = bind_unit().await;
    spawn_scripted_unit(unit, None);

    let climate = Climate::start(test_config(unit_addr)).await.unwrap();
    climate.set_target_temperature(25.5).await.unwrap();

    let status = climate.status();
    assert_eq!(status.target_temperature, 25.5);
    assert!(status.available);
    climate.stop();
}

#[tokio::test]
async fn mode_change_round_trips_through_the_unit() {
    let (unit, unit_addr) = bind_unit().await;
    spawn_scripted_unit(unit, None);

    let climate = Climate::start(test_config(unit_addr)).await.unwrap();
    let mut updates = climate.subscribe();
    updates.changed().await.unwrap();

    climate.set_mode(AcMode::Dry).await.unwrap();
    let status = climate.status();
    assert_eq!(status.mode, AcMode::Dry);
    assert!(status.available);

    climate.set_fan_speed(FanSpeed::Low).await.unwrap();
    let status = climate.status();
    assert_eq!(status.fan, FanSpeed::Low);
    assert_eq!(status.mode, AcMode::Dry);
    climate.stop();
}

#[tokio::test]
async fn concurrent_commands_never_interleave() {
    let (unit, unit_addr) = bind_unit().await;
    let (seen_sender, mut seen_receiver) = mpsc::unbounded_channel();
    spawn_scripted_unit(unit, Some(seen_sender));

    let climate = Arc::new(Climate::start(test_config(unit_addr)).await.unwrap());
    let mut updates = climate.subscribe();
    updates.changed().await.unwrap();

    let first = {
        let climate = climate.clone();
        tokio::spawn(async move { climate.set_mode(AcMode::Heat).await })
    };
    let second = {
        let climate = climate.clone();
        tokio::spawn(async move { climate.set_fan_speed(FanSpeed::High).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // startup poll, then two full command/confirm cycles with no overlap
    let mut kinds = Vec::new();
    for _ in 0..5 {
        let frame = time::timeout(Duration::from_secs(1), seen_receiver.recv())
            .await
            .unwrap()
            .unwrap();
        kinds.push(if frame[..] == protocol::STATUS_REQUEST {
            "status"
        } else {
            "command"
        });
    }
    assert_eq!(
        kinds,
        vec!["status", "command", "status", "command", "status"]
    );

    let status = climate.status();
    assert_eq!(status.mode, AcMode::Heat);
    assert_eq!(status.fan, FanSpeed::High);
    climate.stop();
}

#[tokio::test]
async fn stop_unblocks_pending_exchange() {
    let (unit, unit_addr) = bind_unit().await;
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        loop {
            unit.recv_from(&mut buf).await.unwrap();
        }
    });

    let mut config = test_config(unit_addr);
    config.response_timeout = Duration::from_secs(5);

    let climate = Climate::start(config).await.unwrap();
    // let the startup poll get as far as waiting on a reply
    time::sleep(Duration::from_millis(50)).await;
    climate.stop();
    climate.stop();

    // the session winds down well before the 5s receive deadline
    time::sleep(Duration::from_millis(50)).await;
    let err = climate.poll().await.unwrap_err();
    assert!(matches!(err, ClimateError::Send));
    assert!(!climate.status().available);
}

#[tokio::test]
async fn start_fails_when_local_port_is_taken() {
    let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let local_port = taken.local_addr().unwrap().port();

    let mut config = ClimateConfig::new("test-unit", IpAddr::V4(Ipv4Addr::LOCALHOST));
    config.local_port = local_port;

    let err = Climate::start(config).await.unwrap_err();
    assert!(
        matches!(err, ClimateError::Link(LinkError::Bind(port, _)) if port == local_port)
    );
}
