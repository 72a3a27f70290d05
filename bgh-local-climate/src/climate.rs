use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};

use crate::climate::types::{
    AcLink, AcMode, AcStatus, ClimateConfig, FanSpeed, LinkError, MAX_TARGET_TEMPERATURE,
    MIN_TARGET_TEMPERATURE,
};

pub mod commands;
pub mod protocol;
pub mod types;

#[derive(Error, Debug)]
pub enum ClimateError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("Target temperature {0} is outside the supported range")]
    TargetTemperatureOutOfRange(f32),
    #[error("Could not send message to climate session")]
    Send,
    #[error("Climate session stopped before replying")]
    Reply,
}

pub type Result<T> = std::result::Result<T, ClimateError>;

enum ClimateMessage {
    Poll {
        reply: oneshot::Sender<Result<()>>,
    },
    SetMode {
        mode: AcMode,
        reply: oneshot::Sender<Result<()>>,
    },
    SetFanSpeed {
        fan: FanSpeed,
        reply: oneshot::Sender<Result<()>>,
    },
    SetTargetTemperature {
        value: f32,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to one unit's session. The session task owns the socket and the
/// last-known state; every poll and command funnels through it one at a
/// time, in arrival order.
#[derive(Debug)]
pub struct Climate {
    status_receiver: watch::Receiver<AcStatus>,
    message_sender: mpsc::UnboundedSender<ClimateMessage>,
    stop_sender: watch::Sender<bool>,
}

impl Climate {
    pub async fn start(config: ClimateConfig) -> Result<Climate> {
        let link = AcLink::connect(&config).await?;
        info!(
            "[{}] bound local udp port {} for unit {}:{}",
            config.name, config.local_port, config.address, config.port
        );

        let (status_sender, status_receiver) = watch::channel(AcStatus::default());
        let (message_sender, message_receiver) = mpsc::unbounded_channel();
        let (stop_sender, stop_receiver) = watch::channel(false);
        tokio::spawn(run_session(
            link,
            config,
            status_sender,
            message_receiver,
            stop_receiver,
        ));

        Ok(Climate {
            status_receiver,
            message_sender,
            stop_sender,
        })
    }

    /// Snapshots are published after every poll, successful or not.
    pub fn subscribe(&self) -> watch::Receiver<AcStatus> {
        self.status_receiver.clone()
    }

    pub fn status(&self) -> AcStatus {
        self.status_receiver.borrow().clone()
    }

    /// One status exchange with the unit. Fields that decode cleanly are
    /// merged into state; on timeout or transport failure the previous
    /// values stay and the unit is marked unavailable.
    pub async fn poll(&self) -> Result<()> {
        self.request(|reply| ClimateMessage::Poll { reply }).await
    }

    pub async fn set_mode(&self, mode: AcMode) -> Result<()> {
        self.request(|reply| ClimateMessage::SetMode { mode, reply })
            .await
    }

    pub async fn set_fan_speed(&self, fan: FanSpeed) -> Result<()> {
        self.request(|reply| ClimateMessage::SetFanSpeed { fan, reply })
            .await
    }

    pub async fn set_target_temperature(&self, value: f32) -> Result<()> {
        if !(MIN_TARGET_TEMPERATURE..=MAX_TARGET_TEMPERATURE).contains(&value) {
            return Err(ClimateError::TargetTemperatureOutOfRange(value));
        }
        let value = (value * 10.0).round() / 10.0;
        self.request(|reply| ClimateMessage::SetTargetTemperature { value, reply })
            .await
    }

    /// Stops the session and unblocks any in-flight exchange. Safe to call
    /// more than once; later operations fail with [`ClimateError::Send`].
    pub fn stop(&self) {
        // the session may already be gone, which is fine
        let _ = self.stop_sender.send(true);
    }

    async fn request<F>(&self, message: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<()>>) -> ClimateMessage,
    {
        let (reply_sender, reply_receiver) = oneshot::channel();
        self.message_sender
            .send(message(reply_sender))
            .map_err(|_| ClimateError::Send)?;
        reply_receiver.await.map_err(|_| ClimateError::Reply)?
    }
}

async fn run_session(
    mut link: AcLink,
    config: ClimateConfig,
    status_sender: watch::Sender<AcStatus>,
    mut message_receiver: mpsc::UnboundedReceiver<ClimateMessage>,
    mut stop_receiver: watch::Receiver<bool>,
) {
    let mut status = AcStatus::default();
    // first tick fires immediately, so a fresh session polls right away
    let mut poll_timer = time::interval(config.poll_interval);
    poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("[{}] climate session started", config.name);

    loop {
        if *stop_receiver.borrow() {
            info!("[{}] climate session received stop signal", config.name);
            break;
        }

        tokio::select! {
            _ = stop_receiver.changed() => {}
            _ = poll_timer.tick() => {
                if let Err(e) = run_poll(
                    &mut link,
                    &config,
                    &mut status,
                    &status_sender,
                    &mut stop_receiver,
                )
                .await
                {
                    debug!("[{}] scheduled poll failed: {}", config.name, e);
                }
            }
            message = message_receiver.recv() => match message {
                None => {
                    info!(
                        "[{}] climate message sender closed before stop signal",
                        config.name
                    );
                    break;
                }
                Some(ClimateMessage::Poll { reply }) => {
                    let result = run_poll(
                        &mut link,
                        &config,
                        &mut status,
                        &status_sender,
                        &mut stop_receiver,
                    )
                    .await;
                    let _ = reply.send(result);
                }
                Some(ClimateMessage::SetMode { mode, reply }) => {
                    status.mode = mode;
                    let result = run_command(
                        &mut link,
                        &config,
                        &mut status,
                        &status_sender,
                        &mut stop_receiver,
                        None,
                    )
                    .await;
                    let _ = reply.send(result);
                }
                Some(ClimateMessage::SetFanSpeed { fan, reply }) => {
                    status.fan = fan;
                    let result = run_command(
                        &mut link,
                        &config,
                        &mut status,
                        &status_sender,
                        &mut stop_receiver,
                        None,
                    )
                    .await;
                    let _ = reply.send(result);
                }
                Some(ClimateMessage::SetTargetTemperature { value, reply }) => {
                    status.target_temperature = value;
                    let result = run_command(
                        &mut link,
                        &config,
                        &mut status,
                        &status_sender,
                        &mut stop_receiver,
                        Some(value),
                    )
                    .await;
                    let _ = reply.send(result);
                }
            },
        }
    }

    info!("[{}] climate session stopped", config.name);
}

async fn run_poll(
    link: &mut AcLink,
    config: &ClimateConfig,
    status: &mut AcStatus,
    status_sender: &watch::Sender<AcStatus>,
    stop_receiver: &mut watch::Receiver<bool>,
) -> Result<()> {
    let outcome = match link.request_status(stop_receiver).await {
        Ok(update) => {
            for warning in &update.warnings {
                warn!("[{}] skipped status field: {}", config.name, warning);
            }
            if let Some(mode) = update.mode {
                status.mode = mode;
            }
            if let Some(fan) = update.fan {
                status.fan = fan;
            }
            if let Some(current) = update.current_temperature {
                status.current_temperature = Some(current);
            }
            if let Some(target) = update.target_temperature {
                status.target_temperature = target;
            }
            status.available = true;
            debug!("[{}] status updated: {}", config.name, status);
            Ok(())
        }
        Err(e) => {
            status.available = false;
            debug!("[{}] poll failed: {}", config.name, e);
            Err(e.into())
        }
    };
    publish(config, status_sender, status);
    outcome
}

/// Command cycle: frame out, settle delay, confirmation poll. The unit is
/// the source of truth and drops commands silently, so the follow-up poll
/// is the only acknowledgment there is.
async fn run_command(
    link: &mut AcLink,
    config: &ClimateConfig,
    status: &mut AcStatus,
    status_sender: &watch::Sender<AcStatus>,
    stop_receiver: &mut watch::Receiver<bool>,
    target: Option<f32>,
) -> Result<()> {
    let frame = protocol::encode_command(status.mode, status.fan, target);
    if let Err(e) = link.send_command(&frame).await {
        status.available = false;
        publish(config, status_sender, status);
        return Err(e.into());
    }

    // the unit needs a moment to apply the change before it will report it
    tokio::select! {
        _ = stop_receiver.changed() => return Err(LinkError::Stopped.into()),
        _ = time::sleep(config.settle_delay) => {}
    }

    run_poll(link, config, status, status_sender, stop_receiver).await
}

fn publish(config: &ClimateConfig, status_sender: &watch::Sender<AcStatus>, status: &AcStatus) {
    if status_sender.send(status.clone()).is_err() {
        info!("[{}] published status to no receivers", config.name);
    }
}
