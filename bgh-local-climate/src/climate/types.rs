use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

use strum_macros::EnumIter;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::Duration;

use crate::climate::protocol::FrameError;

pub const DEFAULT_UNIT_PORT: u16 = 20910;
pub const DEFAULT_LOCAL_PORT: u16 = 20911;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_TARGET_TEMPERATURE: f32 = 24.0;

pub const MIN_TARGET_TEMPERATURE: f32 = 17.0;
pub const MAX_TARGET_TEMPERATURE: f32 = 30.0;

pub(crate) const RECV_BUF_LEN: usize = 1024;

/// Operating mode of the unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, EnumIter)]
pub enum AcMode {
    Off,
    Cool,
    Heat,
    Dry,
    FanOnly,
    Auto,
}

impl Default for AcMode {
    fn default() -> Self {
        AcMode::Off
    }
}

impl From<AcMode> for u8 {
    fn from(mode: AcMode) -> Self {
        match mode {
            AcMode::Off => 0,
            AcMode::Cool => 1,
            AcMode::Heat => 2,
            AcMode::Dry => 3,
            AcMode::FanOnly => 4,
            AcMode::Auto => 254,
        }
    }
}

#[derive(Error, Debug)]
#[error("Invalid AC mode")]
pub struct InvalidAcMode;

impl TryFrom<u8> for AcMode {
    type Error = InvalidAcMode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AcMode::Off),
            1 => Ok(AcMode::Cool),
            2 => Ok(AcMode::Heat),
            3 => Ok(AcMode::Dry),
            4 => Ok(AcMode::FanOnly),
            254 => Ok(AcMode::Auto),
            _ => Err(InvalidAcMode),
        }
    }
}

impl FromStr for AcMode {
    type Err = InvalidAcMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(AcMode::Off),
            "cool" => Ok(AcMode::Cool),
            "heat" => Ok(AcMode::Heat),
            "dry" => Ok(AcMode::Dry),
            "fan_only" | "fan-only" | "fan" => Ok(AcMode::FanOnly),
            "auto" => Ok(AcMode::Auto),
            _ => Err(InvalidAcMode),
        }
    }
}

/// Fan speed setting. The unit reports speeds as 1-3 plus a sentinel for
/// automatic control.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, EnumIter)]
pub enum FanSpeed {
    Low,
    Medium,
    High,
    Auto,
}

impl Default for FanSpeed {
    fn default() -> Self {
        FanSpeed::Auto
    }
}

impl From<FanSpeed> for u8 {
    fn from(fan: FanSpeed) -> Self {
        match fan {
            FanSpeed::Low => 1,
            FanSpeed::Medium => 2,
            FanSpeed::High => 3,
            FanSpeed::Auto => 254,
        }
    }
}

#[derive(Error, Debug)]
#[error("Invalid fan speed")]
pub struct InvalidFanSpeed;

impl TryFrom<u8> for FanSpeed {
    type Error = InvalidFanSpeed;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FanSpeed::Low),
            2 => Ok(FanSpeed::Medium),
            3 => Ok(FanSpeed::High),
            254 => Ok(FanSpeed::Auto),
            _ => Err(InvalidFanSpeed),
        }
    }
}

impl FromStr for FanSpeed {
    type Err = InvalidFanSpeed;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(FanSpeed::Low),
            "medium" => Ok(FanSpeed::Medium),
            "high" => Ok(FanSpeed::High),
            "auto" => Ok(FanSpeed::Auto),
            _ => Err(InvalidFanSpeed),
        }
    }
}

/// Snapshot of the unit as last reported. Published on the session's watch
/// channel after every poll, successful or not.
#[derive(Clone, Debug, PartialEq)]
pub struct AcStatus {
    pub mode: AcMode,
    pub fan: FanSpeed,
    /// Room temperature, unknown until the first successful poll.
    pub current_temperature: Option<f32>,
    pub target_temperature: f32,
    pub available: bool,
}

impl Default for AcStatus {
    fn default() -> Self {
        AcStatus {
            mode: AcMode::default(),
            fan: FanSpeed::default(),
            current_temperature: None,
            target_temperature: DEFAULT_TARGET_TEMPERATURE,
            available: true,
        }
    }
}

impl Display for AcStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ mode: {:?}, fan: {:?}", self.mode, self.fan)?;
        if let Some(current) = self.current_temperature {
            write!(f, ", current: {}", current)?;
        }
        write!(f, ", target: {}", self.target_temperature)?;
        if !self.available {
            write!(f, ", unavailable")?;
        }
        write!(f, " }}")
    }
}

/// Settings for one unit. `name` only shows up in log lines.
#[derive(Clone, Debug)]
pub struct ClimateConfig {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub local_port: u16,
    pub poll_interval: Duration,
    pub response_timeout: Duration,
    pub settle_delay: Duration,
}

impl ClimateConfig {
    pub fn new(name: impl Into<String>, address: IpAddr) -> ClimateConfig {
        ClimateConfig {
            name: name.into(),
            address,
            port: DEFAULT_UNIT_PORT,
            local_port: DEFAULT_LOCAL_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// The UDP endpoint for one unit.
pub struct AcLink {
    pub(crate) socket: UdpSocket,
    pub(crate) response_timeout: Duration,
    pub(crate) buf: [u8; RECV_BUF_LEN],
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Could not bind local udp port {0}")]
    Bind(u16, #[source] std::io::Error),
    #[error("Could not set unit address {0}")]
    Connect(std::net::SocketAddr, #[source] std::io::Error),
    #[error("Could not send frame to unit")]
    Send(#[source] std::io::Error),
    #[error("Could not receive frame from unit")]
    Receive(#[source] std::io::Error),
    #[error("No reply from unit within {0:?}")]
    Timeout(Duration),
    #[error("Session stopped while waiting on the unit")]
    Stopped,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub(crate) type LinkResult<T> = std::result::Result<T, LinkError>;
