use std::convert::TryFrom;

use itertools::Itertools;
use thiserror::Error;

use crate::climate::types::{AcMode, FanSpeed, MAX_TARGET_TEMPERATURE, MIN_TARGET_TEMPERATURE};

/// Fixed frame the unit answers with a status report.
pub const STATUS_REQUEST: [u8; 17] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xac, 0xcf, 0x23, 0xaa, 0x31, 0x90, 0x59, 0x00,
    0x01, 0xe4,
];

/// Command header template. The mode and fan bytes are overwritten per command.
pub const COMMAND_HEADER: [u8; 22] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xac, 0xcf, 0x23, 0xaa, 0x31, 0x90, 0xf6, 0x00,
    0x01, 0x61, 0x04, 0x02, 0x00, 0x00, 0x80,
];

pub const COMMAND_MODE_OFFSET: usize = 17;
pub const COMMAND_FAN_OFFSET: usize = 18;
pub const COMMAND_TARGET_TEMP_RANGE: std::ops::Range<usize> = 23..25;
// the header ends before the temperature field, so frames carrying one are
// zero-padded out to this length
pub const COMMAND_TEMP_FRAME_LEN: usize = 25;

pub const STATUS_MIN_LEN: usize = 25;
pub const STATUS_MODE_OFFSET: usize = 18;
pub const STATUS_FAN_OFFSET: usize = 19;
pub const STATUS_CURRENT_TEMP_RANGE: std::ops::Range<usize> = 21..23;
pub const STATUS_TARGET_TEMP_RANGE: std::ops::Range<usize> = 23..25;

// plausible room sensor readings, degrees celsius
const CURRENT_TEMP_MIN: f32 = 0.0;
const CURRENT_TEMP_MAX: f32 = 50.0;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("status frame too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
}

/// A field the unit reported but that could not be accepted into state.
#[derive(Error, Clone, Copy, Debug, PartialEq)]
pub enum DecodeWarning {
    #[error("unknown mode byte {0:#04x}")]
    UnknownMode(u8),
    #[error("unknown fan speed byte {0:#04x}")]
    UnknownFanSpeed(u8),
    #[error("current temperature {0} outside plausible range")]
    CurrentTemperatureOutOfRange(f32),
    #[error("target temperature {0} outside supported range")]
    TargetTemperatureOutOfRange(f32),
}

/// Fields decoded from one status frame. A `None` field was present on the
/// wire but rejected; the matching entry in `warnings` says why.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusUpdate {
    pub mode: Option<AcMode>,
    pub fan: Option<FanSpeed>,
    pub current_temperature: Option<f32>,
    pub target_temperature: Option<f32>,
    pub warnings: Vec<DecodeWarning>,
}

pub fn status_request() -> &'static [u8] {
    &STATUS_REQUEST
}

/// Builds a command frame for the given settings. Frames without a
/// temperature change stay at the bare header length.
pub fn encode_command(mode: AcMode, fan: FanSpeed, target: Option<f32>) -> Vec<u8> {
    let mut frame = COMMAND_HEADER.to_vec();
    frame[COMMAND_MODE_OFFSET] = mode.into();
    frame[COMMAND_FAN_OFFSET] = fan.into();
    if let Some(target) = target {
        frame.resize(COMMAND_TEMP_FRAME_LEN, 0);
        let hundredths = (target * 100.0).round() as u16;
        frame[COMMAND_TARGET_TEMP_RANGE].copy_from_slice(&hundredths.to_le_bytes());
    }
    frame
}

pub fn decode_status(data: &[u8]) -> Result<StatusUpdate, FrameError> {
    if data.len() < STATUS_MIN_LEN {
        return Err(FrameError::TooShort {
            needed: STATUS_MIN_LEN,
            actual: data.len(),
        });
    }

    let mut update = StatusUpdate::default();

    let mode = data[STATUS_MODE_OFFSET];
    match AcMode::try_from(mode) {
        Ok(mode) => update.mode = Some(mode),
        Err(_) => update.warnings.push(DecodeWarning::UnknownMode(mode)),
    }

    let fan = data[STATUS_FAN_OFFSET];
    match FanSpeed::try_from(fan) {
        Ok(fan) => update.fan = Some(fan),
        Err(_) => update.warnings.push(DecodeWarning::UnknownFanSpeed(fan)),
    }

    let current = read_temperature(data, STATUS_CURRENT_TEMP_RANGE);
    if (CURRENT_TEMP_MIN..=CURRENT_TEMP_MAX).contains(&current) {
        update.current_temperature = Some(round_tenth(current));
    } else {
        update
            .warnings
            .push(DecodeWarning::CurrentTemperatureOutOfRange(current));
    }

    let target = read_temperature(data, STATUS_TARGET_TEMP_RANGE);
    if (MIN_TARGET_TEMPERATURE..=MAX_TARGET_TEMPERATURE).contains(&target) {
        update.target_temperature = Some(round_tenth(target));
    } else {
        update
            .warnings
            .push(DecodeWarning::TargetTemperatureOutOfRange(target));
    }

    Ok(update)
}

pub(crate) fn frame_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).join("")
}

fn read_temperature(data: &[u8], range: std::ops::Range<usize>) -> f32 {
    u16::from_le_bytes([data[range.start], data[range.start + 1]]) as f32 / 100.0
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
