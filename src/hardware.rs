//! Seam to the multi-channel analog input device.
//!
//! The device is owned by the sampling loop. Every tick issues one batched
//! read for all active terminals so the channels of a sample are taken
//! together, then converts each raw count with that terminal's calibration.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Error, Result};
use serde::{Deserialize, Serialize};

/// Full-scale span of the low-voltage analog inputs.
pub const LOW_VOLTAGE_SPAN: f64 = 2.44;
const COUNTS: f64 = 65536.0;

/// Linear mapping from raw counts to volts for one terminal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub slope: f64,
    pub offset: f64,
}

impl Calibration {
    pub const NOMINAL_LOW_VOLTAGE: Calibration = Calibration {
        slope: LOW_VOLTAGE_SPAN / COUNTS,
        offset: 0.0,
    };

    pub fn volts(&self, raw: u16) -> f64 {
        f64::from(raw) * self.slope + self.offset
    }

    pub fn raw(&self, volts: f64) -> u16 {
        ((volts - self.offset) / self.slope).round().clamp(0.0, COUNTS - 1.0) as u16
    }
}

pub trait AnalogDevice: Send {
    /// One simultaneous read of every listed terminal, in the order given.
    fn read_batch(&mut self, positive_channels: &[u8]) -> Result<Vec<u16>>;

    fn calibration(&self, positive_channel: u8) -> Calibration;

    fn calibrated_volts(&self, raw: u16, positive_channel: u8) -> f64 {
        self.calibration(positive_channel).volts(raw)
    }
}

/// Opens the device at the start of each session.
pub trait DeviceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn AnalogDevice>>;
}

/// Device that reports the same voltage on every terminal. Used for bench
/// checks of the conversion table and in tests.
#[derive(Debug, Clone)]
pub struct FixedVoltageDevice {
    volts: f64,
}

impl FixedVoltageDevice {
    pub fn new(volts: f64) -> Self {
        Self { volts }
    }
}

impl AnalogDevice for FixedVoltageDevice {
    fn read_batch(&mut self, positive_channels: &[u8]) -> Result<Vec<u16>> {
        let raw = Calibration::NOMINAL_LOW_VOLTAGE.raw(self.volts);
        Ok(vec![raw; positive_channels.len()])
    }

    fn calibration(&self, _positive_channel: u8) -> Calibration {
        Calibration::NOMINAL_LOW_VOLTAGE
    }
}

/// Fixed voltages must lie inside the input span; anything else would be
/// clamped by the converter and read back as a different value.
fn check_fixed_volts(volts: f64) -> Result<f64> {
    if !(0.0..=LOW_VOLTAGE_SPAN).contains(&volts) {
        bail!("fixed voltage {volts} V is outside the 0..{LOW_VOLTAGE_SPAN} V input span");
    }
    Ok(volts)
}

/// Device selection as stored in the settings file and given on the command
/// line (`none` or `fixed:<volts>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum DeviceSpec {
    /// No acquisition hardware; sessions run in degraded mode.
    #[default]
    None,
    Fixed { volts: f64 },
}

impl DeviceFactory for DeviceSpec {
    fn open(&self) -> Result<Box<dyn AnalogDevice>> {
        match self {
            DeviceSpec::None => bail!("no analog input device configured"),
            DeviceSpec::Fixed { volts } => {
                let volts = check_fixed_volts(*volts)?;
                Ok(Box::new(FixedVoltageDevice::new(volts)))
            }
        }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::None => f.write_str("none"),
            DeviceSpec::Fixed { volts } => write!(f, "fixed:{volts}"),
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once(':') {
            None if s.trim().eq_ignore_ascii_case("none") => Ok(DeviceSpec::None),
            Some((kind, volts)) if kind.eq_ignore_ascii_case("fixed") => {
                let volts = volts
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("invalid voltage '{volts}'"))?;
                Ok(DeviceSpec::Fixed {
                    volts: check_fixed_volts(volts)?,
                })
            }
            _ => Err(anyhow!("unknown device '{s}' (expected 'none' or 'fixed:<volts>')")),
        }
    }
}
