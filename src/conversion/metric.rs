use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// Physical quantity a line is assigned to record.
///
/// The names are the column names written to the session log, so they must not
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    T1Temp,
    PRespRate,
    ECGRate,
    BP1Rate,
    BP1Mean,
    BP2Rate,
    BP2Mean,
    BP2Systol,
    BP2Diastol,
    BP3Rate,
    BP3Mean,
    BPCardRate,
    PRespPeriod,
    Iso,
    O2,
    CO2,
    Other,
    ControlLine,
    PumpStat,
    None,
}

/// Options offered on the four monitoring-unit DAC outputs.
pub const RATE_OPTIONS: &[Metric] = &[
    Metric::T1Temp,
    Metric::PRespRate,
    Metric::ECGRate,
    Metric::BP1Rate,
    Metric::BP1Mean,
    Metric::BP2Rate,
    Metric::BP2Mean,
    Metric::BP2Systol,
    Metric::BP2Diastol,
    Metric::BP3Rate,
    Metric::BP3Mean,
    Metric::BPCardRate,
    Metric::PRespPeriod,
    Metric::None,
];

/// Options offered on the gas analyzer output.
pub const GAS_OPTIONS: &[Metric] = &[Metric::Iso, Metric::O2, Metric::CO2, Metric::Other, Metric::None];

pub const STIMULATOR_OPTIONS: &[Metric] = &[Metric::ControlLine, Metric::None];

pub const PUMP_OPTIONS: &[Metric] = &[Metric::PumpStat, Metric::None];

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::T1Temp => "T1Temp",
            Metric::PRespRate => "PRespRate",
            Metric::ECGRate => "ECGRate",
            Metric::BP1Rate => "BP1Rate",
            Metric::BP1Mean => "BP1Mean",
            Metric::BP2Rate => "BP2Rate",
            Metric::BP2Mean => "BP2Mean",
            Metric::BP2Systol => "BP2Systol",
            Metric::BP2Diastol => "BP2Diastol",
            Metric::BP3Rate => "BP3Rate",
            Metric::BP3Mean => "BP3Mean",
            Metric::BPCardRate => "BPCardRate",
            Metric::PRespPeriod => "PRespPeriod",
            Metric::Iso => "Iso",
            Metric::O2 => "O2",
            Metric::CO2 => "CO2",
            Metric::Other => "Other",
            Metric::ControlLine => "ControlLine",
            Metric::PumpStat => "PumpStat",
            Metric::None => "None",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Metric::None)
    }

    fn all() -> impl Iterator<Item = Metric> {
        RATE_OPTIONS
            .iter()
            .chain(GAS_OPTIONS)
            .chain(STIMULATOR_OPTIONS)
            .chain(PUMP_OPTIONS)
            .copied()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Metric::all()
            .find(|metric| metric.as_str() == wanted)
            .ok_or_else(|| anyhow!("unknown metric '{wanted}'"))
    }
}
