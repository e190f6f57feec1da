use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::conversion::metric::{
    Metric, GAS_OPTIONS, PUMP_OPTIONS, RATE_OPTIONS, STIMULATOR_OPTIONS,
};

/// A physical analog input and the instrument output wired to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalLine {
    pub name: &'static str,
    /// Positive terminal index on the acquisition device.
    pub positive_channel: u8,
    pub options: &'static [Metric],
}

pub const LINE_COUNT: usize = 7;

/// Wiring of the breakout box. The terminal order is not monotonic: the
/// stimulator sits on terminal 7 and the pump on terminal 6.
pub const PHYSICAL_LINES: [PhysicalLine; LINE_COUNT] = [
    PhysicalLine { name: "DAC1", positive_channel: 0, options: RATE_OPTIONS },
    PhysicalLine { name: "DAC2", positive_channel: 1, options: RATE_OPTIONS },
    PhysicalLine { name: "DAC3", positive_channel: 2, options: RATE_OPTIONS },
    PhysicalLine { name: "DAC4", positive_channel: 3, options: RATE_OPTIONS },
    PhysicalLine { name: "POETANALOG", positive_channel: 4, options: GAS_OPTIONS },
    PhysicalLine { name: "GRASS", positive_channel: 7, options: STIMULATOR_OPTIONS },
    PhysicalLine { name: "HAPUMP", positive_channel: 6, options: PUMP_OPTIONS },
];

/// One entry of the active channel set, copied into a recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveChannel {
    pub metric: Metric,
    pub line: &'static str,
    pub positive_channel: u8,
}

/// Metric assigned to each of the seven physical lines, in wiring order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfiguration {
    metrics: [Metric; LINE_COUNT],
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            metrics: [
                Metric::T1Temp,
                Metric::PRespRate,
                Metric::None,
                Metric::None,
                Metric::Iso,
                Metric::None,
                Metric::None,
            ],
        }
    }
}

impl ChannelConfiguration {
    pub fn from_metrics(metrics: [Metric; LINE_COUNT]) -> Result<Self> {
        let mut config = Self {
            metrics: [Metric::None; LINE_COUNT],
        };
        for (index, metric) in metrics.into_iter().enumerate() {
            config.assign(index, metric)?;
        }
        Ok(config)
    }

    pub fn metrics(&self) -> &[Metric; LINE_COUNT] {
        &self.metrics
    }

    /// Assign `metric` to the line at `index`, rejecting metrics the
    /// instrument on that line cannot output.
    pub fn assign(&mut self, index: usize, metric: Metric) -> Result<()> {
        let Some(line) = PHYSICAL_LINES.get(index) else {
            bail!("line index {index} out of range (0..{LINE_COUNT})");
        };
        if !line.options.contains(&metric) {
            bail!("metric {metric} is not available on line {}", line.name);
        }
        self.metrics[index] = metric;
        Ok(())
    }

    /// Assign by line name (case-insensitive), as typed by an operator.
    pub fn assign_named(&mut self, line_name: &str, metric: Metric) -> Result<()> {
        let Some(index) = PHYSICAL_LINES
            .iter()
            .position(|line| line.name.eq_ignore_ascii_case(line_name))
        else {
            bail!("unknown line '{line_name}'");
        };
        self.assign(index, metric)
    }

    /// Lines with a metric other than `None`, in wiring order.
    pub fn active_set(&self) -> Vec<ActiveChannel> {
        PHYSICAL_LINES
            .iter()
            .zip(self.metrics.iter())
            .filter(|(_, metric)| !metric.is_none())
            .map(|(line, metric)| ActiveChannel {
                metric: *metric,
                line: line.name,
                positive_channel: line.positive_channel,
            })
            .collect()
    }

    /// Re-validate after deserializing from a hand-edited settings file.
    pub fn validated(self) -> Result<Self> {
        Self::from_metrics(self.metrics)
    }
}
