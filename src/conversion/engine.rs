use super::metric::Metric;
use super::table::ConversionTable;

/// A converted reading plus the plausibility warning it raised, if any.
///
/// Warnings are shown live next to the reading; they never reach the log file.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub value: f64,
    pub warning: Option<&'static str>,
}

impl Conversion {
    fn plain(value: f64) -> Self {
        Self { value, warning: None }
    }

    fn warn_if(value: f64, condition: bool, warning: &'static str) -> Self {
        Self {
            value,
            warning: condition.then_some(warning),
        }
    }
}

/// Map a calibrated voltage to the physical value of `metric`.
///
/// `_positive_channel` is the terminal the voltage was read on; none of the
/// current formulas depend on it, but it is part of the contract so a
/// per-terminal calibration can be added without touching callers.
pub fn convert(
    table: &ConversionTable,
    volts: f64,
    metric: Metric,
    _positive_channel: u8,
) -> Conversion {
    match metric {
        Metric::T1Temp => Conversion::plain(table.temperature.apply(volts)),
        Metric::PRespRate => Conversion::plain(table.resp_rate.apply(volts)),
        Metric::ECGRate => {
            let value = table.ecg_rate.apply(volts);
            Conversion::warn_if(value, value < 0.0, "Neg ECG Rate")
        }
        Metric::PRespPeriod => Conversion::plain(table.resp_period.apply(volts)),
        Metric::BP1Rate | Metric::BP2Rate | Metric::BP3Rate => {
            Conversion::plain(table.bp_rate.apply(volts))
        }
        Metric::BP1Mean
        | Metric::BP2Mean
        | Metric::BP3Mean
        | Metric::BP2Systol
        | Metric::BP2Diastol => Conversion::plain(table.bp_pressure.apply(volts)),
        Metric::Iso => {
            // The threshold is checked on the unrounded percentage.
            let raw = volts / table.iso.full_scale_volts * table.iso.full_scale_value;
            Conversion::warn_if(table.iso.apply(volts), raw > table.iso_high_percent, "High Iso")
        }
        Metric::O2 => {
            let value = table.o2.apply(volts);
            Conversion::warn_if(value, value < table.o2_low, "Low O2")
        }
        Metric::CO2 => {
            let value = table.co2.apply(volts);
            Conversion::warn_if(value, value > table.co2_high, "High CO2")
        }
        Metric::ControlLine | Metric::PumpStat => {
            Conversion::plain(if volts > table.logic_high_volts { 1.0 } else { 0.0 })
        }
        Metric::BPCardRate | Metric::Other | Metric::None => {
            Conversion::plain(volts - table.unknown_offset)
        }
    }
}
