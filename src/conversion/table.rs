/// Linear voltage scaling: `(volts - offset_volts) * counts_per_volt / divisor`.
///
/// The three factors are kept separate rather than folded into one gain so the
/// floating-point results match existing session logs digit for digit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub offset_volts: f64,
    pub counts_per_volt: f64,
    pub divisor: f64,
    /// Negative results are reported as zero.
    pub clamp_negative: bool,
    /// Decimal places kept after scaling; `None` keeps full precision.
    pub decimals: Option<i32>,
}

impl LinearScale {
    pub fn apply(&self, volts: f64) -> f64 {
        let mut value = (volts - self.offset_volts) * self.counts_per_volt / self.divisor;
        if self.clamp_negative && value < 0.0 {
            value = 0.0;
        }
        match self.decimals {
            Some(places) => round_half_even(value, places),
            None => value,
        }
    }
}

/// Pressure channels report counts with a fixed zero point and a fixed number
/// of mmHg per count: `((volts - offset) * counts_per_volt - zero_counts) / counts_per_mmhg`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureScale {
    pub offset_volts: f64,
    pub counts_per_volt: f64,
    pub zero_counts: f64,
    pub counts_per_mmhg: f64,
}

impl PressureScale {
    pub fn apply(&self, volts: f64) -> f64 {
        ((volts - self.offset_volts) * self.counts_per_volt - self.zero_counts) / self.counts_per_mmhg
    }
}

/// Gas analyzer output expressed as a fraction of its full-scale span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanScale {
    pub full_scale_volts: f64,
    pub full_scale_value: f64,
    pub decimals: Option<i32>,
}

impl SpanScale {
    pub fn apply(&self, volts: f64) -> f64 {
        let value = volts / self.full_scale_volts * self.full_scale_value;
        match self.decimals {
            Some(places) => round_half_even(value, places),
            None => value,
        }
    }
}

/// Empirical scaling constants for every metric family.
///
/// Formulas marked unverified were never validated against the attached
/// instruments; keep them as they are until someone calibrates them on the
/// bench.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionTable {
    pub temperature: LinearScale,
    pub resp_rate: LinearScale,
    /// Unverified.
    pub ecg_rate: LinearScale,
    pub resp_period: LinearScale,
    /// Unverified.
    pub bp_rate: LinearScale,
    /// Unverified. Used for mean, systolic and diastolic pressure.
    pub bp_pressure: PressureScale,
    pub iso: SpanScale,
    /// Unverified.
    pub o2: LinearScale,
    /// Unverified.
    pub co2: LinearScale,

    /// Warn strictly above this isoflurane percentage.
    pub iso_high_percent: f64,
    /// Warn strictly below this O2 reading.
    pub o2_low: f64,
    /// Warn strictly above this CO2 reading.
    pub co2_high: f64,
    /// Logic lines read 1 strictly above this voltage.
    pub logic_high_volts: f64,
    /// Subtracted from the voltage of metrics without a calibrated formula.
    pub unknown_offset: f64,
}

const SAM_COUNTS_PER_VOLT: f64 = 4096.0 / 5.0;

impl Default for ConversionTable {
    fn default() -> Self {
        Self {
            temperature: LinearScale {
                offset_volts: 0.0,
                counts_per_volt: SAM_COUNTS_PER_VOLT * 4.0,
                divisor: 180.0,
                clamp_negative: true,
                decimals: Some(1),
            },
            resp_rate: LinearScale {
                offset_volts: 0.006,
                counts_per_volt: SAM_COUNTS_PER_VOLT / 4.0,
                divisor: 1.0,
                clamp_negative: true,
                decimals: Some(0),
            },
            ecg_rate: LinearScale {
                offset_volts: 0.006,
                counts_per_volt: SAM_COUNTS_PER_VOLT / 4.0,
                divisor: 1.0,
                clamp_negative: false,
                decimals: None,
            },
            resp_period: LinearScale {
                offset_volts: 0.006,
                counts_per_volt: SAM_COUNTS_PER_VOLT * 4.0,
                divisor: 1.0,
                clamp_negative: false,
                decimals: None,
            },
            bp_rate: LinearScale {
                offset_volts: 0.0,
                counts_per_volt: SAM_COUNTS_PER_VOLT / 4.0,
                divisor: 1.0,
                clamp_negative: false,
                decimals: None,
            },
            bp_pressure: PressureScale {
                offset_volts: 0.006,
                counts_per_volt: 1024.0 / 5.0,
                zero_counts: 90.0,
                counts_per_mmhg: 3.0,
            },
            iso: SpanScale {
                full_scale_volts: 2.4,
                full_scale_value: 8.0,
                decimals: Some(2),
            },
            o2: LinearScale {
                offset_volts: 0.0,
                counts_per_volt: 1.0,
                divisor: 1000.0,
                clamp_negative: false,
                decimals: None,
            },
            co2: LinearScale {
                offset_volts: 0.0,
                counts_per_volt: 1.0,
                divisor: 1000.0,
                clamp_negative: false,
                decimals: None,
            },
            iso_high_percent: 5.0,
            o2_low: 17.0,
            co2_high: 10.0,
            logic_high_volts: 0.8,
            unknown_offset: 32768.0,
        }
    }
}

/// Digits kept past the rounding position when expanding a value exactly.
/// Ties are only possible for values with a short binary fraction, so a tie
/// always shows up as `5` followed by zeros within this window.
const GUARD_DIGITS: usize = 40;

/// Round half to even at `places` decimals, deciding on the exact decimal
/// value of `value` rather than on `value * 10^places`. Logs recorded by
/// earlier versions were rounded this way, so e.g. `0.065` (stored as
/// `0.06500000000000000222..`) rounds up to `0.07` and `2.675` (stored as
/// `2.67499999999999982..`) rounds down to `2.67`.
pub fn round_half_even(value: f64, places: i32) -> f64 {
    if !value.is_finite() || places < 0 {
        return value;
    }
    let factor = 10f64.powi(places);
    let places = places as usize;

    // `{:.N}` expands the binary value exactly; only the last guard digits
    // are rounded by the formatter and they never decide the outcome.
    let expanded = format!("{:.*}", places + GUARD_DIGITS, value.abs());
    let digits: String = expanded.chars().filter(|c| *c != '.').collect();
    let (kept, rest) = digits.split_at(digits.len() - GUARD_DIGITS);
    let Ok(mut kept) = kept.parse::<u128>() else {
        return (value * factor).round_ties_even() / factor;
    };

    let mut rest = rest.bytes();
    let round_up = match rest.next() {
        Some(b'5') if rest.all(|d| d == b'0') => kept % 2 == 1,
        Some(first) => first >= b'5',
        None => false,
    };
    if round_up {
        kept += 1;
    }

    let rounded = format!("{kept}e-{places}").parse::<f64>().unwrap_or(value.abs());
    if value.is_sign_negative() {
        -rounded
    } else {
        rounded
    }
}
