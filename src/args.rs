use std::path::PathBuf;

use crate::hardware::DeviceSpec;

/// Scan-gated physiological signal recorder.
///
/// Operator commands are read from stdin; type `help` once running.
#[derive(clap::Parser, Debug)]
#[command(version)]
pub struct RecorderArgs {
    /// Settings file (default: $PHYSIO_RECORDER_CONFIG or ~/.physio_recorder.json)
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Console refresh period in milliseconds
    #[clap(long)]
    pub ui_tick_ms: Option<u64>,
    /// Scanner status poll period in milliseconds
    #[clap(long)]
    pub status_tick_ms: Option<u64>,
    /// Analog input device for this run: `none` or `fixed:<volts>` with 0 to 2.44 V
    #[clap(short, long)]
    pub device: Option<DeviceSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn overrides_are_optional() {
        let args = RecorderArgs::try_parse_from(["physio_recorder"]).unwrap();
        assert!(args.config.is_none() && args.device.is_none());

        let args = RecorderArgs::try_parse_from([
            "physio_recorder",
            "--device",
            "fixed:0.5",
            "--status-tick-ms",
            "1000",
        ])
        .unwrap();
        assert_eq!(args.device, Some(DeviceSpec::Fixed { volts: 0.5 }));
        assert_eq!(args.status_tick_ms, Some(1000));
    }

    #[test]
    fn rejects_unknown_device() {
        assert!(RecorderArgs::try_parse_from(["physio_recorder", "--device", "u3"]).is_err());
    }
}
