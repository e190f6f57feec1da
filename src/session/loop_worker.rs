use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::channels::ActiveChannel;
use crate::conversion::{convert, Conversion, ConversionTable};
use crate::hardware::{AnalogDevice, DeviceFactory};

use super::annotation::Annotation;
use super::log_format::RowLayout;
use super::mailbox::{DisplayMessage, DisplaySender, WorkerEnds};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Everything a sampling loop needs, copied in at session start.
#[derive(Clone)]
pub struct SessionSetup {
    pub session_id: String,
    pub channels: Vec<ActiveChannel>,
    pub sample_period: Duration,
    pub layout: RowLayout,
    pub table: ConversionTable,
    pub device: Arc<dyn DeviceFactory>,
}

/// Sleep before the next tick so that tick `n + 1` starts at `(n + 1) * period`
/// after session start: `max(0, period - (elapsed - period * tick))`.
///
/// Comparing against the ideal elapsed time for the tick index, rather than
/// sleeping a fixed period, keeps processing time from accumulating.
pub fn adjusted_delay(period: Duration, elapsed: Duration, tick: u64) -> Duration {
    let period_secs = period.as_secs_f64();
    let ideal_secs = period_secs * tick as f64;
    let delay = period_secs - (elapsed.as_secs_f64() - ideal_secs);
    Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Sample, convert, log and display until `cancel_token` fires.
///
/// The log file is written row by row and flushed after every row, so a
/// session that is cut short keeps every completed row on disk.
pub async fn sampling_loop(
    setup: SessionSetup,
    mut log: Box<dyn Write + Send>,
    ends: WorkerEnds,
    cancel_token: CancellationToken,
) {
    let WorkerEnds {
        annotations: mut mailbox,
        display,
    } = ends;
    let session_id = setup.session_id.as_str();

    let mut device = match setup.device.open() {
        Ok(device) => Some(device),
        Err(err) => {
            log_warn!("session {session_id}: analog device unavailable: {err:#}");
            display.send(DisplayMessage::Diagnostic(format!(
                "Analog device not connected ({err:#}); recording default values."
            )));
            None
        }
    };

    let mut log_healthy = true;
    if let Err(err) = write_row(&mut log, &setup.layout.log_header()) {
        report_log_failure(session_id, &display, &err);
        log_healthy = false;
    }
    display.send(DisplayMessage::Header(setup.layout.display_header()));

    let terminals: Vec<u8> = setup.channels.iter().map(|c| c.positive_channel).collect();
    let mut read_healthy = true;
    let mut annotation: Option<Annotation> = None;
    let start = Instant::now();
    let mut tick: u64 = 0;

    log_info!(
        "session {session_id}: sampling {} channel(s) every {:?}",
        terminals.len(),
        setup.sample_period
    );

    loop {
        let elapsed_secs = start.elapsed().as_secs_f64();

        let values = match device.as_mut() {
            Some(device) => match read_volts(device.as_mut(), &terminals) {
                Ok(volts) => {
                    read_healthy = true;
                    setup
                        .channels
                        .iter()
                        .zip(volts)
                        .map(|(channel, volts)| {
                            convert(&setup.table, volts, channel.metric, channel.positive_channel)
                        })
                        .collect()
                }
                Err(err) => {
                    if read_healthy {
                        log_warn!("session {session_id}: device read failed: {err:#}");
                        display.send(DisplayMessage::Diagnostic(format!(
                            "Device read failed ({err:#}); recording default values."
                        )));
                    }
                    read_healthy = false;
                    default_values(terminals.len())
                }
            },
            None => default_values(terminals.len()),
        };

        if let Some(latest) = mailbox.take_latest() {
            annotation = Some(latest);
        }

        let row = setup
            .layout
            .log_row(tick, elapsed_secs, &values, annotation.as_ref());
        if let Err(err) = write_row(&mut log, &row) {
            if log_healthy {
                report_log_failure(session_id, &display, &err);
            }
            log_healthy = false;
        }

        match setup
            .layout
            .display_row(tick, elapsed_secs, &values, annotation.as_ref())
        {
            Ok(line) => display.send(DisplayMessage::Row(line)),
            Err(err) => log_warn!("session {session_id}: display row {tick} skipped: {err}"),
        }

        let delay = adjusted_delay(setup.sample_period, start.elapsed(), tick);
        log_debug!("session {session_id}: tick {tick} done, sleeping {delay:?}");

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("session {session_id}: sampling loop stopped after {} row(s)", tick + 1);
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        tick += 1;
    }
}

fn read_volts(device: &mut dyn AnalogDevice, terminals: &[u8]) -> Result<Vec<f64>> {
    let raw = device.read_batch(terminals)?;
    if raw.len() != terminals.len() {
        anyhow::bail!(
            "device returned {} samples for {} channels",
            raw.len(),
            terminals.len()
        );
    }
    Ok(raw
        .iter()
        .zip(terminals)
        .map(|(raw, terminal)| device.calibrated_volts(*raw, *terminal))
        .collect())
}

fn default_values(count: usize) -> Vec<Conversion> {
    vec![
        Conversion {
            value: 0.0,
            warning: None,
        };
        count
    ]
}

fn write_row(log: &mut Box<dyn Write + Send>, row: &str) -> Result<()> {
    writeln!(log, "{row}").context("failed to write log row")?;
    log.flush().context("failed to flush log")
}

fn report_log_failure(session_id: &str, display: &DisplaySender, err: &anyhow::Error) {
    log_error!("session {session_id}: {err:#}");
    display.send(DisplayMessage::Diagnostic(format!(
        "Log file write failed ({err:#}); rows are displayed but not saved."
    )));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::conversion::Metric;
    use crate::hardware::{DeviceSpec, FixedVoltageDevice};
    use crate::session::annotation::AnnotationSchema;
    use crate::session::mailbox::session_channels;

    const PERIOD: Duration = Duration::from_millis(100);

    #[test]
    fn delay_is_never_negative() {
        for tick in 0..50u64 {
            for late_ms in [0u64, 1, 99, 100, 101, 5_000] {
                let elapsed = PERIOD * tick as u32 + Duration::from_millis(late_ms);
                let delay = adjusted_delay(PERIOD, elapsed, tick);
                assert!(delay <= PERIOD);
            }
        }
        assert_eq!(adjusted_delay(PERIOD, Duration::from_secs(60), 1), Duration::ZERO);
    }

    #[test]
    fn delay_absorbs_processing_time() {
        // 30 ms of work on tick 4 leaves 70 ms to sleep.
        let elapsed = PERIOD * 4 + Duration::from_millis(30);
        let delay = adjusted_delay(PERIOD, elapsed, 4);
        assert!((delay.as_secs_f64() - 0.070).abs() < 1e-9);
    }

    #[test]
    fn drift_stays_bounded_under_variable_load() {
        let period = Duration::from_millis(250);
        let mut clock = Duration::ZERO;
        let mut worst = Duration::ZERO;
        for tick in 0..2_000u64 {
            // Deterministic, uneven per-tick cost between 0 and 240 ms.
            let cost = Duration::from_millis(tick * 37 % 241);
            let ideal = period * tick as u32;
            worst = worst.max(clock.saturating_sub(ideal));
            clock += cost;
            clock += adjusted_delay(period, clock, tick);
        }
        // Every tick starts on schedule because no single tick overruns.
        assert!(worst < Duration::from_micros(1));
    }

    #[test]
    fn overruns_are_recovered_once_load_drops() {
        let mut clock = Duration::ZERO;
        let mut lag = Vec::new();
        for tick in 0..20u64 {
            lag.push(clock.as_secs_f64() - PERIOD.as_secs_f64() * tick as f64);
            let cost = if tick < 5 { Duration::from_millis(180) } else { Duration::from_millis(10) };
            clock += cost;
            clock += adjusted_delay(PERIOD, clock, tick);
        }
        assert!(lag[5] > 0.3);
        assert!(lag[19].abs() < 1e-6, "lag did not converge: {lag:?}");
        assert!(lag.windows(2).skip(5).all(|w| w[1] <= w[0] + 1e-6));
    }

    #[derive(Clone, Default)]
    struct SharedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedLog {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    struct FailingAfter {
        reads: usize,
    }

    impl AnalogDevice for FailingAfter {
        fn read_batch(&mut self, positive_channels: &[u8]) -> Result<Vec<u16>> {
            if self.reads == 0 {
                anyhow::bail!("usb disconnected");
            }
            self.reads -= 1;
            FixedVoltageDevice::new(2.0).read_batch(positive_channels)
        }

        fn calibration(&self, _positive_channel: u8) -> crate::hardware::Calibration {
            crate::hardware::Calibration::NOMINAL_LOW_VOLTAGE
        }
    }

    struct FlakyFactory;

    impl DeviceFactory for FlakyFactory {
        fn open(&self) -> Result<Box<dyn AnalogDevice>> {
            Ok(Box::new(FailingAfter { reads: 1 }))
        }
    }

    fn setup(device: Arc<dyn DeviceFactory>) -> SessionSetup {
        let channels = crate::channels::ChannelConfiguration::from_metrics([
            Metric::T1Temp,
            Metric::None,
            Metric::None,
            Metric::None,
            Metric::None,
            Metric::None,
            Metric::None,
        ])
        .unwrap()
        .active_set();
        SessionSetup {
            session_id: "test".into(),
            layout: RowLayout::new(vec![Metric::T1Temp], AnnotationSchema::default()),
            channels,
            sample_period: PERIOD,
            table: ConversionTable::default(),
            device,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reads_fall_back_to_defaults_without_stopping() {
        let log = SharedLog::default();
        let (mut controller, worker) = session_channels();
        let token = CancellationToken::new();
        let task = tokio::spawn(sampling_loop(
            setup(Arc::new(FlakyFactory)),
            Box::new(log.clone()),
            worker,
            token.clone(),
        ));

        tokio::time::sleep(PERIOD * 3 + Duration::from_millis(50)).await;
        token.cancel();
        task.await.unwrap();

        let lines = log.lines();
        assert_eq!(lines[0], "Count, TimeMS, T1Temp");
        assert_eq!(lines[1], "0, 0.0, 36.400");
        assert_eq!(lines[2], "1, 0.1, 0.000");
        assert_eq!(lines[4], "3, 0.3, 0.000");

        let diagnostics: Vec<DisplayMessage> = controller
            .display
            .drain()
            .into_iter()
            .filter(|m| matches!(m, DisplayMessage::Diagnostic(_)))
            .collect();
        assert_eq!(diagnostics.len(), 1, "one diagnostic per failure streak");
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_device_logs_zeros() {
        let log = SharedLog::default();
        let (mut controller, worker) = session_channels();
        let token = CancellationToken::new();
        let task = tokio::spawn(sampling_loop(
            setup(Arc::new(DeviceSpec::None)),
            Box::new(log.clone()),
            worker,
            token.clone(),
        ));

        tokio::time::sleep(PERIOD + Duration::from_millis(50)).await;
        token.cancel();
        task.await.unwrap();

        assert_eq!(log.lines(), vec!["Count, TimeMS, T1Temp", "0, 0.0, 0.000", "1, 0.1, 0.000"]);
        assert!(matches!(controller.display.try_next(), Some(DisplayMessage::Diagnostic(_))));
        assert!(matches!(controller.display.try_next(), Some(DisplayMessage::Header(_))));
    }
}
