use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use log::info;
use tokio_util::sync::CancellationToken;

use super::annotation::Annotation;
use super::loop_worker::{sampling_loop, SessionSetup};
use super::mailbox::{session_channels, ControllerEnds, DisplayMessage};

/// `PhysioRecordingLog<YYYYMMDD_HHMMSS>.txt` inside `dir`.
pub fn log_file_path(dir: &Path, started_at: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "PhysioRecordingLog{}.txt",
        started_at.format("%Y%m%d_%H%M%S")
    ))
}

/// Highest `_<n>` suffix tried before giving up on a log name.
const MAX_LOG_SUFFIX: u32 = 100;

/// Create a new log at `preferred`. When a log of that name already exists
/// (two sessions started within the same second) the name gets a `_2`,
/// `_3`, ... suffix; an existing log is never truncated.
fn create_log(preferred: &Path) -> Result<(File, PathBuf)> {
    let mut candidate = preferred.to_path_buf();
    for suffix in 2..=MAX_LOG_SUFFIX + 1 {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((file, candidate)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                candidate = suffixed(preferred, suffix);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create log file {}", candidate.display()))
            }
        }
    }
    bail!(
        "failed to create log file {}: too many logs with the same name",
        preferred.display()
    )
}

fn suffixed(path: &Path, suffix: u32) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    path.with_file_name(name)
}

/// Owns at most one running sampling loop and the controller's ends of its
/// channels.
///
/// The loop runs on its own OS thread with a single-threaded runtime, so a
/// slow scanner query on the controller side never delays a sample.
pub struct SessionController {
    worker: Option<thread::JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    ends: Option<ControllerEnds>,
    log_path: Option<PathBuf>,
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            worker: None,
            cancel_token: None,
            ends: None,
            log_path: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Log file of the running session.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Create the log file and spawn the sampling loop. Returns the path the
    /// log was created at, which differs from `log_path` when a log of that
    /// name already exists.
    ///
    /// Nothing is spawned when the file cannot be created. `initial` is in the
    /// mailbox before the first sample is taken.
    pub fn start(
        &mut self,
        setup: SessionSetup,
        log_path: &Path,
        initial: Annotation,
    ) -> Result<PathBuf> {
        if self.worker.is_some() {
            bail!("session already active");
        }

        let (file, log_path) = create_log(log_path)?;
        let log = Box::new(BufWriter::new(file));

        let (ends, worker_ends) = session_channels();
        ends.annotations.publish(initial);

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();
        let session_id = setup.session_id.clone();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("failed to build sampling runtime")?;

        let handle = thread::Builder::new()
            .name(format!("sampling-{session_id}"))
            .spawn(move || {
                runtime.block_on(sampling_loop(setup, log, worker_ends, token_clone));
            })
            .context("failed to spawn sampling thread")?;

        info!("Session {session_id} recording to {}", log_path.display());

        self.worker = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.ends = Some(ends);
        self.log_path = Some(log_path.clone());
        Ok(log_path)
    }

    /// Replace the annotation the loop attaches to its next rows.
    pub fn update(&self, annotation: Annotation) {
        if let Some(ends) = &self.ends {
            ends.annotations.publish(annotation);
        }
    }

    /// Display messages produced since the last call. Never blocks.
    pub fn drain_display(&mut self) -> Vec<DisplayMessage> {
        match self.ends.as_mut() {
            Some(ends) => ends.display.drain(),
            None => Vec::new(),
        }
    }

    /// Cancel the loop and wait for it to finish its current tick. Stopping
    /// an idle controller is a no-op. Returns the display messages the loop
    /// produced before it exited.
    pub async fn stop(&mut self) -> Result<Vec<DisplayMessage>> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let joined = match self.worker.take() {
            Some(handle) => tokio::task::spawn_blocking(move || handle.join())
                .await
                .context("sampling thread join task failed")
                .and_then(|res| res.map_err(|_| anyhow::anyhow!("sampling thread panicked"))),
            None => Ok(()),
        };

        let remaining = match self.ends.take() {
            Some(mut ends) => ends.display.drain(),
            None => Vec::new(),
        };
        if let Some(path) = self.log_path.take() {
            info!("Session log closed: {}", path.display());
        }
        joined.map(|_| remaining)
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn log_name_carries_start_time() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(
            log_file_path(Path::new("/data/subj"), at),
            PathBuf::from("/data/subj/PhysioRecordingLog20240307_090502.txt")
        );
    }

    #[test]
    fn existing_log_is_never_truncated() {
        let dir = std::env::temp_dir().join(format!("physio-log-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let preferred = dir.join("PhysioRecordingLog20240307_090502.txt");
        std::fs::write(&preferred, "Count, TimeMS\n0, 0.0\n").unwrap();

        let (_file, second) = create_log(&preferred).unwrap();
        assert_eq!(second, dir.join("PhysioRecordingLog20240307_090502_2.txt"));
        let (_file, third) = create_log(&preferred).unwrap();
        assert_eq!(third, dir.join("PhysioRecordingLog20240307_090502_3.txt"));
        assert_eq!(
            std::fs::read_to_string(&preferred).unwrap(),
            "Count, TimeMS\n0, 0.0\n"
        );
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn stopping_idle_controller_is_a_no_op() {
        let mut controller = SessionController::new();
        assert!(!controller.is_running());
        assert!(controller.stop().await.unwrap().is_empty());
        assert!(controller.drain_display().is_empty());
    }
}
