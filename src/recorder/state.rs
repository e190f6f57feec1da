use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::scanner::{ExperimentStatus, ScanSnapshot};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecorderMode {
    #[default]
    Idle,
    /// Armed: a session is started for every new scan and stopped when the
    /// scanner goes idle.
    Recording,
    /// One ungated session until the operator stops it.
    Monitoring,
}

/// What the controller must do to the sampling session after a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    /// Start a session logging into `data_path`.
    Start { data_path: PathBuf },
    /// Refresh the running session's annotation.
    Update,
    Stop,
    /// Stop the running session, then start one logging into `data_path`.
    Restart { data_path: PathBuf },
}

/// Scan-gated recording decisions, free of I/O.
///
/// The machine assumes every action it returns succeeds. The controller
/// reports a failed start through [`RecordingMachine::start_failed`].
#[derive(Debug, Clone, Default)]
pub struct RecordingMachine {
    mode: RecorderMode,
    session_running: bool,
    /// Data directory of the last scan a session was started for.
    recorded_path: Option<PathBuf>,
}

impl RecordingMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> RecorderMode {
        self.mode
    }

    pub fn session_running(&self) -> bool {
        self.session_running
    }

    /// Custom column settings are fixed while a mode is active.
    pub fn settings_locked(&self) -> bool {
        self.mode != RecorderMode::Idle
    }

    /// Operator-facing status word.
    pub fn status_text(&self) -> &'static str {
        match (self.mode, self.session_running) {
            (RecorderMode::Idle, _) => "Idle",
            (RecorderMode::Recording, false) => "Armed",
            (RecorderMode::Recording, true) => "Recording",
            (RecorderMode::Monitoring, _) => "Monitoring",
        }
    }

    /// Arm per-scan recording. No session starts until a scan is seen.
    pub fn request_record(&mut self) -> Result<()> {
        match self.mode {
            RecorderMode::Idle => {
                self.mode = RecorderMode::Recording;
                self.recorded_path = None;
                Ok(())
            }
            RecorderMode::Recording => bail!("recording is already armed"),
            RecorderMode::Monitoring => bail!("stop monitoring before arming a recording"),
        }
    }

    /// Start monitoring immediately, logging into `data_path`.
    pub fn request_monitor(&mut self, data_path: &Path) -> Result<Action> {
        match self.mode {
            RecorderMode::Idle => {
                self.mode = RecorderMode::Monitoring;
                self.session_running = true;
                Ok(Action::Start {
                    data_path: data_path.to_path_buf(),
                })
            }
            RecorderMode::Monitoring => bail!("monitoring is already running"),
            RecorderMode::Recording => bail!("stop recording before starting to monitor"),
        }
    }

    /// Leave the current mode. Returns `Stop` when a session has to be torn
    /// down.
    pub fn request_stop(&mut self) -> Action {
        let action = if self.session_running {
            Action::Stop
        } else {
            Action::None
        };
        self.mode = RecorderMode::Idle;
        self.session_running = false;
        self.recorded_path = None;
        action
    }

    /// The session the last `Start` or `Restart` asked for could not be
    /// started. The recorder drops back to idle.
    pub fn start_failed(&mut self) {
        self.mode = RecorderMode::Idle;
        self.session_running = false;
        self.recorded_path = None;
    }

    /// Decide what a new scanner snapshot means for the session.
    pub fn on_snapshot(&mut self, snapshot: &ScanSnapshot) -> Action {
        match self.mode {
            RecorderMode::Idle => Action::None,
            RecorderMode::Monitoring => {
                if self.session_running {
                    Action::Update
                } else {
                    Action::None
                }
            }
            RecorderMode::Recording => self.on_recording_snapshot(snapshot),
        }
    }

    fn on_recording_snapshot(&mut self, snapshot: &ScanSnapshot) -> Action {
        let new_scan = snapshot.scan.is_acquiring()
            && snapshot.experiment == ExperimentStatus::Scan
            && self.recorded_path.as_deref() != Some(snapshot.data_path.as_path());

        if !self.session_running {
            if !new_scan {
                return Action::None;
            }
            self.session_running = true;
            self.recorded_path = Some(snapshot.data_path.clone());
            return Action::Start {
                data_path: snapshot.data_path.clone(),
            };
        }

        if !snapshot.scan.is_active() {
            self.session_running = false;
            self.recorded_path = None;
            return Action::Stop;
        }

        if new_scan {
            // A new scan began without an idle poll in between.
            self.recorded_path = Some(snapshot.data_path.clone());
            return Action::Restart {
                data_path: snapshot.data_path.clone(),
            };
        }

        Action::Update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ScanStatus;

    fn snapshot(scan: ScanStatus, experiment: ExperimentStatus, path: &str) -> ScanSnapshot {
        ScanSnapshot {
            scan,
            experiment,
            exp_number: "3".into(),
            data_path: PathBuf::from(path),
            study_path: PathBuf::from(path),
        }
    }

    fn idle() -> ScanSnapshot {
        ScanSnapshot::idle(PathBuf::from("/home/op"), PathBuf::from("/home/op"))
    }

    fn scanning(path: &str) -> ScanSnapshot {
        snapshot(ScanStatus::Scanning, ExperimentStatus::Scan, path)
    }

    fn armed() -> RecordingMachine {
        let mut machine = RecordingMachine::new();
        machine.request_record().unwrap();
        machine
    }

    #[test]
    fn arming_does_not_start_a_session() {
        let mut machine = armed();
        assert_eq!(machine.status_text(), "Armed");
        assert_eq!(machine.on_snapshot(&idle()), Action::None);
        assert!(!machine.session_running());
    }

    #[test]
    fn new_scan_starts_exactly_once() {
        let mut machine = armed();
        assert_eq!(machine.on_snapshot(&idle()), Action::None);
        assert_eq!(
            machine.on_snapshot(&scanning("/data/s1/4")),
            Action::Start { data_path: PathBuf::from("/data/s1/4") }
        );
        for _ in 0..10 {
            assert_eq!(machine.on_snapshot(&scanning("/data/s1/4")), Action::Update);
        }
        assert_eq!(machine.status_text(), "Recording");
    }

    #[test]
    fn setup_and_adjust_do_not_start() {
        let mut machine = armed();
        let setup = snapshot(ScanStatus::Scanning, ExperimentStatus::Setup, "/data/s1/4");
        assert_eq!(machine.on_snapshot(&setup), Action::None);
        let adjust = snapshot(ScanStatus::Adjust, ExperimentStatus::Scan, "/data/s1/4");
        assert_eq!(machine.on_snapshot(&adjust), Action::None);
    }

    #[test]
    fn idle_scanner_stops_and_rearms() {
        let mut machine = armed();
        machine.on_snapshot(&scanning("/data/s1/4"));

        // Adjust keeps the session and refreshes the status column.
        let adjust = snapshot(ScanStatus::Adjust, ExperimentStatus::Scan, "/data/s1/4");
        assert_eq!(machine.on_snapshot(&adjust), Action::Update);

        assert_eq!(machine.on_snapshot(&idle()), Action::Stop);
        assert_eq!(machine.mode(), RecorderMode::Recording);
        assert_eq!(machine.on_snapshot(&idle()), Action::None);

        // The remembered path was cleared, so the same directory records again.
        assert!(matches!(machine.on_snapshot(&scanning("/data/s1/4")), Action::Start { .. }));
    }

    #[test]
    fn back_to_back_scans_restart() {
        let mut machine = armed();
        machine.on_snapshot(&scanning("/data/s1/4"));
        assert_eq!(
            machine.on_snapshot(&scanning("/data/s1/5")),
            Action::Restart { data_path: PathBuf::from("/data/s1/5") }
        );
        assert_eq!(machine.on_snapshot(&scanning("/data/s1/5")), Action::Update);
    }

    #[test]
    fn modes_are_exclusive() {
        let mut machine = armed();
        assert!(machine.request_monitor(Path::new("/home/op")).is_err());
        assert_eq!(machine.request_stop(), Action::None);

        let action = machine.request_monitor(Path::new("/home/op")).unwrap();
        assert!(matches!(action, Action::Start { .. }));
        assert!(machine.request_record().is_err());
        assert!(machine.settings_locked());
    }

    #[test]
    fn monitoring_updates_on_every_poll() {
        let mut machine = RecordingMachine::new();
        machine.request_monitor(Path::new("/home/op")).unwrap();
        assert_eq!(machine.on_snapshot(&idle()), Action::Update);
        assert_eq!(machine.on_snapshot(&scanning("/data/s1/4")), Action::Update);
        assert_eq!(machine.request_stop(), Action::Stop);
        assert_eq!(machine.mode(), RecorderMode::Idle);
        assert!(!machine.settings_locked());
    }

    #[test]
    fn failed_start_returns_to_idle() {
        let mut machine = RecordingMachine::new();
        machine.request_monitor(Path::new("/readonly")).unwrap();
        machine.start_failed();
        assert_eq!(machine.mode(), RecorderMode::Idle);
        assert_eq!(machine.on_snapshot(&scanning("/data/s1/4")), Action::None);

        let mut machine = armed();
        machine.on_snapshot(&scanning("/data/s1/4"));
        machine.start_failed();
        assert_eq!(machine.mode(), RecorderMode::Idle);
        assert_eq!(machine.status_text(), "Idle");
    }
}
