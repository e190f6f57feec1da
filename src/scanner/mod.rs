pub mod poller;
pub mod pvcmd;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

pub use poller::StatusPoller;
pub use pvcmd::PvCmd;

/// A single text request to the scanner's command interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// List the scanner's processes and the datasets they hold.
    ListProcesses,
    /// Filesystem path of a dataset component (`EXPNO`, `STUDY`, ...).
    DatasetPath { psid: String, kind: String },
    /// Value of a named acquisition parameter.
    Parameter { psid: String, name: String },
    /// Scan state of an experiment in a registered study.
    ScanStatus { registration: String, exp_number: String },
}

/// Scanner-side status interface. Replies are raw text; parsing happens in the
/// poller so every source shares the same fallbacks.
pub trait ScanStatusSource: Send + Sync {
    fn query(&self, query: &Query) -> impl Future<Output = Result<String>> + Send;
}

/// Acquisition state of the scan the console is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    Idle,
    Scanning,
    Reco,
    Adjust,
}

impl ScanStatus {
    /// Parse the scanner's reply; anything unrecognised counts as idle.
    pub fn from_reply(reply: &str) -> Self {
        match reply.trim() {
            "SCANNING" => ScanStatus::Scanning,
            "RECO" => ScanStatus::Reco,
            "ADJUST" => ScanStatus::Adjust,
            _ => ScanStatus::Idle,
        }
    }

    /// Spelling used in the log file's status column.
    pub fn as_wire(&self) -> &'static str {
        match self {
            ScanStatus::Idle => "Idle",
            ScanStatus::Scanning => "SCANNING",
            ScanStatus::Reco => "RECO",
            ScanStatus::Adjust => "ADJUST",
        }
    }

    /// Scanning or reconstructing; the states that start a per-scan recording.
    pub fn is_acquiring(&self) -> bool {
        matches!(self, ScanStatus::Scanning | ScanStatus::Reco)
    }

    /// Any state that keeps an already running per-scan recording alive.
    pub fn is_active(&self) -> bool {
        !matches!(self, ScanStatus::Idle)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExperimentStatus {
    Idle,
    Setup,
    Scan,
}

impl ExperimentStatus {
    /// The scan type parameter looks like `Scan_Experiment` or
    /// `Setup_Experiment`; only the prefix matters.
    pub fn from_scan_type(value: &str) -> Self {
        match value.trim().split('_').next().unwrap_or_default() {
            "Scan" => ExperimentStatus::Scan,
            "Setup" => ExperimentStatus::Setup,
            _ => ExperimentStatus::Idle,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            ExperimentStatus::Idle => "Idle",
            ExperimentStatus::Setup => "Setup",
            ExperimentStatus::Scan => "Scan",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Latest view of the scanner, refreshed by the status poller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSnapshot {
    pub scan: ScanStatus,
    pub experiment: ExperimentStatus,
    pub exp_number: String,
    /// Subject directory that per-scan logs are written into.
    pub data_path: PathBuf,
    pub study_path: PathBuf,
}

impl ScanSnapshot {
    /// Snapshot reported when no scan is running or the scanner could not be
    /// queried.
    pub fn idle(data_path: PathBuf, study_path: PathBuf) -> Self {
        Self {
            scan: ScanStatus::Idle,
            experiment: ExperimentStatus::Idle,
            exp_number: "0".to_string(),
            data_path,
            study_path,
        }
    }
}
