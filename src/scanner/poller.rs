use std::path::PathBuf;

use anyhow::{anyhow, Result};

use super::{ExperimentStatus, Query, ScanSnapshot, ScanStatus, ScanStatusSource};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const EXPNO_PATH: &str = "EXPNO";
const STUDY_UID_PARAM: &str = "SUBJECT_study_instance_uid";
const SCAN_TYPE_PARAM: &str = "ACQ_scan_type";

/// Turns raw scanner replies into a [`ScanSnapshot`].
///
/// Polling never fails: any query error or unparseable reply yields an idle
/// snapshot for that tick, so a flaky scanner can only delay a recording, not
/// take the controller down.
pub struct StatusPoller<S> {
    source: S,
    home: PathBuf,
    verbose: bool,
}

impl<S: ScanStatusSource> StatusPoller<S> {
    pub fn new(source: S, home: PathBuf) -> Self {
        let verbose = std::env::var("PHYSIO_RECORDER_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            source,
            home,
            verbose,
        }
    }

    pub async fn poll(&self) -> ScanSnapshot {
        let snapshot = self.poll_inner().await;
        if self.verbose {
            log_info!(
                "scan={} experiment={} exp={} data_path={}",
                snapshot.scan,
                snapshot.experiment,
                snapshot.exp_number,
                snapshot.data_path.display()
            );
        }
        snapshot
    }

    async fn poll_inner(&self) -> ScanSnapshot {
        let listing = match self.source.query(&Query::ListProcesses).await {
            Ok(listing) => listing,
            Err(err) => {
                log_warn!("scanner process listing failed: {err:#}");
                return ScanSnapshot::idle(self.home.clone(), self.home.clone());
            }
        };

        let (data_path, study_path) = study_paths(&listing)
            .unwrap_or_else(|| (self.home.clone(), self.home.clone()));

        let Some(psid) = active_process_id(&listing) else {
            return ScanSnapshot::idle(data_path, study_path);
        };

        match self.active_scan(&psid, study_path.clone()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log_warn!("scan status query for process {psid} failed: {err:#}");
                ScanSnapshot::idle(data_path, study_path)
            }
        }
    }

    async fn active_scan(&self, psid: &str, study_path: PathBuf) -> Result<ScanSnapshot> {
        let exp_path = self
            .source
            .query(&Query::DatasetPath {
                psid: psid.to_string(),
                kind: EXPNO_PATH.to_string(),
            })
            .await?;
        let (data_path, exp_number) = split_experiment_path(&exp_path)
            .ok_or_else(|| anyhow!("unexpected experiment path '{}'", exp_path.trim()))?;

        let registration = self
            .source
            .query(&Query::Parameter {
                psid: psid.to_string(),
                name: STUDY_UID_PARAM.to_string(),
            })
            .await?
            .trim()
            .to_string();

        let scan_type = self
            .source
            .query(&Query::Parameter {
                psid: psid.to_string(),
                name: SCAN_TYPE_PARAM.to_string(),
            })
            .await?;

        let status = self
            .source
            .query(&Query::ScanStatus {
                registration,
                exp_number: exp_number.clone(),
            })
            .await?;

        Ok(ScanSnapshot {
            scan: ScanStatus::from_reply(&status),
            experiment: ExperimentStatus::from_scan_type(&scan_type),
            exp_number,
            data_path: PathBuf::from(data_path),
            study_path,
        })
    }
}

/// Study and subject directories from the first `DSET PATH` entry of a
/// process listing. The subject directory is the study path with its last
/// component (the experiment number) removed.
pub fn study_paths(listing: &str) -> Option<(PathBuf, PathBuf)> {
    let dataset = listing
        .lines()
        .find(|line| line.contains("DSET PATH"))?
        .split_whitespace()
        .nth(2)?;
    let study = dataset.split("pdata").next().unwrap_or_default();
    let trimmed = study.trim_end_matches('/');
    let data = trimmed
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .unwrap_or(trimmed);
    if data.is_empty() {
        return None;
    }
    Some((PathBuf::from(data), PathBuf::from(study)))
}

/// Process id of the dataset owned by the acquisition pipeline: the first
/// `PSID` line among the three lines preceding (or on) a `pipeMaster` line.
pub fn active_process_id(listing: &str) -> Option<String> {
    let lines: Vec<&str> = listing.lines().collect();
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains("pipeMaster"))
        .flat_map(|(index, _)| &lines[index.saturating_sub(3)..=index])
        .find(|line| line.contains("PSID"))
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
}

/// Split `<subject>/<expno>[/pdata/..]` into the subject directory and the
/// experiment number.
pub fn split_experiment_path(reply: &str) -> Option<(String, String)> {
    let path = reply
        .trim()
        .split("pdata")
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let (parent, exp_number) = path.rsplit_once('/')?;
    if exp_number.is_empty() {
        return None;
    }
    Some((parent.to_string(), exp_number.to_string()))
}
