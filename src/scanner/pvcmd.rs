use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::process::Command;

use super::{Query, ScanStatusSource};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Talks to the scanner through its command-line client (`pvcmd`).
///
/// Every query spawns a short-lived client process; these are slow compared to
/// a sample tick, which is why the controller polls on its own cadence.
#[derive(Debug, Clone)]
pub struct PvCmd {
    program: String,
    timeout: Duration,
}

impl PvCmd {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Check that the client is reachable. The client only exists inside a
    /// terminal opened from the scanner software; elsewhere every poll will
    /// report an idle scanner.
    pub async fn probe(&self) -> bool {
        match self.query(&Query::ListProcesses).await {
            Ok(reply) if !reply.contains("command not found") => true,
            Ok(_) | Err(_) => {
                log_warn!(
                    "'{}' is not reachable; start the recorder from a terminal opened by the scanner software. \
                     Scan status will read as Idle.",
                    self.program
                );
                false
            }
        }
    }

    fn arguments(query: &Query) -> Vec<String> {
        let args: Vec<&str> = match query {
            Query::ListProcesses => vec!["-a", "ParxServer", "-r", "ListPs"],
            Query::DatasetPath { psid, kind } => vec![
                "-a", "ParxServer", "-r", "DsetGetPath", "-psid", psid.as_str(), "-path", kind.as_str(),
            ],
            Query::Parameter { psid, name } => vec![
                "-a", "ParxServer", "-r", "ParamGetValue", "-psid", psid.as_str(), "-param", name.as_str(),
            ],
            Query::ScanStatus {
                registration,
                exp_number,
            } => vec![
                "-a",
                "JPingo",
                "-r",
                "DSetServer.GetScanStatus",
                "-registration",
                registration.as_str(),
                "-expno",
                exp_number.as_str(),
            ],
        };
        args.into_iter().map(str::to_string).collect()
    }
}

impl ScanStatusSource for PvCmd {
    async fn query(&self, query: &Query) -> Result<String> {
        let args = Self::arguments(query);
        log_debug!("{} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                bail!("{}: command not found", self.program)
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to spawn {}", self.program))
            }
        };

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("{} timed out after {:?}", self.program, self.timeout))?
            .with_context(|| format!("{} did not complete", self.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
