//! Operator-facing output. Kept apart from the `log` diagnostics, which go to
//! stderr through `env_logger`.

use std::io::Write;
use std::path::PathBuf;

use crate::scanner::{ExperimentStatus, ScanStatus};

/// Everything the status line shows.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    /// `Idle`, `Armed`, `Recording` or `Monitoring`.
    pub recording: &'static str,
    pub scan: ScanStatus,
    pub experiment: ExperimentStatus,
    pub data_path: PathBuf,
    pub device: String,
}

impl StatusView {
    /// One-line rendering used by the console.
    pub fn describe(&self) -> String {
        format!(
            "[{}] scanner: {}; {} | data: {} | device: {}",
            self.recording,
            self.scan,
            self.experiment,
            self.data_path.display(),
            self.device
        )
    }
}

pub trait Display: Send {
    /// Column header of the rows that follow.
    fn header(&mut self, header: &str);

    /// A sample row or a one-line message.
    fn line(&mut self, line: &str);

    fn status(&mut self, status: &StatusView);
}

/// Prints to stdout. The status line is only printed when it changed.
pub struct ConsoleDisplay<W: Write + Send = std::io::Stdout> {
    out: W,
    last_status: Option<StatusView>,
}

impl ConsoleDisplay {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_status: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print(&mut self, text: &str) {
        // stdout closed under us; nothing useful left to do with the text
        if writeln!(self.out, "{text}").and_then(|_| self.out.flush()).is_err() {
            log::debug!("console output dropped");
        }
    }
}

impl<W: Write + Send> Display for ConsoleDisplay<W> {
    fn header(&mut self, header: &str) {
        self.print(header);
        self.print(&"-".repeat(header.chars().count()));
    }

    fn line(&mut self, line: &str) {
        self.print(line);
    }

    fn status(&mut self, status: &StatusView) {
        if self.last_status.as_ref() == Some(status) {
            return;
        }
        self.print(&status.describe());
        self.last_status = Some(status.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(recording: &'static str) -> StatusView {
        StatusView {
            recording,
            scan: ScanStatus::Idle,
            experiment: ExperimentStatus::Idle,
            data_path: PathBuf::from("/home/op"),
            device: "none".into(),
        }
    }

    #[test]
    fn status_prints_only_on_change() {
        let mut display = ConsoleDisplay::new(Vec::new());
        display.status(&view("Idle"));
        display.status(&view("Idle"));
        display.status(&view("Armed"));
        let text = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("[Idle] scanner: Idle; Idle | data: /home/op"));
    }

    #[test]
    fn header_is_underlined() {
        let mut display = ConsoleDisplay::new(Vec::new());
        display.header("Count | TimeMS");
        display.line("0     | 0.0   ");
        let text = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(text, "Count | TimeMS\n--------------\n0     | 0.0   \n");
    }
}
