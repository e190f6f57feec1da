use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use uuid::Uuid;

use crate::conversion::ConversionTable;
use crate::display::{Display, StatusView};
use crate::hardware::DeviceFactory;
use crate::scanner::{ScanSnapshot, ScanStatusSource, StatusPoller};
use crate::session::{
    log_file_path, Annotation, AnnotationSchema, DisplayMessage, RowLayout, SessionController,
    SessionSetup,
};
use crate::settings::{RecorderSettings, SettingsStore};

use super::commands::{UserCommand, HELP};
use super::scheduler::Cadence;
use super::state::{Action, RecordingMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The recorder's control loop: polls the scanner on one cadence, refreshes
/// the console on another, and turns operator commands and scanner changes
/// into session starts, updates and stops.
pub struct RecorderController<S, D> {
    poller: StatusPoller<S>,
    settings: SettingsStore,
    device: Arc<dyn DeviceFactory>,
    device_status: String,
    display: D,
    table: ConversionTable,
    machine: RecordingMachine,
    session: SessionController,
    /// Annotation schema of the running session.
    schema: AnnotationSchema,
    snapshot: ScanSnapshot,
    custom_values: Vec<String>,
    ui_cadence: Cadence,
    status_cadence: Cadence,
}

impl<S: ScanStatusSource, D: Display> RecorderController<S, D> {
    pub fn new(
        poller: StatusPoller<S>,
        settings: SettingsStore,
        device: Arc<dyn DeviceFactory>,
        display: D,
        ui_tick: Duration,
        status_tick: Duration,
    ) -> Self {
        let device_status = match device.open() {
            Ok(_) => "connected".to_string(),
            Err(err) => {
                warn!("Analog device not available: {err:#}");
                "not connected".to_string()
            }
        };
        let home = crate::utils::home_dir();

        Self {
            poller,
            settings,
            device,
            device_status,
            display,
            table: ConversionTable::default(),
            machine: RecordingMachine::new(),
            session: SessionController::new(),
            schema: AnnotationSchema::default(),
            snapshot: ScanSnapshot::idle(home.clone(), home),
            custom_values: Vec::new(),
            ui_cadence: Cadence::new(ui_tick),
            status_cadence: Cadence::new(status_tick),
        }
    }

    pub fn machine(&self) -> &RecordingMachine {
        &self.machine
    }

    pub fn snapshot(&self) -> &ScanSnapshot {
        &self.snapshot
    }

    pub fn settings(&self) -> RecorderSettings {
        self.settings.get()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Log file of the running session.
    pub fn session_log(&self) -> Option<PathBuf> {
        self.session.log_path().map(Path::to_path_buf)
    }

    pub fn status_view(&self) -> StatusView {
        StatusView {
            recording: self.machine.status_text(),
            scan: self.snapshot.scan,
            experiment: self.snapshot.experiment,
            data_path: self.snapshot.data_path.clone(),
            device: self.device_status.clone(),
        }
    }

    /// Run until `quit` or until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<UserCommand>) {
        info!(
            "Recorder running (ui tick {:?}, status tick {:?})",
            self.ui_cadence.period(),
            self.status_cadence.period()
        );

        loop {
            let now = Instant::now();
            if self.status_cadence.fire_if_due(now) {
                self.poll_status().await;
            }
            if self.ui_cadence.fire_if_due(now) {
                self.refresh_display();
            }

            let now = Instant::now();
            let wait = self
                .ui_cadence
                .until_due(now)
                .min(self.status_cadence.until_due(now));

            match time::timeout(wait, commands.recv()).await {
                Ok(Some(command)) => {
                    if self.handle(command).await == Flow::Quit {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Command input closed");
                    break;
                }
                Err(_) => {}
            }
        }

        self.shutdown().await;
    }

    /// Query the scanner and act on what changed.
    pub async fn poll_status(&mut self) {
        self.snapshot = self.poller.poll().await;
        let action = self.machine.on_snapshot(&self.snapshot);
        self.execute(action).await;
    }

    /// Show pending session output and the status line.
    pub fn refresh_display(&mut self) {
        for message in self.session.drain_display() {
            self.show(message);
        }
        let view = self.status_view();
        self.display.status(&view);
    }

    pub async fn handle(&mut self, command: UserCommand) -> Flow {
        match command {
            UserCommand::Record => {
                self.save_and_reload();
                match self.machine.request_record() {
                    Ok(()) => self.say("Start recording: a log is written for each scan."),
                    Err(err) => self.say(&format!("{err}")),
                }
            }
            UserCommand::Monitor => {
                self.save_and_reload();
                let data_path = self.snapshot.data_path.clone();
                match self.machine.request_monitor(&data_path) {
                    Ok(action) => self.execute(action).await,
                    Err(err) => self.say(&format!("{err}")),
                }
            }
            UserCommand::Stop => {
                let action = self.machine.request_stop();
                self.execute(action).await;
                self.save();
                self.say("Stopped.");
            }
            UserCommand::Custom(values) => {
                self.custom_values = values;
                if self.session.is_running() {
                    self.session.update(self.annotation());
                }
            }
            UserCommand::Assign { line, metric } => {
                self.change_settings(|s| s.channels.assign_named(&line, metric))
            }
            UserCommand::Period(secs) => self.change_settings(|s| s.set_sample_period(secs)),
            UserCommand::Label { slot, label } => {
                self.change_settings(|s| s.custom.set_label(slot, &label))
            }
            UserCommand::Enable { slot, enabled } => {
                self.change_settings(|s| s.custom.set_enabled(slot, enabled))
            }
            UserCommand::Save => {
                self.save();
                self.say("Updated config.");
            }
            UserCommand::Status => {
                let text = self.status_view().describe();
                self.say(&text);
            }
            UserCommand::Help => {
                for line in HELP.lines() {
                    self.display.line(line);
                }
            }
            UserCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Stop any session and save the settings.
    pub async fn shutdown(&mut self) {
        let action = self.machine.request_stop();
        self.execute(action).await;
        self.save();
        info!("Recorder stopped");
    }

    async fn execute(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::Update => self.session.update(self.annotation()),
            Action::Start { data_path } => self.start_session(&data_path),
            Action::Stop => self.stop_session().await,
            Action::Restart { data_path } => {
                self.stop_session().await;
                self.start_session(&data_path);
            }
        }
    }

    fn start_session(&mut self, data_path: &Path) {
        let settings = self.settings.get();
        let channels = settings.channels.active_set();
        let schema = AnnotationSchema::new(true, &settings.custom);
        let layout = RowLayout::new(channels.iter().map(|c| c.metric).collect(), schema.clone());
        let log_path = log_file_path(data_path, Local::now());
        let setup = SessionSetup {
            session_id: Uuid::new_v4().to_string(),
            channels,
            sample_period: settings.sample_period(),
            layout,
            table: self.table.clone(),
            device: Arc::clone(&self.device),
        };
        let initial = schema.annotate(&self.snapshot, &self.custom_values);

        match self.session.start(setup, &log_path, initial) {
            Ok(log_path) => {
                self.schema = schema;
                self.say(&format!("Starting session: logging to {}", log_path.display()));
            }
            Err(err) => {
                error!("Session start failed: {err:#}");
                self.say(&format!("Could not open logging file: {err:#}"));
                self.machine.start_failed();
            }
        }
    }

    async fn stop_session(&mut self) {
        match self.session.stop().await {
            Ok(remaining) => {
                for message in remaining {
                    self.show(message);
                }
                self.say("Stopped logging.");
            }
            Err(err) => error!("Session did not stop cleanly: {err:#}"),
        }
    }

    fn annotation(&self) -> Annotation {
        self.schema.annotate(&self.snapshot, &self.custom_values)
    }

    fn change_settings<F>(&mut self, change: F)
    where
        F: FnOnce(&mut RecorderSettings) -> anyhow::Result<()>,
    {
        if self.machine.settings_locked() {
            self.say("Settings cannot be changed while recording or monitoring.");
            return;
        }
        if let Err(err) = self.settings.update(change) {
            self.say(&format!("{err:#}"));
        }
    }

    /// Saving then reloading picks up edits made to the file by hand.
    fn save_and_reload(&mut self) {
        self.say("Saving and loading channel configuration.");
        self.save();
        if let Err(err) = self.settings.reload() {
            warn!("Settings reload failed: {err:#}");
        }
    }

    fn save(&mut self) {
        if let Err(err) = self.settings.save() {
            error!("{err:#}");
            self.say(&format!("Settings not saved: {err:#}"));
        }
    }

    fn show(&mut self, message: DisplayMessage) {
        match message {
            DisplayMessage::Header(header) => self.display.header(&header),
            DisplayMessage::Row(row) => self.display.line(&row),
            DisplayMessage::Diagnostic(text) => self.display.line(&text),
        }
    }

    fn say(&mut self, text: &str) {
        self.display.line(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::hardware::DeviceSpec;
    use crate::recorder::RecorderMode;
    use crate::scanner::Query;

    #[derive(Default)]
    struct Lines(Vec<String>);

    impl Display for Lines {
        fn header(&mut self, header: &str) {
            self.0.push(header.to_string());
        }
        fn line(&mut self, line: &str) {
            self.0.push(line.to_string());
        }
        fn status(&mut self, _status: &StatusView) {}
    }

    /// Scanner whose process listing is always empty.
    struct NoScanner;

    impl ScanStatusSource for NoScanner {
        async fn query(&self, _query: &Query) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    /// Every query fails, as when the scanner software is not running.
    struct Unreachable;

    impl ScanStatusSource for Unreachable {
        async fn query(&self, _query: &Query) -> anyhow::Result<String> {
            anyhow::bail!("command not found")
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("physio-recorder-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn controller<S: ScanStatusSource>(source: S, dir: &Path) -> RecorderController<S, Lines> {
        let settings = SettingsStore::new(dir.join("settings.json")).unwrap();
        RecorderController::new(
            StatusPoller::new(source, dir.to_path_buf()),
            settings,
            Arc::new(DeviceSpec::Fixed { volts: 0.0 }),
            Lines::default(),
            Duration::from_millis(100),
            Duration::from_millis(400),
        )
    }

    #[tokio::test]
    async fn settings_are_locked_during_a_mode() {
        let dir = temp_dir();
        let mut recorder = controller(NoScanner, &dir);
        recorder.handle(UserCommand::Record).await;
        recorder.handle(UserCommand::Period(0.25)).await;
        assert_eq!(recorder.settings().sample_period_secs, 1.0);
        assert!(recorder.display().0.iter().any(|l| l.contains("cannot be changed")));

        recorder.handle(UserCommand::Stop).await;
        recorder.handle(UserCommand::Period(0.25)).await;
        assert_eq!(recorder.settings().sample_period_secs, 0.25);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn unreachable_scanner_reads_idle() {
        let dir = temp_dir();
        let mut recorder = controller(Unreachable, &dir);
        recorder.handle(UserCommand::Record).await;
        recorder.poll_status().await;
        assert_eq!(recorder.machine().status_text(), "Armed");
        assert_eq!(recorder.snapshot().data_path, dir);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn monitor_into_missing_directory_falls_back_to_idle() {
        let dir = temp_dir();
        let mut recorder = controller(NoScanner, &dir);
        recorder.snapshot.data_path = dir.join("does/not/exist");
        recorder.handle(UserCommand::Monitor).await;
        assert_eq!(recorder.machine().mode(), RecorderMode::Idle);
        assert!(recorder.session_log().is_none());
        assert!(recorder
            .display()
            .0
            .iter()
            .any(|l| l.starts_with("Could not open logging file")));
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn monitor_writes_a_log_until_stopped() {
        let dir = temp_dir();
        let mut recorder = controller(NoScanner, &dir);
        recorder.poll_status().await;
        recorder.handle(UserCommand::Monitor).await;
        assert_eq!(recorder.machine().mode(), RecorderMode::Monitoring);
        let log = recorder.session_log().unwrap();
        assert!(log.starts_with(&dir));

        recorder.handle(UserCommand::Custom(vec!["2 %".into()])).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        recorder.handle(UserCommand::Stop).await;

        let contents = std::fs::read_to_string(&log).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("Count, TimeMS, T1Temp, PRespRate, Iso, Status, ExpStatus, Exp")
        );
        assert_eq!(lines.next(), Some("0, 0.0, 0.000, 0.000, 0.000, Idle,Idle,0"));
        assert!(recorder.display().0.iter().any(|l| l.starts_with("Count | TimeMS")));
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn back_to_back_sessions_keep_both_logs() {
        let dir = temp_dir();
        let mut recorder = controller(NoScanner, &dir);
        recorder.poll_status().await;

        recorder.handle(UserCommand::Monitor).await;
        let first = recorder.session_log().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        recorder.handle(UserCommand::Stop).await;

        recorder.handle(UserCommand::Monitor).await;
        let second = recorder.session_log().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        recorder.handle(UserCommand::Stop).await;

        assert_ne!(first, second);
        for log in [&first, &second] {
            let contents = std::fs::read_to_string(log).unwrap();
            assert!(contents.starts_with("Count, TimeMS, T1Temp"), "{contents}");
            assert!(contents.lines().count() >= 2, "{contents}");
        }
        std::fs::remove_dir_all(dir).ok();
    }
}
