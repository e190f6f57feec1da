pub mod args;
pub mod channels;
pub mod conversion;
pub mod custom;
pub mod display;
pub mod hardware;
pub mod recorder;
pub mod scanner;
pub mod session;
pub mod settings;
pub mod utils;

use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::sync::mpsc;

use args::RecorderArgs;
use display::{ConsoleDisplay, Display};
use recorder::{RecorderController, UserCommand};
use scanner::{PvCmd, StatusPoller};
use settings::{settings_path, SettingsStore};

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Physio recorder starting up...");

    let args = RecorderArgs::parse();
    if let Err(err) = launch(args) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn launch(args: RecorderArgs) -> Result<()> {
    let store = SettingsStore::new(settings_path(args.config))?;
    info!("Settings: {}", store.path().display());

    let settings = store.get();
    let device = args.device.unwrap_or(settings.device.clone());
    let ui_tick = Duration::from_millis(args.ui_tick_ms.unwrap_or(settings.ui_tick_ms).max(1));
    let status_tick =
        Duration::from_millis(args.status_tick_ms.unwrap_or(settings.status_tick_ms).max(1));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let pvcmd = PvCmd::new(
            settings.status_program.clone(),
            Duration::from_millis(settings.status_timeout_ms),
        );
        pvcmd.probe().await;

        let (command_tx, command_rx) = mpsc::channel(16);
        spawn_command_reader(command_tx)?;

        let mut display = ConsoleDisplay::stdout();
        display.line("Type 'help' for commands.");

        let controller = RecorderController::new(
            StatusPoller::new(pvcmd, utils::home_dir()),
            store,
            Arc::new(device),
            display,
            ui_tick,
            status_tick,
        );
        controller.run(command_rx).await;
        Ok(())
    })
}

/// Read operator commands from stdin on a plain thread; a blocking read there
/// cannot hold up runtime shutdown.
fn spawn_command_reader(tx: mpsc::Sender<UserCommand>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("stdin read failed: {err}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<UserCommand>() {
                    Ok(command) => {
                        if tx.blocking_send(command).is_err() {
                            break;
                        }
                    }
                    Err(err) => println!("{err:#}"),
                }
            }
        })
        .context("failed to spawn command reader")?;
    Ok(())
}
