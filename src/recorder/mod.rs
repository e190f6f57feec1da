pub mod commands;
pub mod controller;
pub mod scheduler;
pub mod state;

pub use commands::UserCommand;
pub use controller::{Flow, RecorderController};
pub use scheduler::Cadence;
pub use state::{Action, RecorderMode, RecordingMachine};
