//! One recording or monitoring session: the sampling loop, its log format and
//! the channels between it and the recorder.

pub mod annotation;
pub mod controller;
pub mod log_format;
pub mod loop_worker;
pub mod mailbox;

pub use annotation::{Annotation, AnnotationSchema, StatusFields};
pub use controller::{log_file_path, SessionController};
pub use log_format::RowLayout;
pub use loop_worker::{adjusted_delay, sampling_loop, SessionSetup};
pub use mailbox::{session_channels, DisplayMessage};
