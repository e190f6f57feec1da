pub mod logging;

use std::path::PathBuf;

/// Home directory of the operator, falling back to the working directory when
/// the platform cannot tell us (service accounts without a home).
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
