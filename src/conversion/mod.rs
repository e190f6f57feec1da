pub mod engine;
pub mod metric;
pub mod table;

pub use engine::{convert, Conversion};
pub use metric::Metric;
pub use table::ConversionTable;
