pub mod otlp;
pub mod payload;

pub use payload::{PayloadFormat, build_trace};
