pub mod calculation;
pub mod config;
pub mod error;
pub mod filter;
pub mod ids;
pub mod model;
pub mod palette;
pub mod time;

pub use error::{PanelError, Result, TraceParseError};
