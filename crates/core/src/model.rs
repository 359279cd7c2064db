pub mod log;
pub mod series;
pub mod span;
pub mod trace;
pub mod trace_search;
