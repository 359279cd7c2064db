pub mod gantt;
pub mod legend;
pub mod logs_table;
pub mod pie;
pub mod registry;
pub mod scatter;
pub mod timeseries;

pub use registry::{PanelData, PanelKind, PanelOptions, PanelOutput, PanelPlugin, PanelRegistry};
