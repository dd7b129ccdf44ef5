//! WHB04B-6 Pendant Bridge Library
//!
//! Public API for testing and integration.

pub mod command;
pub mod config;
pub mod devices;
pub mod display;
pub mod grbl;
pub mod hidraw;
pub mod jog;
pub mod machine;
pub mod probe;
pub mod protocol;
pub mod router;
pub mod serial;
pub mod session;
pub mod state;

/// Re-export commonly used types
pub use command::{Command, CommandReceiver, CommandSink};
pub use config::{Config, ConfigError};
pub use devices::{DeviceId, DeviceTable, EngineEvent};
pub use display::{DisplayEncoder, FeatureReportSink, ReportType};
pub use grbl::GrblStatusParser;
pub use hidraw::{DeviceInfo, HidrawError, HidrawFeatureSink, PendantHandler};
pub use probe::{ProbeSlot, ProbeState, ProbeWorkflow, ToolLengthProbe};
pub use protocol::{Axis, DisplayReport, FeedSelection, InputReport, KeyCode, ReportError};
pub use serial::{ControllerLink, SerialError};
pub use session::PendantSession;
pub use state::{JogMode, MachineStatus, PendantState, RunState, SpindleDirection};
