pub mod config;
pub mod error;
pub mod logging;
pub mod motor;
pub mod port;
pub mod script;
pub mod sequence;

pub use error::{PortError, StepperError};
pub use motor::{CompletionCallback, StepperController};
pub use port::{DigitalOutputPort, PortLog, RecordingPort, TracingPort};
pub use sequence::{Direction, Level, WiringTopology};
