pub mod context;
pub mod control;
pub mod event;
pub mod step;
pub mod stream;

// Re-export key types for easier access from other modules (and lib.rs)
pub use context::{Handler, StepContext, StepRequest};
pub use control::{StepControl, StepOutcome};
pub use event::{Event, EventSink, Severity, TerminalStatus};
pub use step::SubStepDef;
pub use stream::EventStream;
