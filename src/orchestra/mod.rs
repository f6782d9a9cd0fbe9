//! Background training jobs and their progress events.

mod event;
mod inhibit;
mod job;
mod orchestrator;

pub use event::{JobPhase, JobReport, TrainingEvent};
pub use inhibit::{IdleInhibitor, NoopInhibitor};
pub use orchestrator::{Orchestrator, TrainingJob};
