//! Meeting-side runtime: transcript ingestion, per-meeting context, and the
//! node schedulers that turn saved configs into chat interventions and notes.

mod binding;
pub mod context;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod notes;
pub mod renderer;
pub mod reporter;
pub mod router;
pub mod scheduler;
pub mod settings;
pub mod window;

pub use binding::BindingInfo;
pub use engine::GraspEngine;
pub use error::EngineError;
pub use ingestion::IngestOutcome;
pub use scheduler::CycleOutcome;
pub use settings::EngineSettings;
