pub mod engine;

pub use engine::{EngineSettings, ModerationEngine};
