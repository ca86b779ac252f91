pub mod scripted;
pub mod synthetic;

pub use scripted::{ScriptStep, ScriptedBackend, SCRIPTED_MARK};
pub use synthetic::SyntheticBackend;
