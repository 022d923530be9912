//! Motion engine contract and adapter.
//!
//! The tracker talks to a [`MotionAdapter`], which owns a boxed
//! [`MotionEngine`] and the process-wide [`EngineLease`]. Two engines ship
//! with the crate:
//!
//! - [`ScriptedEngine`]: deterministic fake driven through a [`ScriptControl`]
//! - [`TemplateEngine`]: normalised cross-correlation template search

mod adapter;
mod lease;
mod scripted;
mod template;
mod traits;

pub use adapter::{MotionAdapter, ObjectHandle};
pub use lease::EngineLease;
pub use scripted::{ScriptControl, ScriptedEngine, ScriptedEngineFactory};
pub use template::{TemplateConfig, TemplateEngine, TemplateEngineFactory};
pub use traits::{
    EngineDiagnostics, EngineObjectId, KeypointChange, MotionEngine, MotionEngineFactory,
};
