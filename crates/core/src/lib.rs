//! Core utilities for the engine.
//!
//! Foundational types used by every other crate in the workspace:
//! - Error type and result alias
//! - Logging initialization
//! - Frame timing

mod error;
mod logging;
mod timer;

pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
