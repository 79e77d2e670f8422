pub mod candidate;
pub mod config;
pub mod delivery;
mod error;
pub mod ffmpeg;
pub mod index;
pub mod naming;
pub mod paths;
pub mod pipeline;
pub mod reddit;
pub mod retrieve;
pub mod tools;

pub use error::{EngineError, Result};
