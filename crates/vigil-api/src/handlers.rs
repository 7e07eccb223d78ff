//! HTTP handlers.

pub mod detections;
pub mod health;
pub mod media;

pub use health::{health, ready};
