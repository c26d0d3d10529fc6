//! # poet-core
//!
//! Core types, traits, and abstractions for photo-poet.
//!
//! This crate provides the data model shared by the inference backends and the
//! HTTP server, the schema validator used on every model boundary, and the
//! per-session interaction state machine.

pub mod controller;
pub mod defaults;
pub mod error;
pub mod models;
pub mod photo;
pub mod schema;
pub mod traits;

// Re-export commonly used types at crate root
pub use controller::{InteractionController, InteractionSnapshot, InteractionState, Phase};
pub use error::{Error, Result};
pub use models::*;
pub use photo::{PhotoReference, PhotoSource};
pub use schema::{FieldViolation, Schema, ValidationError};
pub use traits::*;
