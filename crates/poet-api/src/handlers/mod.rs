//! HTTP handlers for poet-api.

pub mod flows;
pub mod sessions;
pub mod system;
