//! Service layer for session state.

pub mod session_store;

pub use session_store::SessionStore;
