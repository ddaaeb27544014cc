//! Storage layer for session persistence.

mod file;
mod traits;

pub use file::{generate_session_id, FileSessionStore};
pub use traits::SessionStore;
