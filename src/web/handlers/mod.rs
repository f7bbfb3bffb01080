//! API handlers.

pub mod events;
pub mod file;
pub mod folder;
pub mod upload;

pub use events::*;
pub use file::*;
pub use folder::*;
pub use upload::*;

use crate::file::Library;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The file library.
    pub library: Library,
}

impl AppState {
    /// Create a new application state.
    pub fn new(library: Library) -> Self {
        Self { library }
    }
}
