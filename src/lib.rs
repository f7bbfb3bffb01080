//! ScribeVault - upload and file management backend for transcription jobs.
//!
//! Audio and document files arrive in chunks, are assembled on disk and
//! recorded in SQLite, then organized into per-owner folders.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod web;

pub use auth::{Caller, Role};
pub use config::Config;
pub use db::Database;
pub use error::{Result, VaultError};
pub use file::Library;
pub use web::WebServer;
