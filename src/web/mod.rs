//! Web API module for ScribeVault.
//!
//! This module provides the REST API used by the transcription dashboard:
//! chunked uploads, file records, folders and a live event stream.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::{create_app, create_router};
pub use server::WebServer;
