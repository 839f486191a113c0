//! HTTP front end for the soda bottle classifier.
//!
//! A thin axum layer over `soda_classifier_core::ClassifierService`:
//! transport decoding (JSON, base64) on the way in, status mapping and the
//! `{"error", "type"}` shape on the way out.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;

pub use config::{AppConfig, ServerConfig};
pub use error::{ApiError, ConfigLoadError};
pub use router::{create_router, AppState};
