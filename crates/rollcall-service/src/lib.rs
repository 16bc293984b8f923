//! rollcall-service — attendance-marking orchestration.
//!
//! The embedding extractor (a model session, exclusive and potentially
//! slow) lives on a dedicated engine thread; callers hold a clone-safe
//! [`ServiceHandle`] and await `mark` / `register` replies over oneshot
//! channels.

mod config;
mod service;

pub use config::Config;
pub use service::{spawn_service, FaceMark, ServiceError, ServiceHandle};
