//! CMR Common Library
//!
//! Shared code for the CMR gateway and export crates:
//! - Database models, the owner-scoped document store and its implementations
//! - Lifecycle engine (status state machine)
//! - Object storage for photos and signatures
//! - Attachment and document services
//! - Export aggregate assembly
//! - Error types, configuration, authentication, metrics

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod lifecycle;
pub mod metrics;
pub mod services;
pub mod storage;

// Re-export commonly used types
pub use aggregate::{AggregateBuilder, ExportAggregate};
pub use auth::AuthContext;
pub use config::AppConfig;
pub use db::{DocumentStore, MemoryStore, Repository};
pub use errors::{AppError, Result};
pub use lifecycle::{LifecycleAction, LifecycleEngine, Transition};
pub use storage::{HttpObjectStore, MemoryObjectStore, ObjectStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
