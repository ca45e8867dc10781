//! TutorCall Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Standard service trait the relay and future services implement
//! - Common identifiers (SessionId, PeerId, UserId)
//! - Error handling utilities
//! - Configuration management

pub mod config;
pub mod domain;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use domain::*;
pub use error::{Result, TutorCallError};
pub use service::{MicroserviceRuntime, ShutdownSignal, ShutdownTrigger, TutorCallService};
