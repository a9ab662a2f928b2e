//! Aiven REST API Client
//!
//! A Rust client library for the parts of the Aiven control-plane API the
//! operator drives: services, databases, service users and project VPCs.
//!
//! # Example
//!
//! ```no_run
//! use aiven_client::{AivenClient, AivenClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AivenClient::new(
//!     "https://api.aiven.io".to_string(),
//!     "your-api-token".to_string(),
//!     std::time::Duration::from_secs(30),
//! )?;
//!
//! let service = client.get_service("my-project", "my-pg").await?;
//! println!("{} is {}", service.service_name, service.state);
//! # Ok(())
//! # }
//! ```
//!
//! # Error classification
//!
//! [`AivenError`] exposes the predicates the reconciler's requeue policy is
//! built on: `is_not_found`, `is_server_error`, `is_already_exists`,
//! `is_retryable`, `is_invalid_token` and `is_dependency_error`.

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod aiven_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use aiven_trait::AivenClientTrait;
pub use client::AivenClient;
pub use common::HttpClient;
pub use error::AivenError;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::MockAivenClient;
