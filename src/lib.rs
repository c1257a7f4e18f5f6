//! IntelliMail
//!
//! A Gmail inbox assistant that keeps a local record of recent mail, works
//! out which conversations still need a reply, and fills in AI-generated
//! summaries and reply drafts.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with token caching
//! - **Mail Gateway**: rate-limited Gmail access with retry (fetch, alias lookup, thread inspection, replies)
//! - **Draft Generator**: summaries and reply drafts from the Gemini API
//! - **Reconciliation**: merges fetched mail with the store, generating only what is missing
//! - **Store**: a single JSON document written atomically
//! - **Export**: filtering, ordering, paging, and CSV export
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use intellimail::{
//!     config::Config, gateway::ProductionMailGateway, generator::GeminiGenerator,
//!     reconciler::Reconciler, store::EmailStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let gateway = ProductionMailGateway::connect(
//!         "credentials.json".as_ref(),
//!         ".intellimail/token.json".as_ref(),
//!         &config.gateway,
//!     )
//!     .await?;
//!     let generator = GeminiGenerator::from_config(&config.generator)?;
//!
//!     let reconciler = Reconciler::new(
//!         Arc::new(gateway),
//!         Arc::new(generator),
//!         EmailStore::new(".intellimail/emails.json"),
//!         config.gateway.max_concurrent_requests,
//!     );
//!
//!     let records = reconciler.refresh(20).await?;
//!     println!("{} emails processed", records.len());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`cli`] - Command-line interface and command dispatch
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`export`] - Query helpers and CSV export
//! - [`gateway`] - Mail gateway trait and Gmail implementation
//! - [`generator`] - Draft generator trait and Gemini implementation
//! - [`models`] - Core data structures
//! - [`reconciler`] - Refresh, draft backfill, and reply operations
//! - [`store`] - Persisted email collection

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod gateway;
pub mod generator;
pub mod models;
pub mod reconciler;
pub mod store;

// Re-export commonly used types for convenience
pub use error::{MailError, Result};

// Core data models
pub use models::{EmailRecord, FetchedMessage, Generation, Outcome};

// Collaborator seams
pub use gateway::{MailGateway, ProductionMailGateway};
pub use generator::{DraftGenerator, GeminiGenerator};

pub use reconciler::Reconciler;
pub use store::EmailStore;
