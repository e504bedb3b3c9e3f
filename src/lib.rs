//! # ai-manager
//!
//! Purpose-based AI request broker. Callers ask for a purpose (chat,
//! transcription, image generation, retrieval, ...); the manager resolves the
//! provider instance assigned to that purpose for the caller's role, shapes
//! the request, calls the provider and returns one normalized response.
//!
//! ## Key Features
//!
//! - **Purposes**: Option schemas, prompt templates and output post-processing per use case
//! - **Connectors**: Ollama, OpenAI (DALL-E, Whisper, TTS, embeddings, directly or via Azure),
//!   Google Imagen with OAuth token refresh, Qdrant vector store
//! - **Dispatch**: Per (purpose, role) assignment with cached connector instances
//! - **Accounting**: Request limits and usage recording through pluggable collaborators
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_manager::{
//!     Caller, ConnectorKind, InMemoryConfigStore, InstanceConfig, Manager, ManagerServices,
//!     ManagerSettings, PurposeKind, RawOptions, Role,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = Arc::new(InMemoryConfigStore::new());
//! config.add_instance(InstanceConfig::new(
//!     "local-llama",
//!     ConnectorKind::Ollama,
//!     "llama3.3",
//!     "http://localhost:11434/api/chat",
//! ));
//! config.assign(PurposeKind::SinglePrompt, Role::Basic, "local-llama");
//! config.set_max_requests(PurposeKind::SinglePrompt, Role::Basic, 100);
//!
//! let services = Arc::new(ManagerServices::in_memory(config, ManagerSettings::default()));
//! let manager = Manager::new(
//!     PurposeKind::SinglePrompt,
//!     Caller::new(42, "school-1", Role::Basic),
//!     services,
//! );
//! let response = manager
//!     .perform_request("Explain photosynthesis", "block_chat", 1, &RawOptions::new())
//!     .await;
//! println!("{:?}", response.content());
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod connectors;
pub mod core_types;
pub mod error;
pub mod factory;
pub mod manager;
pub mod purposes;

// Logging utilities (re-exports tracing with log_* naming) - internal only
pub(crate) mod logging;
pub(crate) mod response_parser;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use config::{AzureOptions, ExpiryDetector, InstanceConfig, ManagerSettings};
pub use connectors::{Connector, ConnectorContext, ConnectorKind};
pub use error::{ErrorKind, ManagerError, ManagerResult};
pub use factory::{ConnectorFactory, PurposeDescriptor};
pub use manager::{Manager, ManagerServices};
pub use purposes::{Purpose, PurposeKind, RagAction};

pub use core_types::{
    // Caller identity
    Caller,
    Role,
    // Collaborators
    BlobOwner,
    BlobStore,
    ConfigStore,
    Embedder,
    EmbeddingCache,
    InMemoryBlobStore,
    InMemoryConfigStore,
    InMemoryEmbeddingCache,
    InMemoryInitStatusStore,
    InMemoryUsageStore,
    InitStatus,
    InitStatusStore,
    UsageStore,
    // Options and results
    OptionSchema,
    ParamType,
    PromptResponse,
    RawOptions,
    RequestOptions,
    RequestResponse,
    Usage,
    UsageUnit,
};
