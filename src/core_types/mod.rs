//! Core value types shared by purposes, connectors and the orchestrator
//!
//! ## Organization
//! - `usage` - Usage accounting (`Usage`, `UsageUnit`)
//! - `response` - Transport-level and normalized results
//! - `options` - Option schema and validated request options
//! - `caller` - Explicit caller identity threaded through every call
//! - `collaborators` - Narrow interfaces to the outside world (config,
//!   quota accounting, blob storage, backend status, embeddings)

pub mod caller;
pub mod collaborators;
pub mod options;
pub mod response;
pub mod usage;

pub use caller::{Caller, Role};
pub use collaborators::{
    BlobOwner, BlobStore, ConfigStore, Embedder, EmbeddingCache, InMemoryBlobStore,
    InMemoryConfigStore, InMemoryEmbeddingCache, InMemoryInitStatusStore, InMemoryUsageStore,
    InitStatus, InitStatusStore, UsageStore,
};
pub use options::{strip_tags, OptionSchema, ParamType, RawOptions, RequestOptions};
pub use response::{PromptResponse, RequestResponse};
pub use usage::{Usage, UsageUnit};
