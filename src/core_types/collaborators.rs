//! Interfaces to the collaborators the manager depends on, with in-memory
//! implementations.
//!
//! Assignment configuration, quota accounting, file storage and backend
//! status flags live outside this crate. The manager only talks to them
//! through these traits, with the caller passed explicitly.

use crate::config::InstanceConfig;
use crate::core_types::caller::Role;
use crate::core_types::usage::Usage;
use crate::error::{ManagerError, ManagerResult};
use crate::purposes::PurposeKind;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Assignment and limit configuration.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore: Send + Sync {
    /// Name of the instance serving `purpose` for `role`, if any.
    fn assignment(&self, purpose: PurposeKind, role: Role) -> Option<String>;

    /// Configuration of a named instance.
    fn instance(&self, name: &str) -> Option<InstanceConfig>;

    /// Maximum number of requests for `purpose` and `role`. `0` means the
    /// purpose is not available to the role.
    fn max_requests(&self, purpose: PurposeKind, role: Role) -> u64;

    fn is_tenant_enabled(&self, tenant: &str) -> bool;
}

/// Per-user quota accounting.
#[cfg_attr(test, mockall::automock)]
pub trait UsageStore: Send + Sync {
    /// Number of requests the user has made for `purpose` in the current period.
    fn current_usage(&self, user_id: i64, purpose: PurposeKind) -> u64;

    /// Account one completed request.
    fn record_usage(&self, user_id: i64, purpose: PurposeKind, usage: &Usage);
}

/// Where a stored file belongs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobOwner {
    pub user_id: i64,
    pub context_id: i64,
    pub item_id: i64,
}

/// Persistence for binary provider output (images, synthesized audio).
#[cfg_attr(test, mockall::automock)]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` and return a reference URL the caller can retrieve.
    fn store_blob(&self, owner: &BlobOwner, bytes: &[u8], filename: &str) -> ManagerResult<String>;
}

/// Persistent initialisation status of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    Ok,
    /// Backend setup failed with the given code; requests must fail fast until
    /// an operator clears the flag.
    Failed(u32),
}

impl InitStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, InitStatus::Ok)
    }
}

/// Storage for the backend initialisation flag.
#[cfg_attr(test, mockall::automock)]
pub trait InitStatusStore: Send + Sync {
    fn status(&self, connector: &str) -> InitStatus;
    fn set_status(&self, connector: &str, status: InitStatus);
}

/// Advisory cache of embedding vectors. A miss recomputes.
pub trait EmbeddingCache: Send + Sync {
    fn get(&self, text: &str) -> Option<Vec<f32>>;
    fn put(&self, text: &str, vector: Vec<f32>);
}

/// Turns text into an embedding vector by re-entering the request pipeline.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> ManagerResult<Vec<f32>>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configuration held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    instances: RwLock<HashMap<String, InstanceConfig>>,
    assignments: RwLock<HashMap<(PurposeKind, Role), String>>,
    max_requests: RwLock<HashMap<(PurposeKind, Role), u64>>,
    disabled_tenants: RwLock<Vec<String>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instance(&self, instance: InstanceConfig) {
        write(&self.instances).insert(instance.name.clone(), instance);
    }

    pub fn assign(&self, purpose: PurposeKind, role: Role, instance_name: impl Into<String>) {
        write(&self.assignments).insert((purpose, role), instance_name.into());
    }

    pub fn set_max_requests(&self, purpose: PurposeKind, role: Role, limit: u64) {
        write(&self.max_requests).insert((purpose, role), limit);
    }

    pub fn set_tenant_enabled(&self, tenant: &str, enabled: bool) {
        let mut disabled = write(&self.disabled_tenants);
        disabled.retain(|t| t != tenant);
        if !enabled {
            disabled.push(tenant.to_string());
        }
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn assignment(&self, purpose: PurposeKind, role: Role) -> Option<String> {
        read(&self.assignments).get(&(purpose, role)).cloned()
    }

    fn instance(&self, name: &str) -> Option<InstanceConfig> {
        read(&self.instances).get(name).cloned()
    }

    fn max_requests(&self, purpose: PurposeKind, role: Role) -> u64 {
        read(&self.max_requests)
            .get(&(purpose, role))
            .copied()
            .unwrap_or(0)
    }

    fn is_tenant_enabled(&self, tenant: &str) -> bool {
        !read(&self.disabled_tenants).iter().any(|t| t == tenant)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct UsageRecord {
    requests: u64,
    tokens: f64,
}

/// Request counters held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    records: RwLock<HashMap<(i64, PurposeKind), UsageRecord>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current_usage(&self, user_id: i64, purpose: PurposeKind, requests: u64) {
        write(&self.records)
            .entry((user_id, purpose))
            .or_default()
            .requests = requests;
    }

    /// Sum of all `Usage::total` values recorded for the user and purpose.
    pub fn consumed_units(&self, user_id: i64, purpose: PurposeKind) -> f64 {
        read(&self.records)
            .get(&(user_id, purpose))
            .map(|r| r.tokens)
            .unwrap_or(0.0)
    }
}

impl UsageStore for InMemoryUsageStore {
    fn current_usage(&self, user_id: i64, purpose: PurposeKind) -> u64 {
        read(&self.records)
            .get(&(user_id, purpose))
            .map(|r| r.requests)
            .unwrap_or(0)
    }

    fn record_usage(&self, user_id: i64, purpose: PurposeKind, usage: &Usage) {
        let mut records = write(&self.records);
        let record = records.entry((user_id, purpose)).or_default();
        record.requests += 1;
        record.tokens += usage.total;
    }
}

/// Blob storage in process memory, handing out `draftfile` style URLs.
#[derive(Debug)]
pub struct InMemoryBlobStore {
    base_url: String,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://draftfile")
    }
}

impl InMemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        read(&self.blobs).get(url).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.blobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn store_blob(&self, owner: &BlobOwner, bytes: &[u8], filename: &str) -> ManagerResult<String> {
        if filename.is_empty() || filename.contains('/') {
            return Err(ManagerError::invalid_parameter(
                "filename",
                "a plain, non-empty file name is required",
            ));
        }
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.base_url, owner.user_id, owner.context_id, owner.item_id, filename
        );
        write(&self.blobs).insert(url.clone(), bytes.to_vec());
        Ok(url)
    }
}

/// Backend status flags held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryInitStatusStore {
    statuses: RwLock<HashMap<String, InitStatus>>,
}

impl InMemoryInitStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operator intervention: forget a recorded failure.
    pub fn clear(&self, connector: &str) {
        write(&self.statuses).remove(connector);
    }
}

impl InitStatusStore for InMemoryInitStatusStore {
    fn status(&self, connector: &str) -> InitStatus {
        read(&self.statuses)
            .get(connector)
            .copied()
            .unwrap_or(InitStatus::Ok)
    }

    fn set_status(&self, connector: &str, status: InitStatus) {
        write(&self.statuses).insert(connector.to_string(), status);
    }
}

/// Embedding cache in process memory.
#[derive(Debug, Default)]
pub struct InMemoryEmbeddingCache {
    vectors: RwLock<HashMap<String, Vec<f32>>>,
}

impl InMemoryEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmbeddingCache for InMemoryEmbeddingCache {
    fn get(&self, text: &str) -> Option<Vec<f32>> {
        read(&self.vectors).get(text).cloned()
    }

    fn put(&self, text: &str, vector: Vec<f32>) {
        write(&self.vectors).insert(text.to_string(), vector);
    }
}
