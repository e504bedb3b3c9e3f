//! Connector factory and dispatch
//!
//! Resolves which configured instance serves a (purpose, role) pair and
//! returns the purpose strategy together with a connector bound to that
//! instance. Connectors are cached per instance name so process-local state
//! (access tokens, vector backend setup) survives across requests.

use crate::config::ManagerSettings;
use crate::connectors::Connector;
use crate::core_types::{ConfigStore, InitStatusStore, OptionSchema, Role, UsageUnit};
use crate::error::{ManagerError, ManagerResult};
use crate::logging::{log_debug, log_info};
use crate::purposes::{Purpose, PurposeKind};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Static description of a purpose, for callers building option forms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurposeDescriptor {
    pub name: PurposeKind,
    pub options: OptionSchema,
    pub unit: UsageUnit,
    /// Instance-specific choices offered by the assigned connector.
    pub available_options: serde_json::Value,
    pub allowed_mimetypes: Vec<&'static str>,
}

pub struct ConnectorFactory {
    config: Arc<dyn ConfigStore>,
    init_status: Arc<dyn InitStatusStore>,
    settings: ManagerSettings,
    connectors: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl fmt::Debug for ConnectorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self
            .connectors
            .read()
            .map(|c| c.len())
            .unwrap_or_default();
        f.debug_struct("ConnectorFactory")
            .field("settings", &self.settings)
            .field("cached_connectors", &cached)
            .finish_non_exhaustive()
    }
}

impl ConnectorFactory {
    pub fn new(
        config: Arc<dyn ConfigStore>,
        init_status: Arc<dyn InitStatusStore>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            config,
            init_status,
            settings,
            connectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Purpose strategy and connector serving `purpose` for `role`.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::NotConfigured`] if no instance is assigned or the
    ///   assigned instance does not exist
    /// - [`ManagerError::InstanceDisabled`] if the assigned instance is disabled
    /// - [`ManagerError::ConfigurationError`] if the instance is invalid, its
    ///   connector does not serve the purpose, or embeddings would be routed
    ///   to a vector store
    pub fn resolve(
        &self,
        purpose: PurposeKind,
        role: Role,
    ) -> ManagerResult<(Box<dyn Purpose>, Arc<dyn Connector>)> {
        let connector = self.connector_for(purpose, role)?;
        let strategy = purpose.create(&self.settings)?;
        Ok((strategy, connector))
    }

    /// Connector assigned to `purpose` for `role`, built on first use.
    pub fn connector_for(&self, purpose: PurposeKind, role: Role) -> ManagerResult<Arc<dyn Connector>> {
        let name = self
            .config
            .assignment(purpose, role)
            .ok_or_else(|| ManagerError::not_configured(purpose.as_str(), role.as_str()))?;
        let instance = self
            .config
            .instance(&name)
            .ok_or_else(|| ManagerError::not_configured(purpose.as_str(), role.as_str()))?;
        if !instance.enabled {
            return Err(ManagerError::instance_disabled(instance.name));
        }
        if purpose == PurposeKind::Embedding && instance.connector.is_vector_store() {
            return Err(ManagerError::configuration_error(format!(
                "Instance '{}' is a vector store and cannot serve embeddings",
                instance.name
            )));
        }

        let cached = read(&self.connectors).get(&name).cloned();
        let connector = match cached {
            // Rebuild when the stored configuration changed since caching
            Some(connector) if *connector.instance() == instance => connector,
            _ => {
                let connector = instance.connector.create(
                    instance.clone(),
                    &self.settings,
                    Arc::clone(&self.init_status),
                )?;
                log_info!(
                    instance = %instance.name,
                    connector = %instance.connector,
                    model = %instance.model,
                    "Connector created"
                );
                write(&self.connectors).insert(name, Arc::clone(&connector));
                connector
            }
        };

        if !connector.supports_purpose(purpose) {
            return Err(ManagerError::configuration_error(format!(
                "Connector '{}' does not serve purpose '{}'",
                connector.kind(),
                purpose
            )));
        }
        log_debug!(
            purpose = %purpose,
            role = %role,
            instance = %instance.name,
            connector = %connector.kind(),
            "Purpose resolved"
        );
        Ok(connector)
    }

    /// Options a caller may send for `purpose`, with the choices offered by
    /// the connector assigned to `role`.
    pub fn purpose_options(&self, purpose: PurposeKind, role: Role) -> ManagerResult<PurposeDescriptor> {
        let (strategy, connector) = self.resolve(purpose, role)?;
        Ok(PurposeDescriptor {
            name: purpose,
            options: strategy.declare_options(),
            unit: strategy.unit(),
            available_options: connector.available_options(),
            allowed_mimetypes: connector.allowed_mimetypes(),
        })
    }

    /// Drop cached connectors, e.g. after configuration changes.
    pub fn clear_cache(&self) {
        write(&self.connectors).clear();
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
