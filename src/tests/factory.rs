// Unit Tests for Connector Factory
//
// UNIT UNDER TEST: ConnectorFactory
//
// BUSINESS RESPONSIBILITY:
//   - Resolves the instance serving a purpose for a role
//   - Builds connectors once and reuses them while their configuration holds
//   - Refuses routes that cannot work (disabled, wrong connector, embeddings
//     routed to a vector store)
//
// TEST COVERAGE:
//   - Error precedence for missing assignment, missing instance, disabled instance
//   - Connector reuse, rebuild on configuration change and cache clearing
//   - Purpose descriptors combining purpose schema and connector choices

use crate::config::{InstanceConfig, ManagerSettings};
use crate::connectors::ConnectorKind;
use crate::core_types::collaborators::MockConfigStore;
use crate::core_types::{InMemoryConfigStore, InMemoryInitStatusStore, Role, UsageUnit};
use crate::error::ManagerError;
use crate::factory::ConnectorFactory;
use crate::purposes::PurposeKind;
use crate::tests::helpers::{dalle_instance, ollama_instance};
use std::sync::Arc;

fn factory_over(config: Arc<InMemoryConfigStore>) -> ConnectorFactory {
    ConnectorFactory::new(
        config,
        Arc::new(InMemoryInitStatusStore::new()),
        ManagerSettings::default(),
    )
}

fn qdrant_instance() -> InstanceConfig {
    InstanceConfig::new("qdrant-main", ConnectorKind::Qdrant, "text-embedding-small3", "http://qdrant:6333")
}

#[cfg(test)]
mod resolution_error_tests {
    use super::*;

    #[test]
    fn test_missing_assignment_is_not_configured() {
        // Arrange
        let mut config = MockConfigStore::new();
        config.expect_assignment().times(1).returning(|_, _| None);
        config.expect_instance().times(0);
        let factory = ConnectorFactory::new(
            Arc::new(config),
            Arc::new(InMemoryInitStatusStore::new()),
            ManagerSettings::default(),
        );

        // Act
        let result = factory.connector_for(PurposeKind::Chat, Role::Basic);

        // Assert
        match result {
            Err(ManagerError::NotConfigured { purpose, role }) => {
                assert_eq!(purpose, "chat");
                assert_eq!(role, "basic");
            }
            other => panic!("expected NotConfigured, got {other:?}"),
        }
    }

    #[test]
    fn test_assignment_to_unknown_instance_is_not_configured() {
        // Arrange
        let mut config = MockConfigStore::new();
        config
            .expect_assignment()
            .returning(|_, _| Some("deleted-instance".to_string()));
        config
            .expect_instance()
            .withf(|name| name == "deleted-instance")
            .returning(|_| None);
        let factory = ConnectorFactory::new(
            Arc::new(config),
            Arc::new(InMemoryInitStatusStore::new()),
            ManagerSettings::default(),
        );

        // Act
        let result = factory.connector_for(PurposeKind::Chat, Role::Basic);

        // Assert
        assert!(matches!(result, Err(ManagerError::NotConfigured { .. })));
    }

    #[test]
    fn test_disabled_instance_is_reported() {
        // Arrange
        let config = Arc::new(InMemoryConfigStore::new());
        config.add_instance(ollama_instance().disabled());
        config.assign(PurposeKind::Chat, Role::Basic, "ollama-main");
        let factory = factory_over(config);

        // Act
        let result = factory.connector_for(PurposeKind::Chat, Role::Basic);

        // Assert
        match result {
            Err(ManagerError::InstanceDisabled { instance }) => assert_eq!(instance, "ollama-main"),
            other => panic!("expected InstanceDisabled, got {other:?}"),
        }
    }

    #[test]
    fn test_embeddings_are_never_routed_to_vector_store() {
        // Arrange
        let config = Arc::new(InMemoryConfigStore::new());
        config.add_instance(qdrant_instance());
        config.assign(PurposeKind::Embedding, Role::Basic, "qdrant-main");
        let factory = factory_over(config);

        // Act
        let result = factory.connector_for(PurposeKind::Embedding, Role::Basic);

        // Assert
        assert!(matches!(result, Err(ManagerError::ConfigurationError { .. })));
    }

    #[test]
    fn test_connector_must_serve_the_purpose() {
        // Arrange
        let config = Arc::new(InMemoryConfigStore::new());
        config.add_instance(dalle_instance());
        config.assign(PurposeKind::Chat, Role::Basic, "dalle-main");
        let factory = factory_over(config);

        // Act
        let result = factory.connector_for(PurposeKind::Chat, Role::Basic);

        // Assert
        assert!(matches!(result, Err(ManagerError::ConfigurationError { .. })));
    }

    #[test]
    fn test_assignments_differ_per_role() {
        // Arrange
        let config = Arc::new(InMemoryConfigStore::new());
        config.add_instance(ollama_instance());
        config.assign(PurposeKind::Chat, Role::Extended, "ollama-main");
        let factory = factory_over(config);

        // Assert
        assert!(factory.connector_for(PurposeKind::Chat, Role::Extended).is_ok());
        assert!(factory.connector_for(PurposeKind::Chat, Role::Basic).is_err());
    }
}

#[cfg(test)]
mod caching_tests {
    use super::*;

    #[test]
    fn test_connector_is_reused_across_purposes_of_one_instance() {
        // Arrange
        let config = Arc::new(InMemoryConfigStore::new());
        config.add_instance(ollama_instance());
        config.assign(PurposeKind::Chat, Role::Basic, "ollama-main");
        config.assign(PurposeKind::Translate, Role::Basic, "ollama-main");
        let factory = factory_over(config);

        // Act
        let first = factory
            .connector_for(PurposeKind::Chat, Role::Basic)
            .expect("chat resolves");
        let second = factory
            .connector_for(PurposeKind::Translate, Role::Basic)
            .expect("translate resolves");

        // Assert
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_changed_configuration_rebuilds_connector() {
        // Arrange
        let config = Arc::new(InMemoryConfigStore::new());
        config.add_instance(ollama_instance());
        config.assign(PurposeKind::Chat, Role::Basic, "ollama-main");
        let factory = factory_over(Arc::clone(&config));
        let before = factory
            .connector_for(PurposeKind::Chat, Role::Basic)
            .expect("chat resolves");

        // Act
        let mut updated = ollama_instance();
        updated.model = "gemma3".to_string();
        config.add_instance(updated);
        let after = factory
            .connector_for(PurposeKind::Chat, Role::Basic)
            .expect("chat resolves");

        // Assert
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.instance().model, "gemma3");
    }

    #[test]
    fn test_clear_cache_forces_rebuild() {
        // Arrange
        let config = Arc::new(InMemoryConfigStore::new());
        config.add_instance(ollama_instance());
        config.assign(PurposeKind::Chat, Role::Basic, "ollama-main");
        let factory = factory_over(config);
        let before = factory
            .connector_for(PurposeKind::Chat, Role::Basic)
            .expect("chat resolves");

        // Act
        factory.clear_cache();
        let after = factory
            .connector_for(PurposeKind::Chat, Role::Basic)
            .expect("chat resolves");

        // Assert
        assert!(!Arc::ptr_eq(&before, &after));
    }
}

#[cfg(test)]
mod descriptor_tests {
    use super::*;

    #[test]
    fn test_image_generation_descriptor() {
        // Arrange
        let config = Arc::new(InMemoryConfigStore::new());
        config.add_instance(dalle_instance());
        config.assign(PurposeKind::ImgGen, Role::Basic, "dalle-main");
        let factory = factory_over(config);

        // Act
        let descriptor = factory
            .purpose_options(PurposeKind::ImgGen, Role::Basic)
            .expect("descriptor builds");

        // Assert
        assert_eq!(descriptor.name, PurposeKind::ImgGen);
        assert_eq!(descriptor.unit, UsageUnit::Count);
        assert!(descriptor.options.contains_key("sizes"));
        assert!(descriptor.options.contains_key("filename"));
        assert_eq!(descriptor.available_options["sizes"][0]["key"], "1024x1024");
        assert!(descriptor.allowed_mimetypes.is_empty());
    }

    #[test]
    fn test_image_to_text_descriptor_lists_image_types() {
        // Arrange
        let config = Arc::new(InMemoryConfigStore::new());
        let mut instance = ollama_instance();
        instance.model = "llava-llama3".to_string();
        config.add_instance(instance);
        config.assign(PurposeKind::Itt, Role::Basic, "ollama-main");
        let factory = factory_over(config);

        // Act
        let descriptor = factory
            .purpose_options(PurposeKind::Itt, Role::Basic)
            .expect("descriptor builds");

        // Assert
        assert!(descriptor.allowed_mimetypes.contains(&"image/png"));
        assert_eq!(descriptor.unit, UsageUnit::Count);
    }
}
