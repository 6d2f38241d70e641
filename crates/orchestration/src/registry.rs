//! The operation registry.
//!
//! The registry is built once at process start from the full, closed set of
//! [`EntityDescriptor`]s and is immutable afterwards. It is constructed
//! explicitly and handed to the invoker and orchestrator behind an `Arc`;
//! there is no global instance.
//!
//! Building validates everything that can be validated without calling the
//! remote side: entity names and dependencies (see [`crate::graph`]), every
//! operation declaration (see [`crate::spec`]), and cross-entity operation name
//! collisions. The first problem aborts the build; a partially valid registry
//! is never returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    BoundaryClient, CallArgs, ConverterCatalog, EntityDescriptor, EntityGraph, EntityName,
    OperationDecl, OperationName, OperationSpec, RegistryError, UnknownOperationError,
};

/// Immutable operation name → [`OperationSpec`] mapping plus the validated
/// entity graph.
#[derive(Debug, Clone)]
pub struct Registry {
    operations: BTreeMap<OperationName, Arc<OperationSpec>>,
    entities: BTreeMap<EntityName, Vec<OperationName>>,
    graph: EntityGraph,
}

impl Registry {
    /// Validates `descriptors` against the boundary client's capabilities and
    /// the converter catalog, and builds the registry.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Graph`] for empty/duplicate entity names, unknown
    ///   dependencies and dependency cycles.
    /// - [`RegistryError::SpecValidation`] for the first invalid operation
    ///   declaration.
    /// - [`RegistryError::DuplicateOperation`] when two entities declare the
    ///   same operation name with different declarations.
    pub fn build(
        descriptors: &[EntityDescriptor],
        boundary: &dyn BoundaryClient,
        catalog: &ConverterCatalog,
    ) -> Result<Self, RegistryError> {
        let graph = EntityGraph::from_descriptors(descriptors)?;

        let mut operations: BTreeMap<OperationName, Arc<OperationSpec>> = BTreeMap::new();
        let mut declared_by: BTreeMap<String, (&str, &OperationDecl)> = BTreeMap::new();
        let mut entities: BTreeMap<EntityName, Vec<OperationName>> = BTreeMap::new();

        for descriptor in descriptors {
            // The graph has already rejected empty names.
            let Some(entity) = EntityName::new(descriptor.name.as_str()) else {
                continue;
            };
            let mut names = Vec::with_capacity(descriptor.operations.len());

            for (name, decl) in &descriptor.operations {
                let spec = OperationSpec::validate(&entity, name, decl, boundary, catalog)?;

                if let Some((first_entity, first_decl)) = declared_by.get(name.as_str()) {
                    if *first_decl != decl {
                        return Err(RegistryError::DuplicateOperation {
                            operation: name.clone(),
                            first_entity: (*first_entity).to_string(),
                            second_entity: descriptor.name.clone(),
                        });
                    }
                    debug!(
                        operation = %name,
                        first_entity = %first_entity,
                        second_entity = %descriptor.name,
                        "identical operation declared by two entities"
                    );
                } else {
                    declared_by.insert(name.clone(), (descriptor.name.as_str(), decl));
                    operations.insert(spec.name().clone(), Arc::new(spec.clone()));
                }
                names.push(spec.name().clone());
            }

            entities.insert(entity, names);
        }

        info!(
            entities = entities.len(),
            operations = operations.len(),
            "operation registry built"
        );

        Ok(Self {
            operations,
            entities,
            graph,
        })
    }

    /// Looks up the validated `OperationSpec` for `operation`.
    pub fn resolve(&self, operation: &str) -> Result<&Arc<OperationSpec>, UnknownOperationError> {
        self.operations
            .get(operation)
            .ok_or_else(|| UnknownOperationError {
                operation: operation.to_string(),
            })
    }

    /// Whether `operation` is a write (and therefore never cached).
    pub fn is_write_operation(&self, operation: &str) -> Result<bool, UnknownOperationError> {
        self.resolve(operation).map(|spec| spec.is_write_operation())
    }

    /// The cache key a read of `operation` with `args` is stored under.
    pub fn cache_key_for(
        &self,
        operation: &str,
        args: &CallArgs,
    ) -> Result<String, UnknownOperationError> {
        self.resolve(operation).map(|spec| spec.cache_key(args))
    }

    /// Every registered operation, in name order.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<OperationSpec>> {
        self.operations.values()
    }

    /// Declared entity names, in name order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityName> {
        self.entities.keys()
    }

    /// Operations declared by `entity`.
    pub fn operations_of(&self, entity: &str) -> Option<&[OperationName]> {
        self.entities.get(entity).map(Vec::as_slice)
    }

    /// The validated dependency graph.
    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }
}
