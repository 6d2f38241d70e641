//! The entity dependency graph.
//!
//! Entities declare which other entities must be processed before them. The
//! graph turns those edges into a deterministic total order per
//! [`Direction`]:
//!
//! - **Save**: dependencies first (Kahn's algorithm), ties broken
//!   lexicographically by entity name.
//! - **Restore**: the save order reversed, unless some descriptor declares
//!   explicit restore dependencies, in which case the restore edges are ordered
//!   the same way as save.
//!
//! Both orders are computed when the graph is built, so a cycle in either
//! direction is reported at startup as a [`DependencyCycleError`].

use std::collections::{BTreeMap, BTreeSet};

use crate::{DependencyCycleError, Direction, EntityDescriptor, EntityName, GraphError};

type Edges = BTreeMap<EntityName, BTreeSet<EntityName>>;

/// Validated dependency structure over all declared entities.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityGraph {
    dependencies: Edges,
    save_order: Vec<EntityName>,
    restore_order: Vec<EntityName>,
}

impl EntityGraph {
    /// Validates the descriptor set and computes both orders.
    pub fn from_descriptors(descriptors: &[EntityDescriptor]) -> Result<Self, GraphError> {
        let mut names = BTreeSet::new();
        for descriptor in descriptors {
            let name =
                EntityName::new(descriptor.name.as_str()).ok_or(GraphError::EmptyEntityName)?;
            if !names.insert(name) {
                return Err(GraphError::DuplicateEntity {
                    entity: descriptor.name.clone(),
                });
            }
        }

        let resolve = |entity: &str,
                       declared: &[String]|
         -> Result<BTreeSet<EntityName>, GraphError> {
            declared
                .iter()
                .map(|dep| {
                    names
                        .get(dep.as_str())
                        .cloned()
                        .ok_or_else(|| GraphError::UnknownDependency {
                            entity: entity.to_string(),
                            dependency: dep.clone(),
                        })
                })
                .collect()
        };

        let mut dependencies = Edges::new();
        let mut restore_edges = Edges::new();
        let mut has_restore_override = false;
        for descriptor in descriptors {
            let name =
                EntityName::new(descriptor.name.as_str()).ok_or(GraphError::EmptyEntityName)?;
            let save = resolve(&descriptor.name, &descriptor.dependencies)?;
            let restore = match &descriptor.restore_dependencies {
                Some(declared) => {
                    has_restore_override = true;
                    resolve(&descriptor.name, declared)?
                }
                None => save.clone(),
            };
            dependencies.insert(name.clone(), save);
            restore_edges.insert(name, restore);
        }

        let save_order = topological_order(&dependencies, Direction::Save)?;
        let restore_order = if has_restore_override {
            topological_order(&restore_edges, Direction::Restore)?
        } else {
            save_order.iter().rev().cloned().collect()
        };

        Ok(Self {
            dependencies,
            save_order,
            restore_order,
        })
    }

    /// The processing order for `direction`.
    pub fn order(&self, direction: Direction) -> &[EntityName] {
        match direction {
            Direction::Save => &self.save_order,
            Direction::Restore => &self.restore_order,
        }
    }

    /// Declared save-order dependencies of `entity`.
    pub fn dependencies_of(&self, entity: &str) -> Option<&BTreeSet<EntityName>> {
        self.dependencies.get(entity)
    }

    /// Returns `true` if `entity` was declared.
    pub fn contains(&self, entity: &str) -> bool {
        self.dependencies.contains_key(entity)
    }

    /// Number of declared entities.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Returns `true` if no entities were declared.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Computes the processing order of `descriptors` for `direction`.
pub fn build_order(
    descriptors: &[EntityDescriptor],
    direction: Direction,
) -> Result<Vec<EntityName>, GraphError> {
    EntityGraph::from_descriptors(descriptors).map(|graph| graph.order(direction).to_vec())
}

fn topological_order(
    edges: &Edges,
    direction: Direction,
) -> Result<Vec<EntityName>, DependencyCycleError> {
    let mut pending: BTreeMap<&EntityName, usize> =
        edges.iter().map(|(name, deps)| (name, deps.len())).collect();

    let mut dependents: BTreeMap<&EntityName, Vec<&EntityName>> = BTreeMap::new();
    for (name, deps) in edges {
        for dep in deps {
            dependents.entry(dep).or_default().push(name);
        }
    }

    let mut ready: BTreeSet<&EntityName> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(edges.len());
    while let Some(next) = ready.pop_first() {
        pending.remove(next);
        order.push(next.clone());
        for dependent in dependents.get(next).into_iter().flatten() {
            if let Some(count) = pending.get_mut(*dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if pending.is_empty() {
        return Ok(order);
    }

    let stuck: BTreeSet<&EntityName> = pending.into_keys().collect();
    Err(DependencyCycleError {
        members: find_cycle(edges, &stuck),
        direction,
    })
}

// Every stuck entity has at least one stuck dependency, so following the
// smallest stuck dependency from any stuck entity must revisit a node.
fn find_cycle(edges: &Edges, stuck: &BTreeSet<&EntityName>) -> Vec<EntityName> {
    let Some(mut current) = stuck.first().copied() else {
        return Vec::new();
    };
    let mut path: Vec<&EntityName> = Vec::new();

    loop {
        if let Some(start) = path.iter().position(|seen| *seen == current) {
            let mut cycle: Vec<EntityName> = path[start..].iter().map(|n| (*n).clone()).collect();
            if let Some(smallest) = cycle
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.cmp(b.1))
                .map(|(i, _)| i)
            {
                cycle.rotate_left(smallest);
            }
            return cycle;
        }
        path.push(current);

        let next = edges
            .get(current)
            .and_then(|deps| deps.iter().find(|dep| stuck.contains(dep)));
        match next {
            Some(dep) => current = dep,
            None => return path.into_iter().cloned().collect(),
        }
    }
}
