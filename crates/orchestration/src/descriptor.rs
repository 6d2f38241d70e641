//! Entity declarations.

use std::collections::BTreeMap;

use crate::OperationDecl;

/// Everything an entity kind declares about itself: its name, which entities
/// must be processed before it, and its remote operations.
///
/// Descriptors are plain data. They are validated as a set when the
/// [`crate::Registry`] is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Unique entity name.
    pub name: String,
    /// Entities that must be fully processed first.
    pub dependencies: Vec<String>,
    /// Explicit restore-order dependencies.
    ///
    /// When any descriptor in the set declares this, restore order is computed
    /// from these edges (falling back to `dependencies` for descriptors that
    /// do not) instead of reversing the save order.
    pub restore_dependencies: Option<Vec<String>>,
    /// Operation name → raw declaration.
    pub operations: BTreeMap<String, OperationDecl>,
}

impl EntityDescriptor {
    /// Starts a descriptor for `name` with no dependencies or operations.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declares the save-order dependencies.
    #[must_use]
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = names.into_iter().map(Into::into).collect();
        self
    }

    /// Declares explicit restore-order dependencies.
    #[must_use]
    pub fn restore_after<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restore_dependencies = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Adds an operation declaration.
    #[must_use]
    pub fn operation(mut self, name: impl Into<String>, decl: OperationDecl) -> Self {
        self.operations.insert(name.into(), decl);
        self
    }
}
