//! Migration registry: static discovery and total ordering.

use std::collections::HashSet;

use crate::{MigrateError, Migration};

/// Holds every migration known at process start, in application order.
///
/// Loading is static; there is no dynamic discovery mid-run.
pub struct Registry {
    migrations: Vec<Box<dyn Migration>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field(
                "migrations",
                &self.migrations.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Registry {
    /// Build a registry, ordering records ascending by `(sequence_key,
    /// name)` and rejecting duplicate names.
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Result<Self, MigrateError> {
        let mut seen = HashSet::new();
        for migration in &migrations {
            if !seen.insert(migration.name()) {
                return Err(MigrateError::DuplicateName(migration.name().to_string()));
            }
        }
        migrations.sort_by(|a, b| {
            a.sequence_key()
                .cmp(b.sequence_key())
                .then_with(|| a.name().cmp(b.name()))
        });
        Ok(Self { migrations })
    }

    /// All migrations in application order, ignored ones included.
    pub fn list(&self) -> impl Iterator<Item = &dyn Migration> {
        self.migrations.iter().map(|m| m.as_ref())
    }

    /// Find a migration by name; ignored migrations remain addressable.
    pub fn find(&self, name: &str) -> Result<&dyn Migration, MigrateError> {
        self.migrations
            .iter()
            .map(|m| m.as_ref())
            .find(|m| m.name() == name)
            .ok_or_else(|| MigrateError::Unknown(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use drover_store::DocumentStore;
    use proptest::prelude::*;

    struct Noop {
        name: &'static str,
        sequence_key: &'static str,
    }

    #[async_trait]
    impl Migration for Noop {
        fn name(&self) -> &'static str {
            self.name
        }
        fn sequence_key(&self) -> &'static str {
            self.sequence_key
        }
        fn description(&self) -> &'static str {
            "noop"
        }
        async fn up(&self, _store: &dyn DocumentStore) -> Result<(), MigrateError> {
            Ok(())
        }
    }

    fn noop(name: &'static str, sequence_key: &'static str) -> Box<dyn Migration> {
        Box::new(Noop { name, sequence_key })
    }

    #[test]
    fn list_is_ordered_by_sequence_key() {
        let registry = Registry::new(vec![
            noop("c", "3"),
            noop("a", "1"),
            noop("b", "2"),
        ])
        .unwrap();
        let names: Vec<&str> = registry.list().map(|m| m.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn sequence_key_ties_fall_back_to_name() {
        let registry = Registry::new(vec![noop("beta", "1"), noop("alpha", "1")]).unwrap();
        let names: Vec<&str> = registry.list().map(|m| m.name()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Registry::new(vec![noop("same", "1"), noop("same", "2")]).unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateName(name) if name == "same"));
    }

    #[test]
    fn find_unknown_name_fails() {
        let registry = Registry::new(vec![noop("a", "1")]).unwrap();
        assert!(matches!(
            registry.find("missing"),
            Err(MigrateError::Unknown(_))
        ));
    }

    // Registration order never affects application order.
    proptest! {
        #[test]
        fn ordering_is_independent_of_registration(
            order in Just(vec![("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]).prop_shuffle()
        ) {
            let migrations = order
                .into_iter()
                .map(|(name, key)| noop(name, key))
                .collect();
            let registry = Registry::new(migrations).unwrap();
            let names: Vec<&str> = registry.list().map(|m| m.name()).collect();
            prop_assert_eq!(names, vec!["a", "b", "c", "d"]);
        }
    }
}
