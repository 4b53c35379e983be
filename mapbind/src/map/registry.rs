//! Ordered child-entity collections owned by parent entities.

use crate::scheduler::EntityId;

/// Identity of a child entity inside its parent's registries.
pub(crate) trait Entity {
    fn entity_id(&self) -> EntityId;
}

/// Ordered collection of child entities.
///
/// The parent entity is the sole owner of its children's shared state;
/// children keep only weak back-references, so dropping the parent (and with
/// it the registry) never leaves cycles behind. Membership is at-most-once
/// by entity id, and removal by id preserves the relative order of the
/// remaining entries.
pub(crate) struct Registry<T: Entity> {
    items: Vec<T>,
}

impl<T: Entity> Default for Registry<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Entity> Registry<T> {
    /// Adds an entity to the end of the collection. Returns false if an
    /// entity with the same id is already registered.
    pub(crate) fn add(&mut self, item: T) -> bool {
        if self.contains(item.entity_id()) {
            return false;
        }

        self.items.push(item);
        true
    }

    /// Removes the entity with the given id, shifting the entities after it
    /// to the left.
    pub(crate) fn remove(&mut self, id: EntityId) -> Option<T> {
        let index = self.items.iter().position(|item| item.entity_id() == id)?;
        Some(self.items.remove(index))
    }

    pub(crate) fn contains(&self, id: EntityId) -> bool {
        self.items.iter().any(|item| item.entity_id() == id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagged(EntityId);

    impl Entity for Tagged {
        fn entity_id(&self) -> EntityId {
            self.0
        }
    }

    #[test]
    fn add_is_at_most_once() {
        let mut registry = Registry::default();
        assert!(registry.add(Tagged(1)));
        assert!(registry.add(Tagged(2)));
        assert!(!registry.add(Tagged(1)));
        assert_eq!(registry.iter().count(), 2);
    }

    #[test]
    fn remove_preserves_relative_order() {
        let mut registry = Registry::default();
        for id in 1..=4 {
            registry.add(Tagged(id));
        }

        assert!(registry.remove(2).is_some());
        assert!(registry.remove(2).is_none());

        let order: Vec<_> = registry.iter().map(|item| item.entity_id()).collect();
        assert_eq!(order, vec![1, 3, 4]);
    }

    #[test]
    fn clear_empties_the_registry() {
        let mut registry = Registry::default();
        registry.add(Tagged(7));
        registry.clear();
        assert_eq!(registry.iter().count(), 0);
        assert!(!registry.contains(7));
    }
}
