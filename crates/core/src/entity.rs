//! Entities: records with a stable identity that outlives state changes.

use std::collections::BTreeMap;

/// A record addressed by its identifier (customers, invoices, payments, ...).
pub trait Entity {
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}

/// Key a collection of entities by identifier. Later duplicates win.
pub fn index_by_id<E, I>(entities: I) -> BTreeMap<E::Id, E>
where
    E: Entity,
    I: IntoIterator<Item = E>,
{
    entities.into_iter().map(|e| (*e.id(), e)).collect()
}
