//! Storage for one partition's share of the solution set.

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::core::{DataType, VertexKey};

/// The authoritative state of the vertices owned by one partition.
///
/// The managed form is a dense key-sorted vector looked up by binary
/// search; it is the compact default. The unmanaged form trades memory for
/// hash lookups. Both hold exactly one entry per vertex id; building from
/// input with duplicate ids keeps the last entry.
pub(crate) enum SolutionSet<K, V> {
    Managed(Vec<(K, V)>),
    Unmanaged(FxHashMap<K, V>),
}

impl<K: VertexKey, V: DataType> SolutionSet<K, V> {
    pub(crate) fn build(vertices: Vec<(K, V)>, unmanaged: bool) -> Self {
        if unmanaged {
            SolutionSet::Unmanaged(vertices.into_iter().collect())
        } else {
            // reversed so that unique_by keeps the last entry per vertex id
            let entries = vertices
                .into_iter()
                .rev()
                .unique_by(|(key, _)| key.clone())
                .sorted_by(|a, b| a.0.cmp(&b.0))
                .collect();
            SolutionSet::Managed(entries)
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        match self {
            SolutionSet::Managed(entries) => entries
                .binary_search_by(|(k, _)| k.cmp(key))
                .ok()
                .map(|idx| &entries[idx].1),
            SolutionSet::Unmanaged(entries) => entries.get(key),
        }
    }

    /// Replaces the state of an existing vertex; the key set never grows
    /// after `build`.
    pub(crate) fn replace(&mut self, key: &K, value: V) {
        match self {
            SolutionSet::Managed(entries) => {
                if let Ok(idx) = entries.binary_search_by(|(k, _)| k.cmp(key)) {
                    entries[idx].1 = value;
                }
            }
            SolutionSet::Unmanaged(entries) => {
                if let Some(slot) = entries.get_mut(key) {
                    *slot = value;
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            SolutionSet::Managed(entries) => entries.len(),
            SolutionSet::Unmanaged(entries) => entries.len(),
        }
    }

    pub(crate) fn into_vec(self) -> Vec<(K, V)> {
        match self {
            SolutionSet::Managed(entries) => entries,
            SolutionSet::Unmanaged(entries) => entries.into_iter().collect(),
        }
    }
}
