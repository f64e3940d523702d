//! Named tensor collections.

use super::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from parameter name to tensor value.
///
/// Keys are kept in lexicographic order so serialized records and load
/// reports are deterministic.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StateDict {
    tensors: BTreeMap<String, Tensor>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tensor, returning the previous value under that name.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        self.tensors.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Tensor> {
        self.tensors.remove(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.tensors.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.tensors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Tensor)> {
        self.tensors.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Names of all entries whose key contains `pattern`.
    pub fn keys_containing(&self, pattern: &str) -> Vec<String> {
        self.tensors
            .keys()
            .filter(|k| k.contains(pattern))
            .cloned()
            .collect()
    }

    /// Remove every entry whose key contains `pattern`, returning the removed names.
    pub fn remove_containing(&mut self, pattern: &str) -> Vec<String> {
        let keys = self.keys_containing(pattern);
        for key in &keys {
            self.tensors.remove(key);
        }
        keys
    }

    /// Total number of scalar elements across all tensors.
    pub fn num_elements(&self) -> usize {
        self.tensors.values().map(|t| t.len()).sum()
    }
}

impl FromIterator<(String, Tensor)> for StateDict {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for StateDict {
    type Item = (String, Tensor);
    type IntoIter = std::collections::btree_map::IntoIter<String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.into_iter()
    }
}
