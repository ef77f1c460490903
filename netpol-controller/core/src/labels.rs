use crate::Error;
use netpol_controller_k8s_api::labels::Map;
use std::collections::{btree_map, BTreeMap, BTreeSet};

/// Maps a label key to every value that is acceptable for it.
///
/// Several sources may contribute values for the same key (e.g. two referenced services that
/// both select on `app`), so each key holds a set rather than a single value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelMultimap(BTreeMap<String, BTreeSet<String>>);

/// Merges label multimaps key-wise, unioning the values of shared keys.
///
/// Fails with [`Error::EmptyInput`] when no multimaps are supplied.
pub fn merge(maps: impl IntoIterator<Item = LabelMultimap>) -> Result<LabelMultimap, Error> {
    let mut maps = maps.into_iter();
    let mut merged = maps.next().ok_or(Error::EmptyInput)?;
    for map in maps {
        merged.extend(map);
    }
    Ok(merged)
}

// === impl LabelMultimap ===

impl LabelMultimap {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().insert(value.into());
    }

    /// Adds every value of `other` to this multimap.
    pub fn extend(&mut self, other: LabelMultimap) {
        for (key, values) in other.0 {
            self.0.entry(key).or_default().extend(values);
        }
    }

    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.0.get(key)
    }

    /// Returns true if `key` is present and accepts `value`.
    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.0.get(key).is_some_and(|values| values.contains(value))
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, BTreeSet<String>> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Lifts an exact-match label set into a multimap of singleton value sets.
impl From<&Map> for LabelMultimap {
    fn from(labels: &Map) -> Self {
        labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelMultimap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'a> IntoIterator for &'a LabelMultimap {
    type Item = (&'a String, &'a BTreeSet<String>);
    type IntoIter = btree_map::Iter<'a, String, BTreeSet<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
