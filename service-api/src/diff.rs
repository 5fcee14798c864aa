//! Keyed set difference between a desired and an existing collection.

use std::collections::BTreeMap;

/// A pair of items, present on both sides, which are considered different.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update<T> {
    /// The existing item.
    pub from: T,
    /// The desired item.
    pub to: T,
}

/// The difference between a desired and an existing keyed collection.
///
/// The keys of `added`, `removed` and `updated` are pairwise disjoint. Keys present on both
/// sides, and considered equal, are not part of the diff at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diff<K, T> {
    /// Items only present in the desired collection.
    pub added: Vec<T>,
    /// Keys only present in the existing collection.
    pub removed: Vec<K>,
    /// Items present in both collections, which are not equal.
    pub updated: Vec<Update<T>>,
}

impl<K, T> Default for Diff<K, T> {
    fn default() -> Self {
        Self {
            added: vec![],
            removed: vec![],
            updated: vec![],
        }
    }
}

impl<K, T> Diff<K, T>
where
    K: Ord,
{
    /// Create a diff, treating every key present on both sides as changed.
    ///
    /// This is used for items which cannot be compared cheaply, and always need a blind update.
    pub fn create(desired: BTreeMap<K, T>, existing: BTreeMap<K, T>) -> Self {
        Self::compute(desired, existing, None)
    }

    /// Create a diff, using `equals(existing, desired)` to detect unchanged items.
    pub fn create_with<F>(desired: BTreeMap<K, T>, existing: BTreeMap<K, T>, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool,
    {
        Self::compute(desired, existing, Some(&equals))
    }

    fn compute(
        desired: BTreeMap<K, T>,
        mut existing: BTreeMap<K, T>,
        equals: Option<&dyn Fn(&T, &T) -> bool>,
    ) -> Self {
        let mut diff = Self::default();

        for (key, to) in desired {
            match existing.remove(&key) {
                None => diff.added.push(to),
                Some(from) => match equals {
                    Some(equals) if equals(&from, &to) => {}
                    _ => diff.updated.push(Update { from, to }),
                },
            }
        }

        // whatever is left, is no longer desired
        diff.removed.extend(existing.into_keys());

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    /// Only keep removals matching the predicate.
    pub fn retain_removed<F>(&mut self, f: F)
    where
        F: FnMut(&K) -> bool,
    {
        self.removed.retain(f);
    }

    /// Only keep updates matching the predicate.
    pub fn retain_updated<F>(&mut self, f: F)
    where
        F: FnMut(&Update<T>) -> bool,
    {
        self.updated.retain(f);
    }
}

/// Key a list of items, later items replace earlier ones with the same key.
pub fn keyed<K, T, I, F>(items: I, key: F) -> BTreeMap<K, T>
where
    K: Ord,
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> K,
{
    items.into_iter().map(|item| (key(&item), item)).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;
    use std::collections::BTreeSet;

    fn partition_keys(diff: &Diff<&str, (&str, u32)>) -> BTreeSet<String> {
        diff.added
            .iter()
            .map(|(k, _)| k.to_string())
            .chain(diff.removed.iter().map(|k| k.to_string()))
            .chain(diff.updated.iter().map(|u| u.to.0.to_string()))
            .collect()
    }

    #[test]
    fn test_empty() {
        let diff = Diff::<String, ()>::create(BTreeMap::new(), BTreeMap::new());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_partition() {
        let desired = btreemap! {
            "a" => ("a", 1),
            "b" => ("b", 2),
            "c" => ("c", 3),
        };
        let existing = btreemap! {
            "b" => ("b", 2),
            "c" => ("c", 4),
            "d" => ("d", 5),
        };

        let diff = Diff::create_with(desired, existing, |a, b| a == b);

        assert_eq!(diff.added, vec![("a", 1)]);
        assert_eq!(diff.removed, vec!["d"]);
        assert_eq!(
            diff.updated,
            vec![Update {
                from: ("c", 4),
                to: ("c", 3)
            }]
        );

        // "b" is equal, and so part of neither
        let keys = partition_keys(&diff);
        assert!(!keys.contains("b"));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_blind_update() {
        let desired = btreemap! { "a" => ("a", 1) };
        let existing = btreemap! { "a" => ("a", 1) };

        let diff = Diff::create(desired, existing);

        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.updated.len(), 1);
    }

    #[test]
    fn test_custom_equality_short_circuit() {
        let desired = btreemap! { "a" => ("a", 1), "b" => ("b", 1) };
        let existing = btreemap! { "a" => ("a", 2), "b" => ("b", 2) };

        // only compare the names
        let diff = Diff::create_with(desired, existing, |a, b| a.0 == b.0);

        assert!(diff.is_empty());
    }

    #[test]
    fn test_completeness() {
        // a few combinations of overlapping key ranges
        for (d, e) in [(0..5, 3..9), (0..0, 0..4), (2..6, 0..0), (0..4, 0..4)] {
            let desired: BTreeMap<u32, u32> = d.clone().map(|k| (k, k)).collect();
            let existing: BTreeMap<u32, u32> = e.clone().map(|k| (k, k * 10)).collect();

            let diff = Diff::create_with(desired.clone(), existing.clone(), |a, b| a == b);

            let added: BTreeSet<_> = diff.added.iter().copied().collect();
            let removed: BTreeSet<_> = diff.removed.iter().copied().collect();
            let updated: BTreeSet<_> = diff.updated.iter().map(|u| u.to).collect();

            assert!(added.is_disjoint(&removed));
            assert!(added.is_disjoint(&updated));
            assert!(removed.is_disjoint(&updated));

            let all: BTreeSet<_> = desired.keys().chain(existing.keys()).copied().collect();
            let union: BTreeSet<_> = added.union(&removed).chain(updated.iter()).copied().collect();
            // zero is the only key which compares equal on both sides
            let expected: BTreeSet<_> = all
                .into_iter()
                .filter(|k| !(desired.contains_key(k) && existing.get(k) == Some(k)))
                .collect();
            assert_eq!(union, expected);

            for k in &added {
                assert!(desired.contains_key(k) && !existing.contains_key(k));
            }
            for k in &removed {
                assert!(existing.contains_key(k) && !desired.contains_key(k));
            }
        }
    }

    #[test]
    fn test_retain() {
        let desired = btreemap! { "a" => ("a", 1) };
        let existing = btreemap! { "a" => ("a", 2), "x" => ("x", 1), "y" => ("y", 1) };

        let mut diff = Diff::create(desired, existing);
        diff.retain_removed(|k| *k != "x");
        diff.retain_updated(|u| u.from.1 != 2);

        assert_eq!(diff.removed, vec!["y"]);
        assert!(diff.updated.is_empty());
    }

    #[test]
    fn test_keyed() {
        let items = keyed(vec![("a", 1), ("b", 2), ("a", 3)], |i| i.0);
        assert_eq!(items, btreemap! { "a" => ("a", 3), "b" => ("b", 2) });
    }
}
