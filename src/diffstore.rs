//! Generic keyed diff store: tracks the last successfully applied value and
//! the value desired this cycle, and emits a minimal create/update/delete
//! plan. Reconciler-private — nothing outside the reconciler touches a
//! `DiffStore`.

use std::collections::HashMap;
use std::hash::Hash;

struct Entry<V> {
    last_applied: Option<V>,
    desired: Option<V>,
    touched_this_cycle: bool,
}

impl<V> Default for Entry<V> {
    fn default() -> Self {
        Self {
            last_applied: None,
            desired: None,
            touched_this_cycle: false,
        }
    }
}

/// `eq` decides whether a `desired` value differs meaningfully from the
/// `last_applied` one — e.g. [`crate::hcn::LoadBalancer::equal`], which
/// ignores endpoint ordering.
pub struct DiffStore<K, V> {
    entries: HashMap<K, Entry<V>>,
    eq: Box<dyn Fn(&V, &V) -> bool + Send + Sync>,
}

impl<K, V> DiffStore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(eq: impl Fn(&V, &V) -> bool + Send + Sync + 'static) -> Self {
        Self {
            entries: HashMap::new(),
            eq: Box::new(eq),
        }
    }

    /// Resets `desired`/`touched_this_cycle` on every entry. `last_applied`
    /// survives so a failed apply is retried next cycle.
    pub fn begin_cycle(&mut self) {
        for entry in self.entries.values_mut() {
            entry.desired = None;
            entry.touched_this_cycle = false;
        }
    }

    /// Records the desired value for `key` this cycle.
    pub fn set(&mut self, key: K, value: V) {
        let entry = self.entries.entry(key).or_default();
        entry.desired = Some(value);
        entry.touched_this_cycle = true;
    }

    /// Drops entries that carry no state at all (never applied, not
    /// desired this cycle). Purely a housekeeping pass; `created`/
    /// `updated`/`deleted` are correct without calling this.
    pub fn end_cycle(&mut self) {
        self.entries
            .retain(|_, entry| entry.last_applied.is_some() || entry.desired.is_some());
    }

    /// Seeds `last_applied` for a key already known to the kernel but not
    /// yet tracked here — how the reconciler recovers across restarts, via
    /// `refresh_kernel_observations`.
    pub fn seed_last_applied(&mut self, key: K, value: V) {
        let entry = self.entries.entry(key).or_default();
        if entry.last_applied.is_none() {
            entry.last_applied = Some(value);
        }
    }

    #[must_use]
    pub fn created(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, e)| e.touched_this_cycle && e.last_applied.is_none())
            .map(|(k, _)| k.clone())
            .collect()
    }

    #[must_use]
    pub fn updated(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, e)| match (&e.last_applied, &e.desired) {
                (Some(applied), Some(desired)) => e.touched_this_cycle && !(self.eq)(applied, desired),
                _ => false,
            })
            .map(|(k, _)| k.clone())
            .collect()
    }

    #[must_use]
    pub fn deleted(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.touched_this_cycle && e.last_applied.is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    #[must_use]
    pub fn desired(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|e| e.desired.as_ref())
    }

    #[must_use]
    pub fn last_applied(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|e| e.last_applied.as_ref())
    }

    /// Called after a successful kernel operation on `key`: a create or
    /// update commits `desired` as the new `last_applied`; a delete (no
    /// `desired` this cycle) drops the entry.
    pub fn commit(&mut self, key: &K)
    where
        V: Clone,
    {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        match entry.desired.clone() {
            Some(desired) => entry.last_applied = Some(desired),
            None => {
                self.entries.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DiffStore<&'static str, i32> {
        DiffStore::new(|a, b| a == b)
    }

    #[test]
    fn fresh_key_is_created() {
        let mut s = store();
        s.begin_cycle();
        s.set("a", 1);
        s.end_cycle();
        assert_eq!(s.created(), vec!["a"]);
        assert!(s.updated().is_empty());
        assert!(s.deleted().is_empty());
    }

    #[test]
    fn unchanged_value_is_neither_created_nor_updated_after_commit() {
        let mut s = store();
        s.begin_cycle();
        s.set("a", 1);
        s.end_cycle();
        s.commit(&"a");

        s.begin_cycle();
        s.set("a", 1);
        s.end_cycle();
        assert!(s.created().is_empty());
        assert!(s.updated().is_empty());
    }

    #[test]
    fn changed_value_is_updated_after_commit() {
        let mut s = store();
        s.begin_cycle();
        s.set("a", 1);
        s.end_cycle();
        s.commit(&"a");

        s.begin_cycle();
        s.set("a", 2);
        s.end_cycle();
        assert_eq!(s.updated(), vec!["a"]);
    }

    #[test]
    fn key_missing_this_cycle_is_deleted_and_stays_deleted_until_committed() {
        let mut s = store();
        s.begin_cycle();
        s.set("a", 1);
        s.end_cycle();
        s.commit(&"a");

        s.begin_cycle();
        s.end_cycle();
        assert_eq!(s.deleted(), vec!["a"]);

        // Retry: not committed, still pending next cycle.
        s.begin_cycle();
        s.end_cycle();
        assert_eq!(s.deleted(), vec!["a"]);

        s.commit(&"a");
        s.begin_cycle();
        s.end_cycle();
        assert!(s.deleted().is_empty());
    }

    #[test]
    fn failed_apply_is_retried_next_cycle() {
        let mut s = store();
        s.begin_cycle();
        s.set("a", 1);
        s.end_cycle();
        // No commit() — simulates a failed create.
        s.begin_cycle();
        s.set("a", 1);
        s.end_cycle();
        assert_eq!(s.created(), vec!["a"]);
    }

    #[test]
    fn idempotent_second_pass_produces_no_plan() {
        let mut s = store();
        s.begin_cycle();
        s.set("a", 1);
        s.end_cycle();
        s.commit(&"a");

        s.begin_cycle();
        s.set("a", 1);
        s.end_cycle();
        assert!(s.created().is_empty());
        assert!(s.updated().is_empty());
        assert!(s.deleted().is_empty());
    }
}
