//! Snapshot diffing.
//!
//! Compares a freshly fetched list against the stored snapshot and
//! returns the records that are new or whose significant fields changed,
//! in the order the fetch produced them.

use std::collections::{HashMap, HashSet};

use super::identity::{Fingerprinted, IdentityKey};
use crate::models::Entity;

/// Result of comparing two snapshots.
#[derive(Debug, Clone)]
pub struct DiffResult<E> {
    /// Keys absent from the previous snapshot
    pub added: Vec<Fingerprinted<E>>,
    /// Keys present before with a different digest
    pub updated: Vec<Fingerprinted<E>>,
    /// Keys that disappeared
    pub removed: Vec<IdentityKey>,
    /// Every current record that could be fingerprinted, in fetch order
    pub current: Vec<Fingerprinted<E>>,
    /// Current records skipped because no key could be built
    pub skipped: usize,
}

impl<E: Clone> DiffResult<E> {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty() || !self.removed.is_empty()
    }

    /// Added and updated records in discovery order.
    pub fn changed(&self) -> Vec<Fingerprinted<E>> {
        let wanted: HashSet<&IdentityKey> = self
            .added
            .iter()
            .chain(&self.updated)
            .map(|f| &f.key)
            .collect();
        self.current
            .iter()
            .filter(|f| wanted.contains(&f.key))
            .cloned()
            .collect()
    }
}

/// Fingerprint a list, logging and dropping records without a usable key
/// and keeping the first of any duplicate keys.
pub fn fingerprint_all<E: Entity>(records: &[E]) -> (Vec<Fingerprinted<E>>, usize) {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for record in records {
        match Fingerprinted::new(record.clone()) {
            Ok(item) => {
                if seen.insert(item.key.clone()) {
                    out.push(item);
                } else {
                    log::debug!("Duplicate {} in fetch, keeping first", record.label());
                }
            }
            Err(e) => {
                skipped += 1;
                log::warn!("Skipping {}: {}", record.label(), e);
            }
        }
    }

    (out, skipped)
}

/// Compare the stored snapshot against a fresh fetch.
///
/// Records whose key is new are `added`; records whose key existed with a
/// different significant-field digest are `updated`.
pub fn calculate_diff<E: Entity>(previous: &[E], current: &[E]) -> DiffResult<E> {
    let (previous, _) = fingerprint_all(previous);
    let (current, skipped) = fingerprint_all(current);

    let prev_map: HashMap<&IdentityKey, &str> = previous
        .iter()
        .map(|f| (&f.key, f.digest.as_str()))
        .collect();
    let curr_keys: HashSet<&IdentityKey> = current.iter().map(|f| &f.key).collect();

    let mut added = Vec::new();
    let mut updated = Vec::new();
    for item in &current {
        match prev_map.get(&item.key) {
            None => added.push(item.clone()),
            Some(digest) if *digest != item.digest => updated.push(item.clone()),
            Some(_) => {}
        }
    }

    let removed = previous
        .iter()
        .filter(|f| !curr_keys.contains(&f.key))
        .map(|f| f.key.clone())
        .collect();

    DiffResult {
        added,
        updated,
        removed,
        current,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpdateRecord;

    fn make_update(lender: &str, date: &str, description: &str) -> UpdateRecord {
        serde_json::from_value(serde_json::json!({
            "lenderId": lender, "year": 2025, "date": date,
            "description": description, "status": "default"
        }))
        .unwrap()
    }

    #[test]
    fn test_no_changes() {
        let prev = vec![make_update("1", "2025-04-01", "A")];
        let curr = prev.clone();
        let diff = calculate_diff(&prev, &curr);
        assert!(!diff.has_changes());
        assert!(diff.changed().is_empty());
    }

    #[test]
    fn test_added() {
        let prev = vec![make_update("1", "2025-04-01", "A")];
        let curr = vec![
            make_update("1", "2025-04-01", "A"),
            make_update("2", "2025-04-02", "B"),
        ];
        let diff = calculate_diff(&prev, &curr);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].entity.lender_id, "2");
    }

    #[test]
    fn test_removed() {
        let prev = vec![
            make_update("1", "2025-04-01", "A"),
            make_update("2", "2025-04-02", "B"),
        ];
        let curr = vec![make_update("1", "2025-04-01", "A")];
        let diff = calculate_diff(&prev, &curr);
        assert_eq!(diff.removed.len(), 1);
        assert!(diff.changed().is_empty());
    }

    #[test]
    fn test_updated_significant_field() {
        let prev = vec![make_update("1", "2025-04-01", "A")];
        let curr = vec![make_update("1", "2025-04-01", "A (edited)")];
        let diff = calculate_diff(&prev, &curr);
        assert_eq!(diff.updated.len(), 1);
        assert!(diff.added.is_empty());
    }

    #[test]
    fn test_non_significant_field_ignored() {
        let prev = vec![make_update("1", "2025-04-01", "A")];
        let mut changed = make_update("1", "2025-04-01", "A");
        changed.status = Some("recovered".into());
        let diff = calculate_diff(&prev, &[changed]);
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_changed_preserves_discovery_order() {
        let prev = vec![make_update("2", "2025-04-02", "old")];
        let curr = vec![
            make_update("3", "2025-04-03", "C"),
            make_update("2", "2025-04-02", "new"),
            make_update("1", "2025-04-01", "A"),
        ];
        let diff = calculate_diff(&prev, &curr);
        let order: Vec<String> = diff
            .changed()
            .into_iter()
            .map(|f| f.entity.lender_id)
            .collect();
        assert_eq!(order, vec!["3", "2", "1"]);
    }

    #[test]
    fn test_unkeyed_and_duplicate_records_skipped() {
        let mut broken = make_update("1", "2025-04-01", "A");
        broken.date = String::new();
        let curr = vec![
            broken,
            make_update("2", "2025-04-02", "B"),
            make_update("2", "2025-04-02", "B again"),
        ];
        let diff = calculate_diff(&[], &curr);
        assert_eq!(diff.skipped, 1);
        assert_eq!(diff.current.len(), 1);
        assert_eq!(diff.added[0].entity.description, "B");
    }
}
