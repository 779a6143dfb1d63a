//! Reconciles two snapshots of an identity-less connection list.
//!
//! Rows are matched only by their natural key. The result is expressed as
//! indices into the two input slices so the caller decides what to move or copy.

use std::collections::HashMap;

use super::connection::{ConnectionRow, NaturalKey};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Indices into `next` with no natural-key match in `previous`.
    pub created: Vec<usize>,
    /// Indices into `previous` with no natural-key match in `next`.
    pub deleted: Vec<usize>,
    /// Indices into `previous` matched by a row of `next` with a different status.
    pub updated: Vec<usize>,
    /// `(previous, next)` pairs carrying the same connection forward.
    pub continuing: Vec<(usize, usize)>,
    /// Indices into `next` sharing a key with `previous` but left without a
    /// partner because `next` holds more rows for that key.
    pub surplus: Vec<usize>,
}

impl SnapshotDiff {
    pub fn is_unchanged(&self) -> bool {
        self.created.is_empty()
            && self.surplus.is_empty()
            && self.deleted.is_empty()
            && self.updated.is_empty()
    }
}

/// Hash join of `previous` and `next` on the natural key.
///
/// Rows sharing a key on the same side are paired in order. Indices in every
/// partition are ascending.
pub fn diff(previous: &[ConnectionRow], next: &[ConnectionRow]) -> SnapshotDiff {
    let previous_by_key = group_by_key(previous);
    let next_by_key = group_by_key(next);

    let mut result = SnapshotDiff::default();

    for (index, row) in previous.iter().enumerate() {
        match next_by_key.get(&row.natural_key()) {
            None => result.deleted.push(index),
            Some(matches) => {
                if matches.iter().any(|&other| next[other].status() != row.status()) {
                    result.updated.push(index);
                }
            }
        }
    }

    for (index, row) in next.iter().enumerate() {
        let key = row.natural_key();
        let Some(earlier) = previous_by_key.get(&key) else {
            result.created.push(index);
            continue;
        };

        let position = next_by_key[&key]
            .iter()
            .position(|&other| other == index)
            .unwrap_or(0);
        match earlier.get(position) {
            Some(&partner) => result.continuing.push((partner, index)),
            None => result.surplus.push(index),
        }
    }

    result
}

fn group_by_key(rows: &[ConnectionRow]) -> HashMap<NaturalKey, Vec<usize>> {
    let mut groups: HashMap<NaturalKey, Vec<usize>> = HashMap::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        groups.entry(row.natural_key()).or_default().push(index);
    }
    groups
}
