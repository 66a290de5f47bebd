//! Decides what to write and what to delete for one index.

use super::fetcher::FreshObjects;
use crate::error::{Result, SyncError};
use index_sync_config::{FieldPath, ObjectId, ObjectRecord, ObjectSnapshot};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Write every fresh object; the index is rebuilt elsewhere.
    FullReplace,
    /// Write changed and new objects, delete stale ones.
    PartialUpdate,
}

/// Records of one query with the fields used to detect their changes.
#[derive(Debug, Clone)]
pub struct FreshResult {
    pub objects: FreshObjects,
    pub match_fields: Vec<FieldPath>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub to_index: BTreeMap<ObjectId, ObjectRecord>,
    pub to_remove: BTreeSet<ObjectId>,
    pub unchanged: BTreeSet<ObjectId>,
    /// Ids produced by more than one query of the group
    pub overlapping: BTreeSet<ObjectId>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.to_index.is_empty() && self.to_remove.is_empty()
    }
}

/// Compare `fresh` (one entry per query, in query order) with `existing`.
///
/// `to_index` and `to_remove` are always disjoint. In partial mode every
/// fresh object must carry at least one of its query's match fields, and
/// only existing objects carrying one of the group's match fields are
/// eligible for removal.
pub fn reconcile(
    index_name: &str,
    existing: &ObjectSnapshot,
    fresh: &[FreshResult],
    mode: ReconcileMode,
) -> Result<Reconciliation> {
    let mut plan = Reconciliation::default();
    let mut produced: HashMap<&str, usize> = HashMap::new();

    if mode == ReconcileMode::PartialUpdate {
        ensure_match_fields(index_name, fresh)?;
    }

    for result in fresh {
        for (id, object) in &result.objects {
            *produced.entry(id.as_str()).or_insert(0) += 1;

            let previous = match mode {
                ReconcileMode::FullReplace => None,
                ReconcileMode::PartialUpdate => existing.get(id),
            };
            match previous {
                Some(previous) if !changed(previous, object, &result.match_fields) => {
                    plan.to_index.remove(id);
                    plan.unchanged.insert(id.clone());
                }
                _ => {
                    plan.unchanged.remove(id);
                    plan.to_index.insert(id.clone(), object.clone());
                }
            }
        }
    }

    plan.overlapping = produced
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(id, _)| id.to_string())
        .collect();

    if mode == ReconcileMode::PartialUpdate {
        let managed_fields = union_fields(fresh);
        plan.to_remove = existing
            .iter()
            .filter(|(id, _)| !produced.contains_key(id.as_str()))
            .filter(|(_, object)| object.has_any(&managed_fields))
            .map(|(id, _)| id.clone())
            .collect();
    }

    Ok(plan)
}

fn ensure_match_fields(index_name: &str, fresh: &[FreshResult]) -> Result<()> {
    for result in fresh {
        for (id, object) in &result.objects {
            if !object.has_any(&result.match_fields) {
                let fields = result
                    .match_fields
                    .iter()
                    .map(FieldPath::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(SyncError::invalid_record(
                    index_name,
                    format!(
                        "partial updates are enabled but object `{}` has none of the match fields [{}]",
                        id, fields
                    ),
                    &object.clone().into_value(),
                ));
            }
        }
    }
    Ok(())
}

fn changed(previous: &ObjectRecord, fresh: &ObjectRecord, fields: &[FieldPath]) -> bool {
    fields
        .iter()
        .any(|field| previous.get_path(field) != fresh.get_path(field))
}

fn union_fields(fresh: &[FreshResult]) -> Vec<FieldPath> {
    let mut fields: Vec<FieldPath> = Vec::new();
    for field in fresh.iter().flat_map(|r| r.match_fields.iter()) {
        if !fields.contains(field) {
            fields.push(field.clone());
        }
    }
    fields
}
