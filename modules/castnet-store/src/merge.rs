//! Merge/dedup engine — pure functions shared by every store backend.
//!
//! Folds an incoming creator batch into the existing deduplicated set without
//! duplicating identity and without dropping records that lack one. Stores
//! wrap these in a transaction that re-checks job status (see `JobStore`).

use std::collections::HashMap;

use castnet_common::Creator;

use crate::store::IdentityFn;

/// Default identity resolver: the normalized identity field, falling back to
/// username. Empty strings defer to the content-hash fallback.
pub fn identity_key(creator: &Creator) -> Option<String> {
    if !creator.identity.trim().is_empty() {
        return Some(creator.identity.clone());
    }
    creator.username.as_ref().filter(|u| !u.trim().is_empty()).cloned()
}

/// Case-insensitive, whitespace-trimmed key comparison.
fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Fast hash for fallback keys. Not cryptographic.
fn content_hash(content: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Synthesized key for creators with no resolvable identity, derived from the
/// record content so distinct entries stay distinct while literal resubmissions
/// of the same record still collide.
fn fallback_key(creator: &Creator) -> String {
    let serialized = serde_json::to_string(creator).unwrap_or_default();
    format!("anon:{:x}", content_hash(&serialized))
}

fn resolve_key(creator: &Creator, identity: IdentityFn<'_>) -> String {
    match identity(creator).map(|k| normalize_key(&k)) {
        Some(key) if !key.is_empty() => key,
        _ => fallback_key(creator),
    }
}

/// Deduplicated union of `existing` (already deduplicated) and `batch`,
/// keyed by identity, last write wins per key so an enrichment pass can
/// overwrite a thinner earlier record. Existing order is preserved; new keys
/// append in batch order. Returns (union, new_count).
pub fn merge_batches(
    existing: &[Creator],
    batch: &[Creator],
    identity: IdentityFn<'_>,
) -> (Vec<Creator>, usize) {
    let mut order: Vec<String> = Vec::with_capacity(existing.len() + batch.len());
    let mut by_key: HashMap<String, Creator> = HashMap::with_capacity(existing.len() + batch.len());

    for creator in existing {
        let key = resolve_key(creator, identity);
        if !by_key.contains_key(&key) {
            order.push(key.clone());
        }
        by_key.insert(key, creator.clone());
    }
    let before = by_key.len();

    for creator in batch {
        let key = resolve_key(creator, identity);
        if !by_key.contains_key(&key) {
            order.push(key.clone());
        }
        by_key.insert(key, creator.clone());
    }

    let new_count = by_key.len().saturating_sub(before);
    let union = order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect();
    (union, new_count)
}
