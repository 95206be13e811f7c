//! Book aggregation.
//!
//! A book is one canonical document plus its most recent progress, its
//! label, and the raw hashes that link to it. Aggregation joins the three
//! entity tables read-only; nothing here mutates the store.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::store::{EntityStore, ProgressRecord, StoreResult};

/// One logical book, as presented to end users.
#[derive(Debug, Clone, Serialize)]
pub struct BookSummary {
    /// Canonical document hash the book is keyed under.
    pub canonical_hash: String,
    /// Reader position of the most recent sync.
    pub progress: String,
    /// Fraction read, in `0.0..=1.0`.
    pub percentage: f64,
    /// Device that wrote the most recent sync.
    pub device: String,
    /// Timestamp of the most recent sync.
    pub timestamp: i64,
    /// Filename from the most recent sync, if any.
    pub filename: Option<String>,
    /// User-supplied display name, if set.
    pub label: Option<String>,
    /// Raw hashes that link to this canonical, sorted.
    pub linked_hashes: Vec<String>,
}

impl BookSummary {
    /// Display name: label, else filename, else the canonical hash.
    pub fn display_name(&self) -> &str {
        self.label
            .as_deref()
            .or(self.filename.as_deref())
            .unwrap_or(&self.canonical_hash)
    }
}

/// Fold one user's progress, links and labels into one summary per book.
pub fn collect_books(store: &dyn EntityStore, user_id: &str) -> StoreResult<Vec<BookSummary>> {
    let progress = store.get_all_progress_for_user(user_id)?;
    let links = store.get_all_links(user_id)?;
    let labels = store.get_all_labels(user_id)?;

    let link_sources: HashSet<String> = links
        .iter()
        .map(|link| link.document_hash.clone())
        .collect();
    let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
    for link in links {
        reverse
            .entry(link.canonical_hash)
            .or_default()
            .push(link.document_hash);
    }
    let labels: HashMap<String, String> = labels
        .into_iter()
        .map(|label| (label.canonical_hash, label.label))
        .collect();

    // Group by canonical, keeping the record with the greatest timestamp.
    // The store holds one live record per key, so this fold matters only
    // if a canonical ever appears twice; the last observed record wins a
    // timestamp tie.
    let mut newest: HashMap<String, ProgressRecord> = HashMap::new();
    for record in progress {
        // A link source is never canonical. A record stranded under one by
        // a merge stays stored but is invisible here until a new write
        // lands under the canonical.
        if link_sources.contains(&record.document) {
            continue;
        }
        match newest.get(&record.document) {
            Some(existing) if existing.timestamp > record.timestamp => {}
            _ => {
                newest.insert(record.document.clone(), record);
            }
        }
    }

    let books = newest
        .into_values()
        .map(|record| {
            let mut linked_hashes = reverse.get(&record.document).cloned().unwrap_or_default();
            linked_hashes.sort();
            BookSummary {
                label: labels.get(&record.document).cloned(),
                linked_hashes,
                canonical_hash: record.document,
                progress: record.progress,
                percentage: record.percentage,
                device: record.device,
                timestamp: record.timestamp,
                filename: record.filename,
            }
        })
        .collect();
    Ok(books)
}

/// List view: timestamp descending, then `(offset, limit)`.
///
/// Out-of-range values clamp to an empty result, never an error.
pub fn list_page(mut books: Vec<BookSummary>, offset: usize, limit: usize) -> Vec<BookSummary> {
    books.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.canonical_hash.cmp(&b.canonical_hash))
    });
    books.into_iter().skip(offset).take(limit).collect()
}

/// Card view: percentage descending, then timestamp descending, truncated.
pub fn card_selection(mut books: Vec<BookSummary>, limit: usize) -> Vec<BookSummary> {
    books.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(Ordering::Equal)
            .then(b.timestamp.cmp(&a.timestamp))
    });
    books.truncate(limit);
    books
}
