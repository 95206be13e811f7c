//! Document-identity canonicalization.
//!
//! The same logical document can appear under different content-derived
//! hashes, e.g. after a re-export or re-conversion. [`Resolver::resolve`]
//! decides which hash is authoritative for a document and records that
//! decision as link edges, so progress written under any equivalent hash
//! lands on one canonical key.
//!
//! The resolve-then-link sequence is deliberately not wrapped in a
//! cross-row transaction in either backend. All steps after the link lookup
//! are pure functions of current store state, so an interrupted run leaves
//! nothing to repair: the missing links are rediscovered and recreated on
//! the next call.

use std::sync::Arc;

use tracing::debug;

use crate::store::{EntityStore, StoreResult};

/// Outcome of an explicit merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The hash every other hash now links to.
    pub canonical: String,
    /// The hashes that were (re-)pointed at the canonical.
    pub linked: Vec<String>,
}

/// The canonicalization engine.
#[derive(Debug, Clone)]
pub struct Resolver {
    store: Arc<dyn EntityStore>,
}

impl Resolver {
    /// Create a resolver over the given store.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Resolve a raw document hash to its canonical hash, creating link
    /// edges for newly discovered equivalences.
    ///
    /// An existing link wins outright, before any filename logic runs.
    /// Without a filename hint the hash is self-canonical; a self-link is
    /// redundant and never materialized. With a hint, the earliest known
    /// record for that filename names the canonical: it is the hash most
    /// likely to be referenced elsewhere and must never retroactively
    /// change. Equal timestamps are broken by the smaller document hash,
    /// which keeps the choice deterministic across backends.
    pub fn resolve(
        &self,
        user_id: &str,
        document_hash: &str,
        filename: Option<&str>,
    ) -> StoreResult<String> {
        if let Some(canonical) = self.store.get_canonical(user_id, document_hash)? {
            return Ok(canonical);
        }
        let Some(filename) = filename else {
            return Ok(document_hash.to_string());
        };
        let records = self.store.get_all_progress_for_filename(user_id, filename)?;
        let Some(earliest) = records
            .iter()
            .min_by_key(|record| (record.timestamp, record.document.clone()))
        else {
            // first sighting of this filename, implicitly canonical
            return Ok(document_hash.to_string());
        };
        let canonical = earliest.document.clone();

        for record in &records {
            if record.document != canonical
                && self.store.get_canonical(user_id, &record.document)?.is_none()
            {
                debug!(document = %record.document, %canonical, "linking equivalent document");
                self.store
                    .create_link(user_id, &record.document, &canonical)?;
            }
        }
        if document_hash != canonical
            && self.store.get_canonical(user_id, document_hash)?.is_none()
        {
            debug!(document = %document_hash, %canonical, "linking resolved document");
            self.store.create_link(user_id, document_hash, &canonical)?;
        }
        Ok(canonical)
    }

    /// Explicitly merge a set of hashes into one book.
    ///
    /// The canonical is the first hash in the given order that has an
    /// existing progress record, or the first hash outright if none has
    /// one. Every other hash is re-pointed at it, deleting a conflicting
    /// link first.
    ///
    /// Only link edges are rewritten. Progress rows stored under a hash
    /// that is re-pointed elsewhere stay on their old key and drop out of
    /// aggregation until a new write lands under the new canonical.
    ///
    /// Returns `None` when fewer than two distinct hashes were given.
    pub fn merge(&self, user_id: &str, hashes: &[String]) -> StoreResult<Option<MergeOutcome>> {
        let mut distinct: Vec<&String> = Vec::new();
        for hash in hashes {
            if !distinct.contains(&hash) {
                distinct.push(hash);
            }
        }
        if distinct.len() < 2 {
            return Ok(None);
        }

        let mut canonical = None;
        for hash in &distinct {
            if self.store.get_progress(user_id, hash)?.is_some() {
                canonical = Some((*hash).clone());
                break;
            }
        }
        let canonical = canonical.unwrap_or_else(|| distinct[0].clone());

        let mut linked = Vec::new();
        for hash in &distinct {
            if **hash == canonical {
                continue;
            }
            match self.store.get_canonical(user_id, hash)? {
                Some(existing) if existing == canonical => {}
                Some(_) => {
                    self.store.delete_link(user_id, hash)?;
                    self.store.create_link(user_id, hash, &canonical)?;
                }
                None => {
                    self.store.create_link(user_id, hash, &canonical)?;
                }
            }
            linked.push((*hash).clone());
        }
        Ok(Some(MergeOutcome { canonical, linked }))
    }

    /// Remove the link for a raw hash. Returns whether one existed.
    ///
    /// Afterwards the hash resolves as self-canonical again, until a
    /// filename hint re-discovers an equivalence.
    pub fn unlink(&self, user_id: &str, document_hash: &str) -> StoreResult<bool> {
        self.store.delete_link(user_id, document_hash)
    }
}
