//! Shared state for the HTTP handlers.

use std::sync::Arc;

use crate::{auth::AuthGate, canonical::Resolver, store::EntityStore};

/// The shared app state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The entity store.
    pub store: Arc<dyn EntityStore>,
    /// The canonicalization engine.
    pub resolver: Resolver,
    /// The auth gate.
    pub auth: AuthGate,
}
