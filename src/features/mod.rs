//! Feature modules built on the dispatch core (spec.md §4.5).
//!
//! Each module is a thin policy layer: a constructor registers method
//! handlers on a [`crate::peer::Peer`] and returns a façade object holding
//! its own state behind a lock. Modules never alter the peer's dispatch
//! path — the "composition over inheritance" design note in spec.md §9.

pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

use crate::error::McpError;

/// A page of a list-style result (spec.md §10 "Pagination cursors").
/// Cursors are a stringified offset into the underlying `Vec`, the same
/// approach the pack's in-memory list handlers use.
pub(crate) fn paginate<T: Clone>(items: &[T], cursor: Option<&str>, page_size: usize) -> (Vec<T>, Option<String>) {
    let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
    let end = (offset + page_size).min(items.len());
    let page = items.get(offset..end).unwrap_or(&[]).to_vec();
    let next_cursor = if end < items.len() {
        Some(end.to_string())
    } else {
        None
    };
    (page, next_cursor)
}

pub(crate) const DEFAULT_PAGE_SIZE: usize = 50;

/// Maps an absent/declared-false capability to the locally-generated
/// `MethodNotFound` spec.md §4.4/§4.5 requires without a wire round trip.
pub(crate) fn require(declared: bool, feature: &str) -> Result<(), McpError> {
    if declared {
        Ok(())
    } else {
        Err(McpError::CapabilityNotDeclared(feature.to_string()))
    }
}

/// As [`require`], but additionally gates on the handshake having fully
/// completed. Server-originated façades (roots, sampling) must refuse a
/// call fired between `initialize` sent and `initialized` received, even
/// if the capability itself is already known (spec.md §4.4).
pub(crate) fn require_initialized(
    declared: bool,
    initialized: bool,
    feature: &str,
) -> Result<(), McpError> {
    require(declared && initialized, feature)
}
