//! Realtime channel and event patterns
//!
//! Patterns contain the placeholders [`DB_ID`] and [`COLLECTION_ID`], which a
//! `Provider` fills in with the database and collection it is bound to.

/// Placeholder replaced with the bound database id.
pub const DB_ID: &str = "$DB_ID";

/// Placeholder replaced with the bound collection id.
pub const COLLECTION_ID: &str = "$COLLECTION_ID";

/// Channel carrying every document event of the collection.
pub const DOCUMENTS: &str = "databases.$DB_ID.collections.$COLLECTION_ID.documents";

/// Any document event in the collection.
pub const ANY: &str = "databases.$DB_ID.collections.$COLLECTION_ID.documents.*";

/// A document was created.
pub const CREATE: &str = "databases.$DB_ID.collections.$COLLECTION_ID.documents.*.create";

/// A document was updated.
pub const UPDATE: &str = "databases.$DB_ID.collections.$COLLECTION_ID.documents.*.update";

/// A document was deleted.
pub const DELETE: &str = "databases.$DB_ID.collections.$COLLECTION_ID.documents.*.delete";

/// Substitute both placeholders in `pattern`.
///
/// Every occurrence of each placeholder is replaced, not only the first.
pub fn resolve(pattern: &str, database_id: &str, collection_id: &str) -> String {
    pattern
        .replace(DB_ID, database_id)
        .replace(COLLECTION_ID, collection_id)
}

/// Glob match of an event name against a pattern, segment by segment.
///
/// `*` matches exactly one dot-separated segment.
pub fn matches(pattern: &str, event: &str) -> bool {
    let mut pattern_parts = pattern.split('.');
    let mut event_parts = event.split('.');
    loop {
        match (pattern_parts.next(), event_parts.next()) {
            (None, None) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(e)) if p == e => continue,
            _ => return false,
        }
    }
}
