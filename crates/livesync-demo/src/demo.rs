//! Demo data: a handful of notes with a hidden field.

use std::sync::Arc;

use serde_json::json;

use livesync_core::MemoryEntitySource;
use livesync_proto::FieldMap;

/// Entity type served by the demo.
pub const NOTE: &str = "note";

/// Id of the note the demo observer watches.
pub const WATCHED_NOTE: &str = "1";

fn note(id: &str, title: &str, body: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("id".into(), json!(id));
    fields.insert("title".into(), json!(title));
    fields.insert("body".into(), json!(body));
    fields.insert("revision".into(), json!(0));
    fields.insert("edit_token".into(), json!(format!("token-{}", id)));
    fields.insert("created_at".into(), json!(chrono::Utc::now().to_rfc3339()));
    fields.insert("updated_at".into(), json!(chrono::Utc::now().to_rfc3339()));
    fields
}

/// Create the note source. `edit_token` never leaves the server.
pub fn create_notes() -> Arc<MemoryEntitySource> {
    let notes = MemoryEntitySource::new(NOTE).with_hidden_fields(["edit_token"]);
    notes.insert("1", note("1", "Groceries", "milk, eggs"));
    notes.insert("2", note("2", "Ideas", ""));
    notes.insert("3", note("3", "Reading list", "The Rust Programming Language"));
    Arc::new(notes)
}

/// Apply the next scripted edit to the watched note.
///
/// Returns the names of the fields that changed.
pub fn edit(notes: &MemoryEntitySource, revision: u64) -> Vec<String> {
    let mut changes = FieldMap::new();
    changes.insert("revision".into(), json!(revision));
    changes.insert("body".into(), json!(format!("milk, eggs (rev {})", revision)));
    changes.insert("updated_at".into(), json!(chrono::Utc::now().to_rfc3339()));
    notes.update(WATCHED_NOTE, changes)
}
