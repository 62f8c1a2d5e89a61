// Corpus normalization module
// Maps heterogeneous statute and Q&A records onto one text representation


use serde_json::Value;
use std::collections::BTreeMap;

/// Normalized text at or below this many trimmed characters is dropped as noise.
const SHORT_TEXT_THRESHOLD: usize = 20;

/// Schema family of a source record, selecting the normalization template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSchema {
    /// `section`, `title`, `description`
    Section,
    /// `chapter`, `section`, `section_title`, `section_desc`
    ChapterSection,
    /// `chapter`, `chapter_title`, `section_title`, `section_desc`
    ChapterClassified,
    /// `question`, `answer`
    QuestionAnswer,
}

/// Maps collection identifiers (corpus file stems) to their record schema.
///
/// New collections are added by registering them, not by branching on
/// filenames at the call sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, RecordSchema>,
}

impl SchemaRegistry {
    /// Registry covering the known statute collections.
    #[inline]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for collection in ["cpc", "ida", "mva"] {
            registry.register(collection, RecordSchema::Section);
        }
        for collection in ["crpc", "hma", "iea", "nia"] {
            registry.register(collection, RecordSchema::ChapterSection);
        }
        registry.register("ipc", RecordSchema::ChapterClassified);
        registry
    }

    /// Registry with no collections registered.
    #[inline]
    pub fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn register(&mut self, collection: impl Into<String>, schema: RecordSchema) {
        self.schemas.insert(collection.into(), schema);
    }

    #[inline]
    pub fn schema_for(&self, collection: &str) -> Option<RecordSchema> {
        self.schemas.get(collection).copied()
    }

    /// Normalize a record from a named collection. `None` when the
    /// collection is unknown or the record does not survive filtering.
    #[inline]
    pub fn normalize(&self, collection: &str, record: &Value) -> Option<String> {
        self.schema_for(collection)
            .and_then(|schema| normalize_record(schema, collection, record))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl Default for SchemaRegistry {
    #[inline]
    fn default() -> Self {
        Self::builtin()
    }
}

/// Normalize one raw record into its uniform text representation.
///
/// Returns `None` when the record does not apply: its substantive fields are
/// missing or empty, or the rendered text is too short to be a useful
/// passage. Never fails; malformed input maps to a skip, not an error.
#[inline]
pub fn normalize_record(schema: RecordSchema, collection: &str, record: &Value) -> Option<String> {
    let text = match schema {
        RecordSchema::Section => {
            let description = field_text(record, "description");
            if description.is_empty() {
                return None;
            }
            format!(
                "[{}] Section {}: {}\n{}",
                collection,
                field_text(record, "section"),
                field_text(record, "title"),
                description
            )
        }
        RecordSchema::ChapterSection => {
            let section_desc = field_text(record, "section_desc");
            if section_desc.is_empty() {
                return None;
            }
            format!(
                "[{}] Chapter {}, Section {}: {}\n{}",
                collection,
                field_text(record, "chapter"),
                field_text(record, "section"),
                field_text(record, "section_title"),
                section_desc
            )
        }
        RecordSchema::ChapterClassified => {
            let section_desc = field_text(record, "section_desc");
            if section_desc.is_empty() {
                return None;
            }
            format!(
                "[{}] Chapter {}: {}\nSection: {}\n{}",
                collection,
                field_text(record, "chapter"),
                field_text(record, "chapter_title"),
                field_text(record, "section_title"),
                section_desc
            )
        }
        RecordSchema::QuestionAnswer => {
            let question = field_text(record, "question");
            let answer = field_text(record, "answer");
            if question.is_empty() || answer.is_empty() {
                return None;
            }
            format!("[{}] Q: {}\nA: {}", collection, question, answer)
        }
    };

    (text.trim().chars().count() > SHORT_TEXT_THRESHOLD).then_some(text)
}

/// Render a record field as text. Strings pass through, numbers are
/// formatted, anything else (including a missing field) becomes empty.
fn field_text(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Truncate to at most `max_chars` characters without splitting a code
/// point. Returns the input unchanged when it is already short enough.
#[inline]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text.get(..byte_index).unwrap_or(text),
        None => text,
    }
}
