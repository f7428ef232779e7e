//! Excerpt framing word and queue header documents.

use crate::message::{Message, Value};

/// Lower 30 bits carry the payload length.
pub const LENGTH_MASK: u32 = 0x3FFF_FFFF;
/// Bit 30: metadata excerpt.
pub const METADATA_FLAG: u32 = 0x4000_0000;
/// Bit 31: excerpt still being written.
pub const WORKING_FLAG: u32 = 0x8000_0000;
/// Both top bits: padding region. A settled file never contains a working
/// metadata excerpt, which frees the combination.
pub const PADDING_FLAGS: u32 = WORKING_FLAG | METADATA_FLAG;

pub const EXCERPT_ALIGN: u64 = 4;

/// One parsed length-and-flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcerptWord {
    /// Unwritten or in-flight; iteration stops cleanly.
    NotReady,
    Padding { len: u32 },
    Data { len: u32 },
    Metadata { len: u32 },
}

impl ExcerptWord {
    pub fn parse(word: u32) -> Self {
        if word == 0 {
            return ExcerptWord::NotReady;
        }
        let len = word & LENGTH_MASK;
        if word & PADDING_FLAGS == PADDING_FLAGS {
            return ExcerptWord::Padding { len };
        }
        if word & WORKING_FLAG != 0 {
            return ExcerptWord::NotReady;
        }
        if word & METADATA_FLAG != 0 {
            return ExcerptWord::Metadata { len };
        }
        ExcerptWord::Data { len }
    }
}

/// Queue facts from the file header document, optionally enriched by the
/// companion metadata file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueInfo {
    pub start_index: u64,
    pub roll_cycle: String,
    pub epoch: i64,
    pub source_id: i64,
    pub version: i64,
    pub index_count: i64,
    pub index_spacing: i64,
    pub file_size: u64,
}

impl QueueInfo {
    /// Reads the header fields out of a decoded header document. The
    /// producer nests them in a `header` sub-document; a flat layout is
    /// accepted too.
    pub fn from_document(document: &Message) -> Self {
        let mut info = QueueInfo::default();
        info.apply(document);
        info
    }

    pub fn apply(&mut self, document: &Message) {
        let fields: &[crate::message::Field] = match document.field("header") {
            Some(field) => match &field.value {
                Value::Nested(nested) => &nested.fields,
                _ => &document.fields,
            },
            None => &document.fields,
        };

        for field in fields {
            match field.name.as_str() {
                "index" => {
                    if let Some(value) = int_of(&field.value) {
                        self.start_index = value.max(0) as u64;
                    }
                }
                "rollCycle" => {
                    if let Value::Text(text) = &field.value {
                        self.roll_cycle = text.clone();
                    }
                }
                "epoch" => {
                    if let Some(value) = int_of(&field.value) {
                        self.epoch = value;
                    }
                }
                "sourceId" => {
                    if let Some(value) = int_of(&field.value) {
                        self.source_id = value;
                    }
                }
                "version" => {
                    if let Some(value) = int_of(&field.value) {
                        self.version = value;
                    }
                }
                "indexCount" => {
                    if let Some(value) = int_of(&field.value) {
                        self.index_count = value;
                    }
                }
                "indexSpacing" => {
                    if let Some(value) = int_of(&field.value) {
                        self.index_spacing = value;
                    }
                }
                _ => {}
            }
        }
    }
}

fn int_of(value: &Value) -> Option<i64> {
    match value {
        Value::Int64(v) => Some(*v),
        Value::UInt64(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}
