//! Test fixtures: builds queue file images byte by byte.
//!
//! Writing stays out of the library, so the tests assemble excerpt framing
//! here and encode payload documents with the canonical wire encoder.

use std::path::Path;

use cqlens::{DocumentWriter, Field, Kind, Message, Value};

pub const METADATA_FLAG: u32 = 0x4000_0000;
pub const WORKING_FLAG: u32 = 0x8000_0000;
pub const PADDING_FLAGS: u32 = 0xC000_0000;

pub struct QueueImage {
    bytes: Vec<u8>,
}

impl QueueImage {
    /// Starts a file image with the standard header metadata excerpt.
    pub fn new(start_index: u64) -> Self {
        Self::with_header(start_index, "DAILY", 0)
    }

    pub fn with_header(start_index: u64, roll_cycle: &str, epoch: i64) -> Self {
        let mut header = Message::new(0, 0, Kind::Metadata);
        header.push_field(Field::new("index", Value::Int64(start_index as i64)));
        header.push_field(Field::new("rollCycle", Value::Text(roll_cycle.into())));
        header.push_field(Field::new("epoch", Value::Int64(epoch)));
        header.push_field(Field::new("indexCount", Value::Int64(8192)));
        header.push_field(Field::new("indexSpacing", Value::Int64(16)));

        let mut document = Message::new(0, 0, Kind::Metadata);
        document.push_field(Field::new("header", Value::Nested(Box::new(header))));

        let mut image = Self { bytes: Vec::new() };
        image.push_excerpt(METADATA_FLAG, &DocumentWriter::encode(&document));
        image
    }

    /// A file image with no header excerpt at all (for signature tests).
    pub fn raw() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn data(&mut self, payload: &[u8]) -> &mut Self {
        self.push_excerpt(0, payload);
        self
    }

    pub fn metadata(&mut self, payload: &[u8]) -> &mut Self {
        self.push_excerpt(METADATA_FLAG, payload);
        self
    }

    pub fn padding(&mut self, len: usize) -> &mut Self {
        self.push_word(PADDING_FLAGS | len as u32);
        self.bytes.extend(std::iter::repeat(0u8).take(len));
        self.align();
        self
    }

    /// An excerpt still being written; readers must stop before it.
    pub fn working(&mut self, len: usize) -> &mut Self {
        self.push_word(WORKING_FLAG | len as u32);
        self.bytes.extend(std::iter::repeat(0xAAu8).take(len));
        self
    }

    pub fn push_excerpt(&mut self, flags: u32, payload: &[u8]) {
        self.push_word(flags | payload.len() as u32);
        self.bytes.extend_from_slice(payload);
        self.align();
    }

    fn push_word(&mut self, word: u32) {
        self.bytes.extend_from_slice(&word.to_le_bytes());
    }

    fn align(&mut self) {
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
    }

    pub fn corrupt_last_slack_byte(&mut self) -> &mut Self {
        let last = self.bytes.len() - 1;
        assert_eq!(self.bytes[last], 0, "expected a slack byte");
        self.bytes[last] = 0x5A;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn truncate_to(&mut self, len: usize) -> &mut Self {
        self.bytes.truncate(len);
        self
    }

    pub fn write_to(&self, path: &Path) {
        std::fs::write(path, &self.bytes).expect("write queue image");
    }
}

/// Encodes a tagged `{type, fields}` document the way producers emit them.
pub fn wire_document(type_name: &str, fields: &[(&str, Value)]) -> Vec<u8> {
    let mut message = Message::new(0, 0, Kind::Data);
    message.type_name = type_name.to_string();
    for (name, value) in fields {
        message.push_field(Field::new(*name, value.clone()));
    }
    DocumentWriter::encode(&message)
}
