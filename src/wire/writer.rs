//! Canonical wire encoder.
//!
//! Re-encodes a decoded message using the widest code for each value class.
//! decode -> encode -> decode is field-equivalent, which is what export and
//! idempotence checks rely on; the byte image is not required to match the
//! producer's.

use crate::message::{Message, Value};
use crate::stop_bit;
use crate::wire::codes;

pub struct DocumentWriter {
    buf: Vec<u8>,
}

impl DocumentWriter {
    pub fn encode(message: &Message) -> Vec<u8> {
        let mut writer = DocumentWriter { buf: Vec::new() };
        writer.write_document(message);
        writer.buf
    }

    fn write_document(&mut self, message: &Message) {
        if !message.type_name.is_empty() {
            self.buf.push(codes::TYPE_PREFIX);
            self.write_stop_bit_string(&message.type_name);
        }
        for field in &message.fields {
            self.buf.push(codes::FIELD_NAME_ANY);
            self.write_stop_bit_string(&field.name);
            self.write_value(&field.value);
        }
    }

    fn write_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.buf.push(codes::NULL),
            Value::Bool(true) => self.buf.push(codes::BOOL_TRUE),
            Value::Bool(false) => self.buf.push(codes::BOOL_FALSE),
            Value::Int64(v) => {
                self.buf.push(codes::INT64);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::UInt64(v) => {
                self.buf.push(codes::UINT64);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::Float64(v) => {
                self.buf.push(codes::FLOAT64);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::Text(v) => {
                self.buf.push(codes::STRING_ANY);
                self.write_stop_bit_string(v);
            }
            Value::Bytes(v) => {
                self.buf.push(codes::BYTES_LENGTH32);
                self.buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
                self.buf.extend_from_slice(v);
            }
            Value::Timestamp(nanos) => {
                self.buf.push(codes::DATE_TIME);
                self.buf.extend_from_slice(&nanos.to_le_bytes());
            }
            Value::Uuid(v) => {
                self.buf.push(codes::UUID);
                self.buf.extend_from_slice(&v.to_be_bytes());
            }
            Value::List(items) | Value::Set(items) => {
                self.buf.push(codes::SEQUENCE_START);
                for item in items {
                    self.write_value(item);
                }
                self.buf.push(codes::SEQUENCE_END);
            }
            Value::Map(pairs) => {
                // A map with text keys is a document; anything else becomes
                // a sequence of two-element sequences.
                if pairs.iter().all(|(key, _)| matches!(key, Value::Text(_))) {
                    let mut inner = DocumentWriter { buf: Vec::new() };
                    for (key, item) in pairs {
                        if let Value::Text(name) = key {
                            inner.buf.push(codes::FIELD_NAME_ANY);
                            inner.write_stop_bit_string(name);
                            inner.write_value(item);
                        }
                    }
                    self.write_block(&inner.buf);
                } else {
                    self.buf.push(codes::SEQUENCE_START);
                    for (key, item) in pairs {
                        self.buf.push(codes::SEQUENCE_START);
                        self.write_value(key);
                        self.write_value(item);
                        self.buf.push(codes::SEQUENCE_END);
                    }
                    self.buf.push(codes::SEQUENCE_END);
                }
            }
            Value::Nested(message) => {
                let mut inner = DocumentWriter { buf: Vec::new() };
                inner.write_document(message);
                self.write_block(&inner.buf);
            }
        }
    }

    fn write_block(&mut self, content: &[u8]) {
        self.buf.push(codes::NESTED_BLOCK);
        stop_bit::encode_u64(content.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(content);
    }

    fn write_stop_bit_string(&mut self, text: &str) {
        stop_bit::encode_u64(text.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(text.as_bytes());
    }
}
