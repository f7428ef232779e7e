//! Self-describing wire decoder.
//!
//! A single forward cursor over one excerpt payload. Field names arrive
//! either inline (compact or length-prefixed) or through a per-document
//! intern table addressed by anchor codes. Values carry their own type
//! codes; nesting recurses with a bounded depth.

use crate::error::{DecodeError, DecodeKind};
use crate::message::{Field, Kind, Message, Value};
use crate::stop_bit;
use crate::wire::codes;

/// Intern table bound: anchor ids are one stop-bit byte in practice.
const MAX_INTERNED_NAMES: usize = 128;

const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_DAY: i64 = 86_400_000_000_000;

pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// End of the region currently being parsed; nested blocks shrink it.
    limit: usize,
    depth: u32,
    max_depth: u32,
    interned: Vec<Option<String>>,
    /// Lossy mode attaches the failure to the message instead of failing the
    /// call, keeping every field decoded before the failure point.
    lossy: bool,
    index: u64,
    offset: u64,
    kind: Kind,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8], max_depth: u32) -> Self {
        Self {
            data,
            pos: 0,
            limit: data.len(),
            depth: 0,
            max_depth,
            interned: Vec::new(),
            lossy: false,
            index: 0,
            offset: 0,
            kind: Kind::Data,
        }
    }

    pub fn lossy(mut self, lossy: bool) -> Self {
        self.lossy = lossy;
        self
    }

    /// Excerpt context stamped onto every message this reader produces,
    /// nested ones included.
    pub fn with_context(mut self, index: u64, offset: u64, kind: Kind) -> Self {
        self.index = index;
        self.offset = offset;
        self.kind = kind;
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// Parses one complete document. The first meaningful byte picks the
    /// framing: a field-name code means tagged (name, value) pairs, anything
    /// else an anonymous value sequence.
    pub fn read_document(&mut self) -> Result<Message, DecodeError> {
        let mut message = Message::new(self.index, self.offset, self.kind);
        match self.read_document_into(&mut message) {
            Ok(()) => Ok(message),
            Err(err) if self.lossy => {
                message.decode_error = Some(err);
                Ok(message)
            }
            Err(err) => Err(err),
        }
    }

    fn read_document_into(&mut self, message: &mut Message) -> Result<(), DecodeError> {
        self.skip_filler()?;
        if self.peek() == Some(codes::EVENT_OBJECT) {
            self.pos += 1;
            self.skip_filler()?;
        }
        if self.peek() == Some(codes::TYPE_PREFIX) {
            self.pos += 1;
            message.type_name = self.read_stop_bit_string()?;
            self.skip_filler()?;
        }

        let tagged = match self.peek() {
            Some(code) => codes::is_field_name_code(code),
            None => return Ok(()),
        };

        if tagged {
            self.read_tagged_fields(message)?;
        } else {
            self.read_untagged_fields(message)?;
        }
        Ok(())
    }

    fn read_tagged_fields(&mut self, message: &mut Message) -> Result<(), DecodeError> {
        while self.remaining() > 0 {
            self.skip_filler()?;
            let code = match self.peek() {
                Some(code) => code,
                None => break,
            };
            if code == codes::PADDING_END {
                self.pos += 1;
                break;
            }
            if !codes::is_field_name_code(code) {
                if codes::is_known(code) {
                    // Document content ends where field framing stops.
                    break;
                }
                return Err(DecodeError::new(
                    DecodeKind::UnknownTypeCode(code),
                    self.pos,
                ));
            }
            let name = self.read_field_name()?;
            let value = self
                .read_value()
                .map_err(|err| err.at_field(name.as_str()))?;
            message.push_field(Field::new(name, value));
        }
        Ok(())
    }

    fn read_untagged_fields(&mut self, message: &mut Message) -> Result<(), DecodeError> {
        while self.remaining() > 0 {
            self.skip_filler()?;
            match self.peek() {
                None => break,
                Some(codes::PADDING_END) => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {}
            }
            let value = self.read_value()?;
            message.push_field(Field::new("", value));
        }
        Ok(())
    }

    /// Skips padding, comments and hints wherever they are legal.
    fn skip_filler(&mut self) -> Result<(), DecodeError> {
        while self.remaining() > 0 {
            match self.peek() {
                Some(codes::PADDING) => self.pos += 1,
                Some(codes::PADDING32) => {
                    self.pos += 1;
                    let len = self.read_u32_le()? as usize;
                    self.skip(len)?;
                }
                Some(codes::COMMENT) => {
                    self.pos += 1;
                    let len = self.read_stop_bit()? as usize;
                    self.skip(len)?;
                }
                Some(codes::HINT) => {
                    self.pos += 1;
                    let len = self.read_stop_bit()? as usize;
                    self.skip(len)?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn read_field_name(&mut self) -> Result<String, DecodeError> {
        let start = self.pos;
        let code = self.read_u8()?;

        if codes::is_compact_field_name(code) {
            return self.read_utf8(codes::compact_field_name_len(code));
        }
        match code {
            codes::FIELD_NAME_ANY
            | codes::FIELD_NAME_LITERAL
            | codes::EVENT_NAME
            | codes::FIELD_NUMBER => self.read_stop_bit_string(),
            codes::FIELD_ANCHOR | codes::UPDATE_ALIAS => {
                let id = self.read_stop_bit()?;
                let name = self.read_stop_bit_string()?;
                self.intern(id, name.clone(), start)?;
                Ok(name)
            }
            codes::ANCHOR => {
                let id = self.read_stop_bit()?;
                self.interned
                    .get(id as usize)
                    .and_then(|slot| slot.clone())
                    .ok_or_else(|| DecodeError::new(DecodeKind::UnknownFieldRef(id), start))
            }
            other => Err(DecodeError::new(DecodeKind::UnknownTypeCode(other), start)),
        }
    }

    fn intern(&mut self, id: u64, name: String, at: usize) -> Result<(), DecodeError> {
        let slot = id as usize;
        if id >= MAX_INTERNED_NAMES as u64 {
            return Err(DecodeError::new(DecodeKind::UnknownFieldRef(id), at));
        }
        if self.interned.len() <= slot {
            self.interned.resize(slot + 1, None);
        }
        self.interned[slot] = Some(name);
        Ok(())
    }

    pub fn read_value(&mut self) -> Result<Value, DecodeError> {
        loop {
            let start = self.pos;
            let code = self.read_u8()?;

            if codes::is_compact_string(code) {
                let text = self.read_utf8(codes::compact_string_len(code))?;
                return Ok(Value::Text(text));
            }

            return match code {
                codes::PADDING => continue,
                codes::PADDING32 => {
                    let len = self.read_u32_le()? as usize;
                    self.skip(len)?;
                    continue;
                }
                codes::COMMENT | codes::HINT => {
                    let len = self.read_stop_bit()? as usize;
                    self.skip(len)?;
                    continue;
                }
                codes::NULL => Ok(Value::Null),
                codes::BOOL_TRUE => Ok(Value::Bool(true)),
                codes::BOOL_FALSE => Ok(Value::Bool(false)),

                codes::INT8 => Ok(Value::Int64(self.read_i8()? as i64)),
                codes::INT16 => Ok(Value::Int64(self.read_i16_le()? as i64)),
                codes::INT32 => Ok(Value::Int64(self.read_i32_le()? as i64)),
                codes::INT64 => Ok(Value::Int64(self.read_i64_le()?)),
                codes::UINT8 => Ok(Value::UInt64(self.read_u8()? as u64)),
                codes::UINT16 => Ok(Value::UInt64(self.read_u16_le()? as u64)),
                codes::UINT32 => Ok(Value::UInt64(self.read_u32_le()? as u64)),
                codes::UINT64 => Ok(Value::UInt64(self.read_u64_le()?)),

                codes::FLOAT32 => Ok(Value::Float64(self.read_f32_le()? as f64)),
                codes::FLOAT64 => Ok(Value::Float64(self.read_f64_le()?)),
                codes::FLOAT_STOP2 => self.read_scaled_signed(100.0),
                codes::FLOAT_STOP4 => self.read_scaled_signed(10_000.0),
                codes::FLOAT_STOP6 => self.read_scaled_signed(1_000_000.0),
                codes::FLOAT_SET_LOW0 => self.read_scaled_unsigned(1.0),
                codes::FLOAT_SET_LOW2 => self.read_scaled_unsigned(100.0),
                codes::FLOAT_SET_LOW4 => self.read_scaled_unsigned(10_000.0),

                codes::STRING8 => {
                    let len = self.read_u8()? as usize;
                    Ok(Value::Text(self.read_utf8(len)?))
                }
                codes::STRING16 => {
                    let len = self.read_u16_le()? as usize;
                    Ok(Value::Text(self.read_utf8(len)?))
                }
                codes::STRING_ANY => {
                    let len = self.read_stop_bit()? as usize;
                    Ok(Value::Text(self.read_utf8(len)?))
                }
                codes::BYTES_LENGTH32 => {
                    let len = self.read_u32_le()? as usize;
                    Ok(Value::Bytes(self.read_exact(len)?.to_vec()))
                }
                codes::U8_ARRAY => {
                    let len = self.read_i32_len(start)?;
                    Ok(Value::Bytes(self.read_exact(len)?.to_vec()))
                }
                codes::I8_ARRAY => {
                    let len = self.read_i32_len(start)?;
                    let mut items = Vec::with_capacity(len);
                    for _ in 0..len {
                        items.push(Value::Int64(self.read_i8()? as i64));
                    }
                    Ok(Value::List(items))
                }
                codes::I64_ARRAY => {
                    let count = self.read_i32_len(start)?;
                    let mut items = Vec::with_capacity(count);
                    for _ in 0..count {
                        items.push(Value::Int64(self.read_i64_le()?));
                    }
                    Ok(Value::List(items))
                }

                codes::TIMESTAMP => {
                    let raw = self.read_i64_le()?;
                    timestamp(raw, NANOS_PER_MILLI, start)
                }
                codes::DATE_TIME => Ok(Value::Timestamp(self.read_i64_le()?)),
                codes::ZONED_DATE_TIME | codes::TIME => {
                    let raw = self.read_i64_le()?;
                    timestamp(raw, NANOS_PER_MICRO, start)
                }
                codes::DATE => {
                    let raw = self.read_i64_le()?;
                    timestamp(raw, NANOS_PER_DAY, start)
                }
                codes::DURATION => Ok(Value::Int64(self.read_i64_le()?)),
                codes::UUID => {
                    let bytes = self.read_exact(16)?;
                    let mut raw = [0u8; 16];
                    raw.copy_from_slice(bytes);
                    Ok(Value::Uuid(u128::from_be_bytes(raw)))
                }

                codes::NESTED_BLOCK => self.read_nested_block(start),
                codes::SEQUENCE_START => self.read_sequence(start),
                codes::TYPE_PREFIX => {
                    let type_name = self.read_stop_bit_string()?;
                    let value = self.read_value()?;
                    Ok(match value {
                        Value::Nested(mut message) => {
                            message.type_name = type_name;
                            Value::Nested(message)
                        }
                        other => other,
                    })
                }
                codes::EVENT_OBJECT => continue,

                other => Err(DecodeError::new(DecodeKind::UnknownTypeCode(other), start)),
            };
        }
    }

    /// A nested block: stop-bit length then either a document (field-name or
    /// type-prefix first) or an anonymous value list. The depth check runs
    /// before the length so a violation consumes only the start code.
    fn read_nested_block(&mut self, start: usize) -> Result<Value, DecodeError> {
        if self.depth + 1 > self.max_depth {
            return Err(DecodeError::new(DecodeKind::DepthExceeded, start));
        }
        let len = self.read_stop_bit()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.limit)
            .ok_or_else(|| DecodeError::new(DecodeKind::Truncated, start))?;

        let outer_limit = self.limit;
        self.limit = end;
        self.depth += 1;

        let result = (|| {
            self.skip_filler()?;
            let document = match self.peek() {
                Some(code)
                    if codes::is_field_name_code(code) || code == codes::TYPE_PREFIX =>
                {
                    true
                }
                _ => false,
            };
            if document {
                let nested = self.read_document()?;
                Ok(Value::Nested(Box::new(nested)))
            } else {
                let mut items = Vec::new();
                loop {
                    self.skip_filler()?;
                    if self.remaining() == 0 {
                        break;
                    }
                    items.push(self.read_value()?);
                }
                Ok(Value::List(items))
            }
        })();

        self.depth -= 1;
        self.limit = outer_limit;
        if result.is_ok() {
            self.pos = end;
        }
        result
    }

    fn read_sequence(&mut self, start: usize) -> Result<Value, DecodeError> {
        if self.depth + 1 > self.max_depth {
            return Err(DecodeError::new(DecodeKind::DepthExceeded, start));
        }
        self.depth += 1;
        let result = (|| {
            let mut items = Vec::new();
            loop {
                self.skip_filler()?;
                match self.peek() {
                    None => {
                        return Err(DecodeError::new(DecodeKind::Truncated, self.pos));
                    }
                    Some(codes::SEQUENCE_END) => {
                        self.pos += 1;
                        return Ok(Value::List(items));
                    }
                    Some(_) => items.push(self.read_value()?),
                }
            }
        })();
        self.depth -= 1;
        result
    }

    fn read_scaled_signed(&mut self, divisor: f64) -> Result<Value, DecodeError> {
        let (value, consumed) = stop_bit::decode_i64(&self.data[..self.limit], self.pos)?;
        self.pos += consumed;
        Ok(Value::Float64(value as f64 / divisor))
    }

    fn read_scaled_unsigned(&mut self, divisor: f64) -> Result<Value, DecodeError> {
        let value = self.read_stop_bit()?;
        Ok(Value::Float64(value as f64 / divisor))
    }

    // Cursor primitives. Every one fails with the position it could not read.

    fn peek(&self) -> Option<u8> {
        if self.pos < self.limit {
            Some(self.data[self.pos])
        } else {
            None
        }
    }

    fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        if self.pos + len > self.limit {
            return Err(DecodeError::new(DecodeKind::Truncated, self.pos));
        }
        self.pos += len;
        Ok(())
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + len > self.limit {
            return Err(DecodeError::new(DecodeKind::Truncated, self.pos));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_utf8(&mut self, len: usize) -> Result<String, DecodeError> {
        let at = self.pos;
        let bytes = self.read_exact(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::new(DecodeKind::InvalidUtf8, at))
    }

    fn read_stop_bit(&mut self) -> Result<u64, DecodeError> {
        let (value, consumed) = stop_bit::decode_u64(&self.data[..self.limit], self.pos)?;
        self.pos += consumed;
        Ok(value)
    }

    fn read_stop_bit_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_stop_bit()? as usize;
        self.read_utf8(len)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        match self.peek() {
            Some(byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => Err(DecodeError::new(DecodeKind::Truncated, self.pos)),
        }
    }

    fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_exact(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_i16_le(&mut self) -> Result<i16, DecodeError> {
        Ok(self.read_u16_le()? as i16)
    }

    fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_exact(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_u32_le()? as i32)
    }

    fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_exact(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn read_i64_le(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64_le()? as i64)
    }

    fn read_f32_le(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    fn read_f64_le(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_u64_le()?))
    }

    fn read_i32_len(&mut self, at: usize) -> Result<usize, DecodeError> {
        let raw = self.read_i32_le()?;
        usize::try_from(raw).map_err(|_| DecodeError::new(DecodeKind::MalformedHeader, at))
    }
}

fn timestamp(raw: i64, scale: i64, at: usize) -> Result<Value, DecodeError> {
    raw.checked_mul(scale)
        .map(Value::Timestamp)
        .ok_or_else(|| DecodeError::new(DecodeKind::TimestampOverflow, at))
}
