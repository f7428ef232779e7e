//! Fixed-layout (SBE) decoder.
//!
//! Fields are read in declared order at their fixed widths, little-endian.
//! Explicit offsets from the schema win over sequential packing. Strings
//! without a declared length use a u16 length prefix. When the registry
//! carries template ids, the 8-byte message header is consumed first and its
//! template id selects the class.

use crate::config::SbeHeaderLayout;
use crate::error::{DecodeError, DecodeKind, Error, Result, SchemaError};
use crate::message::{Field, Kind, Message, Value};
use crate::schema::{SchemaDef, SchemaField, SchemaRegistry};

pub const HEADER_SIZE: usize = 8;

pub struct SbeDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    registry: &'a SchemaRegistry,
    header_layout: SbeHeaderLayout,
    lossy: bool,
    index: u64,
    offset: u64,
    kind: Kind,
}

/// The fixed 8-byte header carried ahead of templated messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbeHeader {
    pub block_length: u16,
    pub template_id: u16,
    pub schema_id: u16,
    pub version: u16,
}

impl<'a> SbeDecoder<'a> {
    pub fn new(data: &'a [u8], registry: &'a SchemaRegistry) -> Self {
        Self {
            data,
            pos: 0,
            registry,
            header_layout: SbeHeaderLayout::BlockLengthFirst,
            lossy: false,
            index: 0,
            offset: 0,
            kind: Kind::Data,
        }
    }

    pub fn header_layout(mut self, layout: SbeHeaderLayout) -> Self {
        self.header_layout = layout;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.lossy = !strict;
        self
    }

    pub fn with_context(mut self, index: u64, offset: u64, kind: Kind) -> Self {
        self.index = index;
        self.offset = offset;
        self.kind = kind;
        self
    }

    /// Decodes one message. With templates registered the header picks the
    /// class; otherwise the registry default class drives the layout. Decode
    /// failures attach to the message in lossy mode; schema failures always
    /// abort.
    pub fn decode(&mut self) -> Result<Message> {
        let mut message = Message::new(self.index, self.offset, self.kind);
        match self.decode_into(&mut message) {
            Ok(()) => Ok(message),
            Err(Error::Decode(err)) if self.lossy => {
                message.decode_error = Some(err);
                Ok(message)
            }
            Err(err) => Err(err),
        }
    }

    fn decode_into(&mut self, message: &mut Message) -> Result<()> {
        let class = if self.registry.has_templates() {
            let header = self.read_header()?;
            match self.registry.by_template(header.template_id) {
                Some(class) => class,
                None => {
                    return Err(DecodeError::new(
                        DecodeKind::UnknownTemplate(header.template_id),
                        0,
                    )
                    .into())
                }
            }
        } else {
            match self.registry.default_class() {
                Some(class) => class,
                None => return Err(DecodeError::new(DecodeKind::MalformedHeader, 0).into()),
            }
        };

        message.type_name = class.class_name.clone();
        let body_start = self.pos;
        self.read_fields(class, body_start, message)
    }

    fn read_header(&mut self) -> Result<SbeHeader> {
        if self.data.len() < HEADER_SIZE {
            return Err(
                DecodeError::new(DecodeKind::PayloadTooShort("header".to_string()), 0).into(),
            );
        }
        let word = |at: usize| u16::from_le_bytes([self.data[at], self.data[at + 1]]);
        let (block_length, template_id) = match self.header_layout {
            SbeHeaderLayout::BlockLengthFirst => (word(0), word(2)),
            SbeHeaderLayout::TemplateIdFirst => (word(2), word(0)),
        };
        let header = SbeHeader {
            block_length,
            template_id,
            schema_id: word(4),
            version: word(6),
        };
        self.pos = HEADER_SIZE;
        Ok(header)
    }

    fn read_fields(
        &mut self,
        class: &SchemaDef,
        body_start: usize,
        message: &mut Message,
    ) -> Result<()> {
        for field_def in &class.fields {
            if let Some(offset) = field_def.sbe_offset {
                self.pos = body_start + offset;
            }
            let value = self.read_field_value(field_def)?;
            let mut field = Field::new(field_def.name.clone(), value);
            field.declared_type = Some(field_def.declared_type.clone());
            message.push_field(field);
        }
        Ok(())
    }

    fn read_field_value(&mut self, field_def: &SchemaField) -> Result<Value> {
        let name = field_def.name.as_str();
        let value = match field_def.declared_type.as_str() {
            "int8" => Value::Int64(self.fixed::<1>(name)?[0] as i8 as i64),
            "uint8" => Value::UInt64(self.fixed::<1>(name)?[0] as u64),
            "bool" => Value::Bool(self.fixed::<1>(name)?[0] != 0),
            "int16" => Value::Int64(i16::from_le_bytes(self.fixed::<2>(name)?) as i64),
            "uint16" => Value::UInt64(u16::from_le_bytes(self.fixed::<2>(name)?) as u64),
            "int32" => Value::Int64(i32::from_le_bytes(self.fixed::<4>(name)?) as i64),
            "uint32" => Value::UInt64(u32::from_le_bytes(self.fixed::<4>(name)?) as u64),
            "int64" => Value::Int64(i64::from_le_bytes(self.fixed::<8>(name)?)),
            "uint64" => Value::UInt64(u64::from_le_bytes(self.fixed::<8>(name)?)),
            "float32" => Value::Float64(f32::from_le_bytes(self.fixed::<4>(name)?) as f64),
            "float64" => Value::Float64(f64::from_le_bytes(self.fixed::<8>(name)?)),
            "string" => match field_def.sbe_length {
                Some(len) => self.fixed_string(name, len)?,
                None => self.prefixed_string(name)?,
            },
            "bytes" => match field_def.sbe_length {
                Some(len) => Value::Bytes(self.take(name, len)?.to_vec()),
                None => {
                    let len = self.u16_prefix(name)? as usize;
                    Value::Bytes(self.take(name, len)?.to_vec())
                }
            },
            other => {
                // Nested fixed block when the class is known. An unresolved
                // type has no knowable width, and guessing would misalign
                // every field after it.
                match self.registry.query(other) {
                    Some(nested_class) => {
                        let mut nested = Message::new(self.index, self.offset, self.kind);
                        nested.type_name = nested_class.class_name.clone();
                        let body_start = self.pos;
                        self.read_fields(nested_class, body_start, &mut nested)?;
                        Value::Nested(Box::new(nested))
                    }
                    None => {
                        return Err(SchemaError::MissingClass(other.to_string()).into());
                    }
                }
            }
        };
        Ok(value)
    }

    fn fixed<const N: usize>(&mut self, name: &str) -> Result<[u8; N]> {
        let slice = self.take(name, N)?;
        let mut raw = [0u8; N];
        raw.copy_from_slice(slice);
        Ok(raw)
    }

    fn take(&mut self, name: &str, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(DecodeError::new(
                DecodeKind::PayloadTooShort(name.to_string()),
                self.pos,
            )
            .into());
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u16_prefix(&mut self, name: &str) -> Result<u16> {
        let raw = self.fixed::<2>(name)?;
        Ok(u16::from_le_bytes(raw))
    }

    /// Fixed character block; trailing NULs are padding.
    fn fixed_string(&mut self, name: &str, len: usize) -> Result<Value> {
        let start = self.pos;
        let raw = self.take(name, len)?;
        let trimmed = match raw.iter().position(|b| *b == 0) {
            Some(end) => &raw[..end],
            None => raw,
        };
        String::from_utf8(trimmed.to_vec())
            .map(Value::Text)
            .map_err(|_| DecodeError::new(DecodeKind::InvalidUtf8, start).at_field(name).into())
    }

    fn prefixed_string(&mut self, name: &str) -> Result<Value> {
        let len = self.u16_prefix(name)? as usize;
        let start = self.pos;
        let raw = self.take(name, len)?;
        String::from_utf8(raw.to_vec())
            .map(Value::Text)
            .map_err(|_| DecodeError::new(DecodeKind::InvalidUtf8, start).at_field(name).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RegistryBuilder, SchemaDef, SchemaField, SchemaOrigin};

    fn registry_of(defs: Vec<SchemaDef>) -> SchemaRegistry {
        let mut builder = RegistryBuilder::new();
        for def in defs {
            builder.add(def, SchemaOrigin::Source);
        }
        builder.freeze().unwrap()
    }

    fn tick_schema() -> SchemaRegistry {
        let mut def = SchemaDef::new("Tick");
        def.fields.push(SchemaField::new("a", "int32"));
        def.fields.push(SchemaField::new("b", "int64"));
        def.fields.push(SchemaField::new("c", "string"));
        registry_of(vec![def])
    }

    #[test]
    fn declared_order_fixed_layout() {
        let registry = tick_schema();
        let mut payload = Vec::new();
        payload.extend_from_slice(&7i32.to_le_bytes());
        payload.extend_from_slice(&(-9i64).to_le_bytes());
        payload.extend_from_slice(&3u16.to_le_bytes());
        payload.extend_from_slice(b"abc");

        let message = SbeDecoder::new(&payload, &registry).decode().unwrap();
        assert_eq!(message.type_name, "Tick");
        assert_eq!(message.field("a").unwrap().value, Value::Int64(7));
        assert_eq!(message.field("b").unwrap().value, Value::Int64(-9));
        assert_eq!(message.field("c").unwrap().value, Value::Text("abc".into()));
    }

    #[test]
    fn truncated_string_names_the_field() {
        let registry = tick_schema();
        let mut payload = Vec::new();
        payload.extend_from_slice(&7i32.to_le_bytes());
        payload.extend_from_slice(&9i64.to_le_bytes());
        payload.extend_from_slice(&4u16.to_le_bytes());
        payload.extend_from_slice(b"ab"); // two bytes short

        match SbeDecoder::new(&payload, &registry)
            .strict(true)
            .decode()
            .unwrap_err()
        {
            Error::Decode(err) => {
                assert_eq!(err.kind, DecodeKind::PayloadTooShort("c".to_string()));
            }
            other => panic!("expected decode error, got {other}"),
        }
    }

    #[test]
    fn template_header_selects_class() {
        let mut def = SchemaDef::new("ClassX");
        def.template_id = Some(7);
        def.fields.push(SchemaField::new("a", "int32"));
        let registry = registry_of(vec![def]);

        let mut payload = Vec::new();
        payload.extend_from_slice(&8u16.to_le_bytes()); // block length
        payload.extend_from_slice(&7u16.to_le_bytes()); // template id
        payload.extend_from_slice(&0u16.to_le_bytes()); // schema id
        payload.extend_from_slice(&0u16.to_le_bytes()); // version
        payload.extend_from_slice(&[0x07, 0x00, 0x00, 0x0A]);

        let message = SbeDecoder::new(&payload, &registry).decode().unwrap();
        assert_eq!(message.type_name, "ClassX");
        assert_eq!(
            message.field("a").unwrap().value,
            Value::Int64(0x0A000007)
        );
    }

    #[test]
    fn unknown_template_is_reported() {
        let mut def = SchemaDef::new("ClassX");
        def.template_id = Some(7);
        def.fields.push(SchemaField::new("a", "int32"));
        let registry = registry_of(vec![def]);

        let mut payload = Vec::new();
        payload.extend_from_slice(&8u16.to_le_bytes());
        payload.extend_from_slice(&9u16.to_le_bytes());
        payload.extend_from_slice(&[0u8; 4]);
        payload.extend_from_slice(&[0u8; 4]);

        match SbeDecoder::new(&payload, &registry)
            .strict(true)
            .decode()
            .unwrap_err()
        {
            Error::Decode(err) => assert_eq!(err.kind, DecodeKind::UnknownTemplate(9)),
            other => panic!("expected decode error, got {other}"),
        }
    }

    #[test]
    fn template_id_first_layout() {
        let mut def = SchemaDef::new("ClassX");
        def.template_id = Some(7);
        def.fields.push(SchemaField::new("a", "uint8"));
        let registry = registry_of(vec![def]);

        let mut payload = Vec::new();
        payload.extend_from_slice(&7u16.to_le_bytes()); // template id first
        payload.extend_from_slice(&1u16.to_le_bytes()); // block length
        payload.extend_from_slice(&[0u8; 4]);
        payload.push(42);

        let message = SbeDecoder::new(&payload, &registry)
            .header_layout(SbeHeaderLayout::TemplateIdFirst)
            .decode()
            .unwrap();
        assert_eq!(message.field("a").unwrap().value, Value::UInt64(42));
    }

    #[test]
    fn explicit_offsets_win() {
        let mut def = SchemaDef::new("Px");
        let mut late = SchemaField::new("late", "uint8");
        late.sbe_offset = Some(4);
        let mut early = SchemaField::new("early", "uint8");
        early.sbe_offset = Some(0);
        def.fields.push(late);
        def.fields.push(early);
        let registry = registry_of(vec![def]);

        let payload = [9u8, 0, 0, 0, 7u8];
        let message = SbeDecoder::new(&payload, &registry).decode().unwrap();
        assert_eq!(message.field("late").unwrap().value, Value::UInt64(7));
        assert_eq!(message.field("early").unwrap().value, Value::UInt64(9));
    }

    #[test]
    fn fixed_char_block_trims_nuls() {
        let mut def = SchemaDef::new("Sym");
        let mut field = SchemaField::new("symbol", "string");
        field.sbe_length = Some(8);
        def.fields.push(field);
        let registry = registry_of(vec![def]);

        let payload = [b'E', b'U', b'R', b'U', b'S', b'D', 0, 0];
        let message = SbeDecoder::new(&payload, &registry).decode().unwrap();
        assert_eq!(
            message.field("symbol").unwrap().value,
            Value::Text("EURUSD".into())
        );
    }

    #[test]
    fn nested_class_decodes_inline() {
        let mut leg = SchemaDef::new("Leg");
        leg.fields.push(SchemaField::new("qty", "int32"));
        let mut order = SchemaDef::new("Order");
        order.fields.push(SchemaField::new("id", "int64"));
        order.fields.push(SchemaField::new("leg", "Leg"));

        let mut builder = RegistryBuilder::new();
        builder.add(order, SchemaOrigin::Source);
        builder.add(leg, SchemaOrigin::Source);
        builder.default_class("Order");
        let registry = builder.freeze().unwrap();

        let mut payload = Vec::new();
        payload.extend_from_slice(&1i64.to_le_bytes());
        payload.extend_from_slice(&5i32.to_le_bytes());

        let message = SbeDecoder::new(&payload, &registry).decode().unwrap();
        match &message.field("leg").unwrap().value {
            Value::Nested(nested) => {
                assert_eq!(nested.field("qty").unwrap().value, Value::Int64(5));
            }
            other => panic!("expected nested, got {other:?}"),
        }
    }

    #[test]
    fn unresolvable_type_is_fatal() {
        // A type with no fixed width cannot be skipped without misaligning
        // every field behind it.
        let mut def = SchemaDef::new("Odd");
        def.fields.push(SchemaField::new("weird", "List"));
        def.fields.push(SchemaField::new("x", "uint8"));
        let registry = registry_of(vec![def]);

        let payload = [5u8];
        match SbeDecoder::new(&payload, &registry).decode().unwrap_err() {
            Error::Schema(SchemaError::MissingClass(name)) => assert_eq!(name, "List"),
            other => panic!("expected schema error, got {other}"),
        }
    }
}
