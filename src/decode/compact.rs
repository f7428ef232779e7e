//! Compact tagged protocol decoder.
//!
//! Fields carry a one-byte header `(delta << 4) | type_nibble`; a whole zero
//! byte terminates a struct. A zero delta with a nonzero nibble means the
//! absolute field id follows as a zigzag varint. Field names and nested
//! struct classes resolve through the schema registry; fields with ids the
//! schema does not know are consumed and reported as warnings unless strict.

use crate::error::{DecodeError, DecodeKind, Error, Result, SchemaError};
use crate::message::{Field, Kind, Message, Value};
use crate::schema::{SchemaDef, SchemaRegistry};
use crate::stop_bit;

const TYPE_BOOL_TRUE: u8 = 1;
const TYPE_BOOL_FALSE: u8 = 2;
const TYPE_I8: u8 = 3;
const TYPE_I16: u8 = 4;
const TYPE_I32: u8 = 5;
const TYPE_I64: u8 = 6;
const TYPE_F64: u8 = 7;
const TYPE_STRING: u8 = 8;
const TYPE_BINARY: u8 = 9;
const TYPE_LIST: u8 = 10;
const TYPE_SET: u8 = 11;
const TYPE_MAP: u8 = 12;
const TYPE_STRUCT: u8 = 13;
const TYPE_STOP: u8 = 14;

pub struct CompactDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    registry: &'a SchemaRegistry,
    strict: bool,
    lossy: bool,
    depth: u32,
    max_depth: u32,
    index: u64,
    offset: u64,
    kind: Kind,
}

impl<'a> CompactDecoder<'a> {
    pub fn new(data: &'a [u8], registry: &'a SchemaRegistry, max_depth: u32) -> Self {
        Self {
            data,
            pos: 0,
            registry,
            strict: false,
            lossy: false,
            depth: 0,
            max_depth,
            index: 0,
            offset: 0,
            kind: Kind::Data,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self.lossy = !strict;
        self
    }

    pub fn with_context(mut self, index: u64, offset: u64, kind: Kind) -> Self {
        self.index = index;
        self.offset = offset;
        self.kind = kind;
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Decodes the payload as one struct of `class` (None decodes with
    /// positional `field_N` names). Decode failures attach to the message in
    /// lossy mode; schema failures always abort.
    pub fn decode(&mut self, class: Option<&SchemaDef>) -> Result<Message> {
        let mut message = Message::new(self.index, self.offset, self.kind);
        if let Some(class) = class {
            message.type_name = class.class_name.clone();
        }
        match self.read_struct_fields(class, &mut message) {
            Ok(()) => Ok(message),
            Err(Error::Decode(err)) if self.lossy => {
                message.decode_error = Some(err);
                Ok(message)
            }
            Err(err) => Err(err),
        }
    }

    fn read_struct_fields(
        &mut self,
        class: Option<&SchemaDef>,
        message: &mut Message,
    ) -> Result<()> {
        let mut last_id: i64 = 0;
        while self.pos < self.data.len() {
            let header_pos = self.pos;
            let header = self.data[self.pos];
            self.pos += 1;
            if header == 0 {
                break;
            }

            let delta = (header >> 4) & 0x0F;
            let wire_type = header & 0x0F;
            if wire_type == TYPE_STOP {
                break;
            }

            let id = if delta == 0 {
                self.read_zigzag()?
            } else {
                last_id + i64::from(delta)
            };
            last_id = id;

            let field_def = class.and_then(|c| self.registry.field_by_id(c, id));
            let declared = field_def.map(|f| f.declared_type.clone());
            let value = self.read_value(wire_type, declared.as_deref(), header_pos)?;

            match field_def {
                Some(def) => {
                    let mut field = Field::new(def.name.clone(), value);
                    field.declared_type = Some(def.declared_type.clone());
                    message.push_field(field);
                }
                None if class.is_none() => {
                    message.push_field(Field::new(format!("field_{id}"), value));
                }
                None if self.strict => {
                    return Err(
                        DecodeError::new(DecodeKind::UnknownFieldId(id), header_pos).into()
                    );
                }
                None => {
                    message.warn(format!("unknown field id {id} skipped"), header_pos);
                }
            }
        }
        Ok(())
    }

    fn read_value(&mut self, wire_type: u8, declared: Option<&str>, at: usize) -> Result<Value> {
        match wire_type {
            TYPE_BOOL_TRUE => Ok(Value::Bool(true)),
            TYPE_BOOL_FALSE => Ok(Value::Bool(false)),
            TYPE_I8 => {
                let byte = self.read_u8()?;
                Ok(Value::Int64(byte as i8 as i64))
            }
            TYPE_I16 | TYPE_I32 | TYPE_I64 => Ok(Value::Int64(self.read_zigzag()?)),
            TYPE_F64 => {
                let bytes = self.read_exact(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Ok(Value::Float64(f64::from_le_bytes(raw)))
            }
            TYPE_STRING => {
                let len = self.read_varint_len()?;
                let start = self.pos;
                let bytes = self.read_exact(len)?;
                String::from_utf8(bytes.to_vec())
                    .map(Value::Text)
                    .map_err(|_| DecodeError::new(DecodeKind::InvalidUtf8, start).into())
            }
            TYPE_BINARY => {
                let len = self.read_varint_len()?;
                Ok(Value::Bytes(self.read_exact(len)?.to_vec()))
            }
            TYPE_LIST => self.read_collection(at).map(Value::List),
            TYPE_SET => self.read_collection(at).map(Value::Set),
            TYPE_MAP => self.read_map(at),
            TYPE_STRUCT => self.read_nested_struct(declared, at),
            _ => Err(DecodeError::new(DecodeKind::MalformedHeader, at).into()),
        }
    }

    /// List/set header: `(size << 4) | elem_type`, size 15 escapes to a
    /// varint for real sizes of 15 and up.
    fn read_collection(&mut self, at: usize) -> Result<Vec<Value>> {
        let header = self.read_u8()?;
        let elem_type = header & 0x0F;
        let mut size = usize::from(header >> 4);
        if size == 15 {
            size = self.read_varint_len()?;
        }
        let mut items = Vec::with_capacity(size.min(1024));
        for _ in 0..size {
            items.push(self.read_value(elem_type, None, at)?);
        }
        Ok(items)
    }

    /// Map header: `(key_type << 4) | value_type`, then a varint size, then
    /// the pairs.
    fn read_map(&mut self, at: usize) -> Result<Value> {
        let header = self.read_u8()?;
        let key_type = header >> 4;
        let value_type = header & 0x0F;
        let size = self.read_varint_len()?;
        let mut pairs = Vec::with_capacity(size.min(1024));
        for _ in 0..size {
            let key = self.read_value(key_type, None, at)?;
            let value = self.read_value(value_type, None, at)?;
            pairs.push((key, value));
        }
        Ok(Value::Map(pairs))
    }

    /// A nested struct resolves its class through the field's declared type.
    /// A declared type the registry cannot resolve is a schema failure; only
    /// undeclared structs (unknown-field skips, schemaless decoding) fall
    /// back to positional `field_N` names.
    fn read_nested_struct(&mut self, declared: Option<&str>, at: usize) -> Result<Value> {
        if self.depth + 1 > self.max_depth {
            return Err(DecodeError::new(DecodeKind::DepthExceeded, at).into());
        }
        let class = match declared {
            Some(name) => match self.registry.query(name) {
                Some(class) => Some(class),
                None => return Err(SchemaError::MissingClass(name.to_string()).into()),
            },
            None => None,
        };
        self.depth += 1;
        let mut nested = Message::new(self.index, self.offset, self.kind);
        if let Some(class) = class {
            nested.type_name = class.class_name.clone();
        }
        let result = self.read_struct_fields(class, &mut nested);
        self.depth -= 1;
        result?;
        Ok(Value::Nested(Box::new(nested)))
    }

    fn read_zigzag(&mut self) -> Result<i64> {
        let (value, consumed) = stop_bit::decode_i64(self.data, self.pos)?;
        self.pos += consumed;
        Ok(value)
    }

    fn read_varint_len(&mut self) -> Result<usize> {
        let at = self.pos;
        let (value, consumed) = stop_bit::decode_u64(self.data, self.pos)?;
        self.pos += consumed;
        usize::try_from(value)
            .map_err(|_| DecodeError::new(DecodeKind::MalformedHeader, at).into())
    }

    fn read_u8(&mut self) -> Result<u8> {
        match self.data.get(self.pos) {
            Some(byte) => {
                self.pos += 1;
                Ok(*byte)
            }
            None => Err(DecodeError::new(DecodeKind::Truncated, self.pos).into()),
        }
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(DecodeError::new(DecodeKind::Truncated, self.pos).into());
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RegistryBuilder, SchemaDef, SchemaField, SchemaOrigin};

    fn registry_with(def: SchemaDef) -> SchemaRegistry {
        let mut builder = RegistryBuilder::new();
        builder.add(def, SchemaOrigin::Source);
        builder.freeze().unwrap()
    }

    fn order_schema() -> SchemaRegistry {
        let mut def = SchemaDef::new("Order");
        def.fields.push(SchemaField::new("a", "int32").with_id(1));
        def.fields.push(SchemaField::new("s", "string").with_id(2));
        registry_with(def)
    }

    #[test]
    fn delta_encoded_fields() {
        // id 1 (delta 1) i8 literal 4, id 2 (delta 1... wait header 0x28:
        // delta 2 jumps straight from 0) string "abc", stop.
        let registry = order_schema();
        let payload = [0x13, 0x04, 0x18, 0x03, b'a', b'b', b'c', 0x00];
        let mut decoder = CompactDecoder::new(&payload, &registry, 64);
        let message = decoder.decode(registry.default_class()).unwrap();

        assert_eq!(message.type_name, "Order");
        assert_eq!(message.field("a").unwrap().value, Value::Int64(4));
        assert_eq!(message.field("s").unwrap().value, Value::Text("abc".into()));
        assert_eq!(decoder.position(), payload.len());
    }

    #[test]
    fn long_form_field_ids() {
        // delta 0: id follows as zigzag varint (id 2 -> 0x04).
        let registry = order_schema();
        let payload = [0x08, 0x04, 0x02, b'h', b'i', 0x00];
        let mut decoder = CompactDecoder::new(&payload, &registry, 64);
        let message = decoder.decode(registry.default_class()).unwrap();
        assert_eq!(message.field("s").unwrap().value, Value::Text("hi".into()));
    }

    #[test]
    fn zigzag_ints() {
        let mut def = SchemaDef::new("P");
        def.fields.push(SchemaField::new("x", "int32").with_id(1));
        let registry = registry_with(def);
        // id 1, type 5 (i32 zigzag varint): -3 -> zigzag 5.
        let payload = [0x15, 0x05, 0x00];
        let mut decoder = CompactDecoder::new(&payload, &registry, 64);
        let message = decoder.decode(registry.default_class()).unwrap();
        assert_eq!(message.field("x").unwrap().value, Value::Int64(-3));
    }

    #[test]
    fn unknown_field_skipped_with_one_warning() {
        let registry = order_schema();
        // Known id 1, then unknown id 9 (delta 8) with an i16, then stop.
        let payload = [0x13, 0x07, 0x84, 0x08, 0x00];
        let mut decoder = CompactDecoder::new(&payload, &registry, 64);
        let message = decoder.decode(registry.default_class()).unwrap();

        assert_eq!(message.fields.len(), 1);
        assert_eq!(message.field("a").unwrap().value, Value::Int64(7));
        assert_eq!(message.warnings.len(), 1);
        assert!(message.warnings[0].detail.contains("field id 9"));
        // Cursor consumed the whole struct including the skipped value.
        assert_eq!(decoder.position(), payload.len());
    }

    #[test]
    fn unknown_field_fatal_in_strict_mode() {
        let registry = order_schema();
        // Field id 8 is not in the schema.
        let payload = [0x84, 0x12, 0x00];
        let mut decoder = CompactDecoder::new(&payload, &registry, 64).strict(true);
        match decoder.decode(registry.default_class()).unwrap_err() {
            Error::Decode(err) => assert_eq!(err.kind, DecodeKind::UnknownFieldId(8)),
            other => panic!("expected decode error, got {other}"),
        }
    }

    #[test]
    fn nested_struct_resolves_class_by_declared_type() {
        let mut leg = SchemaDef::new("Leg");
        leg.fields.push(SchemaField::new("qty", "int32").with_id(1));
        let mut order = SchemaDef::new("Order");
        order.fields.push(SchemaField::new("leg", "Leg").with_id(1));
        order.inner.push(leg);

        let mut builder = RegistryBuilder::new();
        builder.add(order, SchemaOrigin::Source);
        builder.default_class("Order");
        let registry = builder.freeze().unwrap();

        // id 1 struct { id 1 i32 zigzag 20 -> 40 } stop stop.
        let payload = [0x1D, 0x15, 40, 0x00, 0x00];
        let mut decoder = CompactDecoder::new(&payload, &registry, 64);
        let message = decoder.decode(registry.default_class()).unwrap();

        match &message.field("leg").unwrap().value {
            Value::Nested(nested) => {
                assert_eq!(nested.type_name, "Leg");
                assert_eq!(nested.field("qty").unwrap().value, Value::Int64(20));
            }
            other => panic!("expected nested, got {other:?}"),
        }
    }

    #[test]
    fn lists_sets_and_maps() {
        let mut def = SchemaDef::new("C");
        def.fields.push(SchemaField::new("xs", "object").with_id(1));
        def.fields.push(SchemaField::new("tags", "object").with_id(2));
        def.fields.push(SchemaField::new("m", "object").with_id(3));
        let registry = registry_with(def);

        let mut payload = vec![
            0x1A, // id 1, list
            0x23, // size 2, elem i8
            5, 6, 0x1B, // id 2, set
            0x11, // size 1, elem bool-true
            0x1C, // id 3, map
            0x85, // key string, value i32
            0x01, // size 1
            0x01, b'k', 0x06, // "k" -> zigzag 3
        ];
        payload.push(0x00);

        let mut decoder = CompactDecoder::new(&payload, &registry, 64);
        let message = decoder.decode(registry.default_class()).unwrap();

        assert_eq!(
            message.field("xs").unwrap().value,
            Value::List(vec![Value::Int64(5), Value::Int64(6)])
        );
        assert_eq!(
            message.field("tags").unwrap().value,
            Value::Set(vec![Value::Bool(true)])
        );
        assert_eq!(
            message.field("m").unwrap().value,
            Value::Map(vec![(Value::Text("k".into()), Value::Int64(3))])
        );
    }

    #[test]
    fn large_list_size_uses_varint_escape() {
        let mut def = SchemaDef::new("C");
        def.fields.push(SchemaField::new("xs", "object").with_id(1));
        let registry = registry_with(def);

        let mut payload = vec![0x1A, 0xF3, 16]; // list, size-escape, varint 16, elem i8
        payload.extend(std::iter::repeat(1u8).take(16));
        payload.push(0x00);

        let mut decoder = CompactDecoder::new(&payload, &registry, 64);
        let message = decoder.decode(registry.default_class()).unwrap();
        match &message.field("xs").unwrap().value {
            Value::List(items) => assert_eq!(items.len(), 16),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn truncated_string_is_fatal() {
        let registry = order_schema();
        let payload = [0x28, 0x05, b'a'];
        let mut decoder = CompactDecoder::new(&payload, &registry, 64).strict(true);
        match decoder.decode(registry.default_class()).unwrap_err() {
            Error::Decode(err) => assert_eq!(err.kind, DecodeKind::Truncated),
            other => panic!("expected decode error, got {other}"),
        }
    }

    #[test]
    fn missing_nested_class_is_a_schema_error() {
        let mut def = SchemaDef::new("Order");
        def.fields.push(SchemaField::new("leg", "Leg").with_id(1));
        let registry = registry_with(def);

        // id 1 struct { id 1 i8 0 } stop stop, but "Leg" is not registered.
        let payload = [0x1D, 0x13, 0x00, 0x00, 0x00];
        let mut decoder = CompactDecoder::new(&payload, &registry, 64);
        match decoder.decode(registry.default_class()).unwrap_err() {
            Error::Schema(SchemaError::MissingClass(name)) => assert_eq!(name, "Leg"),
            other => panic!("expected schema error, got {other}"),
        }

        // Lossy mode does not soften schema failures.
        let mut decoder = CompactDecoder::new(&payload, &registry, 64).strict(false);
        assert!(matches!(
            decoder.decode(registry.default_class()),
            Err(Error::Schema(SchemaError::MissingClass(_)))
        ));
    }

    #[test]
    fn lossy_mode_attaches_fatal_errors() {
        let registry = order_schema();
        let payload = [0x13, 0x07, 0x28, 0x05, b'a'];
        let mut decoder = CompactDecoder::new(&payload, &registry, 64).strict(false);
        let message = decoder.decode(registry.default_class()).unwrap();
        assert_eq!(message.field("a").unwrap().value, Value::Int64(7));
        assert_eq!(
            message.decode_error.as_ref().unwrap().kind,
            DecodeKind::Truncated
        );
    }
}
