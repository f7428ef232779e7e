//! Schema extraction from compiled class files.
//!
//! Reads just enough of the class-file format: constant pool, field table
//! with access flags and annotations, and the InnerClasses attribute so
//! sibling `Outer$Inner.class` files join the schema. All multi-byte values
//! are big-endian per the format.

use std::path::Path;

use crate::error::{Result, SchemaError};
use crate::schema::java_source::{detect_encoding, java_type_to_schema_type};
use crate::schema::{SchemaDef, SchemaField};

const MAGIC: u32 = 0xCAFE_BABE;

const ACC_STATIC: u16 = 0x0008;
const ACC_TRANSIENT: u16 = 0x0080;
const ACC_SYNTHETIC: u16 = 0x1000;

pub fn parse_file(path: &Path) -> Result<Vec<SchemaDef>> {
    let origin = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|err| SchemaError::Parse {
        path: origin.clone(),
        reason: err.to_string(),
    })?;
    let parsed = parse_bytes(&bytes, &origin)?;

    let mut def = parsed.def;
    // Inner classes live in sibling files named Outer$Inner.class.
    if let Some(dir) = path.parent() {
        let outer = def.class_name.clone();
        for inner_name in &parsed.inner_names {
            let sibling = dir.join(format!("{outer}${inner_name}.class"));
            if !sibling.is_file() {
                continue;
            }
            let inner_bytes = std::fs::read(&sibling).map_err(|err| SchemaError::Parse {
                path: sibling.display().to_string(),
                reason: err.to_string(),
            })?;
            let mut inner = parse_bytes(&inner_bytes, &sibling.display().to_string())?;
            inner.def.class_name = inner_name.clone();
            def.inner.push(inner.def);
        }
    }

    let encoding = detect_encoding(&parsed.referenced, &parsed.supers, std::slice::from_ref(&def));
    stamp(&mut def, encoding);
    Ok(vec![def])
}

fn stamp(def: &mut SchemaDef, encoding: crate::schema::Encoding) {
    def.encoding = Some(encoding);
    for inner in &mut def.inner {
        stamp(inner, encoding);
    }
}

#[derive(Debug)]
pub struct ParsedClass {
    pub def: SchemaDef,
    pub inner_names: Vec<String>,
    /// Dotted names of every class the constant pool references.
    pub referenced: Vec<String>,
    pub supers: Vec<String>,
}

enum Const {
    Utf8(String),
    Int(i64),
    Class(u16),
    Other,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    origin: &'a str,
}

impl<'a> Cursor<'a> {
    fn fail(&self, reason: &str) -> crate::error::Error {
        SchemaError::Parse {
            path: self.origin.to_string(),
            reason: format!("{reason} at byte {}", self.pos),
        }
        .into()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.bytes.len() {
            return Err(self.fail("truncated class file"));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

pub fn parse_bytes(bytes: &[u8], origin: &str) -> Result<ParsedClass> {
    let mut cur = Cursor {
        bytes,
        pos: 0,
        origin,
    };
    if cur.u32()? != MAGIC {
        return Err(cur.fail("bad class file magic"));
    }
    cur.u16()?; // minor
    cur.u16()?; // major

    let pool = read_constant_pool(&mut cur)?;

    cur.u16()?; // access flags
    let this_class = cur.u16()?;
    let super_class = cur.u16()?;
    let this_name =
        class_name_at(&pool, this_class).ok_or_else(|| cur.fail("missing this_class name"))?;
    let simple_name = this_name
        .rsplit('.')
        .next()
        .unwrap_or(&this_name)
        .rsplit('$')
        .next()
        .unwrap_or(&this_name)
        .to_string();

    let mut supers = Vec::new();
    if super_class != 0 {
        if let Some(name) = class_name_at(&pool, super_class) {
            if name != "java.lang.Object" {
                supers.push(name);
            }
        }
    }

    let interface_count = cur.u16()?;
    for _ in 0..interface_count {
        cur.u16()?;
    }

    let mut def = SchemaDef::new(simple_name);

    // Field table.
    let field_count = cur.u16()?;
    for _ in 0..field_count {
        let access = cur.u16()?;
        let name_index = cur.u16()?;
        let descriptor_index = cur.u16()?;
        let mut field = {
            let name = utf8_at(&pool, name_index).ok_or_else(|| cur.fail("missing field name"))?;
            let descriptor = utf8_at(&pool, descriptor_index)
                .ok_or_else(|| cur.fail("missing field descriptor"))?;
            SchemaField::new(name.clone(), descriptor_to_type(descriptor))
        };

        let attr_count = cur.u16()?;
        for _ in 0..attr_count {
            let attr_name_index = cur.u16()?;
            let attr_len = cur.u32()? as usize;
            let attr_is_annotations = utf8_at(&pool, attr_name_index)
                .is_some_and(|n| n == "RuntimeVisibleAnnotations");
            if attr_is_annotations {
                read_field_annotations(&mut cur, &pool, &mut field)?;
            } else {
                cur.take(attr_len)?;
            }
        }

        if access & (ACC_STATIC | ACC_TRANSIENT | ACC_SYNTHETIC) != 0 {
            continue;
        }
        if field.name.contains('$') {
            continue;
        }
        def.fields.push(field);
    }

    // Methods carry nothing we need; walk past them.
    let method_count = cur.u16()?;
    for _ in 0..method_count {
        cur.u16()?;
        cur.u16()?;
        cur.u16()?;
        let attr_count = cur.u16()?;
        for _ in 0..attr_count {
            cur.u16()?;
            let attr_len = cur.u32()? as usize;
            cur.take(attr_len)?;
        }
    }

    // Class attributes: InnerClasses and class-level annotations.
    let mut inner_names = Vec::new();
    let attr_count = cur.u16()?;
    for _ in 0..attr_count {
        let attr_name_index = cur.u16()?;
        let attr_len = cur.u32()? as usize;
        match utf8_at(&pool, attr_name_index).map(String::as_str) {
            Some("InnerClasses") => {
                let count = cur.u16()?;
                for _ in 0..count {
                    cur.u16()?; // inner_class_info
                    let outer_info = cur.u16()?;
                    let inner_name_index = cur.u16()?;
                    let inner_access = cur.u16()?;
                    let belongs_here = outer_info == this_class
                        || class_name_at(&pool, outer_info).as_deref()
                            == Some(this_name.as_str());
                    if belongs_here && inner_access & ACC_SYNTHETIC == 0 {
                        if let Some(name) = utf8_at(&pool, inner_name_index) {
                            inner_names.push(name.clone());
                        }
                    }
                }
            }
            Some("RuntimeVisibleAnnotations") => {
                let count = cur.u16()?;
                for _ in 0..count {
                    let annotation = read_annotation(&mut cur, &pool)?;
                    if annotation.name == "SbeTemplate" {
                        if let Some(id) = annotation.int_arg("id") {
                            def.template_id = u16::try_from(id).ok();
                        }
                    }
                }
            }
            _ => {
                cur.take(attr_len)?;
            }
        }
    }

    let mut referenced = Vec::new();
    for entry in &pool {
        if let Const::Class(name_index) = entry {
            if let Some(name) = utf8_at(&pool, *name_index) {
                referenced.push(name.replace('/', "."));
            }
        }
    }

    Ok(ParsedClass {
        def,
        inner_names,
        referenced,
        supers,
    })
}

fn utf8_at(pool: &[Const], index: u16) -> Option<&String> {
    match pool.get(index as usize) {
        Some(Const::Utf8(text)) => Some(text),
        _ => None,
    }
}

fn class_name_at(pool: &[Const], index: u16) -> Option<String> {
    match pool.get(index as usize) {
        Some(Const::Class(name_index)) => {
            utf8_at(pool, *name_index).map(|name| name.replace('/', "."))
        }
        _ => None,
    }
}

fn read_constant_pool(cur: &mut Cursor<'_>) -> Result<Vec<Const>> {
    let count = cur.u16()? as usize;
    let mut pool = Vec::with_capacity(count);
    pool.push(Const::Other); // index 0 is unused
    while pool.len() < count {
        let tag = cur.u8()?;
        match tag {
            1 => {
                let len = cur.u16()? as usize;
                let raw = cur.take(len)?;
                let text = String::from_utf8_lossy(raw).into_owned();
                pool.push(Const::Utf8(text));
            }
            3 => {
                let raw = cur.take(4)?;
                pool.push(Const::Int(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64));
            }
            4 => {
                cur.take(4)?;
                pool.push(Const::Other);
            }
            5 => {
                let raw = cur.take(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                pool.push(Const::Int(i64::from_be_bytes(buf)));
                pool.push(Const::Other); // longs take two slots
            }
            6 => {
                cur.take(8)?;
                pool.push(Const::Other);
                pool.push(Const::Other);
            }
            7 => {
                let name_index = cur.u16()?;
                pool.push(Const::Class(name_index));
            }
            8 | 16 | 19 | 20 => {
                cur.take(2)?;
                pool.push(Const::Other);
            }
            9 | 10 | 11 | 12 | 17 | 18 => {
                cur.take(4)?;
                pool.push(Const::Other);
            }
            15 => {
                cur.take(3)?;
                pool.push(Const::Other);
            }
            other => {
                return Err(cur.fail(&format!("unknown constant pool tag {other}")));
            }
        }
    }
    Ok(pool)
}

struct Annotation {
    name: String,
    int_args: Vec<(String, i64)>,
}

impl Annotation {
    fn int_arg(&self, key: &str) -> Option<i64> {
        self.int_args
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| *value)
    }
}

fn read_field_annotations(
    cur: &mut Cursor<'_>,
    pool: &[Const],
    field: &mut SchemaField,
) -> Result<()> {
    let count = cur.u16()?;
    for _ in 0..count {
        let annotation = read_annotation(cur, pool)?;
        match annotation.name.as_str() {
            "XField" => {
                if let Some(id) = annotation.int_arg("id") {
                    field.field_id = i32::try_from(id).ok();
                }
            }
            "SbeField" => {
                if let Some(offset) = annotation.int_arg("offset") {
                    field.sbe_offset = usize::try_from(offset).ok();
                }
                if let Some(length) = annotation.int_arg("length") {
                    field.sbe_length = usize::try_from(length).ok();
                }
            }
            _ => {}
        }
        field.annotations.push(annotation.name);
    }
    Ok(())
}

fn read_annotation(cur: &mut Cursor<'_>, pool: &[Const]) -> Result<Annotation> {
    let type_index = cur.u16()?;
    let descriptor = match pool.get(type_index as usize) {
        Some(Const::Utf8(text)) => text.as_str(),
        _ => "",
    };
    // "Lcom/example/XField;" -> "XField"
    let name = descriptor
        .trim_start_matches('L')
        .trim_end_matches(';')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string();

    let mut int_args = Vec::new();
    let pair_count = cur.u16()?;
    for _ in 0..pair_count {
        let name_index = cur.u16()?;
        let key = match pool.get(name_index as usize) {
            Some(Const::Utf8(text)) => text.clone(),
            _ => String::new(),
        };
        if let Some(value) = read_element_value(cur, pool)? {
            int_args.push((key, value));
        }
    }
    Ok(Annotation { name, int_args })
}

/// Walks one element_value, returning integral constants and skipping the
/// rest structurally.
fn read_element_value(cur: &mut Cursor<'_>, pool: &[Const]) -> Result<Option<i64>> {
    let tag = cur.u8()? as char;
    match tag {
        'B' | 'C' | 'I' | 'S' | 'Z' | 'J' => {
            let index = cur.u16()?;
            Ok(match pool.get(index as usize) {
                Some(Const::Int(value)) => Some(*value),
                _ => None,
            })
        }
        'D' | 'F' | 's' | 'c' => {
            cur.u16()?;
            Ok(None)
        }
        'e' => {
            cur.u16()?;
            cur.u16()?;
            Ok(None)
        }
        '@' => {
            read_annotation(cur, pool)?;
            Ok(None)
        }
        '[' => {
            let count = cur.u16()?;
            for _ in 0..count {
                read_element_value(cur, pool)?;
            }
            Ok(None)
        }
        other => Err(cur.fail(&format!("unknown element value tag {other}"))),
    }
}

fn descriptor_to_type(descriptor: &str) -> String {
    match descriptor {
        "B" => "int8".into(),
        "S" => "int16".into(),
        "I" => "int32".into(),
        "J" => "int64".into(),
        "F" => "float32".into(),
        "D" => "float64".into(),
        "Z" => "bool".into(),
        "C" => "uint16".into(),
        "[B" => "bytes".into(),
        other => {
            if let Some(class) = other.strip_prefix('L').and_then(|r| r.strip_suffix(';')) {
                let simple = class.rsplit('/').next().unwrap_or(class);
                return java_type_to_schema_type(&simple.replace('$', "."));
            }
            "object".into()
        }
    }
}
