//! Message schemas for payloads that are not self-describing.
//!
//! A registry is assembled by a builder (Java source, class bytecode, JSON,
//! or whole directories), then frozen. The frozen registry is immutable and
//! may be shared across reader sessions.

pub mod class_file;
pub mod java_source;
pub mod json;

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, SchemaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    SelfDescribingWire,
    Sbe,
    CompactTagged,
}

/// Where a class definition came from; source beats bytecode beats JSON
/// when the same class arrives from several places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaOrigin {
    Json,
    Bytecode,
    Source,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    /// Normalized primitive name (`int32`, `string`, ...) or, for nested
    /// structs, the referenced class name.
    pub declared_type: String,
    pub field_id: Option<i32>,
    pub sbe_offset: Option<usize>,
    pub sbe_length: Option<usize>,
    pub annotations: Vec<String>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            field_id: None,
            sbe_offset: None,
            sbe_length: None,
            annotations: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: i32) -> Self {
        self.field_id = Some(id);
        self
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self.declared_type.as_str(),
            "int8"
                | "int16"
                | "int32"
                | "int64"
                | "uint8"
                | "uint16"
                | "uint32"
                | "uint64"
                | "float32"
                | "float64"
                | "bool"
                | "string"
                | "bytes"
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDef {
    pub class_name: String,
    pub encoding: Option<Encoding>,
    pub template_id: Option<u16>,
    pub fields: Vec<SchemaField>,
    pub inner: Vec<SchemaDef>,
}

impl SchemaDef {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            encoding: None,
            template_id: None,
            fields: Vec::new(),
            inner: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(SchemaDef, SchemaOrigin)>,
    encoding_hint: Option<Encoding>,
    default_class: Option<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encoding_hint(&mut self, encoding: Encoding) -> &mut Self {
        self.encoding_hint = Some(encoding);
        self
    }

    pub fn default_class(&mut self, class_name: impl Into<String>) -> &mut Self {
        self.default_class = Some(class_name.into());
        self
    }

    pub fn add(&mut self, def: SchemaDef, origin: SchemaOrigin) -> &mut Self {
        self.entries.push((def, origin));
        self
    }

    /// Loads one schema artefact: `.java` source, `.class` bytecode, `.json`
    /// schema file, or a directory scanned recursively.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        let path = path.as_ref();
        if path.is_dir() {
            self.load_directory(path)?;
            return Ok(self);
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("java") => {
                for def in java_source::parse_file(path)? {
                    self.add(def, SchemaOrigin::Source);
                }
            }
            Some("class") => {
                for def in class_file::parse_file(path)? {
                    self.add(def, SchemaOrigin::Bytecode);
                }
            }
            Some("json") => {
                let parsed = json::parse_file(path)?;
                if let Some(default) = parsed.default_class {
                    if self.default_class.is_none() {
                        self.default_class = Some(default);
                    }
                }
                if let Some(encoding) = parsed.encoding {
                    if self.encoding_hint.is_none() {
                        self.encoding_hint = Some(encoding);
                    }
                }
                for def in parsed.classes {
                    self.add(def, SchemaOrigin::Json);
                }
            }
            _ => {
                return Err(SchemaError::UnsupportedFile(path.display().to_string()).into());
            }
        }
        Ok(self)
    }

    /// Recursive scan; paths are sorted so discovery order never changes the
    /// outcome.
    fn load_directory(&mut self, dir: &Path) -> Result<()> {
        let mut files = Vec::new();
        collect_schema_files(dir, &mut files)?;
        files.sort();
        for file in files {
            log::debug!("loading schema file {}", file.display());
            self.load(&file)?;
        }
        Ok(())
    }

    /// Resolves collisions, assigns missing compact field ids, builds the
    /// lookup indices, and produces the immutable registry.
    pub fn freeze(self) -> Result<SchemaRegistry> {
        let mut chosen: Vec<(SchemaDef, SchemaOrigin, bool)> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        let mut flat = Vec::new();
        for (def, origin) in self.entries {
            flatten_def(def, None, origin, &mut flat);
        }

        for (def, origin, is_alias) in flat {
            match by_name.get(&def.class_name) {
                None => {
                    by_name.insert(def.class_name.clone(), chosen.len());
                    chosen.push((def, origin, is_alias));
                }
                // A simple-name alias of an inner class always yields.
                Some(_) if is_alias => {}
                Some(&existing) => {
                    let held = chosen[existing].1;
                    let held_is_alias = chosen[existing].2;
                    if held_is_alias || origin > held {
                        chosen[existing] = (def, origin, false);
                    } else if origin == held {
                        return Err(SchemaError::DuplicateClass(def.class_name).into());
                    }
                }
            }
        }

        let default_encoding = self
            .encoding_hint
            .or_else(|| chosen.iter().find_map(|(def, _, _)| def.encoding))
            .unwrap_or(Encoding::SelfDescribingWire);

        let mut classes: Vec<SchemaDef> = chosen.into_iter().map(|(def, _, _)| def).collect();

        // Compact decoding addresses fields by id; absent explicit ids the
        // source order is the contract, starting at 1.
        if default_encoding == Encoding::CompactTagged {
            for class in &mut classes {
                if class.fields.iter().all(|field| field.field_id.is_none()) {
                    for (position, field) in class.fields.iter_mut().enumerate() {
                        field.field_id = Some(position as i32 + 1);
                    }
                }
            }
        }

        let mut by_name = HashMap::new();
        let mut by_template = HashMap::new();
        let mut field_ids = Vec::with_capacity(classes.len());
        for (class_index, class) in classes.iter().enumerate() {
            by_name.insert(class.class_name.clone(), class_index);
            if let Some(template) = class.template_id {
                by_template.insert(template, class_index);
            }
            let mut ids = HashMap::new();
            for (field_index, field) in class.fields.iter().enumerate() {
                if let Some(id) = field.field_id {
                    ids.insert(i64::from(id), field_index);
                }
            }
            field_ids.push(ids);
        }

        let default_class = match &self.default_class {
            Some(name) => Some(*by_name.get(name).ok_or_else(|| {
                crate::error::Error::from(SchemaError::MissingClass(name.clone()))
            })?),
            None if classes.len() == 1 => Some(0),
            None => None,
        };

        Ok(SchemaRegistry {
            classes,
            by_name,
            by_template,
            field_ids,
            default_encoding,
            default_class,
        })
    }
}

/// Registers a class and its inner classes. Inner classes are reachable both
/// by their qualified `Outer.Inner` name and, when unambiguous, their simple
/// name.
fn flatten_def(
    mut def: SchemaDef,
    outer: Option<&str>,
    origin: SchemaOrigin,
    out: &mut Vec<(SchemaDef, SchemaOrigin, bool)>,
) {
    let inner = std::mem::take(&mut def.inner);
    let simple = def.class_name.clone();
    let qualified = match outer {
        Some(outer) => format!("{outer}.{simple}"),
        None => simple.clone(),
    };
    def.class_name = qualified.clone();
    out.push((def.clone(), origin, false));
    if outer.is_some() {
        def.class_name = simple;
        out.push((def, origin, true));
    }
    for child in inner {
        flatten_def(child, Some(&qualified), origin, out);
    }
}

fn collect_schema_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_schema_files(&path, out)?;
            continue;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("java" | "class" | "json") => out.push(path),
            _ => {}
        }
    }
    Ok(())
}

/// Frozen, shareable schema lookup.
#[derive(Debug)]
pub struct SchemaRegistry {
    classes: Vec<SchemaDef>,
    by_name: HashMap<String, usize>,
    by_template: HashMap<u16, usize>,
    field_ids: Vec<HashMap<i64, usize>>,
    default_encoding: Encoding,
    default_class: Option<usize>,
}

impl SchemaRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// One-shot convenience: load a file or directory and freeze.
    pub fn load(path: impl AsRef<Path>, encoding_hint: Option<Encoding>) -> Result<Self> {
        let mut builder = RegistryBuilder::new();
        if let Some(encoding) = encoding_hint {
            builder.encoding_hint(encoding);
        }
        builder.load(path)?;
        builder.freeze()
    }

    pub fn default_encoding(&self) -> Encoding {
        self.default_encoding
    }

    pub fn classes(&self) -> &[SchemaDef] {
        &self.classes
    }

    /// Looks a class up by name; `!pkg.Name` type hints resolve by their
    /// final segment.
    pub fn query(&self, class_name: &str) -> Option<&SchemaDef> {
        if let Some(&index) = self.by_name.get(class_name) {
            return Some(&self.classes[index]);
        }
        let trimmed = class_name.trim_start_matches('!');
        let simple = trimmed.rsplit('.').next().unwrap_or(trimmed);
        self.by_name.get(simple).map(|&index| &self.classes[index])
    }

    pub fn by_template(&self, template_id: u16) -> Option<&SchemaDef> {
        self.by_template
            .get(&template_id)
            .map(|&index| &self.classes[index])
    }

    pub fn has_templates(&self) -> bool {
        !self.by_template.is_empty()
    }

    pub fn default_class(&self) -> Option<&SchemaDef> {
        self.default_class.map(|index| &self.classes[index])
    }

    /// Field lookup by compact field id within a class.
    pub fn field_by_id<'c>(&self, class: &'c SchemaDef, id: i64) -> Option<&'c SchemaField> {
        let class_index = *self.by_name.get(&class.class_name)?;
        let field_index = *self.field_ids.get(class_index)?.get(&id)?;
        class.fields.get(field_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_def() -> SchemaDef {
        let mut def = SchemaDef::new("Order");
        def.fields.push(SchemaField::new("id", "int64"));
        def.fields.push(SchemaField::new("qty", "int32"));
        def
    }

    #[test]
    fn single_class_becomes_default() {
        let mut builder = RegistryBuilder::new();
        builder.add(order_def(), SchemaOrigin::Source);
        let registry = builder.freeze().unwrap();
        assert_eq!(registry.default_class().unwrap().class_name, "Order");
    }

    #[test]
    fn compact_ids_assigned_in_order() {
        let mut builder = RegistryBuilder::new();
        builder.encoding_hint(Encoding::CompactTagged);
        builder.add(order_def(), SchemaOrigin::Source);
        let registry = builder.freeze().unwrap();

        let order = registry.query("Order").unwrap();
        assert_eq!(order.fields[0].field_id, Some(1));
        assert_eq!(order.fields[1].field_id, Some(2));
        assert_eq!(registry.field_by_id(order, 2).unwrap().name, "qty");
    }

    #[test]
    fn source_wins_over_bytecode() {
        let mut from_source = order_def();
        from_source.fields.push(SchemaField::new("extra", "int8"));
        let from_bytecode = order_def();

        let mut builder = RegistryBuilder::new();
        builder.add(from_bytecode, SchemaOrigin::Bytecode);
        builder.add(from_source, SchemaOrigin::Source);
        let registry = builder.freeze().unwrap();
        assert_eq!(registry.query("Order").unwrap().fields.len(), 3);

        // Same result the other way around.
        let mut builder = RegistryBuilder::new();
        let mut from_source = order_def();
        from_source.fields.push(SchemaField::new("extra", "int8"));
        builder.add(from_source, SchemaOrigin::Source);
        builder.add(order_def(), SchemaOrigin::Bytecode);
        let registry = builder.freeze().unwrap();
        assert_eq!(registry.query("Order").unwrap().fields.len(), 3);
    }

    #[test]
    fn same_origin_duplicate_is_an_error() {
        let mut builder = RegistryBuilder::new();
        builder.add(order_def(), SchemaOrigin::Source);
        builder.add(order_def(), SchemaOrigin::Source);
        assert!(matches!(
            builder.freeze(),
            Err(crate::error::Error::Schema(SchemaError::DuplicateClass(name))) if name == "Order"
        ));
    }

    #[test]
    fn query_resolves_type_hints() {
        let mut builder = RegistryBuilder::new();
        builder.add(order_def(), SchemaOrigin::Source);
        let registry = builder.freeze().unwrap();
        assert!(registry.query("!com.example.Order").is_some());
        assert!(registry.query("Trade").is_none());
    }

    #[test]
    fn inner_classes_register_qualified_and_simple() {
        let mut outer = SchemaDef::new("Trade");
        outer.fields.push(SchemaField::new("leg", "Leg"));
        let mut leg = SchemaDef::new("Leg");
        leg.fields.push(SchemaField::new("qty", "int32"));
        outer.inner.push(leg);

        let mut builder = RegistryBuilder::new();
        builder.add(outer, SchemaOrigin::Source);
        let registry = builder.freeze().unwrap();
        assert!(registry.query("Trade.Leg").is_some());
        assert!(registry.query("Leg").is_some());
    }

    #[test]
    fn template_index() {
        let mut def = order_def();
        def.template_id = Some(7);
        let mut builder = RegistryBuilder::new();
        builder.add(def, SchemaOrigin::Source);
        let registry = builder.freeze().unwrap();
        assert!(registry.has_templates());
        assert_eq!(registry.by_template(7).unwrap().class_name, "Order");
        assert!(registry.by_template(8).is_none());
    }
}
