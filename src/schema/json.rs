//! JSON schema files.
//!
//! ```json
//! {
//!     "encoding": "sbe",
//!     "default": "FxTick",
//!     "messages": {
//!         "FxTick": {
//!             "fields": [
//!                 {"name": "timestamp", "type": "int64"},
//!                 {"name": "bid", "type": "float64"},
//!                 {"name": "symbol", "type": "string"}
//!             ]
//!         }
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SchemaError};
use crate::schema::{Encoding, SchemaDef, SchemaField};

#[derive(Debug, Deserialize)]
struct JsonFile {
    #[serde(default)]
    messages: HashMap<String, JsonMessage>,
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonMessage {
    #[serde(default)]
    fields: Vec<JsonField>,
}

#[derive(Debug, Deserialize)]
struct JsonField {
    name: String,
    #[serde(rename = "type")]
    declared_type: String,
    #[serde(default)]
    id: Option<i32>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    length: Option<usize>,
}

pub struct ParsedJson {
    pub classes: Vec<SchemaDef>,
    pub default_class: Option<String>,
    pub encoding: Option<Encoding>,
}

pub fn parse_file(path: &Path) -> Result<ParsedJson> {
    let origin = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|err| SchemaError::Parse {
        path: origin.clone(),
        reason: err.to_string(),
    })?;
    parse_text(&text, &origin)
}

pub fn parse_text(text: &str, origin: &str) -> Result<ParsedJson> {
    let file: JsonFile = serde_json::from_str(text).map_err(|err| SchemaError::Parse {
        path: origin.to_string(),
        reason: err.to_string(),
    })?;

    let encoding = match file.encoding.as_deref() {
        None => None,
        Some(name) => Some(parse_encoding(name).ok_or_else(|| SchemaError::Parse {
            path: origin.to_string(),
            reason: format!("unknown encoding {name}"),
        })?),
    };

    // Class order inside a JSON object is not meaningful; sort for
    // deterministic registry contents.
    let mut names: Vec<&String> = file.messages.keys().collect();
    names.sort();
    let mut classes = Vec::with_capacity(names.len());
    for name in names {
        let message = &file.messages[name];
        let mut def = SchemaDef::new(name.clone());
        for field in &message.fields {
            let mut schema_field = SchemaField::new(field.name.clone(), field.declared_type.clone());
            schema_field.field_id = field.id;
            schema_field.sbe_offset = field.offset;
            schema_field.sbe_length = field.length;
            def.fields.push(schema_field);
        }
        def.encoding = encoding;
        classes.push(def);
    }

    Ok(ParsedJson {
        classes,
        default_class: file.default,
        encoding,
    })
}

fn parse_encoding(name: &str) -> Option<Encoding> {
    match name {
        // "binary" is the historical spelling for the self-describing wire.
        "binary" | "self_describing" => Some(Encoding::SelfDescribingWire),
        "thrift" | "compact_tagged" => Some(Encoding::CompactTagged),
        "sbe" => Some(Encoding::Sbe),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_messages_and_default() {
        let parsed = parse_text(
            r#"{
                "messages": {
                    "FxTick": {
                        "fields": [
                            {"name": "timestamp", "type": "int64"},
                            {"name": "bid", "type": "float64"},
                            {"name": "symbol", "type": "string"}
                        ]
                    },
                    "Order": {
                        "fields": [
                            {"name": "id", "type": "int64", "id": 1}
                        ]
                    }
                },
                "default": "FxTick",
                "encoding": "thrift"
            }"#,
            "schema.json",
        )
        .unwrap();

        assert_eq!(parsed.default_class.as_deref(), Some("FxTick"));
        assert_eq!(parsed.encoding, Some(Encoding::CompactTagged));
        assert_eq!(parsed.classes.len(), 2);
        let tick = parsed
            .classes
            .iter()
            .find(|c| c.class_name == "FxTick")
            .unwrap();
        assert_eq!(tick.fields.len(), 3);
        assert_eq!(tick.fields[0].name, "timestamp");
        let order = parsed
            .classes
            .iter()
            .find(|c| c.class_name == "Order")
            .unwrap();
        assert_eq!(order.fields[0].field_id, Some(1));
    }

    #[test]
    fn unknown_encoding_fails() {
        let err = parse_text(r#"{"messages": {}, "encoding": "protobuf"}"#, "s.json");
        assert!(err.is_err());
    }

    #[test]
    fn malformed_json_fails() {
        assert!(parse_text("{", "s.json").is_err());
    }
}
