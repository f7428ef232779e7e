//! Schema extraction from Java-family class definition source.
//!
//! A deliberately small scanner: comments and string literals are blanked,
//! class bodies are brace-matched, field declarations are read statement by
//! statement and methods are skipped whole. Encoding hints come from
//! imports, the extends clause, and annotations.

use std::path::Path;

use crate::error::{Result, SchemaError};
use crate::schema::{Encoding, SchemaDef, SchemaField};

const MODIFIERS: &[&str] = &[
    "public",
    "protected",
    "private",
    "static",
    "final",
    "transient",
    "volatile",
    "abstract",
    "synchronized",
    "native",
    "strictfp",
];

/// Import marker of the compact tagged protocol's base classes.
const COMPACT_IMPORT_MARKER: &str = "org.apache.thrift";
/// Import markers of SBE-generated code.
const SBE_IMPORT_MARKERS: &[&str] = &["uk.co.real_logic.sbe", "org.agrona"];

pub fn parse_file(path: &Path) -> Result<Vec<SchemaDef>> {
    let text = std::fs::read_to_string(path).map_err(|err| SchemaError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    parse_source(&text, &path.display().to_string())
}

pub fn parse_source(text: &str, origin: &str) -> Result<Vec<SchemaDef>> {
    let stripped = blank_comments_and_literals(text);
    let imports = scan_imports(&stripped);
    let mut classes = Vec::new();
    let mut extends = Vec::new();
    scan_class_declarations(&stripped, origin, &mut classes, &mut extends)?;
    if classes.is_empty() {
        return Err(SchemaError::Parse {
            path: origin.to_string(),
            reason: "no class declaration found".to_string(),
        }
        .into());
    }

    let encoding = detect_encoding(&imports, &extends, &classes);
    for class in &mut classes {
        stamp_encoding(class, encoding);
    }
    Ok(classes)
}

pub fn detect_encoding(imports: &[String], extends: &[String], classes: &[SchemaDef]) -> Encoding {
    if imports.iter().any(|i| i.contains(COMPACT_IMPORT_MARKER))
        || extends.iter().any(|base| base.contains("TBase"))
    {
        return Encoding::CompactTagged;
    }
    let sbe_import = imports
        .iter()
        .any(|i| SBE_IMPORT_MARKERS.iter().any(|marker| i.contains(marker)));
    if sbe_import || any_sbe_annotation(classes) {
        return Encoding::Sbe;
    }
    Encoding::SelfDescribingWire
}

fn any_sbe_annotation(classes: &[SchemaDef]) -> bool {
    classes.iter().any(|class| {
        class.template_id.is_some()
            || class
                .fields
                .iter()
                .any(|field| field.annotations.iter().any(|a| a == "SbeField"))
            || any_sbe_annotation(&class.inner)
    })
}

fn stamp_encoding(class: &mut SchemaDef, encoding: Encoding) {
    class.encoding = Some(encoding);
    for inner in &mut class.inner {
        stamp_encoding(inner, encoding);
    }
}

/// Replaces comments and string/char literal contents with spaces so the
/// scanner never trips over braces or keywords inside them. Offsets are
/// preserved.
fn blank_comments_and_literals(text: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        Line,
        Block,
        Str,
        Char,
    }
    let mut out: Vec<u8> = Vec::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut state = State::Code;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = State::Line;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'/', Some(b'*')) => {
                    state = State::Block;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'"', _) => {
                    state = State::Str;
                    out.push(b'"');
                }
                (b'\'', _) => {
                    state = State::Char;
                    out.push(b'\'');
                }
                _ => out.push(b),
            },
            State::Line => {
                if b == b'\n' {
                    state = State::Code;
                    out.push(b'\n');
                } else {
                    out.push(b' ');
                }
            }
            State::Block => {
                if b == b'*' && next == Some(b'/') {
                    state = State::Code;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                out.push(if b == b'\n' { b'\n' } else { b' ' });
            }
            State::Str => match b {
                b'\\' => {
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                b'"' => {
                    state = State::Code;
                    out.push(b'"');
                }
                _ => out.push(b' '),
            },
            State::Char => match b {
                b'\\' => {
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                b'\'' => {
                    state = State::Code;
                    out.push(b'\'');
                }
                _ => out.push(b' '),
            },
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn scan_imports(text: &str) -> Vec<String> {
    let mut imports = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("import ") {
            let name = rest
                .trim_start_matches("static ")
                .trim_end_matches(';')
                .trim();
            imports.push(name.to_string());
        }
    }
    imports
}

/// Finds top-level class bodies and parses each; nested declarations recurse
/// inside `parse_class_body`.
fn scan_class_declarations(
    text: &str,
    origin: &str,
    out: &mut Vec<SchemaDef>,
    extends: &mut Vec<String>,
) -> Result<()> {
    let bytes = text.as_bytes();
    let mut statement = String::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ';' => {
                statement.clear();
                i += 1;
            }
            '{' => {
                let end = match_brace(bytes, i).ok_or_else(|| SchemaError::Parse {
                    path: origin.to_string(),
                    reason: "unbalanced braces".to_string(),
                })?;
                if let Some(decl) = parse_class_statement(&statement) {
                    let def = parse_class_body(&text[i + 1..end], decl, origin, extends)?;
                    out.push(def);
                }
                statement.clear();
                i = end + 1;
            }
            _ => {
                statement.push(c);
                i += 1;
            }
        }
    }
    Ok(())
}

struct ClassDecl {
    name: String,
    extends: Option<String>,
    template_id: Option<u16>,
}

/// Recognizes `[annotations] [modifiers] class Name [extends Base] ...`.
fn parse_class_statement(statement: &str) -> Option<ClassDecl> {
    let (annotations, rest) = take_annotations(statement);
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let class_at = tokens.iter().position(|t| *t == "class")?;
    if !tokens[..class_at].iter().all(|t| MODIFIERS.contains(t)) {
        return None;
    }
    let name = tokens.get(class_at + 1)?;
    if !is_identifier(name) {
        return None;
    }
    let extends = tokens
        .iter()
        .position(|t| *t == "extends")
        .and_then(|at| tokens.get(at + 1))
        .map(|t| t.trim_end_matches(',').to_string());
    let template_id = annotations
        .iter()
        .find(|(name, _)| name == "SbeTemplate")
        .and_then(|(_, args)| arg_value(args, "id"))
        .and_then(|id| u16::try_from(id).ok());
    Some(ClassDecl {
        name: name.to_string(),
        extends,
        template_id,
    })
}

fn parse_class_body(
    body: &str,
    decl: ClassDecl,
    origin: &str,
    extends_out: &mut Vec<String>,
) -> Result<SchemaDef> {
    let mut def = SchemaDef::new(decl.name);
    def.template_id = decl.template_id;
    if let Some(base) = decl.extends {
        extends_out.push(base);
    }

    let bytes = body.as_bytes();
    let mut statement = String::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ';' => {
                if let Some(field) = parse_field_statement(&statement) {
                    def.fields.push(field);
                }
                statement.clear();
                i += 1;
            }
            '{' => {
                let end = match_brace(bytes, i).ok_or_else(|| SchemaError::Parse {
                    path: origin.to_string(),
                    reason: "unbalanced braces in class body".to_string(),
                })?;
                if let Some(inner_decl) = parse_class_statement(&statement) {
                    let inner = parse_class_body(&body[i + 1..end], inner_decl, origin, extends_out)?;
                    def.inner.push(inner);
                    statement.clear();
                } else if statement.contains('=') {
                    // Array initializer: the statement continues to its ';'.
                } else {
                    // Method or initializer block.
                    statement.clear();
                }
                i = end + 1;
            }
            _ => {
                statement.push(c);
                i += 1;
            }
        }
    }
    Ok(def)
}

/// Parses one `[annotations] [modifiers] Type name [= init]` statement.
/// Static, transient, and synthetic fields are dropped; methods never match.
fn parse_field_statement(statement: &str) -> Option<SchemaField> {
    let (annotations, rest) = take_annotations(statement);
    let declaration = rest.split('=').next().unwrap_or("");
    if declaration.contains('(') || declaration.contains(')') {
        return None;
    }

    let mut is_static = false;
    let mut is_transient = false;
    let mut tokens = Vec::new();
    for token in declaration.split_whitespace() {
        if MODIFIERS.contains(&token) {
            is_static |= token == "static";
            is_transient |= token == "transient";
            continue;
        }
        tokens.push(token);
    }
    if tokens.len() < 2 {
        return None;
    }
    if tokens
        .iter()
        .any(|t| matches!(*t, "class" | "interface" | "enum" | "package" | "import" | "record"))
    {
        return None;
    }

    let mut name = tokens.pop()?.to_string();
    let mut java_type = tokens.join("");
    if let Some(base) = name.strip_suffix("[]") {
        name = base.to_string();
        java_type.push_str("[]");
    }
    if is_static || is_transient || !is_identifier(&name) || name.contains('$') {
        return None;
    }

    let mut field = SchemaField::new(name, java_type_to_schema_type(&java_type));
    for (anno, args) in &annotations {
        field.annotations.push(anno.clone());
        match anno.as_str() {
            "XField" => {
                if let Some(id) = arg_value(args, "id") {
                    field.field_id = i32::try_from(id).ok();
                }
            }
            "SbeField" => {
                if let Some(offset) = arg_value(args, "offset") {
                    field.sbe_offset = usize::try_from(offset).ok();
                }
                if let Some(length) = arg_value(args, "length") {
                    field.sbe_length = usize::try_from(length).ok();
                }
            }
            _ => {}
        }
    }
    Some(field)
}

/// Strips leading/embedded `@Name(args)` annotations out of a statement.
fn take_annotations(statement: &str) -> (Vec<(String, String)>, String) {
    let mut annotations = Vec::new();
    let mut rest = String::new();
    let bytes = statement.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'@' {
            i += 1;
            let start = i;
            while i < bytes.len() && (bytes[i] as char).is_alphanumeric() {
                i += 1;
            }
            let name = statement[start..i].to_string();
            let mut args = String::new();
            // Optional argument list.
            let mut j = i;
            while j < bytes.len() && (bytes[j] as char).is_whitespace() {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'(' {
                let mut depth = 0usize;
                let args_start = j + 1;
                while j < bytes.len() {
                    match bytes[j] {
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                args = statement[args_start..j.min(bytes.len())].to_string();
                i = (j + 1).min(bytes.len());
            }
            annotations.push((name, args));
        } else {
            rest.push(bytes[i] as char);
            i += 1;
        }
    }
    (annotations, rest)
}

fn arg_value(args: &str, key: &str) -> Option<i64> {
    for pair in args.split(',') {
        let mut parts = pair.splitn(2, '=');
        let name = parts.next()?.trim();
        if name == key {
            return parts.next()?.trim().parse().ok();
        }
    }
    None
}

fn match_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Type mapping used by every schema consumer. Unknown object types keep
/// their class name so nested structs stay resolvable.
pub fn java_type_to_schema_type(java_type: &str) -> String {
    let base = strip_generics(java_type);
    match base.as_str() {
        "byte" | "Byte" => "int8".into(),
        "short" | "Short" => "int16".into(),
        "int" | "Integer" => "int32".into(),
        "long" | "Long" => "int64".into(),
        "float" | "Float" => "float32".into(),
        "double" | "Double" => "float64".into(),
        "boolean" | "Boolean" => "bool".into(),
        "char" | "Character" => "uint16".into(),
        "String" | "CharSequence" => "string".into(),
        "byte[]" => "bytes".into(),
        other => other.to_string(),
    }
}

fn strip_generics(java_type: &str) -> String {
    match java_type.find('<') {
        Some(open) => {
            let close = java_type.rfind('>').unwrap_or(java_type.len() - 1);
            let mut base = java_type[..open].to_string();
            base.push_str(&java_type[(close + 1).min(java_type.len())..]);
            base
        }
        None => java_type.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<SchemaDef> {
        parse_source(text, "test.java").expect("parse")
    }

    #[test]
    fn simple_fields() {
        let classes = parse(
            r#"
            public class Order {
                private long orderId;
                private String symbol;
                private int quantity;
                private double price;
            }
            "#,
        );
        assert_eq!(classes.len(), 1);
        let order = &classes[0];
        assert_eq!(order.class_name, "Order");
        assert_eq!(order.encoding, Some(Encoding::SelfDescribingWire));
        let names: Vec<&str> = order.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["orderId", "symbol", "quantity", "price"]);
        assert_eq!(order.field("orderId").unwrap().declared_type, "int64");
        assert_eq!(order.field("symbol").unwrap().declared_type, "string");
    }

    #[test]
    fn initializers_are_dropped() {
        let classes = parse(
            r#"
            public class Config {
                private int count = 0;
                private String name = "default";
                private double rate = 1.5;
            }
            "#,
        );
        let names: Vec<&str> = classes[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["count", "name", "rate"]);
    }

    #[test]
    fn static_and_transient_excluded() {
        let classes = parse(
            r#"
            public class Session {
                private static int COUNTER = 42;
                private long sessionId;
                private transient String tempData;
            }
            "#,
        );
        let names: Vec<&str> = classes[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["sessionId"]);
    }

    #[test]
    fn comments_are_ignored() {
        let classes = parse(
            r#"
            public class Test {
                // private int commented;
                private int actual;
                /* private int blockCommented; */
            }
            "#,
        );
        let names: Vec<&str> = classes[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["actual"]);
    }

    #[test]
    fn methods_are_skipped() {
        let classes = parse(
            r#"
            public class Trade {
                private long tradeId;
                public long getTradeId() {
                    return tradeId;
                }
                public void reset(int depth) { tradeId = 0; }
                private double price;
            }
            "#,
        );
        let names: Vec<&str> = classes[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["tradeId", "price"]);
    }

    #[test]
    fn all_modifier_combinations() {
        let classes = parse(
            r#"
            public class Mixed {
                public long publicField;
                protected int protectedField;
                private String privateField;
                double packageField;
                volatile boolean volatileField;
            }
            "#,
        );
        assert_eq!(classes[0].fields.len(), 5);
    }

    #[test]
    fn nested_classes() {
        let classes = parse(
            r#"
            public class Trade {
                private long tradeId;
                private Leg leg;

                public static class Leg {
                    private int qty;
                    private double px;
                }
            }
            "#,
        );
        let trade = &classes[0];
        assert_eq!(trade.inner.len(), 1);
        assert_eq!(trade.inner[0].class_name, "Leg");
        assert_eq!(trade.inner[0].fields.len(), 2);
        assert_eq!(trade.field("leg").unwrap().declared_type, "Leg");
    }

    #[test]
    fn xfield_ids_are_read() {
        let classes = parse(
            r#"
            import org.apache.thrift.TBase;
            public class Quote {
                @XField(id = 1) private int bid;
                @XField(id = 4) private int ask;
            }
            "#,
        );
        let quote = &classes[0];
        assert_eq!(quote.encoding, Some(Encoding::CompactTagged));
        assert_eq!(quote.field("bid").unwrap().field_id, Some(1));
        assert_eq!(quote.field("ask").unwrap().field_id, Some(4));
    }

    #[test]
    fn sbe_annotations_select_sbe() {
        let classes = parse(
            r#"
            @SbeTemplate(id = 7)
            public class Tick {
                @SbeField(offset = 0, length = 4) private int px;
                @SbeField(offset = 4, length = 8) private long ts;
            }
            "#,
        );
        let tick = &classes[0];
        assert_eq!(tick.encoding, Some(Encoding::Sbe));
        assert_eq!(tick.template_id, Some(7));
        assert_eq!(tick.field("px").unwrap().sbe_offset, Some(0));
        assert_eq!(tick.field("ts").unwrap().sbe_length, Some(8));
    }

    #[test]
    fn sbe_import_selects_sbe() {
        let classes = parse(
            r#"
            import uk.co.real_logic.sbe.codec.java.MessageFlyweight;
            public class Px { private int raw; }
            "#,
        );
        assert_eq!(classes[0].encoding, Some(Encoding::Sbe));
    }

    #[test]
    fn compact_import_beats_sbe_annotations() {
        let classes = parse(
            r#"
            import org.apache.thrift.protocol.TCompactProtocol;
            public class Mixed {
                @SbeField(offset = 0, length = 4) private int raw;
            }
            "#,
        );
        assert_eq!(classes[0].encoding, Some(Encoding::CompactTagged));
    }

    #[test]
    fn type_mapping() {
        assert_eq!(java_type_to_schema_type("byte"), "int8");
        assert_eq!(java_type_to_schema_type("short"), "int16");
        assert_eq!(java_type_to_schema_type("int"), "int32");
        assert_eq!(java_type_to_schema_type("long"), "int64");
        assert_eq!(java_type_to_schema_type("float"), "float32");
        assert_eq!(java_type_to_schema_type("double"), "float64");
        assert_eq!(java_type_to_schema_type("boolean"), "bool");
        assert_eq!(java_type_to_schema_type("char"), "uint16");
        assert_eq!(java_type_to_schema_type("Integer"), "int32");
        assert_eq!(java_type_to_schema_type("String"), "string");
        assert_eq!(java_type_to_schema_type("CharSequence"), "string");
        assert_eq!(java_type_to_schema_type("byte[]"), "bytes");
        assert_eq!(java_type_to_schema_type("OrderLeg"), "OrderLeg");
        assert_eq!(java_type_to_schema_type("List<Order>"), "List");
    }

    #[test]
    fn missing_class_is_an_error() {
        assert!(parse_source("int x = 1;", "x.java").is_err());
    }
}
