use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use cqlens::{
    DecodeConfig, Encoding, EncodingOverride, Error, Message, ReaderSession, SchemaRegistry, Value,
};

#[derive(Parser)]
#[command(name = "cqlens", version, about = "Chronicle Queue file inspector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print queue header information.
    Info { file: PathBuf },
    /// Decode and print messages.
    Dump {
        file: PathBuf,
        /// Schema artefacts: .java, .class, .json files or directories.
        #[arg(long = "schema")]
        schema: Vec<PathBuf>,
        /// auto | self_describing | sbe | compact_tagged
        #[arg(long = "encoding", default_value = "auto")]
        encoding: String,
        #[arg(long = "include-metadata")]
        include_metadata: bool,
        #[arg(long = "strict")]
        strict: bool,
        #[arg(long = "max-depth", default_value_t = 64)]
        max_depth: u32,
        #[arg(long = "limit")]
        limit: Option<usize>,
        /// Emit one JSON object per message instead of text.
        #[arg(long = "json")]
        json: bool,
    },
    /// Parse schema artefacts and print the registry.
    Schema {
        path: PathBuf,
        #[arg(long = "encoding")]
        encoding: Option<String>,
    },
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

/// 0 ok, 2 unreadable file, 3 decode, 4 schema, 5 configuration.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(Error::Io(_)) => 2,
        Some(Error::Format(_) | Error::Decode(_) | Error::SessionClosed) => 3,
        Some(Error::Schema(_)) => 4,
        Some(Error::Config(_)) => 5,
        None => 1,
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut out = BufWriter::new(io::stdout());
    match cli.command {
        Commands::Info { file } => cmd_info(&file, &mut out)?,
        Commands::Dump {
            file,
            schema,
            encoding,
            include_metadata,
            strict,
            max_depth,
            limit,
            json,
        } => {
            let config = DecodeConfig {
                encoding_override: encoding.parse::<EncodingOverride>()?,
                max_nesting_depth: max_depth,
                include_metadata,
                strict,
                ..DecodeConfig::default()
            };
            cmd_dump(&file, &schema, config, limit, json, &mut out)?;
        }
        Commands::Schema { path, encoding } => {
            let hint = match encoding.as_deref() {
                None => None,
                Some(name) => match name.parse::<EncodingOverride>()? {
                    EncodingOverride::Auto => None,
                    EncodingOverride::SelfDescribing => Some(Encoding::SelfDescribingWire),
                    EncodingOverride::Sbe => Some(Encoding::Sbe),
                    EncodingOverride::CompactTagged => Some(Encoding::CompactTagged),
                },
            };
            cmd_schema(&path, hint, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn cmd_info(file: &PathBuf, out: &mut dyn Write) -> anyhow::Result<()> {
    let session = ReaderSession::open(file, DecodeConfig::default())?;
    let info = session.queue_info();
    writeln!(out, "file={}", file.display())?;
    writeln!(out, "file_size={}", info.file_size)?;
    writeln!(out, "start_index={}", info.start_index)?;
    writeln!(out, "roll_cycle={}", info.roll_cycle)?;
    writeln!(out, "epoch={}", info.epoch)?;
    writeln!(out, "source_id={}", info.source_id)?;
    writeln!(
        out,
        "version={} index_count={} index_spacing={}",
        info.version, info.index_count, info.index_spacing
    )?;

    let mut count = 0u64;
    for message in session.iter(false) {
        message?;
        count += 1;
    }
    writeln!(out, "messages={count}")?;
    Ok(())
}

fn cmd_dump(
    file: &PathBuf,
    schema_paths: &[PathBuf],
    config: DecodeConfig,
    limit: Option<usize>,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let mut session = ReaderSession::open(file, config.clone())?;
    if !schema_paths.is_empty() {
        let mut builder = SchemaRegistry::builder();
        for path in schema_paths {
            builder
                .load(path)
                .with_context(|| format!("loading schema {}", path.display()))?;
        }
        session = session.with_registry(Arc::new(builder.freeze()?));
    }

    let include_metadata = config.include_metadata;
    for (n, message) in session.iter(include_metadata).enumerate() {
        if limit.is_some_and(|limit| n >= limit) {
            break;
        }
        let message = message?;
        if json {
            writeln!(out, "{}", serde_json::to_string(&message_json(&message))?)?;
        } else {
            print_message(&message, out)?;
        }
    }
    Ok(())
}

fn cmd_schema(
    path: &PathBuf,
    hint: Option<Encoding>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let registry = SchemaRegistry::load(path, hint)?;
    writeln!(out, "default_encoding={:?}", registry.default_encoding())?;
    for class in registry.classes() {
        write!(out, "class {}", class.class_name)?;
        if let Some(template) = class.template_id {
            write!(out, " template={template}")?;
        }
        writeln!(out)?;
        for field in &class.fields {
            write!(out, "    {} {}", field.declared_type, field.name)?;
            if let Some(id) = field.field_id {
                write!(out, " id={id}")?;
            }
            if let Some(offset) = field.sbe_offset {
                write!(out, " offset={offset}")?;
            }
            if let Some(length) = field.sbe_length {
                write!(out, " length={length}")?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

fn print_message(message: &Message, out: &mut dyn Write) -> io::Result<()> {
    let kind = match message.kind {
        cqlens::Kind::Data => "data",
        cqlens::Kind::Metadata => "meta",
    };
    write!(
        out,
        "[{}] {} @{}",
        message.index, kind, message.absolute_offset
    )?;
    if !message.type_name.is_empty() {
        write!(out, " {}", message.type_name)?;
    }
    writeln!(out)?;
    for (path, value) in message.flatten() {
        writeln!(out, "    {path} = {}", render_value(&value))?;
    }
    for warning in &message.warnings {
        writeln!(out, "    ! {}", warning.detail)?;
    }
    if let Some(err) = &message.decode_error {
        writeln!(out, "    ! decode error: {}", err.kind)?;
    }
    Ok(())
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::UInt64(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Text(v) => format!("{v:?}"),
        Value::Bytes(v) => {
            let hex: String = v.iter().map(|b| format!("{b:02x}")).collect();
            format!("0x{hex}")
        }
        Value::Timestamp(nanos) => format!("{nanos}ns"),
        Value::Uuid(v) => format_uuid(*v),
        Value::List(items) | Value::Set(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Map(pairs) => {
            let rendered: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{}: {}", render_value(k), render_value(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        Value::Nested(message) => format!("{{{} fields}}", message.fields.len()),
    }
}

fn message_json(message: &Message) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    for field in &message.fields {
        fields.insert(field.name.clone(), value_json(&field.value));
    }
    let mut object = serde_json::Map::new();
    object.insert("index".into(), message.index.into());
    object.insert("offset".into(), message.absolute_offset.into());
    object.insert(
        "kind".into(),
        match message.kind {
            cqlens::Kind::Data => "data".into(),
            cqlens::Kind::Metadata => "metadata".into(),
        },
    );
    if !message.type_name.is_empty() {
        object.insert("type".into(), message.type_name.clone().into());
    }
    object.insert("fields".into(), serde_json::Value::Object(fields));
    if !message.warnings.is_empty() {
        let warnings: Vec<serde_json::Value> = message
            .warnings
            .iter()
            .map(|w| w.detail.clone().into())
            .collect();
        object.insert("warnings".into(), warnings.into());
    }
    if let Some(err) = &message.decode_error {
        object.insert("decode_error".into(), err.kind.to_string().into());
    }
    serde_json::Value::Object(object)
}

fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => (*v).into(),
        Value::Int64(v) => (*v).into(),
        Value::UInt64(v) => (*v).into(),
        Value::Float64(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(v) => v.clone().into(),
        Value::Bytes(v) => {
            let hex: String = v.iter().map(|b| format!("{b:02x}")).collect();
            hex.into()
        }
        Value::Timestamp(nanos) => (*nanos).into(),
        Value::Uuid(v) => format_uuid(*v).into(),
        Value::List(items) | Value::Set(items) => {
            serde_json::Value::Array(items.iter().map(value_json).collect())
        }
        Value::Map(pairs) => {
            let mut object = serde_json::Map::new();
            for (key, value) in pairs {
                let key = match key {
                    Value::Text(text) => text.clone(),
                    other => render_value(other),
                };
                object.insert(key, value_json(value));
            }
            serde_json::Value::Object(object)
        }
        Value::Nested(message) => message_json(message),
    }
}

fn format_uuid(value: u128) -> String {
    let bytes = value.to_be_bytes();
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        hex[0..4].join(""),
        hex[4..6].join(""),
        hex[6..8].join(""),
        hex[8..10].join(""),
        hex[10..16].join("")
    )
}
