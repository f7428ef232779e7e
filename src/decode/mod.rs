//! Payload decoder selection.
//!
//! Self-describing payloads announce themselves with a wire code in the
//! first byte; everything else is driven by the schema registry's default
//! encoding. An explicit override from configuration wins over detection.
//! Metadata excerpts are queue-internal documents and always decode as wire.

pub mod compact;
pub mod sbe;

use std::sync::OnceLock;

use crate::config::{DecodeConfig, EncodingOverride};
use crate::error::{Error, Result};
use crate::message::{Kind, Message};
use crate::schema::{Encoding, RegistryBuilder, SchemaRegistry};
use crate::wire::{codes, WireReader};

pub use compact::CompactDecoder;
pub use sbe::SbeDecoder;

/// First bytes that mark a self-describing document: field-name codes and
/// the codes that can open one. Filler codes stay out of the set; a leading
/// zero byte is far more likely to be a schema-driven payload.
fn is_wire_start(byte: u8) -> bool {
    codes::is_field_name_code(byte)
        || matches!(
            byte,
            codes::TYPE_PREFIX | codes::EVENT_OBJECT | codes::SEQUENCE_START | codes::NESTED_BLOCK
        )
}

fn empty_registry() -> &'static SchemaRegistry {
    static EMPTY: OnceLock<SchemaRegistry> = OnceLock::new();
    EMPTY.get_or_init(|| {
        RegistryBuilder::new()
            .freeze()
            .expect("empty registry always freezes")
    })
}

/// Decodes one excerpt payload into an owned message.
pub fn decode_payload(
    payload: &[u8],
    index: u64,
    offset: u64,
    kind: Kind,
    config: &DecodeConfig,
    registry: Option<&SchemaRegistry>,
) -> Result<Message> {
    let encoding = select_encoding(payload, kind, config, registry);
    match encoding {
        Encoding::SelfDescribingWire => WireReader::new(payload, config.max_nesting_depth)
            .lossy(!config.strict)
            .with_context(index, offset, kind)
            .read_document()
            .map_err(Error::Decode),
        Encoding::Sbe => SbeDecoder::new(payload, registry.unwrap_or_else(|| empty_registry()))
            .header_layout(config.sbe_header)
            .strict(config.strict)
            .with_context(index, offset, kind)
            .decode(),
        Encoding::CompactTagged => {
            let registry = registry.unwrap_or_else(|| empty_registry());
            CompactDecoder::new(payload, registry, config.max_nesting_depth)
                .strict(config.strict)
                .with_context(index, offset, kind)
                .decode(registry.default_class())
        }
    }
}

fn select_encoding(
    payload: &[u8],
    kind: Kind,
    config: &DecodeConfig,
    registry: Option<&SchemaRegistry>,
) -> Encoding {
    if kind == Kind::Metadata {
        return Encoding::SelfDescribingWire;
    }
    match config.encoding_override {
        EncodingOverride::SelfDescribing => return Encoding::SelfDescribingWire,
        EncodingOverride::Sbe => return Encoding::Sbe,
        EncodingOverride::CompactTagged => return Encoding::CompactTagged,
        EncodingOverride::Auto => {}
    }
    if payload.first().copied().is_some_and(is_wire_start) {
        return Encoding::SelfDescribingWire;
    }
    match registry.map(|r| r.default_encoding()) {
        Some(Encoding::Sbe) => Encoding::Sbe,
        Some(Encoding::CompactTagged) => Encoding::CompactTagged,
        _ => Encoding::SelfDescribingWire,
    }
}
