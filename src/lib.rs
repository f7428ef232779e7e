//! Inspector for Chronicle Queue data files.
//!
//! The pipeline: `ReaderSession` maps a `.cq4` file and iterates its framed
//! excerpts; the dispatcher hands each payload to the self-describing wire
//! decoder or, schema in hand, to the SBE or compact-tagged decoder; out
//! come owned [`Message`] values that survive the mapping.

pub mod config;
pub mod decode;
pub mod error;
pub mod message;
pub mod mmap;
pub mod queue;
pub mod schema;
pub mod stop_bit;
pub mod wire;

pub use config::{DecodeConfig, EncodingOverride, SbeHeaderLayout};
pub use decode::{decode_payload, CompactDecoder, SbeDecoder};
pub use error::{DecodeError, DecodeKind, Error, FormatError, FormatKind, Result, SchemaError};
pub use message::{DecodeWarning, Field, Kind, Message, Value};
pub use queue::{ExcerptCursor, ExcerptView, MessageIter, QueueInfo, ReaderSession};
pub use schema::{Encoding, RegistryBuilder, SchemaDef, SchemaField, SchemaOrigin, SchemaRegistry};
pub use wire::{DocumentWriter, WireReader};
