//! Reader session over one `.cq4` file.
//!
//! A session owns the mapping and the parsed queue header; cursors own their
//! offsets. Several cursors may iterate one session independently. `close`
//! invalidates the mapping for everything still holding it; the next cursor
//! call reports `SessionClosed`.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use crate::config::DecodeConfig;
use crate::decode::decode_payload;
use crate::error::{Error, FormatError, FormatKind, Result};
use crate::message::{Kind, Message};
use crate::mmap::MappedFile;
use crate::queue::header::{ExcerptWord, QueueInfo, EXCERPT_ALIGN};
use crate::schema::SchemaRegistry;
use crate::wire::WireReader;

pub struct ReaderSession {
    mapping: Rc<MappedFile>,
    path: PathBuf,
    info: QueueInfo,
    config: DecodeConfig,
    registry: Option<Arc<SchemaRegistry>>,
}

/// One framed excerpt, borrowed from the mapping.
pub struct ExcerptView<'a> {
    pub index: u64,
    pub absolute_offset: u64,
    pub kind: Kind,
    pub payload: &'a [u8],
}

impl ReaderSession {
    /// Opens and verifies a queue file. The header excerpt is parsed before
    /// anything else; a missing or malformed header fails here, not during
    /// iteration.
    pub fn open(path: impl AsRef<Path>, config: DecodeConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let mapping = Rc::new(MappedFile::open(&path)?);

        let mut info = parse_file_header(&mapping, &config)?;
        info.file_size = mapping.len() as u64;
        enrich_from_companion(&path, &config, &mut info);

        Ok(Self {
            mapping,
            path,
            info,
            config,
            registry: None,
        })
    }

    /// Attaches a frozen schema registry for payloads that are not
    /// self-describing.
    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn queue_info(&self) -> &QueueInfo {
        &self.info
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Raw framing iteration: `(index, offset, kind, payload)` without
    /// payload decoding.
    pub fn excerpts(&self, include_metadata: bool) -> ExcerptCursor {
        ExcerptCursor {
            mapping: Rc::clone(&self.mapping),
            offset: 0,
            next_index: self.info.start_index,
            include_metadata,
            strict: self.config.strict,
            done: false,
        }
    }

    /// Decoded message stream.
    pub fn iter(&self, include_metadata: bool) -> MessageIter {
        MessageIter {
            cursor: self.excerpts(include_metadata),
            config: self.config.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Invalidates the mapping for this session and all its cursors.
    pub fn close(&self) {
        self.mapping.close();
    }
}

/// Verifies the fixed header: the file must begin with a committed metadata
/// excerpt whose payload parses as a wire document.
fn parse_file_header(mapping: &MappedFile, config: &DecodeConfig) -> Result<QueueInfo> {
    let data = mapping.as_slice()?;
    if data.len() < 4 {
        return Err(
            FormatError::new(FormatKind::UnreadableHeader("file shorter than a header word"), 0)
                .into(),
        );
    }
    let word = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let len = match ExcerptWord::parse(word) {
        ExcerptWord::Metadata { len } if len > 0 => len as usize,
        _ => {
            return Err(FormatError::new(
                FormatKind::UnreadableHeader("first excerpt is not committed metadata"),
                0,
            )
            .into())
        }
    };
    if 4 + len > data.len() {
        return Err(
            FormatError::new(FormatKind::UnreadableHeader("header excerpt truncated"), 0).into(),
        );
    }

    let document = WireReader::new(&data[4..4 + len], config.max_nesting_depth)
        .read_document()
        .map_err(|_| {
            Error::from(FormatError::new(
                FormatKind::UnreadableHeader("header document does not parse"),
                4,
            ))
        })?;
    Ok(QueueInfo::from_document(&document))
}

/// Optionally enriches queue info from the sibling `.cq4t` metadata file.
/// Absence is normal; a malformed companion never fails the data file.
fn enrich_from_companion(path: &Path, config: &DecodeConfig, info: &mut QueueInfo) {
    let companion = path.with_extension("cq4t");
    if !companion.is_file() {
        return;
    }
    let mapping = match MappedFile::open(&companion) {
        Ok(mapping) => mapping,
        Err(err) => {
            log::debug!("ignoring companion {}: {err}", companion.display());
            return;
        }
    };
    match parse_file_header(&mapping, config) {
        Ok(companion_info) => {
            if info.roll_cycle.is_empty() {
                info.roll_cycle = companion_info.roll_cycle;
            }
            if info.epoch == 0 {
                info.epoch = companion_info.epoch;
            }
            if info.index_spacing == 0 {
                info.index_spacing = companion_info.index_spacing;
            }
            if info.index_count == 0 {
                info.index_count = companion_info.index_count;
            }
            if info.source_id == 0 {
                info.source_id = companion_info.source_id;
            }
        }
        Err(err) => log::debug!("ignoring companion {}: {err}", companion.display()),
    }
}

pub struct ExcerptCursor {
    mapping: Rc<MappedFile>,
    offset: u64,
    next_index: u64,
    include_metadata: bool,
    strict: bool,
    done: bool,
}

impl ExcerptCursor {
    /// Advances to the next excerpt. `Ok(None)` is the clean end of the
    /// committed region; container damage is an error and ends iteration.
    pub fn next(&mut self) -> Result<Option<ExcerptView<'_>>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let data = self.mapping.as_slice()?;
            let file_len = data.len();
            let offset = self.offset as usize;
            if offset + 4 > file_len {
                self.done = true;
                return Ok(None);
            }

            let word = u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            let (len, kind) = match ExcerptWord::parse(word) {
                ExcerptWord::NotReady => {
                    self.done = true;
                    return Ok(None);
                }
                ExcerptWord::Padding { len } => {
                    self.advance(offset, len as usize, file_len)?;
                    continue;
                }
                ExcerptWord::Data { len } => (len as usize, Kind::Data),
                ExcerptWord::Metadata { len } => (len as usize, Kind::Metadata),
            };

            let payload_start = offset + 4;
            let payload_end = payload_start + len;
            if payload_end > file_len {
                self.done = true;
                return Err(
                    FormatError::new(FormatKind::MisalignedExcerpt, offset as u64).into(),
                );
            }

            self.advance(offset, len, file_len)?;

            let index = self.next_index;
            match kind {
                Kind::Data => self.next_index += 1,
                Kind::Metadata if !self.include_metadata => continue,
                Kind::Metadata => {}
            }

            let data = self.mapping.as_slice()?;
            return Ok(Some(ExcerptView {
                index,
                absolute_offset: offset as u64,
                kind,
                payload: &data[payload_start..payload_end],
            }));
        }
    }

    /// Steps over the excerpt at `offset` with payload length `len` and the
    /// 4-byte alignment slack behind it, which must be zero.
    fn advance(&mut self, offset: usize, len: usize, file_len: usize) -> Result<()> {
        let payload_end = offset + 4 + len;
        if payload_end > file_len {
            self.done = true;
            return Err(FormatError::new(FormatKind::MisalignedExcerpt, offset as u64).into());
        }
        let aligned = align_up(payload_end as u64, EXCERPT_ALIGN);
        let slack_end = (aligned as usize).min(file_len);
        let data = self.mapping.as_slice()?;
        for (i, byte) in data[payload_end..slack_end].iter().enumerate() {
            if *byte != 0 && self.strict {
                self.done = true;
                return Err(FormatError::new(
                    FormatKind::DirtyPadding,
                    (payload_end + i) as u64,
                )
                .into());
            }
        }
        self.offset = aligned;
        Ok(())
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Decoded message iteration: framing via `ExcerptCursor`, payload decoding
/// via the dispatcher. Container errors abort; payload errors abort only in
/// strict mode.
pub struct MessageIter {
    cursor: ExcerptCursor,
    config: DecodeConfig,
    registry: Option<Arc<SchemaRegistry>>,
}

impl MessageIter {
    fn next_message(&mut self) -> Result<Option<Message>> {
        let registry = self.registry.as_deref();
        let view = match self.cursor.next()? {
            Some(view) => view,
            None => return Ok(None),
        };
        let message = decode_payload(
            view.payload,
            view.index,
            view.absolute_offset,
            view.kind,
            &self.config,
            registry,
        )
        .map_err(|err| match err {
            Error::Decode(decode) => {
                Error::Decode(decode.at_file_offset(view.absolute_offset))
            }
            other => other,
        })?;
        Ok(Some(message))
    }
}

impl Iterator for MessageIter {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_message() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => None,
            Err(err) => {
                // End of stream after reporting the failure once.
                self.cursor.done = true;
                Some(Err(err))
            }
        }
    }
}
