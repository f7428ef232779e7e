use std::fmt;

/// Container-level failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    UnreadableHeader(&'static str),
    MisalignedExcerpt,
    Truncated,
    DirtyPadding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatError {
    pub kind: FormatKind,
    /// Absolute byte offset in the file.
    pub offset: u64,
}

impl FormatError {
    pub fn new(kind: FormatKind, offset: u64) -> Self {
        Self { kind, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeKind {
    UnknownTypeCode(u8),
    UnknownFieldRef(u64),
    Truncated,
    InvalidUtf8,
    DepthExceeded,
    TimestampOverflow,
    StopBitOverflow,
    MalformedHeader,
    PayloadTooShort(String),
    UnknownTemplate(u16),
    UnknownFieldId(i64),
}

/// A payload-level decode failure. `payload_pos` is relative to the excerpt
/// payload; `file_offset` is filled in by the reader session once the
/// excerpt's absolute position is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub kind: DecodeKind,
    pub payload_pos: usize,
    pub file_offset: u64,
    pub field_path: Option<String>,
}

impl DecodeError {
    pub fn new(kind: DecodeKind, payload_pos: usize) -> Self {
        Self {
            kind,
            payload_pos,
            file_offset: 0,
            field_path: None,
        }
    }

    pub fn at_field(mut self, path: impl Into<String>) -> Self {
        if self.field_path.is_none() {
            self.field_path = Some(path.into());
        }
        self
    }

    pub fn at_file_offset(mut self, offset: u64) -> Self {
        self.file_offset = offset;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    Parse { path: String, reason: String },
    DuplicateClass(String),
    MissingClass(String),
    UnresolvableFieldId { class: String, id: i64 },
    UnsupportedFile(String),
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Format(FormatError),
    Decode(DecodeError),
    Schema(SchemaError),
    Config(String),
    SessionClosed,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::UnreadableHeader(reason) => write!(f, "unreadable header: {reason}"),
            FormatKind::MisalignedExcerpt => write!(f, "excerpt length runs past end of file"),
            FormatKind::Truncated => write!(f, "truncated excerpt"),
            FormatKind::DirtyPadding => write!(f, "non-zero alignment padding"),
        }
    }
}

impl fmt::Display for DecodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeKind::UnknownTypeCode(code) => write!(f, "unknown type code 0x{code:02X}"),
            DecodeKind::UnknownFieldRef(id) => write!(f, "reference to unseen field name {id}"),
            DecodeKind::Truncated => write!(f, "payload truncated"),
            DecodeKind::InvalidUtf8 => write!(f, "invalid utf-8"),
            DecodeKind::DepthExceeded => write!(f, "nesting depth exceeded"),
            DecodeKind::TimestampOverflow => write!(f, "timestamp overflows epoch nanoseconds"),
            DecodeKind::StopBitOverflow => write!(f, "stop-bit value exceeds 64 bits"),
            DecodeKind::MalformedHeader => write!(f, "malformed field header"),
            DecodeKind::PayloadTooShort(field) => write!(f, "payload too short for field {field}"),
            DecodeKind::UnknownTemplate(id) => write!(f, "no class registered for template {id}"),
            DecodeKind::UnknownFieldId(id) => write!(f, "unknown field id {id}"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Format(err) => write!(f, "format error at offset {}: {}", err.offset, err.kind),
            Error::Decode(err) => {
                write!(
                    f,
                    "decode error at payload byte {} (file offset {}): {}",
                    err.payload_pos, err.file_offset, err.kind
                )?;
                if let Some(path) = &err.field_path {
                    write!(f, " in field {path}")?;
                }
                Ok(())
            }
            Error::Schema(err) => match err {
                SchemaError::Parse { path, reason } => {
                    write!(f, "schema parse failure in {path}: {reason}")
                }
                SchemaError::DuplicateClass(name) => write!(f, "duplicate class {name}"),
                SchemaError::MissingClass(name) => {
                    write!(f, "class {name} referenced but not registered")
                }
                SchemaError::UnresolvableFieldId { class, id } => {
                    write!(f, "field id {id} cannot be resolved in class {class}")
                }
                SchemaError::UnsupportedFile(path) => write!(f, "unsupported schema file {path}"),
            },
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::SessionClosed => write!(f, "reader session closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<FormatError> for Error {
    fn from(value: FormatError) -> Self {
        Error::Format(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Error::Decode(value)
    }
}

impl From<SchemaError> for Error {
    fn from(value: SchemaError) -> Self {
        Error::Schema(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
