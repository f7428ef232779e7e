use std::cell::Cell;
use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::error::{Error, Result};

/// Read-only mapping of a queue file, shared between a session and its
/// cursors. `close` invalidates the mapping for every holder; the bytes are
/// released when the last holder drops.
pub struct MappedFile {
    map: Mmap,
    len: usize,
    closed: Cell<bool>,
}

impl MappedFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "cannot map an empty file",
            )));
        }
        let map = unsafe { MmapOptions::new().len(len).map(&file)? };
        Ok(Self {
            map,
            len,
            closed: Cell::new(false),
        })
    }

    /// Fails with `SessionClosed` once the owning session has been closed.
    pub fn as_slice(&self) -> Result<&[u8]> {
        if self.closed.get() {
            return Err(Error::SessionClosed);
        }
        Ok(&self.map)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}
