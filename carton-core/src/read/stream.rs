use super::extract::Extractor;
use crate::container::ContainerReader;
use crate::entry::ArchiveEntry;
use crate::error::{CartonError, Result};
use crate::policy::Policy;
use std::io::{self, Read};
use std::path::Path;

/// Pull-based view over an archive: one entry at a time, with the current
/// entry's payload readable through [`Read`].
///
/// An entry can only be extracted while it is the current entry and before
/// its payload has been read; both checks happen at runtime.
pub struct ArchiveStream {
    reader: Option<Box<dyn ContainerReader>>,
    policy: Policy,
    current: Option<ArchiveEntry>,
    next_index: u64,
    consumed: bool,
}

impl ArchiveStream {
    pub(crate) fn new(reader: Box<dyn ContainerReader>, policy: Policy) -> Self {
        Self {
            reader: Some(reader),
            policy,
            current: None,
            next_index: 0,
            consumed: false,
        }
    }

    fn reader(&mut self) -> Result<&mut Box<dyn ContainerReader>> {
        self.reader
            .as_mut()
            .ok_or(CartonError::IllegalState("stream is closed"))
    }

    /// Advances to the next entry, skipping whatever is left of the current
    /// payload. Returns `None` once the archive is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        let next = self.reader()?.next_entry()?;
        self.consumed = false;
        self.current = next.map(|mut e| {
            e.index = self.next_index;
            self.next_index += 1;
            e
        });
        Ok(self.current.clone())
    }

    pub fn current(&self) -> Option<&ArchiveEntry> {
        self.current.as_ref()
    }

    /// Writes `entry` below `dest`, which is created if missing.
    pub fn extract_entry(&mut self, entry: &ArchiveEntry, dest: &Path) -> Result<()> {
        if self.reader.is_none() {
            return Err(CartonError::IllegalState("stream is closed"));
        }
        match &self.current {
            Some(cur) if cur.index == entry.index && cur.name == entry.name => {}
            _ => {
                return Err(CartonError::IllegalState(
                    "entry is not the current entry of the stream",
                ));
            }
        }
        if self.consumed {
            return Err(CartonError::IllegalState("entry payload was already consumed"));
        }
        std::fs::create_dir_all(dest)?;
        let policy = self.policy.clone();
        let mut ex = Extractor::new(dest, &policy);
        ex.entry(entry, self)?;
        self.consumed = true;
        ex.finish()?;
        Ok(())
    }

    /// Releases the underlying source. Later calls fail with `IllegalState`.
    pub fn close(&mut self) {
        self.reader = None;
        self.current = None;
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

impl Read for ArchiveStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.current.is_none() {
            return match self.reader {
                Some(_) => Ok(0),
                None => Err(CartonError::IllegalState("stream is closed").into_io()),
            };
        }
        let reader = self.reader().map_err(CartonError::into_io)?;
        let n = reader.read_payload(buf)?;
        if n > 0 {
            self.consumed = true;
        }
        Ok(n)
    }
}
