use crate::config::ArchiverOptions;
use crate::domain::EntryRow;
use crate::error::Result;
use crate::factory::archiver_for_path;
use std::path::Path;

/// Lists the entries of `archive`, detecting its type from the name or content.
pub fn list(archive: &Path) -> Result<Vec<EntryRow>> {
    list_with(archive, ArchiverOptions::default())
}

pub fn list_with(archive: &Path, opts: ArchiverOptions) -> Result<Vec<EntryRow>> {
    let mut stream = archiver_for_path(archive)?.with_options(opts).stream(archive)?;
    let mut rows = Vec::new();
    while let Some(e) = stream.next_entry()? {
        rows.push(EntryRow::from(&e));
    }
    Ok(rows)
}
