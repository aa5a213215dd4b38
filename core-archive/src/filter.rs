//! Container rewriting.

use std::io::{Cursor, Read, Seek};
use tracing::debug;
use zip::{ZipArchive, ZipWriter};

use crate::error::{ArchiveError, Result};
use crate::index::{is_script, ContainerIndex};
use crate::policy::FilterPolicy;
use crate::script::ScriptReferences;

/// Apply `policy` to a `.osz` container and return the rewritten container.
///
/// Kept entries are copied raw, so their names, compression and bytes are
/// unchanged.
///
/// # Errors
///
/// - [`ArchiveError::MalformedContainer`] if `archive` is not a readable zip
///   or one of its scripts cannot be read
/// - [`ArchiveError::Write`] if the output container cannot be built
pub fn process(policy: FilterPolicy, archive: &[u8]) -> Result<Vec<u8>> {
    let mut reader = open(archive)?;

    let index = if policy.needs_scripts() {
        build_index(&mut reader)?
    } else {
        ContainerIndex::default()
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(archive.len())));
    let mut dropped = 0usize;

    for i in 0..reader.len() {
        let entry = reader
            .by_index_raw(i)
            .map_err(|e| ArchiveError::MalformedContainer(e.to_string()))?;

        if policy.drops(&index.classify(entry.name())) {
            dropped += 1;
            continue;
        }

        writer
            .raw_copy_file(entry)
            .map_err(|e| ArchiveError::Write(e.to_string()))?;
    }

    let output = writer
        .finish()
        .map_err(|e| ArchiveError::Write(e.to_string()))?
        .into_inner();

    debug!(
        policy = %policy,
        entries = reader.len(),
        dropped,
        bytes_in = archive.len(),
        bytes_out = output.len(),
        "Filtered container"
    );
    Ok(output)
}

/// Names of every entry in a container, in container order.
pub fn entry_names(archive: &[u8]) -> Result<Vec<String>> {
    let mut reader = open(archive)?;
    (0..reader.len())
        .map(|i| {
            reader
                .by_index_raw(i)
                .map(|entry| entry.name().to_string())
                .map_err(|e| ArchiveError::MalformedContainer(e.to_string()))
        })
        .collect()
}

fn open(archive: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(archive))
        .map_err(|e| ArchiveError::MalformedContainer(e.to_string()))
}

fn build_index<R: Read + Seek>(reader: &mut ZipArchive<R>) -> Result<ContainerIndex> {
    let mut refs = ScriptReferences::new();
    let mut buf = Vec::new();

    for i in 0..reader.len() {
        // Only scripts are decompressed; other entries are copied raw later.
        let name = reader
            .by_index_raw(i)
            .map(|entry| entry.name().to_string())
            .map_err(|e| ArchiveError::MalformedContainer(e.to_string()))?;
        if !is_script(&name) {
            continue;
        }

        let mut entry = reader
            .by_index(i)
            .map_err(|e| ArchiveError::MalformedContainer(format!("{}: {}", name, e)))?;
        buf.clear();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| ArchiveError::MalformedContainer(format!("{}: {}", name, e)))?;
        refs.scan(&String::from_utf8_lossy(&buf));
    }

    Ok(ContainerIndex::new(refs))
}
