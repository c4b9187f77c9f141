//! The recovery engine: enumerates deleted directory entries and reconstitutes their
//! file bodies from the journal's surviving snapshots.

use crate::dir::{self, DirEntry, FILE_TYPE_DIRECTORY, FILE_TYPE_REGULAR};
use crate::device::BlockDevice;
use crate::error::{RecoveryError, Result};
use crate::geometry::{Filesystem, Inode};
use crate::journal::{self, JournalRecord};

/// The root directory inode number on this filesystem family.
pub const ROOT_INODE: u32 = 2;

/// The result of attempting to recover one deleted entry.
#[derive(Debug)]
pub enum RecoveryOutcome {
    /// A journal snapshot yielded a usable inode; this is the reassembled file body.
    Recovered(Vec<u8>),
    /// No journal snapshot covered this inode's slot; `live_inode` is rendered for
    /// diagnostics only and does not represent recoverable data. `journal_error` is set
    /// when the journal scan itself was aborted by structural damage rather than simply
    /// finding no matching snapshot, so a caller can tell the two apart.
    NotRecoverable {
        live_inode: Inode,
        journal_error: Option<RecoveryError>,
    },
}

/// Walks the directory tree from `root_inode`, depth-first, collecting every entry
/// marked deleted whose file type is a regular file.
///
/// Live subdirectories are descended into so their own tombstoned entries are found;
/// deleted subdirectories are not descended into, since their block list may no longer
/// point at live directory data.
pub fn enumerate_deleted(
    fs: &Filesystem,
    device: &mut BlockDevice,
    root_inode: u32,
) -> Result<Vec<DirEntry>> {
    let mut found = Vec::new();
    let mut stack = vec![root_inode];
    let mut visited = std::collections::HashSet::new();

    while let Some(dir_inode) = stack.pop() {
        if !visited.insert(dir_inode) {
            continue;
        }
        let entries = dir::list(fs, device, dir_inode)?;
        for entry in entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            if entry.deleted {
                if entry.file_type == FILE_TYPE_REGULAR {
                    found.push(entry);
                }
                continue;
            }
            if entry.file_type == FILE_TYPE_DIRECTORY {
                stack.push(entry.inode);
            }
        }
    }

    Ok(found)
}

/// Attempts to recover one deleted entry's file body from the journal.
///
/// Searches journal records newest-first for a descriptor whose shadowed-block list
/// names the physical block holding `entry.inode`'s slot, fetches the inode image from
/// the data page that descriptor's tag order associates with that block, and — if the
/// rematerialized inode has at least one data block — concatenates those blocks' live
/// contents. The recovered body is the raw concatenation of the inode's resolved
/// blocks, not truncated to the inode's recorded size.
///
/// If the journal scan itself aborted early because of structural damage, that failure
/// is not swallowed: it is carried on the `NotRecoverable` outcome's `journal_error`
/// field so a caller can distinguish "journal damaged" from "no snapshot found".
pub fn recover_one(fs: &Filesystem, device: &mut BlockDevice, entry: &DirEntry) -> Result<RecoveryOutcome> {
    let (physical_block, _slot) = fs.locate(entry.inode)?;

    let journal_inode_num = fs.superblock.journal_inode;
    let journal_raw = fs.read_raw_inode(device, journal_inode_num)?;
    let journal_inode = fs.materialize_inode(device, &journal_raw)?;

    let (records, scan_error) = journal::scan(fs, device);

    for (_position, record) in records.iter().rev() {
        let JournalRecord::Descriptor {
            shadowed_blocks,
            journal_indices,
        } = record
        else {
            continue;
        };

        let Some(tag_index) = shadowed_blocks.iter().position(|&b| b as u64 == physical_block)
        else {
            continue;
        };
        let Some(&page_position) = journal_indices.get(tag_index) else {
            continue;
        };
        let Some(&page_block) = journal_inode.blocks.get(page_position as usize) else {
            continue;
        };
        if page_block == 0 {
            continue;
        }

        let page = device.read_block(page_block as u64)?;
        let raw_inode = fs.slice_journal_inode(entry.inode, &page)?;
        let candidate = fs.materialize_inode(device, &raw_inode)?;

        if candidate.blocks.is_empty() {
            continue;
        }

        let mut body = Vec::with_capacity(candidate.blocks.len() * fs.block_size as usize);
        for &block in &candidate.blocks {
            body.extend(device.read_block(block as u64)?);
        }
        return Ok(RecoveryOutcome::Recovered(body));
    }

    let live_raw = fs.read_raw_inode(device, entry.inode)?;
    let live_inode = fs.materialize_inode(device, &live_raw)?;
    Ok(RecoveryOutcome::NotRecoverable {
        live_inode,
        journal_error: scan_error,
    })
}

/// Enumerates every deleted regular-file entry under `root_inode` and attempts to
/// recover each one, continuing past a per-entry failure rather than aborting the
/// whole batch; only enumeration itself (building the candidate list) is fatal.
pub fn recover_all(
    fs: &Filesystem,
    device: &mut BlockDevice,
    root_inode: u32,
) -> Result<Vec<(DirEntry, RecoveryOutcome)>> {
    let deleted = enumerate_deleted(fs, device, root_inode)?;
    let mut results = Vec::with_capacity(deleted.len());
    for entry in deleted {
        match recover_one(fs, device, &entry) {
            Ok(outcome) => results.push((entry, outcome)),
            Err(_) => continue,
        }
    }
    Ok(results)
}
