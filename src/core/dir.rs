//! Directory block parsing, including recovery of tombstoned (deleted) entries from
//! slack space left behind by lazy deletion.

use crate::decode::{str_lossy, u16_le, u32_le};
use crate::device::BlockDevice;
use crate::error::Result;
use crate::geometry::Filesystem;

/// File type tag stored in a directory record.
pub const FILE_TYPE_REGULAR: u8 = 1;
/// File type tag stored in a directory record.
pub const FILE_TYPE_DIRECTORY: u8 = 2;

/// A single directory entry, live or tombstoned.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub inode: u32,
    pub name: String,
    pub file_type: u8,
    pub deleted: bool,
}

/// Rounds `n` up to the next multiple of 4.
fn round_up_4(n: usize) -> usize {
    n.div_ceil(4) * 4
}

/// An open interval `[start, end)` of byte offsets within a directory block that is
/// known to hold one or more deleted entries, per the record whose stored `record_len`
/// extended over them.
struct DeletedSpan {
    start: usize,
    end: usize,
}

/// Parses one directory block into its sequence of entries (live and tombstoned).
fn parse_dir_block(buf: &[u8]) -> Vec<DirEntry> {
    let mut entries = Vec::new();
    let mut spans: Vec<DeletedSpan> = Vec::new();
    let mut cursor = 0usize;

    while cursor < buf.len() {
        if cursor + 8 > buf.len() {
            break;
        }
        let inode = u32_le(buf, cursor);
        let record_len = u16_le(buf, cursor + 4) as usize;
        let name_len = buf[cursor + 6] as usize;
        let file_type = buf[cursor + 7];

        if record_len == 0 {
            break;
        }

        let name_end = cursor + 8 + name_len;
        if name_end > buf.len() {
            break;
        }
        let name = str_lossy(buf, cursor + 8, name_end);

        let is_terminator = record_len == buf.len() && name.is_empty();
        if !is_terminator {
            let deleted = spans.iter().any(|s| cursor >= s.start && cursor < s.end);

            let actual_footprint = 8 + round_up_4(name_len);
            if actual_footprint != record_len {
                spans.push(DeletedSpan {
                    start: cursor + actual_footprint,
                    end: cursor + record_len,
                });
            }

            entries.push(DirEntry {
                inode,
                name,
                file_type,
                deleted,
            });
        }

        cursor += 8 + round_up_4(name_len);
    }

    entries
}

/// Lists the entries of the directory whose inode number is `dir_inode_num`, including
/// tombstoned entries recovered from slack space.
pub fn list(
    fs: &Filesystem,
    device: &mut BlockDevice,
    dir_inode_num: u32,
) -> Result<Vec<DirEntry>> {
    let raw = fs.read_raw_inode(device, dir_inode_num)?;
    let inode = fs.materialize_inode(device, &raw)?;

    let mut entries = Vec::new();
    for &block in &inode.blocks {
        if block == 0 {
            continue;
        }
        let buf = device.read_block(block as u64)?;
        entries.extend(parse_dir_block(&buf));
    }
    Ok(entries)
}
