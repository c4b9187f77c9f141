//! Journal parsing: walks the journal inode's block list and decodes the big-endian
//! descriptor / commit / super-block / revoke transaction records it holds.

use crate::decode::u32_be;
use crate::device::BlockDevice;
use crate::error::{RecoveryError, Result};
use crate::geometry::Filesystem;
use std::collections::VecDeque;
use uuid::Uuid;

const JBD_DESCRIPTOR: u32 = 1;
const JBD_COMMIT: u32 = 2;
const JBD_SUPERBLOCK_V1: u32 = 3;
const JBD_SUPERBLOCK_V2: u32 = 4;
const JBD_REVOKE: u32 = 5;

/// Flag bit on a descriptor tag: the tag omits its trailing 16-byte UUID, so its stride
/// is 8 bytes rather than 24.
const TAG_FLAG_SAME_UUID: u32 = 0x02;
/// Flag bit on a descriptor tag: this is the last tag in the descriptor block.
const TAG_FLAG_LAST_TAG: u32 = 0x08;

/// A single descriptor tag: the physical block it shadows, its raw flags, and an
/// optional UUID suffix when the block's owning filesystem differs from the journal's.
#[derive(Clone, Debug)]
pub struct JournalTag {
    pub block: u32,
    pub flags: u32,
    pub uuid: Option<Uuid>,
}

/// One decoded journal transaction record, tagged by its journal-block title.
#[derive(Clone, Debug)]
pub enum JournalRecord {
    Descriptor {
        shadowed_blocks: Vec<u32>,
        journal_indices: Vec<u64>,
    },
    Commit {
        sequence: u32,
    },
    Superblock {
        sequence: u32,
    },
    Revoke {
        sequence: u32,
    },
    DataPage {
        shadowed_block: u32,
    },
}

/// The decoded 12-byte title prefixed to every journal metadata block.
struct Title {
    type_tag: u32,
    sequence: u32,
}

fn parse_title(buf: &[u8]) -> Result<Title> {
    if buf.len() < 12 {
        return Err(RecoveryError::JournalDamaged(
            "journal block shorter than title".into(),
        ));
    }
    Ok(Title {
        type_tag: u32_be(buf, 4),
        sequence: u32_be(buf, 8),
    })
}

/// Walks a descriptor block's tag list starting at offset 12, per the stride and
/// termination rules: 8 bytes per tag normally, 24 when the UUID suffix is present,
/// terminated by the tag with the 0x08 flag set or by running off the block.
fn parse_tags(buf: &[u8]) -> Vec<JournalTag> {
    let mut tags = Vec::new();
    let mut cursor = 12usize;
    while cursor + 8 <= buf.len() {
        let block = u32_be(buf, cursor);
        let flags = u32_be(buf, cursor + 4);
        let has_uuid = flags & TAG_FLAG_SAME_UUID == 0;
        let stride = if has_uuid { 24 } else { 8 };

        let uuid = if has_uuid && cursor + stride <= buf.len() {
            Uuid::from_slice(&buf[cursor + 8..cursor + 24]).ok()
        } else {
            None
        };

        tags.push(JournalTag { block, flags, uuid });

        if flags & TAG_FLAG_LAST_TAG != 0 {
            break;
        }
        cursor += stride;
    }
    tags
}

/// Parses the journal inode's blocks into an ordered list of `(position, record)` pairs,
/// where `position` is the index into the journal inode's flattened block list.
///
/// Returns the records successfully decoded before any structural failure, alongside
/// that failure if one occurred, per the design note on partial results.
pub fn scan(
    fs: &Filesystem,
    device: &mut BlockDevice,
) -> (Vec<(u64, JournalRecord)>, Option<RecoveryError>) {
    let journal_inode_num = fs.superblock.journal_inode;
    let raw = match fs.read_raw_inode(device, journal_inode_num) {
        Ok(r) => r,
        Err(e) => return (Vec::new(), Some(e)),
    };
    let journal_inode = match fs.materialize_inode(device, &raw) {
        Ok(i) => i,
        Err(e) => return (Vec::new(), Some(e)),
    };

    let mut records = Vec::new();
    let mut pending: VecDeque<u32> = VecDeque::new();

    for (i, &block_ptr) in journal_inode.blocks.iter().enumerate() {
        if block_ptr == 0 {
            continue;
        }
        let position = i as u64;
        let buf = match device.read_block(block_ptr as u64) {
            Ok(b) => b,
            Err(e) => return (records, Some(e)),
        };
        let title = match parse_title(&buf) {
            Ok(t) => t,
            Err(e) => return (records, Some(e)),
        };

        match title.type_tag {
            JBD_DESCRIPTOR => {
                let tags = parse_tags(&buf);
                let shadowed_blocks: Vec<u32> = tags.iter().map(|t| t.block).collect();
                let journal_indices: Vec<u64> =
                    (0..shadowed_blocks.len()).map(|k| position + 1 + k as u64).collect();
                pending = shadowed_blocks.iter().copied().collect();
                records.push((
                    position,
                    JournalRecord::Descriptor {
                        shadowed_blocks,
                        journal_indices,
                    },
                ));
            }
            JBD_COMMIT => records.push((
                position,
                JournalRecord::Commit {
                    sequence: title.sequence,
                },
            )),
            JBD_SUPERBLOCK_V1 | JBD_SUPERBLOCK_V2 => records.push((
                position,
                JournalRecord::Superblock {
                    sequence: title.sequence,
                },
            )),
            JBD_REVOKE => records.push((
                position,
                JournalRecord::Revoke {
                    sequence: title.sequence,
                },
            )),
            _ => {
                if let Some(shadowed_block) = pending.pop_front() {
                    records.push((position, JournalRecord::DataPage { shadowed_block }));
                }
            }
        }
    }

    (records, None)
}
