//! End-to-end exercise of a hand-assembled synthetic ext3 image: super-block/BGDT
//! decoding, directory tombstone visibility, and journal-backed recovery, both the
//! recoverable and not-recoverable outcomes.

use recovery_core::recovery::RecoveryOutcome;
use recovery_core::Engine;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

const BLOCK_SIZE: usize = 1024;
const TOTAL_BLOCKS: usize = 64;

fn put_u32_le(img: &mut [u8], at: usize, v: u32) {
    img[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u16_le(img: &mut [u8], at: usize, v: u16) {
    img[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32_be(img: &mut [u8], at: usize, v: u32) {
    img[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

fn block_offset(block: usize) -> usize {
    block * BLOCK_SIZE
}

/// Writes a directory record at `cursor` within `block`, returning the actual
/// footprint (`8 + round_up_4(name_len)`) so the caller can compute where the next
/// record starts and whether a tombstone span should cover it.
fn put_dir_record(
    block: &mut [u8],
    cursor: usize,
    inode: u32,
    name: &str,
    file_type: u8,
    record_len: u16,
) -> usize {
    put_u32_le(block, cursor, inode);
    put_u16_le(block, cursor + 4, record_len);
    block[cursor + 6] = name.len() as u8;
    block[cursor + 7] = file_type;
    block[cursor + 8..cursor + 8 + name.len()].copy_from_slice(name.as_bytes());
    8 + name.len().div_ceil(4) * 4
}

/// Writes a 128-byte classic inode record at `img[at..at + 128]`.
#[allow(clippy::too_many_arguments)]
fn put_inode(
    img: &mut [u8],
    at: usize,
    size_low: u32,
    size_high: u32,
    dtime: u32,
    links_count: u16,
    direct_blocks: &[u32],
) {
    put_u32_le(img, at + 4, size_low);
    put_u32_le(img, at + 20, dtime);
    put_u16_le(img, at + 26, links_count);
    for (i, &b) in direct_blocks.iter().enumerate() {
        put_u32_le(img, at + 40 + i * 4, b);
    }
    put_u32_le(img, at + 108, size_high);
}

/// Builds the synthetic 64-block image described at the top of this file and returns
/// its bytes.
fn build_image() -> Vec<u8> {
    let mut img = vec![0u8; TOTAL_BLOCKS * BLOCK_SIZE];

    // Super-block, at fixed offset 1024 (block 1 when block size is 1024).
    let sb = 1024usize;
    put_u32_le(&mut img, sb, 16); // inode_count
    put_u32_le(&mut img, sb + 4, TOTAL_BLOCKS as u32); // block_count
    put_u32_le(&mut img, sb + 20, 1); // first_data_block
    put_u32_le(&mut img, sb + 24, 0); // block_size_shift -> 1024
    put_u32_le(&mut img, sb + 32, TOTAL_BLOCKS as u32); // blocks_per_group
    put_u32_le(&mut img, sb + 40, 16); // inodes_per_group
    put_u16_le(&mut img, sb + 88, 128); // inode_size
    put_u32_le(&mut img, sb + 224, 8); // journal_inode

    // Group descriptor table: block first_data_block + 1 = block 2.
    let bgdt = block_offset(2);
    put_u32_le(&mut img, bgdt + 8, 3); // inode_table_start

    // Root directory inode (#2): slot 1 of block 3 (offset 128..256).
    let inode2 = block_offset(3) + 128;
    put_inode(&mut img, inode2, BLOCK_SIZE as u32, 0, 0, 2, &[10]);

    // Journal inode (#8): slot 7 of block 3 (offset 896..1024).
    let journal_inode = block_offset(3) + 7 * 128;
    put_inode(&mut img, journal_inode, 0, 0, 0, 1, &[30, 31]);

    // Deleted inode 11 (current, post-delete, live state): slot 2 of block 4.
    let inode11_live = block_offset(4) + 2 * 128;
    put_inode(&mut img, inode11_live, 0, 0, 999_000_001, 0, &[]);

    // Deleted inode 12 (current, post-delete, live state): slot 3 of block 4.
    let inode12_live = block_offset(4) + 3 * 128;
    put_inode(&mut img, inode12_live, 0, 0, 999_000_002, 0, &[]);

    // Root directory data block (block 10): `.`, `..` (lengthened to subsume `file`),
    // `file` (lengthened to subsume `gone`), `gone`.
    {
        let block = &mut img[block_offset(10)..block_offset(10) + BLOCK_SIZE];
        let mut cursor = 0usize;
        cursor += put_dir_record(block, cursor, 2, ".", 2, 12);
        let dotdot_footprint = put_dir_record(block, cursor, 2, "..", 2, 24);
        cursor += dotdot_footprint;
        let file_footprint = put_dir_record(block, cursor, 11, "file", 1, 24);
        cursor += file_footprint;
        put_dir_record(block, cursor, 12, "gone", 1, 12);
    }

    // Journal block 30 (journal position 0): descriptor shadowing physical block 4
    // (the inode table block holding both inode 11 and inode 12's slots).
    {
        let block = &mut img[block_offset(30)..block_offset(30) + BLOCK_SIZE];
        put_u32_be(block, 0, 0xc03b3998);
        put_u32_be(block, 4, 1); // descriptor
        put_u32_be(block, 8, 1); // sequence
        put_u32_be(block, 12, 4); // shadowed block
        put_u32_be(block, 16, 0x0a); // SAME_UUID | LAST_TAG
    }

    // Journal block 31 (journal position 1): data page. The bytes at inode 11's slot
    // (offset 256..384) hold its pre-delete image; inode 12's slot (384..512) is left
    // zeroed, simulating a page that covers the block but not that slot's old data.
    {
        let page_start = block_offset(31);
        let inode11_journaled = page_start + 2 * 128;
        put_inode(&mut img, inode11_journaled, 5, 0, 0, 1, &[20]);
    }

    // Block 20: the recovered file body.
    {
        let data = &mut img[block_offset(20)..block_offset(20) + BLOCK_SIZE];
        data[..5].copy_from_slice(b"hello");
    }

    img
}

fn write_temp_image(name: &str, img: &[u8]) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("ext3recover-integration-{name}-{}", std::process::id()));
    let mut f = File::create(&path).unwrap();
    f.write_all(img).unwrap();
    path
}

#[test]
fn engine_opens_and_decodes_geometry() {
    let img = build_image();
    let path = write_temp_image("geometry", &img);

    let engine = Engine::open(&path).unwrap();
    assert_eq!(engine.fs.block_size, 1024);
    assert_eq!(engine.fs.groups.len(), 1);

    std::fs::remove_file(&path).ok();
}

#[test]
fn directory_listing_reveals_tombstoned_entries() {
    let img = build_image();
    let path = write_temp_image("dirlist", &img);

    let mut engine = Engine::open(&path).unwrap();
    let entries = engine.list_dir(2).unwrap();
    let by_name = |n: &str| entries.iter().find(|e| e.name == n).unwrap();

    assert!(!by_name(".").deleted);
    assert!(!by_name("..").deleted);
    assert!(by_name("file").deleted);
    assert_eq!(by_name("file").inode, 11);
    assert!(by_name("gone").deleted);
    assert_eq!(by_name("gone").inode, 12);

    std::fs::remove_file(&path).ok();
}

#[test]
fn journal_backed_recovery_reconstitutes_file_body() {
    let img = build_image();
    let path = write_temp_image("recover-ok", &img);

    let mut engine = Engine::open(&path).unwrap();
    let entries = engine.enumerate_deleted().unwrap();
    let file_entry = entries.iter().find(|e| e.name == "file").unwrap().clone();

    match engine.recover_one(&file_entry).unwrap() {
        RecoveryOutcome::Recovered(bytes) => {
            assert_eq!(bytes.len(), BLOCK_SIZE);
            assert_eq!(&bytes[..5], b"hello");
        }
        RecoveryOutcome::NotRecoverable { .. } => panic!("expected a recovered body"),
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn missing_journal_snapshot_is_not_recoverable() {
    let img = build_image();
    let path = write_temp_image("recover-miss", &img);

    let mut engine = Engine::open(&path).unwrap();
    let entries = engine.enumerate_deleted().unwrap();
    let gone_entry = entries.iter().find(|e| e.name == "gone").unwrap().clone();

    match engine.recover_one(&gone_entry).unwrap() {
        RecoveryOutcome::NotRecoverable {
            live_inode,
            journal_error,
        } => {
            assert_eq!(live_inode.size, 0);
            assert!(journal_error.is_none());
        }
        RecoveryOutcome::Recovered(_) => panic!("expected no recoverable body"),
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn enumerate_deleted_finds_both_tombstoned_files() {
    let img = build_image();
    let path = write_temp_image("enumerate", &img);

    let mut engine = Engine::open(&path).unwrap();
    let mut names: Vec<String> = engine
        .enumerate_deleted()
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["file".to_string(), "gone".to_string()]);

    std::fs::remove_file(&path).ok();
}
