//! Core engine for forensic recovery of deleted files on a classic ext3 filesystem
//! image: geometry decoding, directory tombstone detection, journal scanning, and the
//! recovery algorithm that ties them together.

pub mod decode;
pub mod device;
pub mod dir;
pub mod error;
pub mod geometry;
pub mod journal;
pub mod recovery;

use std::path::Path;

pub use device::BlockDevice;
pub use error::{RecoveryError, Result};
pub use geometry::Filesystem;

/// A filesystem image opened and decoded, ready to answer geometry, directory,
/// journal, and recovery queries. The single entry point the CLI drives.
pub struct Engine {
    pub device: BlockDevice,
    pub fs: Filesystem,
}

impl Engine {
    /// Opens `path` and decodes its super-block and descriptor table.
    pub fn open(path: &Path) -> Result<Self> {
        let mut device = BlockDevice::open(path)?;
        let fs = Filesystem::open(&mut device)?;
        Ok(Self { device, fs })
    }

    /// Enumerates deleted regular-file entries under [`recovery::ROOT_INODE`].
    pub fn enumerate_deleted(&mut self) -> Result<Vec<dir::DirEntry>> {
        recovery::enumerate_deleted(&self.fs, &mut self.device, recovery::ROOT_INODE)
    }

    /// Attempts recovery of every deleted entry found from the root directory.
    pub fn recover_all(&mut self) -> Result<Vec<(dir::DirEntry, recovery::RecoveryOutcome)>> {
        recovery::recover_all(&self.fs, &mut self.device, recovery::ROOT_INODE)
    }

    /// Attempts recovery of a single already-located entry.
    pub fn recover_one(&mut self, entry: &dir::DirEntry) -> Result<recovery::RecoveryOutcome> {
        recovery::recover_one(&self.fs, &mut self.device, entry)
    }

    /// Scans the journal, returning partial results alongside any failure encountered.
    pub fn scan_journal(&mut self) -> (Vec<(u64, journal::JournalRecord)>, Option<RecoveryError>) {
        journal::scan(&self.fs, &mut self.device)
    }

    /// Lists the entries of an arbitrary directory inode (live view, with tombstones).
    pub fn list_dir(&mut self, dir_inode: u32) -> Result<Vec<dir::DirEntry>> {
        dir::list(&self.fs, &mut self.device, dir_inode)
    }

    /// Reads and materializes an inode from the live inode table.
    pub fn read_inode(&mut self, inode_num: u32) -> Result<geometry::Inode> {
        let raw = self.fs.read_raw_inode(&mut self.device, inode_num)?;
        self.fs.materialize_inode(&mut self.device, &raw)
    }

    /// Reads and materializes an inode from a given journal block position.
    pub fn read_inode_from_journal(
        &mut self,
        inode_num: u32,
        journal_position: u64,
    ) -> Result<geometry::Inode> {
        let journal_inode_num = self.fs.superblock.journal_inode;
        let journal_raw = self.fs.read_raw_inode(&mut self.device, journal_inode_num)?;
        let journal_inode = self.fs.materialize_inode(&mut self.device, &journal_raw)?;
        let &block = journal_inode
            .blocks
            .get(journal_position as usize)
            .ok_or_else(|| {
                RecoveryError::FormatError(format!(
                    "journal position {journal_position} has no block"
                ))
            })?;
        let page = self.device.read_block(block as u64)?;
        let raw = self.fs.slice_journal_inode(inode_num, &page)?;
        self.fs.materialize_inode(&mut self.device, &raw)
    }

    /// Reads the raw bytes of the journal inode's block at the given position.
    pub fn read_journal_block(&mut self, position: u64) -> Result<Vec<u8>> {
        let journal_inode_num = self.fs.superblock.journal_inode;
        let journal_raw = self.fs.read_raw_inode(&mut self.device, journal_inode_num)?;
        let journal_inode = self.fs.materialize_inode(&mut self.device, &journal_raw)?;
        let &block = journal_inode.blocks.get(position as usize).ok_or_else(|| {
            RecoveryError::FormatError(format!("journal position {position} has no block"))
        })?;
        self.device.read_block(block as u64)
    }
}
