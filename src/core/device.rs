//! Random-access, fixed-size block fetch from a seekable byte source.

use crate::error::{RecoveryError, Result};
use libc::ioctl;
use std::ffi::c_long;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Error as IoError;
use std::io::{Read, Seek, SeekFrom};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// ioctl macro: command.
macro_rules! ioc {
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        (($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
    };
}

/// ioctl macro: read command.
macro_rules! ior {
    ($a:expr, $b:expr, $c:ty) => {
        ioc!(2, $a, $b, std::mem::size_of::<$c>() as c_long)
    };
}

/// ioctl command: get the size of a disk in number of sectors.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);

/// The byte offset of the super-block, regardless of block size.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// The length of the super-block record.
pub const SUPERBLOCK_LEN: u64 = 1024;

/// Returns the size, in bytes, of the device or file at `path`.
///
/// Block and character devices are probed with `BLKGETSIZE64`; plain files use their
/// metadata length directly.
fn byte_size(dev: &File) -> Result<u64> {
    let metadata = dev.metadata()?;
    let file_type = metadata.file_type();
    if file_type.is_block_device() || file_type.is_char_device() {
        let mut sectors: u64 = 0;
        let ret = unsafe { ioctl(dev.as_raw_fd(), BLKGETSIZE64 as _, &mut sectors) };
        if ret < 0 {
            return Err(IoError::last_os_error().into());
        }
        Ok(sectors)
    } else {
        Ok(metadata.len())
    }
}

/// A read-only, block-addressed view over a device or disk image.
///
/// Exclusively owns the underlying file handle; all reads funnel through
/// [`BlockDevice::read_block`]. Block size starts at 4096 (enough to read block 0, which
/// contains the super-block at a fixed byte offset) and is fixed permanently once the
/// caller learns the real block size from the decoded super-block.
pub struct BlockDevice {
    file: File,
    block_size: u32,
}

impl BlockDevice {
    /// Opens `path` read-only and checks it is large enough to hold a super-block.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let size = byte_size(&file)?;
        if size < SUPERBLOCK_OFFSET + SUPERBLOCK_LEN {
            return Err(RecoveryError::FormatError(format!(
                "device is only {size} bytes, too small to hold a super-block"
            )));
        }
        Ok(Self {
            file,
            block_size: 4096,
        })
    }

    /// Returns the current block size.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Sets the block size once it has been learned from the decoded super-block.
    pub fn set_block_size(&mut self, block_size: u32) {
        self.block_size = block_size;
    }

    /// Reads block `number`, returning exactly `block_size` bytes.
    pub fn read_block(&mut self, number: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.block_size as usize];
        self.file
            .seek(SeekFrom::Start(number * self.block_size as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads `len` bytes starting at block `number`'s offset plus `offset`, without
    /// requiring the range to be block-aligned. Used for the fixed super-block slice.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn synthetic_image(blocks: usize, block_size: usize) -> Vec<u8> {
        let mut img = vec![0u8; blocks * block_size];
        for (i, b) in img.iter_mut().enumerate() {
            *b = ((i) % 251) as u8;
        }
        img
    }

    #[test]
    fn round_trip_block_read() {
        let block_size = 1024usize;
        let img = synthetic_image(8, block_size);
        let mut tmp = std::env::temp_dir();
        tmp.push(format!("ext3recover-test-{}", std::process::id()));
        {
            let mut f = File::create(&tmp).unwrap();
            f.write_all(&img).unwrap();
        }

        let mut dev = BlockDevice::open(&tmp).unwrap();
        dev.set_block_size(block_size as u32);
        for b in 0..8u64 {
            let data = dev.read_block(b).unwrap();
            let expected = &img[(b as usize * block_size)..((b as usize + 1) * block_size)];
            assert_eq!(data, expected);
        }

        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn rejects_too_small_device() {
        let mut tmp = std::env::temp_dir();
        tmp.push(format!("ext3recover-test-small-{}", std::process::id()));
        {
            let mut f = File::create(&tmp).unwrap();
            f.write_all(&[0u8; 512]).unwrap();
        }

        let result = BlockDevice::open(&tmp);
        assert!(result.is_err());
        std::fs::remove_file(&tmp).ok();
    }
}
