//! littlefs through the `littlefs2` bindings.
//!
//! `littlefs2` takes its geometry as associated constants, so the storage is fixed to the
//! default region geometry of the target family. The record handed to [`LfsStorage::new`]
//! must match it; every access then goes through the record's shims.

use core::ops::Range;

use littlefs2::consts;
use littlefs2::driver::Storage;
use littlefs2::fs::Filesystem;
use littlefs2::io::{Error as FsError, Result as FsResult};
use log::warn;

use crate::engine::FilesystemEngine;
use crate::{BlockDeviceConfig, PortError, LFS_ERR_INVAL};

#[cfg(not(any(feature = "stm32f4", feature = "stm32l4")))]
compile_error!("littlefs storage needs the `stm32f4` or `stm32l4` feature of lfs_port");

#[cfg(feature = "stm32f4")]
mod geometry {
    pub const PROG_SIZE: usize = 1;
    pub const BLOCK_SIZE: usize = 128 * 1024;
    pub const BLOCK_COUNT: usize = 2;
}

#[cfg(all(feature = "stm32l4", not(feature = "stm32f4")))]
mod geometry {
    pub const PROG_SIZE: usize = 8;
    pub const BLOCK_SIZE: usize = 2 * 1024;
    pub const BLOCK_COUNT: usize = 128;
}

const READ_SIZE: usize = 16;

/// littlefs storage driver over a port record.
pub struct LfsStorage<'c> {
    cfg: &'c BlockDeviceConfig,
}

impl<'c> LfsStorage<'c> {
    pub fn new(cfg: &'c BlockDeviceConfig) -> Result<Self, PortError> {
        let matches = cfg.read_size as usize == READ_SIZE
            && cfg.prog_size as usize == geometry::PROG_SIZE
            && cfg.block_size as usize == geometry::BLOCK_SIZE
            && cfg.block_count as usize == geometry::BLOCK_COUNT;
        if !matches {
            return Err(PortError::Config("geometry differs from the littlefs storage"));
        }
        Ok(LfsStorage { cfg })
    }

    /// Split `[off, off + len)` at block boundaries into `(block, offset, range)` pieces.
    fn pieces(off: usize, len: usize) -> impl Iterator<Item = (u32, u32, Range<usize>)> {
        let bs = geometry::BLOCK_SIZE;
        let mut done = 0;
        core::iter::from_fn(move || {
            if done >= len {
                return None;
            }
            let at = off + done;
            let n = (bs - at % bs).min(len - done);
            let piece = ((at / bs) as u32, (at % bs) as u32, done..done + n);
            done += n;
            Some(piece)
        })
    }

    fn check(off: usize, len: usize) -> FsResult<()> {
        match off.checked_add(len) {
            Some(end) if end <= geometry::BLOCK_SIZE * geometry::BLOCK_COUNT => Ok(()),
            _ => Err(FsError::INVALID),
        }
    }
}

fn io(code: i32) -> FsResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(FsError::IO)
    }
}

impl Storage for LfsStorage<'_> {
    const READ_SIZE: usize = READ_SIZE;
    const WRITE_SIZE: usize = geometry::PROG_SIZE;
    const BLOCK_SIZE: usize = geometry::BLOCK_SIZE;
    const BLOCK_COUNT: usize = geometry::BLOCK_COUNT;
    const BLOCK_CYCLES: isize = 500;
    type CACHE_SIZE = consts::U256;
    type LOOKAHEAD_SIZE = consts::U16;

    fn read(&mut self, off: usize, buf: &mut [u8]) -> FsResult<usize> {
        Self::check(off, buf.len())?;
        for (block, at, range) in Self::pieces(off, buf.len()) {
            io((self.cfg.read)(self.cfg, block, at, &mut buf[range]))?;
        }
        Ok(buf.len())
    }

    fn write(&mut self, off: usize, data: &[u8]) -> FsResult<usize> {
        Self::check(off, data.len())?;
        for (block, at, range) in Self::pieces(off, data.len()) {
            io((self.cfg.prog)(self.cfg, block, at, &data[range]))?;
        }
        Ok(data.len())
    }

    fn erase(&mut self, off: usize, len: usize) -> FsResult<usize> {
        Self::check(off, len)?;
        if off % geometry::BLOCK_SIZE != 0 || len % geometry::BLOCK_SIZE != 0 {
            return Err(FsError::INVALID);
        }
        let first = off / geometry::BLOCK_SIZE;
        for block in first..first + len / geometry::BLOCK_SIZE {
            io((self.cfg.erase)(self.cfg, block as u32))?;
        }
        Ok(len)
    }
}

/// littlefs as a [`FilesystemEngine`], for [`mount_or_format`](crate::mount_or_format).
#[derive(Clone, Copy, Debug, Default)]
pub struct Littlefs;

impl FilesystemEngine for Littlefs {
    fn mount(&mut self, cfg: &BlockDeviceConfig) -> i32 {
        let Ok(mut storage) = LfsStorage::new(cfg) else {
            return LFS_ERR_INVAL;
        };
        match Filesystem::mount_and_then(&mut storage, |_| Ok(())) {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }

    fn format(&mut self, cfg: &BlockDeviceConfig) -> i32 {
        let Ok(mut storage) = LfsStorage::new(cfg) else {
            return LFS_ERR_INVAL;
        };
        match Filesystem::format(&mut storage) {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }
}

/// Mount littlefs over `cfg`, run `f` and unmount again.
pub fn mount_and_then<'c, R>(
    cfg: &'c BlockDeviceConfig,
    f: impl FnOnce(&Filesystem<'_, LfsStorage<'c>>) -> FsResult<R>,
) -> Result<R, PortError> {
    let mut storage = LfsStorage::new(cfg)?;
    Filesystem::mount_and_then(&mut storage, f).map_err(|e| {
        warn!("littlefs: {:?}", e.code());
        PortError::Filesystem(e.code())
    })
}
