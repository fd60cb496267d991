//! Block-device port for a littlefs-style filesystem engine.
//!
//! The engine sees four free functions taking its configuration record plus a block index,
//! an offset inside the block and a buffer. They turn `(block, offset)` into a region offset,
//! call the flash abstraction layer, and fold its result into the engine's convention:
//! `0` for success, a negative code for any failure.

use std::cell::RefCell;

use flash_core::{Diagnostics, FlashAbstractionLayer, FlashError, Result as FlashResult};
use log::warn;
use thiserror::Error;

pub mod config;
pub mod engine;
#[cfg(feature = "littlefs")]
pub mod littlefs;

pub use config::PortConfig;
pub use engine::{erase_region, mount_or_format, prepare_region, FilesystemEngine, MountOutcome};

pub const LFS_ERR_OK: i32 = 0;
pub const LFS_ERR_IO: i32 = -5;
pub const LFS_ERR_INVAL: i32 = -22;
pub const LFS_ERR_CORRUPT: i32 = -84;

pub type ReadFn = fn(&BlockDeviceConfig, u32, u32, &mut [u8]) -> i32;
pub type ProgFn = fn(&BlockDeviceConfig, u32, u32, &[u8]) -> i32;
pub type EraseFn = fn(&BlockDeviceConfig, u32) -> i32;
pub type SyncFn = fn(&BlockDeviceConfig) -> i32;

#[derive(Error, Debug)]
pub enum PortError {
    #[error("invalid filesystem configuration: {0}")]
    Config(&'static str),
    #[error(transparent)]
    Flash(#[from] FlashError),
    #[error("region at {addr:#010x}+{size:#x} is not erased")]
    NotErased { addr: u32, size: u32 },
    #[error("format failed with code {0}")]
    Format(i32),
    #[error("mount failed with code {0}")]
    Mount(i32),
    #[error("filesystem operation failed with code {0}")]
    Filesystem(i32),
}

/// Configuration record handed to the filesystem engine.
///
/// Owns the flash abstraction layer as its context; the shims borrow it for the duration of
/// one call, which also keeps two flash operations from overlapping.
pub struct BlockDeviceConfig {
    pub context: RefCell<Box<dyn FlashAbstractionLayer>>,
    pub read: ReadFn,
    pub prog: ProgFn,
    pub erase: EraseFn,
    pub sync: SyncFn,
    pub read_size: u32,
    pub prog_size: u32,
    pub block_size: u32,
    pub block_count: u32,
    pub block_cycles: i32,
    pub cache_size: u32,
    pub lookahead_size: u32,
}

impl BlockDeviceConfig {
    pub fn new(fal: Box<dyn FlashAbstractionLayer>, port: PortConfig) -> Result<Self, PortError> {
        port.validate(fal.family(), fal.region())?;
        Ok(BlockDeviceConfig {
            context: RefCell::new(fal),
            read: fal_read,
            prog: fal_prog,
            erase: fal_erase,
            sync: fal_sync,
            read_size: port.read_size,
            prog_size: port.prog_size,
            block_size: port.block_size,
            block_count: port.block_count,
            block_cycles: port.block_cycles,
            cache_size: port.cache_size,
            lookahead_size: port.lookahead_size,
        })
    }

    pub fn geometry(&self) -> PortConfig {
        PortConfig {
            read_size: self.read_size,
            prog_size: self.prog_size,
            block_size: self.block_size,
            block_count: self.block_count,
            block_cycles: self.block_cycles,
            cache_size: self.cache_size,
            lookahead_size: self.lookahead_size,
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.context.borrow().diagnostics()
    }

    /// Run `f` with the flash layer, outside of the shims.
    pub fn with_fal<R>(&self, f: impl FnOnce(&mut dyn FlashAbstractionLayer) -> R) -> R {
        f(&mut **self.context.borrow_mut())
    }

    /// Region offset of `off` bytes into `block`, if `len` bytes from there stay in the block.
    fn offset_of(&self, block: u32, off: u32, len: usize) -> Option<u32> {
        if block >= self.block_count {
            return None;
        }
        let end = (off as u64).checked_add(len as u64)?;
        if end > self.block_size as u64 {
            return None;
        }
        block.checked_mul(self.block_size)?.checked_add(off)
    }

    fn call<T>(
        &self,
        op: &str,
        f: impl FnOnce(&mut dyn FlashAbstractionLayer) -> FlashResult<T>,
    ) -> Option<T> {
        let mut fal = match self.context.try_borrow_mut() {
            Ok(fal) => fal,
            Err(_) => {
                warn!("lfs: {} while another flash operation is in progress", op);
                return None;
            }
        };
        f(&mut **fal).ok()
    }
}

fn status(done: Option<bool>) -> i32 {
    match done {
        Some(true) => LFS_ERR_OK,
        _ => LFS_ERR_IO,
    }
}

pub fn fal_read(c: &BlockDeviceConfig, block: u32, off: u32, buffer: &mut [u8]) -> i32 {
    let Some(offset) = c.offset_of(block, off, buffer.len()) else {
        warn!("lfs: read outside block {} ({}+{})", block, off, buffer.len());
        return LFS_ERR_IO;
    };
    let len = buffer.len();
    status(c.call("read", |fal| fal.read(offset, buffer)).map(|n| n == len))
}

pub fn fal_prog(c: &BlockDeviceConfig, block: u32, off: u32, buffer: &[u8]) -> i32 {
    let Some(offset) = c.offset_of(block, off, buffer.len()) else {
        warn!("lfs: prog outside block {} ({}+{})", block, off, buffer.len());
        return LFS_ERR_IO;
    };
    status(c.call("prog", |fal| fal.write(offset, buffer)).map(|n| n == buffer.len()))
}

/// Erase always covers the whole block.
pub fn fal_erase(c: &BlockDeviceConfig, block: u32) -> i32 {
    let Some(offset) = c.offset_of(block, 0, c.block_size as usize) else {
        warn!("lfs: erase of block {} beyond block_count", block);
        return LFS_ERR_IO;
    };
    let size = c.block_size;
    status(c.call("erase", |fal| fal.erase(offset, size)).map(|n| n == size))
}

pub fn fal_sync(c: &BlockDeviceConfig) -> i32 {
    status(c.call("sync", |fal| fal.sync()).map(|()| true))
}

#[cfg(feature = "mock")]
pub mod mock {
    use super::*;
    use flash_core::FlashRegion;
    use flash_ll::sim::{fal_with_env, SimEnv};
    use flash_ll::{create_flash_abstraction_layer, TARGET_FAMILY};
    use flash_mock::SimFlash;

    /// Port over simulated flash of the target family, with the default geometry.
    pub fn new_mock() -> anyhow::Result<(SimFlash, BlockDeviceConfig)> {
        let env = SimEnv::new()?;
        let fal = fal_with_env(&env)?;
        let port = PortConfig::for_family(TARGET_FAMILY, fal.region())?;
        let cfg = BlockDeviceConfig::new(fal, port)?;
        Ok((env.flash, cfg))
    }

    /// Same as [`new_mock`] over a caller-chosen region and geometry.
    pub fn new_mock_with(
        region: FlashRegion,
        port: PortConfig,
    ) -> anyhow::Result<(SimFlash, BlockDeviceConfig)> {
        let flash = SimFlash::new(TARGET_FAMILY);
        let fal = create_flash_abstraction_layer(flash.clone(), Some(region))?;
        let cfg = BlockDeviceConfig::new(fal, port)?;
        Ok((flash, cfg))
    }
}
