use flash_core::FlashAbstractionLayer;
use log::{info, warn};

use crate::{BlockDeviceConfig, PortError};

/// The filesystem side of the port: anything that can mount and format over the record.
///
/// Both calls return the engine's own status code, `0` on success.
pub trait FilesystemEngine {
    fn mount(&mut self, cfg: &BlockDeviceConfig) -> i32;
    fn format(&mut self, cfg: &BlockDeviceConfig) -> i32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted,
    Formatted,
}

/// Mount, or format and mount again if the first mount fails. Gives up after one format.
pub fn mount_or_format<E: FilesystemEngine + ?Sized>(
    engine: &mut E,
    cfg: &BlockDeviceConfig,
) -> Result<MountOutcome, PortError> {
    let err = engine.mount(cfg);
    if err == 0 {
        info!("filesystem mounted");
        return Ok(MountOutcome::Mounted);
    }
    info!("mount failed ({}), formatting", err);
    let err = engine.format(cfg);
    if err != 0 {
        warn!("format failed ({})", err);
        return Err(PortError::Format(err));
    }
    let err = engine.mount(cfg);
    if err != 0 {
        warn!("mount after format failed ({})", err);
        return Err(PortError::Mount(err));
    }
    info!("filesystem formatted and mounted");
    Ok(MountOutcome::Formatted)
}

/// Erase `[offset, offset + size)` of the region and check that it reads back erased.
pub fn erase_region(
    fal: &mut dyn FlashAbstractionLayer,
    offset: u32,
    size: u32,
) -> Result<(), PortError> {
    fal.erase(offset, size)?;
    let addr = fal.region().base_addr(fal.family()) + offset;
    if !fal.verify_erased(addr, size) {
        return Err(PortError::NotErased { addr, size });
    }
    info!("region {:#010x}+{:#x} erased and verified", addr, size);
    Ok(())
}

/// Wipe the whole region before first mount.
pub fn prepare_region(fal: &mut dyn FlashAbstractionLayer) -> Result<(), PortError> {
    let size = fal.region().size;
    erase_region(fal, 0, size)
}
