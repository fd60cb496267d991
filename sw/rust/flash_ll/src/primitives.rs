use core::ops::{Deref, DerefMut};

use flash_core::{
    Diagnostics, FlashAbstractionLayer, FlashController, FlashError, FlashRegion, HardwareFault,
    MemoryFamily, Result,
};
use log::{debug, trace, warn};

use crate::verify;

/// Widest program chunk any supported controller accepts.
pub const MAX_PROGRAM_WIDTH: usize = 32;

#[repr(C, align(8))]
struct Staging([u8; MAX_PROGRAM_WIDTH]);

/// Controller between `unlock` and `lock`. Dropping it locks the controller again.
struct Unlocked<'a, C: FlashController> {
    ctrl: &'a mut C,
}

impl<'a, C: FlashController> Unlocked<'a, C> {
    fn new(ctrl: &'a mut C) -> core::result::Result<Self, HardwareFault> {
        if let Err(e) = ctrl.unlock() {
            ctrl.lock();
            return Err(e);
        }
        ctrl.clear_status();
        Ok(Self { ctrl })
    }
}

impl<C: FlashController> Deref for Unlocked<'_, C> {
    type Target = C;
    fn deref(&self) -> &C {
        self.ctrl
    }
}

impl<C: FlashController> DerefMut for Unlocked<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.ctrl
    }
}

impl<C: FlashController> Drop for Unlocked<'_, C> {
    fn drop(&mut self) {
        self.ctrl.lock();
    }
}

/// Flash abstraction layer for any family, driven through its controller.
///
/// The family descriptor supplies everything that differs between chips: the erase-unit
/// table, the program width and the erased value.
pub struct FamilyFal<C: FlashController> {
    ctrl: C,
    family: &'static MemoryFamily,
    region: FlashRegion,
    diag: Diagnostics,
}

impl<C: FlashController> FamilyFal<C> {
    pub fn new(ctrl: C, region: FlashRegion) -> Result<Self> {
        let family = ctrl.family();
        if family.program_width as usize > MAX_PROGRAM_WIDTH || !family.is_well_formed() {
            return Err(FlashError::InvalidArgument("unsupported family descriptor"));
        }
        let region = FlashRegion::new(family, region.offset, region.size)?;
        debug!(
            "fal: {} region {:#010x}+{:#x}",
            family.name,
            region.base_addr(family),
            region.size
        );
        Ok(Self { ctrl, family, region, diag: Diagnostics::new() })
    }

    pub fn with_default_region(ctrl: C) -> Result<Self> {
        let region = ctrl.family().default_region;
        Self::new(ctrl, region)
    }

    pub fn controller(&self) -> &C {
        &self.ctrl
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.ctrl
    }

    fn abs(&self, offset: u32) -> u32 {
        self.region.base_addr(self.family) + offset
    }

    fn fail<T>(&mut self, op: &str, err: FlashError) -> Result<T> {
        self.diag.record_error();
        warn!("fal: {} failed: {}", op, err);
        Err(err)
    }

    fn try_erase(&mut self, offset: u32, size: u32) -> Result<()> {
        if size == 0 {
            return Err(FlashError::InvalidArgument("zero length"));
        }
        self.region.check(offset, size)?;
        let (first, last) = self.family.units_covering(self.abs(offset), size)?;
        debug!(
            "fal: erase {:?} {}..={} for offset {:#x} size {}",
            self.family.erase_kind, first.index, last.index, offset, size
        );
        {
            let mut ctrl = Unlocked::new(&mut self.ctrl)?;
            for index in first.index..=last.index {
                if index != first.index {
                    ctrl.service_watchdog();
                }
                trace!("fal: erase unit {}", index);
                ctrl.erase_unit(index)?;
            }
        }
        verify::verify_erased_span(
            &mut self.ctrl,
            first.addr,
            last.addr_end() - first.addr,
            self.family.erased_value,
        )
    }

    fn try_write(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(FlashError::InvalidArgument("empty buffer"));
        }
        let len = u32::try_from(data.len())
            .map_err(|_| FlashError::OutOfRange { offset, len: u32::MAX })?;
        self.region.check(offset, len)?;
        if !self.family.is_aligned(offset) || !self.family.is_aligned(len) {
            return Err(FlashError::Alignment { offset, len, width: self.family.program_width });
        }
        debug!("fal: write offset {:#x} size {}", offset, len);

        let addr = self.abs(offset);
        let width = self.family.program_width as usize;
        let fill = self.family.erased_value;
        let mut staging = Staging([fill; MAX_PROGRAM_WIDTH]);
        let mut ctrl = Unlocked::new(&mut self.ctrl)?;
        for (i, chunk) in data.chunks(width).enumerate() {
            let at = addr + (i * width) as u32;
            // an all-erased chunk needs no programming, read-back still has to match
            if width == 1 || chunk.iter().any(|&b| b != fill) {
                staging.0[..width].copy_from_slice(chunk);
                ctrl.program(at, &staging.0[..width])?;
            }
            verify::verify_programmed(&mut *ctrl, at, chunk)?;
        }
        Ok(())
    }

    fn try_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Err(FlashError::InvalidArgument("empty buffer"));
        }
        let len = u32::try_from(buf.len())
            .map_err(|_| FlashError::OutOfRange { offset, len: u32::MAX })?;
        self.region.check(offset, len)?;
        debug!("fal: read offset {:#x} size {}", offset, len);
        let addr = self.abs(offset);
        self.ctrl.read(addr, buf)?;
        Ok(())
    }

    fn try_verify_erased(&mut self, addr: u32, size: u32) -> Result<()> {
        let in_family = addr
            .checked_add(size)
            .map_or(false, |end| self.family.contains_addr(addr) && end <= self.family.end_addr());
        if !in_family {
            return Err(FlashError::OutOfRange { offset: addr, len: size });
        }
        verify::verify_erased_span(&mut self.ctrl, addr, size, self.family.erased_value)
    }
}

impl<C: FlashController> FlashAbstractionLayer for FamilyFal<C> {
    fn erase(&mut self, offset: u32, size: u32) -> Result<u32> {
        match self.try_erase(offset, size) {
            Ok(()) => Ok(size),
            Err(e) => self.fail("erase", e),
        }
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<usize> {
        match self.try_write(offset, data) {
            Ok(()) => {
                self.diag.record_write();
                Ok(data.len())
            }
            Err(e) => self.fail("write", e),
        }
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize> {
        match self.try_read(offset, buf) {
            Ok(()) => {
                self.diag.record_read();
                Ok(buf.len())
            }
            Err(e) => self.fail("read", e),
        }
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn verify_erased(&mut self, addr: u32, size: u32) -> bool {
        if size == 0 {
            return true;
        }
        match self.try_verify_erased(addr, size) {
            Ok(()) => true,
            Err(e) => {
                self.diag.record_error();
                warn!("fal: flash not erased: {}", e);
                false
            }
        }
    }

    fn family(&self) -> &'static MemoryFamily {
        self.family
    }

    fn region(&self) -> FlashRegion {
        self.region
    }

    fn diagnostics(&self) -> Diagnostics {
        self.diag
    }
}
