use crate::error::{FlashError, Result};
use crate::family::MemoryFamily;

/// The part of a family's flash that belongs to the filesystem.
///
/// `offset` is relative to the family base address. Both ends sit on erase-unit
/// boundaries, so rounding an erase outwards never leaves the region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashRegion {
    pub offset: u32,
    pub size: u32,
}

impl FlashRegion {
    pub fn new(family: &MemoryFamily, offset: u32, size: u32) -> Result<Self> {
        if size == 0 {
            return Err(FlashError::InvalidArgument("empty region"));
        }
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= family.total_size())
            .ok_or(FlashError::OutOfRange { offset, len: size })?;
        let base = family.base_addr();
        if !family.is_unit_boundary(base + offset) || !family.is_unit_boundary(base + end) {
            return Err(FlashError::InvalidArgument(
                "region must start and end on erase-unit boundaries",
            ));
        }
        Ok(FlashRegion { offset, size })
    }

    /// Absolute address of the first byte of the region.
    pub fn base_addr(&self, family: &MemoryFamily) -> u32 {
        family.base_addr() + self.offset
    }

    /// Whether `[offset, offset + len)`, relative to the region, lies inside it.
    pub fn contains(&self, offset: u32, len: u32) -> bool {
        match offset.checked_add(len) {
            Some(end) => end <= self.size,
            None => false,
        }
    }

    /// Same as [`contains`](Self::contains) but as a typed error.
    pub fn check(&self, offset: u32, len: u32) -> Result<()> {
        if self.contains(offset, len) {
            Ok(())
        } else {
            Err(FlashError::OutOfRange { offset, len })
        }
    }
}
