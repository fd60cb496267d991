use flash_core::{FlashRegion, MemoryFamily};

use crate::PortError;

/// Geometry part of the filesystem engine's configuration record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortConfig {
    pub read_size: u32,
    /// Must equal the family's program width.
    pub prog_size: u32,
    pub block_size: u32,
    pub block_count: u32,
    /// Wear-leveling hint, passed through untouched.
    pub block_cycles: i32,
    pub cache_size: u32,
    pub lookahead_size: u32,
}

impl PortConfig {
    /// One filesystem block per largest erase unit of the region.
    pub fn for_family(family: &MemoryFamily, region: FlashRegion) -> Result<Self, PortError> {
        let base = region.base_addr(family);
        let (first, last) = family.units_covering(base, region.size)?;
        let block_size = (first.index..=last.index)
            .filter_map(|i| family.unit(i))
            .map(|u| u.size)
            .max()
            .unwrap_or(first.size);
        let cfg = PortConfig {
            read_size: 16,
            prog_size: family.program_width,
            block_size,
            block_count: region.size / block_size,
            block_cycles: 500,
            cache_size: 256,
            lookahead_size: 16,
        };
        cfg.validate(family, region)?;
        Ok(cfg)
    }

    pub fn validate(&self, family: &MemoryFamily, region: FlashRegion) -> Result<(), PortError> {
        if self.read_size == 0 {
            return Err(PortError::Config("read_size must be non-zero"));
        }
        if self.prog_size != family.program_width {
            return Err(PortError::Config("prog_size must equal the family program width"));
        }
        if self.block_size == 0 || self.block_count == 0 {
            return Err(PortError::Config("empty block geometry"));
        }
        if self.block_size % self.read_size != 0 || self.block_size % self.prog_size != 0 {
            return Err(PortError::Config("block_size must be a multiple of read and prog size"));
        }
        if self.cache_size == 0
            || self.cache_size % self.read_size != 0
            || self.cache_size % self.prog_size != 0
            || self.block_size % self.cache_size != 0
        {
            return Err(PortError::Config("cache_size must fit read, prog and block size"));
        }
        if self.lookahead_size == 0 || self.lookahead_size % 8 != 0 {
            return Err(PortError::Config("lookahead_size must be a multiple of 8"));
        }
        if self.block_size as u64 * self.block_count as u64 > region.size as u64 {
            return Err(PortError::Config("blocks exceed the flash region"));
        }
        let base = region.base_addr(family);
        let misfit = (0..=self.block_count)
            .any(|i| !family.is_unit_boundary(base + i * self.block_size));
        if misfit {
            return Err(PortError::Config("block boundaries must fall on erase-unit boundaries"));
        }
        Ok(())
    }
}
