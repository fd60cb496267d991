//! Address to erase-unit mapping.
//!
//! Unit boundaries never change for a family, so nothing here is cached: every lookup walks
//! the run table from the start.

use crate::error::{FlashError, Result};
use crate::family::MemoryFamily;

/// A single sector or page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EraseUnit {
    /// Index across the whole family, as the controller numbers it.
    pub index: u32,
    pub addr: u32,
    pub size: u32,
}

impl EraseUnit {
    /// One byte past the last byte of the unit.
    pub fn addr_end(&self) -> u32 {
        self.addr + self.size
    }

    pub fn contains_addr(&self, addr: u32) -> bool {
        addr >= self.addr && addr < self.addr_end()
    }
}

impl MemoryFamily {
    /// Unit containing the absolute address `addr`.
    ///
    /// An address equal to a boundary belongs to the unit starting there. Addresses outside
    /// the family are rejected rather than clamped to the first or last unit.
    pub fn sector_of(&self, addr: u32) -> Result<EraseUnit> {
        let mut index = 0;
        for run in self.runs {
            if run.contains_addr(addr) {
                let n = (addr - run.addr) / run.unit_size;
                return Ok(EraseUnit {
                    index: index + n,
                    addr: run.addr + n * run.unit_size,
                    size: run.unit_size,
                });
            }
            index += run.unit_count;
        }
        Err(FlashError::OutOfRange { offset: addr, len: 1 })
    }

    pub fn unit(&self, index: u32) -> Option<EraseUnit> {
        let mut first = 0;
        for run in self.runs {
            if index < first + run.unit_count {
                let n = index - first;
                return Some(EraseUnit {
                    index,
                    addr: run.addr + n * run.unit_size,
                    size: run.unit_size,
                });
            }
            first += run.unit_count;
        }
        None
    }

    /// First and last unit overlapping `[addr, addr + len)`.
    pub fn units_covering(&self, addr: u32, len: u32) -> Result<(EraseUnit, EraseUnit)> {
        if len == 0 {
            return Err(FlashError::InvalidArgument("zero length"));
        }
        let end = addr
            .checked_add(len)
            .ok_or(FlashError::OutOfRange { offset: addr, len })?;
        let first = self.sector_of(addr)?;
        let last = self
            .sector_of(end - 1)
            .map_err(|_| FlashError::OutOfRange { offset: addr, len })?;
        Ok((first, last))
    }

    /// True for the start of any unit and for the end of the family.
    pub fn is_unit_boundary(&self, addr: u32) -> bool {
        if addr == self.end_addr() {
            return true;
        }
        match self.sector_of(addr) {
            Ok(unit) => unit.addr == addr,
            Err(_) => false,
        }
    }
}
