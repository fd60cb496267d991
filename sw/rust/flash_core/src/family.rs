//! Static descriptions of the supported memory families.
//!
//! A family is described by an ordered table of runs, each run being a number of
//! equally sized erase units starting at a given address. Families with uniform pages
//! need one run per bank; sector families (like the STM32F4) need one run per sector size.

use crate::region::FlashRegion;

/// What the controller calls its erase unit. Only used for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraseKind {
    Sector,
    Page,
}

/// `unit_count` erase units of `unit_size` bytes each, starting at `addr`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitRun {
    pub addr: u32,
    pub unit_size: u32,
    pub unit_count: u32,
}

impl UnitRun {
    pub const fn len(&self) -> u32 {
        self.unit_size * self.unit_count
    }

    pub const fn addr_end(&self) -> u32 {
        self.addr + self.len()
    }

    pub fn contains_addr(&self, addr: u32) -> bool {
        addr >= self.addr && addr < self.addr_end()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MemoryFamily {
    pub name: &'static str,
    pub erase_kind: EraseKind,
    /// Ordered, non-overlapping and contiguous.
    pub runs: &'static [UnitRun],
    /// Required offset and length granularity of a program operation, in bytes.
    pub program_width: u32,
    pub erased_value: u8,
    /// Region handed to the filesystem when the caller does not pick one.
    pub default_region: FlashRegion,
}

impl MemoryFamily {
    pub fn base_addr(&self) -> u32 {
        self.runs[0].addr
    }

    pub fn end_addr(&self) -> u32 {
        self.runs[self.runs.len() - 1].addr_end()
    }

    pub fn total_size(&self) -> u32 {
        self.runs.iter().map(UnitRun::len).sum()
    }

    pub fn unit_count(&self) -> u32 {
        self.runs.iter().map(|r| r.unit_count).sum()
    }

    pub fn contains_addr(&self, addr: u32) -> bool {
        addr >= self.base_addr() && addr < self.end_addr()
    }

    /// Runs must be sorted and must leave no holes between them.
    pub fn is_well_formed(&self) -> bool {
        !self.runs.is_empty()
            && self.runs.iter().all(|r| r.unit_size > 0 && r.unit_count > 0)
            && self.runs.windows(2).all(|w| w[0].addr_end() == w[1].addr)
            && self.program_width.is_power_of_two()
    }

    pub fn is_aligned(&self, value: u32) -> bool {
        value % self.program_width == 0
    }
}

const KIB: u32 = 1024;

/// STM32F401RE: 512 KiB in eight sectors of unequal size, byte programming.
pub static STM32F401RE: MemoryFamily = MemoryFamily {
    name: "STM32F401RE",
    erase_kind: EraseKind::Sector,
    runs: &[
        UnitRun { addr: 0x0800_0000, unit_size: 16 * KIB, unit_count: 4 },
        UnitRun { addr: 0x0801_0000, unit_size: 64 * KIB, unit_count: 1 },
        UnitRun { addr: 0x0802_0000, unit_size: 128 * KIB, unit_count: 3 },
    ],
    program_width: 1,
    erased_value: 0xFF,
    // sectors 6 and 7
    default_region: FlashRegion { offset: 0x4_0000, size: 256 * KIB },
};

/// STM32L476RG: 1 MiB in two banks of 256 pages of 2 KiB, double-word programming.
pub static STM32L476RG: MemoryFamily = MemoryFamily {
    name: "STM32L476RG",
    erase_kind: EraseKind::Page,
    runs: &[
        UnitRun { addr: 0x0800_0000, unit_size: 2 * KIB, unit_count: 256 },
        UnitRun { addr: 0x0808_0000, unit_size: 2 * KIB, unit_count: 256 },
    ],
    program_width: 8,
    erased_value: 0xFF,
    // start of bank 2
    default_region: FlashRegion { offset: 0x8_0000, size: 256 * KIB },
};
