//! STM32 embedded flash interface, driven through its registers.
//!
//! The F4 interface erases numbered sectors and programs with a selectable parallelism (we
//! use x8, one byte at a time). The L4 interface erases 2 KiB pages addressed by bank and
//! page number and only programs double-words, written as two consecutive 32-bit stores.

use core::ptr;

use flash_core::{EraseKind, FlashController, HardwareFault, MemoryFamily};

const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xCDEF_89AB;

const CR_PG: u32 = 1 << 0;
const CR_STRT: u32 = 1 << 16;
const CR_LOCK: u32 = 1 << 31;
const SR_EOP: u32 = 1 << 0;
const SR_BSY: u32 = 1 << 16;
const ACR_ICEN: u32 = 1 << 9;
const ACR_DCEN: u32 = 1 << 10;
const ACR_ICRST: u32 = 1 << 11;
const ACR_DCRST: u32 = 1 << 12;

// STM32F4
const F4_FLASH_BASE: usize = 0x4002_3C00;
const F4_CR_SER: u32 = 1 << 1;
const F4_CR_SNB_SHIFT: u32 = 3;
const F4_CR_SNB_MASK: u32 = 0xF << F4_CR_SNB_SHIFT;
const F4_CR_PSIZE_MASK: u32 = 0b11 << 8;

// STM32L4
const L4_FLASH_BASE: usize = 0x4002_2000;
const L4_CR_PER: u32 = 1 << 1;
const L4_CR_PNB_SHIFT: u32 = 3;
const L4_CR_PNB_MASK: u32 = 0xFF << L4_CR_PNB_SHIFT;
const L4_CR_BKER: u32 = 1 << 11;
const L4_PAGES_PER_BANK: u32 = 256;

/// Register offsets (in bytes) and status error bits of one interface variant.
struct Layout {
    base: usize,
    acr: usize,
    keyr: usize,
    sr: usize,
    cr: usize,
    errors: &'static [(u32, HardwareFault)],
}

static F4_LAYOUT: Layout = Layout {
    base: F4_FLASH_BASE,
    acr: 0x00,
    keyr: 0x04,
    sr: 0x0C,
    cr: 0x10,
    errors: &[
        (1 << 4, HardwareFault::WriteProtection),
        (1 << 5, HardwareFault::ProgramAlignment),
        (1 << 6, HardwareFault::ProgramAlignment), // PGPERR: parallelism
        (1 << 7, HardwareFault::ProgramSequence),
        (1 << 1, HardwareFault::Operation),
        (1 << 8, HardwareFault::Operation), // RDERR
    ],
};

static L4_LAYOUT: Layout = Layout {
    base: L4_FLASH_BASE,
    acr: 0x00,
    keyr: 0x08,
    sr: 0x10,
    cr: 0x14,
    errors: &[
        (1 << 4, HardwareFault::WriteProtection),
        (1 << 5, HardwareFault::ProgramAlignment),
        (1 << 6, HardwareFault::ProgramAlignment), // SIZERR
        (1 << 7, HardwareFault::ProgramSequence),
        (1 << 8, HardwareFault::ProgramSequence), // MISERR
        (1 << 9, HardwareFault::ProgramSequence), // FASTERR
        (1 << 3, HardwareFault::Operation),       // PROGERR
        (1 << 1, HardwareFault::Operation),
        (1 << 14, HardwareFault::Operation), // RDERR
    ],
};

const DEFAULT_SPIN_LIMIT: u32 = 4_000_000;

pub struct Stm32Controller {
    family: &'static MemoryFamily,
    layout: &'static Layout,
    regs: *mut u8,
    mem: *mut u8,
    spin_limit: u32,
}

impl Stm32Controller {
    /// # Safety
    ///
    /// `regs` must point at the flash interface register block matching `family`, and
    /// `mem` at the memory-mapped flash array (the family base address), valid for the whole
    /// family size. Nothing else may touch either while the controller exists.
    pub unsafe fn new(family: &'static MemoryFamily, regs: *mut u8, mem: *mut u8) -> Self {
        let layout = match family.erase_kind {
            EraseKind::Sector => &F4_LAYOUT,
            EraseKind::Page => &L4_LAYOUT,
        };
        Self { family, layout, regs, mem, spin_limit: DEFAULT_SPIN_LIMIT }
    }

    /// Controller at the chip's own register and flash addresses.
    ///
    /// # Safety
    ///
    /// See [`new`](Self::new); only sound when running on `family`.
    pub unsafe fn for_target(family: &'static MemoryFamily) -> Self {
        let base = match family.erase_kind {
            EraseKind::Sector => F4_LAYOUT.base,
            EraseKind::Page => L4_LAYOUT.base,
        };
        Self::new(family, base as *mut u8, family.base_addr() as usize as *mut u8)
    }

    pub fn with_spin_limit(mut self, spin_limit: u32) -> Self {
        self.spin_limit = spin_limit;
        self
    }

    fn reg_read(&self, off: usize) -> u32 {
        // SAFETY: offsets come from the layout tables, `new` guarantees the block
        unsafe { ptr::read_volatile(self.regs.add(off) as *const u32) }
    }

    fn reg_write(&mut self, off: usize, value: u32) {
        // SAFETY: as for reg_read
        unsafe { ptr::write_volatile(self.regs.add(off) as *mut u32, value) }
    }

    fn cr_modify(&mut self, clear: u32, set: u32) {
        let cr = self.layout.cr;
        let v = (self.reg_read(cr) & !clear) | set;
        self.reg_write(cr, v);
    }

    fn mem_offset(&self, addr: u32, len: usize) -> Result<usize, HardwareFault> {
        let off = addr
            .checked_sub(self.family.base_addr())
            .ok_or(HardwareFault::Operation)? as usize;
        if off + len > self.family.total_size() as usize {
            return Err(HardwareFault::Operation);
        }
        Ok(off)
    }

    /// Drop instruction and data cache lines that may still hold the old contents of the
    /// array. A cache can only be reset while disabled; caches that were off stay off.
    fn flush_caches(&mut self) {
        let acr_off = self.layout.acr;
        let acr = self.reg_read(acr_off);
        let enabled = acr & (ACR_ICEN | ACR_DCEN);
        if enabled == 0 {
            return;
        }
        let mut resets = 0;
        if acr & ACR_ICEN != 0 {
            resets |= ACR_ICRST;
        }
        if acr & ACR_DCEN != 0 {
            resets |= ACR_DCRST;
        }
        let disabled = acr & !(enabled | resets);
        self.reg_write(acr_off, disabled);
        self.reg_write(acr_off, disabled | resets);
        self.reg_write(acr_off, disabled);
        self.reg_write(acr_off, disabled | enabled);
    }

    /// Spin until BSY drops, then report the first error flag that is set.
    fn wait_ready(&self) -> Result<(), HardwareFault> {
        let mut spins = 0;
        while self.reg_read(self.layout.sr) & SR_BSY != 0 {
            spins += 1;
            if spins >= self.spin_limit {
                return Err(HardwareFault::Timeout);
            }
            core::hint::spin_loop();
        }
        let sr = self.reg_read(self.layout.sr);
        match self.layout.errors.iter().find(|(bit, _)| sr & bit != 0) {
            Some(&(_, fault)) => Err(fault),
            None => Ok(()),
        }
    }
}

impl FlashController for Stm32Controller {
    fn family(&self) -> &'static MemoryFamily {
        self.family
    }

    fn unlock(&mut self) -> Result<(), HardwareFault> {
        if self.is_locked() {
            let keyr = self.layout.keyr;
            self.reg_write(keyr, KEY1);
            self.reg_write(keyr, KEY2);
        }
        // a wrong key sequence keeps the interface locked until reset
        if self.is_locked() {
            return Err(HardwareFault::Locked);
        }
        Ok(())
    }

    fn lock(&mut self) {
        self.cr_modify(0, CR_LOCK);
    }

    fn is_locked(&self) -> bool {
        self.reg_read(self.layout.cr) & CR_LOCK != 0
    }

    fn clear_status(&mut self) {
        // flags are write-one-to-clear, write back only the ones that are set
        let sr = self.layout.sr;
        let mask = self.layout.errors.iter().fold(SR_EOP, |m, (bit, _)| m | bit);
        let pending = self.reg_read(sr) & mask;
        if pending != 0 {
            self.reg_write(sr, pending);
        }
    }

    fn program(&mut self, addr: u32, chunk: &[u8]) -> Result<(), HardwareFault> {
        let width = self.family.program_width;
        if chunk.len() as u32 != width || addr % width != 0 {
            return Err(HardwareFault::ProgramAlignment);
        }
        let off = self.mem_offset(addr, chunk.len())?;
        self.wait_ready()?;
        match self.family.erase_kind {
            EraseKind::Sector => {
                // PSIZE = x8
                self.cr_modify(F4_CR_PSIZE_MASK, CR_PG);
                for (i, &b) in chunk.iter().enumerate() {
                    // SAFETY: mem_offset checked the range against the family size
                    unsafe { ptr::write_volatile(self.mem.add(off + i), b) };
                }
            }
            EraseKind::Page => {
                self.cr_modify(0, CR_PG);
                for (i, word) in chunk.chunks_exact(4).enumerate() {
                    let w = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                    // SAFETY: as above, and `addr` is double-word aligned
                    unsafe { ptr::write_volatile(self.mem.add(off + i * 4) as *mut u32, w) };
                }
            }
        }
        let res = self.wait_ready();
        self.cr_modify(CR_PG, 0);
        self.flush_caches();
        res
    }

    fn erase_unit(&mut self, index: u32) -> Result<(), HardwareFault> {
        if index >= self.family.unit_count() {
            return Err(HardwareFault::Operation);
        }
        self.wait_ready()?;
        let op_bits = match self.family.erase_kind {
            EraseKind::Sector => {
                self.cr_modify(F4_CR_SNB_MASK, F4_CR_SER | (index << F4_CR_SNB_SHIFT));
                F4_CR_SER | F4_CR_SNB_MASK
            }
            EraseKind::Page => {
                let bank = index / L4_PAGES_PER_BANK;
                let page = index % L4_PAGES_PER_BANK;
                let bker = if bank == 1 { L4_CR_BKER } else { 0 };
                self.cr_modify(
                    L4_CR_PNB_MASK | L4_CR_BKER,
                    L4_CR_PER | (page << L4_CR_PNB_SHIFT) | bker,
                );
                L4_CR_PER | L4_CR_PNB_MASK | L4_CR_BKER
            }
        };
        self.cr_modify(0, CR_STRT);
        let res = self.wait_ready();
        self.cr_modify(op_bits, 0);
        self.flush_caches();
        res
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), HardwareFault> {
        let off = self.mem_offset(addr, buf.len())?;
        for (i, out) in buf.iter_mut().enumerate() {
            // SAFETY: mem_offset checked the range
            *out = unsafe { ptr::read_volatile(self.mem.add(off + i)) };
        }
        Ok(())
    }
}
