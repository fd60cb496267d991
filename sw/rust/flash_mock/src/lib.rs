//! Host-side stand-in for an on-chip flash controller.
//!
//! Behaves like NOR flash: erase sets a whole unit to the erased value, programming can only
//! clear bits. Program and erase are refused while locked or while an error flag from an
//! earlier operation is still set. Handles are cheap clones sharing one memory, so a test can
//! keep one while the layer under test owns another.

use std::cell::RefCell;
use std::rc::Rc;

use flash_core::{FlashController, HardwareFault, MemoryFamily};
use log::trace;

/// Hardware traffic seen by the simulator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    pub unlocks: u32,
    pub locks: u32,
    pub status_clears: u32,
    pub watchdog_kicks: u32,
    /// Address of every chunk handed to `program`, in order.
    pub programs: Vec<u32>,
    /// Index of every unit erased, in order.
    pub erased_units: Vec<u32>,
}

#[derive(Default)]
struct Faults {
    stuck_high: u8,
    erase_fail: Option<u32>,
    program_fail: Option<u32>,
}

struct SimState {
    family: &'static MemoryFamily,
    mem: Vec<u8>,
    locked: bool,
    status: Option<HardwareFault>,
    faults: Faults,
    stats: SimStats,
}

impl SimState {
    fn offset(&self, addr: u32, len: usize) -> Option<usize> {
        let off = addr.checked_sub(self.family.base_addr())? as usize;
        if off + len <= self.mem.len() {
            Some(off)
        } else {
            None
        }
    }

    fn raise(&mut self, fault: HardwareFault) -> Result<(), HardwareFault> {
        self.status = Some(fault);
        Err(fault)
    }

    fn ready(&mut self) -> Result<(), HardwareFault> {
        if let Some(stale) = self.status {
            return Err(stale);
        }
        if self.locked {
            return self.raise(HardwareFault::Locked);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SimFlash {
    state: Rc<RefCell<SimState>>,
}

impl SimFlash {
    /// Fully erased, locked flash of the given family.
    pub fn new(family: &'static MemoryFamily) -> Self {
        let state = SimState {
            family,
            mem: vec![family.erased_value; family.total_size() as usize],
            locked: true,
            status: None,
            faults: Faults::default(),
            stats: SimStats::default(),
        };
        Self { state: Rc::new(RefCell::new(state)) }
    }

    pub fn stats(&self) -> SimStats {
        self.state.borrow().stats.clone()
    }

    pub fn reset_stats(&self) {
        self.state.borrow_mut().stats = SimStats::default();
    }

    /// Copy of `len` bytes at absolute `addr`, bypassing the controller.
    pub fn snapshot(&self, addr: u32, len: usize) -> Vec<u8> {
        let st = self.state.borrow();
        match st.offset(addr, len) {
            Some(off) => st.mem[off..off + len].to_vec(),
            None => Vec::new(),
        }
    }

    /// Overwrite memory directly, as if left behind by earlier firmware.
    pub fn poke(&self, addr: u32, data: &[u8]) {
        let mut st = self.state.borrow_mut();
        if let Some(off) = st.offset(addr, data.len()) {
            st.mem[off..off + data.len()].copy_from_slice(data);
        }
    }

    /// Bits in `mask` read back as 1 no matter what is programmed.
    pub fn set_stuck_high(&self, mask: u8) {
        self.state.borrow_mut().faults.stuck_high = mask;
    }

    /// Erasing unit `index` reports an operation error and leaves the unit untouched.
    pub fn fail_erase(&self, index: u32) {
        self.state.borrow_mut().faults.erase_fail = Some(index);
    }

    /// Programming the chunk containing `addr` reports an operation error.
    pub fn fail_program(&self, addr: u32) {
        self.state.borrow_mut().faults.program_fail = Some(addr);
    }

    /// Leave an error flag set, as an earlier failed operation would.
    pub fn set_status(&self, fault: HardwareFault) {
        self.state.borrow_mut().status = Some(fault);
    }

    pub fn status(&self) -> Option<HardwareFault> {
        self.state.borrow().status
    }
}

impl FlashController for SimFlash {
    fn family(&self) -> &'static MemoryFamily {
        self.state.borrow().family
    }

    fn unlock(&mut self) -> Result<(), HardwareFault> {
        let mut st = self.state.borrow_mut();
        st.locked = false;
        st.stats.unlocks += 1;
        Ok(())
    }

    fn lock(&mut self) {
        let mut st = self.state.borrow_mut();
        st.locked = true;
        st.stats.locks += 1;
    }

    fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    fn clear_status(&mut self) {
        let mut st = self.state.borrow_mut();
        st.status = None;
        st.stats.status_clears += 1;
    }

    fn program(&mut self, addr: u32, chunk: &[u8]) -> Result<(), HardwareFault> {
        let mut st = self.state.borrow_mut();
        st.ready()?;
        let width = st.family.program_width;
        if chunk.len() as u32 != width || addr % width != 0 {
            return st.raise(HardwareFault::ProgramAlignment);
        }
        let off = match st.offset(addr, chunk.len()) {
            Some(off) => off,
            None => return st.raise(HardwareFault::Operation),
        };
        if let Some(bad) = st.faults.program_fail {
            if bad >= addr && bad < addr + width {
                return st.raise(HardwareFault::Operation);
            }
        }
        let stuck = st.faults.stuck_high;
        for (cell, &b) in st.mem[off..off + chunk.len()].iter_mut().zip(chunk) {
            *cell &= b | stuck;
        }
        trace!("sim: program {:#010x} {:02x?}", addr, chunk);
        st.stats.programs.push(addr);
        Ok(())
    }

    fn erase_unit(&mut self, index: u32) -> Result<(), HardwareFault> {
        let mut st = self.state.borrow_mut();
        st.ready()?;
        let unit = match st.family.unit(index) {
            Some(unit) => unit,
            None => return st.raise(HardwareFault::Operation),
        };
        if st.faults.erase_fail == Some(index) {
            return st.raise(HardwareFault::Operation);
        }
        let off = (unit.addr - st.family.base_addr()) as usize;
        let fill = st.family.erased_value;
        st.mem[off..off + unit.size as usize].fill(fill);
        trace!("sim: erase unit {} @ {:#010x}", index, unit.addr);
        st.stats.erased_units.push(index);
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), HardwareFault> {
        let st = self.state.borrow();
        let off = st.offset(addr, buf.len()).ok_or(HardwareFault::Operation)?;
        let stuck = st.faults.stuck_high;
        let n = buf.len();
        for (out, &cell) in buf.iter_mut().zip(&st.mem[off..off + n]) {
            *out = cell | stuck;
        }
        Ok(())
    }

    fn service_watchdog(&mut self) {
        self.state.borrow_mut().stats.watchdog_kicks += 1;
    }
}
