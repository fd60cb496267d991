pub mod diagnostics;
pub mod error;
pub mod family;
pub mod mapper;
pub mod region;

pub use diagnostics::Diagnostics;
pub use error::{FlashError, HardwareFault, Result};
pub use family::{EraseKind, MemoryFamily, UnitRun, STM32F401RE, STM32L476RG};
pub use mapper::EraseUnit;
pub use region::FlashRegion;

/// Raw memory controller of one family.
///
/// Addresses are absolute. `program` takes exactly one chunk of the family's program width,
/// and both `program` and `erase_unit` are only legal between `unlock` and `lock`.
pub trait FlashController {
    fn family(&self) -> &'static MemoryFamily;
    fn unlock(&mut self) -> core::result::Result<(), HardwareFault>;
    fn lock(&mut self);
    fn is_locked(&self) -> bool;
    /// Clear error flags left behind by a previous operation.
    fn clear_status(&mut self);
    fn program(&mut self, addr: u32, chunk: &[u8]) -> core::result::Result<(), HardwareFault>;
    fn erase_unit(&mut self, index: u32) -> core::result::Result<(), HardwareFault>;
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> core::result::Result<(), HardwareFault>;
    /// Called between the units of a long erase.
    fn service_watchdog(&mut self) {}
}

/// What the filesystem adapter sees of the flash.
///
/// Offsets are relative to the region base, except for `verify_erased` which takes an
/// absolute address.
pub trait FlashAbstractionLayer {
    /// Erases every unit overlapping `[offset, offset + size)` and returns `size`.
    fn erase(&mut self, offset: u32, size: u32) -> Result<u32>;
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<usize>;
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize>;
    /// Writes are durable once `write` returns, so there is nothing to flush.
    fn sync(&mut self) -> Result<()>;
    fn verify_erased(&mut self, addr: u32, size: u32) -> bool;
    fn family(&self) -> &'static MemoryFamily;
    fn region(&self) -> FlashRegion;
    fn diagnostics(&self) -> Diagnostics;
}
