//! Flash abstraction layer: the block-device primitives a filesystem needs, implemented on
//! top of an on-chip flash controller.
//!
//! [`FamilyFal`] is the one implementation; what differs between chips lives in the
//! [`MemoryFamily`](flash_core::MemoryFamily) descriptor and the controller. The factory in
//! [`factory`] picks the family at build time.

pub mod factory;
pub mod primitives;
pub mod regs;
pub mod verify;

#[cfg(feature = "sim")]
pub mod sim;

pub use factory::{create_flash_abstraction_layer, create_hardware_fal, TARGET_FAMILY};
pub use primitives::FamilyFal;
pub use regs::Stm32Controller;
