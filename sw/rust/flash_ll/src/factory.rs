//! Build-time choice of the flash family.
//!
//! Exactly one family backs the layer in a given build. It is picked by cargo feature; with
//! no family feature the crate does not compile. `stm32f4` wins if both are enabled.

use flash_core::{
    FlashAbstractionLayer, FlashController, FlashError, FlashRegion, MemoryFamily, Result,
};

use crate::primitives::FamilyFal;
use crate::regs::Stm32Controller;

#[cfg(not(any(feature = "stm32f4", feature = "stm32l4")))]
compile_error!("no flash family: enable the `stm32f4` or `stm32l4` feature of flash_ll");

#[cfg(feature = "stm32f4")]
pub static TARGET_FAMILY: &MemoryFamily = &flash_core::STM32F401RE;

#[cfg(all(feature = "stm32l4", not(feature = "stm32f4")))]
pub static TARGET_FAMILY: &MemoryFamily = &flash_core::STM32L476RG;

/// Builds the layer for the target family on top of `controller`.
///
/// `region` defaults to the family's own filesystem region.
pub fn create_flash_abstraction_layer<C>(
    controller: C,
    region: Option<FlashRegion>,
) -> Result<Box<dyn FlashAbstractionLayer>>
where
    C: FlashController + 'static,
{
    if controller.family() != TARGET_FAMILY {
        return Err(FlashError::InvalidArgument("controller does not drive the target family"));
    }
    let region = region.unwrap_or(TARGET_FAMILY.default_region);
    Ok(Box::new(FamilyFal::new(controller, region)?))
}

/// Builds the layer over the target's own flash interface registers.
///
/// # Safety
///
/// Only sound on the target chip, where the flash interface and the flash array live at the
/// addresses of [`TARGET_FAMILY`], and only if nothing else drives the flash interface.
pub unsafe fn create_hardware_fal(
    region: Option<FlashRegion>,
) -> Result<Box<dyn FlashAbstractionLayer>> {
    create_flash_abstraction_layer(Stm32Controller::for_target(TARGET_FAMILY), region)
}
