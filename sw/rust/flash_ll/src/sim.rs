//! Flash abstraction layer over the host simulator.

use flash_core::{FlashAbstractionLayer, FlashRegion, MemoryFamily};
use flash_mock::SimFlash;

use crate::factory::{create_flash_abstraction_layer, TARGET_FAMILY};
use crate::primitives::FamilyFal;

pub struct SimEnv {
    pub flash: SimFlash,
}

impl SimEnv {
    /// Erased flash of the build's target family.
    pub fn new() -> anyhow::Result<Self> {
        Ok(SimEnv { flash: SimFlash::new(TARGET_FAMILY) })
    }

    /// Erased flash of any family, for code that does not go through the factory.
    pub fn with_family(family: &'static MemoryFamily) -> Self {
        SimEnv { flash: SimFlash::new(family) }
    }
}

/// The layer the factory would hand out, sharing `env`'s memory.
pub fn fal_with_env(env: &SimEnv) -> anyhow::Result<Box<dyn FlashAbstractionLayer>> {
    Ok(create_flash_abstraction_layer(env.flash.clone(), None)?)
}

/// Concrete layer for `env`'s family, with access to the controller.
pub fn family_fal(
    env: &SimEnv,
    region: Option<FlashRegion>,
) -> anyhow::Result<FamilyFal<SimFlash>> {
    let fal = match region {
        Some(region) => FamilyFal::new(env.flash.clone(), region)?,
        None => FamilyFal::with_default_region(env.flash.clone())?,
    };
    Ok(fal)
}
