//! Read-back checks run after program and erase.
//!
//! Both checks stop at the first differing byte and report it. Neither mutates flash.

use flash_core::{FlashController, FlashError, Result};

const SCAN_CHUNK: usize = 256;

/// Confirms `expected` reads back unchanged at absolute `addr`.
pub fn verify_programmed<C: FlashController + ?Sized>(
    ctrl: &mut C,
    addr: u32,
    expected: &[u8],
) -> Result<()> {
    let mut buf = [0u8; SCAN_CHUNK];
    let mut at = addr;
    for want in expected.chunks(SCAN_CHUNK) {
        let got = &mut buf[..want.len()];
        ctrl.read(at, got)?;
        if let Some(i) = got.iter().zip(want).position(|(g, w)| g != w) {
            return Err(FlashError::VerifyMismatch {
                addr: at + i as u32,
                expected: want[i],
                found: got[i],
            });
        }
        at += want.len() as u32;
    }
    Ok(())
}

/// Confirms every byte of `[addr, addr + size)` reads as `fill`.
pub fn verify_erased_span<C: FlashController + ?Sized>(
    ctrl: &mut C,
    addr: u32,
    size: u32,
    fill: u8,
) -> Result<()> {
    let mut buf = [0u8; SCAN_CHUNK];
    let mut at = addr;
    let end = addr + size;
    while at < end {
        let n = SCAN_CHUNK.min((end - at) as usize);
        let got = &mut buf[..n];
        ctrl.read(at, got)?;
        if let Some(i) = got.iter().position(|&b| b != fill) {
            return Err(FlashError::VerifyMismatch {
                addr: at + i as u32,
                expected: fill,
                found: got[i],
            });
        }
        at += n as u32;
    }
    Ok(())
}
