use thiserror::Error;

/// Fault reported by the memory controller itself.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareFault {
    #[error("controller is locked")]
    Locked,
    #[error("write protection error")]
    WriteProtection,
    #[error("programming alignment error")]
    ProgramAlignment,
    #[error("programming sequence error")]
    ProgramSequence,
    #[error("operation error")]
    Operation,
    #[error("controller stayed busy past the spin limit")]
    Timeout,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    #[error("range {offset:#x}+{len} exceeds the flash region")]
    OutOfRange { offset: u32, len: u32 },
    #[error("range {offset:#x}+{len} is not aligned to {width} bytes")]
    Alignment { offset: u32, len: u32, width: u32 },
    #[error("hardware failure: {0}")]
    Hardware(#[from] HardwareFault),
    #[error("read-back at {addr:#010x} gave {found:#04x}, expected {expected:#04x}")]
    VerifyMismatch { addr: u32, expected: u8, found: u8 },
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T> = core::result::Result<T, FlashError>;
