/// Operation counters owned by a flash abstraction layer instance.
///
/// Counters start at zero and are never reset while the instance lives. They are for
/// reporting only; nothing branches on them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    reads: u32,
    writes: u32,
    errors: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_count(&self) -> u32 {
        self.reads
    }

    pub fn write_count(&self) -> u32 {
        self.writes
    }

    pub fn error_count(&self) -> u32 {
        self.errors
    }

    pub fn record_read(&mut self) {
        self.reads = self.reads.wrapping_add(1);
    }

    pub fn record_write(&mut self) {
        self.writes = self.writes.wrapping_add(1);
    }

    pub fn record_error(&mut self) {
        self.errors = self.errors.wrapping_add(1);
    }
}
