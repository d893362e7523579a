use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reserve sector pool is exhausted")]
pub struct NoReserve;

/// Spare sectors available for reallocating bad sectors on write.
///
/// Only ever counts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservePool {
    remaining: u64,
    initial: u64,
}

impl ReservePool {
    pub fn new(count: u64) -> Self {
        Self {
            remaining: count,
            initial: count,
        }
    }

    pub fn available(&self) -> u64 {
        self.remaining
    }

    /// Take one spare sector.
    pub fn consume(&mut self) -> Result<(), NoReserve> {
        self.remaining = self.remaining.checked_sub(1).ok_or(NoReserve)?;
        Ok(())
    }

    pub fn initial(&self) -> u64 {
        self.initial
    }

    pub fn consumed(&self) -> u64 {
        self.initial - self.remaining
    }
}
