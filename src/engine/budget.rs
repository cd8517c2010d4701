/// Aggregate byte accounting for all stored crops.
///
/// `used` always equals the sum of `byte_len()` over every crop held by the
/// pool; `SlotPool` is the only writer.
#[derive(Clone, Debug)]
pub struct MemoryBudget {
    limit: usize,
    used: usize,
}

impl MemoryBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes a slot currently holding `current_len` could grow to.
    pub fn available_for(&self, current_len: usize) -> usize {
        let others = self.used.saturating_sub(current_len);
        self.limit.saturating_sub(others)
    }

    /// Would replacing a `current_len` crop with `new_len` bytes fit?
    pub fn admit(&self, current_len: usize, new_len: usize) -> bool {
        self.available_for(current_len) >= new_len
    }

    pub(crate) fn replace(&mut self, old_len: usize, new_len: usize) {
        self.used = self.used - old_len + new_len;
    }

    pub(crate) fn release(&mut self, len: usize) {
        self.used -= len;
    }
}
