//! Dataplane core allocation.

use tipsy_types::CoreMask;

/// Hands out cores from a core mask in ascending, cyclic order.
///
/// The cursor persists across calls, so successive allocations continue
/// where the previous one stopped and wrap around at the end of the list.
#[derive(Debug, Clone)]
pub struct CoreAllocation {
    cores: Vec<u32>,
    cursor: usize,
}

impl CoreAllocation {
    pub fn new(mask: CoreMask) -> Self {
        Self {
            cores: mask.active_cores(),
            cursor: 0,
        }
    }

    pub fn available(&self) -> &[u32] {
        &self.cores
    }

    /// Returns the next `n` cores. Empty if the mask has no cores.
    pub fn get_cores(&mut self, n: usize) -> Vec<u32> {
        if self.cores.is_empty() {
            return Vec::new();
        }
        (0..n)
            .map(|_| {
                let core = self.cores[self.cursor];
                self.cursor = (self.cursor + 1) % self.cores.len();
                core
            })
            .collect()
    }
}
