/// Growable parameter array with a recycled index free-list.
///
/// Async jobs carry a small integer instead of their full payload; the
/// payload lives here until the job's completion phase releases the slot.
/// Released indices are handed out again before the array grows.
///
/// # Example
///
/// ```ignore
/// let mut slots = ParamSlots::new();
/// let a = slots.acquire("first");   // 0
/// let b = slots.acquire("second");  // 1
/// slots.release(a);                  // 0 is now available
/// let c = slots.acquire("third");   // 0 (recycled)
/// ```
pub struct ParamSlots<T> {
    entries: Vec<Option<T>>,
    free_list: Vec<u32>,
    len: u32,
}

impl<T> ParamSlots<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Store a payload and return its slot index
    pub fn acquire(&mut self, value: T) -> u32 {
        self.len += 1;
        match self.free_list.pop() {
            Some(index) => {
                self.entries[index as usize] = Some(value);
                index
            }
            None => {
                self.entries.push(Some(value));
                (self.entries.len() - 1) as u32
            }
        }
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.entries.get(index as usize).and_then(|e| e.as_ref())
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.entries.get_mut(index as usize).and_then(|e| e.as_mut())
    }

    /// Remove the payload and return the index to the free-list
    pub fn release(&mut self, index: u32) -> Option<T> {
        let value = self.entries.get_mut(index as usize)?.take()?;
        self.len -= 1;
        self.free_list.push(index);
        Some(value)
    }

    /// Number of slots the array has grown to.
    ///
    /// Never decreases; released slots are recycled instead.
    pub fn capacity(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Number of slots currently holding a payload
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for ParamSlots<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "param_slots_tests.rs"]
mod tests;
