//! Shared state cell
//!
//! Holds the one synchronized value. Every mutation goes through `&mut self`,
//! so the owner (the hub's critical section) serializes reads, writes and
//! clears without any locking here.

use crate::clock::SharedClock;
use crate::models::value::{SharedValue, EMPTY_CONTENT};

#[derive(Debug)]
pub struct SharedStateCell {
    value: SharedValue,
    clock: SharedClock,
}

impl SharedStateCell {
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        let value = SharedValue::initial(clock.now(), clock.utc_now());
        Self { value, clock }
    }

    /// Current snapshot
    #[must_use]
    pub fn read(&self) -> SharedValue {
        self.value.clone()
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.value.version
    }

    /// Replace the content, bump the version and return the new snapshot
    pub fn write(&mut self, content: impl Into<String>) -> SharedValue {
        self.value.content = content.into();
        self.touch();
        self.read()
    }

    /// Reset to the empty content, bump the version and return the new snapshot
    pub fn clear(&mut self) -> SharedValue {
        self.write(EMPTY_CONTENT)
    }

    fn touch(&mut self) {
        self.value.version += 1;
        self.value.last_write_at = self.clock.now();
        self.value.updated_at = self.clock.utc_now();
    }
}
