//! Per-window run locks: at most one consolidator run over any overlapping
//! window. Overlap attempts fail fast with `AlreadyRunning`.

use std::sync::Mutex;

use athena_core::errors::{AthenaError, AthenaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start_us: i64,
    end_us: i64,
}

impl Window {
    fn overlaps(&self, other: &Window) -> bool {
        self.start_us <= other.end_us && other.start_us <= self.end_us
    }
}

pub struct WindowLocks {
    active: Mutex<Vec<Window>>,
}

impl WindowLocks {
    pub fn new() -> Self {
        Self { active: Mutex::new(Vec::new()) }
    }

    /// Acquire a lock over `[start_us, end_us]`, or `AlreadyRunning`
    /// immediately when any active run overlaps it.
    pub fn acquire(&self, start_us: i64, end_us: i64) -> AthenaResult<WindowGuard<'_>> {
        let window = Window { start_us, end_us };
        let mut active = self
            .active
            .lock()
            .map_err(|e| AthenaError::Internal(format!("window lock poisoned: {e}")))?;
        if active.iter().any(|held| held.overlaps(&window)) {
            return Err(AthenaError::AlreadyRunning);
        }
        active.push(window);
        Ok(WindowGuard { locks: self, window })
    }

    fn release(&self, window: Window) {
        if let Ok(mut active) = self.active.lock() {
            active.retain(|held| *held != window);
        }
    }
}

impl Default for WindowLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard; dropping releases the window.
pub struct WindowGuard<'a> {
    locks: &'a WindowLocks,
    window: Window,
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(self.window);
    }
}
