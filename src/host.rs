use std::time::Instant;

use crate::format::Surface;

/// The narrow surface the engine needs from its embedding application.
///
/// Everything non-deterministic the engine consumes arrives through here:
/// the wall clock, cooperative sleeps, cursor warps for replayed mouse
/// events, and frame grabs for periodic screenshots.
pub trait Host: Send + Sync {
    fn wall_millis(&self) -> u32;

    fn delay_millis(&self, msecs: u32);

    /// Repositions the cursor before a replayed mouse event is delivered.
    fn warp_mouse(&self, _x: i16, _y: i16) {}

    /// Current application frame, if the host can produce one.
    fn grab_surface(&self) -> Option<Surface> {
        None
    }
}

/// Production host: process-relative monotonic clock and thread sleeps.
pub struct SystemHost {
    start: Instant,
}

impl SystemHost {
    pub fn new() -> Self {
        SystemHost {
            start: Instant::now(),
        }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SystemHost {
    fn wall_millis(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    fn delay_millis(&self, msecs: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(msecs)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_host_clock_is_monotonic() {
        let host = SystemHost::new();
        let a = host.wall_millis();
        host.delay_millis(2);
        let b = host.wall_millis();
        assert!(b >= a);
    }
}
