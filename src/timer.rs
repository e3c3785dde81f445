use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::host::Host;

type TimerHandler = Box<dyn Fn(u32) + Send + Sync + 'static>;

/// Tick interval of the passthrough timer thread.
pub const PASSTHROUGH_TIMER_INTERVAL_MS: u64 = 10;

/// A set of timer handlers which can be subscribed to from various
/// sources and fired with the current (wall or virtual) millisecond
/// reading.
#[derive(Default)]
pub struct TimerDispatch {
    handlers: Mutex<Vec<TimerHandler>>,
}

impl TimerDispatch {
    pub fn new() -> Self {
        TimerDispatch::default()
    }

    pub fn subscribe(&self, handler: impl Fn(u32) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().push(Box::new(handler));
    }

    pub fn fire(&self, millis: u32) {
        for handler in self.handlers.lock().unwrap().iter() {
            handler(millis);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

/// Wall-clock timer driver, active only in passthrough. Outside
/// passthrough the virtual clock is the sole driver of the dispatch.
pub struct PassthroughTimer {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PassthroughTimer {
    pub fn spawn(dispatch: Arc<TimerDispatch>, host: Arc<dyn Host>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(PASSTHROUGH_TIMER_INTERVAL_MS));
                dispatch.fire(host.wall_millis());
            }
        });
        PassthroughTimer {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PassthroughTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
