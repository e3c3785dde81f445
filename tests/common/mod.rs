#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use encore::config::ConfigManager;
use encore::format::thumbnail::BYTES_PER_PIXEL;
use encore::host::Host;
use encore::recorder::EventRecorder;
use encore::saves::DefaultSaveFileManager;
use encore::Surface;

/// Host with a hand-cranked clock. Sleeps and cursor warps are recorded
/// instead of performed so tests can assert on them.
pub struct ScriptedHost {
    now: AtomicU32,
    pub sleeps: Mutex<Vec<u32>>,
    pub warps: Mutex<Vec<(i16, i16)>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        ScriptedHost {
            now: AtomicU32::new(0),
            sleeps: Mutex::new(Vec::new()),
            warps: Mutex::new(Vec::new()),
        }
    }

    pub fn set_millis(&self, millis: u32) {
        self.now.store(millis, Ordering::Release);
    }
}

impl Host for ScriptedHost {
    fn wall_millis(&self) -> u32 {
        self.now.load(Ordering::Acquire)
    }

    fn delay_millis(&self, msecs: u32) {
        self.sleeps.lock().unwrap().push(msecs);
    }

    fn warp_mouse(&self, x: i16, y: i16) {
        self.warps.lock().unwrap().push((x, y));
    }

    fn grab_surface(&self) -> Option<Surface> {
        Some(test_surface(32, 24))
    }
}

pub fn test_surface(width: u16, height: u16) -> Surface {
    let mut surface = Surface::new(width, height);
    for (i, px) in surface.pixels.chunks_mut(BYTES_PER_PIXEL).enumerate() {
        let shade = (i % 253) as u8;
        px.copy_from_slice(&[shade, shade ^ 0x55, shade.wrapping_add(17), 0xff]);
    }
    surface
}

pub struct TestRig {
    pub host: Arc<ScriptedHost>,
    pub config: Arc<Mutex<ConfigManager>>,
    pub recorder: Arc<EventRecorder>,
    pub dir: tempfile::TempDir,
}

pub fn rig() -> TestRig {
    rig_with_config(ConfigManager::new())
}

pub fn rig_with_config(config: ConfigManager) -> TestRig {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(ScriptedHost::new());
    let config = Arc::new(Mutex::new(config));
    let saves = Arc::new(DefaultSaveFileManager::new(dir.path()).unwrap());
    let recorder = EventRecorder::new(host.clone(), saves, config.clone());
    TestRig {
        host,
        config,
        recorder,
        dir,
    }
}
