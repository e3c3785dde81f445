pub mod mux;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Local};
use md5::{Digest, Md5};
use tracing::{debug, error, warn};

use crate::clock::VirtualClock;
use crate::config::{ConfigDomain, ConfigManager};
use crate::error::Result;
use crate::events::{Event, RecorderEvent};
use crate::format::{FileHeader, PlaybackFile, Surface};
use crate::host::Host;
use crate::mixer::{MixerManager, NullMixer};
use crate::saves::SaveFileManager;
use crate::timer::{PassthroughTimer, TimerDispatch};

/// Highest slot probed when deriving a fresh record file name.
const MAX_RECORD_NAMES: u32 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordMode {
    Passthrough = 0,
    Record = 1,
    Playback = 2,
    PlaybackPaused = 3,
}

impl RecordMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RecordMode::Record,
            2 => RecordMode::Playback,
            3 => RecordMode::PlaybackPaused,
            _ => RecordMode::Passthrough,
        }
    }

    /// `record_mode` config values map here; anything unrecognised is
    /// passthrough.
    pub fn from_config(value: Option<&str>) -> Self {
        match value {
            Some("record") => RecordMode::Record,
            Some("playback") => RecordMode::Playback,
            _ => RecordMode::Passthrough,
        }
    }
}

/// One application file the recording is pinned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameFileDescription {
    pub file_name: String,
    pub md5: String,
}

/// Static description of the application being driven, used to verify a
/// playback attaches to the same binary data it was recorded against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameDescriptor {
    pub game_id: String,
    pub description: String,
    pub files: Vec<GameFileDescription>,
}

impl GameDescriptor {
    pub fn md5_by_file_name(&self, name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.file_name == name)
            .map(|f| f.md5.as_str())
    }
}

/// Screen region of the on-screen control overlay. Mouse events landing
/// here while recording are swallowed so they never reach the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRegion {
    pub x: i16,
    pub y: i16,
    pub width: i16,
    pub height: i16,
}

impl OverlayRegion {
    pub fn contains(&self, x: i16, y: i16) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// State guarded by the recorder lock: the codec plus the one-event
/// look-ahead playback runs on.
pub(crate) struct Multiplexer {
    pub(crate) file: PlaybackFile,
    pub(crate) next_event: RecorderEvent,
}

/// The engine. Owns the codec, the virtual clock, both mixers and the
/// timer dispatch; runs the mode state machine and swaps subsystems on
/// every transition.
///
/// The host wires itself in by forwarding raw events to
/// [`notify_event`](Self::notify_event), draining replayed ones from
/// [`poll_event`](Self::poll_event), and routing its clock/audio/save
/// calls through the corresponding methods here.
///
/// Two locks serialise everything: the clock lock and the recorder lock,
/// always taken in that order.
pub struct EventRecorder {
    pub(crate) host: Arc<dyn Host>,
    pub(crate) saves: Arc<dyn SaveFileManager>,
    config: Arc<Mutex<ConfigManager>>,
    mode: AtomicU8,
    previous_mode: AtomicU8,
    initialized: AtomicBool,
    fatal: AtomicBool,
    header_edited: AtomicBool,
    pub(crate) virtual_time: AtomicU32,
    pub(crate) clock: Mutex<VirtualClock>,
    pub(crate) mux: Mutex<Multiplexer>,
    null_mixer: Mutex<NullMixer>,
    real_mixer: Mutex<Option<Box<dyn MixerManager>>>,
    timer_dispatch: Arc<TimerDispatch>,
    passthrough_timer: Mutex<Option<PassthroughTimer>>,
    overlay_region: Mutex<Option<OverlayRegion>>,
}

impl EventRecorder {
    pub fn new(
        host: Arc<dyn Host>,
        saves: Arc<dyn SaveFileManager>,
        config: Arc<Mutex<ConfigManager>>,
    ) -> Arc<Self> {
        let mut null_mixer = NullMixer::new();
        null_mixer.init();
        null_mixer.suspend_audio();

        let recorder = Arc::new(EventRecorder {
            host,
            saves,
            config,
            mode: AtomicU8::new(RecordMode::Passthrough as u8),
            previous_mode: AtomicU8::new(RecordMode::Passthrough as u8),
            initialized: AtomicBool::new(false),
            fatal: AtomicBool::new(false),
            header_edited: AtomicBool::new(false),
            virtual_time: AtomicU32::new(0),
            clock: Mutex::new(VirtualClock::new(0)),
            mux: Mutex::new(Multiplexer {
                file: PlaybackFile::new(),
                next_event: RecorderEvent::invalid(),
            }),
            null_mixer: Mutex::new(null_mixer),
            real_mixer: Mutex::new(None),
            timer_dispatch: Arc::new(TimerDispatch::new()),
            passthrough_timer: Mutex::new(None),
            overlay_region: Mutex::new(None),
        });
        recorder.switch_timer_managers();
        recorder
    }

    pub fn mode(&self) -> RecordMode {
        RecordMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    fn set_mode(&self, mode: RecordMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn has_fatal_error(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    pub(crate) fn note_fatal(&self, context: &str, err: &crate::error::RecorderError) {
        error!(context, error = %err, "Record stream write failed");
        self.fatal.store(true, Ordering::Release);
    }

    pub fn register_mixer_manager(&self, mixer: Box<dyn MixerManager>) {
        *self.real_mixer.lock().unwrap() = Some(mixer);
    }

    pub fn subscribe_timer(&self, handler: impl Fn(u32) + Send + Sync + 'static) {
        self.timer_dispatch.subscribe(handler);
    }

    pub fn set_overlay_region(&self, region: Option<OverlayRegion>) {
        *self.overlay_region.lock().unwrap() = region;
    }

    pub(crate) fn overlay_region(&self) -> Option<OverlayRegion> {
        *self.overlay_region.lock().unwrap()
    }

    // ── session lifecycle ────────────────────────────────────────────

    /// Enters `mode` over `file_name`. Open and format failures degrade
    /// to passthrough with a warning; the call itself still succeeds so
    /// the host keeps running unrecorded.
    pub fn init(
        &self,
        mode: RecordMode,
        file_name: &str,
        descriptor: Option<&GameDescriptor>,
    ) -> Result<()> {
        if mode == RecordMode::Passthrough || mode == RecordMode::PlaybackPaused {
            self.set_mode(RecordMode::Passthrough);
            self.switch_mixer();
            self.switch_timer_managers();
            return Ok(());
        }

        let period = {
            let config = self.config.lock().unwrap();
            config.get_int("screenshot_period").unwrap_or(0)
        };
        {
            let mut clock = self.clock.lock().unwrap();
            *clock = VirtualClock::new(period);
            clock.reset(self.host.wall_millis());
        }
        self.virtual_time.store(0, Ordering::Release);
        self.fatal.store(false, Ordering::Release);
        self.header_edited.store(false, Ordering::Release);
        self.set_mode(mode);

        let path = self.saves.resolve_path(file_name);
        let open_result = {
            let mut mux = self.mux.lock().unwrap();
            mux.next_event = RecorderEvent::invalid();
            match mode {
                RecordMode::Record => mux.file.open_write(&path),
                RecordMode::Playback => mux.file.open_read(&path),
                _ => Ok(()),
            }
        };
        if let Err(e) = open_result {
            warn!(file = file_name, error = %e, "Couldn't open record file, staying in passthrough");
            self.set_mode(RecordMode::Passthrough);
            self.switch_mixer();
            self.switch_timer_managers();
            return Ok(());
        }

        match mode {
            RecordMode::Record => {
                let mut mux = self.mux.lock().unwrap();
                mux.file.header().clear_records();
                self.fill_record_metadata(mux.file.header(), descriptor);
                self.snapshot_config(mux.file.header());
            }
            RecordMode::Playback => {
                let hash_ok = {
                    let mut mux = self.mux.lock().unwrap();
                    check_game_hash(descriptor, mux.file.header())
                };
                if !hash_ok {
                    self.deinit();
                    return Ok(());
                }
                self.apply_playback_settings();
                let mut mux = self.mux.lock().unwrap();
                mux.next_event = mux.file.get_next_event();
            }
            _ => {}
        }

        self.switch_mixer();
        self.switch_timer_managers();
        self.initialized.store(true, Ordering::Release);
        debug!(?mode, file = file_name, "Recorder session started");
        Ok(())
    }

    /// Leaves any active session: drains both locks, closes the log,
    /// restores the real mixer and the wall-clock timer, and persists
    /// post-hoc header edits made while recording.
    pub fn deinit(&self) {
        self.initialized.store(false, Ordering::Release);
        debug!("Recorder deinit");

        let was_record = self.mode() == RecordMode::Record
            || (self.mode() == RecordMode::PlaybackPaused
                && RecordMode::from_u8(self.previous_mode.load(Ordering::Acquire))
                    == RecordMode::Record);

        let (close_result, path, header) = {
            let _clock = self.clock.lock().unwrap();
            let mut mux = self.mux.lock().unwrap();
            self.set_mode(RecordMode::Passthrough);
            let path = mux.file.path().map(|p| p.to_path_buf());
            let header = mux.file.header_ref().clone();
            (mux.file.close(), path, header)
        };
        if let Err(e) = close_result {
            warn!(error = %e, "Couldn't finalise record file");
        }

        if was_record && self.header_edited.swap(false, Ordering::AcqRel) {
            if let Some(path) = path {
                if let Err(e) = rewrite_header(&path, &header) {
                    warn!(error = %e, "Couldn't persist header edits");
                }
            }
        }

        self.switch_mixer();
        self.switch_timer_managers();
    }

    fn fill_record_metadata(&self, header: &mut FileHeader, descriptor: Option<&GameDescriptor>) {
        if header.author.is_empty() {
            header.author = "Unknown Author".to_string();
        }
        if header.name.is_empty() {
            let today = Local::now();
            let title = descriptor
                .map(|d| d.description.clone())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| {
                    self.config
                        .lock()
                        .unwrap()
                        .get("gameid")
                        .unwrap_or("recording")
                        .to_string()
                });
            header.name = format!(
                "{:02}.{:02}.{:04} {}",
                today.day(),
                today.month(),
                today.year(),
                title
            );
        }
        if let Some(descriptor) = descriptor {
            for file in &descriptor.files {
                if !file.md5.is_empty() {
                    header
                        .hash_records
                        .insert(file.file_name.clone(), file.md5.clone());
                }
            }
        }
    }

    fn snapshot_config(&self, header: &mut FileHeader) {
        let config = self.config.lock().unwrap();
        for (key, value) in config.iter_application() {
            header
                .settings_records
                .insert(key.to_string(), value.to_string());
        }
        for (key, value) in config.iter_game() {
            header
                .settings_records
                .insert(key.to_string(), value.to_string());
        }
        let save_slot = config.get("save_slot").unwrap_or("").to_string();
        header.settings_records.insert("save_slot".to_string(), save_slot);
    }

    /// Pushes recorded settings into the host config (transient domain)
    /// and removes persistent keys the recording does not know, so the
    /// replayed session sees the recorded environment exactly.
    fn apply_playback_settings(&self) {
        let settings = {
            let mux = self.mux.lock().unwrap();
            mux.file.header_ref().settings_records.clone()
        };
        let mut config = self.config.lock().unwrap();
        for (key, value) in &settings {
            let current = config.get_ignore_case(key).map(str::to_string);
            if current.as_deref() != Some(value.as_str()) {
                warn!(
                    key = %key,
                    stored = %value,
                    current = current.as_deref().unwrap_or("(null)"),
                    "Config value restored from recording"
                );
                config.set(key.clone(), value.clone(), ConfigDomain::Transient);
            }
        }
        for key in config.persistent_keys() {
            let known = settings.iter().any(|(k, _)| k.eq_ignore_ascii_case(&key));
            if !known {
                warn!(key = %key, "Removing config value absent from recording");
                config.remove_persistent(&key);
            }
        }
    }

    // ── subsystem swap ───────────────────────────────────────────────

    fn switch_mixer(&self) {
        let passthrough = self.mode() == RecordMode::Passthrough;
        let mut null_mixer = self.null_mixer.lock().unwrap();
        let mut real_mixer = self.real_mixer.lock().unwrap();
        if passthrough {
            null_mixer.suspend_audio();
            if let Some(real) = real_mixer.as_mut() {
                real.resume_audio();
            }
        } else {
            if let Some(real) = real_mixer.as_mut() {
                real.suspend_audio();
            }
            null_mixer.resume_audio();
        }
    }

    fn switch_timer_managers(&self) {
        let mut timer = self.passthrough_timer.lock().unwrap();
        if self.mode() == RecordMode::Passthrough {
            if timer.is_none() {
                *timer = Some(PassthroughTimer::spawn(
                    self.timer_dispatch.clone(),
                    self.host.clone(),
                ));
            }
        } else if let Some(mut running) = timer.take() {
            running.stop();
        }
    }

    fn update_subsystems(&self) {
        if self.mode() == RecordMode::Passthrough {
            return;
        }
        let virtual_millis = self.virtual_time.load(Ordering::Acquire);
        self.null_mixer.lock().unwrap().update(virtual_millis);
    }

    // ── clock discipline ─────────────────────────────────────────────

    /// Folds the caller's wall-clock reading into virtual time. During
    /// playback the caller's value is overwritten with the fabricated
    /// reading.
    pub fn process_millis(&self, millis: &mut u32) {
        if !self.is_initialized() {
            return;
        }
        match self.mode() {
            RecordMode::Record => {
                self.update_subsystems();
                let virtual_time = {
                    let mut clock = self.clock.lock().unwrap();
                    let virtual_time = clock.advance_record(*millis);
                    self.virtual_time.store(virtual_time, Ordering::Release);
                    let mut mux = self.mux.lock().unwrap();
                    if let Err(e) = mux
                        .file
                        .write_event(&RecorderEvent::new(virtual_time, Event::Timer))
                    {
                        self.note_fatal("timer event", &e);
                    }
                    self.take_screenshot_if_due(&mut clock, &mut mux);
                    virtual_time
                };
                self.timer_dispatch.fire(virtual_time);
            }
            RecordMode::Playback => {
                self.update_subsystems();
                let virtual_time = {
                    let mut clock = self.clock.lock().unwrap();
                    let mut mux = self.mux.lock().unwrap();
                    if mux.next_event.event == Event::Timer {
                        clock.set_virtual_time(mux.next_event.time);
                        self.virtual_time
                            .store(mux.next_event.time, Ordering::Release);
                        mux.next_event = mux.file.get_next_event();
                    }
                    clock.virtual_time()
                };
                self.timer_dispatch.fire(virtual_time);
                *millis = virtual_time;
            }
            RecordMode::PlaybackPaused => {
                *millis = self.clock.lock().unwrap().virtual_time();
            }
            RecordMode::Passthrough => {}
        }
    }

    /// Cooperative sleep. Returns whether the engine consumed the delay;
    /// a `false` means the caller should sleep itself.
    pub fn delay_millis(&self, msecs: u32) -> bool {
        match self.mode() {
            RecordMode::Record => {
                let virtual_time = self.virtual_time.load(Ordering::Acquire);
                {
                    let mut mux = self.mux.lock().unwrap();
                    if let Err(e) = mux.file.write_event(&RecorderEvent::new(
                        virtual_time,
                        Event::Delay { millis: msecs },
                    )) {
                        self.note_fatal("delay event", &e);
                    }
                }
                self.host.delay_millis(msecs);
                true
            }
            RecordMode::Playback => {
                let sleep_for = {
                    let clock = self.clock.lock().unwrap();
                    let mut mux = self.mux.lock().unwrap();
                    if let Event::Delay { millis } = mux.next_event.event {
                        mux.next_event = mux.file.get_next_event();
                        Some(clock.scaled_delay(millis))
                    } else {
                        None
                    }
                };
                if let Some(ms) = sleep_for {
                    self.host.delay_millis(ms);
                }
                true
            }
            _ => false,
        }
    }

    fn take_screenshot_if_due(&self, clock: &mut VirtualClock, mux: &mut Multiplexer) {
        if !clock.screenshot_due() {
            return;
        }
        let surface = match self.host.grab_surface() {
            Some(surface) => surface,
            None => {
                warn!("Can't save screenshot");
                return;
            }
        };
        let md5 = surface_md5(&surface);
        match mux.file.save_screenshot(&surface, md5) {
            Ok(()) => clock.mark_screenshot_taken(),
            Err(e) => self.note_fatal("screenshot", &e),
        }
    }

    // ── pause & speed ────────────────────────────────────────────────

    pub fn toggle_pause(&self) {
        match self.mode() {
            RecordMode::Record | RecordMode::Playback => {
                self.previous_mode
                    .store(self.mode() as u8, Ordering::Release);
                self.set_mode(RecordMode::PlaybackPaused);
                debug!("Pause");
            }
            RecordMode::PlaybackPaused => {
                let previous = RecordMode::from_u8(self.previous_mode.load(Ordering::Acquire));
                self.set_mode(previous);
                debug!("Resume");
            }
            RecordMode::Passthrough => {}
        }
    }

    pub fn speed_multiplier(&self) -> u32 {
        self.clock.lock().unwrap().speed_multiplier()
    }

    // ── header metadata ──────────────────────────────────────────────

    pub fn set_author(&self, author: impl Into<String>) {
        self.edit_header(|h| h.author = author.into());
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.edit_header(|h| h.name = name.into());
    }

    pub fn set_notes(&self, notes: impl Into<String>) {
        self.edit_header(|h| h.notes = notes.into());
    }

    fn edit_header(&self, apply: impl FnOnce(&mut FileHeader)) {
        let mut mux = self.mux.lock().unwrap();
        apply(mux.file.header());
        if self.is_initialized() && self.mode() == RecordMode::Record {
            self.header_edited.store(true, Ordering::Release);
        }
    }

    // ── recording management ─────────────────────────────────────────

    /// First free `<game_id>.r<NN>` slot, with `NN` two-digit lowercase
    /// hex probed up to `ff`.
    pub fn generate_record_file_name(&self, game_id: &str) -> Option<String> {
        let existing = self.saves.list_save_files(&format!("{game_id}.r??"));
        (0..=MAX_RECORD_NAMES)
            .map(|slot| format!("{game_id}.r{slot:02x}"))
            .find(|name| !existing.contains(name))
    }

    pub fn delete_record(&self, file_name: &str) -> bool {
        self.saves.remove_save_file(file_name)
    }

    // ── overlay integration ──────────────────────────────────────────

    /// Drops the engine to passthrough while the overlay repaints so its
    /// events and timer reads never reach the log. The previous mode
    /// comes back when the guard drops.
    pub fn begin_overlay_draw(&self) -> OverlayDrawGuard<'_> {
        let previous = self.mode();
        self.set_mode(RecordMode::Passthrough);
        OverlayDrawGuard {
            recorder: self,
            previous,
        }
    }
}

impl Drop for EventRecorder {
    fn drop(&mut self) {
        if let Some(mut timer) = self.passthrough_timer.lock().unwrap().take() {
            timer.stop();
        }
    }
}

pub struct OverlayDrawGuard<'a> {
    recorder: &'a EventRecorder,
    previous: RecordMode,
}

impl Drop for OverlayDrawGuard<'_> {
    fn drop(&mut self) {
        self.recorder.set_mode(self.previous);
    }
}

pub(crate) fn surface_md5(surface: &Surface) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(&surface.pixels);
    hasher.finalize().into()
}

fn check_game_hash(descriptor: Option<&GameDescriptor>, header: &mut FileHeader) -> bool {
    let descriptor = match descriptor {
        Some(d) => d,
        None => return true,
    };
    for file in &descriptor.files {
        match header.hash_records.get(&file.file_name) {
            None => {
                warn!(
                    file = %file.file_name,
                    "MD5 hash for file not found in record file"
                );
                return false;
            }
            Some(stored) if stored != &file.md5 => {
                warn!(
                    file = %file.file_name,
                    stored = %stored,
                    observed = %file.md5,
                    "Incorrect version of game file"
                );
                return false;
            }
            _ => {}
        }
    }
    true
}

/// Re-applies in-memory header metadata to a finished record file.
fn rewrite_header(path: &std::path::Path, header: &FileHeader) -> Result<()> {
    let mut file = PlaybackFile::new();
    file.open_read(path)?;
    file.header().author = header.author.clone();
    file.header().name = header.name.clone();
    file.header().notes = header.notes.clone();
    file.update_header()?;
    file.close()
}
