use std::io::Cursor;
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use crate::events::{Event, RecorderEvent};
use crate::recorder::{EventRecorder, RecordMode};

impl EventRecorder {
    /// Observes a raw host event. Recording stamps and logs a copy but
    /// reports the event as not consumed, so the host still sees it; the
    /// only exception is mouse traffic over the control overlay, which is
    /// swallowed to keep it out of the log.
    pub fn notify_event(&self, event: &Event) -> bool {
        self.check_for_hotkey(event);
        if self.mode() != RecordMode::Record || !self.is_initialized() {
            return false;
        }
        if let Some(mouse) = event.mouse_state() {
            if let Some(region) = self.overlay_region() {
                if region.contains(mouse.x, mouse.y) {
                    return true;
                }
            }
        }
        let time = self.virtual_time.load(Ordering::Acquire);
        if let Event::LButtonDown(m) | Event::LButtonUp(m) = event {
            debug!(time, x = m.x, y = m.y, "mouse button recorded");
        }
        let mut mux = self.mux.lock().unwrap();
        if let Err(e) = mux.file.write_event(&RecorderEvent::new(time, *event)) {
            self.note_fatal("input event", &e);
        }
        false
    }

    /// Produces the next replayed input event once virtual time has
    /// caught up with its timestamp. Timer, delay and audio events never
    /// surface here; the clock and audio paths consume those.
    pub fn poll_event(&self) -> Option<RecorderEvent> {
        if self.mode() != RecordMode::Playback || !self.is_initialized() {
            return None;
        }
        let mut mux = self.mux.lock().unwrap();
        let next = mux.next_event;
        if !next.event.is_input() {
            return None;
        }
        if next.time > self.virtual_time.load(Ordering::Acquire) {
            return None;
        }
        if let Some(mouse) = next.event.mouse_state() {
            self.host.warp_mouse(mouse.x, mouse.y);
        }
        mux.next_event = mux.file.get_next_event();
        let mut event = next;
        event.synthetic = true;
        Some(event)
    }

    /// Decides whether the host's mapper should dispatch an event. In
    /// playback only synthetic (replayed) events pass, so live input
    /// can't desync the session.
    pub fn map_event(&self, event: &RecorderEvent) -> bool {
        match self.mode() {
            RecordMode::Playback | RecordMode::PlaybackPaused => event.synthetic,
            _ => true,
        }
    }

    /// Audio pull contract. Recording tags the demand and lets the mixer
    /// run; playback only acknowledges demand the log has an event for,
    /// zeroing `samples` (silence) otherwise.
    pub fn process_audio(&self, samples: &mut u32, paused: bool) -> bool {
        match self.mode() {
            RecordMode::Record if !paused => {
                if !self.is_initialized() {
                    return false;
                }
                let time = self.virtual_time.load(Ordering::Acquire);
                let mut mux = self.mux.lock().unwrap();
                if let Err(e) = mux.file.write_event(&RecorderEvent::new(
                    time,
                    Event::Audio { samples: *samples },
                )) {
                    self.note_fatal("audio event", &e);
                }
                true
            }
            RecordMode::Playback => {
                if !self.is_initialized() {
                    return false;
                }
                let mut mux = self.mux.lock().unwrap();
                match mux.next_event.event {
                    Event::Audio { .. }
                        if mux.next_event.time
                            <= self.virtual_time.load(Ordering::Acquire) =>
                    {
                        mux.next_event = mux.file.get_next_event();
                        true
                    }
                    _ => {
                        *samples = 0;
                        false
                    }
                }
            }
            _ => true,
        }
    }

    /// Named RNG seeds: the wall clock in passthrough, remembered during
    /// record, and replayed from the header during playback (unknown
    /// sources replay as 0, as if they had been recorded that way).
    pub fn get_random_seed(&self, name: &str) -> u32 {
        let seed = self.host.wall_millis();
        match self.mode() {
            RecordMode::Record => {
                let mut mux = self.mux.lock().unwrap();
                mux.file
                    .header()
                    .random_source_records
                    .insert(name.to_string(), seed);
                seed
            }
            RecordMode::Playback | RecordMode::PlaybackPaused => {
                let mux = self.mux.lock().unwrap();
                match mux.file.header_ref().random_source_records.get(name) {
                    Some(&stored) => stored,
                    None => {
                        warn!(source = name, "Random source missing from recording");
                        0
                    }
                }
            }
            RecordMode::Passthrough => seed,
        }
    }

    /// Save-file virtualisation: recording reads through the real store
    /// and embeds the bytes; playback serves the embedded copy. Unknown
    /// names yield an empty stream.
    pub fn process_save_stream(&self, name: &str) -> Cursor<Vec<u8>> {
        match self.mode() {
            RecordMode::Record => {
                let contents = self.saves.read_save(name).unwrap_or_default();
                let mut mux = self.mux.lock().unwrap();
                mux.file.add_save_file(name, contents.clone());
                Cursor::new(contents)
            }
            RecordMode::Playback | RecordMode::PlaybackPaused => {
                let mux = self.mux.lock().unwrap();
                if !mux.file.header_ref().save_files.contains_key(name) {
                    warn!(save = name, "Save file missing from recording");
                }
                mux.file.save_stream(name)
            }
            RecordMode::Passthrough => {
                Cursor::new(self.saves.read_save(name).unwrap_or_default())
            }
        }
    }

    /// Listing follows the active mode: the real store normally, the
    /// embedded names during playback.
    pub fn list_save_files(&self, pattern: &str) -> Vec<String> {
        match self.mode() {
            RecordMode::Playback | RecordMode::PlaybackPaused => {
                let mux = self.mux.lock().unwrap();
                let mut names: Vec<String> = mux
                    .file
                    .header_ref()
                    .save_files
                    .iter()
                    .map(|(name, _)| name.to_string())
                    .filter(|name| crate::saves::matches_pattern(name, pattern))
                    .collect();
                names.sort();
                names
            }
            _ => self.saves.list_save_files(pattern),
        }
    }

    /// Session hotkeys: `+`/`-` halve or double the replay rate inside
    /// {1,2,4,8}; `*` or `/` toggles pause.
    pub fn check_for_hotkey(&self, event: &Event) {
        let key = match event {
            Event::KeyDown(k) => k,
            _ => return,
        };
        match key.ascii {
            a if a == b'+' as u16 => {
                let speed = self.clock.lock().unwrap().increase_speed();
                debug!(speed, "Increase speed");
            }
            a if a == b'-' as u16 => {
                let speed = self.clock.lock().unwrap().decrease_speed();
                debug!(speed, "Decrease speed");
            }
            a if a == b'*' as u16 || a == b'/' as u16 => {
                self.toggle_pause();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::events::{KeyState, MouseState};
    use crate::host::Host;
    use crate::recorder::OverlayRegion;
    use crate::saves::{DefaultSaveFileManager, SaveFileManager};
    use std::sync::{Arc, Mutex};

    struct StillHost;

    impl Host for StillHost {
        fn wall_millis(&self) -> u32 {
            777
        }

        fn delay_millis(&self, _msecs: u32) {}
    }

    fn recorder_in_dir(
        dir: &tempfile::TempDir,
    ) -> Arc<EventRecorder> {
        let saves = Arc::new(DefaultSaveFileManager::new(dir.path()).unwrap());
        let config = Arc::new(Mutex::new(ConfigManager::new()));
        EventRecorder::new(Arc::new(StillHost), saves, config)
    }

    #[test]
    fn notify_does_not_consume_ordinary_events() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in_dir(&dir);
        recorder.init(RecordMode::Record, "s.r00", None).unwrap();
        let consumed = recorder.notify_event(&Event::KeyDown(KeyState::from_char('a')));
        assert!(!consumed);
        recorder.deinit();
    }

    #[test]
    fn overlay_mouse_events_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in_dir(&dir);
        recorder.init(RecordMode::Record, "s.r00", None).unwrap();
        recorder.set_overlay_region(Some(OverlayRegion {
            x: 10,
            y: 10,
            width: 20,
            height: 20,
        }));
        let inside = Event::LButtonDown(MouseState { x: 15, y: 15 });
        let outside = Event::LButtonDown(MouseState { x: 50, y: 50 });
        assert!(recorder.notify_event(&inside));
        assert!(!recorder.notify_event(&outside));
        recorder.deinit();
    }

    #[test]
    fn random_seed_passthrough_is_wall_clock() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in_dir(&dir);
        assert_eq!(recorder.get_random_seed("combat"), 777);
    }

    #[test]
    fn record_embeds_save_files_for_playback() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in_dir(&dir);
        recorder.saves.write_save("hero.sav", b"progress").unwrap();

        recorder.init(RecordMode::Record, "s.r00", None).unwrap();
        let mut stream = recorder.process_save_stream("hero.sav");
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut stream, &mut bytes).unwrap();
        assert_eq!(bytes, b"progress");
        recorder.deinit();

        // The embedded copy serves playback even with the real file gone.
        assert!(recorder.saves.remove_save_file("hero.sav"));
        recorder.init(RecordMode::Playback, "s.r00", None).unwrap();
        let mut replayed = Vec::new();
        std::io::Read::read_to_end(
            &mut recorder.process_save_stream("hero.sav"),
            &mut replayed,
        )
        .unwrap();
        assert_eq!(replayed, b"progress");
        assert_eq!(recorder.list_save_files("*.sav"), vec!["hero.sav".to_string()]);
        // Unknown saves come back as empty streams.
        let mut empty = Vec::new();
        std::io::Read::read_to_end(
            &mut recorder.process_save_stream("other.sav"),
            &mut empty,
        )
        .unwrap();
        assert!(empty.is_empty());
        recorder.deinit();
    }

    #[test]
    fn map_event_blocks_live_input_during_playback() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_in_dir(&dir);
        // Write a minimal session first.
        recorder.init(RecordMode::Record, "s.r00", None).unwrap();
        recorder.deinit();
        recorder.init(RecordMode::Playback, "s.r00", None).unwrap();

        let live = RecorderEvent::new(0, Event::KeyDown(KeyState::from_char('x')));
        let mut replayed = live;
        replayed.synthetic = true;
        assert!(!recorder.map_event(&live));
        assert!(recorder.map_event(&replayed));
        recorder.deinit();
    }
}
