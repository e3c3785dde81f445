mod common;

use common::{rig, rig_with_config, TestRig};
use encore::config::{ConfigDomain, ConfigManager};
use encore::events::{Event, KeyState, MouseState};
use encore::format::PlaybackFile;
use encore::recorder::{GameDescriptor, GameFileDescription, RecordMode};
use encore::saves::SaveFileManager;

fn tick(rig: &TestRig, wall: u32) {
    rig.host.set_millis(wall);
    let mut millis = wall;
    rig.recorder.process_millis(&mut millis);
}

fn key_down(c: char) -> Event {
    Event::KeyDown(KeyState::from_char(c))
}

fn key_up(c: char) -> Event {
    Event::KeyUp(KeyState::from_char(c))
}

#[test]
fn single_key_round_trip() {
    let rig = rig();

    rig.recorder
        .init(RecordMode::Record, "t.r00", None)
        .unwrap();
    tick(&rig, 100);
    rig.recorder.notify_event(&key_down('A'));
    tick(&rig, 200);
    rig.recorder.deinit();

    // The log carries the key press at its recorded timestamp, with a
    // non-decreasing timestamp stream around it.
    let mut file = PlaybackFile::new();
    file.open_read(&rig.dir.path().join("t.r00")).unwrap();
    let mut events = Vec::new();
    loop {
        let e = file.get_next_event();
        if e.event == Event::Invalid {
            break;
        }
        events.push(e);
    }
    assert!(events
        .windows(2)
        .all(|pair| pair[0].time <= pair[1].time));
    let keys: Vec<_> = events.iter().filter(|e| e.event.is_input()).collect();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].time, 100);
    assert_eq!(keys[0].event, key_down('A'));
    file.close().unwrap();

    // Replay delivers exactly that key once virtual time reaches 100.
    rig.recorder
        .init(RecordMode::Playback, "t.r00", None)
        .unwrap();
    assert!(rig.recorder.poll_event().is_none());
    tick(&rig, 0);
    let replayed = rig.recorder.poll_event().expect("key due at 100ms");
    assert_eq!(replayed.time, 100);
    assert_eq!(replayed.event, key_down('A'));
    assert!(replayed.synthetic);
    assert!(rig.recorder.poll_event().is_none());
    rig.recorder.deinit();
}

#[test]
fn delay_replays_recorded_duration() {
    let rig = rig();

    rig.recorder
        .init(RecordMode::Record, "d.r00", None)
        .unwrap();
    tick(&rig, 10);
    assert!(rig.recorder.delay_millis(50));
    rig.recorder.deinit();
    assert_eq!(rig.host.sleeps.lock().unwrap().as_slice(), &[50]);
    rig.host.sleeps.lock().unwrap().clear();

    rig.recorder
        .init(RecordMode::Playback, "d.r00", None)
        .unwrap();
    tick(&rig, 999);
    // The caller's requested duration is irrelevant: the recorded 50ms
    // wins, and the engine reports the delay as consumed.
    assert!(rig.recorder.delay_millis(123));
    assert_eq!(rig.host.sleeps.lock().unwrap().as_slice(), &[50]);
    rig.recorder.deinit();
}

#[test]
fn audio_pull_honours_event_timestamps() {
    let rig = rig();

    rig.recorder
        .init(RecordMode::Record, "a.r00", None)
        .unwrap();
    tick(&rig, 5);
    let mut samples = 4096u32;
    assert!(rig.recorder.process_audio(&mut samples, false));
    rig.recorder.deinit();

    rig.recorder
        .init(RecordMode::Playback, "a.r00", None)
        .unwrap();
    tick(&rig, 5);
    let mut samples = 999u32;
    assert!(rig.recorder.process_audio(&mut samples, false));
    assert_eq!(samples, 999);
    rig.recorder.deinit();
}

#[test]
fn audio_pull_before_its_time_is_refused() {
    let rig = rig();

    // Hand-craft a log whose audio event lies in the future.
    let mut file = PlaybackFile::new();
    file.open_write(&rig.dir.path().join("a.r01")).unwrap();
    file.write_event(&encore::RecorderEvent::new(5, Event::Timer))
        .unwrap();
    file.write_event(&encore::RecorderEvent::new(10, Event::Audio { samples: 4096 }))
        .unwrap();
    file.close().unwrap();

    rig.recorder
        .init(RecordMode::Playback, "a.r01", None)
        .unwrap();
    tick(&rig, 0);
    let mut samples = 512u32;
    assert!(!rig.recorder.process_audio(&mut samples, false));
    assert_eq!(samples, 0, "silence must be signalled");
    rig.recorder.deinit();
}

#[test]
fn recording_pauses_skip_audio_events() {
    let rig = rig();
    rig.recorder
        .init(RecordMode::Record, "a.r02", None)
        .unwrap();
    let mut samples = 2048u32;
    assert!(rig.recorder.process_audio(&mut samples, true));
    rig.recorder.deinit();

    let mut file = PlaybackFile::new();
    file.open_read(&rig.dir.path().join("a.r02")).unwrap();
    loop {
        let e = file.get_next_event();
        if e.event == Event::Invalid {
            break;
        }
        assert!(
            !matches!(e.event, Event::Audio { .. }),
            "paused pulls must not be logged"
        );
    }
}

#[test]
fn hash_mismatch_falls_back_to_passthrough() {
    let rig = rig();

    let descriptor = GameDescriptor {
        game_id: "quest".to_string(),
        description: "Quest".to_string(),
        files: vec![GameFileDescription {
            file_name: "data.dat".to_string(),
            md5: "aa".repeat(16),
        }],
    };
    rig.recorder
        .init(RecordMode::Record, "h.r00", Some(&descriptor))
        .unwrap();
    rig.recorder.deinit();

    let tampered = GameDescriptor {
        files: vec![GameFileDescription {
            file_name: "data.dat".to_string(),
            md5: "bb".repeat(16),
        }],
        ..descriptor.clone()
    };
    rig.recorder
        .init(RecordMode::Playback, "h.r00", Some(&tampered))
        .unwrap();
    assert_eq!(rig.recorder.mode(), RecordMode::Passthrough);
    assert!(!rig.recorder.is_initialized());

    // The untampered descriptor still plays back fine.
    rig.recorder
        .init(RecordMode::Playback, "h.r00", Some(&descriptor))
        .unwrap();
    assert_eq!(rig.recorder.mode(), RecordMode::Playback);
    rig.recorder.deinit();
}

#[test]
fn speed_hotkey_saturates_at_8() {
    let rig = rig();
    rig.recorder
        .init(RecordMode::Record, "s.r00", None)
        .unwrap();
    rig.recorder.deinit();
    rig.recorder
        .init(RecordMode::Playback, "s.r00", None)
        .unwrap();

    let plus = key_down('+');
    for expected in [2, 4, 8, 8, 8] {
        rig.recorder.notify_event(&plus);
        assert_eq!(rig.recorder.speed_multiplier(), expected);
    }
    rig.recorder.deinit();
}

#[test]
fn screenshots_follow_the_virtual_period() {
    let mut config = ConfigManager::new();
    config.set("screenshot_period", "1000", ConfigDomain::Application);
    let rig = rig_with_config(config);

    rig.recorder
        .init(RecordMode::Record, "p.r00", None)
        .unwrap();
    for wall in [400, 800, 1200, 1600, 2000, 2500] {
        tick(&rig, wall);
    }
    rig.recorder.deinit();

    let mut file = PlaybackFile::new();
    file.open_read(&rig.dir.path().join("p.r00")).unwrap();
    assert!(
        file.get_screens_count() >= 2,
        "expected at least two screenshots past 2500ms of virtual time"
    );
}

#[test]
fn event_sequence_round_trips_in_order() {
    let rig = rig();

    let script: Vec<(u32, Event)> = vec![
        (20, key_down('h')),
        (20, key_up('h')),
        (40, Event::MouseMove(MouseState { x: 11, y: 7 })),
        (40, Event::LButtonDown(MouseState { x: 11, y: 7 })),
        (60, Event::LButtonUp(MouseState { x: 12, y: 7 })),
        (60, key_down('i')),
        (80, Event::WheelDown(MouseState { x: 12, y: 8 })),
    ];

    rig.recorder
        .init(RecordMode::Record, "seq.r00", None)
        .unwrap();
    let mut wall = 0;
    for (at, event) in &script {
        if *at != wall {
            wall = *at;
            tick(&rig, wall);
        }
        rig.recorder.notify_event(event);
    }
    tick(&rig, 100);
    rig.recorder.deinit();

    rig.recorder
        .init(RecordMode::Playback, "seq.r00", None)
        .unwrap();
    let mut replayed = Vec::new();
    for wall in [20, 40, 60, 80, 100] {
        tick(&rig, wall);
        while let Some(event) = rig.recorder.poll_event() {
            replayed.push((event.time, event.event));
        }
    }
    rig.recorder.deinit();

    assert_eq!(replayed, script);
}

#[test]
fn mouse_replay_warps_the_cursor() {
    let rig = rig();

    rig.recorder
        .init(RecordMode::Record, "m.r00", None)
        .unwrap();
    tick(&rig, 10);
    rig.recorder
        .notify_event(&Event::MouseMove(MouseState { x: 33, y: 44 }));
    tick(&rig, 20);
    rig.recorder.deinit();

    rig.recorder
        .init(RecordMode::Playback, "m.r00", None)
        .unwrap();
    tick(&rig, 10);
    let event = rig.recorder.poll_event().expect("mouse move due");
    assert_eq!(event.event, Event::MouseMove(MouseState { x: 33, y: 44 }));
    assert_eq!(rig.host.warps.lock().unwrap().as_slice(), &[(33, 44)]);
    rig.recorder.deinit();
}

#[test]
fn random_seeds_replay_deterministically() {
    let rig = rig();

    rig.host.set_millis(777);
    rig.recorder
        .init(RecordMode::Record, "r.r00", None)
        .unwrap();
    let recorded = rig.recorder.get_random_seed("Combat");
    assert_eq!(recorded, 777);
    rig.recorder.deinit();

    rig.host.set_millis(123_456);
    rig.recorder
        .init(RecordMode::Playback, "r.r00", None)
        .unwrap();
    // Source names fold case; unknown sources replay as zero.
    assert_eq!(rig.recorder.get_random_seed("combat"), 777);
    assert_eq!(rig.recorder.get_random_seed("COMBAT"), 777);
    assert_eq!(rig.recorder.get_random_seed("never-registered"), 0);
    rig.recorder.deinit();
}

#[test]
fn playback_restores_recorded_configuration() {
    let mut config = ConfigManager::new();
    config.set("music", "on", ConfigDomain::Application);
    config.set("subtitles", "true", ConfigDomain::Game);
    let rig = rig_with_config(config);

    rig.recorder
        .init(RecordMode::Record, "c.r00", None)
        .unwrap();
    rig.recorder.deinit();

    // The environment drifts between record and playback.
    {
        let mut config = rig.config.lock().unwrap();
        config.set("music", "off", ConfigDomain::Application);
        config.set("brand_new", "1", ConfigDomain::Application);
    }

    rig.recorder
        .init(RecordMode::Playback, "c.r00", None)
        .unwrap();
    {
        let config = rig.config.lock().unwrap();
        assert_eq!(config.get("music"), Some("on"));
        assert_eq!(config.get("subtitles"), Some("true"));
        assert_eq!(
            config.get("brand_new"),
            None,
            "keys unknown to the recording must disappear"
        );
    }
    rig.recorder.deinit();
}

#[test]
fn open_failure_keeps_the_session_running_unrecorded() {
    let rig = rig();
    // Point the recording at an unwritable location.
    std::fs::create_dir(rig.dir.path().join("taken.r00")).unwrap();
    rig.recorder
        .init(RecordMode::Record, "taken.r00", None)
        .unwrap();
    assert_eq!(rig.recorder.mode(), RecordMode::Passthrough);
    assert!(!rig.recorder.is_initialized());
    // Passthrough still answers the virtualised calls.
    let mut samples = 64u32;
    assert!(rig.recorder.process_audio(&mut samples, false));
    assert!(!rig.recorder.delay_millis(1));
}

#[test]
fn record_pause_excursion_suppresses_logging() {
    let rig = rig();
    rig.recorder
        .init(RecordMode::Record, "pp.r00", None)
        .unwrap();
    tick(&rig, 10);
    rig.recorder.notify_event(&key_down('x'));

    // '*' pauses; input while paused must not reach the log.
    rig.recorder.notify_event(&key_down('*'));
    assert_eq!(rig.recorder.mode(), RecordMode::PlaybackPaused);
    rig.recorder.notify_event(&key_down('y'));
    rig.recorder.notify_event(&key_down('/'));
    assert_eq!(rig.recorder.mode(), RecordMode::Record);
    tick(&rig, 20);
    rig.recorder.deinit();

    let mut file = PlaybackFile::new();
    file.open_read(&rig.dir.path().join("pp.r00")).unwrap();
    let mut seen = Vec::new();
    loop {
        let e = file.get_next_event();
        if e.event == Event::Invalid {
            break;
        }
        if e.event.is_input() {
            seen.push(e.event);
        }
    }
    assert_eq!(seen, vec![key_down('x')]);
}

#[test]
fn record_metadata_defaults_are_filled_in() {
    let mut config = ConfigManager::new();
    config.set("gameid", "quest", ConfigDomain::Application);
    let rig = rig_with_config(config);

    rig.recorder
        .init(RecordMode::Record, "meta.r00", None)
        .unwrap();
    rig.recorder.deinit();

    let mut file = PlaybackFile::new();
    file.open_read(&rig.dir.path().join("meta.r00")).unwrap();
    assert_eq!(file.header_ref().author, "Unknown Author");
    assert!(
        file.header_ref().name.contains("quest"),
        "generated name should mention the game id: {}",
        file.header_ref().name
    );
    assert!(file
        .header_ref()
        .settings_records
        .contains_key("save_slot"));
}

#[test]
fn generated_record_names_use_hex_slots() {
    let rig = rig();
    let saves = encore::saves::DefaultSaveFileManager::new(rig.dir.path()).unwrap();
    for slot in 0..=0x0f {
        saves
            .write_save(&format!("quest.r{slot:02x}"), b"x")
            .unwrap();
    }
    assert_eq!(
        rig.recorder.generate_record_file_name("quest"),
        Some("quest.r10".to_string())
    );
}
