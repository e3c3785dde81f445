use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::time as ttime;
use tracing::{info, warn, Level};

use encore::args::{Args, Commands, EditArgs, EventsArgs, FileArgs, RunArgs, ScreensArgs};
use encore::audio::RodioMixer;
use encore::config::{ConfigFile, ConfigManager};
use encore::events::{Event, KeyState, MouseState};
use encore::format::{thumbnail::BYTES_PER_PIXEL, PlaybackFile, Surface};
use encore::host::{Host, SystemHost};
use encore::recorder::{EventRecorder, RecordMode};
use encore::saves::{DefaultSaveFileManager, SaveFileManager};

/// Host used by the demo driver: system clock and sleeps plus a
/// generated test-card frame so screenshot capture has something to
/// digest.
struct DemoHost {
    inner: SystemHost,
}

impl Host for DemoHost {
    fn wall_millis(&self) -> u32 {
        self.inner.wall_millis()
    }

    fn delay_millis(&self, msecs: u32) {
        self.inner.delay_millis(msecs);
    }

    fn warp_mouse(&self, x: i16, y: i16) {
        info!(x, y, "cursor warped");
    }

    fn grab_surface(&self) -> Option<Surface> {
        let mut surface = Surface::new(64, 48);
        for (i, px) in surface.pixels.chunks_mut(BYTES_PER_PIXEL).enumerate() {
            let shade = (i % 251) as u8;
            px.copy_from_slice(&[shade, shade.wrapping_mul(3), shade.wrapping_mul(7), 0xff]);
        }
        Some(surface)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yml"));
    let config_file: ConfigFile = std::fs::read_to_string(&config_path)
        .ok()
        .map(|yml| serde_yaml::from_str(&yml).expect("Couldn't parse the configuration file"))
        .unwrap_or_default();

    let save_dir = config_file
        .save_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("saves"));
    let saves = Arc::new(
        DefaultSaveFileManager::new(&save_dir).expect("Couldn't create the save directory"),
    );

    match &args.command {
        Commands::Run(run_args) => run_session(run_args, config_file, saves).await,
        Commands::Info(file_args) => show_info(file_args, saves.as_ref()),
        Commands::Events(events_args) => dump_events(events_args, saves.as_ref()),
        Commands::Screens(screens_args) => show_screens(screens_args, saves.as_ref()),
        Commands::Edit(edit_args) => edit_record(edit_args, saves.as_ref()),
        Commands::Delete(file_args) => {
            if saves.remove_save_file(&file_args.file) {
                info!(file = %file_args.file, "record deleted");
            } else {
                warn!(file = %file_args.file, "record not found");
            }
        }
    }
}

async fn run_session(
    run_args: &RunArgs,
    config_file: ConfigFile,
    saves: Arc<DefaultSaveFileManager>,
) {
    let mode = RecordMode::from_config(Some(run_args.mode.as_str()));
    let config: Arc<Mutex<ConfigManager>> = Arc::new(Mutex::new(config_file.into()));
    let host = Arc::new(DemoHost {
        inner: SystemHost::new(),
    });

    let recorder = EventRecorder::new(host.clone(), saves, config.clone());

    // NOTE: rodio requires the OutputStream not to go out of scope until
    // the end of the session.
    let audio_output = rodio::OutputStream::try_default().ok();
    match &audio_output {
        Some((_stream, handle)) => match RodioMixer::new(handle) {
            Ok(mixer) => recorder.register_mixer_manager(Box::new(mixer)),
            Err(e) => warn!(error = %e, "running without audio output"),
        },
        None => warn!("no audio device, running without audio output"),
    }
    recorder.subscribe_timer(|millis| {
        tracing::trace!(millis, "timer handler");
    });

    let file_name = run_args
        .file
        .clone()
        .or_else(|| {
            config
                .lock()
                .unwrap()
                .get("record_file_name")
                .map(str::to_string)
        })
        .or_else(|| {
            if mode != RecordMode::Record {
                return None;
            }
            let gameid = config.lock().unwrap().get("gameid").map(str::to_string)?;
            recorder.generate_record_file_name(&gameid)
        })
        .unwrap_or_else(|| "record.bin".to_string());

    if let Some(author) = &run_args.author {
        recorder.set_author(author.clone());
    }
    recorder
        .init(mode, &file_name, None)
        .expect("Couldn't initialise the recorder session");
    info!(?mode, file = %file_name, "session started");

    let mut timer = ttime::interval(ttime::Duration::from_millis(16));
    timer.set_missed_tick_behavior(ttime::MissedTickBehavior::Skip);

    for tick in 0..run_args.ticks {
        timer.tick().await;

        let mut millis = host.wall_millis();
        recorder.process_millis(&mut millis);

        // A short scripted session so record mode has something to log
        // and playback has something to reproduce.
        match tick % 30 {
            10 => drive_key(&recorder, 'e', true),
            11 => drive_key(&recorder, 'e', false),
            14 => {
                recorder.notify_event(&Event::MouseMove(MouseState {
                    x: (tick % 100) as i16,
                    y: 24,
                }));
            }
            17 => {
                recorder.notify_event(&Event::LButtonDown(MouseState {
                    x: (tick % 100) as i16,
                    y: 24,
                }));
            }
            18 => {
                recorder.notify_event(&Event::LButtonUp(MouseState {
                    x: (tick % 100) as i16,
                    y: 24,
                }));
            }
            25 => {
                recorder.delay_millis(2);
            }
            _ => {}
        }

        if tick % 7 == 0 {
            let mut samples = 1024u32;
            recorder.process_audio(&mut samples, false);
        }

        while let Some(event) = recorder.poll_event() {
            info!(time = event.time, event = ?event.event, "replayed");
        }

        if recorder.has_fatal_error() {
            warn!("write failure, ending session");
            break;
        }
    }

    recorder.deinit();
    info!("session finished");
}

fn show_info(file_args: &FileArgs, saves: &DefaultSaveFileManager) {
    let mut file = PlaybackFile::new();
    if let Err(e) = file.open_read(&saves.resolve_path(&file_args.file)) {
        warn!(error = %e, "couldn't open record file");
        return;
    }
    let screens = file.get_screens_count();
    let header = file.header_ref();
    println!("name:    {}", header.name);
    println!("author:  {}", header.author);
    println!("notes:   {}", header.notes);
    println!("screens: {screens}");
    if !header.hash_records.is_empty() {
        println!("hashes:");
        for (name, md5) in &header.hash_records {
            println!("  {name}  {md5}");
        }
    }
    if !header.random_source_records.is_empty() {
        println!("random sources:");
        for (name, seed) in header.random_source_records.iter() {
            println!("  {name}  {seed}");
        }
    }
    if !header.save_files.is_empty() {
        println!("save files:");
        for (name, contents) in header.save_files.iter() {
            println!("  {name}  {} bytes", contents.len());
        }
    }
    if !header.settings_records.is_empty() {
        println!("settings:");
        for (key, value) in &header.settings_records {
            println!("  {key} = {value}");
        }
    }
}

fn dump_events(events_args: &EventsArgs, saves: &DefaultSaveFileManager) {
    let mut file = PlaybackFile::new();
    if let Err(e) = file.open_read(&saves.resolve_path(&events_args.file)) {
        warn!(error = %e, "couldn't open record file");
        return;
    }
    let limit = events_args.limit.unwrap_or(usize::MAX);
    let mut count = 0usize;
    loop {
        let event = file.get_next_event();
        if event.event == Event::Invalid || count >= limit {
            break;
        }
        println!("{:>10}ms  {:?}", event.time, event.event);
        count += 1;
    }
    println!("{count} events");
}

fn show_screens(screens_args: &ScreensArgs, saves: &DefaultSaveFileManager) {
    let mut file = PlaybackFile::new();
    if let Err(e) = file.open_read(&saves.resolve_path(&screens_args.file)) {
        warn!(error = %e, "couldn't open record file");
        return;
    }
    let count = file.get_screens_count();
    println!("{count} screenshots");
    for index in 1..=count {
        match file.get_screen_shot(index) {
            Some(surface) => {
                println!("  #{index}: {}x{}", surface.width, surface.height);
                if let Some(out_dir) = &screens_args.out_dir {
                    if std::fs::create_dir_all(out_dir).is_ok() {
                        let name = format!(
                            "{}-{index}-{}x{}.rgba",
                            screens_args.file, surface.width, surface.height
                        );
                        if let Err(e) = std::fs::write(out_dir.join(name), &surface.pixels) {
                            warn!(error = %e, "couldn't export screenshot");
                        }
                    }
                }
            }
            None => println!("  #{index}: <undecodable>"),
        }
    }
}

fn edit_record(edit_args: &EditArgs, saves: &DefaultSaveFileManager) {
    let mut file = PlaybackFile::new();
    if let Err(e) = file.open_read(&saves.resolve_path(&edit_args.file)) {
        warn!(error = %e, "couldn't open record file");
        return;
    }
    if let Some(author) = &edit_args.author {
        file.header().author = author.clone();
    }
    if let Some(name) = &edit_args.name {
        file.header().name = name.clone();
    }
    if let Some(notes) = &edit_args.notes {
        file.header().notes = notes.clone();
    }
    match file.update_header().and_then(|_| file.close()) {
        Ok(()) => info!(file = %edit_args.file, "header updated"),
        Err(e) => warn!(error = %e, "couldn't update header"),
    }
}

fn drive_key(recorder: &EventRecorder, c: char, down: bool) {
    let state = KeyState::from_char(c);
    let event = if down {
        Event::KeyDown(state)
    } else {
        Event::KeyUp(state)
    };
    recorder.notify_event(&event);
}
