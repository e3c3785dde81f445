use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use crate::error::{RecorderError, Result};
use crate::events::{Event, KeyState, Modifiers, MouseState, RecorderEvent};
use crate::format::chunk::{
    self, read_chunk_header, tag_name, write_chunk_header, ChunkHeader,
};
use crate::format::header::FileHeader;
use crate::format::thumbnail::{self, Surface};

pub const RECORD_VERSION: u32 = 1;

/// Capacity of the in-memory event buffer, in records.
pub const MAX_BUFFERED_RECORDS: usize = 10_000;

const STREAM_BUFFER_SIZE: usize = 128 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileMode {
    Closed,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    CheckFormat,
    CheckVersion,
    SelectSection,
    ProcessHeader,
    ProcessHash,
    ProcessRandom,
    ProcessSettings,
    ProcessSave,
    Done,
    Error,
}

/// The chunked record file. One instance owns at most one underlying
/// stream; which operations are legal depends on whether it was opened
/// for writing or reading.
pub struct PlaybackFile {
    mode: FileMode,
    path: Option<PathBuf>,
    header: FileHeader,
    write_stream: Option<BufWriter<File>>,
    read_stream: Option<BufReader<File>>,
    header_dumped: bool,
    record_count: usize,
    write_buf: Vec<u8>,
    events_buf: Cursor<Vec<u8>>,
}

impl Default for PlaybackFile {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackFile {
    pub fn new() -> Self {
        PlaybackFile {
            mode: FileMode::Closed,
            path: None,
            header: FileHeader::default(),
            write_stream: None,
            read_stream: None,
            header_dumped: false,
            record_count: 0,
            write_buf: Vec::new(),
            events_buf: Cursor::new(Vec::new()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.mode != FileMode::Closed
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&mut self) -> &mut FileHeader {
        &mut self.header
    }

    pub fn header_ref(&self) -> &FileHeader {
        &self.header
    }

    pub fn open_write(&mut self, path: &Path) -> Result<()> {
        self.close()?;
        let file = File::create(path).map_err(|e| RecorderError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.write_stream = Some(BufWriter::with_capacity(STREAM_BUFFER_SIZE, file));
        self.path = Some(path.to_path_buf());
        self.header_dumped = false;
        self.record_count = 0;
        self.write_buf.clear();
        self.mode = FileMode::Write;
        Ok(())
    }

    pub fn open_read(&mut self, path: &Path) -> Result<()> {
        self.close()?;
        let file = File::open(path).map_err(|e| RecorderError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.read_stream = Some(BufReader::with_capacity(STREAM_BUFFER_SIZE, file));
        self.path = Some(path.to_path_buf());
        self.events_buf = Cursor::new(Vec::new());
        if let Err(e) = self.parse_header() {
            self.read_stream = None;
            self.header.clear();
            return Err(e);
        }
        self.mode = FileMode::Read;
        Ok(())
    }

    /// Flushes pending events and finalises the stream. Safe to call on a
    /// file that was never opened or never received any event.
    pub fn close(&mut self) -> Result<()> {
        self.read_stream = None;
        if self.write_stream.is_some() {
            self.dump_records_to_file()?;
            if let Some(ws) = self.write_stream.as_mut() {
                ws.flush()?;
            }
        }
        self.write_stream = None;
        self.mode = FileMode::Closed;
        Ok(())
    }

    // ── writing ──────────────────────────────────────────────────────

    pub fn write_event(&mut self, event: &RecorderEvent) -> Result<()> {
        if self.mode != FileMode::Write {
            return Err(RecorderError::WrongMode("writing"));
        }
        self.record_count += 1;
        encode_event(&mut self.write_buf, event)?;
        if self.record_count >= MAX_BUFFERED_RECORDS {
            self.dump_records_to_file()?;
        }
        Ok(())
    }

    /// Flushes the event buffer, then appends the thumbnail and its MD5
    /// chunk so screenshots never split an event run.
    pub fn save_screenshot(&mut self, surface: &Surface, md5: [u8; 16]) -> Result<()> {
        if self.mode != FileMode::Write {
            return Err(RecorderError::WrongMode("writing"));
        }
        self.dump_records_to_file()?;
        let ws = self
            .write_stream
            .as_mut()
            .ok_or(RecorderError::WrongMode("writing"))?;
        thumbnail::save_thumbnail(ws, surface)?;
        write_chunk_header(ws, chunk::MD5_TAG, 16)?;
        ws.write_all(&md5)?;
        Ok(())
    }

    pub fn add_save_file(&mut self, name: &str, contents: Vec<u8>) {
        self.header.save_files.insert(name, contents);
    }

    /// Reader over an embedded save file; empty for unknown names.
    pub fn save_stream(&self, name: &str) -> Cursor<Vec<u8>> {
        Cursor::new(
            self.header
                .save_files
                .get(name)
                .cloned()
                .unwrap_or_default(),
        )
    }

    fn dump_records_to_file(&mut self) -> Result<()> {
        if !self.header_dumped {
            self.dump_header_to_file()?;
            self.header_dumped = true;
        }
        if self.record_count == 0 {
            return Ok(());
        }
        let ws = self
            .write_stream
            .as_mut()
            .ok_or(RecorderError::WrongMode("writing"))?;
        write_chunk_header(ws, chunk::EVENT_TAG, self.write_buf.len() as u32)?;
        ws.write_all(&self.write_buf)?;
        self.write_buf.clear();
        self.record_count = 0;
        Ok(())
    }

    fn dump_header_to_file(&mut self) -> Result<()> {
        let ws = self
            .write_stream
            .as_mut()
            .ok_or(RecorderError::WrongMode("writing"))?;
        // The envelope length stays zero: the final file size is unknown
        // while the header goes out.
        write_chunk_header(ws, chunk::FORMAT_ID_TAG, 0)?;
        write_chunk_header(ws, chunk::VERSION_TAG, 4)?;
        ws.write_u32::<LittleEndian>(RECORD_VERSION)?;
        write_header_section(ws, &self.header)?;
        write_hash_section(ws, &self.header)?;
        write_random_section(ws, &self.header)?;
        write_settings_section(ws, &self.header)?;
        write_save_section(ws, &self.header)?;
        Ok(())
    }

    /// Rewrites only the `HEAD` section of an already-recorded file so
    /// author/name/notes edits survive without touching the event stream.
    pub fn update_header(&mut self) -> Result<()> {
        if self.mode != FileMode::Read {
            return Err(RecorderError::WrongMode("reading"));
        }
        let path = self
            .path
            .clone()
            .ok_or(RecorderError::WrongMode("reading"))?;
        let bytes = std::fs::read(&path)?;

        let mut pos = 0usize;
        for expected in [chunk::FORMAT_ID_TAG, chunk::VERSION_TAG] {
            let (id, len) =
                chunk_at(&bytes, pos).ok_or(RecorderError::BadSignature)?;
            if id != expected {
                return Err(RecorderError::BadSignature);
            }
            pos += 8 + len as usize;
        }

        let insert_at = pos;
        let mut head_span = (insert_at, insert_at);
        let mut scan = pos;
        while let Some((id, len)) = chunk_at(&bytes, scan) {
            match id {
                chunk::HEADER_SECTION_TAG => {
                    head_span = (scan, scan + 8 + len as usize);
                    break;
                }
                // The header must precede the event stream, so stop at the
                // first event or screenshot chunk.
                chunk::EVENT_TAG | chunk::SCREENSHOT_TAG => break,
                _ => scan += 8 + len as usize,
            }
        }

        let mut head_bytes = Vec::new();
        write_header_section(&mut head_bytes, &self.header)?;

        let (start, end) = head_span;
        let mut out = Vec::with_capacity(bytes.len() - (end - start) + head_bytes.len());
        out.extend_from_slice(&bytes[..start]);
        out.extend_from_slice(&head_bytes);
        out.extend_from_slice(&bytes[end..]);

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, &out)?;
        std::fs::rename(&tmp, &path)?;

        self.open_read(&path)
    }

    // ── reading ──────────────────────────────────────────────────────

    fn reader(&mut self) -> Result<&mut BufReader<File>> {
        self.read_stream
            .as_mut()
            .ok_or(RecorderError::WrongMode("reading"))
    }

    fn parse_header(&mut self) -> Result<()> {
        self.header.clear();
        let mut state = ParseState::CheckFormat;
        let mut chunk = read_chunk_header(self.reader()?).map_err(|_| {
            warn!("Record file too short for a signature");
            RecorderError::BadSignature
        })?;
        loop {
            let reread = self.process_chunk(&mut state, chunk)?;
            match state {
                ParseState::Done => return Ok(()),
                ParseState::Error => {
                    return Err(RecorderError::MalformedSection { section: "header" })
                }
                _ => {}
            }
            if reread {
                chunk = match read_chunk_header(self.reader()?) {
                    Ok(c) => c,
                    // A file may legally end at any chunk boundary past the
                    // version check: sections are complete at that point.
                    Err(_)
                        if !matches!(
                            state,
                            ParseState::CheckFormat | ParseState::CheckVersion
                        ) =>
                    {
                        return Ok(())
                    }
                    Err(_) => {
                        warn!("Record file truncated inside header");
                        return Err(RecorderError::MalformedSection { section: "header" });
                    }
                };
            }
        }
    }

    /// One step of the parsing state machine. Returns whether the next
    /// chunk header should be read; `false` re-dispatches the same chunk
    /// under the updated state.
    fn process_chunk(&mut self, state: &mut ParseState, chunk: ChunkHeader) -> Result<bool> {
        match *state {
            ParseState::CheckFormat => {
                if chunk.id == chunk::FORMAT_ID_TAG {
                    *state = ParseState::CheckVersion;
                } else {
                    warn!("Unknown record file signature");
                    return Err(RecorderError::BadSignature);
                }
            }
            ParseState::CheckVersion => {
                if chunk.id != chunk::VERSION_TAG {
                    *state = ParseState::Error;
                    return Ok(false);
                }
                let version = self.reader()?.read_u32::<LittleEndian>()?;
                if version != RECORD_VERSION {
                    warn!(
                        expected = RECORD_VERSION,
                        got = version,
                        "Incorrect record file version"
                    );
                    return Err(RecorderError::UnsupportedVersion {
                        expected: RECORD_VERSION,
                        got: version,
                    });
                }
                *state = ParseState::SelectSection;
            }
            ParseState::SelectSection => match chunk.id {
                chunk::HEADER_SECTION_TAG => *state = ParseState::ProcessHeader,
                chunk::HASH_SECTION_TAG => *state = ParseState::ProcessHash,
                chunk::RANDOM_SECTION_TAG => *state = ParseState::ProcessRandom,
                chunk::SETTINGS_SECTION_TAG => *state = ParseState::ProcessSettings,
                chunk::SAVE_SECTION_TAG => *state = ParseState::ProcessSave,
                chunk::EVENT_TAG | chunk::SCREENSHOT_TAG => {
                    self.reader()?.seek_relative(-8)?;
                    *state = ParseState::Done;
                    return Ok(false);
                }
                _ => {
                    debug!(tag = %tag_name(chunk.id), len = chunk.len, "Skipping unknown chunk");
                    self.reader()?.seek_relative(i64::from(chunk.len))?;
                }
            },
            ParseState::ProcessHeader => match chunk.id {
                chunk::AUTHOR_TAG => self.header.author = self.read_string(chunk.len)?,
                chunk::COMMENTS_TAG => self.header.notes = self.read_string(chunk.len)?,
                chunk::NAME_TAG => self.header.name = self.read_string(chunk.len)?,
                _ => {
                    *state = ParseState::SelectSection;
                    return Ok(false);
                }
            },
            ParseState::ProcessHash => {
                if chunk.id == chunk::HASH_RECORD_TAG {
                    let name = self.read_string(chunk.len.saturating_sub(32))?;
                    let md5 = self.read_string(32)?;
                    self.header.hash_records.insert(name, md5);
                } else {
                    *state = ParseState::SelectSection;
                    return Ok(false);
                }
            }
            ParseState::ProcessRandom => {
                if chunk.id == chunk::RANDOM_RECORD_TAG {
                    let name = self.read_string(chunk.len.saturating_sub(4))?;
                    let seed = self.reader()?.read_u32::<LittleEndian>()?;
                    self.header.random_source_records.insert(name, seed);
                } else {
                    *state = ParseState::SelectSection;
                    return Ok(false);
                }
            }
            ParseState::ProcessSettings => {
                if chunk.id == chunk::SETTINGS_RECORD_TAG {
                    let key_chunk = read_chunk_header(self.reader()?)?;
                    if key_chunk.id != chunk::SETTINGS_KEY_TAG {
                        warn!("Invalid format of settings section");
                        return Err(RecorderError::MalformedSection { section: "settings" });
                    }
                    let key = self.read_string(key_chunk.len)?;
                    let value_chunk = read_chunk_header(self.reader()?)?;
                    if value_chunk.id != chunk::SETTINGS_VALUE_TAG {
                        warn!("Invalid format of settings section");
                        return Err(RecorderError::MalformedSection { section: "settings" });
                    }
                    let value = self.read_string(value_chunk.len)?;
                    self.header.settings_records.insert(key, value);
                } else {
                    *state = ParseState::SelectSection;
                    return Ok(false);
                }
            }
            ParseState::ProcessSave => {
                if chunk.id == chunk::SAVE_RECORD_TAG {
                    let name_chunk = read_chunk_header(self.reader()?)?;
                    if name_chunk.id != chunk::SAVE_NAME_TAG {
                        warn!("Invalid format of save section");
                        return Err(RecorderError::MalformedSection { section: "save" });
                    }
                    let name = self.read_string(name_chunk.len)?;
                    let buf_chunk = read_chunk_header(self.reader()?)?;
                    if buf_chunk.id != chunk::SAVE_BUFFER_TAG {
                        warn!("Invalid format of save section");
                        return Err(RecorderError::MalformedSection { section: "save" });
                    }
                    let mut contents = vec![0u8; buf_chunk.len as usize];
                    self.reader()?.read_exact(&mut contents)?;
                    self.header.save_files.insert(name, contents);
                } else {
                    *state = ParseState::SelectSection;
                    return Ok(false);
                }
            }
            ParseState::Done | ParseState::Error => {}
        }
        Ok(true)
    }

    fn read_string(&mut self, len: u32) -> Result<String> {
        let mut buf = vec![0u8; len as usize];
        self.reader()?.read_exact(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn events_exhausted(&self) -> bool {
        self.events_buf.position() as usize >= self.events_buf.get_ref().len()
    }

    /// Streams the next recorded event, refilling the decode buffer from
    /// the next `EVNT` chunk as needed. Returns `Invalid` past the end of
    /// the log.
    pub fn get_next_event(&mut self) -> RecorderEvent {
        if self.mode != FileMode::Read {
            return RecorderEvent::invalid();
        }
        if self.events_exhausted() && !self.refill_events_buffer() {
            return RecorderEvent::invalid();
        }
        decode_event(&mut self.events_buf).unwrap_or_else(|_| RecorderEvent::invalid())
    }

    fn refill_events_buffer(&mut self) -> bool {
        loop {
            let reader = match self.reader() {
                Ok(r) => r,
                Err(_) => return false,
            };
            let chunk = match read_chunk_header(reader) {
                Ok(c) => c,
                Err(_) => return false,
            };
            match chunk.id {
                chunk::EVENT_TAG => {
                    let mut buf = vec![0u8; chunk.len as usize];
                    if reader.read_exact(&mut buf).is_err() {
                        return false;
                    }
                    self.events_buf = Cursor::new(buf);
                    return true;
                }
                chunk::SCREENSHOT_TAG => {
                    // The thumbnail codec owns this chunk's length, which
                    // sits after the tag in big-endian.
                    if reader.seek_relative(-4).is_err()
                        || thumbnail::skip_thumbnail(reader).is_err()
                    {
                        return false;
                    }
                }
                _ => {
                    if reader.seek_relative(i64::from(chunk.len)).is_err() {
                        return false;
                    }
                }
            }
        }
    }

    // ── screenshot retrieval ─────────────────────────────────────────

    pub fn get_screens_count(&mut self) -> usize {
        if self.mode != FileMode::Read {
            return 0;
        }
        let saved = match self
            .reader()
            .and_then(|r| r.stream_position().map_err(RecorderError::from))
        {
            Ok(p) => p,
            Err(_) => return 0,
        };
        let count = self.count_screens().unwrap_or(0);
        if let Ok(r) = self.reader() {
            let _ = r.seek(SeekFrom::Start(saved));
        }
        count
    }

    fn count_screens(&mut self) -> Result<usize> {
        let reader = self.reader()?;
        reader.seek(SeekFrom::Start(0))?;
        read_chunk_header(reader)?;
        let mut count = 0;
        while self.skip_to_next_screenshot() {
            if thumbnail::skip_thumbnail(self.reader()?).is_err() {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Retrieves the `number`-th screenshot, counting from 1.
    pub fn get_screen_shot(&mut self, number: usize) -> Option<Surface> {
        if self.mode != FileMode::Read || number == 0 {
            return None;
        }
        let saved = self.reader().ok()?.stream_position().ok()?;
        let result = self.find_screen_shot(number);
        if let Ok(r) = self.reader() {
            let _ = r.seek(SeekFrom::Start(saved));
        }
        result
    }

    fn find_screen_shot(&mut self, number: usize) -> Option<Surface> {
        let reader = self.reader().ok()?;
        reader.seek(SeekFrom::Start(0)).ok()?;
        read_chunk_header(reader).ok()?;
        let mut index = 1;
        while self.skip_to_next_screenshot() {
            let reader = self.reader().ok()?;
            if index == number {
                // Step back over the tag so the codec sees its own magic.
                reader.seek_relative(-4).ok()?;
                return thumbnail::load_thumbnail(reader).ok();
            }
            thumbnail::skip_thumbnail(reader).ok()?;
            index += 1;
        }
        None
    }

    /// Advances to just past the next `BMHT` tag. Every other chunk is
    /// skipped by its little-endian length.
    fn skip_to_next_screenshot(&mut self) -> bool {
        loop {
            let reader = match self.reader() {
                Ok(r) => r,
                Err(_) => return false,
            };
            let id = match reader.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(_) => return false,
            };
            if id == chunk::SCREENSHOT_TAG {
                return true;
            }
            let len = match reader.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(_) => return false,
            };
            if reader.seek_relative(i64::from(len)).is_err() {
                return false;
            }
        }
    }
}

fn chunk_at(bytes: &[u8], pos: usize) -> Option<(u32, u32)> {
    let header = bytes.get(pos..pos + 8)?;
    let id = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    Some((id, len))
}

// ── event payload codec ──────────────────────────────────────────────

fn encode_event(buf: &mut Vec<u8>, e: &RecorderEvent) -> io::Result<()> {
    buf.write_u32::<LittleEndian>(e.event.wire_id())?;
    buf.write_u32::<LittleEndian>(e.time)?;
    match e.event {
        Event::Invalid | Event::Timer => {}
        Event::Delay { millis } => buf.write_u32::<LittleEndian>(millis)?,
        Event::Audio { samples } => buf.write_u32::<LittleEndian>(samples)?,
        Event::KeyDown(k) | Event::KeyUp(k) => {
            buf.write_i32::<LittleEndian>(k.keycode)?;
            buf.write_u16::<LittleEndian>(k.ascii)?;
            buf.write_u8(k.flags.bits())?;
        }
        Event::MouseMove(m)
        | Event::LButtonDown(m)
        | Event::LButtonUp(m)
        | Event::RButtonDown(m)
        | Event::RButtonUp(m)
        | Event::WheelUp(m)
        | Event::WheelDown(m)
        | Event::MButtonDown(m)
        | Event::MButtonUp(m) => {
            buf.write_i16::<LittleEndian>(m.x)?;
            buf.write_i16::<LittleEndian>(m.y)?;
        }
    }
    Ok(())
}

fn read_key_state<R: Read>(reader: &mut R) -> io::Result<KeyState> {
    Ok(KeyState {
        keycode: reader.read_i32::<LittleEndian>()?,
        ascii: reader.read_u16::<LittleEndian>()?,
        flags: Modifiers::from_bits_truncate(reader.read_u8()?),
    })
}

fn decode_event<R: Read>(reader: &mut R) -> io::Result<RecorderEvent> {
    let id = reader.read_u32::<LittleEndian>()?;
    let time = reader.read_u32::<LittleEndian>()?;
    let event = match id {
        1 => Event::KeyDown(read_key_state(reader)?),
        2 => Event::KeyUp(read_key_state(reader)?),
        3..=11 => {
            let m = MouseState {
                x: reader.read_i16::<LittleEndian>()?,
                y: reader.read_i16::<LittleEndian>()?,
            };
            match id {
                3 => Event::MouseMove(m),
                4 => Event::LButtonDown(m),
                5 => Event::LButtonUp(m),
                6 => Event::RButtonDown(m),
                7 => Event::RButtonUp(m),
                8 => Event::WheelUp(m),
                9 => Event::WheelDown(m),
                10 => Event::MButtonDown(m),
                _ => Event::MButtonUp(m),
            }
        }
        12 => Event::Timer,
        13 => Event::Delay {
            millis: reader.read_u32::<LittleEndian>()?,
        },
        14 => Event::Audio {
            samples: reader.read_u32::<LittleEndian>()?,
        },
        _ => Event::Invalid,
    };
    Ok(RecorderEvent {
        time,
        event,
        synthetic: false,
    })
}

// ── header section writers ───────────────────────────────────────────

fn write_header_section<W: Write>(w: &mut W, header: &FileHeader) -> io::Result<()> {
    let fields: [(u32, &str); 3] = [
        (chunk::AUTHOR_TAG, &header.author),
        (chunk::COMMENTS_TAG, &header.notes),
        (chunk::NAME_TAG, &header.name),
    ];
    let size: usize = fields
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(_, v)| 8 + v.len())
        .sum();
    if size == 0 {
        return Ok(());
    }
    write_chunk_header(w, chunk::HEADER_SECTION_TAG, size as u32)?;
    for (tag, value) in fields {
        if !value.is_empty() {
            write_chunk_header(w, tag, value.len() as u32)?;
            w.write_all(value.as_bytes())?;
        }
    }
    Ok(())
}

fn write_hash_section<W: Write>(w: &mut W, header: &FileHeader) -> io::Result<()> {
    if header.hash_records.is_empty() {
        return Ok(());
    }
    let size: usize = header
        .hash_records
        .iter()
        .map(|(k, v)| 8 + k.len() + v.len())
        .sum();
    write_chunk_header(w, chunk::HASH_SECTION_TAG, size as u32)?;
    for (name, md5) in &header.hash_records {
        write_chunk_header(w, chunk::HASH_RECORD_TAG, (name.len() + md5.len()) as u32)?;
        w.write_all(name.as_bytes())?;
        w.write_all(md5.as_bytes())?;
    }
    Ok(())
}

fn write_random_section<W: Write>(w: &mut W, header: &FileHeader) -> io::Result<()> {
    if header.random_source_records.is_empty() {
        return Ok(());
    }
    let size: usize = header
        .random_source_records
        .iter()
        .map(|(k, _)| 8 + k.len() + 4)
        .sum();
    write_chunk_header(w, chunk::RANDOM_SECTION_TAG, size as u32)?;
    for (name, seed) in header.random_source_records.iter() {
        write_chunk_header(w, chunk::RANDOM_RECORD_TAG, (name.len() + 4) as u32)?;
        w.write_all(name.as_bytes())?;
        w.write_u32::<LittleEndian>(*seed)?;
    }
    Ok(())
}

fn write_settings_section<W: Write>(w: &mut W, header: &FileHeader) -> io::Result<()> {
    if header.settings_records.is_empty() {
        return Ok(());
    }
    let size: usize = header
        .settings_records
        .iter()
        .map(|(k, v)| 8 + k.len() + v.len() + 16)
        .sum();
    write_chunk_header(w, chunk::SETTINGS_SECTION_TAG, size as u32)?;
    for (key, value) in &header.settings_records {
        write_chunk_header(
            w,
            chunk::SETTINGS_RECORD_TAG,
            (key.len() + value.len() + 16) as u32,
        )?;
        write_chunk_header(w, chunk::SETTINGS_KEY_TAG, key.len() as u32)?;
        w.write_all(key.as_bytes())?;
        write_chunk_header(w, chunk::SETTINGS_VALUE_TAG, value.len() as u32)?;
        w.write_all(value.as_bytes())?;
    }
    Ok(())
}

fn write_save_section<W: Write>(w: &mut W, header: &FileHeader) -> io::Result<()> {
    if header.save_files.is_empty() {
        return Ok(());
    }
    let size: usize = header
        .save_files
        .iter()
        .map(|(name, contents)| 8 + (8 + name.len()) + (8 + contents.len()))
        .sum();
    write_chunk_header(w, chunk::SAVE_SECTION_TAG, size as u32)?;
    for (name, contents) in header.save_files.iter() {
        write_chunk_header(
            w,
            chunk::SAVE_RECORD_TAG,
            ((8 + name.len()) + (8 + contents.len())) as u32,
        )?;
        write_chunk_header(w, chunk::SAVE_NAME_TAG, name.len() as u32)?;
        w.write_all(name.as_bytes())?;
        write_chunk_header(w, chunk::SAVE_BUFFER_TAG, contents.len() as u32)?;
        w.write_all(contents)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn event_round_trip(original: RecorderEvent) {
        let mut buf = Vec::new();
        encode_event(&mut buf, &original).unwrap();
        let decoded = decode_event(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn key_event_payload() {
        event_round_trip(RecorderEvent::new(
            100,
            Event::KeyDown(KeyState {
                keycode: -7,
                ascii: 0x41,
                flags: Modifiers::CTRL | Modifiers::SHIFT,
            }),
        ));
    }

    #[test]
    fn mouse_event_payload() {
        event_round_trip(RecorderEvent::new(
            55,
            Event::LButtonDown(MouseState { x: -120, y: 300 }),
        ));
    }

    #[test]
    fn clock_and_audio_payloads() {
        event_round_trip(RecorderEvent::new(1, Event::Timer));
        event_round_trip(RecorderEvent::new(2, Event::Delay { millis: 50 }));
        event_round_trip(RecorderEvent::new(3, Event::Audio { samples: 4096 }));
    }

    #[test]
    fn unknown_wire_id_decodes_as_invalid() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&99u32.to_le_bytes());
        buf.extend_from_slice(&1234u32.to_le_bytes());
        let decoded = decode_event(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded.event, Event::Invalid);
        assert_eq!(decoded.time, 1234);
    }

    #[test]
    fn closed_file_returns_invalid_and_zero_screens() {
        let mut file = PlaybackFile::new();
        assert_eq!(file.get_next_event().event, Event::Invalid);
        assert_eq!(file.get_screens_count(), 0);
        assert!(file.get_screen_shot(1).is_none());
        assert!(file.close().is_ok());
    }

    #[test]
    fn write_event_requires_write_mode() {
        let mut file = PlaybackFile::new();
        let err = file.write_event(&RecorderEvent::new(0, Event::Timer));
        assert!(err.is_err());
    }

    #[test]
    fn header_section_skipped_when_empty() {
        let header = FileHeader::default();
        let mut buf = Vec::new();
        write_header_section(&mut buf, &header).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn settings_section_sizes_match_layout() {
        let mut header = FileHeader::default();
        header
            .settings_records
            .insert("music".to_string(), "off".to_string());
        let mut buf = Vec::new();
        write_settings_section(&mut buf, &header).unwrap();
        let (id, len) = chunk_at(&buf, 0).unwrap();
        assert_eq!(id, chunk::SETTINGS_SECTION_TAG);
        assert_eq!(len as usize, buf.len() - 8);
        let (rec_id, rec_len) = chunk_at(&buf, 8).unwrap();
        assert_eq!(rec_id, chunk::SETTINGS_RECORD_TAG);
        assert_eq!(rec_len as usize, "music".len() + "off".len() + 16);
    }
}
