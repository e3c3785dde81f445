use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Packs a four-character chunk tag into its `u32` id. Ids are written
/// and compared little-endian, so the literal ASCII lands on disk.
pub const fn tag(bytes: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*bytes)
}

/// Envelope, always the first chunk. Its length is written as zero since
/// the total file size is unknown when the header goes out.
pub const FORMAT_ID_TAG: u32 = tag(b"PBCK");
pub const VERSION_TAG: u32 = tag(b"VERS");
pub const HEADER_SECTION_TAG: u32 = tag(b"HEAD");
pub const HASH_SECTION_TAG: u32 = tag(b"HASH");
pub const RANDOM_SECTION_TAG: u32 = tag(b"RAND");
pub const SETTINGS_SECTION_TAG: u32 = tag(b"SETT");
pub const SAVE_SECTION_TAG: u32 = tag(b"SAVE");
pub const EVENT_TAG: u32 = tag(b"EVNT");
pub const SCREENSHOT_TAG: u32 = tag(b"BMHT");
pub const MD5_TAG: u32 = tag(b"MD5 ");
pub const AUTHOR_TAG: u32 = tag(b"HAUT");
pub const COMMENTS_TAG: u32 = tag(b"HCMT");
pub const NAME_TAG: u32 = tag(b"HNAM");
pub const HASH_RECORD_TAG: u32 = tag(b"HRCD");
pub const RANDOM_RECORD_TAG: u32 = tag(b"RRCD");
pub const SETTINGS_RECORD_TAG: u32 = tag(b"SREC");
pub const SETTINGS_KEY_TAG: u32 = tag(b"SKEY");
pub const SETTINGS_VALUE_TAG: u32 = tag(b"SVAL");
pub const SAVE_RECORD_TAG: u32 = tag(b"RSAV");
pub const SAVE_NAME_TAG: u32 = tag(b"SNAM");
pub const SAVE_BUFFER_TAG: u32 = tag(b"SBUF");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: u32,
    pub len: u32,
}

pub fn read_chunk_header<R: Read>(reader: &mut R) -> io::Result<ChunkHeader> {
    let id = reader.read_u32::<LittleEndian>()?;
    let len = reader.read_u32::<LittleEndian>()?;
    Ok(ChunkHeader { id, len })
}

pub fn write_chunk_header<W: Write>(writer: &mut W, id: u32, len: u32) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(id)?;
    writer.write_u32::<LittleEndian>(len)?;
    Ok(())
}

/// Renders a tag id for log messages, e.g. `PBCK`.
pub fn tag_name(id: u32) -> String {
    id.to_le_bytes()
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}
