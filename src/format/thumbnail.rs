use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{RecorderError, Result};

/// Raw RGBA frame handed over by the host when a screenshot is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub width: u16,
    pub height: u16,
    /// `width * height * BYTES_PER_PIXEL` bytes, row-major.
    pub pixels: Vec<u8>,
}

pub const BYTES_PER_PIXEL: usize = 4;

impl Surface {
    pub fn new(width: u16, height: u16) -> Self {
        Surface {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }
}

const THUMBNAIL_MAGIC: &[u8; 4] = b"BMHT";
const THUMBNAIL_VERSION: u8 = 1;
// magic + size + version + width + height + bpp
const THUMBNAIL_HEADER_SIZE: u32 = 4 + 4 + 1 + 2 + 2 + 1;

/// Serialises a surface in the thumbnail codec's own framing. The magic
/// doubles as the `BMHT` chunk tag the scanner sees; every interior
/// integer is big-endian, including the total size that immediately
/// follows the magic, which the scanner trusts when skipping.
pub fn save_thumbnail<W: Write>(writer: &mut W, surface: &Surface) -> Result<()> {
    let total = THUMBNAIL_HEADER_SIZE + surface.pixels.len() as u32;
    writer.write_all(THUMBNAIL_MAGIC)?;
    writer.write_u32::<BigEndian>(total)?;
    writer.write_u8(THUMBNAIL_VERSION)?;
    writer.write_u16::<BigEndian>(surface.width)?;
    writer.write_u16::<BigEndian>(surface.height)?;
    writer.write_u8(BYTES_PER_PIXEL as u8)?;
    writer.write_all(&surface.pixels)?;
    Ok(())
}

/// Decodes a thumbnail with the stream positioned at the magic.
pub fn load_thumbnail<R: Read>(reader: &mut R) -> Result<Surface> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != THUMBNAIL_MAGIC {
        return Err(RecorderError::BadThumbnail(format!(
            "bad magic {:02x?}",
            magic
        )));
    }
    let total = reader.read_u32::<BigEndian>()?;
    let version = reader.read_u8()?;
    if version != THUMBNAIL_VERSION {
        return Err(RecorderError::BadThumbnail(format!(
            "unsupported version {version}"
        )));
    }
    let width = reader.read_u16::<BigEndian>()?;
    let height = reader.read_u16::<BigEndian>()?;
    let bpp = reader.read_u8()? as usize;
    if bpp != BYTES_PER_PIXEL {
        return Err(RecorderError::BadThumbnail(format!("unsupported bpp {bpp}")));
    }
    let expected = width as usize * height as usize * bpp;
    if total != THUMBNAIL_HEADER_SIZE + expected as u32 {
        return Err(RecorderError::BadThumbnail(format!(
            "size field {total} does not match {width}x{height}x{bpp}"
        )));
    }
    let mut pixels = vec![0u8; expected];
    reader.read_exact(&mut pixels)?;
    Ok(Surface {
        width,
        height,
        pixels,
    })
}

/// Skips a thumbnail with the stream positioned just past the magic.
/// Honors the codec's big-endian size, which counts the magic and the
/// size field themselves.
pub fn skip_thumbnail<R: Read + Seek>(reader: &mut R) -> Result<()> {
    let total = reader.read_u32::<BigEndian>()?;
    reader.seek(SeekFrom::Current(i64::from(total) - 8))?;
    Ok(())
}
