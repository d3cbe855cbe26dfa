//! Writing EBML (the binary format Matroska is built on).
//!
//! Every element is an ID, a size and a payload. IDs are written as-is (they
//! already carry their length marker). Sizes are variable-length integers:
//! the number of leading zero bits of the first byte says how many more bytes
//! follow.
//!
//! ```text
//! 1xxx xxxx                   sizes up to 2^7 - 2
//! 01xx xxxx xxxx xxxx         sizes up to 2^14 - 2
//! ...
//! 0000 0001 (7 more bytes)    sizes up to 2^56 - 2
//! ```

use std::io::{self, Seek, SeekFrom, Write};

use byteorder::{BigEndian, WriteBytesExt};

pub const EBML: u32 = 0x1A45DFA3;
pub const EBML_VERSION: u32 = 0x4286;
pub const EBML_READ_VERSION: u32 = 0x42F7;
pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
pub const DOC_TYPE: u32 = 0x4282;
pub const DOC_TYPE_VERSION: u32 = 0x4287;
pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

pub const SEGMENT: u32 = 0x18538067;

pub const INFO: u32 = 0x1549A966;
pub const TIMESTAMP_SCALE: u32 = 0x2AD7B1;
pub const DURATION: u32 = 0x4489;
pub const MUXING_APP: u32 = 0x4D80;
pub const WRITING_APP: u32 = 0x5741;

pub const TRACKS: u32 = 0x1654AE6B;
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_UID: u32 = 0x73C5;
pub const TRACK_TYPE: u32 = 0x83;
pub const FLAG_LACING: u32 = 0x9C;
pub const CODEC_ID: u32 = 0x86;
pub const DEFAULT_DURATION: u32 = 0x23E383;
pub const VIDEO: u32 = 0xE0;
pub const PIXEL_WIDTH: u32 = 0xB0;
pub const PIXEL_HEIGHT: u32 = 0xBA;
pub const COLOUR_SPACE: u32 = 0x2EB524;
pub const AUDIO: u32 = 0xE1;
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
pub const CHANNELS: u32 = 0x9F;
pub const BIT_DEPTH: u32 = 0x6264;

pub const CLUSTER: u32 = 0x1F43B675;
pub const TIMESTAMP: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;

/// The largest size a variable-length integer can hold (all ones is
/// reserved for "unknown").
const MAX_SIZE: u64 = (1 << 56) - 2;

/// How many bytes `size` takes as a variable-length integer.
pub fn size_len(size: u64) -> usize {
    (1..=8).find(|&n| size < (1 << (7 * n)) - 1).unwrap_or(8)
}

pub fn write_id<W: Write>(writer: &mut W, id: u32) -> io::Result<()> {
    let len = match id {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    };
    writer.write_uint::<BigEndian>(id as u64, len)
}

pub fn write_size<W: Write>(writer: &mut W, size: u64) -> io::Result<()> {
    write_size_with_len(writer, size, size_len(size))
}

fn write_size_with_len<W: Write>(writer: &mut W, size: u64, len: usize) -> io::Result<()> {
    if size > MAX_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("An EBML element can't hold {size} bytes."),
        ));
    }

    let marker = 1u64 << (7 * len);
    writer.write_uint::<BigEndian>(marker | size, len)
}

/// An element holding raw bytes (also used for master elements whose
/// children were written to a buffer first).
pub fn write_binary<W: Write>(writer: &mut W, id: u32, data: &[u8]) -> io::Result<()> {
    write_id(writer, id)?;
    write_size(writer, data.len() as u64)?;
    writer.write_all(data)
}

pub fn write_uint<W: Write>(writer: &mut W, id: u32, value: u64) -> io::Result<()> {
    let len = (1..8).find(|&n| value >> (8 * n) == 0).unwrap_or(8);
    write_id(writer, id)?;
    write_size(writer, len as u64)?;
    writer.write_uint::<BigEndian>(value, len)
}

pub fn write_float<W: Write>(writer: &mut W, id: u32, value: f64) -> io::Result<()> {
    write_id(writer, id)?;
    write_size(writer, 8)?;
    writer.write_f64::<BigEndian>(value)
}

pub fn write_str<W: Write>(writer: &mut W, id: u32, value: &str) -> io::Result<()> {
    write_binary(writer, id, value.as_bytes())
}

/// Start a master element whose size isn't known yet. Returns where the size
/// goes, to be filled in by [end_master].
pub fn start_master<W: Write + Seek>(writer: &mut W, id: u32) -> io::Result<u64> {
    write_id(writer, id)?;
    let size_pos = writer.stream_position()?;
    write_size_with_len(writer, 0, 8)?;
    Ok(size_pos)
}

/// Fill in the size of the master element started at `size_pos`: everything
/// written since.
pub fn end_master<W: Write + Seek>(writer: &mut W, size_pos: u64) -> io::Result<()> {
    let current = writer.stream_position()?;
    writer.seek(SeekFrom::Start(size_pos))?;
    write_size_with_len(writer, current - size_pos - 8, 8)?;
    writer.seek(SeekFrom::Start(current))?;
    Ok(())
}

/// Overwrite the value of a float element written by [write_float], given
/// where its payload starts.
pub fn patch_float<W: Write + Seek>(writer: &mut W, value_pos: u64, value: f64) -> io::Result<()> {
    let current = writer.stream_position()?;
    writer.seek(SeekFrom::Start(value_pos))?;
    writer.write_f64::<BigEndian>(value)?;
    writer.seek(SeekFrom::Start(current))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn sizes_use_as_few_bytes_as_possible() {
        let encode = |size| {
            let mut buf = Vec::new();
            write_size(&mut buf, size).unwrap();
            buf
        };

        assert_eq!(encode(0), [0x80]);
        assert_eq!(encode(126), [0xFE]);
        // 127 would be all ones, which means "unknown".
        assert_eq!(encode(127), [0x40, 0x7F]);
        assert_eq!(encode(300), [0x41, 0x2C]);
        assert_eq!(size_len(MAX_SIZE), 8);
        assert!(write_size(&mut Vec::new(), MAX_SIZE + 1).is_err());
    }

    #[test]
    fn elements() {
        let mut buf = Vec::new();
        write_uint(&mut buf, TRACK_NUMBER, 1).unwrap();
        write_uint(&mut buf, TIMESTAMP_SCALE, 1_000_000).unwrap();
        write_str(&mut buf, DOC_TYPE, "matroska").unwrap();

        let mut expected = vec![0xD7, 0x81, 0x01];
        expected.extend([0x2A, 0xD7, 0xB1, 0x83, 0x0F, 0x42, 0x40]);
        expected.extend([0x42, 0x82, 0x88]);
        expected.extend(b"matroska");
        assert_eq!(buf, expected);
    }

    #[test]
    fn master_sizes_are_patched() {
        let mut cursor = Cursor::new(Vec::new());
        let size_pos = start_master(&mut cursor, CLUSTER).unwrap();
        write_uint(&mut cursor, TIMESTAMP, 0).unwrap();
        end_master(&mut cursor, size_pos).unwrap();
        write_uint(&mut cursor, TIMESTAMP, 7).unwrap();

        let buf = cursor.into_inner();
        assert_eq!(&buf[..4], [0x1F, 0x43, 0xB6, 0x75]);
        assert_eq!(&buf[4..12], [0x01, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(&buf[12..15], [0xE7, 0x81, 0x00]);
        assert_eq!(&buf[15..], [0xE7, 0x81, 0x07]);
    }
}
