//! Variable-length quantities and SMF chunk headers.
//!
//! A VLQ stores 7 bits per byte, most significant group first; every byte
//! except the last has the continuation bit `0x80` set. Four bytes at most,
//! so the largest encodable value is `0x0FFFFFFF`.

use std::io::{Read, Write};

use smallvec::SmallVec;

use crate::error::{Error, Result};

pub const VLQ_MAX: u32 = 0x0FFF_FFFF;

const CONTINUATION: u8 = 0x80;

/// Encode a value as a VLQ.
pub fn encode_vlq(value: u32) -> Result<SmallVec<[u8; 4]>> {
    if value > VLQ_MAX {
        return Err(Error::VlqOverflow(value));
    }
    let mut groups: SmallVec<[u8; 4]> = SmallVec::new();
    let mut rest = value;
    loop {
        groups.push((rest & 0x7F) as u8);
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    groups.reverse();
    let last = groups.len() - 1;
    for byte in &mut groups[..last] {
        *byte |= CONTINUATION;
    }
    Ok(groups)
}

pub fn write_vlq<W: Write>(out: &mut W, value: u32) -> Result<()> {
    out.write_all(&encode_vlq(value)?)?;
    Ok(())
}

/// Decode a VLQ from the start of `bytes`, returning the value and the bytes consumed.
pub fn decode_vlq(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut value = 0u32;
    for (i, byte) in bytes.iter().take(4).enumerate() {
        value = value << 7 | (byte & 0x7F) as u32;
        if byte & CONTINUATION == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::MalformedVlq)
}

/// Read a VLQ byte by byte. A source that ends mid-quantity yields an
/// `UnexpectedEof` IO error.
pub fn read_vlq<R: Read>(source: &mut R) -> Result<u32> {
    let mut value = 0u32;
    for _ in 0..4 {
        let mut byte = [0u8; 1];
        source.read_exact(&mut byte)?;
        value = value << 7 | (byte[0] & 0x7F) as u32;
        if byte[0] & CONTINUATION == 0 {
            return Ok(value);
        }
    }
    Err(Error::MalformedVlq)
}

/// Header of an SMF chunk: four ASCII type bytes and a big-endian length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub kind: [u8; 4],
    pub len: u32,
}

impl ChunkHeader {
    pub const HEADER: [u8; 4] = *b"MThd";
    pub const TRACK: [u8; 4] = *b"MTrk";

    pub fn new(kind: [u8; 4], len: u32) -> Self {
        Self { kind, len }
    }

    pub fn is_header(&self) -> bool {
        self.kind == Self::HEADER
    }

    pub fn is_track(&self) -> bool {
        self.kind == Self::TRACK
    }

    /// Type tag as text, for diagnostics.
    pub fn kind_str(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.kind);
        bytes[4..].copy_from_slice(&self.len.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Result<Self> {
        let kind = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if !kind.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return Err(Error::InvalidChunk(format!(
                "non-ASCII chunk type {:02X?}",
                kind
            )));
        }
        let len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self { kind, len })
    }

    /// Read the next chunk header. Returns `Ok(None)` when the source is
    /// exhausted exactly at a chunk boundary.
    pub fn read<R: Read>(source: &mut R) -> Result<Option<Self>> {
        let mut bytes = [0u8; 8];
        let mut filled = 0;
        while filled < bytes.len() {
            match source.read(&mut bytes[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "truncated chunk header",
                    )))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Self::from_bytes(bytes).map(Some)
    }

    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(&self.to_bytes())?;
        Ok(())
    }
}
