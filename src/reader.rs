//! Log Reader: opens a Darshan log, validates the header, and exposes the
//! compressed job / name-hash / per-module regions as decompressed byte
//! streams.
//!
//! No reference implementation was available to transcribe the on-disk
//! header layout from, so the concrete field order and widths below are an
//! invented-but-fixed layout rather than a transcription.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{DarshanError, Result};
use crate::types::{CompressionKind, ModuleId};

const MAGIC: &[u8; 8] = b"darshan3";

/// One entry from the header's module map table.
#[derive(Debug, Clone)]
pub struct ModuleRegion {
    pub id: ModuleId,
    pub schema_version: u16,
    pub partial: bool,
    pub compressed_len: u64,
    data: Vec<u8>,
}

impl ModuleRegion {
    /// Decompressed bytes for this module's record stream.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Handle returned by [`LogReader::open`]. Exposes the log-format version,
/// compression kind, per-region byte extents, and the decompressed job,
/// name-hash, and per-module streams.
pub struct LogReader {
    pub version: String,
    pub compression: CompressionKind,
    pub header_bytes: u64,
    pub job_bytes: u64,
    pub record_table_bytes: u64,
    job_data: Vec<u8>,
    name_data: Vec<u8>,
    modules: Vec<ModuleRegion>,
}

/// Log versions known to produce quirky but parseable output. Advisory
/// only -- never fatal.
const QUIRKY_VERSIONS: &[&str] = &["3.00", "3.10"];

impl LogReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path).map_err(DarshanError::OpenError)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(DarshanError::OpenError)?;
        Self::from_bytes(&buf)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);

        let mut magic = [0u8; 8];
        cur.read_exact(&mut magic)
            .map_err(|_| DarshanError::FormatError("log shorter than magic".into()))?;
        if &magic != MAGIC {
            return Err(DarshanError::FormatError(
                "bad magic (not a darshan log)".into(),
            ));
        }

        let version_len = read_u32(&mut cur)? as usize;
        let mut version_bytes = vec![0u8; version_len];
        cur.read_exact(&mut version_bytes)
            .map_err(|_| DarshanError::FormatError("truncated version string".into()))?;
        let version = String::from_utf8(version_bytes)
            .map_err(|_| DarshanError::FormatError("version string not utf8".into()))?;

        if !KNOWN_VERSIONS.contains(&version.as_str()) {
            return Err(DarshanError::UnsupportedVersion(version));
        }
        if QUIRKY_VERSIONS.contains(&version.as_str()) {
            eprintln!("warning: log version {version} is known to have quirks; proceeding");
        }

        let compression = match read_u8(&mut cur)? {
            0 => CompressionKind::None,
            1 => CompressionKind::Zlib,
            2 => CompressionKind::Bzip2,
            _ => CompressionKind::Unknown,
        };

        let job_offset = read_u64(&mut cur)?;
        let job_len = read_u64(&mut cur)?;
        let name_offset = read_u64(&mut cur)?;
        let name_len = read_u64(&mut cur)?;

        let module_count = read_u32(&mut cur)?;
        let mut entries = Vec::with_capacity(module_count as usize);
        for _ in 0..module_count {
            let id = read_u16(&mut cur)?;
            let schema_version = read_u16(&mut cur)?;
            let partial = read_u8(&mut cur)? != 0;
            let offset = read_u64(&mut cur)?;
            let len = read_u64(&mut cur)?;
            entries.push((ModuleId::from_wire(id), schema_version, partial, offset, len));
        }

        let header_bytes = cur.position();

        let job_data = decompress_region(buf, job_offset, job_len, compression)?;
        let name_data = decompress_region(buf, name_offset, name_len, compression)?;

        let mut modules = Vec::with_capacity(entries.len());
        for (id, schema_version, partial, offset, len) in entries {
            let data = match id {
                ModuleId::Unknown(raw) => {
                    eprintln!(
                        "note: skipping unknown module id {raw} ({len} compressed bytes)"
                    );
                    Vec::new()
                }
                _ => decompress_region(buf, offset, len, compression)?,
            };
            modules.push(ModuleRegion {
                id,
                schema_version,
                partial,
                compressed_len: len,
                data,
            });
        }

        Ok(LogReader {
            version,
            compression,
            header_bytes,
            job_bytes: job_len,
            record_table_bytes: name_len,
            job_data,
            name_data,
            modules,
        })
    }

    pub fn job_region(&self) -> &[u8] {
        &self.job_data
    }

    pub fn name_region(&self) -> &[u8] {
        &self.name_data
    }

    pub fn modules(&self) -> &[ModuleRegion] {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> Option<&ModuleRegion> {
        self.modules.iter().find(|m| m.id == id)
    }
}

const KNOWN_VERSIONS: &[&str] = &["3.00", "3.10", "3.21", "3.40", "3.41"];

fn decompress_region(
    buf: &[u8],
    offset: u64,
    len: u64,
    compression: CompressionKind,
) -> Result<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| DarshanError::FormatError("region extent overflow".into()))?;
    if end > buf.len() {
        return Err(DarshanError::FormatError(format!(
            "region [{start}, {end}) exceeds file length {}",
            buf.len()
        )));
    }
    let slice = &buf[start..end];

    let mut out = Vec::new();
    match compression {
        CompressionKind::None => out.extend_from_slice(slice),
        CompressionKind::Zlib => {
            let mut decoder = flate2::read::ZlibDecoder::new(slice);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| DarshanError::FormatError(format!("zlib decode failed: {e}")))?;
        }
        CompressionKind::Bzip2 => {
            let mut decoder = bzip2::read::BzDecoder::new(slice);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| DarshanError::FormatError(format!("bzip2 decode failed: {e}")))?;
        }
        CompressionKind::Unknown => {
            return Err(DarshanError::FormatError(
                "region uses an unknown compression kind".into(),
            ));
        }
    }
    Ok(out)
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    r.read_u8()
        .map_err(|_| DarshanError::FormatError("truncated header".into()))
}
fn read_u16<R: Read>(r: &mut R) -> Result<u16> {
    r.read_u16::<LittleEndian>()
        .map_err(|_| DarshanError::FormatError("truncated header".into()))
}
fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    r.read_u32::<LittleEndian>()
        .map_err(|_| DarshanError::FormatError("truncated header".into()))
}
fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    r.read_u64::<LittleEndian>()
        .map_err(|_| DarshanError::FormatError("truncated header".into()))
}
