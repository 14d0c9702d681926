//! Core data model shared by every component: record ids, ranks, module
//! records, and the per-file/job-wide accumulators the Aggregation Engine
//! folds them into.

use core::hash::BuildHasherDefault;
use fxhash::FxHasher;
use indexmap::IndexMap;
use std::fmt;

/// Insertion-ordered map keyed by a fast non-cryptographic hash. Iteration
/// order is the order files/ranks were first seen, which is what makes
/// parsing the same log twice produce byte-identical stdout without an
/// explicit sort step.
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// 64-bit opaque hash of a canonicalized file path. Stable across ranks
/// within a job.
pub type RecordId = u64;

/// A rank is either a real participating rank, or the sentinel meaning "an
/// aggregated record representing a file shared across all ranks of the
/// job". A sum type rather than the C source's raw `-1` sentinel, so the
/// fold rules downstream become exhaustive matches instead of a magic
/// number check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    PerRank(u32),
    Shared,
}

impl Rank {
    /// Decode the wire representation (`-1` meaning `Shared`) and check it
    /// against the job's rank count, refusing out-of-range per-rank values
    /// rather than ever indexing a vector with one.
    pub fn from_wire(raw: i32, nprocs: u32) -> crate::error::Result<Self> {
        if raw == -1 {
            Ok(Rank::Shared)
        } else if raw >= 0 && (raw as u32) < nprocs {
            Ok(Rank::PerRank(raw as u32))
        } else {
            Err(crate::error::DarshanError::MalformedRank { rank: raw, nprocs })
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rank::PerRank(r) => write!(f, "{r}"),
            Rank::Shared => write!(f, "-1"),
        }
    }
}

/// Known module ids. `Unknown` carries the raw id from the log's module map
/// table so diagnostics can still name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleId {
    Posix,
    MpiIo,
    Stdio,
    DxtPosix,
    DxtMpiIo,
    BgQ,
    Unknown(u16),
}

impl ModuleId {
    pub fn from_wire(id: u16) -> Self {
        match id {
            0 => ModuleId::Posix,
            1 => ModuleId::MpiIo,
            2 => ModuleId::Stdio,
            3 => ModuleId::DxtPosix,
            4 => ModuleId::DxtMpiIo,
            5 => ModuleId::BgQ,
            other => ModuleId::Unknown(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModuleId::Posix => "POSIX",
            ModuleId::MpiIo => "MPI-IO",
            ModuleId::Stdio => "STDIO",
            ModuleId::DxtPosix => "DXT_POSIX",
            ModuleId::DxtMpiIo => "DXT_MPIIO",
            ModuleId::BgQ => "BG/Q",
            ModuleId::Unknown(_) => "UNKNOWN",
        }
    }

    /// Only POSIX, MPI-IO, and STDIO participate in deeper aggregation.
    pub fn aggregates(&self) -> bool {
        matches!(self, ModuleId::Posix | ModuleId::MpiIo | ModuleId::Stdio)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Base record embedded in every module's record.
#[derive(Debug, Clone, Copy)]
pub struct BaseRecord {
    pub record_id: RecordId,
    pub rank: Rank,
}

/// A decoded module record: the base record plus a fixed-width vector of
/// integer counters and a fixed-width vector of floating counters. Vector
/// lengths and counter semantics are module- and version-specific; the
/// decoder that produced this record owns interpreting the indices (see
/// `src/registry.rs`).
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub base: BaseRecord,
    pub int_counters: Vec<i64>,
    pub float_counters: Vec<f64>,
}

impl ModuleRecord {
    /// Sum of meta + read + write time for this single record.
    /// `meta_idx`/`read_idx`/`write_idx` are the module's float-counter
    /// indices for those three quantities.
    pub fn io_total_time(&self, meta_idx: usize, read_idx: usize, write_idx: usize) -> f64 {
        self.float_counters.get(meta_idx).copied().unwrap_or(0.0)
            + self.float_counters.get(read_idx).copied().unwrap_or(0.0)
            + self.float_counters.get(write_idx).copied().unwrap_or(0.0)
    }
}

/// Bits of `FileAccumulator::file_type`. `SHARED` and `UNIQUE` are mutually
/// exclusive; `PARTSHARED` implies at least two per-rank records folded and
/// no `SHARED` record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTypeFlags(u8);

impl FileTypeFlags {
    pub const UNIQUE: FileTypeFlags = FileTypeFlags(1 << 0);
    pub const PARTSHARED: FileTypeFlags = FileTypeFlags(1 << 1);
    pub const SHARED: FileTypeFlags = FileTypeFlags(1 << 2);

    pub fn empty() -> Self {
        FileTypeFlags(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: FileTypeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FileTypeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: FileTypeFlags) {
        self.0 &= !other.0;
    }
}

impl fmt::Display for FileTypeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(FileTypeFlags::UNIQUE) {
            parts.push("UNIQUE");
        }
        if self.contains(FileTypeFlags::PARTSHARED) {
            parts.push("PARTSHARED");
        }
        if self.contains(FileTypeFlags::SHARED) {
            parts.push("SHARED");
        }
        write!(f, "{}", parts.join("|"))
    }
}

/// One I/O operation's segment, as captured by the DXT runtime buffer
/// manager and later consumed by the DXT viewer (out of scope here; we only
/// produce the serialized buffer).
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentInfo {
    /// Unused for MPI-IO segments.
    pub offset: u64,
    pub length: u64,
    pub start_time: f64,
    pub end_time: f64,
}

impl SegmentInfo {
    /// Bit-exact on-wire size: `offset, length` (u64) + `start_time, end_time` (f64).
    pub const WIRE_SIZE: usize = 8 + 8 + 8 + 8;
}

/// A DXT file record: base record plus two growable segment sequences.
#[derive(Debug, Clone)]
pub struct DxtFileRecord {
    pub base: BaseRecord,
    pub write_traces: Vec<SegmentInfo>,
    pub read_traces: Vec<SegmentInfo>,
}

impl DxtFileRecord {
    /// Bit-exact on-wire size of the fixed header portion (record id,
    /// rank, and the two trace counts), padded out to 64 bytes total.
    pub const WIRE_SIZE: usize = 64;

    pub fn new(record_id: RecordId, rank: Rank) -> Self {
        DxtFileRecord {
            base: BaseRecord { record_id, rank },
            write_traces: Vec::new(),
            read_traces: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.write_traces.is_empty() && self.read_traces.is_empty()
    }
}

/// `{record_id -> path}` name table.
pub type NameRecord = (RecordId, String);

/// One mount table entry.
#[derive(Debug, Clone)]
pub struct MountEntry {
    pub mount_path: String,
    pub fs_type: String,
}

/// Compression used for a log's regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None,
    Zlib,
    Bzip2,
    Unknown,
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompressionKind::None => "NONE",
            CompressionKind::Zlib => "ZLIB",
            CompressionKind::Bzip2 => "BZIP2",
            CompressionKind::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}
