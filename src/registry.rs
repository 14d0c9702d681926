//! Module Decoder Registry: a dispatch table keyed by module id. Each entry
//! provides decode-one-record, per-record pretty-print, a schema
//! description, and a pairwise record aggregator. Versioning is per-module;
//! only one schema version is implemented per module here, but the trait
//! shape leaves room for more.

use std::io::{Cursor, Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{DarshanError, Result};
use crate::types::{BaseRecord, ModuleId, ModuleRecord, Rank};

/// The four operations every module decoder provides, plus the bits of
/// schema knowledge (counter names, which indices feed timing/bandwidth)
/// the Aggregation Engine needs without itself knowing module internals.
pub trait ModuleDecoder {
    fn module_id(&self) -> ModuleId;

    /// Pulls the next record out of the module's decompressed stream.
    /// `Ok(None)` is end-of-stream.
    fn decode_one(&self, cur: &mut Cursor<&[u8]>, nprocs: u32) -> Result<Option<ModuleRecord>>;

    /// Header describing the counter layout for this schema version.
    fn print_description(&self, version: u16) -> String;

    /// One line per (record, counter).
    fn print_record(
        &self,
        record: &ModuleRecord,
        path: &str,
        mount: &str,
        fs_type: &str,
    ) -> Vec<String>;

    /// Pairwise fold of `src` into `dst`. `first == true` initializes `dst`
    /// (clones `src`); otherwise every counter is summed element-wise. This
    /// is what makes `fold(r); fold(r)` double every aggregate.
    fn aggregate_into(&self, src: &ModuleRecord, dst: &mut Option<ModuleRecord>, first: bool) {
        if first || dst.is_none() {
            *dst = Some(src.clone());
            return;
        }
        let d = dst.as_mut().unwrap();
        for (a, b) in d.int_counters.iter_mut().zip(src.int_counters.iter()) {
            *a += b;
        }
        for (a, b) in d.float_counters.iter_mut().zip(src.float_counters.iter()) {
            *a += b;
        }
    }

    /// Float-counter indices for (meta, read, write) time, used by the
    /// engine's `io_total_time` and `cumul_io_total_time` bookkeeping.
    fn time_indices(&self) -> (usize, usize, usize);

    /// Float-counter index holding the authoritative slowest-rank time
    /// carried by a `rank == -1` (Shared) record.
    fn slowest_rank_time_index(&self) -> usize;

    /// `(bytes_read, bytes_written)` for `fold_perf`.
    fn bytes_rw(&self, record: &ModuleRecord) -> (u64, u64);

    /// `(read_call_total, write_call_total)` used by `finalize_files` to
    /// classify a file as read-only / write-only / read-write.
    fn read_write_calls(&self, record: &ModuleRecord) -> (u64, u64);

    /// Names for `int_counters`/`float_counters`, in order. Used to label
    /// the `--total` block without the caller needing to know the
    /// module's internal schema.
    fn counter_names(&self) -> (&'static [&'static str], &'static [&'static str]);
}

fn decode_base_and_counters(
    cur: &mut Cursor<&[u8]>,
    nprocs: u32,
    module: ModuleId,
    version: u16,
    n_int: usize,
    n_float: usize,
) -> Result<Option<ModuleRecord>> {
    if (cur.position() as usize) >= cur.get_ref().len() {
        return Ok(None);
    }
    let map_decode_err = |reason: String| DarshanError::DecodeError {
        module,
        version,
        reason,
    };

    let record_id = cur
        .read_u64::<LittleEndian>()
        .map_err(|e| map_decode_err(format!("record id: {e}")))?;
    let raw_rank = cur
        .read_i32::<LittleEndian>()
        .map_err(|e| map_decode_err(format!("rank: {e}")))?;
    let rank = match Rank::from_wire(raw_rank, nprocs) {
        Ok(rank) => rank,
        Err(err) => {
            // The rank is bad, but the counter bytes still occupy the
            // stream; consume them so the next record stays aligned
            // before handing the error up to be reported and skipped.
            let skip = (n_int * 8 + n_float * 8) as i64;
            cur.seek_relative(skip)
                .map_err(|e| map_decode_err(format!("skipping malformed record: {e}")))?;
            return Err(err);
        }
    };

    let mut int_counters = Vec::with_capacity(n_int);
    for _ in 0..n_int {
        int_counters.push(
            cur.read_i64::<LittleEndian>()
                .map_err(|e| map_decode_err(format!("int counter: {e}")))?,
        );
    }
    let mut float_counters = Vec::with_capacity(n_float);
    for _ in 0..n_float {
        float_counters.push(
            cur.read_f64::<LittleEndian>()
                .map_err(|e| map_decode_err(format!("float counter: {e}")))?,
        );
    }

    Ok(Some(ModuleRecord {
        base: BaseRecord { record_id, rank },
        int_counters,
        float_counters,
    }))
}

fn print_record_lines(
    module: ModuleId,
    record: &ModuleRecord,
    int_names: &[&str],
    float_names: &[&str],
    path: &str,
    mount: &str,
    fs_type: &str,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(int_names.len() + float_names.len());
    for (name, value) in int_names.iter().zip(record.int_counters.iter()) {
        lines.push(format!(
            "{module} {rank} {id} {name} {value} {path} {mount} {fs_type}",
            rank = record.base.rank,
            id = record.base.record_id,
        ));
    }
    for (name, value) in float_names.iter().zip(record.float_counters.iter()) {
        lines.push(format!(
            "{module} {rank} {id} {name} {value} {path} {mount} {fs_type}",
            rank = record.base.rank,
            id = record.base.record_id,
        ));
    }
    lines
}

const POSIX_INT_NAMES: &[&str] = &[
    "POSIX_OPENS",
    "POSIX_READS",
    "POSIX_WRITES",
    "POSIX_SEEKS",
    "POSIX_STATS",
    "POSIX_BYTES_READ",
    "POSIX_BYTES_WRITTEN",
    "POSIX_MAX_BYTE_READ",
    "POSIX_MAX_BYTE_WRITTEN",
];
const POSIX_FLOAT_NAMES: &[&str] = &[
    "POSIX_F_META_TIME",
    "POSIX_F_READ_TIME",
    "POSIX_F_WRITE_TIME",
    "POSIX_F_SLOWEST_RANK_TIME",
];

pub struct PosixDecoder;
impl ModuleDecoder for PosixDecoder {
    fn module_id(&self) -> ModuleId {
        ModuleId::Posix
    }
    fn decode_one(&self, cur: &mut Cursor<&[u8]>, nprocs: u32) -> Result<Option<ModuleRecord>> {
        decode_base_and_counters(
            cur,
            nprocs,
            ModuleId::Posix,
            1,
            POSIX_INT_NAMES.len(),
            POSIX_FLOAT_NAMES.len(),
        )
    }
    fn print_description(&self, version: u16) -> String {
        format!(
            "# POSIX module schema version {version}: ints=[{}] floats=[{}]",
            POSIX_INT_NAMES.join(","),
            POSIX_FLOAT_NAMES.join(",")
        )
    }
    fn print_record(
        &self,
        record: &ModuleRecord,
        path: &str,
        mount: &str,
        fs_type: &str,
    ) -> Vec<String> {
        print_record_lines(
            ModuleId::Posix,
            record,
            POSIX_INT_NAMES,
            POSIX_FLOAT_NAMES,
            path,
            mount,
            fs_type,
        )
    }
    fn time_indices(&self) -> (usize, usize, usize) {
        (0, 1, 2)
    }
    fn slowest_rank_time_index(&self) -> usize {
        3
    }
    fn bytes_rw(&self, record: &ModuleRecord) -> (u64, u64) {
        (
            record.int_counters[5].max(0) as u64,
            record.int_counters[6].max(0) as u64,
        )
    }
    fn read_write_calls(&self, record: &ModuleRecord) -> (u64, u64) {
        (
            record.int_counters[1].max(0) as u64,
            record.int_counters[2].max(0) as u64,
        )
    }
    fn counter_names(&self) -> (&'static [&'static str], &'static [&'static str]) {
        (POSIX_INT_NAMES, POSIX_FLOAT_NAMES)
    }
}

const MPIIO_INT_NAMES: &[&str] = &[
    "MPIIO_INDEP_READS",
    "MPIIO_INDEP_WRITES",
    "MPIIO_COLL_READS",
    "MPIIO_COLL_WRITES",
    "MPIIO_SPLIT_READS",
    "MPIIO_SPLIT_WRITES",
    "MPIIO_NB_READS",
    "MPIIO_NB_WRITES",
    "MPIIO_BYTES_READ",
    "MPIIO_BYTES_WRITTEN",
];
const MPIIO_FLOAT_NAMES: &[&str] = &[
    "MPIIO_F_META_TIME",
    "MPIIO_F_READ_TIME",
    "MPIIO_F_WRITE_TIME",
    "MPIIO_F_SLOWEST_RANK_TIME",
];

pub struct MpiIoDecoder;
impl ModuleDecoder for MpiIoDecoder {
    fn module_id(&self) -> ModuleId {
        ModuleId::MpiIo
    }
    fn decode_one(&self, cur: &mut Cursor<&[u8]>, nprocs: u32) -> Result<Option<ModuleRecord>> {
        decode_base_and_counters(
            cur,
            nprocs,
            ModuleId::MpiIo,
            1,
            MPIIO_INT_NAMES.len(),
            MPIIO_FLOAT_NAMES.len(),
        )
    }
    fn print_description(&self, version: u16) -> String {
        format!(
            "# MPI-IO module schema version {version}: ints=[{}] floats=[{}]",
            MPIIO_INT_NAMES.join(","),
            MPIIO_FLOAT_NAMES.join(",")
        )
    }
    fn print_record(
        &self,
        record: &ModuleRecord,
        path: &str,
        mount: &str,
        fs_type: &str,
    ) -> Vec<String> {
        print_record_lines(
            ModuleId::MpiIo,
            record,
            MPIIO_INT_NAMES,
            MPIIO_FLOAT_NAMES,
            path,
            mount,
            fs_type,
        )
    }
    fn time_indices(&self) -> (usize, usize, usize) {
        (0, 1, 2)
    }
    fn slowest_rank_time_index(&self) -> usize {
        3
    }
    fn bytes_rw(&self, record: &ModuleRecord) -> (u64, u64) {
        (
            record.int_counters[8].max(0) as u64,
            record.int_counters[9].max(0) as u64,
        )
    }
    fn read_write_calls(&self, record: &ModuleRecord) -> (u64, u64) {
        // Sum of independent, collective, split, and non-blocking variants
        // in each direction.
        let reads = record.int_counters[0] + record.int_counters[2] + record.int_counters[4]
            + record.int_counters[6];
        let writes = record.int_counters[1] + record.int_counters[3] + record.int_counters[5]
            + record.int_counters[7];
        (reads.max(0) as u64, writes.max(0) as u64)
    }
    fn counter_names(&self) -> (&'static [&'static str], &'static [&'static str]) {
        (MPIIO_INT_NAMES, MPIIO_FLOAT_NAMES)
    }
}

const STDIO_INT_NAMES: &[&str] = &[
    "STDIO_OPENS",
    "STDIO_READS",
    "STDIO_WRITES",
    "STDIO_BYTES_READ",
    "STDIO_BYTES_WRITTEN",
];
const STDIO_FLOAT_NAMES: &[&str] = &[
    "STDIO_F_META_TIME",
    "STDIO_F_READ_TIME",
    "STDIO_F_WRITE_TIME",
    "STDIO_F_SLOWEST_RANK_TIME",
];

pub struct StdioDecoder;
impl ModuleDecoder for StdioDecoder {
    fn module_id(&self) -> ModuleId {
        ModuleId::Stdio
    }
    fn decode_one(&self, cur: &mut Cursor<&[u8]>, nprocs: u32) -> Result<Option<ModuleRecord>> {
        decode_base_and_counters(
            cur,
            nprocs,
            ModuleId::Stdio,
            1,
            STDIO_INT_NAMES.len(),
            STDIO_FLOAT_NAMES.len(),
        )
    }
    fn print_description(&self, version: u16) -> String {
        format!(
            "# STDIO module schema version {version}: ints=[{}] floats=[{}]",
            STDIO_INT_NAMES.join(","),
            STDIO_FLOAT_NAMES.join(",")
        )
    }
    fn print_record(
        &self,
        record: &ModuleRecord,
        path: &str,
        mount: &str,
        fs_type: &str,
    ) -> Vec<String> {
        print_record_lines(
            ModuleId::Stdio,
            record,
            STDIO_INT_NAMES,
            STDIO_FLOAT_NAMES,
            path,
            mount,
            fs_type,
        )
    }
    fn time_indices(&self) -> (usize, usize, usize) {
        (0, 1, 2)
    }
    fn slowest_rank_time_index(&self) -> usize {
        3
    }
    fn bytes_rw(&self, record: &ModuleRecord) -> (u64, u64) {
        (
            record.int_counters[3].max(0) as u64,
            record.int_counters[4].max(0) as u64,
        )
    }
    fn read_write_calls(&self, record: &ModuleRecord) -> (u64, u64) {
        (
            record.int_counters[1].max(0) as u64,
            record.int_counters[2].max(0) as u64,
        )
    }
    fn counter_names(&self) -> (&'static [&'static str], &'static [&'static str]) {
        (STDIO_INT_NAMES, STDIO_FLOAT_NAMES)
    }
}

const BGQ_INT_NAMES: &[&str] = &["BGQ_OPS", "BGQ_BYTES"];
const BGQ_FLOAT_NAMES: &[&str] = &["BGQ_F_TIME"];

/// BG/Q is a known module id, but only POSIX/MPI-IO/STDIO feed the
/// Aggregation Engine; BG/Q is pretty-printed only.
pub struct BgQDecoder;
impl ModuleDecoder for BgQDecoder {
    fn module_id(&self) -> ModuleId {
        ModuleId::BgQ
    }
    fn decode_one(&self, cur: &mut Cursor<&[u8]>, nprocs: u32) -> Result<Option<ModuleRecord>> {
        decode_base_and_counters(
            cur,
            nprocs,
            ModuleId::BgQ,
            1,
            BGQ_INT_NAMES.len(),
            BGQ_FLOAT_NAMES.len(),
        )
    }
    fn print_description(&self, version: u16) -> String {
        format!(
            "# BG/Q module schema version {version}: ints=[{}] floats=[{}]",
            BGQ_INT_NAMES.join(","),
            BGQ_FLOAT_NAMES.join(",")
        )
    }
    fn print_record(
        &self,
        record: &ModuleRecord,
        path: &str,
        mount: &str,
        fs_type: &str,
    ) -> Vec<String> {
        print_record_lines(
            ModuleId::BgQ,
            record,
            BGQ_INT_NAMES,
            BGQ_FLOAT_NAMES,
            path,
            mount,
            fs_type,
        )
    }
    fn time_indices(&self) -> (usize, usize, usize) {
        (0, 0, 0)
    }
    fn slowest_rank_time_index(&self) -> usize {
        0
    }
    fn bytes_rw(&self, record: &ModuleRecord) -> (u64, u64) {
        (record.int_counters[1].max(0) as u64, 0)
    }
    fn read_write_calls(&self, record: &ModuleRecord) -> (u64, u64) {
        (record.int_counters[0].max(0) as u64, 0)
    }
    fn counter_names(&self) -> (&'static [&'static str], &'static [&'static str]) {
        (BGQ_INT_NAMES, BGQ_FLOAT_NAMES)
    }
}

/// Returns the decoder for a module id, or `None` for ids that the offline
/// parser never routes through the registry (DXT-POSIX/DXT-MPIIO, which
/// have a separate viewer, and `Unknown` ids, whose region bytes the Log
/// Reader already skipped).
pub fn decoder_for(id: ModuleId) -> Option<Box<dyn ModuleDecoder>> {
    match id {
        ModuleId::Posix => Some(Box::new(PosixDecoder)),
        ModuleId::MpiIo => Some(Box::new(MpiIoDecoder)),
        ModuleId::Stdio => Some(Box::new(StdioDecoder)),
        ModuleId::BgQ => Some(Box::new(BgQDecoder)),
        ModuleId::DxtPosix | ModuleId::DxtMpiIo | ModuleId::Unknown(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posix_record(rank: i32, reads: i64, bytes_read: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u64.to_le_bytes());
        buf.extend_from_slice(&rank.to_le_bytes());
        let ints: [i64; 9] = [1, reads, 0, 0, 0, bytes_read, 0, bytes_read, 0];
        for v in ints {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        let floats: [f64; 4] = [0.1, 0.4, 0.0, 0.0];
        for v in floats {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    #[test]
    fn decodes_one_posix_record_then_end_of_stream() {
        let bytes = posix_record(0, 4, 1024);
        let mut cur = Cursor::new(bytes.as_slice());
        let decoder = PosixDecoder;
        let record = decoder.decode_one(&mut cur, 1).unwrap().unwrap();
        assert_eq!(record.base.record_id, 7);
        assert_eq!(record.int_counters[1], 4);
        assert_eq!(decoder.bytes_rw(&record), (1024, 0));
        assert_eq!(decoder.read_write_calls(&record), (4, 0));
        assert!(decoder.decode_one(&mut cur, 1).unwrap().is_none());
    }

    #[test]
    fn aggregate_into_doubles_on_repeat_fold() {
        let bytes = posix_record(0, 4, 1024);
        let mut cur = Cursor::new(bytes.as_slice());
        let decoder = PosixDecoder;
        let record = decoder.decode_one(&mut cur, 1).unwrap().unwrap();

        let mut dst: Option<ModuleRecord> = None;
        decoder.aggregate_into(&record, &mut dst, true);
        decoder.aggregate_into(&record, &mut dst, false);
        let dst = dst.unwrap();
        assert_eq!(dst.int_counters[1], 8);
        assert_eq!(dst.float_counters[1], 0.8);
    }
}
