//! Aggregation Engine — the core of the offline parser. Consumes a stream
//! of per-module records, indexes them by record id, maintains per-file
//! accumulators, a job-wide "grand total" accumulator, and per-rank timing
//! vectors, then finalizes file-type tallies and derived performance
//! metrics.

use crate::error::Result;
use crate::registry::ModuleDecoder;
use crate::types::{FileTypeFlags, ModuleRecord, Rank, RecordId};

const MIB: f64 = 1024.0 * 1024.0;

/// Per-file (or, reused, job-wide totals) accumulator. Same shape for both
/// roles.
#[derive(Debug, Clone, Default)]
pub struct FileAccumulator {
    pub file_type: FileTypeFlags,
    pub procs: u32,
    pub cumul_io_total_time: f64,
    pub slowest_io_total_time: f64,
    pub rec_dat: Option<ModuleRecord>,
}

/// Accumulates bytes and per-rank timing vectors across a module's records;
/// finalized into slowest-rank/bandwidth metrics at module end.
#[derive(Debug, Clone, Default)]
pub struct PerfAccumulator {
    pub total_bytes: u64,
    pub shared_io_total_time_by_slowest: f64,
    pub rank_cumul_io_total_time: Vec<f64>,
    pub rank_cumul_rw_only_time: Vec<f64>,
    pub rank_cumul_md_only_time: Vec<f64>,
}

/// One bucket of the `--file` tally.
#[derive(Debug, Clone, Copy, Default)]
pub struct TallyBucket {
    pub count: u64,
    pub bytes: u64,
    pub max_bytes: u64,
}

impl TallyBucket {
    fn add(&mut self, bytes: u64) {
        self.count += 1;
        self.bytes += bytes;
        self.max_bytes = self.max_bytes.max(bytes);
    }
}

/// Output of `finalize_files`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTally {
    pub total: TallyBucket,
    pub read_only: TallyBucket,
    pub write_only: TallyBucket,
    pub read_write: TallyBucket,
    pub unique: TallyBucket,
    pub shared: TallyBucket,
}

/// Output of `finalize_perf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfResult {
    pub total_bytes: u64,
    pub slowest_rank_index: usize,
    pub slowest_rank_io_total_time: f64,
    pub slowest_rank_md_only_time: f64,
    pub slowest_rank_rw_only_time: f64,
    pub shared_io_total_time_by_slowest: f64,
    pub agg_time_by_slowest: f64,
    pub agg_perf_by_slowest: f64,
}

/// The engine's mutable state for the module currently being processed. One
/// `Engine` is reused across modules via `reset`; nothing here is shared
/// across modules except by explicit `reset`.
pub struct Engine {
    files: crate::types::FxIndexMap<RecordId, FileAccumulator>,
    totals: FileAccumulator,
    perf: PerfAccumulator,
}

impl Engine {
    pub fn new(nprocs: u32) -> Self {
        let mut e = Engine {
            files: crate::types::FxIndexMap::default(),
            totals: FileAccumulator::default(),
            perf: PerfAccumulator::default(),
        };
        e.reset(nprocs);
        e
    }

    pub fn files(&self) -> &crate::types::FxIndexMap<RecordId, FileAccumulator> {
        &self.files
    }

    pub fn totals(&self) -> &FileAccumulator {
        &self.totals
    }

    /// Updates the per-file accumulator `H[record.id]` and the module's
    /// totals accumulator.
    pub fn fold(&mut self, module: &dyn ModuleDecoder, record: &ModuleRecord, nprocs: u32) {
        let file = self
            .files
            .entry(record.base.record_id)
            .or_insert_with(FileAccumulator::default);
        fold_into(file, module, record, nprocs);
        fold_into(&mut self.totals, module, record, nprocs);
    }

    /// Updates the performance accumulator.
    pub fn fold_perf(&mut self, module: &dyn ModuleDecoder, record: &ModuleRecord) -> Result<()> {
        let (bytes_read, bytes_written) = module.bytes_rw(record);
        self.perf.total_bytes += bytes_read + bytes_written;

        match record.base.rank {
            Rank::Shared => {
                let idx = module.slowest_rank_time_index();
                let slowest = record.float_counters.get(idx).copied().unwrap_or(0.0);
                self.perf.shared_io_total_time_by_slowest += slowest;
            }
            Rank::PerRank(r) => {
                let (meta, read, write) = module.time_indices();
                let meta_t = record.float_counters.get(meta).copied().unwrap_or(0.0);
                let read_t = record.float_counters.get(read).copied().unwrap_or(0.0);
                let write_t = record.float_counters.get(write).copied().unwrap_or(0.0);
                let idx = r as usize;
                if idx < self.perf.rank_cumul_io_total_time.len() {
                    self.perf.rank_cumul_io_total_time[idx] += meta_t + read_t + write_t;
                    self.perf.rank_cumul_md_only_time[idx] += meta_t;
                    self.perf.rank_cumul_rw_only_time[idx] += read_t + write_t;
                }
            }
        }
        Ok(())
    }

    /// One pass over the per-file hash, deriving the six tally buckets.
    pub fn finalize_files(&self, module: &dyn ModuleDecoder) -> FileTally {
        let mut tally = FileTally::default();
        for file in self.files.values() {
            let Some(rec_dat) = &file.rec_dat else {
                continue;
            };
            let (bytes_read, bytes_written) = module.bytes_rw(rec_dat);
            let bytes = bytes_read + bytes_written;
            let (reads, writes) = module.read_write_calls(rec_dat);

            tally.total.add(bytes);
            if reads > 0 && writes == 0 {
                tally.read_only.add(bytes);
            } else if writes > 0 && reads == 0 {
                tally.write_only.add(bytes);
            } else if reads > 0 && writes > 0 {
                tally.read_write.add(bytes);
            }

            if file.file_type.contains(FileTypeFlags::UNIQUE) {
                tally.unique.add(bytes);
            } else if file.file_type.contains(FileTypeFlags::SHARED)
                || file.file_type.contains(FileTypeFlags::PARTSHARED)
            {
                tally.shared.add(bytes);
            }
        }
        tally
    }

    /// Finds the rank with maximum cumulative I/O time (ties broken by
    /// lowest index, since the comparison is strict `>`) and derives the
    /// aggregate time/bandwidth-by-slowest-rank metrics.
    ///
    /// Both the time and bandwidth guards are gated on the same condition;
    /// the original C implementation's unbraced `if` only guarded the
    /// division, which would leave `agg_perf_by_slowest` stale on a zero
    /// read. Treated here as a bug fix rather than reproduced.
    pub fn finalize_perf(&self, nprocs: u32) -> PerfResult {
        let mut slowest_rank_index = 0usize;
        let mut slowest_rank_io_total_time = 0.0;
        let mut slowest_rank_md_only_time = 0.0;
        let mut slowest_rank_rw_only_time = 0.0;

        for r in 0..nprocs as usize {
            let t = self.perf.rank_cumul_io_total_time.get(r).copied().unwrap_or(0.0);
            if t > slowest_rank_io_total_time {
                slowest_rank_io_total_time = t;
                slowest_rank_md_only_time =
                    self.perf.rank_cumul_md_only_time.get(r).copied().unwrap_or(0.0);
                slowest_rank_rw_only_time =
                    self.perf.rank_cumul_rw_only_time.get(r).copied().unwrap_or(0.0);
                slowest_rank_index = r;
            }
        }

        let agg_time_by_slowest =
            slowest_rank_io_total_time + self.perf.shared_io_total_time_by_slowest;
        let agg_perf_by_slowest = if agg_time_by_slowest > 0.0 {
            (self.perf.total_bytes as f64 / MIB) / agg_time_by_slowest
        } else {
            0.0
        };

        PerfResult {
            total_bytes: self.perf.total_bytes,
            slowest_rank_index,
            slowest_rank_io_total_time,
            slowest_rank_md_only_time,
            slowest_rank_rw_only_time,
            shared_io_total_time_by_slowest: self.perf.shared_io_total_time_by_slowest,
            agg_time_by_slowest,
            agg_perf_by_slowest,
        }
    }

    /// Zeroes totals, per-file data, and per-rank timing vectors between
    /// modules, preserving already-allocated capacity.
    pub fn reset(&mut self, nprocs: u32) {
        self.files.clear();
        self.totals = FileAccumulator::default();
        self.perf.total_bytes = 0;
        self.perf.shared_io_total_time_by_slowest = 0.0;
        self.perf.rank_cumul_io_total_time.clear();
        self.perf.rank_cumul_io_total_time.resize(nprocs as usize, 0.0);
        self.perf.rank_cumul_rw_only_time.clear();
        self.perf.rank_cumul_rw_only_time.resize(nprocs as usize, 0.0);
        self.perf.rank_cumul_md_only_time.clear();
        self.perf.rank_cumul_md_only_time.resize(nprocs as usize, 0.0);
    }
}

fn fold_into(acc: &mut FileAccumulator, module: &dyn ModuleDecoder, record: &ModuleRecord, nprocs: u32) {
    acc.procs += 1;

    let (meta, read, write) = module.time_indices();
    let io_total = record.io_total_time(meta, read, write);

    match record.base.rank {
        Rank::Shared => {
            let idx = module.slowest_rank_time_index();
            acc.slowest_io_total_time = record.float_counters.get(idx).copied().unwrap_or(0.0);
            acc.procs = nprocs;
            acc.file_type.insert(FileTypeFlags::SHARED);
        }
        Rank::PerRank(_) => {
            if acc.slowest_io_total_time < io_total {
                acc.slowest_io_total_time = io_total;
            }
            if acc.procs > 1 {
                acc.file_type.remove(FileTypeFlags::UNIQUE);
                acc.file_type.insert(FileTypeFlags::PARTSHARED);
            } else {
                acc.file_type.insert(FileTypeFlags::UNIQUE);
            }
        }
    }

    acc.cumul_io_total_time += io_total;

    let first = acc.rec_dat.is_none();
    module.aggregate_into(record, &mut acc.rec_dat, first);
}
