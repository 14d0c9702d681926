//! DXT Buffer Manager — runtime-side. Captures per-operation I/O segments
//! into per-file growing buffers under a fixed global memory budget, and
//! serializes them for the log.
//!
//! Two independent managers (POSIX, MPI-IO) share one global budget. The
//! budget is guarded by a lock. The original C source uses a recursive
//! mutex there, but nothing here ever re-enters it while already held, so a
//! plain `parking_lot::Mutex` behaves identically without the reentrancy
//! hazard a recursive mutex exists to paper over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{DxtFileRecord, FxIndexMap, RecordId, SegmentInfo};

/// 4 MiB, shared across both DXT modules.
pub const GLOBAL_BUDGET_BYTES: u64 = 4 * 1024 * 1024;

const INITIAL_SEGMENT_CAPACITY: usize = 64;

struct Budget {
    remaining: Mutex<u64>,
}

impl Budget {
    fn new(total: u64) -> Arc<Self> {
        Arc::new(Budget {
            remaining: Mutex::new(total),
        })
    }

    /// Debits up to `want` bytes, returning the amount actually granted
    /// (possibly zero). Never goes negative; never credits back (the
    /// budget is a high-water mark).
    fn debit_up_to(&self, want: u64) -> u64 {
        let mut remaining = self.remaining.lock();
        let granted = want.min(*remaining);
        *remaining -= granted;
        granted
    }
}

/// Per-file record plus the manager's bookkeeping of how many segment
/// slots it has been granted in each direction (the "geometric growth"
/// capacity, which may be less than the Vec's own capacity once growth has
/// been refused).
struct TrackedRecord {
    record: DxtFileRecord,
    write_cap: usize,
    read_cap: usize,
}

impl TrackedRecord {
    fn new(record_id: RecordId, rank: crate::types::Rank) -> Self {
        TrackedRecord {
            record: DxtFileRecord::new(record_id, rank),
            write_cap: 0,
            read_cap: 0,
        }
    }
}

enum Direction {
    Write,
    Read,
}

/// One of the two DXT managers (POSIX or MPI-IO). Construct a pair with
/// [`new_pair`] so they share a single global budget.
pub struct DxtManager {
    budget: Arc<Budget>,
    records: Mutex<FxIndexMap<RecordId, TrackedRecord>>,
    disabled: AtomicBool,
}

/// Build the POSIX and MPI-IO managers sharing one 4 MiB budget.
pub fn new_pair() -> (DxtManager, DxtManager) {
    let budget = Budget::new(GLOBAL_BUDGET_BYTES);
    (
        DxtManager::with_budget(budget.clone()),
        DxtManager::with_budget(budget),
    )
}

impl DxtManager {
    fn with_budget(budget: Arc<Budget>) -> Self {
        DxtManager {
            budget,
            records: Mutex::new(FxIndexMap::default()),
            disabled: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    fn with_fresh_budget(total: u64) -> Self {
        DxtManager::with_budget(Budget::new(total))
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn trace_write(
        &self,
        record_id: RecordId,
        rank: crate::types::Rank,
        offset: u64,
        length: u64,
        start: f64,
        end: f64,
    ) {
        self.trace(record_id, rank, Direction::Write, offset, length, start, end)
    }

    pub fn trace_read(
        &self,
        record_id: RecordId,
        rank: crate::types::Rank,
        offset: u64,
        length: u64,
        start: f64,
        end: f64,
    ) {
        self.trace(record_id, rank, Direction::Read, offset, length, start, end)
    }

    fn trace(
        &self,
        record_id: RecordId,
        rank: crate::types::Rank,
        direction: Direction,
        offset: u64,
        length: u64,
        start: f64,
        end: f64,
    ) {
        if self.is_disabled() {
            return;
        }

        let mut records = self.records.lock();
        if !records.contains_key(&record_id) {
            // A new file record is refused outright if the remaining
            // budget can't even cover one dxt_file_record header.
            let granted = self.budget.debit_up_to(DxtFileRecord::WIRE_SIZE as u64);
            if granted < DxtFileRecord::WIRE_SIZE as u64 {
                return;
            }
            records.insert(record_id, TrackedRecord::new(record_id, rank));
        }
        let tracked = records.get_mut(&record_id).unwrap();

        let segment = SegmentInfo {
            offset,
            length,
            start_time: start,
            end_time: end,
        };

        match direction {
            Direction::Write => {
                if !ensure_capacity(&self.budget, &mut tracked.write_cap, tracked.record.write_traces.len()) {
                    return;
                }
                tracked.record.write_traces.push(segment);
            }
            Direction::Read => {
                if !ensure_capacity(&self.budget, &mut tracked.read_cap, tracked.record.read_traces.len()) {
                    return;
                }
                tracked.record.read_traces.push(segment);
            }
        }
    }

    /// Serializes every non-empty file record into a contiguous owned
    /// buffer: `[file_record, write_segments, read_segments]` repeated per
    /// file. Frees per-record trace buffers and disables further
    /// instrumentation; not cancel-safe mid-trace.
    pub fn shutdown(&self) -> Vec<u8> {
        self.disabled.store(true, Ordering::Release);
        let mut records = self.records.lock();
        let mut out = Vec::new();
        for (_, tracked) in records.drain(..) {
            if tracked.record.is_empty() {
                continue;
            }
            serialize_file_record(&tracked.record, &mut out);
        }
        out
    }
}

/// Doubles a direction's granted capacity (64 -> 128 -> ...), clamped by
/// the remaining global budget. Returns whether there is now room for one
/// more segment; if the budget grants nothing, the increment is zero and
/// the append is silently dropped.
fn ensure_capacity(budget: &Budget, cap: &mut usize, len: usize) -> bool {
    if len < *cap {
        return true;
    }
    let target = if *cap == 0 {
        INITIAL_SEGMENT_CAPACITY
    } else {
        *cap * 2
    };
    let want_segments = target - *cap;
    let want_bytes = (want_segments * SegmentInfo::WIRE_SIZE) as u64;
    let granted_bytes = budget.debit_up_to(want_bytes);
    let granted_segments = (granted_bytes as usize) / SegmentInfo::WIRE_SIZE;
    *cap += granted_segments;
    len < *cap
}

fn serialize_file_record(record: &DxtFileRecord, out: &mut Vec<u8>) {
    out.extend_from_slice(&record.base.record_id.to_le_bytes());
    let raw_rank: i32 = match record.base.rank {
        crate::types::Rank::PerRank(r) => r as i32,
        crate::types::Rank::Shared => -1,
    };
    out.extend_from_slice(&raw_rank.to_le_bytes());
    out.extend_from_slice(&(record.write_traces.len() as u64).to_le_bytes());
    out.extend_from_slice(&(record.read_traces.len() as u64).to_le_bytes());
    // Pad the fixed header out to DxtFileRecord::WIRE_SIZE. The original
    // source's format comment mentions an `ost_ids` field living here, but
    // the code itself never wrote one -- mirror the code, not the comment.
    let header_so_far = 8 + 4 + 8 + 8;
    out.resize(out.len() + (DxtFileRecord::WIRE_SIZE - header_so_far), 0);

    for seg in &record.write_traces {
        serialize_segment(seg, out);
    }
    for seg in &record.read_traces {
        serialize_segment(seg, out);
    }
}

fn serialize_segment(seg: &SegmentInfo, out: &mut Vec<u8>) {
    out.extend_from_slice(&seg.offset.to_le_bytes());
    out.extend_from_slice(&seg.length.to_le_bytes());
    out.extend_from_slice(&seg.start_time.to_le_bytes());
    out.extend_from_slice(&seg.end_time.to_le_bytes());
}
