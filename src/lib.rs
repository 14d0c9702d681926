use std::io::Cursor;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::aggregate::Engine;
use crate::error::{DarshanError, Result};
use crate::names::NameResolver;
use crate::registry::decoder_for;
use crate::types::{FileTypeFlags, ModuleId};

pub mod aggregate;
pub mod dxt;
pub mod error;
pub mod job;
pub mod names;
pub mod reader;
pub mod registry;
pub mod types;

use job::JobInfo;
use reader::LogReader;

/// Which report blocks to emit, built from the CLI flags. `--base` is the
/// default when no block flag is given; `--all` turns every block on plus
/// `show_incomplete`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseConfig {
    pub base: bool,
    pub total: bool,
    pub file: bool,
    pub perf: bool,
    pub show_incomplete: bool,
}

/// Opens the log at `path`, drives it through every component, and returns
/// the report as a sequence of lines (stdout's contents, one entry per
/// line). The CLI joins these with newlines and writes them to stdout;
/// tests assert on them directly.
pub fn parse_log<P: AsRef<Path>>(path: P, config: &ParseConfig) -> Result<Vec<String>> {
    let reader = LogReader::open(path)?;
    let job = JobInfo::parse(reader.job_region())?;
    let resolver = NameResolver::new(reader.name_region(), job.mounts.clone())?;
    let nprocs = job.nprocs;

    let mut lines = Vec::new();
    push_job_header(&mut lines, &reader, &job);
    push_region_sizes(&mut lines, &reader);
    push_mount_table(&mut lines, &resolver);

    let total_decompressed_bytes: u64 = reader.modules().iter().map(|m| m.bytes().len() as u64).sum();
    let pb = ProgressBar::new(total_decompressed_bytes);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    let mut bytes_consumed = 0u64;

    let mut engine = Engine::new(nprocs);
    let mut total_records_decoded: u64 = 0;

    for module in reader.modules() {
        match module.id {
            ModuleId::DxtPosix | ModuleId::DxtMpiIo => {
                eprintln!("note: {} module skipped (has its own trace viewer)", module.id);
                continue;
            }
            ModuleId::Unknown(_) => continue,
            _ => {}
        }

        if module.partial {
            if !config.show_incomplete {
                return Err(DarshanError::PartialModuleData(module.id));
            }
            eprintln!(
                "warning: module {} has partial data (truncated by the runtime); skipping",
                module.id
            );
            continue;
        }

        let Some(decoder) = decoder_for(module.id) else {
            continue;
        };
        let aggregates = module.id.aggregates();
        if aggregates {
            engine.reset(nprocs);
        }

        if config.base {
            lines.push(decoder.print_description(module.schema_version));
        }

        let mut cur = Cursor::new(module.bytes());
        loop {
            let position_before = cur.position();
            match decoder.decode_one(&mut cur, nprocs) {
                Ok(Some(record)) => {
                    total_records_decoded += 1;
                    bytes_consumed += cur.position() - position_before;
                    pb.set_position(bytes_consumed);

                    if config.base {
                        let path = resolver.path_for(record.base.record_id, module.id);
                        let (mount, fs_type) = resolver.mount_for(&path);
                        for line in decoder.print_record(&record, &path, mount, fs_type) {
                            lines.push(line);
                        }
                    }
                    if aggregates {
                        engine.fold(decoder.as_ref(), &record, nprocs);
                        engine.fold_perf(decoder.as_ref(), &record)?;
                    }
                }
                Ok(None) => break,
                Err(DarshanError::MalformedRank { rank, nprocs: np }) => {
                    eprintln!(
                        "warning: malformed rank {rank} (nprocs = {np}) in module {}; record skipped",
                        module.id
                    );
                    continue;
                }
                Err(err) => {
                    eprintln!(
                        "warning: {} module aggregation aborted: {err}",
                        module.id
                    );
                    break;
                }
            }
        }

        if aggregates {
            if config.total {
                push_totals_block(&mut lines, decoder.as_ref(), engine.totals());
            }
            if config.file {
                push_file_tally_block(&mut lines, module.id, &engine.finalize_files(decoder.as_ref()));
            }
            if config.perf {
                push_perf_block(&mut lines, module.id, &engine, &resolver, nprocs);
            }
        }
    }

    pb.finish_and_clear();

    if total_records_decoded == 0 {
        lines.push("# no module data available.".to_string());
    }

    Ok(lines)
}

fn push_job_header(lines: &mut Vec<String>, reader: &LogReader, job: &JobInfo) {
    lines.push(format!("# darshan log version: {}", reader.version));
    lines.push(format!("# compression method: {}", reader.compression));
    lines.push(format!("# exe: {}", job.exe));
    lines.push(format!("# uid: {}", job.uid));
    lines.push(format!("# jobid: {}", job.jobid));
    lines.push(format!(
        "# start_time: {} {}",
        job.start_time,
        format_ctime(job.start_time)
    ));
    lines.push(format!(
        "# end_time: {} {}",
        job.end_time,
        format_ctime(job.end_time)
    ));
    lines.push(format!("# nprocs: {}", job.nprocs));
    lines.push(format!("# run time: {}", job.run_time_seconds()));
    for (key, value) in &job.metadata {
        lines.push(format!("# metadata: {key} = {value}"));
    }
}

fn push_region_sizes(lines: &mut Vec<String>, reader: &LogReader) {
    lines.push(format!("# header bytes: {}", reader.header_bytes));
    lines.push(format!("# job bytes: {}", reader.job_bytes));
    lines.push(format!("# record table bytes: {}", reader.record_table_bytes));
    for module in reader.modules() {
        lines.push(format!(
            "# {} module bytes: {} version: {}",
            module.id, module.compressed_len, module.schema_version
        ));
    }
}

fn push_mount_table(lines: &mut Vec<String>, resolver: &NameResolver) {
    for mount in resolver.mounts() {
        lines.push(format!(
            "# mount entry:\t{}\t{}",
            mount.mount_path, mount.fs_type
        ));
    }
}

fn push_totals_block(
    lines: &mut Vec<String>,
    decoder: &dyn registry::ModuleDecoder,
    totals: &aggregate::FileAccumulator,
) {
    let (int_names, float_names) = decoder.counter_names();
    let zero_ints = vec![0i64; int_names.len()];
    let zero_floats = vec![0f64; float_names.len()];
    let (ints, floats) = match &totals.rec_dat {
        Some(rec) => (&rec.int_counters, &rec.float_counters),
        None => (&zero_ints, &zero_floats),
    };
    for (name, value) in int_names.iter().zip(ints.iter()) {
        lines.push(format!("total_{name}: {value}"));
    }
    for (name, value) in float_names.iter().zip(floats.iter()) {
        lines.push(format!("total_{name}: {value}"));
    }
}

fn push_file_tally_block(lines: &mut Vec<String>, module: ModuleId, tally: &aggregate::FileTally) {
    lines.push(format!("# file tally ({module}):"));
    for (name, bucket) in [
        ("total", tally.total),
        ("read_only", tally.read_only),
        ("write_only", tally.write_only),
        ("read_write", tally.read_write),
        ("unique", tally.unique),
        ("shared", tally.shared),
    ] {
        lines.push(format!(
            "{name}: {} {} {}",
            bucket.count, bucket.bytes, bucket.max_bytes
        ));
    }
}

fn push_perf_block(
    lines: &mut Vec<String>,
    module: ModuleId,
    engine: &Engine,
    resolver: &NameResolver,
    nprocs: u32,
) {
    let perf = engine.finalize_perf(nprocs);
    lines.push(format!("# perf ({module}):"));
    lines.push(format!("total_bytes: {}", perf.total_bytes));
    for (record_id, file) in engine.files() {
        let path = resolver.path_for(*record_id, module);
        if file.file_type.contains(FileTypeFlags::UNIQUE) {
            lines.push(format!(
                "unique_file_slowest_rank_time: {path} {:.6}",
                file.slowest_io_total_time
            ));
        } else if file.file_type.contains(FileTypeFlags::SHARED)
            || file.file_type.contains(FileTypeFlags::PARTSHARED)
        {
            lines.push(format!(
                "shared_file_time_by_slowest: {path} {:.6}",
                file.slowest_io_total_time
            ));
        }
    }
    lines.push(format!("slowest_rank: {}", perf.slowest_rank_index));
    lines.push(format!(
        "slowest_rank_io_total_time: {:.6}",
        perf.slowest_rank_io_total_time
    ));
    lines.push(format!(
        "shared_io_total_time_by_slowest: {:.6}",
        perf.shared_io_total_time_by_slowest
    ));
    lines.push(format!("agg_time_by_slowest: {:.6}", perf.agg_time_by_slowest));
    lines.push(format!(
        "agg_perf_by_slowest: {:.6}",
        perf.agg_perf_by_slowest
    ));
}

/// `epoch 1970-01-01 00:00:00 UTC`-style rendering of a Unix timestamp,
/// standing in for the runtime's local `ctime()` call (we have no timezone
/// database entry to match against, so UTC is used throughout).
fn format_ctime(epoch_seconds: i64) -> String {
    match chrono::DateTime::from_timestamp(epoch_seconds, 0) {
        Some(dt) => dt.format("%a %b %e %H:%M:%S %Y").to_string(),
        None => "(invalid timestamp)".to_string(),
    }
}
