mod common;

use darshan_parser::{parse_log, ParseConfig};

use common::{encode_record, LogBuilder, ModuleSpec};

const POSIX: u16 = 0;
const MPIIO: u16 = 1;

fn all_blocks() -> ParseConfig {
    ParseConfig {
        base: true,
        total: true,
        file: true,
        perf: true,
        show_incomplete: true,
    }
}

fn write_log(bytes: &[u8]) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), bytes).unwrap();
    file
}

#[test]
fn s1_single_rank_posix_file() {
    let ints: [i64; 9] = [1, 4, 0, 0, 0, 1024, 0, 1024, 0];
    let floats: [f64; 4] = [0.1, 0.4, 0.0, 0.0];
    let record = encode_record(7, 0, &ints, &floats);

    let bytes = LogBuilder::new(1)
        .module(ModuleSpec {
            id: POSIX,
            schema_version: 1,
            partial: false,
            records: record,
        })
        .build();

    let log = write_log(&bytes);
    let lines = parse_log(log.path(), &all_blocks()).unwrap();

    assert!(lines.iter().any(|l| l == "read_only: 1 1024 1024"));
    assert!(lines.iter().any(|l| l == "unique: 1 1024 1024"));
    assert!(lines.iter().any(|l| l == "shared: 0 0 0"));
    assert!(lines.iter().any(|l| l == "slowest_rank: 0"));
    assert!(lines.iter().any(|l| l == "slowest_rank_io_total_time: 0.500000"));

    let expected_bw = (1024.0_f64 / (1024.0 * 1024.0)) / 0.5;
    let expected_line = format!("agg_perf_by_slowest: {expected_bw:.6}");
    assert!(lines.iter().any(|l| *l == expected_line));
}

#[test]
fn s2_shared_mpiio_file() {
    let ints: [i64; 10] = [0, 0, 0, 2, 0, 0, 0, 0, 0, 2_000_000];
    let floats: [f64; 4] = [0.0, 0.0, 0.0, 2.0];
    let record = encode_record(11, -1, &ints, &floats);

    let bytes = LogBuilder::new(2)
        .module(ModuleSpec {
            id: MPIIO,
            schema_version: 1,
            partial: false,
            records: record,
        })
        .build();

    let log = write_log(&bytes);
    let lines = parse_log(log.path(), &all_blocks()).unwrap();

    assert!(lines.iter().any(|l| l == "write_only: 1 2000000 2000000"));
    assert!(lines.iter().any(|l| l == "shared: 1 2000000 2000000"));
    assert!(lines.iter().any(|l| l == "unique: 0 0 0"));
    assert!(lines
        .iter()
        .any(|l| l == "shared_io_total_time_by_slowest: 2.000000"));
    assert!(lines.iter().any(|l| l == "agg_time_by_slowest: 2.000000"));

    let expected_bw = (2_000_000.0_f64 / (1024.0 * 1024.0)) / 2.0;
    let expected_line = format!("agg_perf_by_slowest: {expected_bw:.6}");
    assert!(lines.iter().any(|l| *l == expected_line));
}

#[test]
fn s3_partshared_posix_file() {
    let floats: [f64; 4] = [0.0, 0.01, 0.0, 0.0];
    let rank0 = encode_record(9, 0, &[1, 1, 0, 0, 0, 10, 0, 10, 0], &floats);
    let rank2 = encode_record(9, 2, &[1, 1, 0, 0, 0, 10, 0, 10, 0], &floats);
    let mut records = rank0;
    records.extend_from_slice(&rank2);

    let bytes = LogBuilder::new(4)
        .module(ModuleSpec {
            id: POSIX,
            schema_version: 1,
            partial: false,
            records,
        })
        .build();

    let log = write_log(&bytes);
    let lines = parse_log(log.path(), &all_blocks()).unwrap();

    assert!(lines.iter().any(|l| l == "shared: 1 20 20"));
    assert!(lines.iter().any(|l| l == "unique: 0 0 0"));
}

#[test]
fn s4_partial_module_is_fatal_unless_show_incomplete() {
    let bytes = LogBuilder::new(1)
        .module(ModuleSpec {
            id: POSIX,
            schema_version: 1,
            partial: true,
            records: Vec::new(),
        })
        .build();
    let log = write_log(&bytes);

    let strict = parse_log(log.path(), &ParseConfig::default());
    assert!(strict.is_err());

    let lenient = parse_log(
        log.path(),
        &ParseConfig {
            show_incomplete: true,
            ..Default::default()
        },
    );
    assert!(lenient.is_ok());
    let lines = lenient.unwrap();
    assert!(lines.iter().any(|l| l == "# no module data available."));
}

#[test]
fn empty_log_prints_sentinel() {
    let bytes = LogBuilder::new(1).build();
    let log = write_log(&bytes);
    let lines = parse_log(log.path(), &ParseConfig::default()).unwrap();
    assert!(lines.iter().any(|l| l == "# no module data available."));
}

#[test]
fn job_header_and_mount_table_are_rendered() {
    let ints: [i64; 9] = [1, 1, 0, 0, 0, 5, 0, 5, 0];
    let floats: [f64; 4] = [0.0, 0.0, 0.0, 0.0];
    let record = encode_record(3, 0, &ints, &floats);

    let bytes = LogBuilder::new(1)
        .metadata("lib_ver", "3.4.1")
        .mount("/scratch", "lustre")
        .name(3, "/scratch/out.h5")
        .module(ModuleSpec {
            id: POSIX,
            schema_version: 1,
            partial: false,
            records: record,
        })
        .build();
    let log = write_log(&bytes);
    let lines = parse_log(
        log.path(),
        &ParseConfig {
            base: true,
            ..Default::default()
        },
    )
    .unwrap();

    assert!(lines.iter().any(|l| l == "# metadata: lib_ver = 3.4.1"));
    assert!(lines.iter().any(|l| l == "# mount entry:\t/scratch\tlustre"));
    assert!(lines
        .iter()
        .any(|l| l.contains("/scratch/out.h5") && l.contains("lustre")));
}
