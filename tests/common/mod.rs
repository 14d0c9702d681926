//! Byte-exact Darshan log builder used by the integration tests. There are
//! no checked-in fixture logs in this pack (no real Darshan binary to
//! produce one), so tests assemble logs from values using this builder
//! instead, following `src/reader.rs`'s concrete layout.

use std::io::Write;

pub const COMPRESSION_NONE: u8 = 0;

pub struct ModuleSpec {
    pub id: u16,
    pub schema_version: u16,
    pub partial: bool,
    pub records: Vec<u8>,
}

pub struct LogBuilder {
    version: &'static str,
    exe: String,
    uid: u64,
    jobid: u64,
    start_time: i64,
    end_time: i64,
    nprocs: u32,
    metadata: Vec<(String, String)>,
    mounts: Vec<(String, String)>,
    names: Vec<(u64, String)>,
    modules: Vec<ModuleSpec>,
}

impl LogBuilder {
    pub fn new(nprocs: u32) -> Self {
        LogBuilder {
            version: "3.41",
            exe: "/home/user/app".to_string(),
            uid: 1000,
            jobid: 42,
            start_time: 1_700_000_000,
            end_time: 1_700_000_100,
            nprocs,
            metadata: Vec::new(),
            mounts: Vec::new(),
            names: Vec::new(),
            modules: Vec::new(),
        }
    }

    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.push((key.to_string(), value.to_string()));
        self
    }

    pub fn mount(mut self, path: &str, fs_type: &str) -> Self {
        self.mounts.push((path.to_string(), fs_type.to_string()));
        self
    }

    pub fn name(mut self, record_id: u64, path: &str) -> Self {
        self.names.push((record_id, path.to_string()));
        self
    }

    pub fn module(mut self, spec: ModuleSpec) -> Self {
        self.modules.push(spec);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let job_region = encode_job_region(&self);
        let name_region = encode_name_region(&self.names);

        let mut out = Vec::new();
        out.extend_from_slice(b"darshan3");
        write_u32(&mut out, self.version.len() as u32);
        out.extend_from_slice(self.version.as_bytes());
        out.push(COMPRESSION_NONE);

        // Placeholder offset/len fields, patched after the header and the
        // module table (whose own size the offsets depend on) are known.
        let job_len_pos = out.len();
        write_u64(&mut out, 0);
        write_u64(&mut out, job_region.len() as u64);
        let name_len_pos = out.len();
        write_u64(&mut out, 0);
        write_u64(&mut out, name_region.len() as u64);

        write_u32(&mut out, self.modules.len() as u32);
        let mut module_offset_positions = Vec::new();
        for m in &self.modules {
            write_u16(&mut out, m.id);
            write_u16(&mut out, m.schema_version);
            out.push(m.partial as u8);
            module_offset_positions.push(out.len());
            write_u64(&mut out, 0);
            write_u64(&mut out, m.records.len() as u64);
        }

        let header_len = out.len();
        let job_offset = header_len as u64;
        let name_offset = job_offset + job_region.len() as u64;
        let mut module_offset = name_offset + name_region.len() as u64;

        patch_u64(&mut out, job_len_pos, job_offset);
        patch_u64(&mut out, name_len_pos, name_offset);
        for (i, m) in self.modules.iter().enumerate() {
            patch_u64(&mut out, module_offset_positions[i], module_offset);
            module_offset += m.records.len() as u64;
        }

        out.extend_from_slice(&job_region);
        out.extend_from_slice(&name_region);
        for m in &self.modules {
            out.extend_from_slice(&m.records);
        }
        out
    }
}

fn encode_job_region(b: &LogBuilder) -> Vec<u8> {
    let mut out = Vec::new();
    write_string(&mut out, &b.exe);
    write_u64(&mut out, b.uid);
    write_u64(&mut out, b.jobid);
    write_i64(&mut out, b.start_time);
    write_i64(&mut out, b.end_time);
    write_u32(&mut out, b.nprocs);

    write_u32(&mut out, b.metadata.len() as u32);
    for (k, v) in &b.metadata {
        write_string(&mut out, k);
        write_string(&mut out, v);
    }

    write_u32(&mut out, b.mounts.len() as u32);
    for (path, fs_type) in &b.mounts {
        write_string(&mut out, path);
        write_string(&mut out, fs_type);
    }
    out
}

fn encode_name_region(names: &[(u64, String)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (record_id, path) in names {
        write_u64(&mut out, *record_id);
        write_string(&mut out, path);
    }
    out
}

/// Encodes one POSIX/MPI-IO/STDIO-shaped record: `record_id, rank,
/// int_counters..., float_counters...` (matches
/// `registry::decode_base_and_counters`).
pub fn encode_record(record_id: u64, rank: i32, ints: &[i64], floats: &[f64]) -> Vec<u8> {
    let mut out = Vec::new();
    write_u64(&mut out, record_id);
    out.extend_from_slice(&rank.to_le_bytes());
    for v in ints {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for v in floats {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn write_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn patch_u64(out: &mut [u8], pos: usize, value: u64) {
    let mut cur = &mut out[pos..pos + 8];
    cur.write_all(&value.to_le_bytes()).unwrap();
}
