//! Parses the job region into the summary block printed at the top of
//! every report, plus the mount table consumed by the Name Resolver.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{DarshanError, Result};
use crate::types::MountEntry;

#[derive(Debug, Clone)]
pub struct JobInfo {
    pub exe: String,
    pub uid: u64,
    pub jobid: u64,
    pub start_time: i64,
    pub end_time: i64,
    pub nprocs: u32,
    pub metadata: Vec<(String, String)>,
    pub mounts: Vec<MountEntry>,
}

impl JobInfo {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);
        let exe = read_string(&mut cur)?;
        let uid = read_u64(&mut cur)?;
        let jobid = read_u64(&mut cur)?;
        let start_time = read_i64(&mut cur)?;
        let end_time = read_i64(&mut cur)?;
        let nprocs = read_u32(&mut cur)?;

        let metadata_count = read_u32(&mut cur)?;
        let mut metadata = Vec::with_capacity(metadata_count as usize);
        for _ in 0..metadata_count {
            let key = read_string(&mut cur)?;
            let value = read_string(&mut cur)?;
            metadata.push((key, value));
        }

        let mount_count = read_u32(&mut cur)?;
        let mut mounts = Vec::with_capacity(mount_count as usize);
        for _ in 0..mount_count {
            let mount_path = read_string(&mut cur)?;
            let fs_type = read_string(&mut cur)?;
            mounts.push(MountEntry {
                mount_path,
                fs_type,
            });
        }

        Ok(JobInfo {
            exe,
            uid,
            jobid,
            start_time,
            end_time,
            nprocs,
            metadata,
            mounts,
        })
    }

    pub fn run_time_seconds(&self) -> i64 {
        self.end_time - self.start_time
    }
}

fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let len = read_u32(r)? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)
        .map_err(|_| DarshanError::FormatError("truncated job region".into()))?;
    String::from_utf8(bytes).map_err(|_| DarshanError::FormatError("job region not utf8".into()))
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    r.read_u32::<LittleEndian>()
        .map_err(|_| DarshanError::FormatError("truncated job region".into()))
}
fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    r.read_u64::<LittleEndian>()
        .map_err(|_| DarshanError::FormatError("truncated job region".into()))
}
fn read_i64<R: Read>(r: &mut R) -> Result<i64> {
    r.read_i64::<LittleEndian>()
        .map_err(|_| DarshanError::FormatError("truncated job region".into()))
}
