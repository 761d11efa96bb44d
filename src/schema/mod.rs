//! Record schemas carried inside the container.
//!
//! The container format itself only deals in length-delimited byte blobs;
//! these types are the concrete message schema the blobs serialize.  The
//! engines touch them exclusively through the [`Record`] trait, so swapping
//! in another schema generation is a matter of new impls, not engine changes.
//!
//! # Wire layout
//!
//! Fixed field order, little-endian scalars, varint-prefixed strings and
//! sequences.  Nested messages are framed with their own varint length so a
//! decoder can skip them wholesale.
//!
//! | record         | fields, in order |
//! |----------------|------------------|
//! | `JobMetadata`  | author: str, description: str, version: u64 varint |
//! | `Job`          | name: str, num_work_planes: u32, meta: msg, work_planes: seq |
//! | `WorkPlane`    | work_plane_number: u32, z_pos_in_mm: f32, num_blocks: u32, vector_blocks: seq |
//! | `VectorBlock`  | marking_params_key: u32, points: varint count + f32s |
//! | `JobLUT`       | job_shell_position: i64, workplane_positions: varint count + i64s |
//! | `WorkPlaneLUT` | workplane_shell_position: i64, vectorblock_positions: varint count + i64s |
//!
//! Offsets are signed (`i64`) to match stream positions; negative values are
//! never valid in a well-formed file and are rejected by the reader.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{OvfError, Result};
use crate::wire::{read_varint, write_varint, Record};

// ── Job ──────────────────────────────────────────────────────────────────────

/// Top-level record.  `work_planes` is populated only when the job is fully
/// materialized; a job *shell* carries everything but that sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Job {
    pub name:            String,
    pub num_work_planes: u32,
    pub meta:            JobMetadata,
    pub work_planes:     Vec<WorkPlane>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobMetadata {
    pub author:      String,
    pub description: String,
    pub version:     u64,
}

/// One layer of the job.  A *shell* workplane has `vector_blocks` empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkPlane {
    pub work_plane_number: u32,
    pub z_pos_in_mm:       f32,
    pub num_blocks:        u32,
    pub vector_blocks:     Vec<VectorBlock>,
}

/// Leaf record.  The engines treat it as an atomic blob; its fields only
/// matter to producers and consumers of the path data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorBlock {
    pub marking_params_key: u32,
    /// Interleaved x/y coordinates.
    pub points:             Vec<f32>,
}

// ── Lookup tables ────────────────────────────────────────────────────────────

/// Top-level index.  `workplane_positions[i]` is the offset of workplane i's
/// 8-byte *pointer cell*, which in turn holds the offset of that workplane's
/// [`WorkPlaneLUT`].  The indirection exists because the cell is reserved
/// before the LUT's position is known and backpatched afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobLut {
    pub job_shell_position:  i64,
    pub workplane_positions: Vec<i64>,
}

/// Per-workplane index: shell offset plus one offset per vector block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkPlaneLut {
    pub workplane_shell_position: i64,
    pub vectorblock_positions:    Vec<i64>,
}

// ── Field codecs ─────────────────────────────────────────────────────────────

fn write_string(buf: &mut Vec<u8>, s: &str) {
    // Vec<u8> never fails as a Write sink.
    let _ = write_varint(&mut *buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn read_string(input: &mut &[u8]) -> Result<String> {
    let len = read_varint(&mut *input)? as usize;
    if input.len() < len {
        return Err(OvfError::Corrupted("string field truncated".into()));
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    String::from_utf8(head.to_vec())
        .map_err(|_| OvfError::Corrupted("string field is not UTF-8".into()))
}

fn read_u32(input: &mut &[u8]) -> Result<u32> {
    input
        .read_u32::<LittleEndian>()
        .map_err(|_| OvfError::Corrupted("record field truncated".into()))
}

fn read_f32(input: &mut &[u8]) -> Result<f32> {
    input
        .read_f32::<LittleEndian>()
        .map_err(|_| OvfError::Corrupted("record field truncated".into()))
}

fn read_i64(input: &mut &[u8]) -> Result<i64> {
    input
        .read_i64::<LittleEndian>()
        .map_err(|_| OvfError::Corrupted("record field truncated".into()))
}

fn write_seq<M: Record>(buf: &mut Vec<u8>, items: &[M]) {
    let _ = write_varint(&mut *buf, items.len() as u64);
    for item in items {
        let mut payload = Vec::new();
        item.encode(&mut payload);
        let _ = write_varint(&mut *buf, payload.len() as u64);
        buf.extend_from_slice(&payload);
    }
}

fn read_seq<M: Record>(input: &mut &[u8]) -> Result<Vec<M>> {
    let count = read_varint(&mut *input)? as usize;
    // Cap the preallocation; a corrupt count must not balloon memory.
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let len = read_varint(&mut *input)? as usize;
        if input.len() < len {
            return Err(OvfError::Corrupted("nested record truncated".into()));
        }
        let (head, tail) = input.split_at(len);
        *input = tail;
        items.push(M::decode(head)?);
    }
    Ok(items)
}

fn expect_consumed(input: &[u8], record: &'static str) -> Result<()> {
    if input.is_empty() {
        Ok(())
    } else {
        Err(OvfError::Corrupted(format!(
            "{record} record has {} trailing bytes",
            input.len()
        )))
    }
}

// ── Record impls ─────────────────────────────────────────────────────────────

impl Record for JobMetadata {
    fn encode(&self, buf: &mut Vec<u8>) {
        write_string(buf, &self.author);
        write_string(buf, &self.description);
        let _ = write_varint(&mut *buf, self.version);
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = payload;
        let meta = Self {
            author:      read_string(&mut input)?,
            description: read_string(&mut input)?,
            version:     read_varint(&mut input)?,
        };
        expect_consumed(input, "JobMetadata")?;
        Ok(meta)
    }
}

impl Record for Job {
    fn encode(&self, buf: &mut Vec<u8>) {
        write_string(buf, &self.name);
        let _ = buf.write_u32::<LittleEndian>(self.num_work_planes);
        let mut meta = Vec::new();
        self.meta.encode(&mut meta);
        let _ = write_varint(&mut *buf, meta.len() as u64);
        buf.extend_from_slice(&meta);
        write_seq(buf, &self.work_planes);
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = payload;
        let name = read_string(&mut input)?;
        let num_work_planes = read_u32(&mut input)?;
        let meta_len = read_varint(&mut input)? as usize;
        if input.len() < meta_len {
            return Err(OvfError::Corrupted("Job metadata truncated".into()));
        }
        let (meta_bytes, tail) = input.split_at(meta_len);
        input = tail;
        let job = Self {
            name,
            num_work_planes,
            meta: JobMetadata::decode(meta_bytes)?,
            work_planes: read_seq(&mut input)?,
        };
        expect_consumed(input, "Job")?;
        Ok(job)
    }
}

impl Record for WorkPlane {
    fn encode(&self, buf: &mut Vec<u8>) {
        let _ = buf.write_u32::<LittleEndian>(self.work_plane_number);
        let _ = buf.write_f32::<LittleEndian>(self.z_pos_in_mm);
        let _ = buf.write_u32::<LittleEndian>(self.num_blocks);
        write_seq(buf, &self.vector_blocks);
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = payload;
        let plane = Self {
            work_plane_number: read_u32(&mut input)?,
            z_pos_in_mm:       read_f32(&mut input)?,
            num_blocks:        read_u32(&mut input)?,
            vector_blocks:     read_seq(&mut input)?,
        };
        expect_consumed(input, "WorkPlane")?;
        Ok(plane)
    }
}

impl Record for VectorBlock {
    fn encode(&self, buf: &mut Vec<u8>) {
        let _ = buf.write_u32::<LittleEndian>(self.marking_params_key);
        let _ = write_varint(&mut *buf, self.points.len() as u64);
        for p in &self.points {
            let _ = buf.write_f32::<LittleEndian>(*p);
        }
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = payload;
        let marking_params_key = read_u32(&mut input)?;
        let count = read_varint(&mut input)? as usize;
        let mut points = Vec::with_capacity(count.min(65_536));
        for _ in 0..count {
            points.push(read_f32(&mut input)?);
        }
        expect_consumed(input, "VectorBlock")?;
        Ok(Self { marking_params_key, points })
    }
}

fn write_positions(buf: &mut Vec<u8>, positions: &[i64]) {
    let _ = write_varint(&mut *buf, positions.len() as u64);
    for pos in positions {
        let _ = buf.write_i64::<LittleEndian>(*pos);
    }
}

fn read_positions(input: &mut &[u8]) -> Result<Vec<i64>> {
    let count = read_varint(&mut *input)? as usize;
    let mut positions = Vec::with_capacity(count.min(65_536));
    for _ in 0..count {
        positions.push(read_i64(&mut *input)?);
    }
    Ok(positions)
}

impl Record for JobLut {
    fn encode(&self, buf: &mut Vec<u8>) {
        let _ = buf.write_i64::<LittleEndian>(self.job_shell_position);
        write_positions(buf, &self.workplane_positions);
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = payload;
        let lut = Self {
            job_shell_position:  read_i64(&mut input)?,
            workplane_positions: read_positions(&mut input)?,
        };
        expect_consumed(input, "JobLUT")?;
        Ok(lut)
    }
}

impl Record for WorkPlaneLut {
    fn encode(&self, buf: &mut Vec<u8>) {
        let _ = buf.write_i64::<LittleEndian>(self.workplane_shell_position);
        write_positions(buf, &self.vectorblock_positions);
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = payload;
        let lut = Self {
            workplane_shell_position: read_i64(&mut input)?,
            vectorblock_positions:    read_positions(&mut input)?,
        };
        expect_consumed(input, "WorkPlaneLUT")?;
        Ok(lut)
    }
}
