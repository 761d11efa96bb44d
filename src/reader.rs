//! Random-access reader engine.
//!
//! # Opening
//! `open` validates the 12-byte header, resolves the whole index chain
//! (JobLUT → job shell → every per-workplane pointer cell → every
//! WorkPlaneLUT) and bounds-checks every stored offset against the file
//! length before any accessor is allowed to run.  A failure at any point
//! leaves the instance unopened.
//!
//! # Caching strategy
//! The root pointer doubles as a size estimate: everything before it is job
//! data.  If it is at or below the configurable threshold (default 64 MiB)
//! the whole job is materialized eagerly (`CompleteRead`); larger files stay
//! in `Streaming` mode and records are fetched on demand through the LUTs.
//! Both modes return identical data for every `(workplane, block)` pair.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::api::{CacheState, JobFileReader, ReadOperation};
use crate::error::{OvfError, Result};
use crate::header::FileHeader;
use crate::progress::ProgressSink;
use crate::schema::{Job, JobLut, VectorBlock, WorkPlane, WorkPlaneLut};
use crate::wire::{read_delimited, read_pointer_cell};

/// Eager-cache threshold: files whose root pointer is at or below this many
/// bytes are fully materialized at open time.
pub const DEFAULT_CACHE_THRESHOLD: u64 = 64 * 1024 * 1024;

pub struct OvfFileReader {
    src:             Option<BufReader<File>>,
    file_len:        u64,
    cache_threshold: u64,
    operation:       ReadOperation,
    cache_state:     CacheState,
    job_lut:         JobLut,
    work_plane_luts: Vec<WorkPlaneLut>,
    job_shell:       Job,
    job:             Option<Job>,
    cached_layers:   usize,
    progress:        Option<Box<dyn ProgressSink>>,
}

impl Default for OvfFileReader {
    fn default() -> Self {
        Self {
            src:             None,
            file_len:        0,
            cache_threshold: DEFAULT_CACHE_THRESHOLD,
            operation:       ReadOperation::None,
            cache_state:     CacheState::NotCached,
            job_lut:         JobLut::default(),
            work_plane_luts: Vec::new(),
            job_shell:       Job::default(),
            job:             None,
            cached_layers:   0,
            progress:        None,
        }
    }
}

impl OvfFileReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the eager-cache threshold.  Only meaningful before `open`.
    pub fn with_cache_threshold(mut self, bytes: u64) -> Self {
        self.cache_threshold = bytes;
        self
    }

    pub fn set_cache_threshold(&mut self, bytes: u64) {
        self.cache_threshold = bytes;
    }

    pub fn set_progress(&mut self, sink: impl ProgressSink + 'static) {
        self.progress = Some(Box::new(sink));
    }

    pub fn num_work_planes(&self) -> usize {
        self.job_shell.num_work_planes as usize
    }

    /// Length of the open file in bytes; 0 when nothing is open.
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Recorded vector-block count for one workplane.
    pub fn num_vector_blocks(&self, i_work_plane: usize) -> Result<usize> {
        self.check_plane_index(i_work_plane)?;
        Ok(self.work_plane_luts[i_work_plane].vectorblock_positions.len())
    }

    // ── Open internals ───────────────────────────────────────────────────────

    fn open_inner(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OvfError::NotFound(path.display().to_string())
            } else {
                OvfError::Io(e)
            }
        })?;
        let file_len = file.metadata()?.len();
        if file_len < crate::header::HEADER_SIZE {
            return Err(OvfError::EmptyOrTruncated(file_len));
        }

        let mut src = BufReader::new(file);
        let header = FileHeader::read(&mut src, file_len)?;
        let root = header.root_pointer;

        self.operation = if root as u64 <= self.cache_threshold {
            ReadOperation::CompleteRead
        } else {
            ReadOperation::Streaming
        };
        debug!(
            root_pointer = root,
            file_len,
            strategy = ?self.operation,
            "opening job file"
        );

        src.seek(SeekFrom::Start(root as u64))?;
        let job_lut: JobLut = read_delimited(&mut src)?;

        check_offset(job_lut.job_shell_position, file_len, "job shell")?;
        src.seek(SeekFrom::Start(job_lut.job_shell_position as u64))?;
        let job_shell: Job = read_delimited(&mut src)?;

        if job_shell.num_work_planes as usize != job_lut.workplane_positions.len() {
            return Err(OvfError::Corrupted(format!(
                "job declares {} workplanes but JobLUT holds {} positions",
                job_shell.num_work_planes,
                job_lut.workplane_positions.len()
            )));
        }

        let mut work_plane_luts = Vec::with_capacity(job_lut.workplane_positions.len());
        for (i, &cell_pos) in job_lut.workplane_positions.iter().enumerate() {
            check_offset(cell_pos, file_len, "workplane pointer cell")?;
            src.seek(SeekFrom::Start(cell_pos as u64))?;
            let lut_pos = read_pointer_cell(&mut src)?;
            check_offset(lut_pos, file_len, "workplane LUT")?;
            src.seek(SeekFrom::Start(lut_pos as u64))?;
            let wp_lut: WorkPlaneLut = read_delimited(&mut src)?;

            check_offset(wp_lut.workplane_shell_position, file_len, "workplane shell")?;
            for &block_pos in &wp_lut.vectorblock_positions {
                check_offset(block_pos, file_len, "vector block")?;
            }
            debug_assert_eq!(work_plane_luts.len(), i);
            work_plane_luts.push(wp_lut);
        }

        self.src = Some(src);
        self.file_len = file_len;
        self.job_lut = job_lut;
        self.work_plane_luts = work_plane_luts;
        self.job_shell = job_shell;
        self.job = None;
        self.cached_layers = 0;

        if self.operation == ReadOperation::CompleteRead {
            self.cache_to_memory()?;
        } else {
            self.cache_state = CacheState::JobShellCached;
        }
        Ok(())
    }

    fn reset_to_unopened(&mut self) {
        let cache_threshold = self.cache_threshold;
        let progress = self.progress.take();
        *self = Self::default();
        self.cache_threshold = cache_threshold;
        self.progress = progress;
    }

    // ── Streaming fetch helpers ──────────────────────────────────────────────

    fn check_plane_index(&self, i_work_plane: usize) -> Result<()> {
        if self.operation == ReadOperation::None {
            return Err(OvfError::NotOpen);
        }
        let count = self.num_work_planes();
        if i_work_plane >= count {
            return Err(OvfError::IndexOutOfRange {
                entity: "workplane",
                index:  i_work_plane,
                count,
            });
        }
        Ok(())
    }

    fn read_record_at<M: crate::wire::Record>(&mut self, pos: i64) -> Result<M> {
        let src = self.src.as_mut().ok_or(OvfError::NotOpen)?;
        src.seek(SeekFrom::Start(pos as u64))?;
        read_delimited(&mut *src)
    }

    fn read_work_plane_shell(&mut self, i_work_plane: usize) -> Result<WorkPlane> {
        let pos = self.work_plane_luts[i_work_plane].workplane_shell_position;
        self.read_record_at(pos)
    }

    fn bump_cached_layers(&mut self) {
        let total = self.num_work_planes();
        // Re-reading a plane in streaming mode must not push the count past
        // the plane total.
        self.cached_layers = (self.cached_layers + 1).min(total);
        let done = self.cached_layers;
        if let Some(sink) = self.progress.as_mut() {
            sink.update(done, total);
        }
    }
}

fn check_offset(pos: i64, file_len: u64, what: &str) -> Result<()> {
    if pos < 0 || pos as u64 >= file_len {
        return Err(OvfError::Corrupted(format!(
            "invalid {what} position {pos} in {file_len}-byte file"
        )));
    }
    Ok(())
}

impl JobFileReader for OvfFileReader {
    fn open(&mut self, path: &Path) -> Result<()> {
        if self.operation != ReadOperation::None {
            return Err(OvfError::OperationInProgress);
        }
        self.operation = ReadOperation::Validating;
        match self.open_inner(path) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.reset_to_unopened();
                Err(e)
            }
        }
    }

    fn get_job_shell(&self) -> Result<Job> {
        if self.operation == ReadOperation::None {
            return Err(OvfError::NotOpen);
        }
        Ok(self.job_shell.clone())
    }

    fn cache_to_memory(&mut self) -> Result<&Job> {
        if self.operation == ReadOperation::None {
            return Err(OvfError::NotOpen);
        }
        if !(self.cache_state == CacheState::CompleteJobCached && self.job.is_some()) {
            let total = self.num_work_planes();
            let mut job = self.job_shell.clone();
            job.work_planes.reserve(total);
            for i in 0..total {
                let plane = self.get_work_plane(i)?;
                job.work_planes.push(plane);
            }
            self.job = Some(job);
            self.cache_state = CacheState::CompleteJobCached;
            debug!(workplanes = total, "job fully cached in memory");
        }
        self.job.as_ref().ok_or(OvfError::NotOpen)
    }

    fn unload(&mut self) {
        self.job = None;
        self.cached_layers = 0;
        self.cache_state = CacheState::NotCached;
    }

    fn get_work_plane(&mut self, i_work_plane: usize) -> Result<WorkPlane> {
        self.check_plane_index(i_work_plane)?;
        if self.cache_state == CacheState::CompleteJobCached {
            if let Some(job) = &self.job {
                return Ok(job.work_planes[i_work_plane].clone());
            }
        }
        let mut plane = self.read_work_plane_shell(i_work_plane)?;
        let block_count = plane.num_blocks as usize;
        plane.vector_blocks.reserve(block_count);
        for i_block in 0..block_count {
            plane
                .vector_blocks
                .push(self.get_vector_block(i_work_plane, i_block)?);
        }
        self.bump_cached_layers();
        Ok(plane)
    }

    fn get_work_plane_shell(&mut self, i_work_plane: usize) -> Result<WorkPlane> {
        self.check_plane_index(i_work_plane)?;
        if self.cache_state == CacheState::CompleteJobCached {
            if let Some(job) = &self.job {
                return Ok(job.work_planes[i_work_plane].shell());
            }
        }
        // Reads exactly the shell record; vector-block bytes are never
        // touched, keeping this O(shell size).
        self.read_work_plane_shell(i_work_plane)
    }

    fn get_vector_block(
        &mut self,
        i_work_plane: usize,
        i_vector_block: usize,
    ) -> Result<VectorBlock> {
        self.check_plane_index(i_work_plane)?;
        let block_count = self.work_plane_luts[i_work_plane].vectorblock_positions.len();
        if i_vector_block >= block_count {
            return Err(OvfError::IndexOutOfRange {
                entity: "vector block",
                index:  i_vector_block,
                count:  block_count,
            });
        }
        if self.cache_state == CacheState::CompleteJobCached {
            if let Some(job) = &self.job {
                return Ok(job.work_planes[i_work_plane].vector_blocks[i_vector_block].clone());
            }
        }
        // The record's own length prefix bounds the read; no end offset is
        // needed for correctness.
        let pos = self.work_plane_luts[i_work_plane].vectorblock_positions[i_vector_block];
        self.read_record_at(pos)
    }

    fn close(&mut self) {
        self.reset_to_unopened();
    }

    fn cache_state(&self) -> CacheState {
        self.cache_state
    }

    fn operation(&self) -> ReadOperation {
        self.operation
    }
}
