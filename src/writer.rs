//! Streaming writer engine.
//!
//! Workplanes are accepted one at a time and buffered in memory; a plane is
//! flushed to disk when the next one is appended or when the session
//! finishes.  Index pointers that cannot be known up front are written as
//! placeholders and backpatched:
//!
//! 1. the root pointer at offset 4 (patched once, in `finish`), and
//! 2. one 8-byte pointer cell per workplane, reserved before the plane's
//!    blocks are written and patched with the WorkPlaneLUT offset after.
//!
//! Until `finish` patches the root pointer the file deliberately reads back
//! as invalid — a crash mid-write leaves a well-formed prefix, never
//! silently-wrong data.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace};

use crate::api::{JobFileWriter, WriteOperation};
use crate::error::{OvfError, Result};
use crate::header::{FileHeader, PLACEHOLDER_ROOT};
use crate::progress::ProgressSink;
use crate::schema::{Job, JobLut, VectorBlock, WorkPlane, WorkPlaneLut};
use crate::wire::{write_delimited, write_pointer_cell};

#[derive(Default)]
pub struct OvfFileWriter {
    out:              Option<BufWriter<File>>,
    operation:        WriteOperation,
    job_shell:        Job,
    job_lut:          JobLut,
    current:          Option<WorkPlane>,
    root_pointer_pos: u64,
    progress:         Option<Box<dyn ProgressSink>>,
}

impl OvfFileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_progress(&mut self, sink: impl ProgressSink + 'static) {
        self.progress = Some(Box::new(sink));
    }

    /// The shell being written.  Reflects the workplane count appended so far.
    pub fn job_shell(&self) -> &Job {
        &self.job_shell
    }

    /// Flush the buffered workplane: reserve its pointer cell, write blocks,
    /// shell and WorkPlaneLUT, then backpatch the cell with the LUT offset.
    fn finalize_current_work_plane(&mut self) -> Result<()> {
        let Some(mut plane) = self.current.take() else {
            return Ok(());
        };
        let out = self.out.as_mut().ok_or(OvfError::NotWriting)?;

        let plane_start = out.seek(SeekFrom::End(0))?;
        self.job_lut.workplane_positions.push(plane_start as i64);
        let pointer_cell_pos = plane_start;
        write_pointer_cell(&mut *out, PLACEHOLDER_ROOT)?;

        let mut wp_lut = WorkPlaneLut::default();
        for block in &plane.vector_blocks {
            wp_lut.vectorblock_positions.push(out.stream_position()? as i64);
            write_delimited(block, &mut *out)?;
        }

        // The writer owns the bookkeeping fields regardless of what the
        // caller put in them.
        plane.work_plane_number = self.job_shell.num_work_planes;
        plane.num_blocks = plane.vector_blocks.len() as u32;

        let shell = plane.shell();
        wp_lut.workplane_shell_position = out.stream_position()? as i64;
        write_delimited(&shell, &mut *out)?;

        let lut_pos = out.stream_position()?;
        write_delimited(&wp_lut, &mut *out)?;

        out.seek(SeekFrom::Start(pointer_cell_pos))?;
        write_pointer_cell(&mut *out, lut_pos as i64)?;
        out.seek(SeekFrom::End(0))?;

        self.job_shell.num_work_planes += 1;
        trace!(
            plane = shell.work_plane_number,
            blocks = shell.num_blocks,
            lut_pos,
            "workplane flushed"
        );
        Ok(())
    }
}

impl JobFileWriter for OvfFileWriter {
    fn start_write(&mut self, job_shell: &Job, path: &Path) -> Result<()> {
        if self.operation == WriteOperation::PartialWrite {
            return Err(OvfError::OperationInProgress);
        }

        // Defensive copy: the caller keeps its job untouched, and any
        // workplanes already attached to it are not adopted here.
        let mut shell = job_shell.shell();
        shell.num_work_planes = 0;

        let mut out = BufWriter::new(File::create(path)?);
        self.root_pointer_pos = FileHeader::write_placeholder(&mut out)?;

        self.out = Some(out);
        self.job_shell = shell;
        self.job_lut = JobLut::default();
        self.current = None;
        self.operation = WriteOperation::PartialWrite;
        debug!(path = %path.display(), "write session started");
        Ok(())
    }

    fn append_work_plane(&mut self, work_plane: WorkPlane) -> Result<()> {
        if self.operation != WriteOperation::PartialWrite {
            return Err(OvfError::NotWriting);
        }
        self.finalize_current_work_plane()?;
        self.current = Some(work_plane);
        Ok(())
    }

    fn append_vector_block(&mut self, block: VectorBlock) -> Result<()> {
        if self.operation != WriteOperation::PartialWrite {
            return Err(OvfError::NotWriting);
        }
        let plane = self.current.as_mut().ok_or(OvfError::NoCurrentWorkPlane)?;
        plane.vector_blocks.push(block);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.operation != WriteOperation::PartialWrite {
            return Ok(());
        }
        self.finalize_current_work_plane()?;

        let out = self.out.as_mut().ok_or(OvfError::NotWriting)?;
        out.seek(SeekFrom::End(0))?;
        self.job_lut.job_shell_position = out.stream_position()? as i64;
        write_delimited(&self.job_shell, &mut *out)?;

        let lut_pos = out.stream_position()?;
        write_delimited(&self.job_lut, &mut *out)?;

        // This patch is what makes the file valid.
        FileHeader::patch_root_pointer(&mut *out, self.root_pointer_pos, lut_pos as i64)?;
        out.flush()?;

        let total = self.job_shell.num_work_planes as usize;
        if let Some(sink) = self.progress.as_mut() {
            sink.update(total, total);
        }

        self.out = None;
        self.operation = WriteOperation::None;
        debug!(workplanes = total, root_pointer = lut_pos, "write session finished");
        Ok(())
    }

    fn write_complete_job(&mut self, job: &Job, path: &Path) -> Result<()> {
        let declared = job.num_work_planes as usize;
        let actual = job.work_planes.len();
        if declared != actual {
            return Err(OvfError::InconsistentCount { declared, actual });
        }

        self.start_write(job, path)?;
        for (done, plane) in job.work_planes.iter().enumerate() {
            self.append_work_plane(plane.clone())?;
            if let Some(sink) = self.progress.as_mut() {
                sink.update(done + 1, actual);
            }
        }
        self.finish()
    }

    fn operation(&self) -> WriteOperation {
        self.operation
    }
}

/// A session dropped without `finish` would leave a file with no valid root
/// pointer; finish it instead.  Errors here have nowhere to go and are
/// dropped.
impl Drop for OvfFileWriter {
    fn drop(&mut self) {
        if self.operation == WriteOperation::PartialWrite {
            let _ = self.finish();
        }
    }
}
