use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use proptest::prelude::*;
use tempfile::NamedTempFile;

use ovf::wire::{read_delimited, write_delimited, write_varint};
use ovf::{
    CacheState, Job, JobFileReader, JobFileWriter, JobLut, JobMetadata, OvfError, OvfFileReader,
    OvfFileWriter, ReadOperation, VectorBlock, WorkPlane,
};

fn block(key: u32, points: &[f32]) -> VectorBlock {
    VectorBlock {
        marking_params_key: key,
        points: points.to_vec(),
    }
}

/// Job from the format's worked example: plane 0 carries blocks [A, B],
/// plane 1 carries [C].  Counts match what the writer recomputes so the
/// round-trip is deep-equal.
fn sample_job() -> Job {
    Job {
        name: "sample".into(),
        num_work_planes: 2,
        meta: JobMetadata {
            author:      "integration".into(),
            description: "two planes, three blocks".into(),
            version:     1,
        },
        work_planes: vec![
            WorkPlane {
                work_plane_number: 0,
                z_pos_in_mm: 0.03,
                num_blocks: 2,
                vector_blocks: vec![
                    block(1, &[0.0, 0.0, 1.0, 0.0]),
                    block(2, &[1.0, 0.0, 1.0, 1.0]),
                ],
            },
            WorkPlane {
                work_plane_number: 1,
                z_pos_in_mm: 0.06,
                num_blocks: 1,
                vector_blocks: vec![block(3, &[0.5, 0.5])],
            },
        ],
    }
}

fn write_sample(path: &std::path::Path) -> Job {
    let job = sample_job();
    let mut writer = OvfFileWriter::new();
    writer.write_complete_job(&job, path).unwrap();
    job
}

// ── Round-trip ───────────────────────────────────────────────────────────────

#[test]
fn complete_job_roundtrip_is_deep_equal() {
    let tmp = NamedTempFile::new().unwrap();
    let job = write_sample(tmp.path());

    let mut reader = OvfFileReader::new();
    reader.open(tmp.path()).unwrap();
    assert_eq!(reader.operation(), ReadOperation::CompleteRead);
    assert_eq!(reader.cache_state(), CacheState::CompleteJobCached);
    assert_eq!(reader.cache_to_memory().unwrap(), &job);
}

#[test]
fn streaming_append_matches_write_complete_job() {
    // Same job written block-by-block through the streaming API.
    let tmp_a = NamedTempFile::new().unwrap();
    let tmp_b = NamedTempFile::new().unwrap();
    let job = write_sample(tmp_a.path());

    let mut writer = OvfFileWriter::new();
    writer.start_write(&job, tmp_b.path()).unwrap();
    for plane in &job.work_planes {
        writer.append_work_plane(plane.shell()).unwrap();
        for b in &plane.vector_blocks {
            writer.append_vector_block(b.clone()).unwrap();
        }
    }
    writer.finish().unwrap();

    assert_eq!(
        fs::read(tmp_a.path()).unwrap(),
        fs::read(tmp_b.path()).unwrap()
    );
}

#[test]
fn worked_example_block_access() {
    let tmp = NamedTempFile::new().unwrap();
    let job = write_sample(tmp.path());

    let mut reader = OvfFileReader::new();
    reader.open(tmp.path()).unwrap();

    let c = reader.get_vector_block(1, 0).unwrap();
    assert_eq!(c, job.work_planes[1].vector_blocks[0]);
    assert_eq!(reader.get_work_plane_shell(0).unwrap().num_blocks, 2);
    assert!(matches!(
        reader.get_vector_block(0, 2).unwrap_err(),
        OvfError::IndexOutOfRange { index: 2, count: 2, .. }
    ));
}

// ── Shells ───────────────────────────────────────────────────────────────────

#[test]
fn shells_never_carry_nested_sequences() {
    let tmp = NamedTempFile::new().unwrap();
    let job = write_sample(tmp.path());

    // Force streaming so shells come from disk, not the cache.
    let mut reader = OvfFileReader::new().with_cache_threshold(0);
    reader.open(tmp.path()).unwrap();
    assert_eq!(reader.operation(), ReadOperation::Streaming);
    assert_eq!(reader.cache_state(), CacheState::JobShellCached);

    let job_shell = reader.get_job_shell().unwrap();
    assert!(job_shell.work_planes.is_empty());
    assert_eq!(job_shell.name, job.name);
    assert_eq!(job_shell.meta, job.meta);
    assert_eq!(job_shell.num_work_planes, 2);

    for i in 0..reader.num_work_planes() {
        let shell = reader.get_work_plane_shell(i).unwrap();
        assert!(shell.vector_blocks.is_empty());
        let full = reader.get_work_plane(i).unwrap();
        assert_eq!(shell, full.shell());
    }
}

// ── Lazy/eager equivalence ───────────────────────────────────────────────────

#[test]
fn streaming_and_complete_read_agree() {
    let tmp = NamedTempFile::new().unwrap();
    write_sample(tmp.path());

    let mut eager = OvfFileReader::new();
    eager.open(tmp.path()).unwrap();
    assert_eq!(eager.operation(), ReadOperation::CompleteRead);

    let mut lazy = OvfFileReader::new().with_cache_threshold(0);
    lazy.open(tmp.path()).unwrap();
    assert_eq!(lazy.operation(), ReadOperation::Streaming);

    assert_eq!(eager.get_job_shell().unwrap(), lazy.get_job_shell().unwrap());
    for i in 0..eager.num_work_planes() {
        assert_eq!(
            eager.get_work_plane(i).unwrap(),
            lazy.get_work_plane(i).unwrap()
        );
        assert_eq!(
            eager.get_work_plane_shell(i).unwrap(),
            lazy.get_work_plane_shell(i).unwrap()
        );
        for j in 0..eager.num_vector_blocks(i).unwrap() {
            assert_eq!(
                eager.get_vector_block(i, j).unwrap(),
                lazy.get_vector_block(i, j).unwrap()
            );
        }
    }
}

// ── Bounds ───────────────────────────────────────────────────────────────────

#[test]
fn out_of_range_indices_are_rejected() {
    let tmp = NamedTempFile::new().unwrap();
    write_sample(tmp.path());

    let mut reader = OvfFileReader::new();
    reader.open(tmp.path()).unwrap();

    assert!(matches!(
        reader.get_work_plane(2).unwrap_err(),
        OvfError::IndexOutOfRange { index: 2, count: 2, .. }
    ));
    assert!(matches!(
        reader.get_work_plane_shell(9).unwrap_err(),
        OvfError::IndexOutOfRange { .. }
    ));
    assert!(matches!(
        reader.get_vector_block(2, 0).unwrap_err(),
        OvfError::IndexOutOfRange { .. }
    ));
    assert!(matches!(
        reader.get_vector_block(1, 1).unwrap_err(),
        OvfError::IndexOutOfRange { index: 1, count: 1, .. }
    ));
}

// ── Corruption detection ─────────────────────────────────────────────────────

#[test]
fn truncated_file_is_empty_or_truncated() {
    let tmp = NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"LVF").unwrap();
    let mut reader = OvfFileReader::new();
    assert!(matches!(
        reader.open(tmp.path()).unwrap_err(),
        OvfError::EmptyOrTruncated(3)
    ));
}

#[test]
fn flipped_magic_byte_is_invalid_format() {
    let tmp = NamedTempFile::new().unwrap();
    write_sample(tmp.path());

    let mut bytes = fs::read(tmp.path()).unwrap();
    bytes[0] ^= 0xff;
    fs::write(tmp.path(), &bytes).unwrap();

    let mut reader = OvfFileReader::new();
    assert!(matches!(
        reader.open(tmp.path()).unwrap_err(),
        OvfError::InvalidFormat(_)
    ));
}

#[test]
fn lut_count_mismatch_is_corrupted() {
    let tmp = NamedTempFile::new().unwrap();
    write_sample(tmp.path());

    // Append a JobLUT with a surplus workplane position and repoint the
    // root at it: the shell still declares 2 planes, the new LUT holds 3.
    let mut bytes = fs::read(tmp.path()).unwrap();
    let root = i64::from_le_bytes(bytes[4..12].try_into().unwrap()) as usize;
    let mut lut: JobLut = read_delimited(&bytes[root..]).unwrap();
    lut.workplane_positions.push(12);

    let new_root = bytes.len() as i64;
    write_delimited(&lut, &mut bytes).unwrap();
    bytes[4..12].copy_from_slice(&new_root.to_le_bytes());
    fs::write(tmp.path(), &bytes).unwrap();

    let mut reader = OvfFileReader::new();
    assert!(matches!(
        reader.open(tmp.path()).unwrap_err(),
        OvfError::Corrupted(_)
    ));
}

#[test]
fn out_of_range_lut_offset_is_corrupted() {
    let tmp = NamedTempFile::new().unwrap();
    write_sample(tmp.path());

    let mut bytes = fs::read(tmp.path()).unwrap();
    let root = i64::from_le_bytes(bytes[4..12].try_into().unwrap()) as usize;
    let mut lut: JobLut = read_delimited(&bytes[root..]).unwrap();
    lut.workplane_positions[0] = bytes.len() as i64 + 4096;

    let new_root = bytes.len() as i64;
    write_delimited(&lut, &mut bytes).unwrap();
    bytes[4..12].copy_from_slice(&new_root.to_le_bytes());
    fs::write(tmp.path(), &bytes).unwrap();

    let mut reader = OvfFileReader::new();
    assert!(matches!(
        reader.open(tmp.path()).unwrap_err(),
        OvfError::Corrupted(_)
    ));
}

#[test]
fn oversized_length_prefix_is_corrupted() {
    let tmp = NamedTempFile::new().unwrap();
    write_sample(tmp.path());

    // Repoint the root at a JobLUT whose length prefix claims u64::MAX
    // bytes with nothing behind it.  Open must return Corrupted, not abort
    // on the allocation.
    let mut bytes = fs::read(tmp.path()).unwrap();
    let new_root = bytes.len() as i64;
    write_varint(&mut bytes, u64::MAX).unwrap();
    bytes[4..12].copy_from_slice(&new_root.to_le_bytes());
    fs::write(tmp.path(), &bytes).unwrap();

    let mut reader = OvfFileReader::new();
    assert!(matches!(
        reader.open(tmp.path()).unwrap_err(),
        OvfError::Corrupted(_)
    ));
}

#[test]
fn unfinished_file_never_opens() {
    // A write session abandoned before finish leaves either nothing flushed
    // or a header whose root pointer is still the placeholder.  Both must
    // fail open; neither may read back as data.
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = OvfFileWriter::new();
    writer.start_write(&sample_job(), tmp.path()).unwrap();
    writer.append_work_plane(sample_job().work_planes[0].clone()).unwrap();
    std::mem::forget(writer);

    let mut reader = OvfFileReader::new();
    let err = reader.open(tmp.path()).unwrap_err();
    assert!(matches!(
        err,
        OvfError::InvalidFormat(_) | OvfError::EmptyOrTruncated(_)
    ));
}

#[test]
fn placeholder_root_pointer_is_invalid_format() {
    let tmp = NamedTempFile::new().unwrap();
    let mut bytes = vec![0x4c, 0x56, 0x46, 0x21];
    bytes.extend_from_slice(&0i64.to_le_bytes());
    bytes.extend_from_slice(&[0xaa; 32]);
    fs::write(tmp.path(), &bytes).unwrap();

    let mut reader = OvfFileReader::new();
    assert!(matches!(
        reader.open(tmp.path()).unwrap_err(),
        OvfError::InvalidFormat(_)
    ));
}

#[test]
fn missing_file_is_not_found() {
    let mut reader = OvfFileReader::new();
    assert!(matches!(
        reader
            .open(std::path::Path::new("/no/such/job.ovf"))
            .unwrap_err(),
        OvfError::NotFound(_)
    ));
}

// ── Operation guards and session lifecycle ───────────────────────────────────

#[test]
fn second_open_on_live_instance_is_rejected() {
    let tmp = NamedTempFile::new().unwrap();
    write_sample(tmp.path());

    let mut reader = OvfFileReader::new();
    reader.open(tmp.path()).unwrap();
    assert!(matches!(
        reader.open(tmp.path()).unwrap_err(),
        OvfError::OperationInProgress
    ));

    reader.close();
    assert_eq!(reader.operation(), ReadOperation::None);
    reader.open(tmp.path()).unwrap();
}

#[test]
fn failed_open_leaves_instance_reusable() {
    let bad = NamedTempFile::new().unwrap();
    fs::write(bad.path(), b"x").unwrap();
    let good = NamedTempFile::new().unwrap();
    write_sample(good.path());

    let mut reader = OvfFileReader::new();
    assert!(reader.open(bad.path()).is_err());
    assert_eq!(reader.operation(), ReadOperation::None);
    reader.open(good.path()).unwrap();
}

#[test]
fn unload_drops_cache_but_keeps_random_access() {
    let tmp = NamedTempFile::new().unwrap();
    let job = write_sample(tmp.path());

    let mut reader = OvfFileReader::new().with_cache_threshold(0);
    reader.open(tmp.path()).unwrap();
    reader.cache_to_memory().unwrap();
    assert_eq!(reader.cache_state(), CacheState::CompleteJobCached);

    reader.unload();
    assert_eq!(reader.cache_state(), CacheState::NotCached);
    assert_eq!(
        reader.get_vector_block(1, 0).unwrap(),
        job.work_planes[1].vector_blocks[0]
    );
    assert_eq!(reader.cache_to_memory().unwrap(), &job);
}

#[test]
fn writer_misuse_is_caught() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = OvfFileWriter::new();

    assert!(matches!(
        writer.append_vector_block(block(0, &[])).unwrap_err(),
        OvfError::NotWriting
    ));
    assert!(matches!(
        writer.append_work_plane(WorkPlane::default()).unwrap_err(),
        OvfError::NotWriting
    ));

    writer.start_write(&Job::default(), tmp.path()).unwrap();
    assert!(matches!(
        writer.append_vector_block(block(0, &[])).unwrap_err(),
        OvfError::NoCurrentWorkPlane
    ));
    writer.finish().unwrap();
    assert!(matches!(
        writer.append_work_plane(WorkPlane::default()).unwrap_err(),
        OvfError::NotWriting
    ));
    // Idempotent once executed.
    writer.finish().unwrap();
}

#[test]
fn inconsistent_count_is_rejected_before_writing() {
    let tmp = NamedTempFile::new().unwrap();
    let mut job = sample_job();
    job.num_work_planes = 5;

    let mut writer = OvfFileWriter::new();
    assert!(matches!(
        writer.write_complete_job(&job, tmp.path()).unwrap_err(),
        OvfError::InconsistentCount { declared: 5, actual: 2 }
    ));
    // Nothing was started; the writer is still usable.
    assert_eq!(writer.operation(), ovf::WriteOperation::None);
}

#[test]
fn dropped_writer_finishes_the_file() {
    let tmp = NamedTempFile::new().unwrap();
    {
        let mut writer = OvfFileWriter::new();
        writer.start_write(&sample_job(), tmp.path()).unwrap();
        writer
            .append_work_plane(sample_job().work_planes[0].clone())
            .unwrap();
        // Dropped without finish: Drop must finalize the root pointer.
    }
    let mut reader = OvfFileReader::new();
    reader.open(tmp.path()).unwrap();
    assert_eq!(reader.num_work_planes(), 1);
}

#[test]
fn caller_job_is_not_mutated_by_start_write() {
    let tmp = NamedTempFile::new().unwrap();
    let job = sample_job();
    let before = job.clone();

    let mut writer = OvfFileWriter::new();
    writer.start_write(&job, tmp.path()).unwrap();
    writer.finish().unwrap();
    assert_eq!(job, before);
}

// ── Progress reporting ───────────────────────────────────────────────────────

#[test]
fn cache_to_memory_reports_monotonic_progress() {
    let tmp = NamedTempFile::new().unwrap();
    write_sample(tmp.path());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    let mut reader = OvfFileReader::new().with_cache_threshold(0);
    reader.set_progress(move |done: usize, total: usize| {
        sink.borrow_mut().push((done, total));
    });
    reader.open(tmp.path()).unwrap();
    reader.cache_to_memory().unwrap();

    assert_eq!(*seen.borrow(), vec![(1, 2), (2, 2)]);
}

#[test]
fn rereading_a_plane_does_not_overcount_progress() {
    let tmp = NamedTempFile::new().unwrap();
    write_sample(tmp.path());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    let mut reader = OvfFileReader::new().with_cache_threshold(0);
    reader.set_progress(move |done: usize, total: usize| {
        sink.borrow_mut().push((done, total));
    });
    reader.open(tmp.path()).unwrap();
    for _ in 0..3 {
        reader.get_work_plane(0).unwrap();
    }

    assert_eq!(*seen.borrow(), vec![(1, 2), (2, 2), (2, 2)]);
}

#[test]
fn write_complete_job_reports_per_plane_progress() {
    let tmp = NamedTempFile::new().unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    let mut writer = OvfFileWriter::new();
    writer.set_progress(move |done: usize, total: usize| {
        sink.borrow_mut().push((done, total));
    });
    writer.write_complete_job(&sample_job(), tmp.path()).unwrap();

    assert_eq!(*seen.borrow(), vec![(1, 2), (2, 2), (2, 2)]);
}

// ── Randomized round-trip ────────────────────────────────────────────────────

fn arb_job() -> impl Strategy<Value = Job> {
    let arb_block = (0u32..16, prop::collection::vec(-1000.0f32..1000.0, 0..8))
        .prop_map(|(key, points)| VectorBlock {
            marking_params_key: key,
            points,
        });
    let arb_plane = prop::collection::vec(arb_block, 0..4);
    (
        "[a-z]{0,12}",
        prop::collection::vec(arb_plane, 0..4),
        0u64..100,
    )
        .prop_map(|(name, planes, version)| Job {
            name,
            num_work_planes: planes.len() as u32,
            meta: JobMetadata {
                author: "proptest".into(),
                description: String::new(),
                version,
            },
            work_planes: planes
                .into_iter()
                .enumerate()
                .map(|(i, blocks)| WorkPlane {
                    work_plane_number: i as u32,
                    z_pos_in_mm: i as f32 * 0.03,
                    num_blocks: blocks.len() as u32,
                    vector_blocks: blocks,
                })
                .collect(),
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_jobs_roundtrip(job in arb_job()) {
        let tmp = NamedTempFile::new().unwrap();
        let mut writer = OvfFileWriter::new();
        writer.write_complete_job(&job, tmp.path()).unwrap();

        let mut reader = OvfFileReader::new();
        reader.open(tmp.path()).unwrap();
        prop_assert_eq!(reader.cache_to_memory().unwrap(), &job);

        let mut lazy = OvfFileReader::new().with_cache_threshold(0);
        lazy.open(tmp.path()).unwrap();
        for i in 0..job.work_planes.len() {
            prop_assert_eq!(&lazy.get_work_plane(i).unwrap(), &job.work_planes[i]);
        }
    }
}
