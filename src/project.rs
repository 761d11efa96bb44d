//! Shell projection — field-exclusion copies of schema records.
//!
//! Both engines need "shell" views: a record with its heavy nested sequence
//! left out (a job without workplanes, a workplane without vector blocks).
//! Instead of runtime reflection this is a generic visitor over static field
//! descriptors: each projectable record declares its fields once, and
//! [`project`] walks them, skipping the excluded names.

use crate::error::{OvfError, Result};
use crate::schema::{Job, WorkPlane};

/// What a field holds, as far as the projector cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain value: integer, float, string.  Copied by value.
    Scalar,
    /// Nested message.  Deep-copied as a unit.
    Message,
    /// Sequence of messages.  Elements are appended as deep copies.
    Repeated,
    /// Keyed map.  Declared for schema evolution; the projector has no copy
    /// strategy for it yet and fails rather than guess.
    Map,
}

/// One field of a projectable record: its schema name, its kind, and a copy
/// function from source to target.
pub struct FieldDescriptor<T> {
    pub name: &'static str,
    pub kind: FieldKind,
    pub copy: fn(&T, &mut T),
}

/// Records that expose their fields to the projector.  The `'static` bound
/// is required by the descriptor slices, which borrow for `'static`.
pub trait Reflect: Sized + 'static {
    fn fields() -> &'static [FieldDescriptor<Self>];
}

/// Copy every field of `source` into `target` except those named in
/// `excluded`.  Excluded fields keep whatever value `target` already holds
/// (typically the default).  Repeated fields append; the caller is expected
/// to hand in a fresh target.
pub fn project<T: Reflect>(source: &T, target: &mut T, excluded: &[&str]) -> Result<()> {
    for field in T::fields() {
        if excluded.contains(&field.name) {
            continue;
        }
        if field.kind == FieldKind::Map {
            return Err(OvfError::UnsupportedFieldType(field.name));
        }
        (field.copy)(source, target);
    }
    Ok(())
}

// ── Reflect impls ────────────────────────────────────────────────────────────

impl Reflect for Job {
    fn fields() -> &'static [FieldDescriptor<Self>] {
        const FIELDS: &[FieldDescriptor<Job>] = &[
            FieldDescriptor {
                name: "name",
                kind: FieldKind::Scalar,
                copy: |s, t| t.name = s.name.clone(),
            },
            FieldDescriptor {
                name: "num_work_planes",
                kind: FieldKind::Scalar,
                copy: |s, t| t.num_work_planes = s.num_work_planes,
            },
            FieldDescriptor {
                name: "meta",
                kind: FieldKind::Message,
                copy: |s, t| t.meta = s.meta.clone(),
            },
            FieldDescriptor {
                name: "work_planes",
                kind: FieldKind::Repeated,
                copy: |s, t| t.work_planes.extend(s.work_planes.iter().cloned()),
            },
        ];
        FIELDS
    }
}

impl Reflect for WorkPlane {
    fn fields() -> &'static [FieldDescriptor<Self>] {
        const FIELDS: &[FieldDescriptor<WorkPlane>] = &[
            FieldDescriptor {
                name: "work_plane_number",
                kind: FieldKind::Scalar,
                copy: |s, t| t.work_plane_number = s.work_plane_number,
            },
            FieldDescriptor {
                name: "z_pos_in_mm",
                kind: FieldKind::Scalar,
                copy: |s, t| t.z_pos_in_mm = s.z_pos_in_mm,
            },
            FieldDescriptor {
                name: "num_blocks",
                kind: FieldKind::Scalar,
                copy: |s, t| t.num_blocks = s.num_blocks,
            },
            FieldDescriptor {
                name: "vector_blocks",
                kind: FieldKind::Repeated,
                copy: |s, t| t.vector_blocks.extend(s.vector_blocks.iter().cloned()),
            },
        ];
        FIELDS
    }
}

// ── Shell constructors ───────────────────────────────────────────────────────

impl Job {
    /// Metadata-only copy: every field except the workplane sequence.
    pub fn shell(&self) -> Self {
        let mut shell = Self::default();
        // Job's descriptors contain no Map field, so projection cannot fail.
        let _ = project(self, &mut shell, &["work_planes"]);
        shell
    }
}

impl WorkPlane {
    /// Copy of the plane without its vector blocks.
    pub fn shell(&self) -> Self {
        let mut shell = Self::default();
        let _ = project(self, &mut shell, &["vector_blocks"]);
        shell
    }
}
