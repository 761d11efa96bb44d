pub mod api;
pub mod error;
pub mod header;
pub mod progress;
pub mod project;
pub mod reader;
pub mod schema;
pub mod wire;
pub mod writer;

pub use api::{CacheState, JobFileReader, JobFileWriter, ReadOperation, WriteOperation};
pub use error::{OvfError, Result};
pub use progress::ProgressSink;
pub use reader::{OvfFileReader, DEFAULT_CACHE_THRESHOLD};
pub use schema::{Job, JobLut, JobMetadata, VectorBlock, WorkPlane, WorkPlaneLut};
pub use writer::OvfFileWriter;
