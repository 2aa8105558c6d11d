pub mod record;
pub mod header;
pub mod index;
pub mod qfs;
pub mod container;
pub mod writer;
pub mod kind;
pub mod perf;
pub mod error;

pub use record::{Record, RecordError};
pub use header::{Header, IndexVersion};
pub use index::{DirectoryEntry, HoleEntry, IndexEntry, ResourceKey};
pub use qfs::{compress, decompress, try_compress, FrameHeader, QfsError};
pub use container::{Compression, Container, DirectoryMode, OpenOptions, State};
pub use writer::{CompressionPolicy, SaveOptions, SaveSummary};
pub use kind::{ResourceKind, TypeInfo};
pub use error::{DbpfError, Result};
