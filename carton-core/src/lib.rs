#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod entry;
pub mod error;
pub mod policy;
pub mod stats;

pub mod util;

pub mod codec;

pub mod container;

pub mod filetype;
pub mod permissions;

pub mod pack {
    pub(crate) mod walker;
    pub(crate) mod writer;
}

pub mod read {
    pub mod extract;
    pub mod stream;
}

pub mod archiver;
pub mod compressor;
pub mod factory;
pub mod list;

// Re-exports: stable API surface
pub use archiver::Archiver;
pub use codec::{Codec, CodecId, CodecRegistry};
pub use compressor::Compressor;
pub use config::ArchiverOptions;
pub use domain::EntryRow;
pub use entry::{ArchiveEntry, EntryKind};
pub use error::{CartonError, Result};
pub use factory::{
    archiver, archiver_by_name, archiver_for_path, archiver_for_type, archiver_with, compressor,
    compressor_for_path, compressor_for_type,
};
pub use filetype::{ArchiveFormat, CompressionType, FileType};
pub use list::{list, list_with};
pub use policy::Policy;
pub use read::stream::ArchiveStream;
pub use stats::Stats;
