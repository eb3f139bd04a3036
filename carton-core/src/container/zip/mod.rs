//! ZIP (and JAR, which is a ZIP with a different suffix). Each entry carries
//! its own codec; reading needs random access, so plain streams are spooled
//! to a temporary file first.

mod reader;
pub mod structures;
mod writer;

pub use reader::ZipReader;
pub use writer::ZipWriter;
