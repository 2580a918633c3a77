//! Standard MIDI File support: streaming reader, cursor-driven writer and
//! an in-memory representation.

mod header;
mod parsed;
mod reader;
mod writer;

pub use header::{Format, SmfHeader, TimeDivision};
pub use parsed::ParsedSmf;
pub use reader::SmfReader;
pub use writer::{SmfWriter, SmfWriterConfig};
