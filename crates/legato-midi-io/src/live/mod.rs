//! Live MIDI: decoding from input ports and encoding to output ports.

mod reader;
mod source;
mod writer;

pub use reader::{CloseHandle, LiveReader};
pub use writer::LiveWriter;
