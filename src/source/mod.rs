pub mod line_reader;
pub mod tailer;

pub use line_reader::{read_line, ReadError};
pub use tailer::{FileTailer, TailerSettings};
