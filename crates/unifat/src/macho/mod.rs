pub mod parser;

pub use parser::{inspect_archive, inspect_object, ObjectInfo, SegmentInfo};
