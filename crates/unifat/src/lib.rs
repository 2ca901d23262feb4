pub mod cpu;
pub mod error;
pub mod fat;
pub mod macho;

pub use error::{Error, ValidationError, WritePhase};
pub use fat::{create, FatArch, FatArchHeader, FatFile, FatHeader, FatReader, FatWriter, Magic};
pub use fat::{ReadAt, SectionReader};

pub type Result<T> = std::result::Result<T, Error>;
