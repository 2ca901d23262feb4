//! Error types for unifat operations.
//!
//! This module defines the [`enum@Error`] enum covering every failure case
//! when reading or writing fat containers, and the [`ValidationError`] family
//! raised while planning a container before any byte is written.
//!
//! # See Also
//!
//! - [`crate::Result`] - Convenience type alias using this error

use std::fmt;
use thiserror::Error;

/// Error type for unifat operations.
///
/// All public functions in this crate return [`crate::Result<T>`], which uses this error type.
/// Match on variants to handle specific failure cases.
///
/// # Examples
///
/// ```no_run
/// use unifat::{Error, FatFile};
///
/// let data = std::fs::read("some-binary").unwrap();
/// match FatFile::parse(&data) {
///     Ok(fat) => println!("{} architectures", fat.arches.len()),
///     Err(Error::Thin) => println!("Non-fat file"),
///     Err(Error::Format(msg)) => eprintln!("Corrupt container: {msg}"),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Occurs when reading input sources outside of the emit phase.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The source is a single-architecture object, not a fat container.
    ///
    /// This is a classification outcome rather than corruption: callers should
    /// retry through their single-architecture path.
    #[error("the file is thin file, not fat")]
    Thin,

    /// The source claims to be a fat container but is structurally invalid.
    #[error("Invalid fat file: {0}")]
    Format(String),

    /// The architecture set cannot be written as a container.
    #[error("Invalid architectures: {0}")]
    Validation(#[from] ValidationError),

    /// Writing the container failed part way through.
    ///
    /// Output may be partially written. Stage output and swap it into place
    /// only on success when atomicity is needed.
    #[error("IO error while writing {phase}: {source}")]
    Write {
        /// The emission phase that failed.
        phase: WritePhase,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Invalid or unsupported Mach-O object.
    #[error("Invalid Mach-O: {0}")]
    MachO(String),

    /// Invalid static archive, or one without any object member.
    #[error("Invalid archive: {0}")]
    Archive(String),

    /// A requested architecture is not present in the container.
    #[error("Architecture not found: {0}")]
    ArchNotFound(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` when the source was a thin file rather than a container.
    pub fn is_thin(&self) -> bool {
        matches!(self, Error::Thin)
    }

    pub(crate) fn write(phase: WritePhase) -> impl FnOnce(std::io::Error) -> Error {
        move |source| Error::Write { phase, source }
    }
}

/// Failures detected while planning a container, always before any output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// No architectures were supplied.
    #[error("no architectures to write")]
    Empty,

    /// Two architectures share the same cputype and cpusubtype.
    #[error("duplicate architecture {name}")]
    Duplicate {
        cpu_type: u32,
        cpu_subtype: u32,
        name: String,
    },

    /// The alignment exponent exceeds the container maximum.
    #[error(
        "align (2^{align}) too large of fat file (cputype ({cpu_type}) cpusubtype ({cpu_subtype})) (maximum 2^{max})",
        max = crate::fat::ALIGN_BIT_MAX
    )]
    AlignTooLarge {
        align: u32,
        cpu_type: u32,
        cpu_subtype: u32,
    },

    /// An architecture ends beyond the 32-bit offset range.
    #[error("cputype ({cpu_type}) cpusubtype ({cpu_subtype}) exceeds maximum 32 bit size, use the 64-bit fat format")]
    Fat32Overflow { cpu_type: u32, cpu_subtype: u32 },

    /// An architecture ends beyond the 64-bit offset range.
    #[error("cputype ({cpu_type}) cpusubtype ({cpu_subtype}) does not fit in a 64 bit fat file")]
    OffsetOverflow { cpu_type: u32, cpu_subtype: u32 },
}

/// Emission phase a [`Error::Write`] happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    /// Container header or architecture header table.
    Header,
    /// Zero padding between bodies.
    Padding,
    /// Architecture body copy.
    Body,
}

impl fmt::Display for WritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePhase::Header => f.write_str("header"),
            WritePhase::Padding => f.write_str("padding"),
            WritePhase::Body => f.write_str("body"),
        }
    }
}
