//! Command-line interface for unifat.
//!
//! A lipo-like frontend for creating, inspecting, thinning and editing
//! Mach-O fat (universal) files.

use clap::{Parser, Subcommand};
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::NamedTempFile;
use unifat::{Error, FatArch, FatFile, FatWriter, Magic};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "unifat")]
#[command(about = "Mach-O fat (universal) file tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fat file from thin objects, static archives or fat files
    Create {
        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Write the 64-bit fat header layout
        #[arg(long)]
        fat64: bool,

        /// Leave arm64 out of the declared count when armv7 is present
        #[arg(long)]
        hide_arm64: bool,
    },

    /// Print the architectures of a file on one line
    Info {
        input: PathBuf,
    },

    /// Print the fat header and every architecture record
    DetailedInfo {
        input: PathBuf,
    },

    /// Print architecture names only
    Archs {
        input: PathBuf,
    },

    /// Exit successfully only if every named architecture is present
    VerifyArch {
        input: PathBuf,

        #[arg(required = true)]
        arches: Vec<String>,
    },

    /// Copy one architecture out of a fat file as a thin file
    Thin {
        input: PathBuf,

        /// Architecture to keep, e.g. arm64
        #[arg(long)]
        arch: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a fat file with only the named architectures
    Extract {
        input: PathBuf,

        /// Architectures to keep
        #[arg(long = "arch", required = true)]
        arches: Vec<String>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Write the 64-bit fat header layout
        #[arg(long)]
        fat64: bool,
    },

    /// Write a fat file without the named architectures
    Remove {
        input: PathBuf,

        /// Architectures to drop
        #[arg(long = "arch", required = true)]
        arches: Vec<String>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Write the 64-bit fat header layout
        #[arg(long)]
        fat64: bool,
    },
}

fn main() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Create {
            inputs,
            output,
            fat64,
            hide_arm64,
        } => {
            let maps = inputs.iter().map(|p| map_file(p)).collect::<CliResult<Vec<_>>>()?;
            let mut arches = Vec::new();
            for (path, map) in inputs.iter().zip(&maps) {
                arches.extend(describe_input(path, map)?);
            }

            let writer = FatWriter::new().fat64(fat64).hide_arm64(hide_arm64);
            write_staged(&output, |out| {
                writer.create(out, arches)?;
                Ok(())
            })?;
        }
        Command::Info { input } => {
            let map = map_file(&input)?;
            match FatFile::parse(&map) {
                Ok(fat) => println!(
                    "Architectures in the fat file: {} are: {}",
                    input.display(),
                    names(&fat.arches)
                ),
                Err(Error::Thin) => println!(
                    "Non-fat file: {} is architecture: {}",
                    input.display(),
                    FatArch::from_bytes(&map)?.name()
                ),
                Err(e) => return Err(e.into()),
            }
        }
        Command::DetailedInfo { input } => {
            let map = map_file(&input)?;
            let fat = FatFile::parse(&map)?;
            print_detailed(&input, &fat);
        }
        Command::Archs { input } => {
            let map = map_file(&input)?;
            match FatFile::parse(&map) {
                Ok(fat) => println!("{}", names(&fat.arches)),
                Err(Error::Thin) => println!("{}", FatArch::from_bytes(&map)?.name()),
                Err(e) => return Err(e.into()),
            }
        }
        Command::VerifyArch { input, arches } => {
            let map = map_file(&input)?;
            let present = match FatFile::parse(&map) {
                Ok(fat) => fat.arches,
                Err(Error::Thin) => vec![FatArch::from_bytes(&map)?],
                Err(e) => return Err(e.into()),
            };
            let all_present = arches.iter().all(|name| {
                present.iter().any(|a| {
                    unifat::cpu::arch_matches(name, a.header.cpu_type, a.header.cpu_subtype)
                })
            });
            if !all_present {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Thin {
            input,
            arch,
            output,
        } => {
            let map = map_file(&input)?;
            let fat = FatFile::parse(&map)?;
            let found = fat
                .find(&arch)
                .ok_or_else(|| Error::ArchNotFound(arch.clone()))?;
            let body = found.read_body()?;
            write_staged(&output, |out| {
                out.write_all(&body)?;
                Ok(())
            })?;
        }
        Command::Extract {
            input,
            arches,
            output,
            fat64,
        } => {
            let map = map_file(&input)?;
            let fat = FatFile::parse(&map)?;
            require_present(&fat, &arches)?;
            rewrite(&output, fat, fat64, |a| is_named(a, &arches))?;
        }
        Command::Remove {
            input,
            arches,
            output,
            fat64,
        } => {
            let map = map_file(&input)?;
            let fat = FatFile::parse(&map)?;
            require_present(&fat, &arches)?;
            rewrite(&output, fat, fat64, |a| !is_named(a, &arches))?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Memory-map an input file.
fn map_file(path: &Path) -> CliResult<Mmap> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Architectures an input contributes: every architecture of a fat file, or
/// the input itself as one thin object or archive.
fn describe_input<'a>(path: &Path, map: &'a Mmap) -> CliResult<Vec<FatArch<'a>>> {
    match FatFile::parse(map) {
        Ok(fat) => Ok(fat.arches),
        Err(Error::Thin) => Ok(vec![FatArch::from_bytes(map)?]),
        Err(Error::Format(msg)) => match FatArch::from_bytes(map) {
            Ok(arch) => Ok(vec![arch]),
            Err(_) => Err(format!("{}: {}", path.display(), msg).into()),
        },
        Err(e) => Err(e.into()),
    }
}

fn names(arches: &[FatArch<'_>]) -> String {
    arches
        .iter()
        .map(|a| a.name())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_named(arch: &FatArch<'_>, names: &[String]) -> bool {
    names
        .iter()
        .any(|n| unifat::cpu::arch_matches(n, arch.header.cpu_type, arch.header.cpu_subtype))
}

fn require_present(fat: &FatFile<'_>, names: &[String]) -> CliResult<()> {
    match names.iter().find(|n| fat.find(n).is_none()) {
        Some(missing) => Err(Error::ArchNotFound(missing.clone()).into()),
        None => Ok(()),
    }
}

/// Write the selected architectures of `fat` as a new fat file, keeping its
/// header layout and hidden arm64 convention.
fn rewrite(
    output: &Path,
    fat: FatFile<'_>,
    fat64: bool,
    keep: impl Fn(&FatArch<'_>) -> bool,
) -> CliResult<()> {
    let writer = FatWriter::new()
        .fat64(fat64 || fat.header.magic == Magic::Fat64)
        .hide_arm64(fat.has_hidden());
    let arches: Vec<_> = fat.arches.into_iter().filter(|a| keep(a)).collect();

    write_staged(output, |out| {
        writer.create(out, arches)?;
        Ok(())
    })
}

/// Write through a temp file next to `output`, moved into place on success.
fn write_staged(output: &Path, write: impl FnOnce(&mut File) -> CliResult<()>) -> CliResult<()> {
    let dir = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.persist(output)?;
    Ok(())
}

fn print_detailed(input: &Path, fat: &FatFile<'_>) {
    let magic = fat.header.magic.to_u32();
    println!("Fat header in: {}", input.display());
    println!("fat_magic {:#x}", magic);
    println!("nfat_arch {}", fat.header.nfat_arch);
    for arch in &fat.arches {
        let hdr = &arch.header;
        let hidden = if arch.hidden { " (hidden)" } else { "" };
        println!("architecture {}{}", arch.name(), hidden);
        println!("    cputype {}", hdr.cpu_type);
        println!(
            "    cpusubtype {}",
            unifat::cpu::masked_subtype(hdr.cpu_subtype)
        );
        println!(
            "    capabilities {:#x}",
            hdr.cpu_subtype & unifat::cpu::SUBTYPE_CAPABILITY_MASK
        );
        println!("    offset {}", hdr.offset);
        println!("    size {}", hdr.size);
        println!("    align 2^{} ({})", hdr.align, 1u64 << hdr.align.min(63));
    }
}
