//! epkg command line tool
//!
//! Builds packages from manifests and inspects existing ones.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use epkg::{Package, REGION_SIZE};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "epkg")]
#[command(about = "Build and inspect epkg asset packages")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a package from a JSON manifest
    Build {
        /// Manifest describing the files to pack
        manifest: PathBuf,

        /// Package to create (replaced if it exists)
        output: PathBuf,
    },

    /// Print the header and every record in chain order
    Inspect { package: PathBuf },

    /// List distinct file names
    List { package: PathBuf },

    /// Write one file's content to stdout or a file
    Extract {
        package: PathBuf,

        name: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the embedded index document
    Index { package: PathBuf },
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn open_existing(path: &Path) -> anyhow::Result<Package> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    Package::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn inspect(package: &Package, out: &mut impl Write) -> anyhow::Result<()> {
    if !package.is_initialized() {
        writeln!(out, "{}: empty package (no header written)", package.path().display())?;
        return Ok(());
    }

    let header = package.header();
    writeln!(out, "Header:")?;
    writeln!(out, "  version:            {}", header.version)?;
    writeln!(out, "  container id:       {}", hex(&header.container_id))?;
    writeln!(out, "  patch source id:    {}", hex(&header.patch_source_id))?;
    writeln!(out, "  first file offset:  {}", header.first_file_offset)?;
    writeln!(out, "  files:              {}", header.num_of_files)?;
    writeln!(
        out,
        "  next region offset: {} (region {})",
        header.next_region_offset,
        header.next_region_offset / REGION_SIZE
    )?;
    writeln!(out, "  next record offset: {}", header.next_record_offset)?;
    writeln!(out)?;
    writeln!(
        out,
        "{:>10}  {:>10}  {:>10}  {:>12}  {:<8}  name",
        "record", "offset", "size", "decompressed", "codec"
    )?;

    for entry in package.records() {
        let (offset, record) = entry?;
        let current = package.resolve(&record.name()) == Some(offset);
        writeln!(
            out,
            "{:>10}  {:>10}  {:>10}  {:>12}  {:<8}  {}{}",
            offset,
            record.offset,
            record.size,
            record.decompressed_size,
            format!("{:?}", record.compression),
            record.name(),
            if current { "" } else { " (shadowed)" }
        )?;
    }

    Ok(())
}

/// Write one file's content to `output`, or to `out` when no path is given
fn extract(
    package: &Package,
    name: &str,
    output: Option<&Path>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let content = package
        .read_file(name)
        .with_context(|| format!("failed to read {name}"))?;
    match output {
        Some(path) => std::fs::write(path, &content)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => out.write_all(&content)?,
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Build { manifest, output } => {
            let package = Package::build_from_manifest(&manifest, &output)
                .with_context(|| format!("failed to build from {}", manifest.display()))?;
            info!(
                "Wrote {} records to {}",
                package.file_count(),
                output.display()
            );
            package.close()?;
        }
        Command::Inspect { package } => {
            let package = open_existing(&package)?;
            inspect(&package, &mut std::io::stdout().lock())?;
        }
        Command::List { package } => {
            let package = open_existing(&package)?;
            for name in package.names() {
                println!("{name}");
            }
        }
        Command::Extract {
            package,
            name,
            output,
        } => {
            let package = open_existing(&package)?;
            extract(
                &package,
                &name,
                output.as_deref(),
                &mut std::io::stdout().lock(),
            )?;
        }
        Command::Index { package } => {
            let package = open_existing(&package)?;
            println!("{}", serde_json::to_string_pretty(package.index())?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_package(dir: &TempDir) -> Package {
        let mut package = Package::open(dir.path().join("cli.epkg")).unwrap();
        package.write_file("config.json", b"{\"v\":1}", false).unwrap();
        package.write_file("logo.png", b"png bytes", true).unwrap();
        package.write_file("config.json", b"{\"v\":2}", false).unwrap();
        package
    }

    #[test]
    fn test_inspect_marks_shadowed_records() {
        let dir = TempDir::new().unwrap();
        let package = sample_package(&dir);

        let mut out = Vec::new();
        inspect(&package, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text
            .lines()
            .any(|line| line.trim_start().starts_with("files:") && line.ends_with(" 3")));
        assert!(text.contains(&hex(&package.header().container_id)));

        let rows: Vec<&str> = text
            .lines()
            .filter(|line| line.contains("config.json") || line.contains("logo.png"))
            .collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].ends_with("config.json (shadowed)"));
        assert!(rows[1].contains("Deflate") && rows[1].ends_with("logo.png"));
        assert!(rows[2].ends_with("config.json"));
    }

    #[test]
    fn test_inspect_empty_package() {
        let dir = TempDir::new().unwrap();
        let package = Package::open(dir.path().join("empty.epkg")).unwrap();

        let mut out = Vec::new();
        inspect(&package, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("empty package"));
    }

    #[test]
    fn test_extract_to_file_and_stream() {
        let dir = TempDir::new().unwrap();
        let package = sample_package(&dir);

        let target = dir.path().join("logo.out");
        let mut unused = Vec::new();
        extract(&package, "logo.png", Some(target.as_path()), &mut unused).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"png bytes");
        assert!(unused.is_empty());

        let mut out = Vec::new();
        extract(&package, "config.json", None, &mut out).unwrap();
        assert_eq!(out, b"{\"v\":2}");

        assert!(extract(&package, "missing", None, &mut out).is_err());
    }

    #[test]
    fn test_open_existing_does_not_create() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.epkg");
        assert!(open_existing(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_parse_extract_args() {
        let args =
            Args::try_parse_from(["epkg", "extract", "a.epkg", "logo.png", "-o", "logo.out"])
                .unwrap();
        match args.command {
            Command::Extract {
                package,
                name,
                output,
            } => {
                assert_eq!(package, PathBuf::from("a.epkg"));
                assert_eq!(name, "logo.png");
                assert_eq!(output, Some(PathBuf::from("logo.out")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
