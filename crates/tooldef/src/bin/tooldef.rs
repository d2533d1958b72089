//! `tooldef`: build and convert optical tracker tool definitions.
//!
//! ```text
//! tooldef make --frames capture.json --name probe -o probe.rom [--markers 4]
//! tooldef convert -i probe.ini [-o probe.json] [--frame centroid]
//! tooldef inspect probe.rom
//! tooldef compare a.rom b.rom [--diff-only]
//! ```
//!
//! Formats are inferred from file extensions (`.ini`, `.json`, `.rom`).

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tooldef::formats::{compare_images, NDI_V1};
use tooldef::{
    build, codec_for, convert, format_of, read_tool_file, write_tool_file, CaptureFile,
    ConvertOptions, MakeConfig, ReferenceFrameConvention, ToolError, ToolFormat, ToolGeometry,
};

#[derive(Parser)]
#[command(name = "tooldef", version)]
#[command(about = "Build and convert optical tracker tool definitions (INI, JSON, NDI ROM)")]
struct Cli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit tracing spans as JSON instead of the plain stderr log
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    trace_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a tool definition from a recorded static capture
    Make(MakeArgs),
    /// Convert a tool definition to another format
    Convert(ConvertArgs),
    /// Print the decoded geometry and fingerprint of a tool definition
    Inspect(InspectArgs),
    /// Print the non-zero bytes of ROM images side by side
    Compare(CompareArgs),
}

#[derive(Args)]
struct MakeArgs {
    /// Capture file: {"frames": [[[x, y, z], ...], ...]}
    #[arg(short, long)]
    frames: PathBuf,

    /// Tool name (ROM part number)
    #[arg(short, long)]
    name: String,

    /// Output tool file; the extension selects the format
    #[arg(short, long)]
    output: PathBuf,

    /// Expected number of markers
    #[arg(short, long)]
    markers: Option<usize>,

    /// JSON config with capture, normalize and rom sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a JSON report of the reduction and normalisation
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input tool file
    #[arg(short, long)]
    input: PathBuf,

    /// Output tool file; JSON on stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Re-normalise into this reference frame (centroid, marker_zero)
    #[arg(long)]
    frame: Option<ReferenceFrameConvention>,
}

#[derive(Args)]
struct InspectArgs {
    /// Tool file to decode
    path: PathBuf,
}

#[derive(Args)]
struct CompareArgs {
    /// ROM images to compare
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Only print offsets where the images differ
    #[arg(long)]
    diff_only: bool,
}

#[derive(Serialize)]
struct Inspection<'a> {
    format: ToolFormat,
    geometry: &'a ToolGeometry,
    fingerprint: Vec<f64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    if cli.trace_json {
        tooldef::init_tracing(true);
        return;
    }
    let _ = tooldef::init_with_level(tooldef::level_for_verbosity(cli.verbose));
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    let _ = tooldef::init_with_level(tooldef::level_for_verbosity(cli.verbose));
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Make(args) => make(args),
        Command::Convert(args) => convert_file(args),
        Command::Inspect(args) => inspect(args),
        Command::Compare(args) => compare(args),
    }
}

fn make(args: MakeArgs) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => MakeConfig::load_json(path)?,
        None => MakeConfig::default(),
    };
    let format = format_of(&args.output)?;
    let capture = CaptureFile::load_json(&args.frames)?;

    let out = build(&capture.frames, format, &args.name, args.markers, &config)?;
    write_tool_file(&args.output, &out.file)?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&out.report())?;
        std::fs::write(path, json).map_err(|source| ToolError::Io {
            path: path.clone(),
            source,
        })?;
    }

    println!(
        "{}: {} markers from {} frames -> {}",
        args.name,
        out.geometry.markers.len(),
        capture.frames.len(),
        args.output.display()
    );
    Ok(())
}

fn convert_file(args: ConvertArgs) -> Result<(), Box<dyn Error>> {
    let (input_format, bytes) = read_tool_file(&args.input)?;
    let options = ConvertOptions {
        target_convention: args.frame,
        ..ConvertOptions::default()
    };

    match &args.output {
        Some(path) => {
            let file = convert(&bytes, input_format, format_of(path)?, &options)?;
            write_tool_file(path, &file)?;
        }
        None => {
            let file = convert(&bytes, input_format, ToolFormat::Json, &options)?;
            std::io::stdout().write_all(&file.bytes)?;
        }
    }
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<(), Box<dyn Error>> {
    let (format, bytes) = read_tool_file(&args.path)?;
    let geometry = codec_for(format).parse(&bytes)?;
    let report = Inspection {
        format,
        fingerprint: geometry.fingerprint(),
        geometry: &geometry,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn compare(args: CompareArgs) -> Result<(), Box<dyn Error>> {
    let images = args
        .paths
        .iter()
        .map(|path| {
            std::fs::read(path).map_err(|source| ToolError::Io {
                path: path.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let slices: Vec<&[u8]> = images.iter().map(Vec::as_slice).collect();

    let mut out = std::io::stdout().lock();
    for (i, path) in args.paths.iter().enumerate() {
        writeln!(out, "# {}: {} ({} bytes)", i + 1, path.display(), images[i].len())?;
    }
    for row in compare_images(&NDI_V1, &slices) {
        if !args.diff_only || row.differs() {
            writeln!(out, "{row}")?;
        }
    }
    Ok(())
}
