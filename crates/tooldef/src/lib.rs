//! High-level facade for the `tooldef-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core, capture and format crates;
//! - [`build`]: static marker capture -> tool definition file;
//! - [`convert`]: tool definition file -> another format;
//! - JSON capture/config files and safe tool file writing;
//! - (feature `cli`) the `tooldef` command-line tool.
//!
//! ## Quickstart
//!
//! ```no_run
//! use tooldef::{build, write_tool_file, CaptureFile, MakeConfig, ToolFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let capture = CaptureFile::load_json("capture.json")?;
//! let out = build(&capture.frames, ToolFormat::Rom, "probe", Some(4), &MakeConfig::default())?;
//! for warning in &out.file.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! write_tool_file("probe.rom", &out.file)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `tooldef::core`: points, frames, [`ToolGeometry`], rigid-body normalisation.
//! - `tooldef::capture`: marker correspondence and averaging over frames.
//! - `tooldef::formats`: `ini`, `json` and `rom` codecs.

pub use tooldef_capture as capture;
pub use tooldef_core as core;
pub use tooldef_formats as formats;

pub use tooldef_capture::{CaptureError, CaptureParams, Reduction};
pub use tooldef_core::{
    init_with_level, level_for_verbosity, Frame, GeometryError, NormalizeParams, Point3D,
    ReferenceFrameConvention, ToolFormat, ToolGeometry,
};
pub use tooldef_formats::{codec_for, ConversionWarning, FormatError, RomOptions, ToolFile};

#[cfg(feature = "tracing")]
pub use tooldef_core::init_tracing;

mod converter;
mod error;
mod io;
mod maker;

pub use converter::{convert, ConvertOptions};
pub use error::ToolError;
pub use io::{format_of, read_tool_file, write_tool_file, CaptureFile, MakeConfig};
pub use maker::{build, BuildReport, ToolBuild};
