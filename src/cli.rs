// ============================================================================
// GridCut CLI — headless slicing via command-line arguments
// ============================================================================
//
// Usage examples:
//   gridcut --input sheet.png --rows 4 --cols 6
//   gridcut -i sheet.png -r 3 -c 3 --output stickers.zip
//   gridcut -i sheet.jpg --crop 100,50,800,800 --rows 4 --cols 4
//   gridcut -i tall.png --pad-square --rows 3 --cols 3
//
// No window is opened in CLI mode. Load → optional crop → optional square
// padding → slice → zip, all synchronously on the current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::export;
use crate::geometry::Rect;
use crate::raster;
use crate::slices::{GridSpec, SliceStore};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// GridCut headless slicer.
///
/// Split an image into a grid of PNG slices packaged as one zip — no GUI
/// required.
#[derive(Parser, Debug)]
#[command(
    name = "gridcut",
    about = "GridCut headless grid slicer",
    long_about = "Split an image into rows x cols PNG slices and package them\n\
                  as a zip archive without opening the GUI.\n\n\
                  Example:\n  \
                  gridcut --input sheet.png --rows 4 --cols 6 --output stickers.zip\n  \
                  gridcut -i sheet.png --crop 100,50,800,800 -r 3 -c 3"
)]
pub struct CliArgs {
    /// Input image file (PNG, JPEG, WEBP, BMP).
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Number of grid rows.
    #[arg(short, long, default_value_t = 4)]
    pub rows: u32,

    /// Number of grid columns.
    #[arg(short, long, default_value_t = 6)]
    pub cols: u32,

    /// Output zip path. Defaults to a timestamped name next to the input.
    #[arg(short, long, value_name = "FILE.zip")]
    pub output: Option<PathBuf>,

    /// Crop the image before slicing: X,Y,WIDTH,HEIGHT in source pixels.
    #[arg(long, value_name = "X,Y,W,H")]
    pub crop: Option<String>,

    /// Pad the (cropped) image to a centered transparent square first.
    #[arg(long)]
    pub pad_square: bool,

    /// Print per-step timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process
    /// arguments. Used by `main()` to route before creating a window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the headless pipeline and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    match run_inner(&args) {
        Ok(path) => {
            println!(
                "{} -> {} ({} slices, {:.0}ms)",
                args.input.display(),
                path.display(),
                args.rows * args.cols,
                start.elapsed().as_secs_f64() * 1000.0
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_inner(args: &CliArgs) -> Result<PathBuf, String> {
    if args.rows < 1 || args.cols < 1 {
        return Err(format!("grid must be at least 1x1, got {}x{}", args.rows, args.cols));
    }

    // -- Step 1: Load ----------------------------------------------------
    let step = Instant::now();
    let mut image = raster::load_path(&args.input).map_err(|e| format!("load failed: {}", e))?;
    if args.verbose {
        println!(
            "  loaded {}x{} ({:.0}ms)",
            image.width(),
            image.height(),
            step.elapsed().as_secs_f64() * 1000.0
        );
    }

    // -- Step 2: Optional crop -------------------------------------------
    if let Some(spec) = &args.crop {
        let rect = parse_crop(spec)?;
        image = raster::extract(&image, &rect).map_err(|e| format!("crop failed: {}", e))?;
        if args.verbose {
            println!("  cropped to {}x{}", image.width(), image.height());
        }
    }

    // -- Step 3: Optional square padding ---------------------------------
    if args.pad_square {
        image = raster::pad_to_square(&image);
        if args.verbose {
            println!("  padded to {}x{}", image.width(), image.height());
        }
    }

    // -- Step 4: Slice + package -----------------------------------------
    let grid = GridSpec::new(args.rows, args.cols);
    let mut store = SliceStore::new();
    store
        .regenerate(&image, grid)
        .map_err(|e| format!("slicing failed: {}", e))?;
    let bytes =
        export::export_all(store.slices(), grid).map_err(|e| format!("export failed: {}", e))?;

    let output = output_path(&args.input, args.output.as_deref(), grid);
    std::fs::write(&output, &bytes)
        .map_err(|e| format!("could not write '{}': {}", output.display(), e))?;
    Ok(output)
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse an `X,Y,W,H` crop specification into a rectangle.
fn parse_crop(spec: &str) -> Result<Rect, String> {
    let parts: Vec<f32> = spec
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("invalid --crop '{}': expected X,Y,W,H numbers", spec))?;
    let [x, y, w, h] = parts[..] else {
        return Err(format!("invalid --crop '{}': expected exactly 4 values", spec));
    };
    if w <= 0.0 || h <= 0.0 || x < 0.0 || y < 0.0 {
        return Err(format!("invalid --crop '{}': region must be positive", spec));
    }
    Ok(Rect::new(x, y, w, h))
}

/// Explicit `--output` wins; otherwise a timestamped archive name lands next
/// to the input file.
fn output_path(input: &Path, output: Option<&Path>, grid: GridSpec) -> PathBuf {
    if let Some(out) = output {
        return out.to_path_buf();
    }
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(export::archive_file_name(grid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_spec_parses_and_validates() {
        assert_eq!(parse_crop("10, 20, 300,400").unwrap(), Rect::new(10.0, 20.0, 300.0, 400.0));
        assert!(parse_crop("10,20,300").is_err());
        assert!(parse_crop("10,20,-5,400").is_err());
        assert!(parse_crop("a,b,c,d").is_err());
    }

    #[test]
    fn output_defaults_next_to_input() {
        let out = output_path(Path::new("/tmp/sheet.png"), None, GridSpec::new(2, 2));
        assert_eq!(out.parent(), Some(Path::new("/tmp")));
        assert!(out.file_name().unwrap().to_string_lossy().ends_with("_2x2.zip"));

        let explicit = output_path(
            Path::new("/tmp/sheet.png"),
            Some(Path::new("out.zip")),
            GridSpec::new(2, 2),
        );
        assert_eq!(explicit, PathBuf::from("out.zip"));
    }
}
