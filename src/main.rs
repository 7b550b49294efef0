#![allow(clippy::too_many_arguments)]

use eframe::egui;
use gridcut::app::GridCutApp;
use gridcut::{cli, logger};
use std::process::ExitCode;

fn main() -> ExitCode {
    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        return cli::run(args);
    }

    // -- GUI mode --------------------------------------------------------

    // Initialize session log (overwrites previous session log)
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_title("GridCut"),
        ..Default::default()
    };

    match eframe::run_native(
        "GridCut",
        options,
        Box::new(|cc| Box::new(GridCutApp::new(cc))),
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("GridCut failed to start: {}", e);
            ExitCode::FAILURE
        }
    }
}
