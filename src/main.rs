#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

mod viewer;

use clap::Parser;
use jsonl_lens::cli::Args;
use viewer::JsonlViewer;

fn main() -> Result<(), eframe::Error> {
    env_logger::init();

    let args = Args::parse();
    let mut app = JsonlViewer::new(args.config());
    match args.startup_file() {
        Some(path) => app.open_file(path),
        None => {
            if let Some(path) = &args.file {
                log::warn!("Ignoring missing file {}", path.display());
            }
        }
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([600.0, 400.0])
            .with_title("JSONL Lens"),
        ..Default::default()
    };

    eframe::run_native(
        "JSONL Lens",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Ok(Box::new(app))
        }),
    )
}
