//! Application entry point for the river delta viewer.
//!
//! This binary installs the logger, sets up eframe/egui and delegates all
//! interactive logic and rendering to [`Viewer`] from the `viewer` module.

mod random_series;
mod viewer;

use viewer::Viewer;

/// Starts the native eframe application.
///
/// Logging goes through `env_logger`, filtered by `RUST_LOG` and showing
/// `info` and above by default.
///
/// ### Returns
/// - `Ok(())` if the application runs to completion without errors.
/// - `Err` if eframe fails to create the native window or event loop, or
///   the initial simulation cannot be built.
fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = eframe::NativeOptions::default();

    eframe::run_native(
        "River Delta",
        options,
        Box::new(|_cc| Ok(Box::new(Viewer::new()?))),
    )
}
