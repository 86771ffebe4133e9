//! Main application for the Video Downloader GUI

// egui view driving the controller
mod app;
// Settings file
mod config;
// Single active download plus history, on behalf of the view
mod controller;
// yt-dlp client behind the MediaFetchClient trait
mod downloader;
// Error types
mod error;
// SQLite download history
mod history;
// Data models shared across modules
mod model;
// Progress-line parsing and the display reducer
mod progress;
// Quality presets and yt-dlp format selection
mod quality;
// Thumbnail fetching module
mod thumbnail;
// Background download task with cancellation
mod worker;

#[cfg(test)]
mod testing;

use std::sync::Arc;

// eframe/egui for GUI application framework
use eframe::egui::Visuals;
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

use app::DownloaderApp;
use config::AppConfig;
use controller::Controller;
use downloader::YtDlpClient;
use history::HistoryStore;

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Program entry point: initializes logging, runtime and history, then launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load();
    let runtime = RUNTIME.get_or_try_init(Runtime::new)?;

    let store = HistoryStore::open(&config.history_path)?;
    info!(path = %store.path().display(), "history database ready");

    let client = Arc::new(YtDlpClient::new(&config.ytdlp_path));
    let controller = Controller::new(client, store, runtime.handle().clone(), &config);
    let handle = runtime.handle().clone();

    // Configure default native options for egui window
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Video Downloader",
        options,
        Box::new(move |cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::new(controller, handle))
        }),
    )?;
    Ok(())
}
