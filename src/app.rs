//! egui front-end: renders [`Controller`] state and turns clicks into intents.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use eframe::{egui, App, Frame};
use egui::{ColorImage, RichText, TextureHandle, TextureOptions};
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use tokio::runtime::Handle;
use tracing::error;

use crate::{
    controller::{Controller, Notice},
    model::{DownloadOutcome, HistoryStatus},
    quality::Quality,
    thumbnail,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Download,
    History,
}

enum Thumbnail {
    None,
    Loading(String),
    Ready(TextureHandle),
    Failed,
}

/// Actions collected while drawing the history list, applied afterwards
enum HistoryAction {
    Reuse(String),
    OpenFolder(PathBuf),
    Delete(i64),
}

pub struct DownloaderApp {
    controller: Controller,
    runtime: Handle,
    tab: Tab,
    thumbnail: Thumbnail,
    /// Finished thumbnail fetches (url, image)
    thumbnail_results: Arc<Mutex<Vec<(String, Option<ColorImage>)>>>,
    last_tick: Instant,
}

impl DownloaderApp {
    pub fn new(controller: Controller, runtime: Handle) -> Self {
        Self {
            controller,
            runtime,
            tab: Tab::Download,
            thumbnail: Thumbnail::None,
            thumbnail_results: Arc::new(Mutex::new(Vec::new())),
            last_tick: Instant::now(),
        }
    }

    fn handle_notice(&mut self, ctx: &egui::Context, notice: Notice) {
        match notice {
            Notice::ThumbnailAvailable(url) => {
                self.thumbnail = Thumbnail::Loading(url.clone());
                let results = Arc::clone(&self.thumbnail_results);
                let ctx = ctx.clone();
                self.runtime.spawn_blocking(move || {
                    let image = thumbnail::fetch_thumbnail(&url);
                    if let Ok(mut pending) = results.lock() {
                        pending.push((url, image));
                    }
                    ctx.request_repaint();
                });
            }
            Notice::Finished(DownloadOutcome::Success { metadata, .. }) => {
                MessageDialog::new()
                    .set_level(MessageLevel::Info)
                    .set_title("Download Complete")
                    .set_description(&format!("Video '{}' downloaded successfully!", metadata.title))
                    .set_buttons(MessageButtons::Ok)
                    .show();
            }
            Notice::Finished(DownloadOutcome::Failure { message }) => {
                MessageDialog::new()
                    .set_level(MessageLevel::Error)
                    .set_title("Download Failed")
                    .set_description(&message)
                    .set_buttons(MessageButtons::Ok)
                    .show();
            }
            Notice::Finished(DownloadOutcome::Cancelled) => {}
        }
    }

    fn drain_thumbnails(&mut self, ctx: &egui::Context) {
        let Ok(mut pending) = self.thumbnail_results.lock() else {
            return;
        };
        for (url, image) in pending.drain(..) {
            // Drop results for a thumbnail that is no longer on screen
            if !matches!(&self.thumbnail, Thumbnail::Loading(current) if *current == url) {
                continue;
            }
            self.thumbnail = match image {
                Some(image) => Thumbnail::Ready(ctx.load_texture(&url, image, TextureOptions::default())),
                None => Thumbnail::Failed,
            };
        }
    }

    fn download_tab(&mut self, ui: &mut egui::Ui) {
        let busy = self.controller.is_busy();

        ui.group(|ui| {
            ui.label(RichText::new("Video URL").strong());
            ui.add_enabled(
                !busy,
                egui::TextEdit::singleline(&mut self.controller.draft.url)
                    .hint_text("Enter video link...")
                    .desired_width(f32::INFINITY),
            );
        });

        ui.group(|ui| {
            ui.label(RichText::new("Video Information").strong());
            ui.horizontal(|ui| {
                match &self.thumbnail {
                    Thumbnail::Ready(tex) => {
                        ui.add(egui::Image::new(tex).max_size(egui::vec2(180.0, 100.0)));
                    }
                    Thumbnail::Loading(_) => {
                        ui.label("Loading...");
                    }
                    Thumbnail::Failed => {
                        ui.label("Failed to load thumbnail");
                    }
                    Thumbnail::None => {
                        ui.label("No thumbnail available");
                    }
                }
                ui.vertical(|ui| match self.controller.metadata() {
                    Some(meta) => {
                        ui.label(RichText::new(&meta.title).strong());
                        ui.label(format!("Uploader: {}", meta.uploader));
                        ui.label(format!("Views: {}", meta.view_count));
                        ui.label(format!("Duration: {}", meta.duration));
                        let description = if meta.description.is_empty() { "No description" } else { &meta.description };
                        egui::ScrollArea::vertical().max_height(80.0).show(ui, |ui| {
                            ui.label(description);
                        });
                    }
                    None => {
                        ui.label("Paste a link and press Start Download");
                    }
                });
            });
        });

        ui.group(|ui| {
            ui.label(RichText::new("Download Options").strong());
            ui.add_enabled_ui(!busy, |ui| {
                ui.horizontal(|ui| {
                    egui::ComboBox::from_label("Quality")
                        .selected_text(self.controller.draft.quality.label())
                        .show_ui(ui, |ui| {
                            for q in Quality::ALL {
                                ui.selectable_value(&mut self.controller.draft.quality, q, q.label());
                            }
                        });
                });
                ui.horizontal(|ui| {
                    ui.label("Save to:");
                    ui.text_edit_singleline(&mut self.controller.draft.output_directory);
                    if ui.button("Browse…").clicked() {
                        if let Some(folder) = FileDialog::new()
                            .set_directory(&self.controller.draft.output_directory)
                            .pick_folder()
                        {
                            self.controller.draft.output_directory = folder.display().to_string();
                        }
                    }
                });
            });
        });

        ui.group(|ui| {
            ui.label(RichText::new("Download Progress").strong());
            let progress = self.controller.display();
            ui.horizontal(|ui| {
                ui.label(RichText::new(progress.percent_label()).strong());
                if busy {
                    ui.label(format!("Download speed: {}", progress.speed_label));
                }
                let eta = progress.eta_label();
                if !eta.is_empty() {
                    ui.label(eta);
                }
            });
            ui.add(egui::ProgressBar::new(progress.percent as f32 / 100.0));
        });

        ui.horizontal(|ui| {
            if ui.add_enabled(!busy, egui::Button::new("Start Download")).clicked() {
                match self.controller.start() {
                    Ok(()) => {
                        self.thumbnail = Thumbnail::None;
                        self.last_tick = Instant::now();
                    }
                    Err(err) => {
                        MessageDialog::new()
                            .set_level(MessageLevel::Warning)
                            .set_title("Input Error")
                            .set_description(&err.to_string())
                            .set_buttons(MessageButtons::Ok)
                            .show();
                    }
                }
            }
            if ui.add_enabled(busy, egui::Button::new("Cancel Download")).clicked() {
                self.controller.cancel();
            }
        });
    }

    fn history_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Refresh").clicked() {
                self.controller.refresh_history();
            }
            if self.controller.history_pending() {
                ui.spinner();
            }
            let has_entries = !self.controller.history().is_empty();
            if ui.add_enabled(has_entries, egui::Button::new("Clear All")).clicked() {
                let confirmed = MessageDialog::new()
                    .set_level(MessageLevel::Warning)
                    .set_title("Clear History")
                    .set_description("Remove every entry from the download history?")
                    .set_buttons(MessageButtons::YesNo)
                    .show();
                if confirmed {
                    self.controller.clear_history();
                }
            }
        });
        ui.separator();

        if self.controller.history().is_empty() {
            ui.centered_and_justified(|ui| ui.label("No download history yet"));
            return;
        }

        let mut actions = Vec::new();
        egui::ScrollArea::vertical().auto_shrink([false; 2]).show(ui, |ui| {
            for record in self.controller.history() {
                ui.group(|ui| {
                    ui.label(RichText::new(&record.title).strong());
                    ui.label(format!(
                        "Uploader: {}  |  Views: {}  |  Duration: {}",
                        record.uploader, record.view_count, record.duration
                    ));
                    let status = match record.status {
                        HistoryStatus::Completed => "✅ Completed",
                        HistoryStatus::Failed => "❌ Failed",
                    };
                    ui.label(format!(
                        "{}  |  {}  |  {}",
                        record.quality,
                        status,
                        record.created_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
                    ));
                    ui.horizontal(|ui| {
                        if ui.button("Reuse").clicked() {
                            actions.push(HistoryAction::Reuse(record.url.clone()));
                        }
                        if ui.button("Open Folder").clicked() {
                            actions.push(HistoryAction::OpenFolder(PathBuf::from(&record.output_path)));
                        }
                        if ui.add(egui::Button::new("Delete").fill(egui::Color32::DARK_RED)).clicked() {
                            actions.push(HistoryAction::Delete(record.id));
                        }
                    });
                });
            }
        });

        for action in actions {
            match action {
                HistoryAction::Reuse(url) => {
                    self.controller.reuse(&url);
                    self.tab = Tab::Download;
                }
                HistoryAction::OpenFolder(path) => open_folder(&path),
                HistoryAction::Delete(id) => self.controller.delete_history_item(id),
            }
        }
    }
}

/// Opens the folder containing `path` in the platform file manager
fn open_folder(path: &Path) {
    let folder = if path.is_dir() { path.to_path_buf() } else { path.parent().unwrap_or(path).to_path_buf() };
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let result = std::process::Command::new("explorer").arg(&folder).spawn();
        #[cfg(target_os = "macos")]
        let result = std::process::Command::new("open").arg(&folder).spawn();
        #[cfg(all(unix, not(target_os = "macos")))]
        let result = std::process::Command::new("xdg-open").arg(&folder).spawn();

        if let Err(err) = result {
            error!(folder = %folder.display(), %err, "could not open folder");
        }
    });
}

impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // 1️⃣ Apply worker events and react to the one-shot notices
        for notice in self.controller.poll() {
            self.handle_notice(ctx, notice);
        }
        // 2️⃣ Handle completed thumbnail fetches
        self.drain_thumbnails(ctx);

        // 3️⃣ Count the ETA down once per second between samples
        if self.last_tick.elapsed() >= Duration::from_secs(1) {
            self.controller.tick();
            self.last_tick = Instant::now();
        }

        // 4️⃣ Header with tab switcher, status bar, then the active tab
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Video Downloader");
                ui.separator();
                ui.selectable_value(&mut self.tab, Tab::Download, "Download");
                ui.selectable_value(&mut self.tab, Tab::History, "History");
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.small(self.controller.status());
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.small(concat!("v", env!("CARGO_PKG_VERSION")));
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.tab {
            Tab::Download => self.download_tab(ui),
            Tab::History => self.history_tab(ui),
        });

        // Keep polling while a download or a history job is in flight
        if self.controller.is_busy() || self.controller.history_pending() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}
