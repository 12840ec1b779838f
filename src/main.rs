//! Main application for the YouTube Video Downloader GUI

// Settings file
mod config;
// yt-dlp process driver
mod downloader;
// Quality preset -> format selector
mod format;
mod logging;
// Requests, presets and progress values
mod model;
// Validation and the single fetch call
mod orchestrator;
// Progress event decoding and translation
mod progress;
// UI-side state of the current download
mod session;
// Background dispatch
mod worker;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use config::AppConfig;
use downloader::YtDlp;
use eframe::{App, Frame, egui};
use egui::Visuals;
use model::{DownloadPhase, DownloadRequest, Quality};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
use orchestrator::Orchestrator;
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use session::DownloadSession;
use tokio::runtime::{Handle, Runtime};
use tracing::{error, info, warn};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

const APP_TITLE: &str = "YouTube Video Downloader";

fn runtime_handle() -> Option<Handle> {
    RUNTIME.get().map(|rt| rt.handle().clone())
}

/// Program entry point: initializes logging, runtime and settings, then launches the GUI
fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let rt = Runtime::new().context("Failed to start tokio runtime")?;
    RUNTIME
        .set(Arc::new(rt))
        .map_err(|_| anyhow!("runtime already initialized"))?;

    let config = AppConfig::load_or_default();
    info!(download_dir = %config.download_dir.display(), "starting");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(APP_TITLE)
            .with_inner_size([600.0, 400.0]),
        ..Default::default()
    };
    eframe::run_native(
        APP_TITLE,
        options,
        Box::new(move |cc| {
            let visuals = if config.dark_mode {
                Visuals::dark()
            } else {
                Visuals::light()
            };
            cc.egui_ctx.set_visuals(visuals);
            Box::new(DownloaderApp::new(config))
        }),
    )
    .map_err(|e| anyhow!("GUI exited with error: {e}"))
}

/// Application state for the GUI
struct DownloaderApp {
    /// Input field for the video URL
    url_input: String,
    /// Destination folder for downloads
    download_folder: String,
    /// Selected quality option
    selected_quality: Quality,
    /// Settings; folder and quality are written back after a successful download
    config: AppConfig,
    /// Folder and quality of the request in flight
    pending_choices: Option<(PathBuf, Quality)>,
    orchestrator: Arc<Orchestrator<YtDlp>>,
    session: DownloadSession,
    /// Folder of the last dispatched download, for "Open Folder"
    last_folder: Option<PathBuf>,
}

impl DownloaderApp {
    fn new(config: AppConfig) -> Self {
        let fetcher = YtDlp::new(config.ytdlp_path.clone(), config.ffmpeg_location.clone());
        Self {
            url_input: String::new(),
            download_folder: config.download_dir.display().to_string(),
            selected_quality: config.default_quality,
            orchestrator: Arc::new(Orchestrator::new(fetcher)),
            session: DownloadSession::new(),
            last_folder: None,
            pending_choices: None,
            config,
        }
    }

    fn start_download(&mut self) {
        let Some(handle) = runtime_handle() else {
            error!("runtime missing, cannot start download");
            return;
        };
        let folder = PathBuf::from(self.download_folder.trim());
        let request = DownloadRequest::new(&*self.url_input, folder.clone(), self.selected_quality);

        let orchestrator = Arc::clone(&self.orchestrator);
        match self
            .session
            .start(|| worker::spawn_download(&handle, orchestrator, request))
        {
            Ok(()) => {
                self.pending_choices = Some((folder.clone(), self.selected_quality));
                self.last_folder = Some(folder);
            }
            Err(e) => warn!(error = %e, "download button pressed while busy"),
        }
    }

    /// Saves folder and quality once they produced a successful download
    fn finish_request(&mut self, outcome: DownloadPhase) {
        let Some((folder, quality)) = self.pending_choices.take() else {
            return;
        };
        if outcome != DownloadPhase::Succeeded || !self.config.remember(folder, quality) {
            return;
        }
        if let Err(e) = self.config.save() {
            warn!(error = %format!("{e:#}"), "could not save settings");
        }
    }

    fn show_form(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.heading(APP_TITLE);
            ui.add_space(12.0);

            // URL input field
            ui.label("Enter YouTube URL:");
            ui.add(
                egui::TextEdit::singleline(&mut self.url_input)
                    .hint_text("https://www.youtube.com/watch?v=...")
                    .desired_width(500.0),
            );
            ui.add_space(8.0);

            // Folder selection
            ui.horizontal(|ui| {
                ui.add(
                    egui::TextEdit::singleline(&mut self.download_folder)
                        .hint_text("Download location")
                        .desired_width(400.0),
                );
                if ui.button("Browse").clicked() {
                    if let Some(folder) = FileDialog::new()
                        .set_directory(&self.download_folder)
                        .pick_folder()
                    {
                        self.download_folder = folder.display().to_string();
                    }
                }
            });
            ui.add_space(8.0);

            // Quality dropdown
            ui.label("Select Quality:");
            egui::ComboBox::from_id_source("quality")
                .selected_text(self.selected_quality.as_str())
                .width(200.0)
                .show_ui(ui, |ui| {
                    for q in Quality::ALL {
                        ui.selectable_value(&mut self.selected_quality, q, q.as_str());
                    }
                });
            ui.add_space(16.0);

            // Disabled while a download is in flight
            let button = egui::Button::new(egui::RichText::new("Download").size(16.0).strong())
                .min_size(egui::vec2(200.0, 40.0));
            if ui.add_enabled(self.session.trigger_enabled(), button).clicked() {
                self.start_download();
            }
            ui.add_space(12.0);

            let progress = self.session.progress();
            let merging = self.session.phase() == DownloadPhase::PostProcessing;
            ui.add(
                egui::ProgressBar::new(progress.fraction)
                    .desired_width(500.0)
                    .animate(merging),
            );
            ui.label(egui::RichText::new(&progress.label).size(12.0));
            match self.session.last_outcome() {
                Some(DownloadPhase::Succeeded) if self.session.trigger_enabled() => {
                    ui.weak("Last download completed");
                }
                Some(DownloadPhase::Failed) if self.session.trigger_enabled() => {
                    ui.weak("Last download failed");
                }
                _ => {}
            }
        });
    }

    fn show_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.session.notice().cloned() else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new(notice.title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                if notice.is_error {
                    ui.colored_label(ui.visuals().error_fg_color, &notice.message);
                } else {
                    ui.label(&notice.message);
                }
                ui.horizontal(|ui| {
                    if !notice.is_error {
                        if let Some(folder) = &self.last_folder {
                            if ui.button("Open Folder").clicked() {
                                open_folder(folder.clone());
                            }
                        }
                    }
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            });
        if dismissed {
            self.session.dismiss_notice();
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // Apply worker events; the latest progress wins
        if let Some(outcome) = self.session.poll() {
            self.finish_request(outcome);
        }

        let modal = self.session.notice().is_some();
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(!modal, |ui| self.show_form(ui));
        });
        self.show_notice(ctx);

        // Keep polling while the worker is busy
        if !self.session.trigger_enabled() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

/// Opens `folder` in the platform file manager without blocking the UI
fn open_folder(folder: PathBuf) {
    std::thread::spawn(move || {
        let opener = if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        if let Err(e) = std::process::Command::new(opener).arg(&folder).spawn() {
            warn!(error = %e, folder = %folder.display(), "could not open folder");
        }
    });
}
