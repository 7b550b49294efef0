use crate::assets::AppSettings;
use crate::channel::{self, ChannelEvent};
use crate::crop::CropSession;
use crate::editor::{self, EditSession, SceneCanvas, SceneObject};
use crate::export;
use crate::geometry::DragAction;
use crate::raster;
use crate::services::prompt::{self, PromptLanguage};
use crate::services::removebg;
use crate::slices::{GridSpec, SliceStore};
use eframe::egui;
use egui::{Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, TextureHandle, TextureOptions, Vec2};
use image::RgbaImage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;

// ============================================================================
// ASYNC JOB PIPELINE — background work with channel completion
// ============================================================================

/// Result delivered from a background worker thread. Workers never touch app
/// state directly; everything funnels through this enum and is applied on
/// the UI thread between frames.
pub enum JobResult {
    /// An image was decoded and is ready to become the working image.
    ImageLoaded { raster: RgbaImage, label: String },
    /// Image decoding failed.
    LoadFailed(String),
    /// Export archive written to disk.
    ExportDone { path: PathBuf, count: usize },
    ExportFailed(String),
    /// Background removal finished for a slice's editor session. Applied
    /// only if that session is still open; discarded otherwise.
    BackgroundRemoved { slice_id: String, raster: RgbaImage },
    BackgroundRemoveFailed(String),
    /// Prompt generation finished (already mapped to display text).
    PromptReady(String),
}

/// Which prompt the helper panel is showing.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PromptTab {
    LineStyle,
    BlindBox,
    Ai,
}

/// Grid presets offered as one-click buttons.
const GRID_PRESETS: &[(u32, u32)] = &[(3, 3), (4, 4), (4, 6), (3, 8)];

const ACCENT: Color32 = Color32::from_rgb(99, 102, 241);
const ACCENT_SOFT: Color32 = Color32::from_rgba_premultiplied(99, 102, 241, 160);
const MODIFIED_BADGE: Color32 = Color32::from_rgb(245, 158, 11);

pub struct GridCutApp {
    // Image state
    original_image: Option<RgbaImage>,
    working_image: Option<RgbaImage>,
    image_label: String,

    // Slicing state
    grid: GridSpec,
    store: SliceStore,

    // Dialogs
    crop_session: Option<CropSession>,
    edit_session: Option<EditSession>,
    settings_open: bool,

    // Prompt helper
    prompt_tab: PromptTab,
    prompt_topic: String,
    prompt_language: PromptLanguage,
    ai_prompt: String,

    // Busy flags — gate re-entrant triggers of the same operation
    is_loading: bool,
    is_zipping: bool,
    is_removing_bg: bool,
    is_generating: bool,

    // Textures (UI thread only)
    preview_texture: Option<TextureHandle>,
    preview_dirty: bool,
    slice_textures: HashMap<String, TextureHandle>,
    crop_texture: Option<TextureHandle>,
    editor_texture: Option<TextureHandle>,
    editor_dirty: bool,

    // Status line: message + is_error
    status: Option<(String, bool)>,

    // Settings + collaborators
    settings: AppSettings,
    font: Option<ab_glyph::FontArc>,

    // Job plumbing
    job_tx: mpsc::Sender<JobResult>,
    job_rx: mpsc::Receiver<JobResult>,
    channel_rx: Option<mpsc::Receiver<ChannelEvent>>,
}

impl GridCutApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = AppSettings::load();
        let (job_tx, job_rx) = mpsc::channel();

        // Import channel: companion tools push images in while we run.
        let channel_rx = match channel::start_listener(
            settings.channel_port,
            settings.allowed_origins.clone(),
        ) {
            Ok(rx) => Some(rx),
            Err(e) => {
                crate::log_warn!(
                    "Import channel unavailable on port {}: {}",
                    settings.channel_port,
                    e
                );
                None
            }
        };
        // Readiness handshake for whoever launched us, when configured.
        if let Ok(endpoint) = std::env::var("GRIDCUT_OPENER") {
            channel::send_ready_handshake(&endpoint);
        }

        let font = editor::find_editor_font(&settings.editor_font_path);
        if font.is_none() {
            crate::log_warn!("No editor font found; the text tool is disabled");
        }

        let grid = settings.default_grid();
        Self {
            original_image: None,
            working_image: None,
            image_label: String::new(),
            grid,
            store: SliceStore::new(),
            crop_session: None,
            edit_session: None,
            settings_open: false,
            prompt_tab: PromptTab::LineStyle,
            prompt_topic: String::new(),
            prompt_language: PromptLanguage::English,
            ai_prompt: String::new(),
            is_loading: false,
            is_zipping: false,
            is_removing_bg: false,
            is_generating: false,
            preview_texture: None,
            preview_dirty: false,
            slice_textures: HashMap::new(),
            crop_texture: None,
            editor_texture: None,
            editor_dirty: false,
            status: None,
            settings,
            font,
            job_tx,
            job_rx,
            channel_rx,
        }
    }

    // ------------------------------------------------------------------
    //  State transitions
    // ------------------------------------------------------------------

    fn set_status(&mut self, msg: impl Into<String>, is_error: bool) {
        let msg = msg.into();
        if is_error {
            crate::log_err!("{}", msg);
        } else {
            crate::log_info!("{}", msg);
        }
        self.status = Some((msg, is_error));
    }

    /// Install a new source image: becomes both the original (crop input)
    /// and the working image, and cuts a fresh slice generation.
    fn install_image(&mut self, raster: RgbaImage, label: String) {
        self.original_image = Some(raster.clone());
        self.image_label = label;
        self.set_working_image(raster);
    }

    /// Replace only the working image (post-crop, post-pad) and reslice.
    fn set_working_image(&mut self, raster: RgbaImage) {
        self.working_image = Some(raster);
        self.preview_dirty = true;
        self.regenerate_slices();
    }

    /// Cut a fresh generation from the current working image + grid. Any
    /// slice edits die with the old generation.
    fn regenerate_slices(&mut self) {
        let Some(image) = self.working_image.clone() else {
            self.store.clear();
            self.slice_textures.clear();
            return;
        };
        match self.store.regenerate(&image, self.grid) {
            Ok(()) => {
                self.slice_textures.clear();
                self.edit_session = None;
                crate::log_info!(
                    "Sliced {}x{} into {} cells ({}x{})",
                    image.width(),
                    image.height(),
                    self.store.len(),
                    self.grid.rows,
                    self.grid.cols
                );
            }
            Err(e) => self.set_status(format!("Slicing failed: {}", e), true),
        }
    }

    fn set_grid(&mut self, grid: GridSpec) {
        if grid == self.grid {
            return;
        }
        self.grid = grid;
        self.settings.default_rows = grid.rows;
        self.settings.default_cols = grid.cols;
        self.settings.save();
        self.regenerate_slices();
    }

    // ------------------------------------------------------------------
    //  Background jobs
    // ------------------------------------------------------------------

    fn spawn_load(&mut self, path: PathBuf) {
        if self.is_loading {
            return;
        }
        self.is_loading = true;
        let tx = self.job_tx.clone();
        std::thread::spawn(move || {
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let result = match raster::load_path(&path) {
                Ok(raster) => JobResult::ImageLoaded { raster, label },
                Err(e) => JobResult::LoadFailed(e.to_string()),
            };
            let _ = tx.send(result);
        });
    }

    fn spawn_export(&mut self, path: PathBuf) {
        if self.is_zipping || self.store.is_empty() {
            return;
        }
        self.is_zipping = true;
        let slices = self.store.slices().to_vec();
        let grid = self.grid;
        let tx = self.job_tx.clone();
        std::thread::spawn(move || {
            let result = export::export_all(&slices, grid)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    std::fs::write(&path, &bytes).map_err(|e| e.to_string())?;
                    Ok(slices.len())
                });
            let _ = tx.send(match result {
                Ok(count) => JobResult::ExportDone { path, count },
                Err(e) => JobResult::ExportFailed(e),
            });
        });
    }

    fn spawn_remove_bg(&mut self) {
        if self.is_removing_bg {
            return;
        }
        let Some(session) = &self.edit_session else { return };
        let Some(raster) = session.canvas.image_raster().cloned() else {
            self.set_status("Select an image object first", true);
            return;
        };
        let api_key = self.settings.remove_bg_api_key.clone();
        if api_key.trim().is_empty() {
            self.set_status("Configure a remove.bg API key in Settings first", true);
            return;
        }
        self.is_removing_bg = true;
        let slice_id = session.slice_id.clone();
        let tx = self.job_tx.clone();
        std::thread::spawn(move || {
            let result = match removebg::remove_background(&raster, &api_key) {
                Ok(raster) => JobResult::BackgroundRemoved { slice_id, raster },
                Err(e) => JobResult::BackgroundRemoveFailed(e.to_string()),
            };
            let _ = tx.send(result);
        });
    }

    fn spawn_prompt_generation(&mut self) {
        if self.is_generating || self.prompt_topic.trim().is_empty() {
            return;
        }
        // Missing credential short-circuits to the hint — the service is
        // never called and no error surfaces.
        if self.settings.prompt_api_key.trim().is_empty() {
            self.ai_prompt = prompt::FALLBACK_NO_KEY.to_string();
            self.prompt_tab = PromptTab::Ai;
            return;
        }
        self.is_generating = true;
        self.prompt_tab = PromptTab::Ai;
        let topic = self.prompt_topic.clone();
        let language = self.prompt_language;
        let api_key = self.settings.prompt_api_key.clone();
        let tx = self.job_tx.clone();
        std::thread::spawn(move || {
            let text = match prompt::generate(&topic, language, &api_key) {
                Ok(text) => text,
                Err(e) => {
                    crate::log_warn!("Prompt generation failed: {}", e);
                    prompt::FALLBACK_FAILED.to_string()
                }
            };
            let _ = tx.send(JobResult::PromptReady(text));
        });
    }

    fn poll_jobs(&mut self) {
        while let Ok(result) = self.job_rx.try_recv() {
            match result {
                JobResult::ImageLoaded { raster, label } => {
                    self.is_loading = false;
                    let dims = format!("{}x{}", raster.width(), raster.height());
                    self.install_image(raster, label.clone());
                    self.set_status(format!("Loaded {} ({})", label, dims), false);
                }
                JobResult::LoadFailed(e) => {
                    self.is_loading = false;
                    self.set_status(format!("Open failed: {}", e), true);
                }
                JobResult::ExportDone { path, count } => {
                    self.is_zipping = false;
                    self.set_status(
                        format!("Exported {} slices to {}", count, path.display()),
                        false,
                    );
                }
                JobResult::ExportFailed(e) => {
                    self.is_zipping = false;
                    self.set_status(format!("Export failed: {}", e), true);
                }
                JobResult::BackgroundRemoved { slice_id, raster } => {
                    self.is_removing_bg = false;
                    // Apply only if the same editor session is still open;
                    // a late result for a closed dialog is simply dropped.
                    match &mut self.edit_session {
                        Some(session) if session.slice_id == slice_id => {
                            session.canvas.replace_image_raster(raster);
                            self.editor_dirty = true;
                            self.set_status("Background removed", false);
                        }
                        _ => crate::log_info!("Discarding remove-bg result for closed editor"),
                    }
                }
                JobResult::BackgroundRemoveFailed(e) => {
                    self.is_removing_bg = false;
                    self.set_status(format!("Background removal failed: {}", e), true);
                }
                JobResult::PromptReady(text) => {
                    self.is_generating = false;
                    self.ai_prompt = text;
                }
            }
        }
    }

    fn poll_import_channel(&mut self) {
        let mut imported = None;
        if let Some(rx) = &self.channel_rx {
            while let Ok(event) = rx.try_recv() {
                match event {
                    ChannelEvent::ImportImage(raster) => imported = Some(raster),
                }
            }
        }
        if let Some(raster) = imported {
            let dims = format!("{}x{}", raster.width(), raster.height());
            self.install_image(raster, "imported image".to_string());
            self.set_status(format!("Image imported via channel ({})", dims), false);
        }
    }

    // ------------------------------------------------------------------
    //  Input paths: dialog, drag-and-drop, clipboard
    // ------------------------------------------------------------------

    fn open_image_dialog(&mut self) {
        let picked = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "bmp"])
            .add_filter("All Files", &["*"])
            .pick_file();
        if let Some(path) = picked {
            self.spawn_load(path);
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        let Some(file) = dropped.into_iter().next() else { return };
        if let Some(path) = file.path {
            self.spawn_load(path);
        } else if let Some(bytes) = file.bytes {
            match raster::load_bytes(&bytes) {
                Ok(raster) => {
                    self.install_image(raster, file.name.clone());
                    self.set_status(format!("Loaded {}", file.name), false);
                }
                Err(e) => self.set_status(format!("Open failed: {}", e), true),
            }
        }
    }

    fn handle_clipboard_paste(&mut self, ctx: &egui::Context) {
        // Leave Ctrl+V alone while a text field has focus.
        if ctx.wants_keyboard_input() {
            return;
        }
        let pasted = ctx.input(|i| i.modifiers.command && i.key_pressed(egui::Key::V));
        if !pasted {
            return;
        }
        let image = arboard::Clipboard::new().and_then(|mut cb| cb.get_image());
        match image {
            Ok(img) => {
                let (w, h) = (img.width as u32, img.height as u32);
                match RgbaImage::from_raw(w, h, img.bytes.into_owned()) {
                    Some(raster) => {
                        self.install_image(raster, "clipboard image".to_string());
                        self.set_status(format!("Pasted {}x{} from clipboard", w, h), false);
                    }
                    None => self.set_status("Clipboard image had unexpected layout", true),
                }
            }
            Err(arboard::Error::ContentNotAvailable) => {}
            Err(e) => self.set_status(format!("Paste failed: {}", e), true),
        }
    }

    // ------------------------------------------------------------------
    //  Texture helpers
    // ------------------------------------------------------------------

    fn texture_from(ctx: &egui::Context, name: &str, raster: &RgbaImage) -> TextureHandle {
        let color_image = egui::ColorImage::from_rgba_unmultiplied(
            [raster.width() as usize, raster.height() as usize],
            raster.as_raw(),
        );
        ctx.load_texture(name, color_image, TextureOptions::LINEAR)
    }

    fn preview_texture(&mut self, ctx: &egui::Context) -> Option<TextureHandle> {
        if self.preview_dirty {
            self.preview_texture = self
                .working_image
                .as_ref()
                .map(|img| Self::texture_from(ctx, "working_image", img));
            self.preview_dirty = false;
        }
        self.preview_texture.clone()
    }

    fn slice_texture(&mut self, ctx: &egui::Context, id: &str) -> Option<TextureHandle> {
        if let Some(tex) = self.slice_textures.get(id) {
            return Some(tex.clone());
        }
        let slice = self.store.get(id)?;
        let tex = Self::texture_from(ctx, &format!("slice_{}", id), &slice.current);
        self.slice_textures.insert(id.to_string(), tex.clone());
        Some(tex)
    }

    // ------------------------------------------------------------------
    //  Panels
    // ------------------------------------------------------------------

    fn top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("GridCut");
                ui.label(
                    egui::RichText::new("sticker grid slicer")
                        .small()
                        .color(ui.visuals().weak_text_color()),
                );
                ui.separator();
                if ui
                    .add_enabled(!self.is_loading, egui::Button::new("Open image…"))
                    .clicked()
                {
                    self.open_image_dialog();
                }
                if ui.button("Settings").clicked() {
                    self.settings_open = true;
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.working_image.is_some() {
                        ui.colored_label(Color32::from_rgb(16, 185, 129), "● ready");
                    }
                    if self.is_loading {
                        ui.spinner();
                    }
                });
            });
        });
    }

    fn status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match &self.status {
                    Some((msg, true)) => {
                        ui.colored_label(ui.visuals().error_fg_color, msg);
                    }
                    Some((msg, false)) => {
                        ui.label(msg);
                    }
                    None => {
                        ui.weak("Open, paste or drop an image to start");
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if let Some(path) = crate::logger::log_path() {
                        ui.weak(format!("log: {}", path.display()));
                    }
                });
            });
        });
    }

    fn controls_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("controls")
            .resizable(false)
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                ui.strong("Layout");
                ui.add_space(4.0);

                // Quick presets
                ui.horizontal_wrapped(|ui| {
                    for &(r, c) in GRID_PRESETS {
                        let selected = self.grid == GridSpec::new(r, c);
                        if ui
                            .selectable_label(selected, format!("{}x{}", r, c))
                            .clicked()
                        {
                            self.set_grid(GridSpec::new(r, c));
                        }
                    }
                });
                ui.add_space(6.0);

                // Custom rows/cols with swap in between
                let mut rows = self.grid.rows;
                let mut cols = self.grid.cols;
                let mut swap = false;
                ui.horizontal(|ui| {
                    ui.label("Rows");
                    ui.add(egui::DragValue::new(&mut rows).clamp_range(1..=GridSpec::UI_MAX));
                    if ui.button("⇄").on_hover_text("Swap rows and columns").clicked() {
                        swap = true;
                    }
                    ui.label("Cols");
                    ui.add(egui::DragValue::new(&mut cols).clamp_range(1..=GridSpec::UI_MAX));
                });
                if swap {
                    self.set_grid(self.grid.swapped());
                } else {
                    self.set_grid(GridSpec::new(rows, cols));
                }

                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    let has_image = self.original_image.is_some();
                    if ui
                        .add_enabled(has_image, egui::Button::new("Re-crop…"))
                        .clicked()
                        && let Some(original) = &self.original_image
                    {
                        self.crop_session =
                            Some(CropSession::open(original.width(), original.height()));
                    }
                    if ui
                        .add_enabled(has_image, egui::Button::new("Pad to square"))
                        .on_hover_text("Center the image on a transparent square canvas")
                        .clicked()
                        && let Some(working) = &self.working_image
                    {
                        let padded = raster::pad_to_square(working);
                        self.set_working_image(padded);
                    }
                });

                ui.separator();
                self.prompt_panel(ui, ctx);
            });
    }

    fn prompt_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.strong("AI prompt helper");
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            ui.selectable_value(&mut self.prompt_tab, PromptTab::LineStyle, "Line style");
            ui.selectable_value(&mut self.prompt_tab, PromptTab::BlindBox, "3D blind box");
            ui.selectable_value(&mut self.prompt_tab, PromptTab::Ai, "AI");
        });

        let content = match self.prompt_tab {
            PromptTab::LineStyle => prompt::PRESET_LINE_STYLE.to_string(),
            PromptTab::BlindBox => prompt::PRESET_BLIND_BOX.to_string(),
            PromptTab::Ai => self.ai_prompt.clone(),
        };

        egui::ScrollArea::vertical()
            .id_source("prompt_scroll")
            .max_height(140.0)
            .show(ui, |ui| {
                let placeholder = "Generated prompt will appear here…";
                let shown = if content.is_empty() { placeholder } else { &content };
                ui.add(egui::Label::new(egui::RichText::new(shown).monospace().small()).wrap(true));
            });

        ui.horizontal(|ui| {
            if ui
                .add_enabled(!content.is_empty(), egui::Button::new("Copy"))
                .clicked()
            {
                ctx.output_mut(|o| o.copied_text = content.clone());
                self.set_status("Prompt copied to clipboard", false);
            }
            ui.selectable_value(&mut self.prompt_language, PromptLanguage::English, "EN");
            ui.selectable_value(&mut self.prompt_language, PromptLanguage::Chinese, "中文");
        });

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut self.prompt_topic)
                    .hint_text("Topic, e.g. pixel art dog")
                    .desired_width(160.0),
            );
            let can_generate = !self.is_generating && !self.prompt_topic.trim().is_empty();
            if ui
                .add_enabled(can_generate, egui::Button::new("Generate"))
                .clicked()
            {
                self.spawn_prompt_generation();
            }
            if self.is_generating {
                ui.spinner();
            }
        });
    }

    fn central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            if self.working_image.is_none() {
                ui.centered_and_justified(|ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(ui.available_height() * 0.35);
                        ui.heading("Click or drag an image here");
                        ui.label("JPG, PNG, WebP or BMP — high-res 16:9 or 1:1 recommended");
                        ui.add_space(8.0);
                        if ui.button("Open image…").clicked() {
                            self.open_image_dialog();
                        }
                    });
                });
                return;
            }

            egui::ScrollArea::vertical().show(ui, |ui| {
                self.preview_section(ui, ctx);
                ui.add_space(10.0);
                self.slices_section(ui, ctx);
            });
        });
    }

    /// Working-image preview with grid overlay lines.
    fn preview_section(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let Some(texture) = self.preview_texture(ctx) else { return };
        let (img_w, img_h) = match &self.working_image {
            Some(img) => (img.width() as f32, img.height() as f32),
            None => return,
        };

        let avail_w = ui.available_width() - 16.0;
        let scale = (avail_w / img_w).min(420.0 / img_h).min(1.0);
        let size = Vec2::new(img_w * scale, img_h * scale);

        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new(format!("{} — {}x{} px", self.image_label, img_w, img_h))
                    .small(),
            );
        });

        let (rect, _) = ui.allocate_exact_size(size, Sense::hover());
        let painter = ui.painter_at(rect);
        painter.image(
            texture.id(),
            rect,
            Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
            Color32::WHITE,
        );

        // Grid overlay: cols-1 vertical, rows-1 horizontal division lines.
        let stroke = Stroke::new(1.0, ACCENT_SOFT);
        for c in 1..self.grid.cols {
            let x = rect.left() + rect.width() * c as f32 / self.grid.cols as f32;
            painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
        }
        for r in 1..self.grid.rows {
            let y = rect.top() + rect.height() * r as f32 / self.grid.rows as f32;
            painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
        }
    }

    /// Numbered slice thumbnails + export action.
    fn slices_section(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        if self.store.is_empty() {
            return;
        }

        ui.horizontal(|ui| {
            ui.strong(format!(
                "{} slices ({} rows x {} cols)",
                self.store.len(),
                self.grid.rows,
                self.grid.cols
            ));
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                // Disabled while an export is in flight: two concurrent
                // exports over a mutating store would race.
                let label = if self.is_zipping { "Zipping…" } else { "Export zip" };
                if ui
                    .add_enabled(!self.is_zipping, egui::Button::new(label))
                    .clicked()
                {
                    let picked = rfd::FileDialog::new()
                        .set_file_name(export::archive_file_name(self.grid))
                        .add_filter("Zip archive", &["zip"])
                        .save_file();
                    if let Some(path) = picked {
                        self.spawn_export(path);
                    }
                }
                if self.is_zipping {
                    ui.spinner();
                }
            });
        });
        ui.add_space(6.0);

        let thumb = 96.0;
        let cols = self.grid.cols as usize;
        let ids: Vec<String> = self.store.slices().iter().map(|s| s.id.clone()).collect();

        let mut clicked_id = None;
        egui::Grid::new("slice_grid").spacing([6.0, 6.0]).show(ui, |ui| {
            for (i, id) in ids.iter().enumerate() {
                let modified = self.store.get(id).map(|s| s.modified).unwrap_or(false);
                let Some(texture) = self.slice_texture(ctx, id) else { continue };

                let (rect, response) =
                    ui.allocate_exact_size(Vec2::splat(thumb), Sense::click());
                let painter = ui.painter_at(rect);
                painter.rect_filled(rect, 4.0, ui.visuals().extreme_bg_color);
                painter.image(
                    texture.id(),
                    fit_rect(rect, texture.aspect_ratio()),
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );
                let border = if modified {
                    MODIFIED_BADGE
                } else if response.hovered() {
                    ACCENT
                } else {
                    ui.visuals().widgets.noninteractive.bg_stroke.color
                };
                painter.rect_stroke(rect, 4.0, Stroke::new(1.0, border));
                painter.text(
                    rect.left_top() + Vec2::new(4.0, 2.0),
                    Align2::LEFT_TOP,
                    format!("#{}", i + 1),
                    FontId::proportional(11.0),
                    Color32::WHITE,
                );
                let response = response.on_hover_text("Click to edit this slice");
                if response.clicked() {
                    clicked_id = Some(id.clone());
                }

                if (i + 1) % cols == 0 {
                    ui.end_row();
                }
            }
        });

        if let Some(id) = clicked_id
            && let Some(slice) = self.store.get(&id)
        {
            self.edit_session = Some(EditSession::open(slice, self.font.clone()));
            self.editor_dirty = true;
        }
    }

    // ------------------------------------------------------------------
    //  Crop dialog
    // ------------------------------------------------------------------

    fn crop_dialog(&mut self, ctx: &egui::Context) {
        if self.crop_session.is_none() {
            return;
        }
        let Some(original) = self.original_image.clone() else {
            self.crop_session = None;
            return;
        };
        // The crop dialog always works from the original image, so repeated
        // crops never compound.
        if self.crop_texture.is_none() {
            self.crop_texture = Some(Self::texture_from(ctx, "crop_source", &original));
        }
        let Some(texture) = self.crop_texture.clone() else { return };
        let Some(session) = self.crop_session.as_mut() else { return };

        let (img_w, img_h) = (original.width() as f32, original.height() as f32);
        let grid = self.grid;
        let mut confirmed = false;
        let mut cancelled = false;

        egui::Window::new("Crop image")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                let display_scale = (640.0 / img_w).min(440.0 / img_h).min(1.0);
                let size = Vec2::new(img_w * display_scale, img_h * display_scale);
                let to_image = raster::display_scale(img_w, size.x);

                let (canvas, _) = ui.allocate_exact_size(size, Sense::hover());
                let painter = ui.painter_at(canvas);
                painter.image(
                    texture.id(),
                    canvas,
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );

                let crop = session.rect();
                let crop_screen = Rect::from_min_size(
                    canvas.left_top()
                        + Vec2::new(crop.x / to_image, crop.y / to_image),
                    Vec2::new(crop.width / to_image, crop.height / to_image),
                );

                // Dim everything outside the crop box.
                let shade = Color32::from_black_alpha(140);
                for outside in [
                    Rect::from_min_max(canvas.left_top(), Pos2::new(canvas.right(), crop_screen.top())),
                    Rect::from_min_max(Pos2::new(canvas.left(), crop_screen.bottom()), canvas.right_bottom()),
                    Rect::from_min_max(Pos2::new(canvas.left(), crop_screen.top()), Pos2::new(crop_screen.left(), crop_screen.bottom())),
                    Rect::from_min_max(Pos2::new(crop_screen.right(), crop_screen.top()), Pos2::new(canvas.right(), crop_screen.bottom())),
                ] {
                    if outside.is_positive() {
                        painter.rect_filled(outside, 0.0, shade);
                    }
                }
                painter.rect_stroke(crop_screen, 0.0, Stroke::new(1.0, Color32::WHITE));

                // Grid guides matching the current rows/cols.
                let guide = Stroke::new(1.0, ACCENT_SOFT);
                for c in 1..grid.cols {
                    let x = crop_screen.left() + crop_screen.width() * c as f32 / grid.cols as f32;
                    painter.line_segment([Pos2::new(x, crop_screen.top()), Pos2::new(x, crop_screen.bottom())], guide);
                }
                for r in 1..grid.rows {
                    let y = crop_screen.top() + crop_screen.height() * r as f32 / grid.rows as f32;
                    painter.line_segment([Pos2::new(crop_screen.left(), y), Pos2::new(crop_screen.right(), y)], guide);
                }

                // Gesture plumbing: body + 4 edges + 4 corners. Screen drag
                // deltas are converted to image pixels before the session
                // sees them.
                let handles = crop_handles(crop_screen);
                for (n, (handle_rect, action, cursor)) in handles.into_iter().enumerate() {
                    let id = ui.id().with("crop_handle").with(n);
                    let response = ui.interact(handle_rect, id, Sense::drag());
                    let response = response.on_hover_cursor(cursor);
                    if response.drag_started() {
                        session.begin(action);
                    }
                    if response.dragged() {
                        let delta = response.drag_delta();
                        if session.drag(delta.x * to_image, delta.y * to_image) {
                            ui.ctx().request_repaint();
                        }
                    }
                    if response.drag_released() {
                        session.end();
                    }
                    // Visible corner knobs
                    if matches!(
                        action,
                        DragAction::NorthWest | DragAction::NorthEast | DragAction::SouthWest | DragAction::SouthEast
                    ) {
                        painter.rect_filled(handle_rect.shrink(2.0), 1.0, ACCENT);
                    }
                }

                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    ui.weak("Drag the box to move, edges and corners to resize");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Confirm crop").clicked() {
                            confirmed = true;
                        }
                        if ui.button("Cancel").clicked() {
                            cancelled = true;
                        }
                    });
                });
            });

        if confirmed
            && let Some(session) = self.crop_session.take()
        {
            self.crop_texture = None;
            let rect = session.commit();
            match raster::extract(&original, &rect) {
                Ok(cropped) => {
                    let dims = format!("{}x{}", cropped.width(), cropped.height());
                    self.set_working_image(cropped);
                    self.set_status(format!("Cropped to {}", dims), false);
                }
                Err(e) => self.set_status(format!("Crop failed: {}", e), true),
            }
        } else if cancelled {
            // Cancel discards the session; the working image is untouched.
            self.crop_session = None;
            self.crop_texture = None;
        }
    }

    // ------------------------------------------------------------------
    //  Editor dialog
    // ------------------------------------------------------------------

    fn editor_dialog(&mut self, ctx: &egui::Context) {
        if self.edit_session.is_none() {
            return;
        }

        let mut close = false;
        let mut save = false;
        let mut reset = false;
        let mut add_text = false;
        let mut remove_bg = false;
        let mut download = false;

        egui::Window::new("Slice editor")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.horizontal_top(|ui| {
                    // Tool column
                    ui.vertical(|ui| {
                        ui.set_width(110.0);
                        let Some(session) = self.edit_session.as_mut() else { return };
                        let has_font = session.canvas.has_font();
                        if ui
                            .add_enabled(has_font, egui::Button::new("Add text"))
                            .on_disabled_hover_text("No usable font found on this system")
                            .clicked()
                        {
                            add_text = true;
                        }
                        let bg_label = if self.is_removing_bg { "Removing…" } else { "Remove BG" };
                        if ui
                            .add_enabled(!self.is_removing_bg, egui::Button::new(bg_label))
                            .clicked()
                        {
                            remove_bg = true;
                        }
                        if ui.button("Reset").on_hover_text("Back to the untouched slice").clicked() {
                            reset = true;
                        }
                        ui.separator();

                        // Selected-object controls
                        match session.canvas.selected_mut() {
                            Some(SceneObject::Image { scale, .. }) => {
                                ui.label("Scale");
                                let mut value = *scale;
                                if ui
                                    .add(egui::Slider::new(&mut value, 0.05..=3.0).show_value(false))
                                    .changed()
                                {
                                    *scale = value;
                                    self.editor_dirty = true;
                                }
                            }
                            Some(SceneObject::Text { content, size, .. }) => {
                                ui.label("Text");
                                if ui.text_edit_singleline(content).changed() {
                                    self.editor_dirty = true;
                                }
                                let mut value = *size;
                                if ui
                                    .add(egui::Slider::new(&mut value, 8.0..=120.0).show_value(false))
                                    .changed()
                                {
                                    *size = value;
                                    self.editor_dirty = true;
                                }
                            }
                            None => {
                                ui.weak("Click an object to select it");
                            }
                        }
                    });

                    // Stage
                    self.editor_stage(ui);
                });

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Download PNG").clicked() {
                        download = true;
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Save changes").clicked() {
                            save = true;
                        }
                        if ui.button("Cancel").clicked() {
                            close = true;
                        }
                    });
                });
            });

        if add_text
            && let Some(session) = &mut self.edit_session
            && session.canvas.add_text()
        {
            self.editor_dirty = true;
        }
        if reset
            && let Some(session) = &mut self.edit_session
        {
            session.reset();
            self.editor_dirty = true;
        }
        if remove_bg {
            self.spawn_remove_bg();
        }
        if download {
            self.download_single_slice();
        }
        if save
            && let Some(session) = self.edit_session.take()
        {
            let (preview, state) = session.save();
            self.store.replace(&session.slice_id, preview, Some(state));
            self.slice_textures.remove(&session.slice_id);
            self.set_status("Slice saved", false);
        } else if close {
            // Closing discards the session; any in-flight remove-bg result
            // for it will be dropped on arrival.
            self.edit_session = None;
        }
    }

    /// The 500x500 editing stage: checkerboard, rendered scene, drag-to-move.
    fn editor_stage(&mut self, ui: &mut egui::Ui) {
        let stage_px = editor::STAGE_SIZE as f32;
        let (rect, response) =
            ui.allocate_exact_size(Vec2::splat(stage_px), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        // Transparency checkerboard
        let cell = 20.0;
        let mut y = 0.0;
        let mut row = 0;
        while y < stage_px {
            let mut x = if row % 2 == 0 { 0.0 } else { cell };
            while x < stage_px {
                painter.rect_filled(
                    Rect::from_min_size(
                        rect.left_top() + Vec2::new(x, y),
                        Vec2::splat(cell.min(stage_px - x).min(stage_px - y)),
                    ),
                    0.0,
                    Color32::from_gray(229),
                );
                x += cell * 2.0;
            }
            y += cell;
            row += 1;
        }

        if self.editor_dirty {
            if let Some(session) = &self.edit_session {
                self.editor_texture = Some(Self::texture_from(
                    ui.ctx(),
                    "editor_stage",
                    &session.canvas.export_raster(),
                ));
            }
            self.editor_dirty = false;
        }
        if let Some(texture) = &self.editor_texture {
            painter.image(
                texture.id(),
                rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }

        let Some(session) = &mut self.edit_session else { return };

        // Selection outline
        if let Some(index) = session.canvas.selected_index()
            && let Some(obj) = session.canvas.objects().get(index)
        {
            let (w, h, cx, cy) = object_screen_bounds(obj, rect);
            painter.rect_stroke(
                Rect::from_center_size(Pos2::new(cx, cy), Vec2::new(w, h)),
                2.0,
                Stroke::new(1.5, ACCENT),
            );
        }

        // Click selects; drag moves the selected object.
        if response.drag_started() || response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let local = pos - rect.left_top();
                let hit = session.canvas.hit_test(local.x, local.y);
                session.canvas.select(hit);
            }
        }
        if response.dragged() {
            let delta = response.drag_delta();
            if delta != Vec2::ZERO {
                session.canvas.move_selected(delta.x, delta.y);
                self.editor_dirty = true;
            }
        }
    }

    /// Save the open editor's flattened stage as a standalone PNG.
    fn download_single_slice(&mut self) {
        let Some(session) = &self.edit_session else { return };
        let picked = rfd::FileDialog::new()
            .set_file_name(format!("edited_{}.png", session.slice_id))
            .add_filter("PNG image", &["png"])
            .save_file();
        let Some(path) = picked else { return };

        let raster = session.canvas.export_raster();
        let result = raster::encode_png(&raster)
            .map_err(|e| e.to_string())
            .and_then(|png| std::fs::write(&path, png).map_err(|e| e.to_string()));
        match result {
            Ok(()) => self.set_status(format!("Saved {}", path.display()), false),
            Err(e) => self.set_status(format!("Save failed: {}", e), true),
        }
    }

    // ------------------------------------------------------------------
    //  Settings dialog
    // ------------------------------------------------------------------

    fn settings_dialog(&mut self, ctx: &egui::Context) {
        if !self.settings_open {
            return;
        }
        let mut open = self.settings_open;
        let mut changed = false;

        egui::Window::new("Settings")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("remove.bg API key");
                changed |= ui
                    .add(egui::TextEdit::singleline(&mut self.settings.remove_bg_api_key).password(true))
                    .changed();
                ui.add_space(4.0);
                ui.label("Prompt API key");
                changed |= ui
                    .add(egui::TextEdit::singleline(&mut self.settings.prompt_api_key).password(true))
                    .changed();
                ui.add_space(4.0);
                ui.label("Editor font path (optional)");
                changed |= ui
                    .text_edit_singleline(&mut self.settings.editor_font_path)
                    .changed();
                ui.add_space(8.0);
                ui.weak(format!(
                    "Import channel: 127.0.0.1:{} — trusted origins configured in {}",
                    self.settings.channel_port,
                    AppSettings::settings_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "the settings file".to_string())
                ));
            });

        if changed {
            self.settings.save();
            self.font = editor::find_editor_font(&self.settings.editor_font_path);
        }
        self.settings_open = open;
    }
}

impl eframe::App for GridCutApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_jobs();
        self.poll_import_channel();
        self.handle_dropped_files(ctx);
        self.handle_clipboard_paste(ctx);

        self.top_bar(ctx);
        self.status_bar(ctx);
        self.controls_panel(ctx);
        self.central_panel(ctx);

        self.crop_dialog(ctx);
        self.editor_dialog(ctx);
        self.settings_dialog(ctx);

        // Pending background work or an open channel may complete without
        // any input event — keep polling at a gentle cadence.
        if self.is_loading || self.is_zipping || self.is_removing_bg || self.is_generating {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        } else if self.channel_rx.is_some() {
            ctx.request_repaint_after(std::time::Duration::from_millis(500));
        }
    }
}

// ---------------------------------------------------------------------------
//  Small geometry helpers for the UI layer
// ---------------------------------------------------------------------------

/// Largest aspect-preserving rect centered inside `outer`.
fn fit_rect(outer: Rect, aspect: f32) -> Rect {
    let mut size = outer.size();
    if size.x / size.y > aspect {
        size.x = size.y * aspect;
    } else {
        size.y = size.x / aspect;
    }
    Rect::from_center_size(outer.center(), size)
}

/// Screen-space bounds of an editor object, given the stage rect (stage is
/// drawn 1:1, so this is a pure translation).
fn object_screen_bounds(obj: &SceneObject, stage: Rect) -> (f32, f32, f32, f32) {
    let (w, h, cx, cy) = match obj {
        SceneObject::Image { raster, x, y, scale } => (
            raster.width() as f32 * scale,
            raster.height() as f32 * scale,
            *x,
            *y,
        ),
        SceneObject::Text { content, size, x, y, .. } => {
            // Approximation good enough for a selection outline.
            (content.len() as f32 * size * 0.55, *size * 1.2, *x, *y)
        }
    };
    (w, h, stage.left() + cx, stage.top() + cy)
}

/// Hit rects for the crop gestures: body first, then edges, then corners
/// (corners come last so their hit areas sit on top visually).
fn crop_handles(crop: Rect) -> Vec<(Rect, DragAction, egui::CursorIcon)> {
    use egui::CursorIcon;
    let edge = 8.0;
    let corner = 14.0;
    vec![
        (crop.shrink(edge), DragAction::Move, CursorIcon::Move),
        (
            Rect::from_center_size(crop.center_top(), Vec2::new(crop.width() - corner, edge * 2.0)),
            DragAction::North,
            CursorIcon::ResizeVertical,
        ),
        (
            Rect::from_center_size(crop.center_bottom(), Vec2::new(crop.width() - corner, edge * 2.0)),
            DragAction::South,
            CursorIcon::ResizeVertical,
        ),
        (
            Rect::from_center_size(crop.left_center(), Vec2::new(edge * 2.0, crop.height() - corner)),
            DragAction::West,
            CursorIcon::ResizeHorizontal,
        ),
        (
            Rect::from_center_size(crop.right_center(), Vec2::new(edge * 2.0, crop.height() - corner)),
            DragAction::East,
            CursorIcon::ResizeHorizontal,
        ),
        (
            Rect::from_center_size(crop.left_top(), Vec2::splat(corner)),
            DragAction::NorthWest,
            CursorIcon::ResizeNwSe,
        ),
        (
            Rect::from_center_size(crop.right_top(), Vec2::splat(corner)),
            DragAction::NorthEast,
            CursorIcon::ResizeNeSw,
        ),
        (
            Rect::from_center_size(crop.left_bottom(), Vec2::splat(corner)),
            DragAction::SouthWest,
            CursorIcon::ResizeNeSw,
        ),
        (
            Rect::from_center_size(crop.right_bottom(), Vec2::splat(corner)),
            DragAction::SouthEast,
            CursorIcon::ResizeNwSe,
        ),
    ]
}
