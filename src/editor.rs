// ============================================================================
// SLICE EDITOR — object canvas for per-slice touch-ups
// ============================================================================
//
// The editor stage is a fixed transparent square holding movable, scalable
// objects: the slice raster itself plus any number of text labels. The
// editing-canvas capability is kept behind the `SceneCanvas` trait so the
// stage implementation is swappable; `ObjectCanvas` is the built-in one.

use ab_glyph::{Font, FontArc, ScaleFont, point};
use image::{Rgba, RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Editor stage side length in pixels (square, transparent).
pub const STAGE_SIZE: u32 = 500;
/// Padding kept around a freshly loaded raster when fitting it to the stage.
const FIT_PADDING: f32 = 20.0;
/// Magic header of serialized scenes.
const SCENE_MAGIC: &str = "GCS1";

const DEFAULT_TEXT: &str = "Edit me";
const DEFAULT_TEXT_SIZE: f32 = 40.0;
const DEFAULT_TEXT_COLOR: [u8; 4] = [51, 51, 51, 255];

#[derive(Debug)]
pub enum SceneError {
    InvalidFormat(String),
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneError::InvalidFormat(e) => write!(f, "Invalid scene state: {}", e),
        }
    }
}

impl std::error::Error for SceneError {}

/// The editing-canvas capability the rest of the app depends on: load a
/// raster or a previously saved scene, edit, then export the flattened
/// raster and the serialized scene.
pub trait SceneCanvas {
    fn load_raster(&mut self, raster: &RgbaImage);
    fn load_scene(&mut self, state: &[u8]) -> Result<(), SceneError>;
    fn export_raster(&self) -> RgbaImage;
    fn export_state(&self) -> Vec<u8>;
}

/// One object on the stage. Positions are the object's center in stage
/// coordinates.
#[derive(Clone)]
pub enum SceneObject {
    Image {
        raster: RgbaImage,
        x: f32,
        y: f32,
        scale: f32,
    },
    Text {
        content: String,
        x: f32,
        y: f32,
        size: f32,
        color: [u8; 4],
    },
}

/// On-disk form of a scene. Image pixels are stored PNG-compressed to keep
/// snapshots small.
#[derive(Serialize, Deserialize)]
struct SceneSnapshot {
    magic: String,
    objects: Vec<StoredObject>,
}

#[derive(Serialize, Deserialize)]
enum StoredObject {
    Image { png: Vec<u8>, x: f32, y: f32, scale: f32 },
    Text { content: String, x: f32, y: f32, size: f32, color: [u8; 4] },
}

/// The built-in stage: a flat object list rendered back-to-front, with one
/// selected object the move/scale tools act on.
pub struct ObjectCanvas {
    objects: Vec<SceneObject>,
    selected: Option<usize>,
    font: Option<FontArc>,
}

impl ObjectCanvas {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { objects: Vec::new(), selected: None, font }
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_mut(&mut self) -> Option<&mut SceneObject> {
        self.selected.and_then(|i| self.objects.get_mut(i))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Add a text label at the stage center and select it. Returns false
    /// when no font is available (text tooling disabled).
    pub fn add_text(&mut self) -> bool {
        if self.font.is_none() {
            return false;
        }
        let center = STAGE_SIZE as f32 / 2.0;
        self.objects.push(SceneObject::Text {
            content: DEFAULT_TEXT.to_string(),
            x: center,
            y: center,
            size: DEFAULT_TEXT_SIZE,
            color: DEFAULT_TEXT_COLOR,
        });
        self.selected = Some(self.objects.len() - 1);
        true
    }

    /// Topmost object whose bounds contain the stage-space point.
    pub fn hit_test(&self, px: f32, py: f32) -> Option<usize> {
        for (i, obj) in self.objects.iter().enumerate().rev() {
            let (w, h, cx, cy) = self.object_bounds(obj);
            if (px - cx).abs() <= w / 2.0 && (py - cy).abs() <= h / 2.0 {
                return Some(i);
            }
        }
        None
    }

    pub fn select(&mut self, index: Option<usize>) {
        self.selected = index.filter(|i| *i < self.objects.len());
    }

    /// Translate the selected object, keeping its center on the stage.
    pub fn move_selected(&mut self, dx: f32, dy: f32) {
        let bound = STAGE_SIZE as f32;
        if let Some(obj) = self.selected_mut() {
            let (x, y) = match obj {
                SceneObject::Image { x, y, .. } => (x, y),
                SceneObject::Text { x, y, .. } => (x, y),
            };
            *x = (*x + dx).clamp(0.0, bound);
            *y = (*y + dy).clamp(0.0, bound);
        }
    }

    /// Set the selected object's scale (images) or font size (text).
    pub fn scale_selected(&mut self, factor: f32) {
        if let Some(obj) = self.selected_mut() {
            match obj {
                SceneObject::Image { scale, .. } => *scale = factor.clamp(0.05, 10.0),
                SceneObject::Text { size, .. } => {
                    *size = (DEFAULT_TEXT_SIZE * factor).clamp(8.0, 300.0)
                }
            }
        }
    }

    /// Raster of the first image object, if any (background removal input).
    pub fn image_raster(&self) -> Option<&RgbaImage> {
        self.objects.iter().find_map(|o| match o {
            SceneObject::Image { raster, .. } => Some(raster),
            SceneObject::Text { .. } => None,
        })
    }

    /// Replace the first image object's pixels in place, keeping its
    /// placement (background-removal result swap-in).
    pub fn replace_image_raster(&mut self, new_raster: RgbaImage) {
        if let Some(SceneObject::Image { raster, .. }) = self
            .objects
            .iter_mut()
            .find(|o| matches!(o, SceneObject::Image { .. }))
        {
            *raster = new_raster;
        }
    }

    /// Size and center of an object on the stage.
    fn object_bounds(&self, obj: &SceneObject) -> (f32, f32, f32, f32) {
        match obj {
            SceneObject::Image { raster, x, y, scale } => (
                raster.width() as f32 * scale,
                raster.height() as f32 * scale,
                *x,
                *y,
            ),
            SceneObject::Text { content, size, x, y, .. } => {
                let (w, h) = match &self.font {
                    Some(font) => measure_text(font, content, *size),
                    None => (content.len() as f32 * size * 0.5, *size),
                };
                (w.max(1.0), h.max(1.0), *x, *y)
            }
        }
    }
}

impl SceneCanvas for ObjectCanvas {
    /// Start a fresh scene: the raster fit-centered on the stage with a
    /// padding margin, selected.
    fn load_raster(&mut self, raster: &RgbaImage) {
        let avail = STAGE_SIZE as f32 - FIT_PADDING * 2.0;
        let scale = (avail / raster.width() as f32).min(avail / raster.height() as f32);
        let center = STAGE_SIZE as f32 / 2.0;
        self.objects = vec![SceneObject::Image {
            raster: raster.clone(),
            x: center,
            y: center,
            scale,
        }];
        self.selected = Some(0);
    }

    fn load_scene(&mut self, state: &[u8]) -> Result<(), SceneError> {
        let snapshot: SceneSnapshot = bincode::deserialize(state)
            .map_err(|e| SceneError::InvalidFormat(e.to_string()))?;
        if snapshot.magic != SCENE_MAGIC {
            return Err(SceneError::InvalidFormat(format!(
                "unknown magic '{}'",
                snapshot.magic
            )));
        }

        let mut objects = Vec::with_capacity(snapshot.objects.len());
        for stored in snapshot.objects {
            objects.push(match stored {
                StoredObject::Image { png, x, y, scale } => {
                    let raster = crate::raster::load_bytes(&png)
                        .map_err(|e| SceneError::InvalidFormat(e.to_string()))?;
                    SceneObject::Image { raster, x, y, scale }
                }
                StoredObject::Text { content, x, y, size, color } => {
                    SceneObject::Text { content, x, y, size, color }
                }
            });
        }
        self.selected = if objects.is_empty() { None } else { Some(0) };
        self.objects = objects;
        Ok(())
    }

    /// Flatten the scene back-to-front onto a transparent stage.
    fn export_raster(&self) -> RgbaImage {
        let mut stage = RgbaImage::from_pixel(STAGE_SIZE, STAGE_SIZE, Rgba([0, 0, 0, 0]));
        for obj in &self.objects {
            match obj {
                SceneObject::Image { raster, x, y, scale } => {
                    let w = ((raster.width() as f32 * scale).round() as u32).max(1);
                    let h = ((raster.height() as f32 * scale).round() as u32).max(1);
                    let resized =
                        imageops::resize(raster, w, h, imageops::FilterType::CatmullRom);
                    imageops::overlay(
                        &mut stage,
                        &resized,
                        (*x - w as f32 / 2.0).round() as i64,
                        (*y - h as f32 / 2.0).round() as i64,
                    );
                }
                SceneObject::Text { content, x, y, size, color } => {
                    if let Some(font) = &self.font {
                        draw_text_centered(&mut stage, font, content, *size, *x, *y, *color);
                    }
                }
            }
        }
        stage
    }

    fn export_state(&self) -> Vec<u8> {
        let objects = self
            .objects
            .iter()
            .map(|obj| match obj {
                SceneObject::Image { raster, x, y, scale } => StoredObject::Image {
                    png: crate::raster::encode_png(raster).unwrap_or_default(),
                    x: *x,
                    y: *y,
                    scale: *scale,
                },
                SceneObject::Text { content, x, y, size, color } => StoredObject::Text {
                    content: content.clone(),
                    x: *x,
                    y: *y,
                    size: *size,
                    color: *color,
                },
            })
            .collect();
        let snapshot = SceneSnapshot { magic: SCENE_MAGIC.to_string(), objects };
        bincode::serialize(&snapshot).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
//  Text rasterization
// ---------------------------------------------------------------------------

/// Width/height of a (possibly multi-line) text block at the given size.
fn measure_text(font: &FontArc, text: &str, size: f32) -> (f32, f32) {
    let scaled = font.as_scaled(size);
    let mut max_width = 0.0f32;
    let mut lines = 0u32;
    for line in text.split('\n') {
        lines += 1;
        let mut width = 0.0f32;
        let mut prev = None;
        for ch in line.chars() {
            let id = font.glyph_id(ch);
            if let Some(p) = prev {
                width += scaled.kern(p, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        max_width = max_width.max(width);
    }
    (max_width, lines as f32 * scaled.height())
}

/// Draw a text block centered at `(cx, cy)` with coverage-blended edges.
fn draw_text_centered(
    stage: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    size: f32,
    cx: f32,
    cy: f32,
    color: [u8; 4],
) {
    let scaled = font.as_scaled(size);
    let line_height = scaled.height();
    let (_, block_h) = measure_text(font, text, size);
    let mut baseline_y = cy - block_h / 2.0 + scaled.ascent();

    for line in text.split('\n') {
        let (line_w, _) = measure_text(font, line, size);
        let mut caret_x = cx - line_w / 2.0;
        let mut prev = None;

        for ch in line.chars() {
            let id = font.glyph_id(ch);
            if let Some(p) = prev {
                caret_x += scaled.kern(p, id);
            }
            let glyph = id.with_scale_and_position(size, point(caret_x, baseline_y));
            if let Some(outlined) = font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|gx, gy, coverage| {
                    let px = bounds.min.x as i32 + gx as i32;
                    let py = bounds.min.y as i32 + gy as i32;
                    if px < 0 || py < 0 || px >= stage.width() as i32 || py >= stage.height() as i32
                    {
                        return;
                    }
                    let alpha = (coverage * color[3] as f32) as u32;
                    if alpha == 0 {
                        return;
                    }
                    let dst = stage.get_pixel_mut(px as u32, py as u32);
                    let inv = 255 - alpha.min(255);
                    for c in 0..3 {
                        dst[c] = ((color[c] as u32 * alpha + dst[c] as u32 * inv) / 255) as u8;
                    }
                    dst[3] = (alpha + dst[3] as u32 * inv / 255).min(255) as u8;
                });
            }
            caret_x += scaled.h_advance(id);
            prev = Some(id);
        }
        baseline_y += line_height;
    }
}

/// Locate a usable TTF/OTF for text objects: the configured path first, then
/// common per-platform system fonts. `None` disables the text tool.
pub fn find_editor_font(configured: &str) -> Option<FontArc> {
    let mut candidates: Vec<&str> = Vec::new();
    if !configured.trim().is_empty() {
        candidates.push(configured);
    }
    candidates.extend([
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/noto/NotoSans-Regular.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
        "C:\\Windows\\Fonts\\segoeui.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ]);

    for path in candidates {
        if !Path::new(path).is_file() {
            continue;
        }
        if let Ok(bytes) = std::fs::read(path)
            && let Ok(font) = FontArc::try_from_vec(bytes)
        {
            return Some(font);
        }
    }
    None
}

// ---------------------------------------------------------------------------
//  Edit session
// ---------------------------------------------------------------------------

/// Per-slice editing state while the editor dialog is open. Discarded on
/// close; `save` hands the preview raster and scene snapshot back for the
/// store to swap in.
pub struct EditSession {
    pub slice_id: String,
    source: RgbaImage,
    pub canvas: ObjectCanvas,
}

impl EditSession {
    /// Open over a slice: restore the saved scene when one exists, else fit
    /// the current raster onto a fresh stage.
    pub fn open(slice: &crate::slices::Slice, font: Option<FontArc>) -> Self {
        let mut canvas = ObjectCanvas::new(font);
        match &slice.edit_state {
            Some(state) if canvas.load_scene(state).is_ok() => {}
            _ => canvas.load_raster(&slice.current),
        }
        Self {
            slice_id: slice.id.clone(),
            source: slice.source.clone(),
            canvas,
        }
    }

    /// Reset the stage to the untouched original slice raster.
    pub fn reset(&mut self) {
        let source = self.source.clone();
        self.canvas.load_raster(&source);
    }

    /// Export for saving: the flattened preview and the serialized scene.
    pub fn save(&self) -> (RgbaImage, Vec<u8>) {
        (self.canvas.export_raster(), self.canvas.export_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slices::{GridSpec, SliceStore};
    use image::Rgba;

    fn solid(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
    }

    #[test]
    fn load_raster_fits_and_centers() {
        let mut canvas = ObjectCanvas::new(None);
        canvas.load_raster(&solid(200, 100, 50));
        let [SceneObject::Image { x, y, scale, .. }] = canvas.objects() else {
            panic!("expected one image object");
        };
        assert_eq!((*x, *y), (250.0, 250.0));
        // 460 usable pixels across 200-wide input.
        assert!((scale - 2.3).abs() < 1e-3);
        assert_eq!(canvas.selected_index(), Some(0));
    }

    #[test]
    fn export_raster_is_stage_sized_and_transparent_outside() {
        let mut canvas = ObjectCanvas::new(None);
        canvas.load_raster(&solid(100, 100, 200));
        let out = canvas.export_raster();
        assert_eq!(out.dimensions(), (STAGE_SIZE, STAGE_SIZE));
        // Padding corner stays transparent, center carries the image.
        assert_eq!(out.get_pixel(2, 2)[3], 0);
        assert_eq!(out.get_pixel(250, 250)[3], 255);
    }

    #[test]
    fn scene_snapshot_round_trips() {
        let mut canvas = ObjectCanvas::new(None);
        canvas.load_raster(&solid(64, 64, 77));
        canvas.move_selected(-30.0, 12.5);
        canvas.scale_selected(1.5);

        let state = canvas.export_state();
        let mut restored = ObjectCanvas::new(None);
        restored.load_scene(&state).unwrap();

        let [SceneObject::Image { raster, x, y, scale }] = restored.objects() else {
            panic!("expected one image object");
        };
        assert_eq!(raster.dimensions(), (64, 64));
        assert_eq!((*x, *y), (220.0, 262.5));
        assert_eq!(*scale, 1.5);
    }

    #[test]
    fn load_scene_rejects_foreign_bytes() {
        let mut canvas = ObjectCanvas::new(None);
        assert!(canvas.load_scene(b"not a scene").is_err());

        let bogus = bincode::serialize(&SceneSnapshot {
            magic: "NOPE".to_string(),
            objects: vec![],
        })
        .unwrap();
        assert!(canvas.load_scene(&bogus).is_err());
    }

    #[test]
    fn hit_test_prefers_topmost_object() {
        let mut canvas = ObjectCanvas::new(None);
        canvas.load_raster(&solid(100, 100, 10));
        // A second, smaller image stacked on top at the center.
        canvas.objects.push(SceneObject::Image {
            raster: solid(10, 10, 99),
            x: 250.0,
            y: 250.0,
            scale: 1.0,
        });
        assert_eq!(canvas.hit_test(250.0, 250.0), Some(1));
        assert_eq!(canvas.hit_test(60.0, 250.0), Some(0));
        assert_eq!(canvas.hit_test(2.0, 2.0), None);
    }

    #[test]
    fn add_text_requires_a_font() {
        let mut canvas = ObjectCanvas::new(None);
        canvas.load_raster(&solid(32, 32, 5));
        assert!(!canvas.add_text());
        assert_eq!(canvas.objects().len(), 1);
    }

    #[test]
    fn replace_image_raster_keeps_placement() {
        let mut canvas = ObjectCanvas::new(None);
        canvas.load_raster(&solid(100, 100, 10));
        canvas.move_selected(40.0, 0.0);
        canvas.replace_image_raster(solid(100, 100, 250));

        let [SceneObject::Image { raster, x, .. }] = canvas.objects() else {
            panic!("expected one image object");
        };
        assert_eq!(raster.get_pixel(0, 0)[0], 250);
        assert_eq!(*x, 290.0);
    }

    #[test]
    fn session_reset_restores_the_untouched_source() {
        let img = solid(120, 120, 128);
        let mut store = SliceStore::new();
        store.regenerate(&img, GridSpec::new(1, 1)).unwrap();
        let slice = &store.slices()[0];

        let mut session = EditSession::open(slice, None);
        session.canvas.move_selected(100.0, 100.0);
        session.reset();

        let [SceneObject::Image { x, y, .. }] = session.canvas.objects() else {
            panic!("expected one image object");
        };
        assert_eq!((*x, *y), (250.0, 250.0));
    }

    #[test]
    fn session_save_round_trips_through_the_store() {
        let img = solid(100, 100, 60);
        let mut store = SliceStore::new();
        store.regenerate(&img, GridSpec::new(1, 1)).unwrap();
        let slice_id = store.slices()[0].id.clone();

        let session = EditSession::open(&store.slices()[0], None);
        let (preview, state) = session.save();
        store.replace(&slice_id, preview, Some(state));

        let slice = store.get(&slice_id).unwrap();
        assert!(slice.modified);
        assert_eq!(slice.current.dimensions(), (STAGE_SIZE, STAGE_SIZE));

        // Re-opening restores the saved scene, not a fresh fit.
        let reopened = EditSession::open(slice, None);
        assert_eq!(reopened.canvas.objects().len(), 1);
    }
}
