// ============================================================================
// SLICE STORE — one generation of grid cells cut from the working image
// ============================================================================

use crate::geometry::{self, InvalidGridError};
use crate::raster::{self, RasterError};
use image::RgbaImage;
use rayon::prelude::*;
use uuid::Uuid;

/// Grid dimensions for slicing. The model accepts anything ≥ 1; the UI
/// additionally caps both axes at [`GridSpec::UI_MAX`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSpec {
    pub rows: u32,
    pub cols: u32,
}

impl GridSpec {
    /// Practical upper bound enforced by the UI inputs, not by the model.
    pub const UI_MAX: u32 = 20;

    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    pub fn cell_count(&self) -> usize {
        (self.rows * self.cols) as usize
    }

    pub fn swapped(&self) -> Self {
        Self { rows: self.cols, cols: self.rows }
    }
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { rows: 4, cols: 6 }
    }
}

/// One grid cell: the untouched raster cut at generation time (the reset
/// target), the raster currently shown and exported, and the editor scene
/// snapshot once the user has saved an edit.
#[derive(Clone)]
pub struct Slice {
    pub id: String,
    pub row: u32,
    pub col: u32,
    pub source: RgbaImage,
    pub current: RgbaImage,
    pub edit_state: Option<Vec<u8>>,
    pub modified: bool,
}

#[derive(Debug)]
pub enum SliceError {
    Grid(InvalidGridError),
    Raster(RasterError),
}

impl std::fmt::Display for SliceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SliceError::Grid(e) => write!(f, "{}", e),
            SliceError::Raster(e) => write!(f, "{}", e),
        }
    }
}

impl From<InvalidGridError> for SliceError {
    fn from(e: InvalidGridError) -> Self {
        SliceError::Grid(e)
    }
}

impl From<RasterError> for SliceError {
    fn from(e: RasterError) -> Self {
        SliceError::Raster(e)
    }
}

/// The ordered slice collection for the current working image + grid.
///
/// Slices live and die as a batch: any image or grid change replaces the
/// whole generation. Per-slice edits do not survive a grid-shape change.
#[derive(Default)]
pub struct SliceStore {
    slices: Vec<Slice>,
    generation: String,
}

impl SliceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Slice> {
        self.slices.iter().find(|s| s.id == id)
    }

    /// Cut a fresh generation from `image`. All-or-nothing: the new slices
    /// are built completely before the old generation is dropped, so a
    /// failed extraction leaves the store untouched.
    pub fn regenerate(&mut self, image: &RgbaImage, grid: GridSpec) -> Result<(), SliceError> {
        let (w, h) = image.dimensions();
        let cells = geometry::partition_grid(w as f32, h as f32, grid.rows, grid.cols)?;

        let generation = Uuid::new_v4().simple().to_string()[..8].to_string();
        let cols = grid.cols;

        let fresh: Result<Vec<Slice>, RasterError> = cells
            .par_iter()
            .enumerate()
            .map(|(i, cell)| {
                let raster = raster::extract(image, cell)?;
                let row = i as u32 / cols;
                let col = i as u32 % cols;
                Ok(Slice {
                    id: format!("slice-{}-{}-{}", row, col, generation),
                    row,
                    col,
                    source: raster.clone(),
                    current: raster,
                    edit_state: None,
                    modified: false,
                })
            })
            .collect();

        self.slices = fresh?;
        self.generation = generation;
        Ok(())
    }

    /// Substitute the slice with the given id after an edit session saved.
    /// An id from a superseded generation simply matches nothing — no-op.
    pub fn replace(&mut self, id: &str, current: RgbaImage, edit_state: Option<Vec<u8>>) {
        if let Some(slice) = self.slices.iter_mut().find(|s| s.id == id) {
            slice.current = current;
            slice.edit_state = edit_state;
            slice.modified = true;
        }
    }

    pub fn clear(&mut self) {
        self.slices.clear();
        self.generation.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255]))
    }

    #[test]
    fn regenerate_produces_row_major_slices() {
        let img = gradient(1200, 800);
        let mut store = SliceStore::new();
        store.regenerate(&img, GridSpec::new(4, 6)).unwrap();

        assert_eq!(store.len(), 24);
        for (i, slice) in store.slices().iter().enumerate() {
            assert_eq!(slice.row, i as u32 / 6);
            assert_eq!(slice.col, i as u32 % 6);
            assert!(slice.id.starts_with(&format!("slice-{}-{}-", slice.row, slice.col)));
            assert_eq!(slice.current.dimensions(), (200, 200));
            assert!(!slice.modified);
        }
        // The last cell starts at (1000, 600) in the source image.
        let last = &store.slices()[23];
        assert_eq!(last.source.get_pixel(0, 0), img.get_pixel(1000, 600));
    }

    #[test]
    fn regenerate_replaces_whole_generation() {
        let img = gradient(600, 600);
        let mut store = SliceStore::new();
        store.regenerate(&img, GridSpec::new(2, 2)).unwrap();

        let old_id = store.slices()[0].id.clone();
        store.replace(&old_id, gradient(10, 10), Some(vec![1, 2, 3]));
        assert!(store.get(&old_id).unwrap().modified);

        // A grid change rebuilds everything; the edit is gone by design.
        store.regenerate(&img, GridSpec::new(3, 3)).unwrap();
        assert_eq!(store.len(), 9);
        assert!(store.get(&old_id).is_none());
        assert!(store.slices().iter().all(|s| !s.modified && s.edit_state.is_none()));
    }

    #[test]
    fn replace_with_stale_id_is_a_no_op() {
        let img = gradient(100, 100);
        let mut store = SliceStore::new();
        store.regenerate(&img, GridSpec::new(1, 1)).unwrap();

        store.replace("slice-0-0-deadbeef", gradient(5, 5), None);
        assert_eq!(store.len(), 1);
        assert!(!store.slices()[0].modified);
    }

    #[test]
    fn regenerate_rejects_bad_grid() {
        let img = gradient(100, 100);
        let mut store = SliceStore::new();
        store.regenerate(&img, GridSpec::new(2, 2)).unwrap();

        let err = store.regenerate(&img, GridSpec::new(0, 3));
        assert!(matches!(err, Err(SliceError::Grid(_))));
        // Failed regenerate leaves the previous generation in place.
        assert_eq!(store.len(), 4);
    }
}
