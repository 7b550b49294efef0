// ============================================================================
// EXPORT PIPELINE — package every slice raster into one zip archive
// ============================================================================

use crate::raster::{self, RasterError};
use crate::slices::{GridSpec, Slice};
use std::io::{Cursor, Write};
use zip::write::FileOptions;

#[derive(Debug)]
pub enum ExportError {
    /// The store holds no slices — the caller should have disabled export.
    Empty,
    Raster(RasterError),
    Archive(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Empty => write!(f, "Nothing to export: no slices"),
            ExportError::Raster(e) => write!(f, "Slice encode failed: {}", e),
            ExportError::Archive(e) => write!(f, "Archive assembly failed: {}", e),
        }
    }
}

impl From<RasterError> for ExportError {
    fn from(e: RasterError) -> Self {
        ExportError::Raster(e)
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(e: zip::result::ZipError) -> Self {
        ExportError::Archive(e.to_string())
    }
}

/// Folder name inside the archive, carrying the grid dimensions.
pub fn folder_name(grid: GridSpec) -> String {
    format!("stickers_{}x{}", grid.rows, grid.cols)
}

/// Download filename for the archive: timestamped so repeated exports never
/// collide.
pub fn archive_file_name(grid: GridSpec) -> String {
    format!(
        "stickers_{}_{}x{}.zip",
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        grid.rows,
        grid.cols
    )
}

/// Package every slice's current raster as `slice_{n}.png` (1-based, store
/// order) inside one grid-named folder, returning the zip bytes.
///
/// The whole archive is assembled in memory and returned only on success —
/// a failing slice aborts the export with nothing written.
pub fn export_all(slices: &[Slice], grid: GridSpec) -> Result<Vec<u8>, ExportError> {
    if slices.is_empty() {
        return Err(ExportError::Empty);
    }

    let folder = folder_name(grid);
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.add_directory(format!("{}/", folder), options)?;
    for (index, slice) in slices.iter().enumerate() {
        let png = raster::encode_png(&slice.current)?;
        zip.start_file(format!("{}/slice_{}.png", folder, index + 1), options)?;
        zip.write_all(&png)
            .map_err(|e| ExportError::Archive(e.to_string()))?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slices::SliceStore;
    use image::{Rgba, RgbaImage};
    use std::io::Read;

    fn store_with(rows: u32, cols: u32) -> SliceStore {
        let img = RgbaImage::from_pixel(120, 120, Rgba([10, 20, 30, 255]));
        let mut store = SliceStore::new();
        store.regenerate(&img, GridSpec::new(rows, cols)).unwrap();
        store
    }

    #[test]
    fn export_writes_one_numbered_entry_per_slice() {
        let grid = GridSpec::new(2, 3);
        let store = store_with(2, 3);
        let bytes = export_all(store.slices(), grid).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        // 6 slice entries + the folder entry.
        assert_eq!(archive.len(), 7);
        for n in 1..=6 {
            let name = format!("stickers_2x3/slice_{}.png", n);
            let mut entry = archive.by_name(&name).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            // Every entry decodes back to the 40x60 cell it was cut from.
            let img = crate::raster::load_bytes(&data).unwrap();
            assert_eq!(img.dimensions(), (40, 60));
        }
    }

    #[test]
    fn export_of_empty_store_fails() {
        assert!(matches!(
            export_all(&[], GridSpec::new(2, 2)),
            Err(ExportError::Empty)
        ));
    }

    #[test]
    fn archive_name_carries_grid_dimensions() {
        let name = archive_file_name(GridSpec::new(4, 6));
        assert!(name.starts_with("stickers_"));
        assert!(name.ends_with("_4x6.zip"));
    }
}
