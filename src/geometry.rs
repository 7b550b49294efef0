// ============================================================================
// GEOMETRY — crop rectangle math and grid partitioning
// ============================================================================
//
// Everything in this module is a pure function over plain values: the crop
// dialog and the slicer feed pointer deltas and grid dimensions in, rectangles
// come out. All coordinates are source-image pixels, never screen pixels —
// callers convert screen deltas first (see `raster::display_scale`).

/// Minimum edge length of the crop rectangle, in image pixels.
pub const MIN_CROP_SIZE: f32 = 50.0;

/// An axis-aligned rectangle in source-image pixel coordinates.
///
/// A well-formed rect has positive width/height, a non-negative origin, and
/// lies fully inside the image it refers to. The constructors here only build
/// well-formed rects; `contained_in` checks an arbitrary one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// True when the rect satisfies the well-formedness invariants against
    /// an image of the given dimensions (small epsilon for float round-off).
    pub fn contained_in(&self, bound_w: f32, bound_h: f32) -> bool {
        const EPS: f32 = 1e-3;
        self.width > 0.0
            && self.height > 0.0
            && self.x >= -EPS
            && self.y >= -EPS
            && self.right() <= bound_w + EPS
            && self.bottom() <= bound_h + EPS
    }
}

/// One continuous pointer interaction against the crop rectangle: either a
/// translation of the whole box, or a resize dragging one edge or corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragAction {
    Move,
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl DragAction {
    fn has_north(self) -> bool {
        matches!(self, Self::North | Self::NorthEast | Self::NorthWest)
    }

    fn has_south(self) -> bool {
        matches!(self, Self::South | Self::SouthEast | Self::SouthWest)
    }

    fn has_east(self) -> bool {
        matches!(self, Self::East | Self::NorthEast | Self::SouthEast)
    }

    fn has_west(self) -> bool {
        matches!(self, Self::West | Self::NorthWest | Self::SouthWest)
    }
}

fn clamp(val: f32, min: f32, max: f32) -> f32 {
    val.min(max).max(min)
}

/// Force a proposed rectangle back into a well-formed one: each side clamped
/// to at least `min_size` (but never larger than the bound), and the origin
/// clamped so the rect stays inside `(bound_w, bound_h)`.
pub fn clamp_rect(rect: Rect, bound_w: f32, bound_h: f32, min_size: f32) -> Rect {
    let width = clamp(rect.width, min_size.min(bound_w), bound_w);
    let height = clamp(rect.height, min_size.min(bound_h), bound_h);
    let x = clamp(rect.x, 0.0, bound_w - width);
    let y = clamp(rect.y, 0.0, bound_h - height);
    Rect { x, y, width, height }
}

/// Apply one incremental pointer delta (already in image pixels) to the crop
/// rectangle. Pure: the result depends only on the arguments.
///
/// Each edge rule reads the *pre-drag* rectangle, so corner gestures are the
/// independent combination of their two edge rules and the opposite edges
/// never move. No delta, however large, can produce a rect that escapes the
/// bounds or shrinks below `min_size`.
pub fn apply_drag_delta(
    rect: Rect,
    action: DragAction,
    dx: f32,
    dy: f32,
    bound_w: f32,
    bound_h: f32,
    min_size: f32,
) -> Rect {
    if action == DragAction::Move {
        return Rect {
            x: clamp(rect.x + dx, 0.0, bound_w - rect.width),
            y: clamp(rect.y + dy, 0.0, bound_h - rect.height),
            ..rect
        };
    }

    let mut out = rect;

    if action.has_west() {
        // Left edge chases the pointer; the right edge stays put.
        let new_x = clamp(rect.x + dx, 0.0, rect.right() - min_size);
        out.x = new_x;
        out.width = rect.width - (new_x - rect.x);
    }
    if action.has_east() {
        out.width = clamp(rect.width + dx, min_size, bound_w - rect.x);
    }
    if action.has_north() {
        let new_y = clamp(rect.y + dy, 0.0, rect.bottom() - min_size);
        out.y = new_y;
        out.height = rect.height - (new_y - rect.y);
    }
    if action.has_south() {
        out.height = clamp(rect.height + dy, min_size, bound_h - rect.y);
    }

    out
}

/// Error raised when a grid specification is not at least 1×1.
///
/// The UI clamps its inputs, so hitting this from the app is a programming
/// error; it exists for the library surface and the CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidGridError {
    pub rows: u32,
    pub cols: u32,
}

impl std::fmt::Display for InvalidGridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "grid must be at least 1x1, got {}x{}",
            self.rows, self.cols
        )
    }
}

impl std::error::Error for InvalidGridError {}

/// Partition an image into `rows × cols` equal cells, row-major (row 0 left
/// to right, then row 1, …). Cell sizes are kept fractional; rounding to
/// pixel boundaries is the raster extractor's job so adjacent cells stay
/// flush (see `raster::extract`).
pub fn partition_grid(
    width: f32,
    height: f32,
    rows: u32,
    cols: u32,
) -> Result<Vec<Rect>, InvalidGridError> {
    if rows < 1 || cols < 1 {
        return Err(InvalidGridError { rows, cols });
    }

    let cell_w = width / cols as f32;
    let cell_h = height / rows as f32;

    let mut cells = Vec::with_capacity((rows * cols) as usize);
    for r in 0..rows {
        for c in 0..cols {
            cells.push(Rect {
                x: c as f32 * cell_w,
                y: r as f32 * cell_h,
                width: cell_w,
                height: cell_h,
            });
        }
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::new(x, y, w, h)
    }

    #[test]
    fn partition_counts_and_invariants() {
        for (w, h, rows, cols) in [
            (1200.0, 800.0, 4u32, 6u32),
            (1.0, 1.0, 1, 1),
            (317.0, 911.0, 7, 3),
            (100.0, 100.0, 20, 20),
        ] {
            let cells = partition_grid(w, h, rows, cols).unwrap();
            assert_eq!(cells.len(), (rows * cols) as usize);
            for cell in &cells {
                assert!(cell.contained_in(w, h), "{cell:?} escapes {w}x{h}");
            }
            // Row-major tiling: cells along a row abut, rows stack with no gap.
            let cols_u = cols as usize;
            for (i, cell) in cells.iter().enumerate() {
                let r = i / cols_u;
                let c = i % cols_u;
                if c > 0 {
                    assert!((cells[i - 1].right() - cell.x).abs() < 1e-3);
                }
                if r > 0 {
                    assert!((cells[i - cols_u].bottom() - cell.y).abs() < 1e-3);
                }
            }
            // Last cell closes the image exactly.
            let last = cells.last().unwrap();
            assert!((last.right() - w).abs() < 1e-3);
            assert!((last.bottom() - h).abs() < 1e-3);
        }
    }

    #[test]
    fn partition_single_cell_is_whole_image() {
        let cells = partition_grid(640.0, 480.0, 1, 1).unwrap();
        assert_eq!(cells, vec![rect(0.0, 0.0, 640.0, 480.0)]);
    }

    #[test]
    fn partition_example_scenario() {
        // 1200x800 on a 4x6 grid: 24 cells of 200x200, first at the origin,
        // last (row 3, col 5) at (1000, 600).
        let cells = partition_grid(1200.0, 800.0, 4, 6).unwrap();
        assert_eq!(cells.len(), 24);
        assert_eq!(cells[0], rect(0.0, 0.0, 200.0, 200.0));
        assert_eq!(cells[23], rect(1000.0, 600.0, 200.0, 200.0));
    }

    #[test]
    fn partition_rejects_degenerate_grids() {
        assert!(partition_grid(100.0, 100.0, 0, 5).is_err());
        assert!(partition_grid(100.0, 100.0, 5, 0).is_err());
    }

    #[test]
    fn move_translates_and_clamps() {
        let r = rect(100.0, 100.0, 200.0, 150.0);
        let moved = apply_drag_delta(r, DragAction::Move, 30.0, -20.0, 1000.0, 800.0, 50.0);
        assert_eq!(moved, rect(130.0, 80.0, 200.0, 150.0));

        // A huge delta pins the box to the boundary, size untouched.
        let pinned = apply_drag_delta(r, DragAction::Move, 1e6, 1e6, 1000.0, 800.0, 50.0);
        assert_eq!(pinned, rect(800.0, 650.0, 200.0, 150.0));
    }

    #[test]
    fn move_round_trips_away_from_boundaries() {
        let r = rect(300.0, 300.0, 200.0, 200.0);
        let there = apply_drag_delta(r, DragAction::Move, 47.0, -33.0, 1000.0, 1000.0, 50.0);
        let back = apply_drag_delta(there, DragAction::Move, -47.0, 33.0, 1000.0, 1000.0, 50.0);
        assert_eq!(back, r);
    }

    #[test]
    fn edge_resize_leaves_opposite_edge_fixed() {
        let r = rect(100.0, 100.0, 200.0, 200.0);

        let west = apply_drag_delta(r, DragAction::West, 40.0, 0.0, 1000.0, 1000.0, 50.0);
        assert_eq!(west.right(), r.right());
        assert_eq!(west.x, 140.0);
        assert_eq!(west.width, 160.0);

        let east = apply_drag_delta(r, DragAction::East, -40.0, 0.0, 1000.0, 1000.0, 50.0);
        assert_eq!(east.x, r.x);
        assert_eq!(east.width, 160.0);

        let north = apply_drag_delta(r, DragAction::North, 0.0, 25.0, 1000.0, 1000.0, 50.0);
        assert_eq!(north.bottom(), r.bottom());
        assert_eq!(north.y, 125.0);

        let south = apply_drag_delta(r, DragAction::South, 0.0, -25.0, 1000.0, 1000.0, 50.0);
        assert_eq!(south.y, r.y);
        assert_eq!(south.height, 175.0);
    }

    #[test]
    fn resize_respects_min_size_and_bounds() {
        let r = rect(100.0, 100.0, 200.0, 200.0);

        // Collapse attempts stop at the minimum edge length.
        let crushed = apply_drag_delta(r, DragAction::West, 1e6, 0.0, 1000.0, 1000.0, 50.0);
        assert_eq!(crushed.width, 50.0);
        assert_eq!(crushed.right(), r.right());

        let crushed = apply_drag_delta(r, DragAction::South, 0.0, -1e6, 1000.0, 1000.0, 50.0);
        assert_eq!(crushed.height, 50.0);

        // Expansion stops at the image boundary.
        let grown = apply_drag_delta(r, DragAction::East, 1e6, 0.0, 1000.0, 1000.0, 50.0);
        assert_eq!(grown.right(), 1000.0);
        let grown = apply_drag_delta(r, DragAction::North, 0.0, -1e6, 1000.0, 1000.0, 50.0);
        assert_eq!(grown.y, 0.0);
    }

    #[test]
    fn corner_combines_edges_independently() {
        let r = rect(100.0, 100.0, 200.0, 200.0);
        let nw = apply_drag_delta(r, DragAction::NorthWest, 30.0, 40.0, 1000.0, 1000.0, 50.0);
        let w = apply_drag_delta(r, DragAction::West, 30.0, 0.0, 1000.0, 1000.0, 50.0);
        let n = apply_drag_delta(r, DragAction::North, 0.0, 40.0, 1000.0, 1000.0, 50.0);
        assert_eq!(nw.x, w.x);
        assert_eq!(nw.width, w.width);
        assert_eq!(nw.y, n.y);
        assert_eq!(nw.height, n.height);
        // Opposite corner untouched.
        assert_eq!(nw.right(), r.right());
        assert_eq!(nw.bottom(), r.bottom());
    }

    #[test]
    fn random_walk_never_escapes_bounds() {
        // A long adversarial drag sequence: alternating huge and tiny deltas
        // across every action must keep the rect well-formed throughout.
        let actions = [
            DragAction::Move,
            DragAction::North,
            DragAction::South,
            DragAction::East,
            DragAction::West,
            DragAction::NorthEast,
            DragAction::NorthWest,
            DragAction::SouthEast,
            DragAction::SouthWest,
        ];
        let mut r = rect(10.0, 10.0, 300.0, 300.0);
        let mut k: i64 = 1;
        for step in 0..500 {
            let action = actions[step % actions.len()];
            k = k.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let dx = ((k % 2001) - 1000) as f32 * 3.7;
            let dy = (((k >> 16) % 2001) - 1000) as f32 * 2.3;
            r = apply_drag_delta(r, action, dx, dy, 800.0, 600.0, 50.0);
            assert!(r.contained_in(800.0, 600.0), "step {step}: {r:?}");
            assert!(r.width >= 50.0 - 1e-3 && r.height >= 50.0 - 1e-3);
        }
    }

    #[test]
    fn clamp_rect_restores_invariants() {
        let fixed = clamp_rect(rect(-50.0, 900.0, 5000.0, 10.0), 1000.0, 1000.0, 50.0);
        assert!(fixed.contained_in(1000.0, 1000.0));
        assert!(fixed.width >= 50.0 && fixed.height >= 50.0);

        // A bound smaller than min_size degrades gracefully to the bound.
        let tiny = clamp_rect(rect(0.0, 0.0, 100.0, 100.0), 30.0, 30.0, 50.0);
        assert_eq!(tiny, rect(0.0, 0.0, 30.0, 30.0));
    }
}
