// ============================================================================
// CROP SESSION — drag-gesture state machine for the crop dialog
// ============================================================================

use crate::geometry::{self, DragAction, MIN_CROP_SIZE, Rect};

/// Interactive crop state while the crop dialog is open.
///
/// Per gesture the session runs Idle → Dragging → Idle: `begin` arms a drag
/// action, `drag` feeds incremental image-pixel deltas through
/// [`geometry::apply_drag_delta`], `end` disarms. The widget layer owns the
/// screen→image delta conversion (egui hands it per-frame drag deltas, so
/// deltas arrive already incremental).
///
/// The session is transient: `commit` hands the final rectangle to the
/// caller, dropping the session cancels with no image change.
pub struct CropSession {
    rect: Rect,
    bound_w: f32,
    bound_h: f32,
    gesture: Option<DragAction>,
}

impl CropSession {
    /// Open a session over an image, with the default 80% centered box.
    pub fn open(image_w: u32, image_h: u32) -> Self {
        let (bound_w, bound_h) = (image_w as f32, image_h as f32);
        let w = bound_w * 0.8;
        let h = bound_h * 0.8;
        let rect = geometry::clamp_rect(
            Rect::new((bound_w - w) / 2.0, (bound_h - h) / 2.0, w, h),
            bound_w,
            bound_h,
            MIN_CROP_SIZE,
        );
        Self { rect, bound_w, bound_h, gesture: None }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn active_gesture(&self) -> Option<DragAction> {
        self.gesture
    }

    /// Pointer-down on the crop body or a handle.
    pub fn begin(&mut self, action: DragAction) {
        self.gesture = Some(action);
    }

    /// Pointer-move while a gesture is active. `dx`/`dy` are the incremental
    /// delta since the previous call, in image pixels. Returns true when the
    /// rectangle changed.
    pub fn drag(&mut self, dx: f32, dy: f32) -> bool {
        let Some(action) = self.gesture else {
            return false;
        };
        let next = geometry::apply_drag_delta(
            self.rect,
            action,
            dx,
            dy,
            self.bound_w,
            self.bound_h,
            MIN_CROP_SIZE,
        );
        let changed = next != self.rect;
        self.rect = next;
        changed
    }

    /// Pointer-up or pointer-leave.
    pub fn end(&mut self) {
        self.gesture = None;
    }

    /// Confirm: the final rectangle the caller extracts the new working
    /// image from.
    pub fn commit(self) -> Rect {
        self.rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_with_centered_80_percent_box() {
        let s = CropSession::open(1000, 500);
        assert_eq!(s.rect(), Rect::new(100.0, 50.0, 800.0, 400.0));
        assert_eq!(s.active_gesture(), None);
    }

    #[test]
    fn tiny_images_still_open_well_formed() {
        // 80% of 40px is below the minimum edge; the default box degrades to
        // the whole image rather than violating invariants.
        let s = CropSession::open(40, 40);
        assert!(s.rect().contained_in(40.0, 40.0));
    }

    #[test]
    fn gesture_cycle_moves_the_box() {
        let mut s = CropSession::open(1000, 1000);
        let before = s.rect();

        // Deltas without an armed gesture are ignored.
        assert!(!s.drag(50.0, 50.0));
        assert_eq!(s.rect(), before);

        s.begin(DragAction::Move);
        assert!(s.drag(30.0, -10.0));
        assert!(s.drag(5.0, 5.0));
        s.end();
        assert_eq!(s.rect().x, before.x + 35.0);
        assert_eq!(s.rect().y, before.y - 5.0);

        // Incremental deltas accumulate per call, not from gesture start.
        assert_eq!(s.active_gesture(), None);
        assert!(!s.drag(100.0, 100.0));
    }

    #[test]
    fn commit_returns_final_rect() {
        let mut s = CropSession::open(800, 800);
        s.begin(DragAction::East);
        s.drag(-1e6, 0.0);
        s.end();
        let rect = s.commit();
        assert_eq!(rect.width, MIN_CROP_SIZE);
        assert!(rect.contained_in(800.0, 800.0));
    }
}
