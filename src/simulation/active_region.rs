//! Active-region tracking.
//!
//! Pressure is known to be zero outside the bounding box of everything that
//! has been injected so far plus the distance waves can have travelled since.
//! The stencil loop uses this to skip quiet parts of the grid.

/// Axis-aligned bounding box of currently-nonzero pressure.
///
/// The box only grows (on injection and with wave-front propagation) until
/// [`ActiveRegion::clear`] resets it. While inactive, consumers treat the
/// region as covering the whole grid.
#[derive(Debug, Clone)]
pub struct ActiveRegion {
    width: usize,
    height: usize,
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
    has_activity: bool,
}

impl ActiveRegion {
    /// Create an inactive region for a grid of the given extents.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            min_x: 0,
            max_x: 0,
            min_y: 0,
            max_y: 0,
            has_activity: false,
        }
    }

    /// Whether any activity has been recorded since the last clear.
    pub fn has_activity(&self) -> bool {
        self.has_activity
    }

    /// Expand the region to cover a square of `radius` cells around a centre.
    ///
    /// The first expansion initialises the box; later ones take the clipped
    /// union. Coordinates may lie outside the grid; the box is always clipped
    /// to `[0, extent-1]`.
    pub fn expand(&mut self, cx: i32, cy: i32, radius: i32) {
        let lo_x = (cx - radius).max(0) as usize;
        let hi_x = ((cx + radius).max(0) as usize).min(self.width - 1);
        let lo_y = (cy - radius).max(0) as usize;
        let hi_y = ((cy + radius).max(0) as usize).min(self.height - 1);

        if self.has_activity {
            self.min_x = self.min_x.min(lo_x);
            self.max_x = self.max_x.max(hi_x);
            self.min_y = self.min_y.min(lo_y);
            self.max_y = self.max_y.max(hi_y);
        } else {
            self.min_x = lo_x;
            self.max_x = hi_x;
            self.min_y = lo_y;
            self.max_y = hi_y;
            self.has_activity = true;
        }
    }

    /// Grow the region by the distance waves can travel during one frame,
    /// with a 2x safety margin so the front never escapes the box.
    pub fn grow_for_frame(&mut self, dt_frame: f32, speed_of_sound: f32, cell_size: f32) {
        if !self.has_activity {
            return;
        }
        let cells = (2.0 * speed_of_sound * dt_frame / cell_size).ceil() as usize;
        self.min_x = self.min_x.saturating_sub(cells);
        self.max_x = (self.max_x + cells).min(self.width - 1);
        self.min_y = self.min_y.saturating_sub(cells);
        self.max_y = (self.max_y + cells).min(self.height - 1);
    }

    /// Reset to inactive.
    pub fn clear(&mut self) {
        self.has_activity = false;
        self.min_x = 0;
        self.max_x = 0;
        self.min_y = 0;
        self.max_y = 0;
    }

    /// Bounds as `(min_x, min_y, max_x, max_y)` when active.
    pub fn bounds(&self) -> Option<(usize, usize, usize, usize)> {
        self.has_activity
            .then_some((self.min_x, self.min_y, self.max_x, self.max_y))
    }

    /// Bounds to iterate, falling back to the whole grid when inactive.
    pub fn bounds_or_full(&self) -> (usize, usize, usize, usize) {
        if self.has_activity {
            (self.min_x, self.min_y, self.max_x, self.max_y)
        } else {
            (0, 0, self.width - 1, self.height - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_inactive() {
        let region = ActiveRegion::new(64, 32);
        assert!(!region.has_activity());
        assert_eq!(region.bounds(), None);
        assert_eq!(region.bounds_or_full(), (0, 0, 63, 31));
    }

    #[test]
    fn test_expand_initialises_and_unions() {
        let mut region = ActiveRegion::new(100, 100);
        region.expand(50, 50, 4);
        assert_eq!(region.bounds(), Some((46, 46, 54, 54)));

        // Union with a second disturbance.
        region.expand(10, 80, 2);
        assert_eq!(region.bounds(), Some((8, 46, 54, 82)));
    }

    #[test]
    fn test_expand_clips_to_grid() {
        let mut region = ActiveRegion::new(20, 20);
        region.expand(1, 18, 5);
        assert_eq!(region.bounds(), Some((0, 13, 6, 19)));

        region.expand(-3, 25, 1);
        let (min_x, min_y, max_x, max_y) = region.bounds().unwrap();
        assert_eq!((min_x, min_y), (0, 13));
        assert!(max_x <= 19 && max_y <= 19);
    }

    #[test]
    fn test_grow_for_frame() {
        let mut region = ActiveRegion::new(1000, 1000);
        region.expand(500, 500, 2);

        // c = 343, dx = 0.0086, dt = 1/600: 2*c*dt/dx ~= 133 cells.
        region.grow_for_frame(1.0 / 600.0, 343.0, 0.0086);
        let (min_x, min_y, max_x, max_y) = region.bounds().unwrap();
        let expected = (2.0f32 * 343.0 * (1.0 / 600.0) / 0.0086).ceil() as usize;
        assert_eq!(min_x, 498 - expected);
        assert_eq!(max_x, 502 + expected);
        assert_eq!(min_y, 498 - expected);
        assert_eq!(max_y, 502 + expected);
    }

    #[test]
    fn test_grow_is_noop_when_inactive() {
        let mut region = ActiveRegion::new(50, 50);
        region.grow_for_frame(1.0, 343.0, 0.0086);
        assert!(!region.has_activity());
    }

    #[test]
    fn test_clear() {
        let mut region = ActiveRegion::new(50, 50);
        region.expand(25, 25, 3);
        region.clear();
        assert!(!region.has_activity());
        assert_eq!(region.bounds_or_full(), (0, 0, 49, 49));
    }
}
