//! Screen geometry and cursor confinement types.

use serde::{Deserialize, Serialize};

/// A point in virtual-screen pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Component-wise difference `self - earlier`, saturating at the i32 range.
    #[must_use]
    pub fn delta_from(self, earlier: Point) -> (i32, i32) {
        (
            self.x.saturating_sub(earlier.x),
            self.y.saturating_sub(earlier.y),
        )
    }

    /// Translate by a relative offset, saturating at the i32 range.
    #[must_use]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Rectangle the pointer is confined to.
///
/// `right` and `bottom` are exclusive, matching the native clip rectangle, so
/// a single-point region at `(x, y)` is `{x, y, x + 1, y + 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfineRegion {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ConfineRegion {
    /// Region covering exactly one pixel.
    #[must_use]
    pub fn single_point(point: Point) -> Self {
        Self {
            left: point.x,
            top: point.y,
            right: point.x.saturating_add(1),
            bottom: point.y.saturating_add(1),
        }
    }

    /// Whether the region collapses to a single pixel.
    #[must_use]
    pub fn is_single_point(&self) -> bool {
        self.right.saturating_sub(self.left) == 1 && self.bottom.saturating_sub(self.top) == 1
    }

    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }

    /// Clamp a point into the region. Empty regions clamp to the top-left corner.
    #[must_use]
    pub fn clamp(&self, point: Point) -> Point {
        let max_x = self.right.saturating_sub(1).max(self.left);
        let max_y = self.bottom.saturating_sub(1).max(self.top);
        Point {
            x: point.x.clamp(self.left, max_x),
            y: point.y.clamp(self.top, max_y),
        }
    }
}

/// Screen geometry for a machine's display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// X offset for multi-monitor setups.
    pub x: i32,
    /// Y offset for multi-monitor setups.
    pub y: i32,
}

impl ScreenGeometry {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            x: 0,
            y: 0,
        }
    }

    /// The whole screen as a confinement region (i.e. unconstrained).
    #[must_use]
    pub fn bounds(&self) -> ConfineRegion {
        ConfineRegion {
            left: self.x,
            top: self.y,
            right: self
                .x
                .saturating_add(i32::try_from(self.width).unwrap_or(i32::MAX)),
            bottom: self
                .y
                .saturating_add(i32::try_from(self.height).unwrap_or(i32::MAX)),
        }
    }

    /// Centre of the screen.
    #[must_use]
    pub fn center(&self) -> Point {
        Point {
            x: self
                .x
                .saturating_add(i32::try_from(self.width / 2).unwrap_or(i32::MAX)),
            y: self
                .y
                .saturating_add(i32::try_from(self.height / 2).unwrap_or(i32::MAX)),
        }
    }
}
