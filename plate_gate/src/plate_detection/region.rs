use opencv::core::Rect;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use crate::error::PlateError;

/// Share of the frame covered by the recognition window, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionGeometry {
    pub width_pct: u32,
    pub height_pct: u32,
}

impl Default for RegionGeometry {
    fn default() -> Self {
        Self {
            width_pct: 40,
            height_pct: 20,
        }
    }
}

/// Recognition window in frame coordinates, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    /// Centered window for a frame of the given size. Sizes are truncated.
    pub fn centered(
        frame_width: i32,
        frame_height: i32,
        geometry: RegionGeometry,
    ) -> Result<Self, PlateError> {
        if frame_width < 2 || frame_height < 2 {
            return Err(PlateError::InvalidFrame {
                width: frame_width,
                height: frame_height,
            });
        }
        let roi_w = scale(frame_width, geometry.width_pct);
        let roi_h = scale(frame_height, geometry.height_pct);
        let x1 = (frame_width - roi_w) / 2;
        let y1 = (frame_height - roi_h) / 2;
        Ok(Self {
            x1,
            y1,
            x2: x1 + roi_w,
            y2: y1 + roi_h,
        })
    }

    pub fn for_frame(frame: &Mat, geometry: RegionGeometry) -> Result<Self, PlateError> {
        Self::centered(frame.cols(), frame.rows(), geometry)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x1, self.y1, self.width(), self.height())
    }
}

fn scale(size: i32, pct: u32) -> i32 {
    (i64::from(size) * i64::from(pct.min(100)) / 100) as i32
}

/// Read-only view of the window's pixels.
pub fn extract_region(frame: &Mat, region: &Region) -> Result<Mat, PlateError> {
    if region.is_empty() || region.x2 > frame.cols() || region.y2 > frame.rows() {
        return Err(PlateError::InvalidFrame {
            width: frame.cols(),
            height: frame.rows(),
        });
    }
    frame
        .apply_1(region.to_rect())
        .map_err(PlateError::PreprocessingFailure)
}
