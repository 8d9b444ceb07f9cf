use opencv::core::Scalar;
use opencv::highgui::destroy_window;
use opencv::highgui::imshow;
use opencv::highgui::named_window;
use opencv::highgui::wait_key;
use opencv::highgui::WINDOW_AUTOSIZE;
use opencv::imgproc::rectangle;
use opencv::imgproc::LineTypes;
use opencv::prelude::Mat;
use tracing::debug;
use tracing::warn;

use super::region::Region;
use crate::error::PlateError;

pub const DEFAULT_WINDOW_TITLE: &str = "Plate monitor - press 'Q' to close";

/// Local preview of the live feed.
pub trait FrameDisplay: Send {
    /// Shows the frame with the recognition window outlined, when there is one.
    fn show(&mut self, frame: &Mat, region: Option<&Region>) -> Result<(), PlateError>;

    /// Polls the operator's quit key.
    fn quit_requested(&mut self) -> Result<bool, PlateError>;
}

pub struct RegionRender {
    window: String,
}

impl RegionRender {
    pub fn open(window: &str) -> Result<Self, PlateError> {
        named_window(window, WINDOW_AUTOSIZE).map_err(PlateError::DisplayFailure)?;
        Ok(Self {
            window: window.to_string(),
        })
    }
}

impl FrameDisplay for RegionRender {
    fn show(&mut self, frame: &Mat, region: Option<&Region>) -> Result<(), PlateError> {
        let Some(region) = region.filter(|r| !r.is_empty()) else {
            return imshow(&self.window, frame).map_err(PlateError::DisplayFailure);
        };

        let mut image = frame.try_clone().map_err(PlateError::DisplayFailure)?;
        let color_green = Scalar::from((0.0, 255.0, 0.0));
        let thickness_px = 2;
        rectangle(
            &mut image,
            region.to_rect(),
            color_green,
            thickness_px,
            LineTypes::LINE_8 as i32,
            0,
        )
        .map_err(PlateError::DisplayFailure)?;
        imshow(&self.window, &image).map_err(PlateError::DisplayFailure)
    }

    fn quit_requested(&mut self) -> Result<bool, PlateError> {
        let key = wait_key(1).map_err(PlateError::DisplayFailure)?;
        Ok(key >= 0 && matches!((key & 0xFF) as u8, b'q' | b'Q'))
    }
}

impl Drop for RegionRender {
    fn drop(&mut self) {
        debug!(window = self.window.as_str(), "Closing preview");
        if let Err(err) = destroy_window(&self.window) {
            warn!(%err, "Cannot close preview window");
        }
    }
}

/// Preview for headless runs: drops frames and never asks to quit.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl FrameDisplay for NullDisplay {
    fn show(&mut self, _frame: &Mat, _region: Option<&Region>) -> Result<(), PlateError> {
        Ok(())
    }

    fn quit_requested(&mut self) -> Result<bool, PlateError> {
        Ok(false)
    }
}
