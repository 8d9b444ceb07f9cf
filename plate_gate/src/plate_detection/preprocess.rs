use opencv::core::BORDER_DEFAULT;
use opencv::imgproc::bilateral_filter;
use opencv::imgproc::cvt_color;
use opencv::imgproc::threshold;
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::imgproc::COLOR_BGRA2GRAY;
use opencv::imgproc::THRESH_BINARY;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use crate::error::PlateError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessParams {
    pub bilateral_diameter: i32,
    pub sigma_color: f64,
    pub sigma_space: f64,
    /// Luminance at or above this value becomes white.
    pub binary_threshold: u8,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            bilateral_diameter: 11,
            sigma_color: 17.0,
            sigma_space: 17.0,
            binary_threshold: 100,
        }
    }
}

/// Grayscale, bilateral denoise, then binarize. Output is single channel 0/255.
pub fn preprocess(region: &Mat, params: &PreprocessParams) -> Result<Mat, PlateError> {
    if region.empty() {
        return Err(PlateError::InvalidFrame {
            width: region.cols(),
            height: region.rows(),
        });
    }

    let mut grey = Mat::default();
    match region.channels() {
        1 => region
            .copy_to(&mut grey)
            .map_err(PlateError::PreprocessingFailure)?,
        3 => cvt_color(region, &mut grey, COLOR_BGR2GRAY, 0)
            .map_err(PlateError::PreprocessingFailure)?,
        4 => cvt_color(region, &mut grey, COLOR_BGRA2GRAY, 0)
            .map_err(PlateError::PreprocessingFailure)?,
        _ => {
            return Err(PlateError::InvalidFrame {
                width: region.cols(),
                height: region.rows(),
            })
        }
    }

    let mut smoothed = Mat::default();
    bilateral_filter(
        &grey,
        &mut smoothed,
        params.bilateral_diameter,
        params.sigma_color,
        params.sigma_space,
        BORDER_DEFAULT,
    )
    .map_err(PlateError::PreprocessingFailure)?;

    // THRESH_BINARY keeps pixels strictly above the cut.
    let cut = f64::from(params.binary_threshold) - 1.0;
    let mut binary = Mat::default();
    threshold(&smoothed, &mut binary, cut, 255.0, THRESH_BINARY)
        .map_err(PlateError::PreprocessingFailure)?;
    Ok(binary)
}
