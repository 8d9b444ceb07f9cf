use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::VideoCaptureTrait;
use opencv::prelude::VideoCaptureTraitConst;
use opencv::videoio::VideoCapture;
use opencv::videoio::CAP_ANY;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::PlateError;
use crate::utils::FpsLimiter;

/// Yields frames until the device is lost. Every error is a capture failure.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Mat, PlateError>;
}

fn read_frame(capture: &mut VideoCapture) -> Result<Mat, PlateError> {
    let mut image = Mat::default();
    let grabbed = capture
        .read(&mut image)
        .map_err(|err| PlateError::capture(err.to_string()))?;

    if !grabbed || image.empty() {
        return Err(PlateError::capture("no frame returned by the device"));
    }
    Ok(image)
}

fn release(capture: &mut VideoCapture, what: &str) {
    if let Err(err) = capture.release() {
        warn!(%err, "Cannot release {what}");
    }
}

pub struct CameraSource {
    index: i32,
    capture: VideoCapture,
}

impl CameraSource {
    pub fn open(index: i32) -> Result<Self, PlateError> {
        let capture = VideoCapture::new(index, CAP_ANY)
            .map_err(|err| PlateError::capture(format!("cannot open camera {index}: {err}")))?;
        let opened = capture
            .is_opened()
            .map_err(|err| PlateError::capture(err.to_string()))?;
        if !opened {
            return Err(PlateError::capture(format!("camera {index} is not available")));
        }
        info!(index, "Camera opened");
        Ok(Self { index, capture })
    }
}

impl FrameSource for CameraSource {
    fn read(&mut self) -> Result<Mat, PlateError> {
        read_frame(&mut self.capture)
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        debug!(index = self.index, "Releasing camera");
        release(&mut self.capture, "camera");
    }
}

unsafe impl Send for CameraSource {}

/// Plays a recorded clip at a fixed frame rate in place of a live camera.
pub struct VideoFileSource {
    path: PathBuf,
    capture: VideoCapture,
    fps_limiter: FpsLimiter,
}

impl VideoFileSource {
    pub fn open(path: &Path, fps: u32) -> Result<Self, PlateError> {
        let path_str = path.to_string_lossy();
        let capture = VideoCapture::from_file(&path_str, CAP_ANY)
            .map_err(|err| PlateError::capture(format!("cannot open {path_str}: {err}")))?;
        let opened = capture
            .is_opened()
            .map_err(|err| PlateError::capture(err.to_string()))?;
        if !opened {
            return Err(PlateError::capture(format!("cannot open {path_str}")));
        }
        info!(path = %path.display(), fps, "Video file opened");
        Ok(Self {
            path: path.to_path_buf(),
            capture,
            fps_limiter: FpsLimiter::new(fps),
        })
    }
}

impl FrameSource for VideoFileSource {
    fn read(&mut self) -> Result<Mat, PlateError> {
        self.fps_limiter.wait();
        read_frame(&mut self.capture)
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Releasing video file");
        release(&mut self.capture, "video file");
    }
}

unsafe impl Send for VideoFileSource {}
