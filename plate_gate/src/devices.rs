use std::path::PathBuf;

use crate::decision::SessionDevices;
use crate::error::PlateError;
use crate::plate_detection::CameraSource;
use crate::plate_detection::FrameDisplay;
use crate::plate_detection::FrameSource;
use crate::plate_detection::NullDisplay;
use crate::plate_detection::RegionRender;
use crate::plate_detection::VideoFileSource;
use crate::session::DeviceOpener;
use crate::settings::Settings;

/// Opens the OpenCV capture and preview described by the settings.
#[derive(Debug, Clone)]
pub struct OpenCvDevices {
    camera_index: i32,
    video_file: Option<PathBuf>,
    video_fps: u32,
    window_title: Option<String>,
}

impl OpenCvDevices {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            camera_index: settings.camera_index,
            video_file: settings.video_file.clone(),
            video_fps: settings.video_fps,
            window_title: (!settings.headless).then(|| settings.window_title.clone()),
        }
    }
}

impl DeviceOpener for OpenCvDevices {
    fn open(&self) -> Result<SessionDevices, PlateError> {
        let source: Box<dyn FrameSource> = match &self.video_file {
            Some(path) => Box::new(VideoFileSource::open(path, self.video_fps)?),
            None => Box::new(CameraSource::open(self.camera_index)?),
        };
        let display: Box<dyn FrameDisplay> = match &self.window_title {
            Some(title) => Box::new(RegionRender::open(title)?),
            None => Box::new(NullDisplay),
        };
        Ok(SessionDevices { source, display })
    }
}
