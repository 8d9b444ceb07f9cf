use leptess::tesseract;
use leptess::tesseract::TessApi;
use opencv::core::CV_8UC1;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;
use std::ffi::CString;
use std::path::Path;
use tracing::debug;
use tracing::info;

use crate::error::PlateError;

pub const PLATE_CHARSET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Tesseract "treat the image as a single text line".
const SINGLE_LINE_PSM: &str = "7";

/// Turns a binarized plate window into raw text.
pub trait TextRecognizer: Send {
    /// Empty text means nothing was read. Errors mean the engine itself is gone.
    fn recognize(&mut self, image: &Mat) -> Result<String, PlateError>;
}

pub struct TesseractReader {
    ocr: TessApi,
}

impl TesseractReader {
    pub fn new(data_path: Option<&Path>, language: &str) -> Result<Self, PlateError> {
        let data_path = data_path.map(|p| p.to_string_lossy().into_owned());
        let mut api = tesseract::TessApi::new(data_path.as_deref(), language)
            .map_err(|err| PlateError::recognition(format!("cannot start tesseract: {err}")))?;

        set_variable(&mut api, "tessedit_char_whitelist", PLATE_CHARSET)?;
        set_variable(&mut api, "tessedit_pageseg_mode", SINGLE_LINE_PSM)?;

        info!(language, "Tesseract ready");
        Ok(Self { ocr: api })
    }
}

fn set_variable(api: &mut TessApi, name: &str, value: &str) -> Result<(), PlateError> {
    let name_c = CString::new(name).map_err(|err| PlateError::recognition(err.to_string()))?;
    let value_c = CString::new(value).map_err(|err| PlateError::recognition(err.to_string()))?;
    api.raw
        .set_variable(&name_c, &value_c)
        .map_err(|err| PlateError::recognition(format!("cannot set {name}: {err}")))
}

// SAFETY: the tesseract handle is only used by the thread holding the recognizer lock.
unsafe impl Send for TesseractReader {}

impl TextRecognizer for TesseractReader {
    fn recognize(&mut self, image: &Mat) -> Result<String, PlateError> {
        if image.typ() != CV_8UC1 || !image.is_continuous() {
            return Err(PlateError::recognition(
                "expected a continuous single channel image",
            ));
        }

        let cols = image.cols();
        let rows = image.rows();
        let bytes = image
            .data_bytes()
            .map_err(|err| PlateError::recognition(err.to_string()))?;
        self.ocr
            .raw
            .set_image(bytes, cols, rows, 1, cols)
            .map_err(|err| PlateError::recognition(format!("cannot set image: {err}")))?;
        let result = self
            .ocr
            .get_utf8_text()
            .map_err(|err| PlateError::recognition(format!("cannot read text: {err}")))?;

        debug!(text = result.trim(), cols, rows, "OCR");
        Ok(String::from(result.trim()))
    }
}
