pub mod normalize;
pub mod ocr;
pub mod preprocess;
pub mod region;
pub mod region_render;
pub mod video_reader;

pub use normalize::normalize_plate;
pub use normalize::PlateIdentifier;
pub use ocr::TesseractReader;
pub use ocr::TextRecognizer;
pub use preprocess::preprocess;
pub use preprocess::PreprocessParams;
pub use region::extract_region;
pub use region::Region;
pub use region::RegionGeometry;
pub use region_render::FrameDisplay;
pub use region_render::NullDisplay;
pub use region_render::RegionRender;
pub use video_reader::CameraSource;
pub use video_reader::FrameSource;
pub use video_reader::VideoFileSource;
