use crop_decimate::{CameraInfo, ImageFrame, TransformConfig, TransformError};

/// A frame and the calibration describing it, as carried on camera topics.
///
/// Cloning shares the pixel buffer.
#[derive(Clone, Debug)]
pub struct CameraFrame {
    pub image: ImageFrame,
    pub info: CameraInfo,
}

impl CameraFrame {
    pub fn new(image: ImageFrame, info: CameraInfo) -> Self {
        Self { image, info }
    }

    /// Crop and decimate this pair into a new one.
    pub fn transformed(&self, config: &TransformConfig) -> Result<CameraFrame, TransformError> {
        let (image, info) = crop_decimate::transform(config, &self.image, &self.info)?;
        Ok(CameraFrame { image, info })
    }
}
