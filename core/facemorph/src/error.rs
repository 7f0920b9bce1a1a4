use thiserror::Error;

#[derive(Debug, Error)]
pub enum MorphError {
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    #[error("failed to encode image: {0}")]
    EncodeError(String),

    #[error("image dimensions are zero")]
    ZeroDimensions,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no face detected")]
    NoFaceDetected,

    #[error("segmentation failed: {0}")]
    SegmentationFailure(String),

    #[error("{region} region too small (radius {radius}px)")]
    DegenerateRegion { region: &'static str, radius: i32 },
}
