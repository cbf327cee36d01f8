/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when channel and shape are not valid.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when the image size is not valid.
    #[error("Invalid image size ({0}, {1}) mismatch ({2}, {3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when the image has no pixels.
    #[error("Image has an empty size ({0}x{1})")]
    EmptyImage(usize, usize),

    /// Error when the pixel data cannot be cast.
    #[error("Failed to cast image data")]
    CastError,

    /// Error when a scale factor is not strictly positive and finite.
    #[error("Invalid scale factor {0}")]
    InvalidScaleFactor(f32),
}
