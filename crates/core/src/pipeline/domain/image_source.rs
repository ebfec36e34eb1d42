use crate::shared::error::ImageReadError;
use crate::shared::frame::Frame;

/// Resolves an image locator to decoded RGB pixels.
pub trait ImageSource: Send + Sync {
    fn read(&self, locator: &str) -> Result<Frame, ImageReadError>;
}
