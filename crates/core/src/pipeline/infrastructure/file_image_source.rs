use std::path::{Path, PathBuf};

use crate::pipeline::domain::image_source::ImageSource;
use crate::shared::error::ImageReadError;
use crate::shared::frame::Frame;

/// Reads images from the local filesystem with the `image` crate.
///
/// Locators are paths, optionally prefixed with `file://`. Relative paths
/// resolve against `root` when one is set.
#[derive(Default)]
pub struct FileImageSource {
    root: Option<PathBuf>,
}

impl FileImageSource {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator.strip_prefix("file://").unwrap_or(locator));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageSource for FileImageSource {
    fn read(&self, locator: &str) -> Result<Frame, ImageReadError> {
        let path = self.resolve(locator);
        if !path.is_file() {
            return Err(ImageReadError::NotFound(locator.to_string()));
        }
        let decoded = image::open(&path).map_err(|e| ImageReadError::Decode {
            locator: locator.to_string(),
            message: e.to_string(),
        })?;
        let frame = Frame::from_rgb_image(decoded.to_rgb8());
        log::debug!(
            "Read {locator}: {}x{}",
            frame.width(),
            frame.height()
        );
        Ok(frame)
    }
}
