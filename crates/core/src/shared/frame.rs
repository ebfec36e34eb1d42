use crate::shared::error::ValidationError;

const CHANNELS: usize = 3;

/// A decoded photo: contiguous RGB bytes in row-major order.
///
/// Decoding happens at the imagery boundary only; stages treat pixel data as
/// read-only.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, ValidationError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(ValidationError(format!(
                "frame data has {} bytes, expected {expected} for {width}x{height} RGB",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn from_rgb_image(image: image::RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGB triple at column `x`, row `y`. Panics when out of bounds.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let offset = (y * self.width as usize + x) * CHANNELS;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    /// Copy out the rectangle at `(x, y)` of size `w`×`h`, clipped to the frame.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Frame {
        let x0 = x.min(self.width);
        let y0 = y.min(self.height);
        let x1 = x.saturating_add(w).min(self.width);
        let y1 = y.saturating_add(h).min(self.height);
        let cw = (x1 - x0) as usize;
        let ch = (y1 - y0) as usize;

        let mut data = Vec::with_capacity(cw * ch * CHANNELS);
        for row in y0 as usize..y1 as usize {
            let start = (row * self.width as usize + x0 as usize) * CHANNELS;
            data.extend_from_slice(&self.data[start..start + cw * CHANNELS]);
        }
        Frame {
            data,
            width: cw as u32,
            height: ch as u32,
        }
    }
}
