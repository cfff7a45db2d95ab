use image::RgbImage;
use ndarray::{ArrayView3, ArrayViewMut3};

/// A single captured or decoded frame: contiguous RGB bytes in row-major order.
///
/// Every I/O adapter converts into this layout, so the detector, the
/// renderer and the snapshot store never deal with BGR or padded strides.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Wraps a decoded RGB image without copying.
    pub fn from_rgb_image(image: RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    /// Copies the pixel data into an `RgbImage`.
    ///
    /// Returns `None` for frames that are not well-formed 3-channel buffers.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.channels != 3 || !self.is_well_formed() {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// True when the buffer length matches the declared geometry and the
    /// frame is non-empty.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.channels > 0
            && self.data.len()
                == (self.width as usize) * (self.height as usize) * (self.channels as usize)
    }

    /// Returns a copy scaled to exactly `width` x `height`.
    pub fn resized(&self, width: u32, height: u32) -> Option<Frame> {
        let img = self.to_rgb_image()?;
        let scaled = image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);
        Some(Frame::from_rgb_image(scaled, self.index))
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
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

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
