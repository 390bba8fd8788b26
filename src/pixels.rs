use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::error::{ColorError, Result};
use crate::parallel::prelude::*;

pub type SubPixel = f32;
pub type Pixel = [SubPixel; CHANNELS_PER_PIXEL];

pub const CHANNELS_PER_PIXEL: usize = 3;

/// Single-plane sensor readings, indexed `[row, col]`.
#[derive(Clone, Debug, PartialEq)]
pub struct RawMosaic {
    data: Array2<SubPixel>,
}

impl RawMosaic {
    pub fn new(width: usize, height: usize, data: Vec<SubPixel>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ColorError::InvalidDimensions(width, height));
        }
        let data = Array2::from_shape_vec((height, width), data)
            .map_err(|_| ColorError::InvalidDimensions(width, height))?;
        Ok(RawMosaic { data })
    }

    pub fn from_u16(width: usize, height: usize, data: &[u16]) -> Result<Self> {
        Self::new(width, height, data.iter().map(|v| *v as SubPixel).collect())
    }

    pub fn from_array(data: Array2<SubPixel>) -> Result<Self> {
        let (height, width) = data.dim();
        if width == 0 || height == 0 {
            return Err(ColorError::InvalidDimensions(width, height));
        }
        Ok(RawMosaic { data })
    }

    pub(crate) fn wrap(data: Array2<SubPixel>) -> Self {
        RawMosaic { data }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn view(&self) -> ArrayView2<'_, SubPixel> {
        self.data.view()
    }
}

/// Floating point RGB image, indexed `[row, col, channel]`.
///
/// Values are unbounded until a stage clamps them.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbImage {
    data: Array3<SubPixel>,
}

impl RgbImage {
    pub fn zeros(width: usize, height: usize) -> Self {
        RgbImage {
            data: Array3::zeros((height, width, 3)),
        }
    }

    pub fn from_array(data: Array3<SubPixel>) -> Result<Self> {
        let (height, width, channels) = data.dim();
        if channels != 3 {
            return Err(ColorError::dimensions("3 channels", format!("{channels} channels")));
        }
        if width == 0 || height == 0 {
            return Err(ColorError::InvalidDimensions(width, height));
        }
        Ok(RgbImage { data })
    }

    /// Wraps an array already known to be `h × w × 3`.
    pub(crate) fn wrap(data: Array3<SubPixel>) -> Self {
        debug_assert_eq!(data.dim().2, 3);
        RgbImage { data }
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    #[inline]
    pub fn pixel(&self, row: usize, col: usize) -> Pixel {
        [self.data[[row, col, 0]], self.data[[row, col, 1]], self.data[[row, col, 2]]]
    }

    pub fn view(&self) -> ArrayView3<'_, SubPixel> {
        self.data.view()
    }

    /// New image with `f` applied to every pixel, rows in parallel.
    pub fn map_pixels<F>(&self, f: F) -> RgbImage
    where
        F: Fn(Pixel) -> Pixel + Sync + Send,
    {
        let mut data = self.data.clone();
        data.axis_iter_mut(Axis(0)).into_par_iter().for_each(|mut row| {
            for mut px in row.axis_iter_mut(Axis(0)) {
                let [r, g, b] = f([px[0], px[1], px[2]]);
                px[0] = r;
                px[1] = g;
                px[2] = b;
            }
        });
        RgbImage { data }
    }

    /// `|self - other| * gain` per channel, clamped to [0, 1].
    pub fn abs_difference(&self, other: &RgbImage, gain: SubPixel) -> Result<RgbImage> {
        if self.data.dim() != other.data.dim() {
            return Err(ColorError::dimensions(
                format!("{}x{}", self.width(), self.height()),
                format!("{}x{}", other.width(), other.height()),
            ));
        }
        let mut data = &self.data - &other.data;
        data.mapv_inplace(|v| (v.abs() * gain).clamp(0.0, 1.0));
        Ok(RgbImage { data })
    }

    /// Interleaved 8-bit RGB, clamped to [0, 1] and rounded.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }
}

/// One named pipeline output.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedStage {
    pub name: String,
    pub image: RgbImage,
}

/// Stages in the order they were produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedStages {
    stages: Vec<RenderedStage>,
}

impl RenderedStages {
    pub fn push(&mut self, name: impl Into<String>, image: RgbImage) {
        self.stages.push(RenderedStage {
            name: name.into(),
            image,
        });
    }

    pub fn get(&self, name: &str) -> Option<&RgbImage> {
        self.stages.iter().find(|s| s.name == name).map(|s| &s.image)
    }

    pub fn last(&self) -> Option<&RenderedStage> {
        self.stages.last()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RenderedStage> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl IntoIterator for RenderedStages {
    type Item = RenderedStage;
    type IntoIter = std::vec::IntoIter<RenderedStage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.into_iter()
    }
}
