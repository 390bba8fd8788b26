use itertools::iproduct;
use ndarray::{Array3, ArrayView2, Axis};

use crate::cfa::{CfaPattern, Channel};
use crate::pixels::{RawMosaic, RgbImage, SubPixel};
use crate::parallel::prelude::*;

const KERNEL: [[SubPixel; 3]; 3] = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];

/// Lower bound on the smoothed mask before dividing.
const WEIGHT_FLOOR: SubPixel = 1e-6;

/// Mirrors an out-of-range index back into `0..n`, repeating the edge
/// sample (`cba|abcd|dcb`).
#[inline]
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let r = if i < 0 {
        -i - 1
    } else if i >= n {
        2 * n - i - 1
    } else {
        i
    };
    r.clamp(0, n - 1) as usize
}

/// Weighted neighbourhood average of the samples of `channel` around
/// (`row`, `col`).
#[inline]
fn interpolate_at(
    mosaic: &ArrayView2<SubPixel>,
    cfa: &CfaPattern,
    channel: Channel,
    row: usize,
    col: usize,
) -> SubPixel {
    let (height, width) = mosaic.dim();
    let mut samples = 0.0;
    let mut weights = 0.0;

    for (dr, dc) in iproduct!(0..3, 0..3) {
        let r = reflect(row as isize + dr as isize - 1, height);
        let c = reflect(col as isize + dc as isize - 1, width);
        if cfa.color_at(r, c) == channel {
            let k = KERNEL[dr][dc];
            samples += k * mosaic[[r, c]];
            weights += k;
        }
    }

    samples / weights.max(WEIGHT_FLOOR)
}

/// Bilinear demosaic by normalized convolution.
///
/// Photosites keep their own reading exactly; the two missing channels are
/// the kernel-weighted mean of the same-color samples in the 3×3
/// neighbourhood. Output is clamped to [0, 1].
pub fn demosaic(mosaic: &RawMosaic, cfa: &CfaPattern) -> RgbImage {
    let view = mosaic.view();
    let (height, width) = view.dim();
    let mut rgb = Array3::<SubPixel>::zeros((height, width, 3));

    rgb.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(row, mut line)| {
            for col in 0..width {
                let native = cfa.color_at(row, col);
                for channel in Channel::ALL {
                    let value = if channel == native {
                        view[[row, col]]
                    } else {
                        interpolate_at(&view, cfa, channel, row, col)
                    };
                    line[[col, channel.index()]] = value.clamp(0.0, 1.0);
                }
            }
        });

    RgbImage::wrap(rgb)
}
