use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::calibration::CalibrationSet;
use crate::error::{ColorError, Result};
use crate::interpolate::{AnalogBalance, AsShotNeutral, BlendState, CalibrationInterpolator};
use crate::matrix::Ccm;
use crate::pixels::RgbImage;

pub const INTERPOLATED_LABEL: &str = "colorMatrix_interpolated";

/// Label of the matrix used when interpolation is numerically impossible.
pub const FALLBACK_LABEL: &str = "colorMatrix_uninterpolated";

/// Where the color correction matrix of a render comes from.
#[derive(Clone, Debug)]
pub enum CcmSource {
    Fixed {
        label: String,
        matrix: Ccm,
    },
    Interpolated {
        calibration: Arc<CalibrationSet>,
        analog_balance: AnalogBalance,
        neutral: AsShotNeutral,
    },
}

impl CcmSource {
    pub fn fixed(label: impl Into<String>, matrix: Ccm) -> Self {
        CcmSource::Fixed {
            label: label.into(),
            matrix,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CcmSource::Fixed { label, .. } => label,
            CcmSource::Interpolated { .. } => INTERPOLATED_LABEL,
        }
    }

    /// Produces the 3×3 matrix for this source.
    ///
    /// Interpolation failures are returned as-is; see
    /// [`CcmSource::resolve_or_fallback`] for the lenient variant.
    pub fn resolve(&self) -> Result<ResolvedCcm> {
        match self {
            CcmSource::Fixed { label, matrix } => Ok(ResolvedCcm {
                label: label.clone(),
                matrix: *matrix,
                blend: None,
            }),
            CcmSource::Interpolated {
                calibration,
                analog_balance,
                neutral,
            } => {
                let interpolation =
                    CalibrationInterpolator::new(calibration, analog_balance, neutral)?.run()?;
                let state = &interpolation.state;
                debug!(
                    xyz_to_camera = ?interpolation.xyz_to_camera,
                    "blended XYZ to camera transform"
                );
                info!(
                    weight = state.weight,
                    low = %state.low.name,
                    high = %state.high.name,
                    iterations = state.iterations,
                    converged = state.converged,
                    "interpolated color matrix"
                );
                Ok(ResolvedCcm {
                    label: INTERPOLATED_LABEL.to_string(),
                    matrix: interpolation.ccm()?,
                    blend: Some(interpolation.state),
                })
            }
        }
    }

    /// Like [`CcmSource::resolve`], but a numerically degenerate
    /// interpolation falls back to the color matrix of the lowest-temperature
    /// calibration, labelled [`FALLBACK_LABEL`]. Every other error is
    /// returned.
    pub fn resolve_or_fallback(&self) -> Result<ResolvedCcm> {
        match (self.resolve(), self) {
            (Err(e @ ColorError::Degenerate(_)), CcmSource::Interpolated { calibration, .. }) => {
                let entry = calibration.lowest();
                warn!(
                    error = %e,
                    fallback = %entry.name,
                    "interpolation failed, using uninterpolated color matrix"
                );
                Ok(ResolvedCcm {
                    label: FALLBACK_LABEL.to_string(),
                    matrix: entry.color_matrix.to_ccm()?,
                    blend: None,
                })
            }
            (result, _) => result,
        }
    }
}

/// A CCM ready to apply, with the blend diagnostics when it was
/// interpolated.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCcm {
    pub label: String,
    pub matrix: Ccm,
    pub blend: Option<BlendState>,
}

impl ResolvedCcm {
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        apply_ccm(&self.matrix, image)
    }
}

/// `out = m · rgb` per pixel, clamped to [0, 1].
pub fn apply_ccm(m: &Ccm, image: &RgbImage) -> RgbImage {
    image.map_pixels(|[r, g, b]| {
        m.map(|row| (row[0] * r + row[1] * g + row[2] * b).clamp(0.0, 1.0))
    })
}
