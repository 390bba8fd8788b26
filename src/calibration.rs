use crate::error::{ColorError, Result};
use crate::matrix::PlaneMatrix;

/// Weights this close to 0 or 1 select a single calibration matrix.
const BLEND_EPSILON: f64 = 1e-8;

/// One factory calibration record.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationEntry {
    pub name: String,
    pub cct: f64,
    /// XYZ to camera, one row per camera color plane.
    pub color_matrix: PlaneMatrix,
    pub camera_calibration: PlaneMatrix,
    pub forward_matrix: Option<PlaneMatrix>,
    pub reduction_matrix: Option<PlaneMatrix>,
}

impl CalibrationEntry {
    pub fn new(name: impl Into<String>, cct: f64, color_matrix: PlaneMatrix) -> Result<Self> {
        if cct <= 0.0 || !cct.is_finite() {
            return Err(ColorError::InvalidCct(cct));
        }
        if color_matrix.cols() != 3 || color_matrix.rows() < 3 {
            return Err(ColorError::dimensions("Nx3 color matrix", color_matrix.shape()));
        }
        let camera_calibration = PlaneMatrix::identity(color_matrix.rows())?;
        Ok(CalibrationEntry {
            name: name.into(),
            cct,
            color_matrix,
            camera_calibration,
            forward_matrix: None,
            reduction_matrix: None,
        })
    }

    pub fn with_camera_calibration(mut self, camera_calibration: PlaneMatrix) -> Result<Self> {
        let planes = self.planes();
        if camera_calibration.rows() != planes || camera_calibration.cols() != planes {
            return Err(ColorError::dimensions(
                format!("{planes}x{planes}"),
                camera_calibration.shape(),
            ));
        }
        self.camera_calibration = camera_calibration;
        Ok(self)
    }

    pub fn with_forward_matrix(mut self, forward_matrix: PlaneMatrix) -> Result<Self> {
        self.check_carried(&forward_matrix)?;
        self.forward_matrix = Some(forward_matrix);
        Ok(self)
    }

    pub fn with_reduction_matrix(mut self, reduction_matrix: PlaneMatrix) -> Result<Self> {
        self.check_carried(&reduction_matrix)?;
        self.reduction_matrix = Some(reduction_matrix);
        Ok(self)
    }

    /// Number of camera color planes.
    pub fn planes(&self) -> usize {
        self.color_matrix.rows()
    }

    fn check_carried(&self, matrix: &PlaneMatrix) -> Result<()> {
        let planes = self.planes();
        if matrix.rows() != 3 || matrix.cols() != planes {
            return Err(ColorError::dimensions(format!("3x{planes}"), matrix.shape()));
        }
        Ok(())
    }
}

/// A bracketing pair of entries and the reciprocal-temperature weight
/// toward `high`.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationPair<'a> {
    pub low: &'a CalibrationEntry,
    pub high: &'a CalibrationEntry,
    pub weight: f64,
}

impl<'a> CalibrationPair<'a> {
    fn single(entry: &'a CalibrationEntry) -> Self {
        CalibrationPair {
            low: entry,
            high: entry,
            weight: 0.0,
        }
    }
}

/// Calibration entries sorted by ascending temperature.
#[derive(Clone, Debug)]
pub struct CalibrationSet {
    entries: Vec<CalibrationEntry>,
}

impl CalibrationSet {
    pub fn new(mut entries: Vec<CalibrationEntry>) -> Result<Self> {
        let Some(first) = entries.first() else {
            return Err(ColorError::EmptyCalibration);
        };
        let planes = first.planes();
        if let Some(other) = entries.iter().find(|e| e.planes() != planes) {
            return Err(ColorError::dimensions(
                format!("{planes} color planes"),
                format!("{} color planes in {}", other.planes(), other.name),
            ));
        }
        entries.sort_by(|a, b| a.cct.total_cmp(&b.cct));
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].cct == pair[1].cct) {
            return Err(ColorError::DuplicateCct(pair[0].cct));
        }
        Ok(CalibrationSet { entries })
    }

    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn planes(&self) -> usize {
        self.lowest().planes()
    }

    pub fn lowest(&self) -> &CalibrationEntry {
        &self.entries[0]
    }

    pub fn highest(&self) -> &CalibrationEntry {
        &self.entries[self.entries.len() - 1]
    }

    /// Chooses the entries bracketing `cct`.
    ///
    /// Temperatures outside the calibrated range clamp to the nearest
    /// entry with weight 0; there is no extrapolation.
    pub fn select_pair(&self, cct: Option<f64>) -> CalibrationPair<'_> {
        let lowest = self.lowest();
        let highest = self.highest();
        let single = CalibrationPair::single;

        let Some(cct) = cct.filter(|_| self.entries.len() > 1) else {
            return single(lowest);
        };
        if cct <= lowest.cct {
            return single(lowest);
        }
        if cct >= highest.cct {
            return single(highest);
        }

        for pair in self.entries.windows(2) {
            let (low, high) = (&pair[0], &pair[1]);
            if low.cct <= cct && cct <= high.cct {
                let denom = 1.0 / high.cct - 1.0 / low.cct;
                let weight = if denom.abs() < 1e-9 {
                    0.0
                } else {
                    (1.0 / cct - 1.0 / low.cct) / denom
                };
                return CalibrationPair {
                    low,
                    high,
                    weight: weight.clamp(0.0, 1.0),
                };
            }
        }

        // unreachable for finite cct; NaN lands here
        single(lowest)
    }
}

/// Linear blend of two calibration matrices.
///
/// Weights at (or within 1e-8 of) the ends return the end matrix unchanged.
pub fn blend(low: &PlaneMatrix, high: &PlaneMatrix, weight: f64) -> Result<PlaneMatrix> {
    if low.rows() != high.rows() || low.cols() != high.cols() {
        return Err(ColorError::dimensions(low.shape(), high.shape()));
    }
    if weight.abs() <= BLEND_EPSILON {
        return Ok(*low);
    }
    if (weight - 1.0).abs() <= BLEND_EPSILON {
        return Ok(*high);
    }
    low.lerp(high, weight)
}
