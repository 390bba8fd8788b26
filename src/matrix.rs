//! Fixed-capacity matrices for calibration math.
//!
//! Camera calibration data carries at most four color planes, so every
//! matrix the interpolator touches fits in a 4×4 array. Dimensions are
//! tracked at runtime and checked on every product; unused cells stay zero.

use nalgebra::Matrix4;

use crate::error::{ColorError, Result};

pub const MAX_PLANES: usize = 4;

/// Singular values below this fraction of the largest count as zero.
const RANK_TOLERANCE: f64 = 1e-12;

/// 3×3 matrix applied to RGB pixels.
pub type Ccm = [[f32; 3]; 3];

pub const IDENTITY_CCM: Ccm = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneMatrix {
    rows: usize,
    cols: usize,
    data: [[f64; MAX_PLANES]; MAX_PLANES],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneVector {
    len: usize,
    data: [f64; MAX_PLANES],
}

fn check_dim(rows: usize, cols: usize) -> Result<()> {
    if rows == 0 || cols == 0 || rows > MAX_PLANES || cols > MAX_PLANES {
        return Err(ColorError::dimensions(
            format!("at most {MAX_PLANES}x{MAX_PLANES}"),
            format!("{rows}x{cols}"),
        ));
    }
    Ok(())
}

impl PlaneMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        check_dim(rows, cols)?;
        Ok(PlaneMatrix {
            rows,
            cols,
            data: [[0.0; MAX_PLANES]; MAX_PLANES],
        })
    }

    pub fn identity(n: usize) -> Result<Self> {
        let mut m = Self::zeros(n, n)?;
        for i in 0..n {
            m.data[i][i] = 1.0;
        }
        Ok(m)
    }

    pub fn diagonal(values: &[f64]) -> Result<Self> {
        let mut m = Self::zeros(values.len(), values.len())?;
        for (i, v) in values.iter().enumerate() {
            m.data[i][i] = *v;
        }
        Ok(m)
    }

    /// Builds a matrix from row-major values.
    pub fn from_row_slice(rows: usize, cols: usize, values: &[f64]) -> Result<Self> {
        let mut m = Self::zeros(rows, cols)?;
        if values.len() != rows * cols {
            return Err(ColorError::dimensions(
                format!("{} values for {rows}x{cols}", rows * cols),
                format!("{} values", values.len()),
            ));
        }
        for (idx, v) in values.iter().enumerate() {
            m.data[idx / cols][idx % cols] = *v;
        }
        Ok(m)
    }

    pub fn from_rows<const R: usize, const C: usize>(rows: [[f64; C]; R]) -> Result<Self> {
        let mut m = Self::zeros(R, C)?;
        for (r, row) in rows.iter().enumerate() {
            m.data[r][..C].copy_from_slice(row);
        }
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> String {
        format!("{}x{}", self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row][col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row][..self.cols]
    }

    pub fn mul(&self, rhs: &PlaneMatrix) -> Result<PlaneMatrix> {
        if self.cols != rhs.rows {
            return Err(ColorError::dimensions(
                format!("{}xN operand", self.cols),
                rhs.shape(),
            ));
        }
        let mut out = PlaneMatrix::zeros(self.rows, rhs.cols)?;
        for i in 0..self.rows {
            for j in 0..rhs.cols {
                out.data[i][j] = (0..self.cols).map(|k| self.data[i][k] * rhs.data[k][j]).sum();
            }
        }
        Ok(out)
    }

    pub fn mul_vector(&self, v: &PlaneVector) -> Result<PlaneVector> {
        if self.cols != v.len {
            return Err(ColorError::dimensions(
                format!("vector of length {}", self.cols),
                format!("vector of length {}", v.len),
            ));
        }
        let mut out = PlaneVector {
            len: self.rows,
            data: [0.0; MAX_PLANES],
        };
        for i in 0..self.rows {
            out.data[i] = (0..self.cols).map(|k| self.data[i][k] * v.data[k]).sum();
        }
        Ok(out)
    }

    /// `(1 - weight) * self + weight * other`, element-wise.
    pub fn lerp(&self, other: &PlaneMatrix, weight: f64) -> Result<PlaneMatrix> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(ColorError::dimensions(self.shape(), other.shape()));
        }
        let mut out = *self;
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[r][c] = (1.0 - weight) * self.data[r][c] + weight * other.data[r][c];
            }
        }
        Ok(out)
    }

    /// Moore-Penrose pseudo-inverse by SVD.
    ///
    /// Returns `None` unless the matrix has full rank, i.e. every one of its
    /// `min(rows, cols)` singular values exceeds `RANK_TOLERANCE` relative
    /// to the largest.
    pub fn pseudo_inverse(&self) -> Option<PlaneMatrix> {
        if !self.is_finite() {
            return None;
        }
        let svd = self.padded().svd(true, true);
        let sigma_max = svd.singular_values.max();
        if sigma_max <= 0.0 || !sigma_max.is_finite() {
            return None;
        }
        let eps = RANK_TOLERANCE * sigma_max;
        if svd.rank(eps) < self.rows.min(self.cols) {
            return None;
        }
        let pinv = svd.pseudo_inverse(eps).ok()?;
        Some(PlaneMatrix::from_padded(&pinv, self.cols, self.rows))
    }

    /// 4×4 copy with the unused cells zeroed.
    fn padded(&self) -> Matrix4<f64> {
        Matrix4::from_fn(|r, c| {
            if r < self.rows && c < self.cols {
                self.data[r][c]
            } else {
                0.0
            }
        })
    }

    fn from_padded(m: &Matrix4<f64>, rows: usize, cols: usize) -> PlaneMatrix {
        let mut data = [[0.0; MAX_PLANES]; MAX_PLANES];
        for (r, row) in data.iter_mut().enumerate().take(rows) {
            for (c, v) in row.iter_mut().enumerate().take(cols) {
                *v = m[(r, c)];
            }
        }
        PlaneMatrix { rows, cols, data }
    }

    pub fn to_matrix3(&self) -> Option<nalgebra::Matrix3<f64>> {
        if self.rows != 3 || self.cols != 3 {
            return None;
        }
        Some(nalgebra::Matrix3::from_fn(|r, c| self.data[r][c]))
    }

    /// Narrows a 3×3 matrix to the single-precision form used on pixels.
    pub fn to_ccm(&self) -> Result<Ccm> {
        if self.rows != 3 || self.cols != 3 {
            return Err(ColorError::dimensions("3x3", self.shape()));
        }
        let mut ccm = [[0.0_f32; 3]; 3];
        for r in 0..3 {
            for c in 0..3 {
                ccm[r][c] = self.data[r][c] as f32;
            }
        }
        Ok(ccm)
    }

    pub fn is_finite(&self) -> bool {
        (0..self.rows).all(|r| self.row(r).iter().all(|v| v.is_finite()))
    }
}

impl PlaneVector {
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.is_empty() || values.len() > MAX_PLANES {
            return Err(ColorError::dimensions(
                format!("1..={MAX_PLANES} entries"),
                format!("{} entries", values.len()),
            ));
        }
        let mut data = [0.0; MAX_PLANES];
        data[..values.len()].copy_from_slice(values);
        Ok(PlaneVector {
            len: values.len(),
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data[..self.len]
    }
}
