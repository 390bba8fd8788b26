//! Capture metadata as exported next to a RAW file.
//!
//! Keys follow the camelCase names of the capture tool (DNG tags and
//! Camera2 capture results). Matrices are flat or nested number lists in
//! row-major order.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::calibration::{CalibrationEntry, CalibrationSet};
use crate::ccm::CcmSource;
use crate::error::{ColorError, Result};
use crate::illuminant::{self, IlluminantInfo};
use crate::interpolate::{AnalogBalance, AsShotNeutral};
use crate::matrix::{Ccm, PlaneMatrix, MAX_PLANES};
use crate::pipeline::{SensorLevels, DEFAULT_WHITE_LEVEL};
use crate::white_balance::WhiteBalanceGains;

/// Calibration slots probed for color matrices.
const CALIBRATION_SLOTS: [usize; 3] = [1, 2, 3];

/// Fixed CCM candidates, in render order.
pub const CCM_KEYS: [&str; 11] = [
    "colorCorrectionTransform",
    "colorMatrix1",
    "colorMatrix2",
    "forwardMatrix1",
    "forwardMatrix2",
    "sensorColorTransform1",
    "sensorColorTransform2",
    "sensorForwardMatrix1",
    "sensorForwardMatrix2",
    "sensorCalibrationTransform1",
    "sensorCalibrationTransform2",
];

/// A single number or an arbitrarily nested list of numbers.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Numbers {
    Scalar(f64),
    List(Vec<Numbers>),
}

impl Numbers {
    pub fn flatten(&self) -> Vec<f64> {
        match self {
            Numbers::Scalar(v) => vec![*v],
            Numbers::List(items) => items.iter().flat_map(Numbers::flatten).collect(),
        }
    }
}

/// `wbGains` as written by the capture tool: a plain `[r, g, b]` /
/// `[r, gEven, gOdd, b]` list or a gain record.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum WbGainsValue {
    List(Vec<f64>),
    Record {
        r: Option<f64>,
        g: Option<f64>,
        b: Option<f64>,
        #[serde(rename = "gEven")]
        g_even: Option<f64>,
        #[serde(rename = "gOdd")]
        g_odd: Option<f64>,
    },
}

impl WbGainsValue {
    pub fn gains(&self) -> Result<WhiteBalanceGains> {
        match self {
            WbGainsValue::Record {
                r,
                g,
                b,
                g_even,
                g_odd,
            } => {
                let (g_even, g_odd) = match g {
                    Some(g) => (*g, *g),
                    None => (g_even.unwrap_or(1.0), g_odd.unwrap_or(1.0)),
                };
                Ok(WhiteBalanceGains {
                    r: r.unwrap_or(1.0) as f32,
                    g_even: g_even as f32,
                    g_odd: g_odd as f32,
                    b: b.unwrap_or(1.0) as f32,
                })
            }
            WbGainsValue::List(values) if values.len() == 3 => {
                Ok(WhiteBalanceGains::from_rgb([
                    values[0] as f32,
                    values[1] as f32,
                    values[2] as f32,
                ]))
            }
            WbGainsValue::List(values) => WhiteBalanceGains::from_color_correction_gains(values),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetadata {
    #[serde(alias = "rawWidth", alias = "activeArrayWidth")]
    pub width: Option<u32>,
    #[serde(alias = "rawHeight", alias = "activeArrayHeight")]
    pub height: Option<u32>,
    pub white_level: Option<f64>,
    pub black_level: Option<Numbers>,
    pub black_level_pattern: Option<Numbers>,
    #[serde(alias = "AnalogBalance")]
    pub analog_balance: Option<Numbers>,
    pub as_shot_neutral: Option<Numbers>,
    pub wb_gains: Option<WbGainsValue>,
    pub color_correction_gains: Option<Numbers>,
    /// Matrices, illuminants and anything else the capture tool wrote.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FromStr for CaptureMetadata {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl CaptureMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        std::fs::read_to_string(path)?.parse()
    }

    /// Flattened numbers stored under `key`, if it holds numbers.
    pub fn numbers(&self, key: &str) -> Option<Vec<f64>> {
        let value = self.extra.get(key)?;
        Numbers::deserialize(value).ok().map(|n| n.flatten())
    }

    /// The matrix under `key` if it has exactly `rows × cols` entries.
    pub fn matrix(&self, key: &str, rows: usize, cols: usize) -> Option<PlaneMatrix> {
        let values = self.numbers(key)?;
        if values.len() != rows * cols {
            debug!(
                key,
                expected = rows * cols,
                actual = values.len(),
                "skipping matrix with wrong size"
            );
            return None;
        }
        PlaneMatrix::from_row_slice(rows, cols, &values).ok()
    }

    /// Camera color planes, inferred from `colorMatrix1`.
    pub fn plane_count(&self) -> Result<usize> {
        let values = self.numbers("colorMatrix1").ok_or_else(|| {
            ColorError::Metadata("colorMatrix1 is required to infer color plane count".to_string())
        })?;
        if values.len() % 3 != 0 {
            return Err(ColorError::Metadata(format!(
                "colorMatrix1 has {} entries, not a multiple of 3",
                values.len()
            )));
        }
        let planes = values.len() / 3;
        if !(3..=MAX_PLANES).contains(&planes) {
            return Err(ColorError::Metadata(format!("unsupported color plane count {planes}")));
        }
        Ok(planes)
    }

    /// Illuminant of calibration slot `index`; the first key naming a
    /// known illuminant wins.
    pub fn illuminant(&self, index: usize) -> Option<IlluminantInfo> {
        [
            format!("calibrationIlluminant{index}"),
            format!("referenceIlluminant{index}"),
            format!("sensorReferenceIlluminant{index}"),
        ]
        .iter()
        .filter_map(|key| self.extra.get(key).and_then(serde_json::Value::as_f64))
        .filter(|id| *id >= 0.0 && *id <= u16::MAX as f64)
        .find_map(|id| illuminant::lookup(id as u16))
    }

    /// Calibration entries for every slot with a well-sized color matrix and
    /// a known illuminant.
    pub fn calibration_set(&self) -> Result<CalibrationSet> {
        let planes = self.plane_count()?;
        let mut entries = Vec::new();
        for index in CALIBRATION_SLOTS {
            let Some(color_matrix) = self.matrix(&format!("colorMatrix{index}"), planes, 3) else {
                continue;
            };
            let Some(info) = self.illuminant(index) else {
                debug!(index, "skipping calibration without a known illuminant");
                continue;
            };

            let mut entry = CalibrationEntry::new(info.name, info.cct, color_matrix)?;
            if let Some(cc) = self.matrix(&format!("cameraCalibration{index}"), planes, planes) {
                entry = entry.with_camera_calibration(cc)?;
            }
            if let Some(fm) = self.matrix(&format!("forwardMatrix{index}"), 3, planes) {
                entry = entry.with_forward_matrix(fm)?;
            }
            if let Some(rm) = self.matrix(&format!("reductionMatrix{index}"), 3, planes) {
                entry = entry.with_reduction_matrix(rm)?;
            }
            entries.push(entry);
        }
        if entries.is_empty() {
            return Err(ColorError::Metadata(
                "no calibration matrices with illuminant data were found".to_string(),
            ));
        }
        CalibrationSet::new(entries)
    }

    /// Missing entries default to 1; extra entries are ignored.
    pub fn analog_balance(&self, planes: usize) -> Result<AnalogBalance> {
        let mut diag = vec![1.0; planes];
        if let Some(values) = self.analog_balance.as_ref().map(Numbers::flatten) {
            for (d, v) in diag.iter_mut().zip(values) {
                *d = v;
            }
        }
        AnalogBalance::from_diagonal(&diag)
    }

    pub fn as_shot_neutral(&self, planes: usize) -> Result<AsShotNeutral> {
        let values = self.as_shot_neutral.as_ref().map(Numbers::flatten).unwrap_or_default();
        if values.len() < planes {
            return Err(ColorError::Metadata(
                "asShotNeutral is missing or has insufficient entries".to_string(),
            ));
        }
        AsShotNeutral::new(&values[..planes])
    }

    /// Everything needed to interpolate the color matrix for this capture.
    pub fn interpolated_source(&self) -> Result<CcmSource> {
        let calibration = self.calibration_set()?;
        let planes = calibration.planes();
        Ok(CcmSource::Interpolated {
            analog_balance: self.analog_balance(planes)?,
            neutral: self.as_shot_neutral(planes)?,
            calibration: Arc::new(calibration),
        })
    }

    pub fn white_level(&self) -> f64 {
        self.white_level.unwrap_or(DEFAULT_WHITE_LEVEL)
    }

    pub fn black_levels(&self) -> Vec<f64> {
        self.black_level
            .as_ref()
            .or(self.black_level_pattern.as_ref())
            .map(Numbers::flatten)
            .unwrap_or_default()
    }

    pub fn sensor_levels(&self) -> SensorLevels {
        SensorLevels::new(&self.black_levels(), self.white_level())
    }

    /// Gains from, in order of preference, the as-shot neutral, `wbGains`,
    /// `colorCorrectionGains`; unity when none is usable.
    pub fn white_balance_gains(&self) -> WhiteBalanceGains {
        if let Some(neutral) = &self.as_shot_neutral {
            if let Ok(gains) = WhiteBalanceGains::from_as_shot_neutral(&neutral.flatten()) {
                return gains;
            }
        }
        if let Some(wb) = &self.wb_gains {
            match wb.gains() {
                Ok(gains) => return gains,
                Err(e) => warn!(error = %e, "ignoring wbGains"),
            }
        }
        if let Some(cc) = &self.color_correction_gains {
            if let Ok(gains) = WhiteBalanceGains::from_color_correction_gains(&cc.flatten()) {
                return gains;
            }
        }
        WhiteBalanceGains::UNITY
    }

    fn ccm(&self, key: &str) -> Option<Ccm> {
        self.matrix(key, 3, 3).and_then(|m| m.to_ccm().ok())
    }

    /// Fixed 3×3 CCM variants, deduplicated by value.
    ///
    /// A `ccm` key overrides the candidate list.
    pub fn fixed_ccm_sources(&self) -> Result<Vec<CcmSource>> {
        if self.extra.contains_key("ccm") {
            let matrix = self
                .ccm("ccm")
                .ok_or_else(|| ColorError::Metadata("ccm must hold 9 numbers".to_string()))?;
            return Ok(vec![CcmSource::fixed("ccm", matrix)]);
        }

        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        for key in CCM_KEYS {
            let Some(matrix) = self.ccm(key) else {
                continue;
            };
            let bits: Vec<u32> = matrix.iter().flatten().map(|v| v.to_bits()).collect();
            if seen.insert(bits) {
                sources.push(CcmSource::fixed(key, matrix));
            }
        }
        if sources.is_empty() {
            return Err(ColorError::Metadata("no CCM matrices found".to_string()));
        }
        Ok(sources)
    }

    /// Fixed variants followed by the interpolated matrix when the metadata
    /// supports it.
    pub fn ccm_sources(&self) -> Result<Vec<CcmSource>> {
        let mut sources = self.fixed_ccm_sources()?;
        match self.interpolated_source() {
            Ok(source) => sources.push(source),
            Err(e) => warn!(error = %e, "unable to set up interpolated CCM"),
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccm::INTERPOLATED_LABEL;
    use crate::matrix::IDENTITY_CCM;
    use std::io::Write;

    const IDENTITY: &str = "[1, 0, 0, 0, 1, 0, 0, 0, 1]";

    fn capture() -> CaptureMetadata {
        format!(
            r#"{{
                "width": 4000,
                "height": 3000,
                "whiteLevel": 1023,
                "blackLevel": [64, 64, 64, 64],
                "asShotNeutral": [0.5, 1.0, 0.8],
                "analogBalance": [1.0, 1.0, 1.0],
                "colorMatrix1": [[1.1, 0, 0], [0, 1, 0], [0, 0, 0.9]],
                "colorMatrix2": {IDENTITY},
                "calibrationIlluminant1": 17,
                "calibrationIlluminant2": 21,
                "forwardMatrix1": {IDENTITY},
                "colorCorrectionTransform": [0.5, 0, 0, 0, 0.5, 0, 0, 0, 0.5],
                "make": "Pixel"
            }}"#
        )
        .parse()
        .unwrap()
    }

    #[test]
    fn test_parses_scalars_and_lists() {
        let meta = capture();
        assert_eq!(meta.width, Some(4000));
        assert_eq!(meta.white_level(), 1023.0);
        assert_eq!(meta.black_levels(), vec![64.0; 4]);
        assert_eq!(meta.numbers("colorMatrix1").unwrap().len(), 9);
        assert!(meta.numbers("make").is_none());
        assert_eq!(meta.plane_count().unwrap(), 3);
    }

    #[test]
    fn test_width_aliases_and_defaults() {
        let meta: CaptureMetadata = r#"{"rawWidth": 10, "blackLevelPattern": 42}"#.parse().unwrap();
        assert_eq!(meta.width, Some(10));
        assert_eq!(meta.white_level(), DEFAULT_WHITE_LEVEL);
        assert_eq!(meta.black_levels(), vec![42.0]);
        assert_eq!(meta.sensor_levels().black_mean(), 42.0);
    }

    #[test]
    fn test_calibration_set_from_slots() {
        let set = capture().calibration_set().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.lowest().name, "Standard Light A");
        assert_eq!(set.lowest().cct, 2856.0);
        assert_eq!(set.highest().name, "D65");
        assert!(set.lowest().forward_matrix.is_some());
        assert!(set.highest().forward_matrix.is_none());
        assert_eq!(set.lowest().color_matrix.get(0, 0), 1.1);
    }

    #[test]
    fn test_illuminant_key_fallback() {
        let meta: CaptureMetadata = format!(
            r#"{{
                "colorMatrix1": {IDENTITY},
                "calibrationIlluminant1": 0,
                "referenceIlluminant1": 23
            }}"#
        )
        .parse()
        .unwrap();
        assert_eq!(meta.illuminant(1).unwrap().name, "D50");
        assert!(meta.illuminant(2).is_none());
    }

    #[test]
    fn test_unusable_slots_are_skipped() {
        let meta: CaptureMetadata = format!(
            r#"{{
                "colorMatrix1": {IDENTITY},
                "calibrationIlluminant1": 21,
                "colorMatrix2": [1, 0, 0, 1],
                "calibrationIlluminant2": 17,
                "colorMatrix3": {IDENTITY},
                "calibrationIlluminant3": 255
            }}"#
        )
        .parse()
        .unwrap();
        let set = meta.calibration_set().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.lowest().name, "D65");

        let none: CaptureMetadata = format!(r#"{{"colorMatrix1": {IDENTITY}}}"#).parse().unwrap();
        assert!(matches!(none.calibration_set(), Err(ColorError::Metadata(_))));
    }

    #[test]
    fn test_plane_count_validation() {
        let meta: CaptureMetadata = r#"{"colorMatrix1": [1, 2, 3, 4]}"#.parse().unwrap();
        assert!(meta.plane_count().is_err());
        assert!(CaptureMetadata::default().plane_count().is_err());
        let four: CaptureMetadata =
            r#"{"colorMatrix1": [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 1, 0]}"#.parse().unwrap();
        assert_eq!(four.plane_count().unwrap(), 4);
    }

    #[test]
    fn test_analog_balance_and_neutral() {
        let meta: CaptureMetadata =
            r#"{"analogBalance": [2.0], "asShotNeutral": [0.5, 1.0]}"#.parse().unwrap();
        let ab = meta.analog_balance(3).unwrap();
        assert_eq!(ab.matrix().get(0, 0), 2.0);
        assert_eq!(ab.matrix().get(2, 2), 1.0);
        assert!(matches!(meta.as_shot_neutral(3), Err(ColorError::Metadata(_))));
        assert_eq!(capture().as_shot_neutral(3).unwrap().as_slice(), &[0.5, 1.0, 0.8]);
    }

    #[test]
    fn test_white_balance_priority() {
        let gains = capture().white_balance_gains();
        assert!((gains.r - 2.0).abs() < 1e-6);
        assert!((gains.b - 1.25).abs() < 1e-6);

        let record: CaptureMetadata = r#"{
            "wbGains": {"r": 1.8, "gEven": 1.0, "gOdd": 1.2, "b": 1.4},
            "colorCorrectionGains": [3, 1, 1, 3]
        }"#
        .parse()
        .unwrap();
        let gains = record.white_balance_gains();
        assert_eq!((gains.r, gains.g_even, gains.g_odd, gains.b), (1.8, 1.0, 1.2, 1.4));

        let cc: CaptureMetadata =
            r#"{"colorCorrectionGains": [2.0, 1.0, 1.1, 1.5]}"#.parse().unwrap();
        assert_eq!(cc.white_balance_gains().g_odd, 1.1);

        assert_eq!(CaptureMetadata::default().white_balance_gains(), WhiteBalanceGains::UNITY);
    }

    #[test]
    fn test_fixed_variants_in_order_without_duplicates() {
        let sources = capture().fixed_ccm_sources().unwrap();
        let labels: Vec<&str> = sources.iter().map(|s| s.label()).collect();
        // forwardMatrix1 repeats colorMatrix2
        assert_eq!(labels, vec!["colorCorrectionTransform", "colorMatrix1", "colorMatrix2"]);
    }

    #[test]
    fn test_ccm_key_overrides_candidates() {
        let meta: CaptureMetadata = format!(r#"{{"ccm": {IDENTITY}, "colorMatrix1": {IDENTITY}}}"#)
            .parse()
            .unwrap();
        let sources = meta.fixed_ccm_sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].label(), "ccm");
        assert!(matches!(
            CaptureMetadata::default().fixed_ccm_sources(),
            Err(ColorError::Metadata(_))
        ));
    }

    #[test]
    fn test_ccm_sources_include_interpolated() {
        let sources = capture().ccm_sources().unwrap();
        let last = sources.last().unwrap();
        assert_eq!(last.label(), INTERPOLATED_LABEL);
        let resolved = last.resolve().unwrap();
        let blend = resolved.blend.unwrap();
        // the neutral sits well above 6504K, so the D65 calibration is used alone
        assert_eq!(blend.weight, 0.0);
        assert_eq!(blend.low.name, "D65");
        assert_eq!(blend.high.name, "D65");
        assert!(blend.converged);
        assert_eq!(resolved.matrix, IDENTITY_CCM);

        let fixed_only: CaptureMetadata =
            format!(r#"{{"colorMatrix1": {IDENTITY}}}"#).parse().unwrap();
        let sources = fixed_only.ccm_sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].resolve().unwrap().matrix, IDENTITY_CCM);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"whiteLevel": 4095, "blackLevel": 256}}"#).unwrap();
        let meta = CaptureMetadata::load(file.path()).unwrap();
        assert_eq!(meta.white_level(), 4095.0);
        assert_eq!(meta.black_levels(), vec![256.0]);
        assert!(matches!("{not json".parse::<CaptureMetadata>(), Err(ColorError::Json(_))));
    }
}
