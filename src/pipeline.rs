use std::time::Instant;

use ndarray::{Array3, Axis};
use tracing::debug;

use crate::ccm::ResolvedCcm;
use crate::cfa::CfaPattern;
use crate::demosaic::demosaic;
use crate::pixels::{RawMosaic, RenderedStages, RgbImage, SubPixel};
use crate::parallel::prelude::*;
use crate::white_balance::WhiteBalanceGains;

pub const DEFAULT_GAMMA: SubPixel = 2.2;
pub const DEFAULT_WHITE_LEVEL: f64 = 1023.0;

const LEVEL_RANGE_FLOOR: SubPixel = 1e-6;

/// Sensor black and white points in raw units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorLevels {
    black: [SubPixel; 4],
    white: SubPixel,
}

impl SensorLevels {
    /// Up to four black levels in CFA order; shorter lists repeat, an
    /// empty list means zero.
    pub fn new(black: &[f64], white: f64) -> Self {
        let mut levels = [0.0; 4];
        if !black.is_empty() {
            for (i, level) in levels.iter_mut().enumerate() {
                *level = black[i % black.len()] as SubPixel;
            }
        }
        SensorLevels {
            black: levels,
            white: white as SubPixel,
        }
    }

    pub fn black(&self) -> [SubPixel; 4] {
        self.black
    }

    pub fn black_mean(&self) -> SubPixel {
        self.black.iter().sum::<SubPixel>() / 4.0
    }

    pub fn white(&self) -> SubPixel {
        self.white
    }

    /// Maps raw readings to [0, 1] against the mean black level.
    pub fn normalize(&self, mosaic: &RawMosaic) -> RawMosaic {
        let black = self.black_mean();
        let range = (self.white - black).max(LEVEL_RANGE_FLOOR);
        let normalized = mosaic.view().mapv(|v| ((v - black) / range).clamp(0.0, 1.0));
        RawMosaic::wrap(normalized)
    }
}

/// Mosaic as RGB, each reading in its own CFA channel and zero elsewhere.
pub fn photosites(mosaic: &RawMosaic, cfa: &CfaPattern) -> RgbImage {
    let view = mosaic.view();
    let (height, width) = view.dim();
    let mut rgb = Array3::<SubPixel>::zeros((height, width, 3));
    rgb.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(row, mut line)| {
            for col in 0..width {
                line[[col, cfa.color_at(row, col).index()]] = view[[row, col]];
            }
        });
    RgbImage::wrap(rgb)
}

/// An RGB to RGB step of the render.
pub trait PipelineStage {
    fn name(&self) -> String;
    fn process(&self, image: &RgbImage) -> RgbImage;
}

pub struct WhiteBalance(pub WhiteBalanceGains);

impl PipelineStage for WhiteBalance {
    fn name(&self) -> String {
        "White Balance".to_string()
    }

    fn process(&self, image: &RgbImage) -> RgbImage {
        self.0.apply(image)
    }
}

pub struct ColorCorrection<'a>(pub &'a ResolvedCcm);

impl PipelineStage for ColorCorrection<'_> {
    fn name(&self) -> String {
        format!("CCM ({})", self.0.label)
    }

    fn process(&self, image: &RgbImage) -> RgbImage {
        self.0.apply(image)
    }
}

pub struct Gamma<'a> {
    pub gamma: SubPixel,
    pub label: &'a str,
}

impl PipelineStage for Gamma<'_> {
    fn name(&self) -> String {
        format!("Gamma ({})", self.label)
    }

    fn process(&self, image: &RgbImage) -> RgbImage {
        let gamma = self.gamma;
        image.map_pixels(|px| px.map(|v| gamma_encode(v, gamma)))
    }
}

/// Clamps to [0, 1] then raises to `1 / gamma`. Non-positive gamma only
/// clamps.
#[inline]
pub fn gamma_encode(v: SubPixel, gamma: SubPixel) -> SubPixel {
    let v = v.clamp(0.0, 1.0);
    if gamma > 0.0 {
        v.powf(1.0 / gamma)
    } else {
        v
    }
}

/// Stages shared by every CCM variant.
struct BaseStages {
    black_level: RgbImage,
    demosaic: RgbImage,
    white_balance: RgbImage,
}

/// One CCM variant's full stage list.
#[derive(Clone, Debug)]
pub struct RenderedVariant {
    pub ccm: ResolvedCcm,
    pub stages: RenderedStages,
}

/// Black level, demosaic, white balance, CCM and gamma, each kept as a
/// named snapshot.
#[derive(Clone, Debug)]
pub struct RenderPipeline {
    cfa: CfaPattern,
    levels: SensorLevels,
    white_balance: WhiteBalanceGains,
    gamma: SubPixel,
}

impl RenderPipeline {
    pub fn new(cfa: CfaPattern, levels: SensorLevels) -> Self {
        RenderPipeline {
            cfa,
            levels,
            white_balance: WhiteBalanceGains::UNITY,
            gamma: DEFAULT_GAMMA,
        }
    }

    pub fn with_white_balance(mut self, white_balance: WhiteBalanceGains) -> Self {
        self.white_balance = white_balance;
        self
    }

    pub fn with_gamma(mut self, gamma: SubPixel) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn cfa(&self) -> CfaPattern {
        self.cfa
    }

    pub fn white_balance(&self) -> WhiteBalanceGains {
        self.white_balance
    }

    pub fn render(&self, mosaic: &RawMosaic, ccm: &ResolvedCcm) -> RenderedStages {
        let base = self.base_stages(mosaic);
        self.finish(&base, ccm)
    }

    /// Renders every CCM against a single pass of the shared stages.
    pub fn render_variants(
        &self,
        mosaic: &RawMosaic,
        ccms: &[ResolvedCcm],
    ) -> Vec<RenderedVariant> {
        let base = self.base_stages(mosaic);
        ccms.iter()
            .map(|ccm| RenderedVariant {
                ccm: ccm.clone(),
                stages: self.finish(&base, ccm),
            })
            .collect()
    }

    fn base_stages(&self, mosaic: &RawMosaic) -> BaseStages {
        let now = Instant::now();
        let normalized = self.levels.normalize(mosaic);
        let black_level = photosites(&normalized, &self.cfa);
        debug!(elapsed = ?now.elapsed(), black_mean = self.levels.black_mean(), "Black Level");

        let now = Instant::now();
        let demosaiced = demosaic(&normalized, &self.cfa);
        debug!(elapsed = ?now.elapsed(), cfa = %self.cfa, "Demosaic");

        let white_balance = run_stage(&WhiteBalance(self.white_balance), &demosaiced);

        BaseStages {
            black_level,
            demosaic: demosaiced,
            white_balance,
        }
    }

    fn finish(&self, base: &BaseStages, ccm: &ResolvedCcm) -> RenderedStages {
        let corrected = run_stage(&ColorCorrection(ccm), &base.white_balance);
        let gamma = Gamma {
            gamma: self.gamma,
            label: &ccm.label,
        };
        let encoded = run_stage(&gamma, &corrected);

        let mut stages = RenderedStages::default();
        stages.push("Black Level", base.black_level.clone());
        stages.push("Demosaic", base.demosaic.clone());
        stages.push("White Balance", base.white_balance.clone());
        stages.push(ColorCorrection(ccm).name(), corrected);
        stages.push(gamma.name(), encoded);
        stages
    }
}

fn run_stage(stage: &dyn PipelineStage, image: &RgbImage) -> RgbImage {
    let now = Instant::now();
    let out = stage.process(image);
    debug!(elapsed = ?now.elapsed(), "{}", stage.name());
    out
}
