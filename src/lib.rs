//! Colorimetric rendering of Bayer RAW captures.
//!
//! A mosaic goes through black level normalization, bilinear demosaic,
//! white balance, a color correction matrix and gamma encoding, and every
//! step is kept as a named image. The color matrix can be one of the fixed
//! matrices shipped with the capture or one interpolated between
//! calibration illuminants for the scene's white point.

pub mod calibration;
pub mod ccm;
pub mod cfa;
pub mod config;
pub mod demosaic;
pub mod error;
pub mod export;
pub mod illuminant;
pub mod interpolate;
pub mod logger;
pub mod matrix;
pub mod metadata;
pub mod parallel;
pub mod pipeline;
pub mod pixels;
pub mod temperature;
pub mod white_balance;

pub use ccm::{CcmSource, ResolvedCcm};
pub use cfa::CfaPattern;
pub use error::{ColorError, Result};
pub use pipeline::{RenderPipeline, RenderedVariant, SensorLevels};
pub use pixels::{RawMosaic, RenderedStage, RenderedStages, RgbImage};
