use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::ccm::INTERPOLATED_LABEL;
use crate::error::{ColorError, Result};
use crate::pipeline::RenderedVariant;
use crate::pixels::{RenderedStages, RgbImage};

pub const COMPARISON_FILE: &str = "comparison_abs_diff_x4.png";
pub const COMPARISON_GAIN: f32 = 4.0;

/// Variant compared against the interpolated one.
pub const COMPARISON_BASELINE: &str = "colorMatrix1";

/// `CCM (colorMatrix1)` becomes `stage_ccm_(colormatrix1).png`.
pub fn stage_file_name(stage: &str) -> String {
    format!("stage_{}.png", stage.to_lowercase().replace(' ', "_"))
}

/// Directory name for a CCM variant label.
pub fn variant_dir_name(label: &str) -> String {
    let safe: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let slug = safe.trim_matches('_').to_lowercase();
    if slug.is_empty() {
        "ccm".to_string()
    } else {
        slug
    }
}

pub fn to_rgb8(image: &RgbImage) -> Result<image::RgbImage> {
    let (width, height) = (image.width(), image.height());
    image::RgbImage::from_raw(width as u32, height as u32, image.to_rgb8())
        .ok_or(ColorError::InvalidDimensions(width, height))
}

pub fn save_png(image: &RgbImage, path: &Path) -> Result<()> {
    to_rgb8(image)?.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

/// Writes every stage as `stage_<slug>.png` under `dir`, creating it.
pub fn save_stages(stages: &RenderedStages, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(stages.len());
    for stage in stages.iter() {
        let path = dir.join(stage_file_name(&stage.name));
        save_png(&stage.image, &path)?;
        info!("Saved {}", path.display());
        written.push(path);
    }
    Ok(written)
}

/// Amplified difference between the final stages of the baseline and
/// interpolated variants, when both were rendered.
pub fn comparison_image(variants: &[RenderedVariant]) -> Result<Option<RgbImage>> {
    let last = |label: &str| {
        variants
            .iter()
            .find(|v| v.ccm.label == label)
            .and_then(|v| v.stages.last())
    };
    match (last(COMPARISON_BASELINE), last(INTERPOLATED_LABEL)) {
        (Some(baseline), Some(interpolated)) => Ok(Some(
            baseline.image.abs_difference(&interpolated.image, COMPARISON_GAIN)?,
        )),
        _ => Ok(None),
    }
}
