use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use ndarray::{s, Array2};
use rawler::imgop::xyz::Illuminant;
use rawler::{RawImage, RawImageData};
use serde_json::json;
use tracing::{info, warn};

use rawcolor::config::RenderConfig;
use rawcolor::export::{self, COMPARISON_FILE};
use rawcolor::metadata::CaptureMetadata;
use rawcolor::{logger, CfaPattern, RawMosaic, RenderPipeline};

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Render every color pipeline stage of a RAW capture",
    long_about = None
)]
struct Args {
    /// RAW file to render
    #[arg(value_name = "INPUT")]
    input_path: PathBuf,

    /// Capture metadata JSON; defaults to what the RAW file carries
    #[arg(short, long, value_name = "METADATA")]
    metadata: Option<PathBuf>,

    /// Render config TOML
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Output directory, overriding the config
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

/// Active-area mosaic and the CFA layout as seen from its top-left corner.
fn active_mosaic(raw: &RawImage) -> anyhow::Result<(RawMosaic, rawler::CFA)> {
    if raw.cpp != 1 {
        bail!("expected a single-plane mosaic, got {} components per pixel", raw.cpp);
    }
    let dim = raw.dim();
    let data: Vec<f32> = match &raw.data {
        RawImageData::Integer(data) => data.iter().map(|v| *v as f32).collect(),
        RawImageData::Float(data) => data.clone(),
    };
    let full = Array2::from_shape_vec((dim.h, dim.w), data)
        .context("raw data does not match its dimensions")?;

    let (x, y, w, h) = match &raw.crop_area {
        Some(rect) => (rect.p.x, rect.p.y, rect.d.w, rect.d.h),
        None => (0, 0, dim.w, dim.h),
    };
    if x + w > dim.w || y + h > dim.h {
        bail!("crop area {w}x{h}+{x}+{y} exceeds the {}x{} sensor", dim.w, dim.h);
    }
    let cropped = full.slice(s![y..y + h, x..x + w]).to_owned();
    Ok((RawMosaic::from_array(cropped)?, raw.camera.cfa.shift(x, y)))
}

/// Metadata assembled from the RAW file itself when no JSON is supplied.
fn metadata_from_raw(raw: &RawImage) -> anyhow::Result<CaptureMetadata> {
    let black: Vec<f64> = raw.blacklevel.as_bayer_array().iter().map(|v| *v as f64).collect();
    let white = raw.whitelevel.as_bayer_array()[0] as f64;
    let (r, g, b) = (raw.wb_coeffs[0] as f64, raw.wb_coeffs[1] as f64, raw.wb_coeffs[2] as f64);
    let mut value = json!({
        "whiteLevel": white,
        "blackLevel": black,
    });
    if [r, g, b].iter().all(|v| v.is_finite() && *v > 0.0) {
        value["wbGains"] = json!([r / g, 1.0, b / g]);
    }
    if let Some(matrix) = raw.camera.color_matrix.get(&Illuminant::D65) {
        value["colorMatrix1"] = json!(matrix);
        value["calibrationIlluminant1"] = json!(21);
    }
    Ok(serde_json::from_value(value)?)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(args.verbose);

    let config = match &args.config {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => RenderConfig::default(),
    };

    let decode = Instant::now();
    let raw = rawler::decode_file(&args.input_path)
        .map_err(|e| anyhow!("failed to decode {}: {e}", args.input_path.display()))?;
    info!("decode file: {:.2?}", decode.elapsed());

    let metadata = match &args.metadata {
        Some(path) => CaptureMetadata::load(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => metadata_from_raw(&raw)?,
    };

    let (mosaic, raw_cfa) = active_mosaic(&raw)?;
    let cfa: CfaPattern = match config.cfa_pattern {
        Some(cfa) => cfa,
        None => {
            let name = raw_cfa.to_string();
            name.parse().with_context(|| format!("unsupported CFA {name}"))?
        }
    };
    if let (Some(w), Some(h)) = (metadata.width, metadata.height) {
        if (w as usize, h as usize) != (mosaic.width(), mosaic.height()) {
            warn!(
                "metadata dimensions ({w}x{h}) do not match the RAW ({}x{}); using the RAW size",
                mosaic.width(),
                mosaic.height()
            );
        }
    }

    let white_balance = config
        .white_balance_gains()
        .unwrap_or_else(|| metadata.white_balance_gains());
    info!(
        r = white_balance.r,
        g = white_balance.green(),
        b = white_balance.b,
        "white balance gains"
    );

    let levels = metadata.sensor_levels();
    info!(black = ?levels.black(), white = levels.white(), "sensor levels");
    let pipeline = RenderPipeline::new(cfa, levels)
        .with_white_balance(white_balance)
        .with_gamma(config.gamma);

    let sources = config.ccm.filter(metadata.ccm_sources()?);
    let ccms = sources
        .iter()
        .map(|source| {
            source
                .resolve_or_fallback()
                .with_context(|| format!("resolving CCM {}", source.label()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    if ccms.is_empty() {
        bail!("no CCM left to render");
    }
    for blend in ccms.iter().filter_map(|c| c.blend.as_ref()) {
        info!(
            weight = %format!("{:.3}", blend.weight),
            white_cct = %blend.cct.map(|c| format!("{c:.0}K")).unwrap_or_else(|| "N/A".to_string()),
            low = %format!("{} ({:.0}K)", blend.low.name, blend.low.cct),
            high = %format!("{} ({:.0}K)", blend.high.name, blend.high.cct),
            converged = blend.converged,
            "interpolated CCM"
        );
    }

    let now = Instant::now();
    let variants = pipeline.render_variants(&mosaic, &ccms);
    info!("pixel pipeline time: {:.2?}", now.elapsed());

    let output_root = args.output.clone().unwrap_or_else(|| config.output_dir.clone());
    for variant in &variants {
        info!("Processing CCM: {}", variant.ccm.label);
        let dir = output_root.join(export::variant_dir_name(&variant.ccm.label));
        export::save_stages(&variant.stages, &dir)?;
    }
    if let Some(diff) = export::comparison_image(&variants)? {
        let path = output_root.join(COMPARISON_FILE);
        export::save_png(&diff, &path)?;
        info!("Saved {}", path.display());
    }
    info!("total time: {:.2?}", decode.elapsed());
    Ok(())
}
