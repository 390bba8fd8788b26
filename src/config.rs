use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ccm::{CcmSource, INTERPOLATED_LABEL};
use crate::cfa::CfaPattern;
use crate::error::{ColorError, Result};
use crate::pipeline::DEFAULT_GAMMA;
use crate::pixels::SubPixel;
use crate::white_balance::WhiteBalanceGains;

pub const DEFAULT_OUTPUT_DIR: &str = "pipeline_outputs";

/// Which CCM variants a render produces.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(try_from = "RawCcmSelection", into = "RawCcmSelection")]
pub enum CcmSelection {
    #[default]
    All,
    Interpolated,
    Labels(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawCcmSelection {
    Keyword(String),
    Labels(Vec<String>),
}

impl TryFrom<RawCcmSelection> for CcmSelection {
    type Error = ColorError;

    fn try_from(raw: RawCcmSelection) -> Result<Self> {
        match raw {
            RawCcmSelection::Keyword(k) => match k.to_lowercase().as_str() {
                "all" => Ok(CcmSelection::All),
                "interpolated" => Ok(CcmSelection::Interpolated),
                _ => Err(ColorError::Config(format!(
                    "ccm must be \"all\", \"interpolated\" or a list of labels, got \"{k}\""
                ))),
            },
            RawCcmSelection::Labels(labels) if labels.is_empty() => {
                Err(ColorError::Config("ccm label list is empty".to_string()))
            }
            RawCcmSelection::Labels(labels) => Ok(CcmSelection::Labels(labels)),
        }
    }
}

impl From<CcmSelection> for RawCcmSelection {
    fn from(selection: CcmSelection) -> Self {
        match selection {
            CcmSelection::All => RawCcmSelection::Keyword("all".to_string()),
            CcmSelection::Interpolated => RawCcmSelection::Keyword("interpolated".to_string()),
            CcmSelection::Labels(labels) => RawCcmSelection::Labels(labels),
        }
    }
}

impl CcmSelection {
    /// Keeps the sources this selection names, in their original order.
    pub fn filter(&self, sources: Vec<CcmSource>) -> Vec<CcmSource> {
        match self {
            CcmSelection::All => sources,
            CcmSelection::Interpolated => sources
                .into_iter()
                .filter(|s| s.label() == INTERPOLATED_LABEL)
                .collect(),
            CcmSelection::Labels(labels) => {
                for label in labels {
                    if !sources.iter().any(|s| s.label() == label) {
                        warn!(label = %label, "requested CCM not present in metadata");
                    }
                }
                sources
                    .into_iter()
                    .filter(|s| labels.iter().any(|l| l == s.label()))
                    .collect()
            }
        }
    }
}

/// Render settings read from TOML.
///
/// ```toml
/// gamma = 2.2
/// ccm = ["colorMatrix1", "colorMatrix_interpolated"]
/// output_dir = "pipeline_outputs"
/// cfa_pattern = "RGGB"
/// white_balance = [2.0, 1.0, 1.6]
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub gamma: SubPixel,
    pub ccm: CcmSelection,
    pub output_dir: PathBuf,
    pub cfa_pattern: Option<CfaPattern>,
    pub white_balance: Option<[SubPixel; 3]>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            gamma: DEFAULT_GAMMA,
            ccm: CcmSelection::All,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            cfa_pattern: None,
            white_balance: None,
        }
    }
}

impl RenderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        std::fs::read_to_string(path)?.parse()
    }

    pub fn white_balance_gains(&self) -> Option<WhiteBalanceGains> {
        self.white_balance.map(WhiteBalanceGains::from_rgb)
    }

    fn validate(self) -> Result<Self> {
        if !self.gamma.is_finite() {
            return Err(ColorError::Config(format!("gamma must be finite, got {}", self.gamma)));
        }
        if let Some(gains) = self.white_balance {
            if gains.iter().any(|g| !g.is_finite() || *g < 0.0) {
                return Err(ColorError::Config(format!(
                    "white_balance gains must be non-negative, got {gains:?}"
                )));
            }
        }
        Ok(self)
    }
}

impl FromStr for RenderConfig {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self> {
        let config: RenderConfig = toml::from_str(s)?;
        config.validate()
    }
}
