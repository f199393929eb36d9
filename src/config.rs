use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::geometry::{FrameBounds, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::session::SessionConfig;
use crate::storage::StoreKind;
use crate::vision::PIPELINE_NAMES;

const DEFAULT_SOURCE: &str = "stub://fall";
const DEFAULT_PIPELINE: &str = "cpu";
const DEFAULT_STORE_PATH: &str = "templates.db";
/// Neighbour count used by the command-line tools.
pub const DEFAULT_CLI_K: usize = 20;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FallwatchConfigFile {
    pipeline: Option<String>,
    source: Option<SourceConfigFile>,
    templates: Option<TemplatesConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    session: Option<SessionConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    uri: Option<String>,
    frame_limit: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TemplatesConfigFile {
    store: Option<StoreKind>,
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClassifierConfigFile {
    k: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SessionConfigFile {
    box_window: Option<usize>,
    classification_window: Option<usize>,
    fall_frame_threshold: Option<u32>,
    classify: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    overlay_dir: Option<PathBuf>,
    capture_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallwatchConfig {
    pub source: SourceSettings,
    pub pipeline: String,
    pub templates: TemplateSettings,
    pub k: usize,
    pub session: SessionConfig,
    pub overlay_dir: Option<PathBuf>,
    pub capture_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub uri: String,
    pub frame_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSettings {
    pub store: StoreKind,
    pub path: PathBuf,
}

impl Default for FallwatchConfig {
    fn default() -> Self {
        Self::from_file(FallwatchConfigFile::default())
    }
}

impl FallwatchConfig {
    /// Defaults, then the TOML file named by `FALLWATCH_CONFIG`, then
    /// `FALLWATCH_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FALLWATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like [`FallwatchConfig::load`] with an explicit file, which takes
    /// precedence over `FALLWATCH_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FallwatchConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let templates = file.templates.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        let defaults = SessionConfig::default();

        Self {
            source: SourceSettings {
                uri: source.uri.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                frame_limit: source.frame_limit,
            },
            pipeline: file.pipeline.unwrap_or_else(|| DEFAULT_PIPELINE.to_string()),
            templates: TemplateSettings {
                store: templates.store.unwrap_or(StoreKind::Sqlite),
                path: templates
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            },
            k: file
                .classifier
                .and_then(|classifier| classifier.k)
                .unwrap_or(DEFAULT_CLI_K),
            session: SessionConfig {
                box_window: session.box_window.unwrap_or(defaults.box_window),
                classification_window: session
                    .classification_window
                    .unwrap_or(defaults.classification_window),
                fall_frame_threshold: session
                    .fall_frame_threshold
                    .unwrap_or(defaults.fall_frame_threshold),
                classify: session.classify.unwrap_or(defaults.classify),
                bounds: FrameBounds::new(
                    source.width.unwrap_or(SCREEN_WIDTH),
                    source.height.unwrap_or(SCREEN_HEIGHT),
                ),
            },
            overlay_dir: output.overlay_dir,
            capture_dir: output.capture_dir,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(uri) = env_value("FALLWATCH_SOURCE") {
            self.source.uri = uri;
        }
        if let Some(limit) = env_value("FALLWATCH_FRAME_LIMIT") {
            let limit: u64 = limit
                .parse()
                .map_err(|_| anyhow!("FALLWATCH_FRAME_LIMIT must be a non-negative integer"))?;
            self.source.frame_limit = Some(limit);
        }
        if let Some(pipeline) = env_value("FALLWATCH_PIPELINE") {
            self.pipeline = pipeline;
        }
        if let Some(store) = env_value("FALLWATCH_TEMPLATE_STORE") {
            self.templates.store = store.parse()?;
        }
        if let Some(path) = env_value("FALLWATCH_TEMPLATE_PATH") {
            self.templates.path = PathBuf::from(path);
        }
        if let Some(k) = env_value("FALLWATCH_K") {
            self.k = k
                .parse()
                .map_err(|_| anyhow!("FALLWATCH_K must be a positive integer"))?;
        }
        if let Some(threshold) = env_value("FALLWATCH_FALL_THRESHOLD") {
            self.session.fall_frame_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("FALLWATCH_FALL_THRESHOLD must be a non-negative integer"))?;
        }
        if let Some(dir) = env_value("FALLWATCH_OVERLAY_DIR") {
            self.overlay_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = env_value("FALLWATCH_CAPTURE_DIR") {
            self.capture_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Normalise the pipeline name and reject unusable values. Run again
    /// after applying command-line overrides.
    pub fn validate(&mut self) -> Result<()> {
        self.pipeline = self.pipeline.trim().to_ascii_lowercase();
        if !PIPELINE_NAMES.contains(&self.pipeline.as_str()) {
            return Err(anyhow!(
                "pipeline must be one of: {}",
                PIPELINE_NAMES.join(", ")
            ));
        }
        if self.k == 0 {
            return Err(anyhow!("classifier k must be greater than zero"));
        }
        if self.session.box_window == 0 || self.session.classification_window == 0 {
            return Err(anyhow!("session windows must be greater than zero"));
        }
        if self.session.bounds.width == 0 || self.session.bounds.height == 0 {
            return Err(anyhow!("frame width and height must be greater than zero"));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<FallwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
