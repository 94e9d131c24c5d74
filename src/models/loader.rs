//! Asset loading: ONNX regression model, feature manifest and category baselines

use crate::config::AssetsConfig;
use crate::error::PipelineError;
use crate::schema::{CategoryBaselines, FeatureManifest};
use once_cell::sync::OnceCell;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{Tensor, ValueType};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A trained regression model: numeric feature vector in, scalar out.
pub trait Regressor: Send + Sync {
    /// Run the model on one row of features.
    fn predict(&self, features: &[f32]) -> Result<f64, PipelineError>;

    /// Input width the model declares, if it declares a fixed one.
    fn input_width(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str;
}

/// ONNX Runtime session wrapped for shared use across requests
pub struct OnnxRegressor {
    /// Model name (file stem)
    name: String,
    /// Session; `run` needs exclusive access
    session: Mutex<Session>,
    /// Input name for the model
    input_name: String,
    /// Output name holding the regression value
    output_name: String,
    /// Declared feature count, when the graph fixes it
    input_width: Option<usize>,
}

impl OnnxRegressor {
    /// Load a regression model from an `.onnx` file
    pub fn load<P: AsRef<Path>>(path: P, intra_threads: usize) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());

        info!(model = %name, path = %path.display(), threads = intra_threads, "Loading ONNX model");

        if !path.exists() {
            return Err(PipelineError::asset_load(
                "model",
                format!("{} not found", path.display()),
            ));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(intra_threads))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| PipelineError::asset_load("model", format!("{}: {}", path.display(), e)))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| PipelineError::asset_load("model", "graph declares no inputs"))?;
        let input_name = input.name.clone();
        let input_width = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape
                .last()
                .copied()
                .filter(|d| *d > 0)
                .map(|d| d as usize),
            _ => None,
        };

        let output_name = session
            .outputs
            .iter()
            .find(|o| {
                o.name.contains("variable") || o.name.contains("output") || o.name.contains("prediction")
            })
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .ok_or_else(|| PipelineError::asset_load("model", "graph declares no outputs"))?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            input_width = ?input_width,
            "Model loaded successfully"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
            input_width,
        })
    }
}

impl Regressor for OnnxRegressor {
    fn predict(&self, features: &[f32]) -> Result<f64, PipelineError> {
        // Input tensor shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .map_err(|e| PipelineError::Prediction(format!("failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::Prediction(format!("lock error: {}", e)))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(|e| PipelineError::Prediction(format!("model {} rejected input: {}", self.name, e)))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| PipelineError::Prediction(format!("missing output {}", self.output_name)))?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Prediction(format!("unexpected output type: {}", e)))?;

        let value = data
            .first()
            .copied()
            .ok_or_else(|| PipelineError::Prediction("model produced an empty output".to_string()))?;

        debug!(model = %self.name, value = value, "Extracted regression output");

        Ok(value as f64)
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Everything the pipeline needs from training, loaded once.
pub struct Assets {
    pub model: Box<dyn Regressor>,
    pub manifest: Arc<FeatureManifest>,
    pub baselines: CategoryBaselines,
}

impl Assets {
    /// Bundle artifacts after checking they agree with each other.
    pub fn new(
        model: Box<dyn Regressor>,
        manifest: FeatureManifest,
        baselines: CategoryBaselines,
    ) -> Result<Self, PipelineError> {
        if let Some(width) = model.input_width() {
            if width != manifest.len() {
                return Err(PipelineError::asset_load(
                    "feature manifest",
                    format!(
                        "manifest has {} columns but model {} expects {}",
                        manifest.len(),
                        model.name(),
                        width
                    ),
                ));
            }
        }
        baselines.check_against(&manifest)?;

        Ok(Self {
            model,
            manifest: Arc::new(manifest),
            baselines,
        })
    }
}

impl std::fmt::Debug for Assets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assets")
            .field("model", &self.model.name())
            .field("manifest_columns", &self.manifest.len())
            .field("baselines", &self.baselines)
            .finish()
    }
}

/// Where assets come from.
pub trait AssetSource: Send + Sync {
    fn fetch(&self) -> Result<Assets, PipelineError>;
}

/// Reads artifacts from the paths in configuration.
pub struct FileAssetSource {
    model_path: PathBuf,
    manifest_path: PathBuf,
    baselines_path: PathBuf,
    onnx_threads: usize,
}

impl FileAssetSource {
    pub fn new(config: &AssetsConfig) -> Self {
        Self {
            model_path: PathBuf::from(&config.model_path),
            manifest_path: PathBuf::from(&config.manifest_path),
            baselines_path: PathBuf::from(&config.baselines_path),
            onnx_threads: config.onnx_threads,
        }
    }

    fn read(path: &Path, artifact: &str) -> Result<Vec<u8>, PipelineError> {
        std::fs::read(path)
            .map_err(|e| PipelineError::asset_load(artifact, format!("{}: {}", path.display(), e)))
    }

    pub fn load_manifest(&self) -> Result<FeatureManifest, PipelineError> {
        let bytes = Self::read(&self.manifest_path, "feature manifest")?;
        let manifest = FeatureManifest::from_json(&bytes)?;
        info!(path = %self.manifest_path.display(), columns = manifest.len(), "Feature manifest loaded");
        Ok(manifest)
    }

    pub fn load_baselines(&self) -> Result<CategoryBaselines, PipelineError> {
        let bytes = Self::read(&self.baselines_path, "category baselines")?;
        let baselines = CategoryBaselines::from_json(&bytes)?;
        info!(path = %self.baselines_path.display(), baselines = ?baselines, "Category baselines loaded");
        Ok(baselines)
    }
}

impl AssetSource for FileAssetSource {
    fn fetch(&self) -> Result<Assets, PipelineError> {
        // Cheap artifacts first so a bad manifest fails before the session is built
        let manifest = self.load_manifest()?;
        let baselines = self.load_baselines()?;
        let model = OnnxRegressor::load(&self.model_path, self.onnx_threads)?;
        Assets::new(Box::new(model), manifest, baselines)
    }
}

/// Once-initialized handle over an asset source.
///
/// The first `load` performs the fetch; concurrent callers block on it and
/// every later caller gets the same `Arc`. A failed fetch leaves the cell
/// empty and is reported to the caller.
pub struct AssetLoader<S: AssetSource> {
    source: S,
    cell: OnceCell<Arc<Assets>>,
}

impl<S: AssetSource> AssetLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    pub fn load(&self) -> Result<Arc<Assets>, PipelineError> {
        self.cell
            .get_or_try_init(|| self.source.fetch().map(Arc::new))
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}
