use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow, bail};
use image::{ImageReader, RgbImage, imageops::FilterType};
use tokio::sync::OnceCell;
use tracing::info;
use tract_onnx::prelude::*;

/// Square input resolution expected by the EfficientNet-B0 export.
pub const INPUT_SIZE: u32 = 224;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// The seven lesion categories, in the order of the classifier's output head.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LesionClass {
    ActinicKeratoses,
    BasalCellCarcinoma,
    BenignKeratosisLikeLesions,
    Dermatofibroma,
    Melanoma,
    MelanocyticNevi,
    VascularLesions,
}

impl LesionClass {
    pub const ALL: [LesionClass; 7] = [
        LesionClass::ActinicKeratoses,
        LesionClass::BasalCellCarcinoma,
        LesionClass::BenignKeratosisLikeLesions,
        LesionClass::Dermatofibroma,
        LesionClass::Melanoma,
        LesionClass::MelanocyticNevi,
        LesionClass::VascularLesions,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LesionClass::ActinicKeratoses => "Actinic_Keratoses",
            LesionClass::BasalCellCarcinoma => "Basal_Cell_Carcinoma",
            LesionClass::BenignKeratosisLikeLesions => "Benign_Keratosis_like_Lesions",
            LesionClass::Dermatofibroma => "Dermatofibroma",
            LesionClass::Melanoma => "Melanoma",
            LesionClass::MelanocyticNevi => "Melanocytic_Nevi",
            LesionClass::VascularLesions => "Vascular_Lesions",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for LesionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Top-1 output of a forward pass. `confidence` is a percentage in `0..=100`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub class: LesionClass,
    pub confidence: f32,
}

/// Process-wide handle to the lesion classifier.
///
/// Weights are read on the first call to [`LesionClassifier::predict`] and shared by every
/// clone afterwards. Concurrent first callers wait on the same load. A failed load leaves the
/// cell empty, so the next request attempts it again.
#[derive(Clone)]
pub struct LesionClassifier {
    model_path: PathBuf,
    plan: Arc<OnceCell<Arc<OnnxPlan>>>,
}

impl LesionClassifier {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            plan: Arc::new(OnceCell::new()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.plan.initialized()
    }

    pub async fn predict(&self, image_path: &Path) -> Result<Prediction> {
        let plan = self.loaded_plan().await?;
        let image_path = image_path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let input = preprocess(&image_path)?;
            run_plan(&plan, input)
        })
        .await
        .context("inference task panicked")?
    }

    async fn loaded_plan(&self) -> Result<Arc<OnnxPlan>> {
        self.plan
            .get_or_try_init(|| async {
                let path = self.model_path.clone();
                let plan = tokio::task::spawn_blocking(move || load_plan(&path))
                    .await
                    .context("classifier load task panicked")??;
                info!(model = %self.model_path.display(), "lesion classifier loaded");
                Ok::<_, anyhow::Error>(Arc::new(plan))
            })
            .await
            .cloned()
    }
}

fn load_plan(path: &Path) -> Result<OnnxPlan> {
    if !path.is_file() {
        bail!("classifier weights not found at {}", path.display());
    }

    let side = INPUT_SIZE as usize;
    tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse classifier weights at {}", path.display()))?
        .with_input_fact(0, f32::fact([1, 3, side, side]).into())?
        .into_optimized()
        .context("failed to optimize classifier graph")?
        .into_runnable()
        .context("failed to build classifier plan")
}

/// Decode an image file and convert it into the normalized NCHW input tensor.
///
/// The format is sniffed from the file contents, so the stored name's extension is irrelevant.
pub fn preprocess(path: &Path) -> Result<Tensor> {
    let decoded = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .with_context(|| format!("failed to read image at {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode image at {}", path.display()))?;
    Ok(image_to_tensor(&decoded.to_rgb8()))
}

pub fn image_to_tensor(rgb: &RgbImage) -> Tensor {
    let resized = image::imageops::resize(rgb, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let side = INPUT_SIZE as usize;

    tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
        let value = resized[(x as u32, y as u32)][channel] as f32 / 255.0;
        (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
    })
    .into()
}

fn run_plan(plan: &OnnxPlan, input: Tensor) -> Result<Prediction> {
    let outputs = plan.run(tvec!(input.into()))?;
    let logits = outputs
        .first()
        .ok_or_else(|| anyhow!("classifier returned no outputs"))?
        .to_array_view::<f32>()?
        .iter()
        .copied()
        .collect::<Vec<_>>();
    top_prediction(&logits)
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = logits.iter().map(|v| (v - max).exp()).collect::<Vec<_>>();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Softmax over the raw logits, then pick the most probable class (first one on ties).
pub fn top_prediction(logits: &[f32]) -> Result<Prediction> {
    if logits.len() != LesionClass::ALL.len() {
        bail!(
            "classifier produced {} logits, expected {}",
            logits.len(),
            LesionClass::ALL.len()
        );
    }

    let probabilities = softmax(logits);
    let mut best = 0usize;
    for (index, probability) in probabilities.iter().enumerate() {
        if *probability > probabilities[best] {
            best = index;
        }
    }

    let class = LesionClass::from_index(best)
        .ok_or_else(|| anyhow!("class index {best} out of range"))?;
    Ok(Prediction {
        class,
        confidence: probabilities[best] * 100.0,
    })
}
