//! Crop prediction tool.
//!
//! Two small models driven by configured coefficients: a linear yield
//! regressor (tonnes per hectare) and a logistic irrigation classifier.
//! Features come from JSON arguments or are pulled out of free text such as
//! "rainfall 650 mm, soil moisture 12%".

use agrimind_core::config::{LinearModelConfig, PredictionConfig};
use agrimind_core::error::ToolError;
use agrimind_core::registry::Tool;
use agrimind_core::types::ToolOutput;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Feature names understood by both models, in display order.
pub const FEATURES: &[&str] = &[
    "rainfall_mm",
    "temperature_c",
    "humidity_pct",
    "soil_moisture_pct",
    "fertilizer_kg_ha",
];

/// Unit-less aliases accepted in JSON arguments, parallel to [`FEATURES`].
const SHORT_NAMES: &[&str] = &[
    "rainfall",
    "temperature",
    "humidity",
    "soil_moisture",
    "fertilizer",
];

/// Which model to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionTask {
    Yield,
    Irrigation,
}

impl std::fmt::Display for PredictionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionTask::Yield => write!(f, "yield"),
            PredictionTask::Irrigation => write!(f, "irrigation"),
        }
    }
}

/// A completed prediction with the feature values it used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub task: PredictionTask,
    /// Tonnes per hectare for yield, probability for irrigation.
    pub value: f64,
    pub recommend_irrigation: Option<bool>,
    pub features: BTreeMap<String, f64>,
    pub defaults_used: Vec<String>,
}

impl Prediction {
    /// Render the prediction for a farmer-facing answer.
    pub fn summary(&self) -> String {
        let headline = match (self.task, self.recommend_irrigation) {
            (PredictionTask::Irrigation, Some(recommend)) => format!(
                "Irrigation recommended: {} (probability {:.2})",
                if recommend { "yes" } else { "no" },
                self.value
            ),
            _ => format!("Predicted yield: {:.2} t/ha", self.value),
        };
        let inputs = FEATURES
            .iter()
            .filter_map(|name| {
                self.features.get(*name).map(|v| {
                    if self.defaults_used.iter().any(|d| d == name) {
                        format!("{name}={v} (default)")
                    } else {
                        format!("{name}={v}")
                    }
                })
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut out = format!("{headline}\nInputs: {inputs}");
        if !self.defaults_used.is_empty() {
            out.push_str(&format!(
                "\nDefaults used for: {}",
                self.defaults_used.join(", ")
            ));
        }
        out
    }
}

/// Pulls feature values out of free text.
pub struct FeatureExtractor {
    keyword_patterns: Vec<(&'static str, Regex)>,
    unit_patterns: Vec<(&'static str, Regex)>,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        let keyword_patterns = [
            ("rainfall_mm", r"(?i)\b(?:rainfall|rain)\b[^\d\n-]{0,20}?(-?\d+(?:\.\d+)?)"),
            ("temperature_c", r"(?i)\b(?:temperature|temp)\b[^\d\n-]{0,20}?(-?\d+(?:\.\d+)?)"),
            ("humidity_pct", r"(?i)\bhumidity\b[^\d\n-]{0,20}?(-?\d+(?:\.\d+)?)"),
            ("soil_moisture_pct", r"(?i)\b(?:soil\s+)?moisture\b[^\d\n-]{0,20}?(-?\d+(?:\.\d+)?)"),
            ("fertilizer_kg_ha", r"(?i)\b(?:fertili[sz]er|nitrogen|urea)\b[^\d\n-]{0,20}?(-?\d+(?:\.\d+)?)"),
        ];
        let unit_patterns = [
            ("rainfall_mm", r"(?i)(\d+(?:\.\d+)?)\s*mm\b"),
            ("temperature_c", r"(?i)(-?\d+(?:\.\d+)?)\s*(?:°\s*c|degrees?)\b"),
            ("fertilizer_kg_ha", r"(?i)(\d+(?:\.\d+)?)\s*kg\s*/\s*ha\b"),
        ];
        let compile = |pairs: &[(&'static str, &str)]| {
            pairs
                .iter()
                .filter_map(|(name, pat)| Regex::new(pat).ok().map(|re| (*name, re)))
                .collect::<Vec<_>>()
        };
        Self {
            keyword_patterns: compile(&keyword_patterns[..]),
            unit_patterns: compile(&unit_patterns[..]),
        }
    }

    /// Extract every feature mentioned in `text`.
    ///
    /// A `<feature> <number>` mention wins over a bare unit such as "650 mm".
    pub fn extract(&self, text: &str) -> BTreeMap<String, f64> {
        let mut features = BTreeMap::new();
        for (name, re) in self.keyword_patterns.iter().chain(&self.unit_patterns) {
            if features.contains_key(*name) {
                continue;
            }
            if let Some(value) = re
                .captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
            {
                features.insert(name.to_string(), value);
            }
        }
        features
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear and logistic models over the configured coefficients.
#[derive(Debug, Clone)]
pub struct CropPredictor {
    config: PredictionConfig,
}

impl CropPredictor {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    /// Run `task` over `observed`, filling missing features from defaults.
    pub fn predict(&self, task: PredictionTask, observed: &BTreeMap<String, f64>) -> Prediction {
        let mut features = BTreeMap::new();
        let mut defaults_used = Vec::new();
        for name in FEATURES {
            match observed.get(*name) {
                Some(v) => {
                    features.insert(name.to_string(), *v);
                }
                None => {
                    let v = self
                        .config
                        .feature_defaults
                        .get(*name)
                        .copied()
                        .unwrap_or(0.0);
                    features.insert(name.to_string(), v);
                    defaults_used.push(name.to_string());
                }
            }
        }

        let (value, recommend_irrigation) = match task {
            PredictionTask::Yield => (
                linear(&self.config.yield_model, &features).max(0.0),
                None,
            ),
            PredictionTask::Irrigation => {
                let p = sigmoid(linear(&self.config.irrigation_model, &features));
                (p, Some(p >= self.config.irrigation_threshold))
            }
        };
        debug!(%task, value, defaults = defaults_used.len(), "Crop prediction");

        Prediction {
            task,
            value,
            recommend_irrigation,
            features,
            defaults_used,
        }
    }
}

fn linear(model: &LinearModelConfig, features: &BTreeMap<String, f64>) -> f64 {
    model.intercept
        + model
            .weights
            .iter()
            .map(|(name, w)| w * features.get(name).copied().unwrap_or(0.0))
            .sum::<f64>()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// ---------------------------------------------------------------------------
// CropPredictTool
// ---------------------------------------------------------------------------

/// Predicts crop yield or irrigation need from weather and soil features.
pub struct CropPredictTool {
    predictor: CropPredictor,
    extractor: FeatureExtractor,
}

impl CropPredictTool {
    pub fn new(config: PredictionConfig) -> Self {
        Self {
            predictor: CropPredictor::new(config),
            extractor: FeatureExtractor::new(),
        }
    }

    fn select_task(args: &Value, text: &str) -> Result<PredictionTask, ToolError> {
        if let Some(task) = args.get("task").and_then(|v| v.as_str()) {
            return match task.trim().to_lowercase().as_str() {
                "yield" => Ok(PredictionTask::Yield),
                "irrigation" => Ok(PredictionTask::Irrigation),
                other => Err(ToolError::InvalidArguments {
                    name: "crop_predict".into(),
                    reason: format!("unknown task '{other}', expected 'yield' or 'irrigation'"),
                }),
            };
        }
        let lower = text.to_lowercase();
        if lower.contains("irrigat") || lower.contains("water") {
            Ok(PredictionTask::Irrigation)
        } else {
            Ok(PredictionTask::Yield)
        }
    }

    fn json_features(args: &Value) -> BTreeMap<String, f64> {
        let mut features = BTreeMap::new();
        let Some(map) = args.as_object() else {
            return features;
        };
        for (name, short) in FEATURES.iter().zip(SHORT_NAMES) {
            let value = map.get(*name).or_else(|| map.get(*short)).and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            });
            if let Some(v) = value {
                features.insert(name.to_string(), v);
            }
        }
        features
    }
}

#[async_trait]
impl Tool for CropPredictTool {
    fn name(&self) -> &str {
        "crop_predict"
    }

    fn description(&self) -> &str {
        "Predict crop yield (t/ha) or whether to irrigate from rainfall_mm, temperature_c, \
         humidity_pct, soil_moisture_pct and fertilizer_kg_ha. Input may be a JSON object \
         of these features or text such as 'rainfall 650 mm, temperature 28'."
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        properties.insert(
            "input".into(),
            json!({ "type": "string", "description": "Free-text description of the field conditions" }),
        );
        properties.insert(
            "task".into(),
            json!({ "type": "string", "enum": ["yield", "irrigation"] }),
        );
        for name in FEATURES {
            properties.insert(name.to_string(), json!({ "type": "number" }));
        }
        json!({ "type": "object", "properties": properties })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let text = match &args {
            Value::String(s) => s.clone(),
            _ => args
                .get("input")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        };

        let mut observed = self.extractor.extract(&text);
        observed.extend(Self::json_features(&args));
        if observed.is_empty() {
            return Err(ToolError::InvalidArguments {
                name: self.name().to_string(),
                reason: format!("no features found; provide at least one of {}", FEATURES.join(", ")),
            });
        }

        let task = Self::select_task(&args, &text)?;
        let prediction = self.predictor.predict(task, &observed);

        Ok(ToolOutput::text(prediction.summary())
            .with_metadata("task", json!(task))
            .with_metadata("value", json!(prediction.value))
            .with_metadata("defaults_used", json!(prediction.defaults_used)))
    }
}
