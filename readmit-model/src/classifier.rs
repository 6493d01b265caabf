//! Pre-fitted classifier artifacts and the `Classifier` seam.

use std::fs;
use std::path::{Path, PathBuf};

use readmit_core::{ModelInfo, FEATURE_NAMES};
use serde::{Deserialize, Serialize};

/// A fitted binary classifier over the ordered feature vector.
pub trait Classifier: Send + Sync {
    /// `true` when the positive (readmit) class is predicted.
    fn predict(&self, features: &[f64]) -> Result<bool, ClassifierError>;

    /// Probability of the positive class.
    fn predict_proba(&self, _features: &[f64]) -> Result<f64, ClassifierError> {
        Err(ClassifierError::ProbabilityUnsupported)
    }

    fn info(&self) -> ModelInfo;
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("cannot read model artifact {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed model artifact: {0}")]
    Format(#[from] serde_json::Error),
    #[error("invalid model artifact: {0}")]
    Invalid(String),
    #[error("model feature names {found:?} do not match the expected order {expected:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("X has {found} features, but {model} is expecting {expected} features as input")]
    Arity {
        model: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("probability estimates are not available for this model")]
    ProbabilityUnsupported,
}

/// Serialized classifier, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression(LogisticRegression),
    GradientBoostedTrees(GradientBoostedTrees),
}

/// Read, parse and validate an artifact from disk.
pub fn load_artifact(path: &Path) -> Result<ModelArtifact, ClassifierError> {
    let raw = fs::read_to_string(path).map_err(|source| ClassifierError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_artifact(&raw)
}

/// Parse and validate an artifact from its JSON text.
pub fn parse_artifact(raw: &str) -> Result<ModelArtifact, ClassifierError> {
    let artifact: ModelArtifact = serde_json::from_str(raw)?;
    artifact.validate()?;
    Ok(artifact)
}

impl ModelArtifact {
    pub fn type_name(&self) -> &'static str {
        match self {
            ModelArtifact::LogisticRegression(_) => LOGISTIC_REGRESSION,
            ModelArtifact::GradientBoostedTrees(_) => GRADIENT_BOOSTED_TREES,
        }
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        match self {
            ModelArtifact::LogisticRegression(model) => model.feature_names.as_deref(),
            ModelArtifact::GradientBoostedTrees(model) => model.feature_names.as_deref(),
        }
    }

    /// Structural checks plus the feature-order contract.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if let Some(names) = self.feature_names() {
            check_feature_order(names)?;
        }
        match self {
            ModelArtifact::LogisticRegression(model) => model.validate(),
            ModelArtifact::GradientBoostedTrees(model) => model.validate(),
        }
    }
}

impl Classifier for ModelArtifact {
    fn predict(&self, features: &[f64]) -> Result<bool, ClassifierError> {
        Ok(self.predict_proba(features)? >= DECISION_THRESHOLD)
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, ClassifierError> {
        match self {
            ModelArtifact::LogisticRegression(model) => model.probability(features),
            ModelArtifact::GradientBoostedTrees(model) => model.probability(features),
        }
    }

    fn info(&self) -> ModelInfo {
        let feature_names = self.feature_names().map(<[String]>::to_vec);
        let n_features = match self {
            ModelArtifact::LogisticRegression(model) => Some(model.coefficients.len()),
            ModelArtifact::GradientBoostedTrees(_) => feature_names.as_ref().map(Vec::len),
        };
        ModelInfo {
            model_type: self.type_name().to_string(),
            n_features,
            feature_names,
            n_classes: Some(2),
        }
    }
}

const LOGISTIC_REGRESSION: &str = "LogisticRegression";
const GRADIENT_BOOSTED_TREES: &str = "GradientBoostedTrees";
const DECISION_THRESHOLD: f64 = 0.5;

fn check_feature_order(names: &[String]) -> Result<(), ClassifierError> {
    let matches = names.len() == FEATURE_NAMES.len()
        && names
            .iter()
            .zip(FEATURE_NAMES.iter())
            .all(|(found, expected)| found == expected);
    if matches {
        Ok(())
    } else {
        Err(ClassifierError::FeatureMismatch {
            expected: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            found: names.to_vec(),
        })
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Binary logistic regression: `P(readmit) = sigmoid(w·x + b)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticRegression {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_classes")]
    pub classes: Vec<i64>,
}

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

impl LogisticRegression {
    fn validate(&self) -> Result<(), ClassifierError> {
        if self.coefficients.is_empty() {
            return Err(ClassifierError::Invalid(
                "logistic regression has no coefficients".to_string(),
            ));
        }
        if self.classes.len() != 2 {
            return Err(ClassifierError::Invalid(format!(
                "expected a binary classifier, found {} classes",
                self.classes.len()
            )));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.coefficients.len() {
                return Err(ClassifierError::Invalid(format!(
                    "{} feature names but {} coefficients",
                    names.len(),
                    self.coefficients.len()
                )));
            }
        }
        Ok(())
    }

    fn probability(&self, features: &[f64]) -> Result<f64, ClassifierError> {
        if features.len() != self.coefficients.len() {
            return Err(ClassifierError::Arity {
                model: LOGISTIC_REGRESSION,
                expected: self.coefficients.len(),
                found: features.len(),
            });
        }
        let margin: f64 = self
            .coefficients
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        Ok(sigmoid(margin))
    }
}

/// Additive tree ensemble with a logistic link (XGBoost `binary:logistic` style).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradientBoostedTrees {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    /// Prior probability; its logit is the starting margin.
    #[serde(default = "default_base_score")]
    pub base_score: f64,
    pub trees: Vec<Vec<TreeNode>>,
}

fn default_base_score() -> f64 {
    0.5
}

/// Flat node array entry. Node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TreeNode {
    /// `x[feature] < threshold` goes left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        leaf: f64,
    },
}

impl GradientBoostedTrees {
    fn validate(&self) -> Result<(), ClassifierError> {
        if !(self.base_score > 0.0 && self.base_score < 1.0) {
            return Err(ClassifierError::Invalid(format!(
                "base_score must lie in (0, 1), found {}",
                self.base_score
            )));
        }
        let feature_limit = self.feature_names.as_ref().map(Vec::len);

        for (tree_index, tree) in self.trees.iter().enumerate() {
            if tree.is_empty() {
                return Err(ClassifierError::Invalid(format!("tree {tree_index} is empty")));
            }
            for (node_index, node) in tree.iter().enumerate() {
                let TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } = node
                else {
                    continue;
                };
                // Children must point forward so evaluation always terminates.
                for child in [*left, *right] {
                    if child <= node_index || child >= tree.len() {
                        return Err(ClassifierError::Invalid(format!(
                            "tree {tree_index} node {node_index} has invalid child {child}"
                        )));
                    }
                }
                if let Some(limit) = feature_limit {
                    if *feature >= limit {
                        return Err(ClassifierError::Invalid(format!(
                            "tree {tree_index} node {node_index} splits on feature {feature}, \
                             model has {limit}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn probability(&self, features: &[f64]) -> Result<f64, ClassifierError> {
        if let Some(names) = &self.feature_names {
            if names.len() != features.len() {
                return Err(ClassifierError::Arity {
                    model: GRADIENT_BOOSTED_TREES,
                    expected: names.len(),
                    found: features.len(),
                });
            }
        }

        let base_margin = (self.base_score / (1.0 - self.base_score)).ln();
        let mut margin = base_margin;
        for tree in &self.trees {
            margin += evaluate_tree(tree, features)?;
        }
        Ok(sigmoid(margin))
    }
}

fn evaluate_tree(tree: &[TreeNode], features: &[f64]) -> Result<f64, ClassifierError> {
    let mut index = 0;
    // A root-to-leaf path visits each node at most once.
    for _ in 0..tree.len() {
        let node = tree.get(index).ok_or_else(|| {
            ClassifierError::Invalid(format!("tree node {index} does not exist"))
        })?;
        match node {
            TreeNode::Leaf { leaf } => return Ok(*leaf),
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let value = features.get(*feature).ok_or(ClassifierError::Arity {
                    model: GRADIENT_BOOSTED_TREES,
                    expected: feature + 1,
                    found: features.len(),
                })?;
                index = if *value < *threshold { *left } else { *right };
            }
        }
    }
    Err(ClassifierError::Invalid("tree contains a cycle".to_string()))
}
