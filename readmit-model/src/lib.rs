//! Encounter record to feature vector mapping and readmission risk estimation.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use readmit_core::{
    Confidence, EncounterRecord, Feature, FeatureValue, FeatureVector, ModelInfo, NumericFeatures,
    PredictionOutcome, Readmission, ReadmitError, RiskFactors, ServiceConfig, TestResult,
    FEATURE_COUNT,
};
use tracing::{debug, info, warn};

mod classifier;

pub use classifier::{
    load_artifact, parse_artifact, Classifier, ClassifierError, GradientBoostedTrees,
    LogisticRegression, ModelArtifact, TreeNode,
};

/// Map a record onto the fixed 15-slot feature vector. Never fails.
pub fn map_features(record: &EncounterRecord) -> FeatureVector {
    let mut values: [FeatureValue; FEATURE_COUNT] =
        std::array::from_fn(|_| FeatureValue::Number(0.0));

    for field in readmit_core::NumericField::ALL {
        if let Some(raw) = record.numeric(field) {
            values[field.feature().index()] = FeatureValue::from_json(raw);
        }
    }

    let on_medication = record
        .diabetes_medication_or_default()
        .eq_ignore_ascii_case("yes");
    values[Feature::DiabetesMedication.index()] = indicator(on_medication);

    let glucose = TestResult::parse(record.glucose_test_or_default());
    values[Feature::GlucoseNormal.index()] = indicator(glucose == Some(TestResult::Normal));
    values[Feature::GlucoseHigh.index()] = indicator(glucose == Some(TestResult::High));
    values[Feature::GlucoseNotDone.index()] = indicator(glucose == Some(TestResult::NotDone));

    let a1c = TestResult::parse(record.a1c_test_or_default());
    values[Feature::A1cNormal.index()] = indicator(a1c == Some(TestResult::Normal));
    values[Feature::A1cHigh.index()] = indicator(a1c == Some(TestResult::High));
    values[Feature::A1cNotDone.index()] = indicator(a1c == Some(TestResult::NotDone));

    let features = FeatureVector::new(values);
    if tracing::enabled!(tracing::Level::DEBUG) {
        let mapping = serde_json::to_string(&features).unwrap_or_default();
        debug!(features = %mapping, "mapped encounter features");
    }
    features
}

fn indicator(flag: bool) -> FeatureValue {
    FeatureValue::Number(if flag { 1.0 } else { 0.0 })
}

/// Additive rule score used by the heuristic fallback.
pub fn heuristic_score(features: &NumericFeatures) -> u32 {
    let age = features.get(Feature::Age);
    let stay = features.get(Feature::LengthOfStay);
    let inpatient = features.get(Feature::PreviousInpatientStays);
    let emergency = features.get(Feature::EmergencyVisits);
    let procedures =
        features.get(Feature::NumLabProcedures) + features.get(Feature::NumOtherProcedures);

    let mut score = 0;

    score += if age > 65.0 {
        2
    } else if age > 45.0 {
        1
    } else {
        0
    };

    score += if stay > 7.0 {
        2
    } else if stay > 3.0 {
        1
    } else {
        0
    };

    score += if inpatient > 2.0 || emergency > 3.0 {
        2
    } else if inpatient > 0.0 || emergency > 1.0 {
        1
    } else {
        0
    };

    if features.is_set(Feature::DiabetesMedication) && features.is_set(Feature::A1cHigh) {
        score += 2;
    }

    if procedures > 10.0 || features.get(Feature::NumMedications) > 5.0 {
        score += 1;
    }

    score
}

/// Score band of the heuristic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBand {
    High,
    Elevated,
    Low,
}

impl RiskBand {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 4 => RiskBand::High,
            s if s >= 2 => RiskBand::Elevated,
            _ => RiskBand::Low,
        }
    }

    /// Chance of drawing a positive label within the band.
    pub fn positive_probability(self) -> f64 {
        match self {
            RiskBand::High => 1.0,
            RiskBand::Elevated => 0.4,
            RiskBand::Low => 0.15,
        }
    }
}

/// Label plus confidence descriptor produced by an estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub label: Readmission,
    pub confidence: Confidence,
}

/// Rule-based placeholder used when no classifier is loaded.
///
/// The two lower bands are stochastic; seed the generator for reproducible runs.
#[derive(Debug)]
pub struct HeuristicEstimator {
    rng: Mutex<StdRng>,
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicEstimator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn estimate(&self, features: &NumericFeatures) -> Estimate {
        let score = heuristic_score(features);
        let band = RiskBand::from_score(score);
        let positive = match band {
            RiskBand::High => true,
            other => {
                let mut rng = self
                    .rng
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                rng.gen_bool(other.positive_probability())
            }
        };
        debug!(score, band = ?band, positive, "heuristic estimate");
        Estimate {
            label: Readmission::from_positive(positive),
            confidence: Confidence::Mock,
        }
    }
}

/// Risk estimator chosen once at startup.
pub enum RiskEstimator {
    Classifier(Arc<dyn Classifier>),
    Heuristic(HeuristicEstimator),
}

impl std::fmt::Debug for RiskEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskEstimator::Classifier(classifier) => f
                .debug_tuple("Classifier")
                .field(&classifier.info().model_type)
                .finish(),
            RiskEstimator::Heuristic(_) => f.write_str("Heuristic"),
        }
    }
}

impl RiskEstimator {
    pub fn with_classifier(classifier: Arc<dyn Classifier>) -> Self {
        RiskEstimator::Classifier(classifier)
    }

    pub fn heuristic(seed: Option<u64>) -> Self {
        RiskEstimator::Heuristic(match seed {
            Some(seed) => HeuristicEstimator::seeded(seed),
            None => HeuristicEstimator::new(),
        })
    }

    /// Load the artifact named in `config`, degrading to the heuristic on any failure.
    pub fn from_config(config: &ServiceConfig) -> Self {
        match load_artifact(&config.model_path) {
            Ok(artifact) => {
                info!(
                    path = %config.model_path.display(),
                    model_type = artifact.type_name(),
                    "model loaded"
                );
                Self::with_classifier(Arc::new(artifact))
            }
            Err(err) => {
                warn!(
                    path = %config.model_path.display(),
                    error = %err,
                    "model not available, using rule-based fallback"
                );
                Self::heuristic(config.heuristic_seed)
            }
        }
    }

    pub fn model_available(&self) -> bool {
        matches!(self, RiskEstimator::Classifier(_))
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        match self {
            RiskEstimator::Classifier(classifier) => Some(classifier.info()),
            RiskEstimator::Heuristic(_) => None,
        }
    }

    pub fn estimate(&self, features: &NumericFeatures) -> Result<Estimate, ReadmitError> {
        match self {
            RiskEstimator::Classifier(classifier) => {
                classifier_estimate(classifier.as_ref(), features)
            }
            RiskEstimator::Heuristic(heuristic) => Ok(heuristic.estimate(features)),
        }
    }
}

fn classifier_estimate(
    classifier: &dyn Classifier,
    features: &NumericFeatures,
) -> Result<Estimate, ReadmitError> {
    let positive = classifier.predict(features.as_slice())?;
    let confidence = match classifier.predict_proba(features.as_slice()) {
        Ok(p) => Confidence::Probability(if positive { p } else { 1.0 - p }),
        Err(err) => {
            debug!(error = %err, "probability unavailable");
            Confidence::ModelBased
        }
    };
    Ok(Estimate {
        label: Readmission::from_positive(positive),
        confidence,
    })
}

impl From<ClassifierError> for ReadmitError {
    fn from(err: ClassifierError) -> Self {
        ReadmitError::Classifier(err.to_string())
    }
}

/// Full pipeline for one record: map, convert, estimate, summarize.
pub fn predict(
    estimator: &RiskEstimator,
    record: &EncounterRecord,
) -> Result<PredictionOutcome, ReadmitError> {
    let features = map_features(record).to_numeric()?;
    let estimate = estimator.estimate(&features)?;
    Ok(PredictionOutcome {
        prediction: estimate.label,
        confidence: estimate.confidence,
        risk_factors: RiskFactors::from_features(&features),
    })
}
