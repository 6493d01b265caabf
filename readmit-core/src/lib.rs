//! Kiểu dữ liệu lõi cho dịch vụ dự đoán tái nhập viện.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Tên file artifact mặc định của mô hình.
pub const DEFAULT_MODEL_FILE: &str = "readmission_model.json";

/// Địa chỉ lắng nghe mặc định của HTTP server.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Số lượng đặc trưng mô hình được huấn luyện.
pub const FEATURE_COUNT: usize = 15;

/// Thứ tự đặc trưng cố định, phải khớp với lúc huấn luyện mô hình.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "age",
    "length_of_stay",
    "num_lab_procedures",
    "num_other_procedures",
    "num_medications",
    "outpatient_visits",
    "previous_inpatient_stays",
    "emergency_visits",
    "diabetes_medication",
    "glucose_normal",
    "glucose_high",
    "glucose_not_done",
    "a1c_normal",
    "a1c_high",
    "a1c_not_done",
];

/// Cấu hình tiến trình phục vụ.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Địa chỉ `host:port` để bind.
    pub bind_addr: String,
    /// Đường dẫn tới artifact mô hình.
    pub model_path: PathBuf,
    /// Seed cho bộ sinh ngẫu nhiên của heuristic (None = entropy hệ thống).
    pub heuristic_seed: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_FILE),
            heuristic_seed: None,
        }
    }
}

/// Vị trí từng đặc trưng trong vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Age,
    LengthOfStay,
    NumLabProcedures,
    NumOtherProcedures,
    NumMedications,
    OutpatientVisits,
    PreviousInpatientStays,
    EmergencyVisits,
    DiabetesMedication,
    GlucoseNormal,
    GlucoseHigh,
    GlucoseNotDone,
    A1cNormal,
    A1cHigh,
    A1cNotDone,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Age,
        Feature::LengthOfStay,
        Feature::NumLabProcedures,
        Feature::NumOtherProcedures,
        Feature::NumMedications,
        Feature::OutpatientVisits,
        Feature::PreviousInpatientStays,
        Feature::EmergencyVisits,
        Feature::DiabetesMedication,
        Feature::GlucoseNormal,
        Feature::GlucoseHigh,
        Feature::GlucoseNotDone,
        Feature::A1cNormal,
        Feature::A1cHigh,
        Feature::A1cNotDone,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        FEATURE_NAMES[self.index()]
    }
}

/// Các trường số trong bản ghi đầu vào, được chuyển thẳng sang vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    Age,
    LengthOfStay,
    NumLabProcedures,
    NumOtherProcedures,
    NumMedications,
    OutpatientVisits,
    PreviousInpatientStays,
    EmergencyVisits,
}

impl NumericField {
    pub const ALL: [NumericField; 8] = [
        NumericField::Age,
        NumericField::LengthOfStay,
        NumericField::NumLabProcedures,
        NumericField::NumOtherProcedures,
        NumericField::NumMedications,
        NumericField::OutpatientVisits,
        NumericField::PreviousInpatientStays,
        NumericField::EmergencyVisits,
    ];

    /// Đặc trưng tương ứng trong vector.
    pub fn feature(self) -> Feature {
        match self {
            NumericField::Age => Feature::Age,
            NumericField::LengthOfStay => Feature::LengthOfStay,
            NumericField::NumLabProcedures => Feature::NumLabProcedures,
            NumericField::NumOtherProcedures => Feature::NumOtherProcedures,
            NumericField::NumMedications => Feature::NumMedications,
            NumericField::OutpatientVisits => Feature::OutpatientVisits,
            NumericField::PreviousInpatientStays => Feature::PreviousInpatientStays,
            NumericField::EmergencyVisits => Feature::EmergencyVisits,
        }
    }
}

/// Kết quả xét nghiệm glucose/A1C.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Normal,
    High,
    NotDone,
}

impl TestResult {
    /// Nhận dạng không phân biệt hoa thường; giá trị lạ trả về None.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "normal" => Some(TestResult::Normal),
            "high" => Some(TestResult::High),
            "not_done" => Some(TestResult::NotDone),
            _ => None,
        }
    }
}

/// Bản ghi lượt khám do client gửi lên. Mọi trường đều tuỳ chọn.
///
/// Trường số giữ nguyên giá trị JSON gốc để giá trị không phải số được
/// chuyển tiếp nguyên trạng tới bước ước lượng rủi ro.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncounterRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_of_stay: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_lab_procedures: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_other_procedures: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_medications: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outpatient_visits: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_inpatient_stays: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_visits: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diabetes_medication: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glucose_test: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a1c_test: Option<String>,
}

impl EncounterRecord {
    /// Đọc bản ghi từ chuỗi JSON thô.
    pub fn from_json_str(raw: &str) -> Result<Self, ReadmitError> {
        if raw.trim().is_empty() {
            return Err(ReadmitError::MissingData);
        }
        let value: Value =
            serde_json::from_str(raw).map_err(|err| ReadmitError::Parse(err.to_string()))?;
        Self::from_value(value)
    }

    /// Đọc bản ghi từ `serde_json::Value`. Payload rỗng (`null`, `{}`, `[]`, `""`,
    /// `0`, `false`) bị coi là thiếu dữ liệu.
    pub fn from_value(value: Value) -> Result<Self, ReadmitError> {
        if is_empty_payload(&value) {
            return Err(ReadmitError::MissingData);
        }
        match &value {
            Value::Object(_) => {}
            other => {
                return Err(ReadmitError::Parse(format!(
                    "expected a JSON object, received {}",
                    json_kind(other)
                )))
            }
        }

        serde_json::from_value(value).map_err(|err| ReadmitError::Record(err.to_string()))
    }

    pub fn numeric(&self, field: NumericField) -> Option<&Value> {
        match field {
            NumericField::Age => self.age.as_ref(),
            NumericField::LengthOfStay => self.length_of_stay.as_ref(),
            NumericField::NumLabProcedures => self.num_lab_procedures.as_ref(),
            NumericField::NumOtherProcedures => self.num_other_procedures.as_ref(),
            NumericField::NumMedications => self.num_medications.as_ref(),
            NumericField::OutpatientVisits => self.outpatient_visits.as_ref(),
            NumericField::PreviousInpatientStays => self.previous_inpatient_stays.as_ref(),
            NumericField::EmergencyVisits => self.emergency_visits.as_ref(),
        }
    }

    fn numeric_slot(&mut self, field: NumericField) -> &mut Option<Value> {
        match field {
            NumericField::Age => &mut self.age,
            NumericField::LengthOfStay => &mut self.length_of_stay,
            NumericField::NumLabProcedures => &mut self.num_lab_procedures,
            NumericField::NumOtherProcedures => &mut self.num_other_procedures,
            NumericField::NumMedications => &mut self.num_medications,
            NumericField::OutpatientVisits => &mut self.outpatient_visits,
            NumericField::PreviousInpatientStays => &mut self.previous_inpatient_stays,
            NumericField::EmergencyVisits => &mut self.emergency_visits,
        }
    }

    /// Gán giá trị cho một trường số (kiểu builder).
    pub fn with_numeric(mut self, field: NumericField, value: impl Into<Value>) -> Self {
        *self.numeric_slot(field) = Some(value.into());
        self
    }

    pub fn with_diabetes_medication(mut self, value: impl Into<String>) -> Self {
        self.diabetes_medication = Some(value.into());
        self
    }

    pub fn with_glucose_test(mut self, value: impl Into<String>) -> Self {
        self.glucose_test = Some(value.into());
        self
    }

    pub fn with_a1c_test(mut self, value: impl Into<String>) -> Self {
        self.a1c_test = Some(value.into());
        self
    }

    /// Giá trị `diabetes_medication`, mặc định "no".
    pub fn diabetes_medication_or_default(&self) -> &str {
        self.diabetes_medication.as_deref().unwrap_or("no")
    }

    /// Giá trị `glucose_test`, mặc định "normal".
    pub fn glucose_test_or_default(&self) -> &str {
        self.glucose_test.as_deref().unwrap_or("normal")
    }

    /// Giá trị `a1c_test`, mặc định "normal".
    pub fn a1c_test_or_default(&self) -> &str {
        self.a1c_test.as_deref().unwrap_or("normal")
    }
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Một ô trong vector đặc trưng: số hoặc giá trị thô chưa chuyển đổi.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Raw(Value),
}

impl FeatureValue {
    pub fn from_json(value: &Value) -> Self {
        match value.as_f64() {
            Some(number) => FeatureValue::Number(number),
            None => FeatureValue::Raw(value.clone()),
        }
    }

    /// Boolean JSON được hiểu là 1/0; chuỗi và các kiểu khác trả về None.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(number) => Some(*number),
            FeatureValue::Raw(Value::Bool(flag)) => Some(if *flag { 1.0 } else { 0.0 }),
            FeatureValue::Raw(_) => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

/// Vector đặc trưng theo đúng thứ tự `FEATURE_NAMES`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [FeatureValue; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn new(values: [FeatureValue; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, feature: Feature) -> &FeatureValue {
        &self.values[feature.index()]
    }

    /// Duyệt theo cặp (tên, giá trị) đúng thứ tự huấn luyện.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FeatureValue)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter())
    }

    /// Chuyển sang vector số; lỗi ở ô đầu tiên không phải số.
    pub fn to_numeric(&self) -> Result<NumericFeatures, ReadmitError> {
        let mut numbers = [0.0; FEATURE_COUNT];
        for (feature, (slot, value)) in Feature::ALL
            .iter()
            .zip(numbers.iter_mut().zip(self.values.iter()))
        {
            *slot = value.as_f64().ok_or_else(|| ReadmitError::NonNumeric {
                feature: feature.name(),
                value: match value {
                    FeatureValue::Raw(raw) => raw.to_string(),
                    FeatureValue::Number(number) => number.to_string(),
                },
            })?;
        }
        Ok(NumericFeatures::new(numbers))
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Vector đặc trưng đã được xác nhận là số.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericFeatures([f64; FEATURE_COUNT]);

impl NumericFeatures {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_set(&self, feature: Feature) -> bool {
        self.get(feature) == 1.0
    }
}

/// Nhãn dự đoán tái nhập viện.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Readmission {
    Yes,
    No,
}

impl Readmission {
    pub fn from_positive(positive: bool) -> Self {
        if positive {
            Readmission::Yes
        } else {
            Readmission::No
        }
    }

    pub fn is_positive(self) -> bool {
        self == Readmission::Yes
    }
}

impl fmt::Display for Readmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readmission::Yes => f.write_str("Yes"),
            Readmission::No => f.write_str("No"),
        }
    }
}

/// Mô tả độ tin cậy đi kèm dự đoán.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(into = "String")]
pub enum Confidence {
    /// Xác suất của lớp được dự đoán, trong khoảng [0, 1].
    Probability(f64),
    /// Mô hình không cung cấp xác suất.
    ModelBased,
    /// Kết quả từ heuristic dự phòng.
    Mock,
}

const MODEL_BASED_LABEL: &str = "model-based";
const MOCK_LABEL: &str = "mock";

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Probability(p) => write!(f, "{:.1}%", p * 100.0),
            Confidence::ModelBased => f.write_str(MODEL_BASED_LABEL),
            Confidence::Mock => f.write_str(MOCK_LABEL),
        }
    }
}

impl From<Confidence> for String {
    fn from(confidence: Confidence) -> Self {
        confidence.to_string()
    }
}

/// Tóm tắt các yếu tố rủi ro trả về cho client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RiskFactors {
    #[serde(serialize_with = "serialize_whole")]
    pub age: f64,
    #[serde(serialize_with = "serialize_whole")]
    pub length_of_stay: f64,
    #[serde(serialize_with = "serialize_whole")]
    pub previous_hospitalizations: f64,
    #[serde(serialize_with = "serialize_whole")]
    pub emergency_visits: f64,
    pub diabetes_medication: bool,
    #[serde(serialize_with = "serialize_whole")]
    pub total_procedures: f64,
}

impl RiskFactors {
    pub fn from_features(features: &NumericFeatures) -> Self {
        Self {
            age: features.get(Feature::Age),
            length_of_stay: features.get(Feature::LengthOfStay),
            previous_hospitalizations: features.get(Feature::PreviousInpatientStays),
            emergency_visits: features.get(Feature::EmergencyVisits),
            diabetes_medication: features.is_set(Feature::DiabetesMedication),
            total_procedures: features.get(Feature::NumLabProcedures)
                + features.get(Feature::NumOtherProcedures),
        }
    }
}

/// Số nguyên được ghi ra dạng integer JSON (70 thay vì 70.0).
fn serialize_whole<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Kết quả dự đoán cho một lượt khám.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictionOutcome {
    pub prediction: Readmission,
    pub confidence: Confidence,
    pub risk_factors: RiskFactors,
}

/// Phản hồi của `POST /predict`.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    #[serde(flatten)]
    pub outcome: PredictionOutcome,
    pub model_available: bool,
    pub timestamp: DateTime<Utc>,
}

impl PredictionResponse {
    pub fn new(outcome: PredictionOutcome, model_available: bool) -> Self {
        Self {
            outcome,
            model_available,
            timestamp: Utc::now(),
        }
    }
}

/// Phản hồi của `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub model_available: bool,
    pub timestamp: DateTime<Utc>,
    pub expected_features: [&'static str; FEATURE_COUNT],
}

impl HealthReport {
    pub fn healthy(model_available: bool) -> Self {
        Self {
            status: "healthy",
            model_available,
            timestamp: Utc::now(),
            expected_features: FEATURE_NAMES,
        }
    }
}

/// Metadata mô hình có thể đọc được từ artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub model_type: String,
    pub n_features: Option<usize>,
    pub feature_names: Option<Vec<String>>,
    pub n_classes: Option<usize>,
}

/// Phản hồi của `GET /model-info`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfoReport {
    pub model_available: bool,
    #[serde(flatten)]
    pub info: Option<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub timestamp: DateTime<Utc>,
}

impl ModelInfoReport {
    pub fn new(info: Option<ModelInfo>) -> Self {
        let message = match info {
            Some(_) => None,
            None => Some("Model not available - using rule-based fallback"),
        };
        Self {
            model_available: info.is_some(),
            info,
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Lỗi chung của dịch vụ.
#[derive(Debug, thiserror::Error)]
pub enum ReadmitError {
    #[error("No data provided")]
    MissingData,
    #[error("Invalid JSON body: {0}")]
    Parse(String),
    #[error("invalid encounter record: {0}")]
    Record(String),
    #[error("could not convert feature '{feature}' to a number: {value}")]
    NonNumeric { feature: &'static str, value: String },
    #[error("{0}")]
    Classifier(String),
}
