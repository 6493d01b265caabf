use readmit_core::{EncounterRecord, Feature, FeatureValue, NumericField, FEATURE_NAMES};
use readmit_model::map_features;
use serde_json::json;

fn value_of(record: &EncounterRecord, feature: Feature) -> f64 {
    map_features(record)
        .get(feature)
        .as_f64()
        .expect("numeric feature")
}

#[test]
fn order_and_length_hold_for_any_field_subset() {
    let records = [
        EncounterRecord::default(),
        EncounterRecord::default().with_numeric(NumericField::EmergencyVisits, 4),
        EncounterRecord::default()
            .with_glucose_test("high")
            .with_numeric(NumericField::Age, 33),
        EncounterRecord::from_value(json!({
            "age": 61, "length_of_stay": 5, "num_lab_procedures": 40,
            "num_other_procedures": 1, "num_medications": 12, "outpatient_visits": 0,
            "previous_inpatient_stays": 2, "emergency_visits": 1,
            "diabetes_medication": "no", "glucose_test": "normal", "a1c_test": "high"
        }))
        .expect("full record"),
    ];

    for record in &records {
        let features = map_features(record);
        assert_eq!(features.len(), FEATURE_NAMES.len());
        let names: Vec<&str> = features.iter().map(|(name, _)| name).collect();
        assert_eq!(names, FEATURE_NAMES.to_vec());
    }
}

#[test]
fn numeric_fields_pass_through_and_default_to_zero() {
    let record = EncounterRecord::from_value(json!({"age": 42.5, "num_medications": 7}))
        .expect("record");
    let features = map_features(&record);

    assert_eq!(features.get(Feature::Age), &FeatureValue::Number(42.5));
    assert_eq!(features.get(Feature::NumMedications), &FeatureValue::Number(7.0));
    assert_eq!(features.get(Feature::LengthOfStay), &FeatureValue::Number(0.0));
    assert_eq!(features.get(Feature::EmergencyVisits), &FeatureValue::Number(0.0));
}

#[test]
fn null_counts_as_absent() {
    let record = EncounterRecord::from_value(json!({"age": null, "length_of_stay": 2}))
        .expect("record");
    assert_eq!(value_of(&record, Feature::Age), 0.0);
}

#[test]
fn diabetes_medication_is_case_insensitive() {
    for yes in ["YES", "yes", "Yes"] {
        let record = EncounterRecord::default().with_diabetes_medication(yes);
        assert_eq!(value_of(&record, Feature::DiabetesMedication), 1.0, "{yes}");
    }
    for other in ["no", "NO", "y", "true", ""] {
        let record = EncounterRecord::default().with_diabetes_medication(other);
        assert_eq!(value_of(&record, Feature::DiabetesMedication), 0.0, "{other}");
    }
    assert_eq!(
        value_of(&EncounterRecord::default(), Feature::DiabetesMedication),
        0.0
    );
}

#[test]
fn test_results_set_exactly_one_indicator() {
    let cases = [
        ("normal", Feature::GlucoseNormal, Feature::A1cNormal),
        ("NORMAL", Feature::GlucoseNormal, Feature::A1cNormal),
        ("high", Feature::GlucoseHigh, Feature::A1cHigh),
        ("High", Feature::GlucoseHigh, Feature::A1cHigh),
        ("not_done", Feature::GlucoseNotDone, Feature::A1cNotDone),
        ("Not_Done", Feature::GlucoseNotDone, Feature::A1cNotDone),
    ];
    let glucose = [Feature::GlucoseNormal, Feature::GlucoseHigh, Feature::GlucoseNotDone];
    let a1c = [Feature::A1cNormal, Feature::A1cHigh, Feature::A1cNotDone];

    for (raw, glucose_hot, a1c_hot) in cases {
        let record = EncounterRecord::default()
            .with_glucose_test(raw)
            .with_a1c_test(raw);
        for feature in glucose {
            let expected = if feature == glucose_hot { 1.0 } else { 0.0 };
            assert_eq!(value_of(&record, feature), expected, "{raw} {feature:?}");
        }
        for feature in a1c {
            let expected = if feature == a1c_hot { 1.0 } else { 0.0 };
            assert_eq!(value_of(&record, feature), expected, "{raw} {feature:?}");
        }
    }
}

#[test]
fn absent_test_results_default_to_normal() {
    let record = EncounterRecord::default();
    assert_eq!(value_of(&record, Feature::GlucoseNormal), 1.0);
    assert_eq!(value_of(&record, Feature::A1cNormal), 1.0);
    assert_eq!(value_of(&record, Feature::A1cHigh), 0.0);
}

#[test]
fn unknown_test_result_zeroes_all_indicators() {
    let record = EncounterRecord::default()
        .with_glucose_test("borderline")
        .with_a1c_test("not done");
    for feature in [
        Feature::GlucoseNormal,
        Feature::GlucoseHigh,
        Feature::GlucoseNotDone,
        Feature::A1cNormal,
        Feature::A1cHigh,
        Feature::A1cNotDone,
    ] {
        assert_eq!(value_of(&record, feature), 0.0, "{feature:?}");
    }
}

#[test]
fn extreme_values_never_fail() {
    let record = EncounterRecord::default()
        .with_numeric(NumericField::Age, 120)
        .with_numeric(NumericField::LengthOfStay, 30)
        .with_numeric(NumericField::PreviousInpatientStays, 5)
        .with_numeric(NumericField::EmergencyVisits, 1_000_000)
        .with_numeric(NumericField::NumMedications, -3)
        .with_diabetes_medication("yes")
        .with_glucose_test("high")
        .with_a1c_test("high");

    let features = map_features(&record).to_numeric().expect("numeric");
    assert_eq!(features.get(Feature::Age), 120.0);
    assert_eq!(features.get(Feature::LengthOfStay), 30.0);
    assert_eq!(features.get(Feature::PreviousInpatientStays), 5.0);
}

#[test]
fn non_numeric_values_are_forwarded_untouched() {
    let record = EncounterRecord::from_value(json!({"age": "seventy", "emergency_visits": [1]}))
        .expect("record");
    let features = map_features(&record);

    assert_eq!(features.get(Feature::Age), &FeatureValue::Raw(json!("seventy")));
    assert_eq!(features.get(Feature::EmergencyVisits), &FeatureValue::Raw(json!([1])));
    assert!(features.to_numeric().is_err());
}
