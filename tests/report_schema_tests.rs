mod common;

use common::{scenario_rows, write_export};
use jsonschema::JSONSchema;
use repair_order_features::app::feature_pipeline_use_case::FeaturePipelineUseCase;
use repair_order_features::{Config, Pipeline};
use serde_json::json;

fn compiled_schema() -> JSONSchema {
    let schema = include_str!("../schemas/transformation_report.v1.json");
    let schema_json: serde_json::Value = serde_json::from_str(schema).unwrap();
    let schema_static: &'static serde_json::Value = Box::leak(Box::new(schema_json));
    JSONSchema::options().compile(schema_static).unwrap()
}

fn written_report() -> serde_json::Value {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path(), "orders.csv", &scenario_rows());
    let use_case = FeaturePipelineUseCase::with_file_outputs(Pipeline::new(Config::default()).unwrap());
    let summary = use_case.execute(&input, None, None).unwrap();
    let text = std::fs::read_to_string(&summary.report_file.path).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn written_report_is_valid() {
    let compiled = compiled_schema();
    let report = written_report();
    assert!(compiled.is_valid(&report));
    assert_eq!(report["input"]["encoding"], json!("UTF-8"));
    assert_eq!(report["policies"]["duplicate_check"], json!("last_write_wins"));
    assert_eq!(report["pivot"]["columns_created"], json!(3));
    assert!(report["output"]["sha256"].is_string());
}

#[test]
fn report_lists_matched_flag_columns() {
    let report = written_report();
    let flags = report["features"]["flags"].as_array().unwrap();
    let fraud = flags.iter().find(|f| f["feature"] == json!("fraud_check_failed")).unwrap();
    assert_eq!(fraud["matched_columns"], json!(["Is_it_Fraud"]));
    assert_eq!(fraud["target"], json!("Failed"));
}

#[test]
fn malformed_checksum_is_rejected() {
    let compiled = compiled_schema();
    let mut report = written_report();
    report["input"]["sha256"] = json!("NOTAHEX");
    assert!(!compiled.is_valid(&report), "checksum pattern should fail");
}

#[test]
fn unknown_decision_is_rejected() {
    let compiled = compiled_schema();
    let mut report = written_report();
    report["quality"]["decision"] = json!("Quarantine");
    assert!(!compiled.is_valid(&report));
}
