mod common;

use common::{scenario_rows, write_export};
use repair_order_features::app::feature_pipeline_use_case::FeaturePipelineUseCase;
use repair_order_features::{Config, Pipeline};
use std::fs;

#[test]
fn rerunning_produces_identical_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path(), "orders.csv", &scenario_rows());
    let output = dir.path().join("out").join("features.csv");
    let report = dir.path().join("out").join("report.json");

    let use_case = FeaturePipelineUseCase::with_file_outputs(Pipeline::new(Config::default()).unwrap());

    let first = use_case.execute(&input, Some(&output), Some(&report)).unwrap();
    let table_once = fs::read(&output).unwrap();
    let report_once = fs::read(&report).unwrap();

    let second = use_case.execute(&input, Some(&output), Some(&report)).unwrap();
    assert_eq!(fs::read(&output).unwrap(), table_once);
    assert_eq!(fs::read(&report).unwrap(), report_once);
    assert_eq!(first.table.sha256, second.table.sha256);
    assert_eq!(first.report_file.sha256, second.report_file.sha256);
}

#[test]
fn separate_pipelines_agree() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path(), "orders.csv", &scenario_rows());

    let a = Pipeline::new(Config::default()).unwrap().run(&input).unwrap();
    let b = Pipeline::new(Config::default()).unwrap().run(&input).unwrap();
    assert_eq!(a.table.header(), b.table.header());
    for i in 0..a.table.len() {
        assert_eq!(a.table.record(i), b.table.record(i));
    }
    assert_eq!(
        serde_json::to_string(&a.report).unwrap(),
        serde_json::to_string(&b.report).unwrap()
    );
}
