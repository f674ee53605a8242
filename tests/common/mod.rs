#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const HEADER: &str = "LPN,Amazon COGS,Completed On,Disposition,Product,Product Category,Result of Repair,\
Scheduled Date,Shipped Date,Started On,Checks/Title,Checks/Status,\
Checks/Failed by decision logic Automatically,Activity Exception Decoration";

pub fn header_row(lpn: &str, cost: &str, disposition: &str) -> String {
    format!(
        "{lpn},{cost},2024-01-05 09:00:00,{disposition},Widget,Electronics/Computers/Laptops,Repaired,\
2024-01-01 08:00:00,2024-01-10 12:00:00,2024-01-02 09:30:00,,,,note"
    )
}

pub fn check_row(name: &str, status: &str, automated: &str) -> String {
    format!(",,,,,,,,,,{name},{status},{automated},")
}

/// Orders covering the documented scenarios:
/// A1 two human checks, B1 an automated failure, C1 a repeated check,
/// D1 a non-numeric cost and E1 no checks at all.
pub fn scenario_rows() -> Vec<String> {
    vec![
        header_row("A1", "1800", "Sellable"),
        check_row("Does it work?", "Passed", "FALSE"),
        check_row("Is it Fraud?", "Failed", ""),
        header_row("B1", "2200", "Liquidate"),
        check_row("Is it Fraud?", "Failed", "TRUE"),
        check_row("Does it work?", "Passed", ""),
        header_row("C1", "1300", "Liquidate"),
        check_row("Is the Item Repairable?", "Failed", ""),
        check_row("Is the Item Repairable?", "Passed", ""),
        header_row("D1", "call for price", "Liquidate"),
        check_row("Does it work?", "Failed", "N"),
        header_row("E1", "2600", "Sellable"),
    ]
}

pub fn write_export(dir: &Path, name: &str, rows: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut text = String::from(HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    fs::write(&path, text).unwrap();
    path
}

/// Output table as a header plus one map per row, keyed by column name.
pub fn read_table(path: &Path) -> (Vec<String>, Vec<HashMap<String, String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| {
            let record = r.unwrap();
            header
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect()
        })
        .collect();
    (header, rows)
}

pub fn row<'a>(rows: &'a [HashMap<String, String>], lpn: &str) -> &'a HashMap<String, String> {
    rows.iter()
        .find(|r| r["LPN"] == lpn)
        .unwrap_or_else(|| panic!("no output row for {lpn}"))
}
