use bytes::Bytes;
use insight_services::models::{CellValue, ColumnType, DataRow, Table};
use insight_services::services::file_processor::parse_file;
use insight_services::services::profiler::analyze_data;

fn row(cells: Vec<(&str, CellValue)>) -> DataRow {
    cells.into_iter().collect()
}

fn mixed_table() -> Table {
    Table::new(vec![
        row(vec![
            ("id", CellValue::Number(1.0)),
            ("joined", CellValue::text("2023-05-01")),
            ("active", CellValue::Bool(true)),
            ("note", CellValue::text("first")),
        ]),
        row(vec![
            ("id", CellValue::Number(2.0)),
            ("joined", CellValue::Null),
            ("active", CellValue::text("false")),
        ]),
        row(vec![
            ("id", CellValue::Number(40.0)),
            ("joined", CellValue::text("2023-06-12T08:00:00Z")),
            ("active", CellValue::text("")),
            ("note", CellValue::Number(3.0)),
            ("late", CellValue::text("not profiled")),
        ]),
    ])
}

#[test]
fn missing_plus_defined_equals_row_count() {
    let table = mixed_table();

    for profile in analyze_data(&table) {
        let defined = table
            .column_values(&profile.name)
            .filter(|v| v.is_defined())
            .count();
        assert_eq!(profile.missing_values + defined, table.len(), "column {}", profile.name);
    }
}

#[test]
fn stats_present_only_for_number_columns() {
    for profile in analyze_data(&mixed_table()) {
        assert_eq!(
            profile.stats.is_some(),
            profile.column_type == ColumnType::Number,
            "column {}",
            profile.name
        );
        if let Some(stats) = profile.stats {
            assert!(stats.min <= stats.mean && stats.mean <= stats.max);
        }
    }
}

#[test]
fn one_profile_per_first_row_key() {
    let profiles = analyze_data(&mixed_table());
    let summary: Vec<_> = profiles
        .iter()
        .map(|p| (p.name.as_str(), p.column_type))
        .collect();

    assert_eq!(
        summary,
        vec![
            ("id", ColumnType::Number),
            ("joined", ColumnType::Date),
            ("active", ColumnType::Boolean),
            ("note", ColumnType::String),
        ]
    );
}

#[test]
fn uploaded_csv_round_trips_through_profiler() {
    let csv = "sku,price,in_stock,updated\n\
               A-1,9.99,TRUE,2024-01-05\n\
               A-2,12.5,FALSE,2024-01-06\n\
               A-3,,TRUE,2024-01-07\n\
               A-4,3,true,\n";
    let table = parse_file("inventory.csv", Bytes::from_static(csv.as_bytes())).unwrap();
    let profiles = analyze_data(&table);

    let price = &profiles[1];
    assert_eq!(price.column_type, ColumnType::Number);
    assert_eq!(price.missing_values, 1);
    let stats = price.stats.unwrap();
    assert_eq!(stats.min, 3.0);
    assert_eq!(stats.max, 12.5);
    assert!((stats.mean - (9.99 + 12.5 + 3.0) / 3.0).abs() < 1e-9);

    assert_eq!(profiles[2].column_type, ColumnType::Boolean);
    assert_eq!(profiles[2].unique_values, 2);
    assert_eq!(profiles[3].column_type, ColumnType::Date);
    assert_eq!(profiles[3].missing_values, 1);

    let json = serde_json::to_value(&profiles[1]).unwrap();
    assert_eq!(json["type"], "number");
    assert_eq!(json["sample"], serde_json::json!([9.99, 12.5, null, 3]));
    assert_eq!(json["max"], 12.5);
}
