use std::collections::HashSet;
use smallvec::SmallVec;
use crate::models::{CellValue, ColumnProfile, ColumnType, NumericStats, Table, SAMPLE_SIZE};
use super::utils::{coerce_number, is_date_string};

/// Identity of a defined value for distinct counting. Numbers compare by
/// value with `0 == -0` and all NaNs equal; text never equals a number.
#[derive(PartialEq, Eq, Hash)]
enum ValueKey<'a> {
    Number(u64),
    Bool(bool),
    Text(&'a str),
}

impl<'a> ValueKey<'a> {
    fn of(value: &'a CellValue) -> Option<Self> {
        match value {
            CellValue::Number(n) if n.is_nan() => Some(ValueKey::Number(f64::NAN.to_bits())),
            CellValue::Number(n) if *n == 0.0 => Some(ValueKey::Number(0f64.to_bits())),
            CellValue::Number(n) => Some(ValueKey::Number(n.to_bits())),
            CellValue::Bool(b) => Some(ValueKey::Bool(*b)),
            CellValue::Text(s) => Some(ValueKey::Text(s)),
            CellValue::Null => None,
        }
    }
}

/// Profiles every column of `table`, in first-row key order.
///
/// Columns come from the first row only: keys that appear only in later rows
/// are ignored, and rows lacking a key count as absent for that column. An
/// empty table yields no profiles.
pub fn analyze_data(table: &Table) -> Vec<ColumnProfile> {
    if table.is_empty() {
        return Vec::new();
    }

    let profiles: Vec<ColumnProfile> = table
        .columns()
        .into_iter()
        .map(|name| analyze_column(table, name))
        .collect();

    tracing::debug!(
        "Profiled {} columns over {} rows",
        profiles.len(),
        table.len()
    );
    profiles
}

fn analyze_column(table: &Table, name: String) -> ColumnProfile {
    let values: Vec<&CellValue> = table.column_values(&name).collect();
    let defined: Vec<&CellValue> = values.iter().copied().filter(|v| v.is_defined()).collect();

    let unique_values = defined
        .iter()
        .filter_map(|v| ValueKey::of(v))
        .collect::<HashSet<_>>()
        .len();
    let missing_values = values.len() - defined.len();

    let column_type = detect_column_type(&defined);
    let stats = match column_type {
        ColumnType::Number => numeric_stats(defined.iter().filter_map(|v| v.as_number())),
        _ => None,
    };

    let sample: SmallVec<[CellValue; SAMPLE_SIZE]> = values
        .iter()
        .take(SAMPLE_SIZE)
        .map(|v| (*v).clone())
        .collect();

    ColumnProfile {
        name,
        column_type,
        unique_values,
        missing_values,
        sample,
        stats,
    }
}

/// Classifies a column from its defined values.
///
/// Each rule must hold for every value; a single non-conforming value drops
/// the column to the next rule, ending at `String`. There is no majority
/// vote. Text is never re-parsed into a number here: a numeric column that
/// arrived as text is a string column.
pub fn detect_column_type(defined: &[&CellValue]) -> ColumnType {
    if defined.is_empty() {
        return ColumnType::String;
    }

    if defined.iter().all(|v| matches!(v, CellValue::Number(_))) {
        ColumnType::Number
    } else if defined.iter().all(|v| is_boolean_value(v)) {
        ColumnType::Boolean
    } else if defined.iter().all(|v| is_date_value(v)) {
        ColumnType::Date
    } else {
        ColumnType::String
    }
}

fn is_boolean_value(value: &CellValue) -> bool {
    match value {
        CellValue::Bool(_) => true,
        CellValue::Text(s) => s == "true" || s == "false",
        _ => false,
    }
}

// A date must parse as one and must not also read as a plain number, so
// "20240101" stays out while "2024-01-01" gets in.
fn is_date_value(value: &CellValue) -> bool {
    match value {
        CellValue::Text(s) => is_date_string(s) && coerce_number(s).is_none(),
        _ => false,
    }
}

fn numeric_stats(values: impl Iterator<Item = f64>) -> Option<NumericStats> {
    let (count, sum, min, max) = values.fold(
        (0usize, 0.0f64, f64::INFINITY, f64::NEG_INFINITY),
        |(count, sum, min, max), v| (count + 1, sum + v, min.min(v), max.max(v)),
    );

    if count == 0 {
        return None;
    }

    Some(NumericStats {
        min,
        max,
        mean: sum / count as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataRow;

    fn row(cells: &[(&str, CellValue)]) -> DataRow {
        cells.iter().cloned().collect()
    }

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    fn text(s: &str) -> CellValue {
        CellValue::text(s)
    }

    #[test]
    fn empty_table_has_no_profiles() {
        assert!(analyze_data(&Table::default()).is_empty());
    }

    #[test]
    fn mixed_number_and_string_columns() {
        let table = Table::new(vec![
            row(&[("a", num(1.0)), ("b", text("x"))]),
            row(&[("a", num(2.0)), ("b", text(""))]),
            row(&[("a", num(3.0)), ("b", text("y"))]),
        ]);
        let profiles = analyze_data(&table);

        assert_eq!(profiles.len(), 2);

        let a = &profiles[0];
        assert_eq!(a.name, "a");
        assert_eq!(a.column_type, ColumnType::Number);
        assert_eq!(a.missing_values, 0);
        assert_eq!(a.unique_values, 3);
        assert_eq!(
            a.stats,
            Some(NumericStats { min: 1.0, max: 3.0, mean: 2.0 })
        );

        let b = &profiles[1];
        assert_eq!(b.column_type, ColumnType::String);
        assert_eq!(b.missing_values, 1);
        assert_eq!(b.unique_values, 2);
        assert_eq!(b.sample.as_slice(), &[text("x"), text(""), text("y")]);
        assert!(b.stats.is_none());
    }

    #[test]
    fn date_strings_are_dates() {
        let table = Table::new(vec![
            row(&[("d", text("2024-01-01"))]),
            row(&[("d", text("2024-02-01"))]),
        ]);

        assert_eq!(analyze_data(&table)[0].column_type, ColumnType::Date);
    }

    #[test]
    fn numeric_looking_text_is_not_a_date() {
        let table = Table::new(vec![
            row(&[("d", text("2024-01-01"))]),
            row(&[("d", text("20240101"))]),
        ]);

        assert_eq!(analyze_data(&table)[0].column_type, ColumnType::String);
    }

    #[test]
    fn all_absent_column_defaults_to_string() {
        let table = Table::new(vec![
            row(&[("e", CellValue::Null)]),
            row(&[("e", text(""))]),
            row(&[("e", CellValue::Null)]),
        ]);
        let profile = &analyze_data(&table)[0];

        assert_eq!(profile.column_type, ColumnType::String);
        assert_eq!(profile.missing_values, 3);
        assert_eq!(profile.unique_values, 0);
        assert!(profile.stats.is_none());
    }

    #[test]
    fn booleans_accept_native_and_literal_text() {
        let table = Table::new(vec![
            row(&[("flag", CellValue::Bool(true))]),
            row(&[("flag", text("false"))]),
            row(&[("flag", text("true"))]),
            row(&[("flag", CellValue::Null)]),
        ]);
        let profile = &analyze_data(&table)[0];

        assert_eq!(profile.column_type, ColumnType::Boolean);
        // Bool(true) and "true" are different values.
        assert_eq!(profile.unique_values, 3);
        assert_eq!(profile.missing_values, 1);
    }

    #[test]
    fn boolean_text_is_case_sensitive() {
        let table = Table::new(vec![
            row(&[("flag", text("True"))]),
            row(&[("flag", text("false"))]),
        ]);

        assert_eq!(analyze_data(&table)[0].column_type, ColumnType::String);
    }

    #[test]
    fn one_stray_value_forces_string() {
        let table = Table::new(vec![
            row(&[("n", text("1"))]),
            row(&[("n", text("2"))]),
            row(&[("n", text("3"))]),
            row(&[("n", text("n/a"))]),
        ]);

        assert_eq!(analyze_data(&table)[0].column_type, ColumnType::String);
    }

    #[test]
    fn numbers_stored_as_text_stay_strings() {
        let table = Table::new(vec![
            row(&[("n", num(1.0))]),
            row(&[("n", text("2"))]),
        ]);
        let profile = &analyze_data(&table)[0];

        assert_eq!(profile.column_type, ColumnType::String);
        assert!(profile.stats.is_none());
    }

    #[test]
    fn number_and_its_text_form_are_distinct() {
        let table = Table::new(vec![
            row(&[("v", num(1.0))]),
            row(&[("v", text("1"))]),
            row(&[("v", num(1.0))]),
            row(&[("v", num(-0.0))]),
            row(&[("v", num(0.0))]),
        ]);

        assert_eq!(analyze_data(&table)[0].unique_values, 3);
    }

    #[test]
    fn columns_follow_first_row() {
        let table = Table::new(vec![
            row(&[("b", num(1.0)), ("a", num(2.0))]),
            row(&[("a", num(3.0)), ("extra", text("ignored"))]),
        ]);
        let profiles = analyze_data(&table);
        let names: Vec<_> = profiles.iter().map(|p| p.name.as_str()).collect();

        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(profiles[0].missing_values, 1);
        assert_eq!(profiles[0].sample.as_slice(), &[num(1.0), CellValue::Null]);
    }

    #[test]
    fn sample_takes_first_five_raw_values() {
        let rows = (0..8)
            .map(|i| {
                let value = if i == 1 { CellValue::Null } else { num(i as f64) };
                row(&[("n", value)])
            })
            .collect();
        let profile = &analyze_data(&Table::new(rows))[0];

        assert_eq!(
            profile.sample.as_slice(),
            &[num(0.0), CellValue::Null, num(2.0), num(3.0), num(4.0)]
        );
        assert_eq!(
            profile.stats,
            Some(NumericStats { min: 0.0, max: 7.0, mean: 28.0 / 7.0 })
        );
    }

    #[test]
    fn profiling_is_idempotent() {
        let table = Table::new(vec![
            row(&[("a", num(5.5)), ("b", text("2024-03-01")), ("c", CellValue::Bool(false))]),
            row(&[("a", num(-2.0)), ("b", text("2024-03-02")), ("c", CellValue::Null)]),
        ]);

        assert_eq!(analyze_data(&table), analyze_data(&table));
    }
}
