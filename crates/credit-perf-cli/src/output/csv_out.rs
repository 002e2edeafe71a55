use serde_json::Value;
use std::io;

use super::table::format_value;

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Array(rows)) => write_array_csv(&mut wtr, rows),
            Some(Value::Object(result)) if result.values().any(Value::is_array) => {
                // Named tables share one stream; a `table` column tells them apart.
                for (name, section) in result {
                    if let Value::Array(rows) = section {
                        write_tagged_csv(&mut wtr, name, rows);
                    }
                }
            }
            Some(Value::Object(result)) => {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in result {
                    let _ = wtr.write_record([key.as_str(), &format_value(val)]);
                }
            }
            _ => {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), &format_value(val)]);
                }
            }
        },
        Value::Array(arr) => write_array_csv(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_value(value)]);
        }
    }

    let _ = wtr.flush();
}

fn headers_of(arr: &[Value]) -> Option<Vec<String>> {
    match arr.first() {
        Some(Value::Object(first)) => Some(first.keys().cloned().collect()),
        _ => None,
    }
}

fn row_of(item: &Value, headers: &[String]) -> Vec<String> {
    match item {
        Value::Object(map) => headers
            .iter()
            .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
            .collect(),
        other => vec![format_value(other)],
    }
}

fn write_array_csv<W: io::Write>(wtr: &mut csv::Writer<W>, arr: &[Value]) {
    let Some(headers) = headers_of(arr) else {
        for item in arr {
            let _ = wtr.write_record([&format_value(item)]);
        }
        return;
    };

    let _ = wtr.write_record(&headers);
    for item in arr {
        let _ = wtr.write_record(row_of(item, &headers));
    }
}

fn write_tagged_csv<W: io::Write>(wtr: &mut csv::Writer<W>, table: &str, arr: &[Value]) {
    let Some(headers) = headers_of(arr) else {
        return;
    };

    let mut header_row = vec!["table".to_string()];
    header_row.extend(headers.iter().cloned());
    let _ = wtr.write_record(&header_row);
    for item in arr {
        let mut row = vec![table.to_string()];
        row.extend(row_of(item, &headers));
        let _ = wtr.write_record(&row);
    }
}
