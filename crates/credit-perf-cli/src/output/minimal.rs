use serde_json::Value;

use super::table::format_value;

/// Priority list of headline fields.
const PRIORITY_KEYS: [&str; 6] = ["xirr", "net_irr", "gross_irr", "moic", "gross_moic", "paid_in"];

/// Identifier fields used to label a row when the result is a table.
const LABEL_KEYS: [&str; 5] = ["id", "entity_id", "deal_id", "fund", "payment_date"];

/// Print just the key answer value from the output.
///
/// An object prints its first non-null priority field. A table prints one
/// `label: value` line per row.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result_obj {
        Value::Object(map) => {
            for key in &PRIORITY_KEYS {
                if let Some(val) = map.get(*key) {
                    if !val.is_null() {
                        println!("{}", format_value(val));
                        return;
                    }
                }
            }
            if let Some((key, val)) = map.iter().next() {
                println!("{}: {}", key, format_value(val));
                return;
            }
            println!("{}", format_value(result_obj));
        }
        Value::Array(rows) => {
            for row in rows {
                println!("{}", headline(row));
            }
        }
        other => println!("{}", format_value(other)),
    }
}

fn headline(row: &Value) -> String {
    let Value::Object(map) = row else {
        return format_value(row);
    };

    let label = LABEL_KEYS
        .iter()
        .find_map(|k| map.get(*k).filter(|v| !v.is_null()))
        .map(format_value)
        .unwrap_or_default();
    let figure = PRIORITY_KEYS
        .iter()
        .find_map(|k| map.get(*k).filter(|v| !v.is_null()))
        .or_else(|| map.get("amount"))
        .map(format_value)
        .unwrap_or_else(|| "N/A".to_string());

    format!("{}: {}", label, figure)
}
