use serde_json::{Map, Value};

use super::OutputProcessor;
use crate::error::OutputError;

/// `text/csv` output.
///
/// A list of records becomes a header row (union of keys in first-seen order)
/// followed by one row per record. A single record is one header row plus one
/// data row. Other lists are written row by row without a header. Nested
/// values are written as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvProcessor;

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn csv_err(err: impl std::fmt::Display) -> OutputError {
    OutputError::Csv(err.to_string())
}

fn header_union<'a>(records: impl Iterator<Item = &'a Map<String, Value>>) -> Vec<&'a str> {
    let mut headers: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }
    headers
}

impl OutputProcessor for CsvProcessor {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn content_type(&self) -> &'static str {
        "text/csv; charset=utf-8"
    }

    fn format(&self, payload: &Value) -> Result<Vec<u8>, OutputError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(vec![]);

        match payload {
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                let records: Vec<&Map<String, Value>> =
                    items.iter().filter_map(Value::as_object).collect();
                let headers = header_union(records.iter().copied());
                wtr.write_record(&headers).map_err(csv_err)?;
                for record in records {
                    let row: Vec<String> = headers
                        .iter()
                        .map(|h| record.get(*h).map(cell).unwrap_or_default())
                        .collect();
                    wtr.write_record(&row).map_err(csv_err)?;
                }
            }
            Value::Array(items) => {
                for item in items {
                    let row: Vec<String> = match item {
                        Value::Array(cells) => cells.iter().map(cell).collect(),
                        other => vec![cell(other)],
                    };
                    wtr.write_record(&row).map_err(csv_err)?;
                }
            }
            Value::Object(map) => {
                let headers: Vec<&str> = map.keys().map(String::as_str).collect();
                wtr.write_record(&headers).map_err(csv_err)?;
                let row: Vec<String> = map.values().map(cell).collect();
                wtr.write_record(&row).map_err(csv_err)?;
            }
            scalar => {
                wtr.write_record([cell(scalar)]).map_err(csv_err)?;
            }
        }

        wtr.into_inner().map_err(csv_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use serde_json::json;

    fn render(value: Value) -> String {
        String::from_utf8(CsvProcessor.format(&value).unwrap()).unwrap()
    }

    #[test]
    fn records_share_a_header_row() {
        let csv = render(json!([{"id": 1, "name": "Rex"}, {"id": 2, "tag": "a,b"}]));
        assert_eq!(csv, "id,name,tag\n1,Rex,\n2,,\"a,b\"\n");
    }

    #[test]
    fn single_record_and_scalars() {
        assert_eq!(render(json!({"id": "42"})), "id\n42\n");
        assert_eq!(render(json!([["a"], [1, 2]])), "a\n1,2\n");
        assert_eq!(render(json!("x")), "x\n");
    }

    #[test]
    fn error_envelope_is_one_record() {
        let err = HttpError::forbidden("Insufficient privileges");
        let csv = String::from_utf8(CsvProcessor.format_error(&err, false).unwrap()).unwrap();
        assert_eq!(csv, "type,code,message\nForbidden,403,Insufficient privileges\n");
    }
}
