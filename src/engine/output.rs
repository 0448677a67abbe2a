//! Output formatting for query results.

use arrow::array::{
    Array, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, Int8Array, LargeStringArray, StringArray, Time64MicrosecondArray,
    TimestampMicrosecondArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use std::io::Write;

use super::QueryOutput;

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON array format
    Json,
    /// JSON lines format (one object per line)
    JsonLines,
    /// CSV format
    Csv,
    /// Tab-separated values
    Tsv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" | "ndjson" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            "tsv" => Ok(OutputFormat::Tsv),
            _ => Err(format!(
                "Unknown format: {}. Valid: table, json, jsonl, csv, tsv",
                s
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Tsv => write!(f, "tsv"),
        }
    }
}

/// Column names plus stringified rows, flattened across result fragments.
struct RenderedTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RenderedTable {
    fn from_output(output: &QueryOutput) -> Self {
        let columns = output
            .schema
            .as_ref()
            .map(|schema| schema.fields().iter().map(|f| f.name().clone()).collect())
            .unwrap_or_default();
        let mut rows = Vec::with_capacity(output.num_rows());
        for batch in &output.batches {
            append_batch_rows(batch, &mut rows);
        }
        Self { columns, rows }
    }
}

fn append_batch_rows(batch: &RecordBatch, rows: &mut Vec<Vec<String>>) {
    for row in 0..batch.num_rows() {
        let mut values = Vec::with_capacity(batch.num_columns());
        for column in batch.columns() {
            values.push(cell_to_string(column.as_ref(), row));
        }
        rows.push(values);
    }
}

/// Stringify one cell the way the interactive shell shows it.
fn cell_to_string(array: &dyn Array, row: usize) -> String {
    if array.is_null(row) {
        return "NULL".to_string();
    }

    macro_rules! primitive {
        ($ty:ty) => {
            array
                .as_any()
                .downcast_ref::<$ty>()
                .map(|a| a.value(row).to_string())
        };
    }

    let rendered = match array.data_type() {
        DataType::Boolean => primitive!(BooleanArray),
        DataType::Int8 => primitive!(Int8Array),
        DataType::Int16 => primitive!(Int16Array),
        DataType::Int32 => primitive!(Int32Array),
        DataType::Int64 => primitive!(Int64Array),
        DataType::UInt8 => primitive!(UInt8Array),
        DataType::UInt16 => primitive!(UInt16Array),
        DataType::UInt32 => primitive!(UInt32Array),
        DataType::UInt64 => primitive!(UInt64Array),
        DataType::Float32 => primitive!(Float32Array),
        DataType::Float64 => primitive!(Float64Array),
        DataType::Utf8 => array
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.value(row).to_string()),
        DataType::LargeUtf8 => array
            .as_any()
            .downcast_ref::<LargeStringArray>()
            .map(|a| a.value(row).to_string()),
        DataType::Date32 => array
            .as_any()
            .downcast_ref::<Date32Array>()
            .and_then(|a| a.value_as_date(row))
            .map(|d| d.format("%Y-%m-%d").to_string()),
        DataType::Timestamp(TimeUnit::Microsecond, _) => array
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .and_then(|a| a.value_as_datetime(row))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        DataType::Time64(TimeUnit::Microsecond) => array
            .as_any()
            .downcast_ref::<Time64MicrosecondArray>()
            .and_then(|a| a.value_as_time(row))
            .map(|t| t.format("%H:%M:%S").to_string()),
        _ => arrow::util::display::array_value_to_string(array, row).ok(),
    };
    rendered.unwrap_or_else(|| "ERROR".to_string())
}

/// Formatter for query results
pub struct QueryResultFormatter;

impl QueryResultFormatter {
    /// Format a query result to a string
    pub fn format(output: &QueryOutput, format: OutputFormat) -> String {
        let table = RenderedTable::from_output(output);
        match format {
            OutputFormat::Table => Self::format_table(&table),
            OutputFormat::Json => Self::format_json(&table),
            OutputFormat::JsonLines => Self::format_jsonl(&table),
            OutputFormat::Csv => Self::format_csv(&table),
            OutputFormat::Tsv => Self::format_tsv(&table),
        }
    }

    /// Write formatted result to a writer
    pub fn write<W: Write>(
        output: &QueryOutput,
        format: OutputFormat,
        writer: &mut W,
    ) -> std::io::Result<()> {
        let formatted = Self::format(output, format);
        writer.write_all(formatted.as_bytes())
    }

    /// Format as ASCII table
    fn format_table(table: &RenderedTable) -> String {
        if table.columns.is_empty() {
            return "0 rows\n".to_string();
        }

        // Calculate column widths, capped for readability
        let mut widths: Vec<usize> = table.columns.iter().map(|c| c.len()).collect();
        for row in &table.rows {
            for (i, val) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(val.len());
                }
            }
        }
        let max_width = 50;
        widths.iter_mut().for_each(|w| *w = (*w).min(max_width));

        let mut output = String::new();

        output.push('┌');
        for (i, width) in widths.iter().enumerate() {
            output.push_str(&"─".repeat(*width + 2));
            if i < widths.len() - 1 {
                output.push('┬');
            }
        }
        output.push_str("┐\n");

        output.push('│');
        for (i, col) in table.columns.iter().enumerate() {
            let truncated = Self::truncate(col, widths[i]);
            output.push_str(&format!(" {:width$} │", truncated, width = widths[i]));
        }
        output.push('\n');

        output.push('├');
        for (i, width) in widths.iter().enumerate() {
            output.push_str(&"─".repeat(*width + 2));
            if i < widths.len() - 1 {
                output.push('┼');
            }
        }
        output.push_str("┤\n");

        for row in &table.rows {
            output.push('│');
            for (i, val) in row.iter().enumerate() {
                if i < widths.len() {
                    let truncated = Self::truncate(val, widths[i]);
                    output.push_str(&format!(" {:width$} │", truncated, width = widths[i]));
                }
            }
            output.push('\n');
        }

        output.push('└');
        for (i, width) in widths.iter().enumerate() {
            output.push_str(&"─".repeat(*width + 2));
            if i < widths.len() - 1 {
                output.push('┴');
            }
        }
        output.push_str("┘\n");

        output.push_str(&format!(
            "{} row{}\n",
            table.rows.len(),
            if table.rows.len() == 1 { "" } else { "s" }
        ));

        output
    }

    /// Truncate a string to a maximum length
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
            format!("{}…", truncated)
        }
    }

    /// Format as JSON array
    fn format_json(table: &RenderedTable) -> String {
        let rows: Vec<serde_json::Value> = table
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = table
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, val)| (col.clone(), Self::json_value(val)))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();

        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    /// Format as JSON lines (NDJSON)
    fn format_jsonl(table: &RenderedTable) -> String {
        table
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = table
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, val)| (col.clone(), Self::json_value(val)))
                    .collect();
                serde_json::to_string(&serde_json::Value::Object(obj))
                    .unwrap_or_else(|_| "{}".to_string())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Convert a string value to appropriate JSON type
    fn json_value(val: &str) -> serde_json::Value {
        if val == "NULL" {
            return serde_json::Value::Null;
        }
        if let Ok(n) = val.parse::<i64>() {
            return serde_json::Value::Number(n.into());
        }
        if let Ok(n) = val.parse::<f64>() {
            if let Some(num) = serde_json::Number::from_f64(n) {
                return serde_json::Value::Number(num);
            }
        }
        if val.eq_ignore_ascii_case("true") {
            return serde_json::Value::Bool(true);
        }
        if val.eq_ignore_ascii_case("false") {
            return serde_json::Value::Bool(false);
        }
        serde_json::Value::String(val.to_string())
    }

    /// Format as CSV
    fn format_csv(table: &RenderedTable) -> String {
        let mut output = String::new();
        output.push_str(&Self::csv_row(&table.columns));
        output.push('\n');
        for row in &table.rows {
            output.push_str(&Self::csv_row(row));
            output.push('\n');
        }
        output
    }

    fn csv_row(values: &[String]) -> String {
        values
            .iter()
            .map(|v| Self::csv_escape(v))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn csv_escape(val: &str) -> String {
        if val.contains(',') || val.contains('"') || val.contains('\n') || val.contains('\r') {
            format!("\"{}\"", val.replace('"', "\"\""))
        } else {
            val.to_string()
        }
    }

    /// Format as TSV
    fn format_tsv(table: &RenderedTable) -> String {
        let mut output = String::new();
        output.push_str(&table.columns.join("\t"));
        output.push('\n');
        for row in &table.rows {
            let escaped: Vec<String> = row
                .iter()
                .map(|v| v.replace('\t', "\\t").replace('\n', "\\n"))
                .collect();
            output.push_str(&escaped.join("\t"));
            output.push('\n');
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    fn sample_output() -> QueryOutput {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("price", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("Widget"), None])),
                Arc::new(Float64Array::from(vec![19.99, 49.5])),
            ],
        )
        .unwrap();
        QueryOutput {
            schema: Some(schema),
            batches: vec![batch],
            files_skipped: 0,
            files_outlier_read: 0,
            files_scanned: 1,
            scan_time_secs: 0.001,
            execution_time_secs: 0.002,
        }
    }

    #[test]
    fn test_format_table() {
        let output = QueryResultFormatter::format(&sample_output(), OutputFormat::Table);
        assert!(output.contains("Widget"));
        assert!(output.contains("NULL"));
        assert!(output.contains("2 rows"));
    }

    #[test]
    fn test_format_table_empty_result() {
        let empty = QueryOutput {
            batches: Vec::new(),
            schema: None,
            files_skipped: 1,
            files_outlier_read: 0,
            files_scanned: 0,
            scan_time_secs: 0.0,
            execution_time_secs: 0.0,
        };
        assert_eq!(
            QueryResultFormatter::format(&empty, OutputFormat::Table),
            "0 rows\n"
        );
    }

    #[test]
    fn test_format_json() {
        let output = QueryResultFormatter::format(&sample_output(), OutputFormat::Json);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["name"], "Widget");
        assert_eq!(parsed[0]["price"], 19.99);
        assert_eq!(parsed[1]["name"], serde_json::Value::Null);
    }

    #[test]
    fn test_format_csv() {
        let output = QueryResultFormatter::format(&sample_output(), OutputFormat::Csv);
        assert!(output.starts_with("id,name,price\n"));
        assert!(output.contains("1,Widget,19.99"));
    }

    #[test]
    fn test_format_tsv() {
        let output = QueryResultFormatter::format(&sample_output(), OutputFormat::Tsv);
        assert!(output.starts_with("id\tname\tprice\n"));
        assert!(output.contains("1\tWidget\t19.99"));
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(QueryResultFormatter::csv_escape("hello"), "hello");
        assert_eq!(
            QueryResultFormatter::csv_escape("hello,world"),
            "\"hello,world\""
        );
        assert_eq!(
            QueryResultFormatter::csv_escape("say \"hi\""),
            "\"say \"\"hi\"\"\""
        );
    }

    #[test]
    fn test_json_value_conversion() {
        assert_eq!(
            QueryResultFormatter::json_value("NULL"),
            serde_json::Value::Null
        );
        assert_eq!(QueryResultFormatter::json_value("42"), serde_json::json!(42));
        assert_eq!(
            QueryResultFormatter::json_value("3.14"),
            serde_json::json!(3.14)
        );
        assert_eq!(
            QueryResultFormatter::json_value("true"),
            serde_json::json!(true)
        );
        assert_eq!(
            QueryResultFormatter::json_value("hello"),
            serde_json::json!("hello")
        );
    }
}
