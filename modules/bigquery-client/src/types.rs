use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BigQueryError, Result};

// --- Request types ---

/// Body of `jobs.query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(rename = "useLegacySql")]
    pub use_legacy_sql: bool,
    #[serde(rename = "parameterMode", skip_serializing_if = "Option::is_none")]
    pub parameter_mode: Option<String>,
    #[serde(rename = "queryParameters", skip_serializing_if = "Vec::is_empty")]
    pub query_parameters: Vec<QueryParameter>,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl QueryRequest {
    /// Standard-SQL query with positional (`?`) string parameters.
    pub fn positional(sql: &str, params: &[&str], location: Option<&str>) -> Self {
        Self {
            query: sql.to_string(),
            use_legacy_sql: false,
            parameter_mode: (!params.is_empty()).then(|| "POSITIONAL".to_string()),
            query_parameters: params.iter().map(|p| QueryParameter::string(p)).collect(),
            timeout_ms: 10_000,
            location: location.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryParameter {
    #[serde(rename = "parameterType")]
    pub parameter_type: ParameterType,
    #[serde(rename = "parameterValue")]
    pub parameter_value: ParameterValue,
}

impl QueryParameter {
    pub fn string(value: &str) -> Self {
        Self {
            parameter_type: ParameterType {
                kind: "STRING".to_string(),
            },
            parameter_value: ParameterValue {
                value: value.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterType {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterValue {
    pub value: String,
}

// --- Response types ---

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(rename = "jobComplete", default)]
    pub job_complete: bool,
    #[serde(rename = "jobReference")]
    pub job_reference: Option<JobReference>,
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    #[serde(rename = "pageToken")]
    pub page_token: Option<String>,
    #[serde(rename = "numDmlAffectedRows")]
    pub num_dml_affected_rows: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobReference {
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: Value,
}

/// Response of the GCE metadata server token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataToken {
    pub access_token: String,
    pub expires_in: u64,
}

// --- Row decoding ---

/// Turn the positional `f`/`v` row encoding into one JSON object per row,
/// keyed by column name.
///
/// Temporal columns are wrapped as `{"value": "..."}`, the same shape the
/// official client libraries return.
pub fn decode_rows(schema: &TableSchema, rows: &[TableRow]) -> Result<Vec<Value>> {
    rows.iter()
        .map(|row| decode_record(&schema.fields, &row.f))
        .collect()
}

fn decode_record(fields: &[FieldSchema], cells: &[TableCell]) -> Result<Value> {
    if fields.len() != cells.len() {
        return Err(BigQueryError::Parse(format!(
            "row has {} cells but schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }
    let mut object = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(cells) {
        object.insert(field.name.clone(), decode_cell(field, &cell.v)?);
    }
    Ok(Value::Object(object))
}

fn decode_cell(field: &FieldSchema, v: &Value) -> Result<Value> {
    if v.is_null() {
        return Ok(if field.is_repeated() {
            Value::Array(Vec::new())
        } else {
            Value::Null
        });
    }

    if field.is_repeated() {
        let items = v
            .as_array()
            .ok_or_else(|| parse_err(field, "expected an array"))?;
        return items
            .iter()
            .map(|item| decode_value(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array);
    }

    decode_value(field, v)
}

fn decode_value(field: &FieldSchema, v: &Value) -> Result<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }

    if matches!(field.field_type.as_str(), "RECORD" | "STRUCT") {
        let cells: Vec<TableCell> = serde_json::from_value(
            v.get("f")
                .cloned()
                .ok_or_else(|| parse_err(field, "record without `f`"))?,
        )?;
        return decode_record(&field.fields, &cells);
    }

    let raw = v
        .as_str()
        .ok_or_else(|| parse_err(field, "expected a string-encoded scalar"))?;

    match field.field_type.as_str() {
        "INTEGER" | "INT64" => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| parse_err(field, &e.to_string())),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            let n = raw
                .parse::<f64>()
                .map_err(|e| parse_err(field, &e.to_string()))?;
            Ok(serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string())))
        }
        "BOOLEAN" | "BOOL" => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(parse_err(field, &format!("invalid boolean {other}"))),
        },
        "TIMESTAMP" => Ok(wrapped(timestamp_to_rfc3339(field, raw)?)),
        "DATE" | "DATETIME" | "TIME" => Ok(wrapped(raw.to_string())),
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// TIMESTAMP cells arrive as (possibly exponent-formatted) epoch seconds.
fn timestamp_to_rfc3339(field: &FieldSchema, raw: &str) -> Result<String> {
    let secs = raw
        .parse::<f64>()
        .map_err(|e| parse_err(field, &e.to_string()))?;
    let micros = (secs * 1_000_000.0).round() as i64;
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(micros.div_euclid(1_000_000), nanos)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| parse_err(field, "timestamp out of range"))
}

fn wrapped(value: String) -> Value {
    let mut object = Map::new();
    object.insert("value".to_string(), Value::String(value));
    Value::Object(object)
}

fn parse_err(field: &FieldSchema, msg: &str) -> BigQueryError {
    BigQueryError::Parse(format!("column `{}`: {msg}", field.name))
}
