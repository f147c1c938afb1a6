//! Tabular test data: the `testcases` sheet and the `config` sheet.
//!
//! Rows arrive as loose column maps (a spreadsheet exported to YAML or
//! JSON). Structured cells may hold native values or JSON text; both are
//! accepted and everything is validated up front so that malformed data
//! fails before any request is sent.

use crate::error::{EngineError, EngineResult};
use crate::model::{HttpMethod, TestCaseRecord, TestNumber};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Raw workbook as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    #[serde(default)]
    pub testcases: Vec<Map<String, Value>>,
    #[serde(default)]
    pub config: Vec<ConfigRow>,
}

/// One attribute/value row of the config sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRow {
    pub attribute: String,
    #[serde(default)]
    pub value: Value,
}

/// Attribute/value lookup used by `##` placeholders.
#[derive(Debug, Clone, Default)]
pub struct ConfigTable {
    values: HashMap<String, Value>,
}

impl ConfigTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from sheet rows. The first row wins for a repeated attribute.
    pub fn from_rows(rows: &[ConfigRow]) -> Self {
        let mut values = HashMap::new();
        for row in rows {
            values
                .entry(row.attribute.clone())
                .or_insert_with(|| row.value.clone());
        }
        Self { values }
    }

    pub fn insert(&mut self, attribute: impl Into<String>, value: Value) {
        self.values.insert(attribute.into(), value);
    }

    /// Value of `attribute`; `None` when the attribute is missing or its
    /// cell is blank.
    pub fn lookup(&self, attribute: &str) -> Option<&Value> {
        match self.values.get(attribute)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::Number(n) if n.as_f64().is_some_and(f64::is_nan) => None,
            value => Some(value),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parsed `testcases` sheet, in table order.
#[derive(Debug, Clone, Default)]
pub struct TestTable {
    records: Vec<TestCaseRecord>,
    index: HashMap<TestNumber, usize>,
}

impl TestTable {
    /// Build a table from parsed records, rejecting duplicate test
    /// numbers.
    pub fn new(records: Vec<TestCaseRecord>) -> EngineResult<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if index.insert(record.test_number.clone(), pos).is_some() {
                return Err(EngineError::DuplicateTestNumber(
                    record.test_number.to_string(),
                ));
            }
        }
        Ok(Self { records, index })
    }

    /// Parse every row of a workbook sheet.
    pub fn from_rows(rows: &[Map<String, Value>]) -> EngineResult<Self> {
        let records = rows
            .iter()
            .enumerate()
            .map(|(pos, row)| parse_row(row, pos))
            .collect::<EngineResult<Vec<_>>>()?;
        Self::new(records)
    }

    pub fn records(&self) -> &[TestCaseRecord] {
        &self.records
    }

    pub fn get(&self, test_number: &TestNumber) -> Option<&TestCaseRecord> {
        self.index.get(test_number).map(|&pos| &self.records[pos])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Workbook {
    /// Split the workbook into its parsed test table and config table.
    pub fn into_tables(self) -> EngineResult<(TestTable, ConfigTable)> {
        let table = TestTable::from_rows(&self.testcases)?;
        let config = ConfigTable::from_rows(&self.config);
        Ok((table, config))
    }
}

/// Column names, with the legacy sheet headers accepted as aliases.
const TEST_NUMBER: &[&str] = &["test_number"];
const USE_NEXT: &[&str] = &["use_next"];
const DELAY: &[&str] = &["delay_before_test_sec"];
const CREDENTIALS: &[&str] = &["credentials", "use_creds"];
const BASE_URL: &[&str] = &["base_url"];
const ENDPOINT: &[&str] = &["endpoint_name", "api_name"];
const METHOD: &[&str] = &["http_method", "request_type"];
const GROUP: &[&str] = &["group_name", "test_group_name"];
const STEP: &[&str] = &["step_name", "test_step_name"];
const PAYLOAD: &[&str] = &["payload"];
const ATTACHMENT: &[&str] = &["attachment_name", "attachment"];
const TEST_TYPE: &[&str] = &["test_type"];
const SCHEMA: &[&str] = &["response_schema"];
const EXPECTED: &[&str] = &["expected_outcome"];
const UNEXPECTED: &[&str] = &["unexpected_outcome", "un_expected_outcome"];
const HEADERS: &[&str] =
    &["expected_response_headers", "expected_response_header"];
const SKIP: &[&str] = &["skip_flag", "skip_test"];

fn cell<'a>(row: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| row.get(*name))
}

/// Parse one sheet row. `pos` is the zero-based row position, used when
/// the row has no usable test number.
pub fn parse_row(
    row: &Map<String, Value>,
    pos: usize,
) -> EngineResult<TestCaseRecord> {
    let test_number = cell(row, TEST_NUMBER)
        .and_then(TestNumber::from_cell)
        .ok_or_else(|| {
            EngineError::malformed(
                format!("row {}", pos + 1),
                TEST_NUMBER[0],
                "missing test number",
            )
        })?;
    let id = test_number.to_string();

    let use_next = cell(row, USE_NEXT).and_then(TestNumber::from_cell);

    let delay_before_test_sec = match cell(row, DELAY) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64().filter(|d| !d.is_nan()),
        Some(Value::String(s)) if is_blank(s) => None,
        Some(Value::String(s)) => Some(s.trim().parse::<f64>().map_err(|e| {
            EngineError::malformed(&id, DELAY[0], e.to_string())
        })?),
        Some(other) => {
            return Err(EngineError::malformed(
                &id,
                DELAY[0],
                format!("expected a number, got {other}"),
            ))
        }
    };
    if let Some(delay) = delay_before_test_sec.filter(|d| *d > 0.0) {
        Duration::try_from_secs_f64(delay).map_err(|e| {
            EngineError::malformed(
                &id,
                DELAY[0],
                format!("delay of {delay} seconds is out of range: {e}"),
            )
        })?;
    }

    let credentials = match structured_cell(row, CREDENTIALS, &id)? {
        None => None,
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            return Err(EngineError::malformed(
                &id,
                CREDENTIALS[0],
                format!("expected a JSON object, got {other}"),
            ))
        }
    };

    let endpoint_name = text_cell(row, ENDPOINT).ok_or_else(|| {
        EngineError::malformed(&id, ENDPOINT[0], "missing endpoint")
    })?;

    let http_method = text_cell(row, METHOD)
        .ok_or_else(|| {
            EngineError::malformed(&id, METHOD[0], "missing HTTP method")
        })?
        .parse::<HttpMethod>()
        .map_err(|e| EngineError::malformed(&id, METHOD[0], e))?;

    Ok(TestCaseRecord {
        use_next,
        delay_before_test_sec,
        credentials,
        base_url: text_cell(row, BASE_URL),
        endpoint_name,
        http_method,
        group_name: text_cell(row, GROUP).unwrap_or_default(),
        step_name: text_cell(row, STEP).unwrap_or_default(),
        payload: structured_cell(row, PAYLOAD, &id)?,
        attachment_name: text_cell(row, ATTACHMENT),
        test_type: text_cell(row, TEST_TYPE),
        response_schema: structured_cell(row, SCHEMA, &id)?,
        expected_outcome: structured_cell(row, EXPECTED, &id)?,
        unexpected_outcome: structured_cell(row, UNEXPECTED, &id)?,
        expected_response_headers: structured_cell(row, HEADERS, &id)?,
        skip_flag: cell(row, SKIP).is_some_and(is_skip_marker),
        test_number,
    })
}

fn is_blank(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan")
}

fn text_cell(row: &Map<String, Value>, names: &[&str]) -> Option<String> {
    match cell(row, names)? {
        Value::String(s) if is_blank(s) => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a cell holding a nested structure. Text is parsed as JSON, with
/// bare `NaN` tokens read as `null`.
fn structured_cell(
    row: &Map<String, Value>,
    names: &[&str],
    id: &str,
) -> EngineResult<Option<Value>> {
    match cell(row, names) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if is_blank(text) => Ok(None),
        Some(Value::String(text)) => parse_json_cell(text)
            .map(Some)
            .map_err(|e| EngineError::malformed(id, names[0], e.to_string())),
        Some(value) => Ok(Some(value.clone())),
    }
}

/// Parse JSON text taken from a spreadsheet cell.
pub fn parse_json_cell(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(&null_bare_nan(text))
}

/// Replace `NaN` tokens outside string literals with `null`.
fn null_bare_nan(text: &str) -> Cow<'_, str> {
    if !text.contains("NaN") {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(after) = rest.strip_prefix("NaN") {
            out.push_str("null");
            rest = after;
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    Cow::Owned(out)
}

fn is_skip_marker(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "skip" | "true" | "yes" | "y" | "1"
        ),
        _ => false,
    }
}

/// Test numbers referenced by `use_next` that do not exist in the table.
pub fn dangling_links(table: &TestTable) -> Vec<(TestNumber, TestNumber)> {
    let known: HashSet<&TestNumber> =
        table.records().iter().map(|r| &r.test_number).collect();
    table
        .records()
        .iter()
        .filter_map(|r| {
            r.use_next
                .as_ref()
                .filter(|next| !known.contains(next))
                .map(|next| (r.test_number.clone(), next.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_row_with_json_text_cells() {
        let record = parse_row(
            &row(json!({
                "test_number": 1,
                "use_next": 2.0,
                "delay_before_test_sec": "1.5",
                "use_creds": "{\"Authorization\": \"Bearer t\"}",
                "base_url": "http://localhost:8080",
                "api_name": "users",
                "request_type": "post",
                "test_group_name": "Users",
                "test_step_name": "create",
                "payload": "{\"name\": \"alice\", \"age\": NaN}",
                "expected_outcome": {"created": true},
                "skip_test": "",
            })),
            0,
        )
        .unwrap();

        assert_eq!(record.test_number.as_str(), "1");
        assert_eq!(record.use_next, Some("2".into()));
        assert_eq!(record.delay_before_test_sec, Some(1.5));
        assert_eq!(
            record.credentials.unwrap().get("Authorization"),
            Some(&json!("Bearer t"))
        );
        assert_eq!(record.endpoint_name, "users");
        assert_eq!(record.http_method, HttpMethod::Post);
        assert_eq!(record.payload, Some(json!({"name": "alice", "age": null})));
        assert_eq!(record.expected_outcome, Some(json!({"created": true})));
        assert!(!record.skip_flag);
    }

    #[test]
    fn invalid_json_cell_reports_row_and_column() {
        let err = parse_row(
            &row(json!({
                "test_number": "tc-9",
                "endpoint_name": "users",
                "http_method": "GET",
                "payload": "{not json",
            })),
            3,
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("tc-9"), "{text}");
        assert!(text.contains("payload"), "{text}");
    }

    #[test]
    fn nan_inside_strings_is_kept() {
        let record = parse_row(
            &row(json!({
                "test_number": 1,
                "endpoint_name": "fruit",
                "http_method": "POST",
                "payload": r#"{"fruit": "BaNaNa", "code": "NaNo-42", "quote": "say \"NaN\"", "missing": NaN, "list": [NaN, "NaN"]}"#,
            })),
            0,
        )
        .unwrap();

        assert_eq!(
            record.payload,
            Some(json!({
                "fruit": "BaNaNa",
                "code": "NaNo-42",
                "quote": "say \"NaN\"",
                "missing": null,
                "list": [null, "NaN"]
            }))
        );
    }

    #[test]
    fn json_cell_without_nan_is_untouched() {
        assert_eq!(null_bare_nan(r#"{"a": "b"}"#), Cow::Borrowed(r#"{"a": "b"}"#));
        assert_eq!(null_bare_nan(r#"["\\", NaN]"#), r#"["\\", null]"#);
    }

    #[test]
    fn out_of_range_delay_is_malformed() {
        for delay in [json!(1e20), json!("inf")] {
            let err = parse_row(
                &row(json!({
                    "test_number": 7,
                    "endpoint_name": "users",
                    "http_method": "GET",
                    "delay_before_test_sec": delay,
                })),
                0,
            )
            .unwrap_err();
            assert!(
                matches!(&err, EngineError::MalformedData { column, .. } if column == "delay_before_test_sec"),
                "{err}"
            );
        }

        let record = parse_row(
            &row(json!({
                "test_number": 8,
                "endpoint_name": "users",
                "http_method": "GET",
                "delay_before_test_sec": -3,
            })),
            0,
        )
        .unwrap();
        assert_eq!(record.delay_before_test_sec, Some(-3.0));
    }

    #[test]
    fn missing_test_number_reports_row_position() {
        let err = parse_row(
            &row(json!({"endpoint_name": "users", "http_method": "GET"})),
            4,
        )
        .unwrap_err();
        assert!(err.to_string().contains("row 5"));
    }

    #[test]
    fn unknown_method_is_malformed() {
        let err = parse_row(
            &row(json!({
                "test_number": 1,
                "endpoint_name": "users",
                "http_method": "FETCH",
            })),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::MalformedData { .. }));
    }

    #[test]
    fn skip_markers() {
        assert!(is_skip_marker(&json!("skip")));
        assert!(is_skip_marker(&json!("SKIP")));
        assert!(is_skip_marker(&json!(true)));
        assert!(!is_skip_marker(&json!("")));
        assert!(!is_skip_marker(&json!("run")));
        assert!(!is_skip_marker(&Value::Null));
    }

    #[test]
    fn duplicate_test_numbers_are_rejected() {
        let rows = vec![
            row(json!({"test_number": 1, "endpoint_name": "a", "http_method": "GET"})),
            row(json!({"test_number": "1", "endpoint_name": "b", "http_method": "GET"})),
        ];
        let err = TestTable::from_rows(&rows).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTestNumber(id) if id == "1"));
    }

    #[test]
    fn config_lookup_treats_blank_cells_as_missing() {
        let config = ConfigTable::from_rows(&[
            ConfigRow { attribute: "tenant".into(), value: json!("int[5]") },
            ConfigRow { attribute: "blank".into(), value: json!("") },
            ConfigRow { attribute: "nothing".into(), value: Value::Null },
            ConfigRow { attribute: "tenant".into(), value: json!("ignored") },
        ]);
        assert_eq!(config.lookup("tenant"), Some(&json!("int[5]")));
        assert_eq!(config.lookup("blank"), None);
        assert_eq!(config.lookup("nothing"), None);
        assert_eq!(config.lookup("absent"), None);
    }

    #[test]
    fn reports_dangling_links() {
        let rows = vec![
            row(json!({"test_number": 1, "use_next": 7, "endpoint_name": "a", "http_method": "GET"})),
            row(json!({"test_number": 2, "endpoint_name": "b", "http_method": "GET"})),
        ];
        let table = TestTable::from_rows(&rows).unwrap();
        assert_eq!(dangling_links(&table), vec![("1".into(), "7".into())]);
    }
}
