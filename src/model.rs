//! Test table records, response snapshots and run results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identifier of a row in the test table.
///
/// Spreadsheet cells hand these over as integers, integral floats or
/// strings; all of them normalise to the same textual form.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TestNumber(String);

impl TestNumber {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an identifier from a raw cell. Returns `None` for empty,
    /// null or non-scalar cells.
    pub fn from_cell(cell: &Value) -> Option<Self> {
        match cell {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
                    None
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self(i.to_string()))
                } else if let Some(u) = n.as_u64() {
                    Some(Self(u.to_string()))
                } else {
                    let f = n.as_f64()?;
                    if f.is_nan() {
                        None
                    } else if f.fract() == 0.0 {
                        Some(Self(format!("{}", f as i64)))
                    } else {
                        Some(Self(f.to_string()))
                    }
                }
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestNumber {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// HTTP method of a test step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(format!("unsupported HTTP method '{other}'")),
        }
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One row of the test table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseRecord {
    pub test_number: TestNumber,
    /// Successor row; `None` ends the sequence.
    #[serde(default)]
    pub use_next: Option<TestNumber>,
    #[serde(default)]
    pub delay_before_test_sec: Option<f64>,
    /// Header map sent with every step of the sequence. Only the first
    /// executed step's value is used.
    #[serde(default)]
    pub credentials: Option<Map<String, Value>>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub endpoint_name: String,
    pub http_method: HttpMethod,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub step_name: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub attachment_name: Option<String>,
    #[serde(default)]
    pub test_type: Option<String>,
    #[serde(default)]
    pub response_schema: Option<Value>,
    #[serde(default)]
    pub expected_outcome: Option<Value>,
    #[serde(default)]
    pub unexpected_outcome: Option<Value>,
    #[serde(default)]
    pub expected_response_headers: Option<Value>,
    #[serde(default)]
    pub skip_flag: bool,
}

impl TestCaseRecord {
    /// Name used in logs: the step name, or the test number when the
    /// step is unnamed.
    pub fn display_name(&self) -> String {
        if self.step_name.is_empty() {
            format!("test {}", self.test_number)
        } else {
            self.step_name.clone()
        }
    }
}

/// Ordered chain of records ready for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    /// Records to execute, skip-flagged rows already removed.
    pub steps: Vec<TestCaseRecord>,
    /// Rows that were part of the chain but carry a skip flag.
    #[serde(default)]
    pub skipped: Vec<TestNumber>,
}

impl Sequence {
    /// Group name of the sequence, taken from its first executed step.
    pub fn group_name(&self) -> String {
        match self.steps.first() {
            Some(first) if !first.group_name.is_empty() => {
                first.group_name.clone()
            }
            Some(first) => format!("sequence {}", first.test_number),
            None => match self.skipped.first() {
                Some(id) => format!("sequence {id}"),
                None => "empty sequence".to_string(),
            },
        }
    }

    pub fn test_numbers(&self) -> Vec<TestNumber> {
        self.steps.iter().map(|s| s.test_number.clone()).collect()
    }
}

/// Outcome of one executed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    /// Response headers with lower-case names.
    pub headers: HashMap<String, String>,
    /// Parsed JSON body, or an empty array when the body is not JSON.
    pub body: Value,
    #[serde(default)]
    pub raw_body: String,
    #[serde(default)]
    pub elapsed: Duration,
}

impl ResponseSnapshot {
    /// Build a snapshot from raw parts, structuring the body the same way
    /// for every transport.
    pub fn from_parts(
        status: u16,
        headers: HashMap<String, String>,
        raw_body: String,
        elapsed: Duration,
    ) -> Self {
        let body = structure_body(&raw_body);
        Self {
            status,
            headers,
            body,
            raw_body,
            elapsed,
        }
    }
}

/// Parse a response body as JSON, falling back to an empty array.
pub fn structure_body(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .unwrap_or_else(|_| Value::Array(Vec::new()))
}

/// Pass/fail tag of a single checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// One soft assertion recorded during a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub name: String,
    pub message: String,
    pub verdict: Verdict,
    /// Diagnostic attachment: the expectation that failed, schema
    /// violations or a swallowed error.
    #[serde(default)]
    pub detail: Option<String>,
}

/// Result of running one sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceResult {
    pub group_name: String,
    pub test_numbers: Vec<TestNumber>,
    pub success: bool,
    pub error: Option<String>,
    #[serde(default)]
    pub skipped: Vec<TestNumber>,
    pub steps: Vec<StepResult>,
    pub duration_ms: u64,
}

/// Result of running one step within a sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub test_number: TestNumber,
    pub name: String,
    pub success: bool,
    pub error: Option<String>,
    pub request: RequestInfo,
    pub response: Option<ResponseInfo>,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointRecord>,
    pub duration_ms: u64,
}

/// Captured HTTP request information for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    #[serde(default)]
    pub attachment: Option<String>,
}

/// Captured HTTP response information for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
    pub elapsed_ms: u64,
}

impl From<&ResponseSnapshot> for ResponseInfo {
    fn from(snapshot: &ResponseSnapshot) -> Self {
        Self {
            status: snapshot.status,
            headers: snapshot.headers.clone(),
            body: snapshot.body.clone(),
            elapsed_ms: snapshot.elapsed.as_millis() as u64,
        }
    }
}

/// Report of a whole run, written by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunReport {
    pub sequences: Vec<SequenceResult>,
    pub passed: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
    pub timestamp: String,
}
