//! Sequence execution.
//!
//! Each sequence runs its steps strictly in order. A step binds its payload
//! against the two previous responses, sends the request, runs its checks
//! as soft assertions and settles them with one verdict. The first step
//! error ends the sequence; other sequences are unaffected.

use crate::binder::{ExecutionWindow, PayloadBinder};
use crate::checkpoint::CheckpointLedger;
use crate::config::RunConfig;
use crate::error::{EngineError, EngineResult};
use crate::http::{HttpClient, OutboundRequest, ReqwestClient};
use crate::model::*;
use crate::table::ConfigTable;
use crate::validator::{
    headers_as_value, is_subset, normalize_header_expectation, verify_schema,
};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

pub const SCHEMA_CHECK: &str = "Schema Validation Check";
pub const EXPECTED_CHECK: &str = "Validation of expected response values";
pub const UNEXPECTED_CHECK: &str = "Validation against unexpected outcomes";
pub const HEADER_CHECK: &str = "Validation of expected response header";

/// Sequence runner trait
#[async_trait]
pub trait SequenceRunner: Send + Sync {
    /// Execute one sequence
    async fn run(&self, sequence: &Sequence) -> Result<SequenceResult>;
}

/// Default sequence runner
#[derive(Debug)]
pub struct DefaultSequenceRunner<C = ReqwestClient> {
    client: C,
    config: RunConfig,
    config_table: ConfigTable,
}

impl DefaultSequenceRunner<ReqwestClient> {
    /// Create a runner sending requests through `reqwest`
    pub fn new(config: RunConfig, config_table: ConfigTable) -> Self {
        let client = ReqwestClient::new(Duration::from_secs(config.timeout));
        Self::with_client(client, config, config_table)
    }
}

/// Values captured from the first step and shared by the whole sequence.
#[derive(Debug, Clone)]
struct SequenceContext {
    base_url: String,
    headers: HashMap<String, String>,
}

impl SequenceContext {
    fn from_first_step(
        record: &TestCaseRecord,
        config: &RunConfig,
    ) -> EngineResult<Self> {
        let base_url = record
            .base_url
            .clone()
            .or_else(|| config.base_url.clone())
            .ok_or_else(|| {
                EngineError::malformed(
                    record.test_number.as_str(),
                    "base_url",
                    "first step has no base URL and no default is configured",
                )
            })?;

        let mut headers = config.default_headers.clone();
        match &record.credentials {
            Some(credentials) => {
                for (name, value) in credentials {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    headers.insert(name.clone(), value);
                }
            }
            None => {
                headers
                    .entry("Content-Type".to_string())
                    .or_insert_with(|| "application/json".to_string());
            }
        }

        Ok(Self { base_url, headers })
    }
}

/// What a step got to before it finished or failed.
#[derive(Debug, Default)]
struct StepTrace {
    request: Option<RequestInfo>,
    response: Option<ResponseInfo>,
    checkpoints: Vec<CheckpointRecord>,
}

impl<C: HttpClient> DefaultSequenceRunner<C> {
    /// Create a runner with a custom HTTP client
    pub fn with_client(
        client: C,
        config: RunConfig,
        config_table: ConfigTable,
    ) -> Self {
        Self {
            client,
            config,
            config_table,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute one step. Errors are fatal for the sequence.
    async fn execute_step(
        &self,
        record: &TestCaseRecord,
        context: &SequenceContext,
        window: &mut ExecutionWindow,
        ledger: &mut CheckpointLedger,
        trace: &mut StepTrace,
    ) -> EngineResult<()> {
        let binder = PayloadBinder::new(&self.config_table);
        let payload = record
            .payload
            .as_ref()
            .map(|payload| binder.bind(payload, window));
        window.shift();

        if let Some(delay) = record.delay_before_test_sec.filter(|d| *d > 0.0) {
            let wait = Duration::try_from_secs_f64(delay).map_err(|e| {
                EngineError::malformed(
                    record.test_number.as_str(),
                    "delay_before_test_sec",
                    format!("delay of {delay} seconds is out of range: {e}"),
                )
            })?;
            info!("Waiting for {} seconds", delay);
            tokio::time::sleep(wait).await;
        }

        let request = OutboundRequest {
            method: record.http_method,
            url: join_url(&context.base_url, &record.endpoint_name),
            headers: context.headers.clone(),
            payload,
            attachment: record
                .attachment_name
                .as_ref()
                .map(|name| self.config.attachment_dir.join(name)),
        };
        if let Some(payload) = &request.payload {
            debug!("Request payload: {}", payload);
        }
        trace.request = Some(request_info(&request));

        let response = self.client.send(&request).await?;
        debug!("Response body: {}", response.body);
        trace.response = Some(ResponseInfo::from(&response));

        run_checks(record, &response, ledger);
        trace.checkpoints = ledger.records().to_vec();
        ledger.assert_final(&verdict_label(record))?;

        window.record(response.body);
        Ok(())
    }
}

impl<C: HttpClient + 'static> DefaultSequenceRunner<C> {
    /// Run independent sequences, at most `RunConfig::jobs` at a time.
    /// Results are returned in input order.
    pub async fn run_all(
        self: Arc<Self>,
        sequences: Vec<Sequence>,
    ) -> Vec<SequenceResult> {
        let jobs = self.config.jobs.max(1);
        let semaphore = Arc::new(Semaphore::new(jobs));
        let labels: Vec<(String, Vec<TestNumber>)> = sequences
            .iter()
            .map(|s| (s.group_name(), s.test_numbers()))
            .collect();

        info!("Running {} sequence(s) with {} job(s)", sequences.len(), jobs);

        let mut tasks = JoinSet::new();
        for (idx, sequence) in sequences.into_iter().enumerate() {
            let runner = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (idx, runner.run(&sequence).await)
            });
        }

        let mut slots: Vec<Option<SequenceResult>> = vec![None; labels.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(result))) => slots[idx] = Some(result),
                Ok((idx, Err(e))) => {
                    let (group, ids) = &labels[idx];
                    slots[idx] = Some(aborted(group, ids, e.to_string()));
                }
                Err(e) => error!("Sequence task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(labels)
            .map(|(slot, (group, ids))| {
                slot.unwrap_or_else(|| {
                    aborted(&group, &ids, "sequence task did not complete".into())
                })
            })
            .collect()
    }
}

#[async_trait]
impl<C: HttpClient> SequenceRunner for DefaultSequenceRunner<C> {
    #[instrument(skip(self, sequence), fields(group = %sequence.group_name()))]
    async fn run(&self, sequence: &Sequence) -> Result<SequenceResult> {
        let start_time = Instant::now();
        let group = sequence.group_name();
        let mut step_results = Vec::new();
        let mut sequence_error = None;

        info!("Starting sequence: {}", group);

        if sequence.steps.is_empty() {
            info!("Every step of {} is skipped", group);
        } else {
            match SequenceContext::from_first_step(&sequence.steps[0], &self.config)
            {
                Err(e) => {
                    error!("Cannot start sequence {}: {}", group, e);
                    sequence_error = Some(e.to_string());
                }
                Ok(context) => {
                    let mut window = ExecutionWindow::new();
                    let mut ledger = CheckpointLedger::new();

                    for (step_idx, record) in sequence.steps.iter().enumerate() {
                        info!(
                            "Running step {}/{}: {}",
                            step_idx + 1,
                            sequence.steps.len(),
                            record.display_name()
                        );

                        let step_start = Instant::now();
                        let mut trace = StepTrace::default();
                        let outcome = self
                            .execute_step(
                                record,
                                &context,
                                &mut window,
                                &mut ledger,
                                &mut trace,
                            )
                            .await;

                        let error = outcome.err().map(|e| {
                            error!(
                                "Step {} of {} failed: {}",
                                record.test_number, group, e
                            );
                            e.to_string()
                        });
                        let failed = error.is_some();

                        step_results.push(StepResult {
                            test_number: record.test_number.clone(),
                            name: record.display_name(),
                            success: !failed,
                            error: error.clone(),
                            request: trace
                                .request
                                .unwrap_or_else(|| unsent_request(record, &context)),
                            response: trace.response,
                            checkpoints: trace.checkpoints,
                            duration_ms: step_start.elapsed().as_millis() as u64,
                        });

                        if failed {
                            info!("Stopping sequence due to step failure");
                            sequence_error = error;
                            break;
                        }
                    }
                }
            }
        }

        let result = SequenceResult {
            group_name: group.clone(),
            test_numbers: sequence.test_numbers(),
            success: sequence_error.is_none(),
            error: sequence_error.map(|e| format!("{group}: {e}")),
            skipped: sequence.skipped.clone(),
            steps: step_results,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Sequence finished: {} ({} ms) - Success: {}",
            group, result.duration_ms, result.success
        );

        Ok(result)
    }
}

/// Run the configured checks of a step into `ledger`. Every configured
/// check runs regardless of earlier failures.
fn run_checks(
    record: &TestCaseRecord,
    response: &ResponseSnapshot,
    ledger: &mut CheckpointLedger,
) {
    if let Some(schema) = &record.response_schema {
        let message = "The response adheres to the expected schema";
        match verify_schema(&response.body, schema) {
            Ok(Ok(())) => ledger.soft_assert_true(Some(true), message, SCHEMA_CHECK),
            Ok(Err(violations)) => {
                ledger.soft_assert_true(Some(false), message, SCHEMA_CHECK);
                ledger.annotate_last(violations.join("\n"));
                ledger.annotate_last(format!("Expected response schema:\n{}", pretty(schema)));
            }
            Err(e) => ledger.soft_assert_outcome(Err::<bool, _>(e), message, SCHEMA_CHECK),
        }
    }

    if let Some(expected) = &record.expected_outcome {
        let matched = is_subset(&response.body, expected);
        ledger.soft_assert_true(
            Some(matched),
            "The response values align with the expected outcome",
            EXPECTED_CHECK,
        );
        if !matched {
            ledger.annotate_last(format!("Expected outcome:\n{}", pretty(expected)));
        }
    }

    if let Some(unexpected) = &record.unexpected_outcome {
        let present = is_subset(&response.body, unexpected);
        ledger.soft_assert_false(
            Some(present),
            "The response does not include unexpected values",
            UNEXPECTED_CHECK,
        );
        if present {
            ledger.annotate_last(format!("Unexpected outcome:\n{}", pretty(unexpected)));
        }
    }

    if let Some(expected) = &record.expected_response_headers {
        let actual = headers_as_value(&response.headers);
        let matched = is_subset(&actual, &normalize_header_expectation(expected));
        ledger.soft_assert_true(
            Some(matched),
            "The response header values align with the expected response headers",
            HEADER_CHECK,
        );
        if !matched {
            ledger.annotate_last(format!(
                "Expected response headers:\n{}\nActual response headers:\n{}",
                pretty(expected),
                pretty(&actual)
            ));
        }
    }
}

/// Label of a step in the final verdict: its group, else its step name.
fn verdict_label(record: &TestCaseRecord) -> String {
    if record.group_name.is_empty() {
        record.display_name()
    } else {
        record.group_name.clone()
    }
}

/// Join a base URL and an endpoint with exactly one slash.
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    if endpoint.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{endpoint}")
    }
}

/// Mask header values that look like secrets before they reach a report.
pub fn mask_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    const SENSITIVE: [&str; 6] = ["auth", "token", "key", "secret", "password", "cookie"];
    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            if SENSITIVE.iter().any(|s| lower.contains(s)) {
                (name.clone(), "***".to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

fn request_info(request: &OutboundRequest) -> RequestInfo {
    RequestInfo {
        method: request.method.to_string(),
        url: request.url.clone(),
        headers: mask_headers(&request.headers),
        body: request.payload.clone(),
        attachment: request
            .attachment
            .as_ref()
            .map(|p| p.display().to_string()),
    }
}

fn unsent_request(record: &TestCaseRecord, context: &SequenceContext) -> RequestInfo {
    RequestInfo {
        method: record.http_method.to_string(),
        url: join_url(&context.base_url, &record.endpoint_name),
        headers: HashMap::new(),
        body: None,
        attachment: record.attachment_name.clone(),
    }
}

fn aborted(group: &str, ids: &[TestNumber], error: String) -> SequenceResult {
    SequenceResult {
        group_name: group.to_string(),
        test_numbers: ids.to_vec(),
        success: false,
        error: Some(format!("{group}: {error}")),
        skipped: Vec::new(),
        steps: Vec::new(),
        duration_ms: 0,
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use serde_json::json;
    use std::sync::Mutex;

    type Responder =
        Box<dyn Fn(&OutboundRequest) -> Result<ResponseSnapshot, TransportError> + Send + Sync>;

    struct MockClient {
        responder: Responder,
        requests: Mutex<Vec<OutboundRequest>>,
    }

    impl MockClient {
        fn new<F>(responder: F) -> Self
        where
            F: Fn(&OutboundRequest) -> Result<ResponseSnapshot, TransportError>
                + Send
                + Sync
                + 'static,
        {
            Self {
                responder: Box::new(responder),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<OutboundRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for MockClient {
        async fn send(
            &self,
            request: &OutboundRequest,
        ) -> Result<ResponseSnapshot, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.responder)(request)
        }
    }

    fn ok(body: Value) -> Result<ResponseSnapshot, TransportError> {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Ok(ResponseSnapshot::from_parts(
            200,
            headers,
            body.to_string(),
            Duration::ZERO,
        ))
    }

    fn record(id: &str, endpoint: &str) -> TestCaseRecord {
        TestCaseRecord {
            test_number: id.into(),
            use_next: None,
            delay_before_test_sec: None,
            credentials: None,
            base_url: None,
            endpoint_name: endpoint.to_string(),
            http_method: HttpMethod::Post,
            group_name: "Users".to_string(),
            step_name: format!("step {id}"),
            payload: None,
            attachment_name: None,
            test_type: None,
            response_schema: None,
            expected_outcome: None,
            unexpected_outcome: None,
            expected_response_headers: None,
            skip_flag: false,
        }
    }

    fn sequence(mut steps: Vec<TestCaseRecord>) -> Sequence {
        if let Some(first) = steps.first_mut() {
            first.base_url.get_or_insert_with(|| "http://api.test/".to_string());
        }
        Sequence {
            steps,
            skipped: Vec::new(),
        }
    }

    fn runner(client: MockClient) -> DefaultSequenceRunner<MockClient> {
        DefaultSequenceRunner::with_client(client, RunConfig::default(), ConfigTable::new())
    }

    fn echo_user(request: &OutboundRequest) -> Result<ResponseSnapshot, TransportError> {
        if request.url.ends_with("/users") {
            ok(json!({"user": {"id": "123", "name": "alice"}}))
        } else {
            ok(json!({"echo": request.payload.clone()}))
        }
    }

    #[tokio::test]
    async fn second_step_receives_first_response_value() {
        let mut second = record("2", "orders");
        second.payload = Some(json!({"id": "$#.user.id"}));
        let runner = runner(MockClient::new(echo_user));

        let result = runner
            .run(&sequence(vec![record("1", "users"), second]))
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.error);
        let requests = runner.client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, "http://api.test/users");
        assert_eq!(requests[1].payload, Some(json!({"id": "123"})));
    }

    #[tokio::test]
    async fn third_step_sees_both_previous_responses() {
        let mut third = record("3", "audit");
        third.payload = Some(json!({
            "user": "$$.user.id",
            "echoed": "$#.echo.note"
        }));
        let mut second = record("2", "notes");
        second.payload = Some(json!({"note": "hello"}));
        let runner = runner(MockClient::new(echo_user));

        let result = runner
            .run(&sequence(vec![record("1", "users"), second, third]))
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.error);
        let requests = runner.client.requests();
        assert_eq!(
            requests[2].payload,
            Some(json!({"user": "123", "echoed": "hello"}))
        );
    }

    #[tokio::test]
    async fn failed_verdict_stops_the_sequence() {
        let mut first = record("1", "users");
        first.expected_outcome = Some(json!({"user": {"id": "999"}}));
        let runner = runner(MockClient::new(echo_user));

        let result = runner
            .run(&sequence(vec![first, record("2", "orders")]))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(runner.client.requests().len(), 1);
        let step = &result.steps[0];
        assert!(!step.success);
        assert!(step.error.as_deref().unwrap().contains(EXPECTED_CHECK));
        assert_eq!(step.checkpoints.len(), 1);
        assert_eq!(step.checkpoints[0].verdict, Verdict::Fail);
        assert!(step.checkpoints[0].detail.as_deref().unwrap().contains("999"));
        assert!(result.error.unwrap().starts_with("Users:"));
    }

    #[tokio::test]
    async fn every_check_runs_after_an_early_failure() {
        let mut first = record("1", "users");
        first.response_schema = Some(json!({
            "type": "object",
            "required": ["missing"]
        }));
        first.expected_outcome = Some(json!({"user": {"name": "alice"}}));
        first.unexpected_outcome = Some(json!({"error": "boom"}));
        first.expected_response_headers = Some(json!({"Content-Type": "application/json"}));
        let runner = runner(MockClient::new(echo_user));

        let result = runner.run(&sequence(vec![first])).await.unwrap();

        assert!(!result.success);
        let verdicts: Vec<(&str, Verdict)> = result.steps[0]
            .checkpoints
            .iter()
            .map(|c| (c.name.as_str(), c.verdict))
            .collect();
        assert_eq!(
            verdicts,
            vec![
                (SCHEMA_CHECK, Verdict::Fail),
                (EXPECTED_CHECK, Verdict::Pass),
                (UNEXPECTED_CHECK, Verdict::Pass),
                (HEADER_CHECK, Verdict::Pass),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_schema_is_recorded_as_failure() {
        let mut first = record("1", "users");
        first.response_schema = Some(json!({"type": 42}));
        let runner = runner(MockClient::new(echo_user));

        let result = runner.run(&sequence(vec![first])).await.unwrap();

        assert!(!result.success);
        let checkpoint = &result.steps[0].checkpoints[0];
        assert_eq!(checkpoint.verdict, Verdict::Fail);
        assert!(checkpoint.detail.as_deref().unwrap().contains("invalid response schema"));
    }

    #[tokio::test]
    async fn transport_failure_terminates_sequence() {
        let runner = runner(MockClient::new(|request| {
            Err(TransportError::Request {
                url: request.url.clone(),
                reason: "connection refused".to_string(),
            })
        }));

        let result = runner
            .run(&sequence(vec![record("1", "users"), record("2", "orders")]))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.steps.len(), 1);
        assert!(result.steps[0].response.is_none());
        assert!(result.steps[0]
            .error
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn credentials_and_base_url_come_from_first_step() {
        let mut first = record("1", "users");
        first.credentials = Some(
            json!({"Authorization": "Bearer abc", "X-Tenant": 5})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let mut second = record("2", "/orders");
        second.credentials = None;
        second.base_url = Some("http://ignored.test".to_string());
        let runner = runner(MockClient::new(echo_user));

        let result = runner.run(&sequence(vec![first, second])).await.unwrap();

        assert!(result.success, "{:?}", result.error);
        let requests = runner.client.requests();
        assert_eq!(requests[1].url, "http://api.test/orders");
        assert_eq!(
            requests[1].headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
        assert_eq!(requests[1].headers.get("X-Tenant").map(String::as_str), Some("5"));
        assert_eq!(
            result.steps[0].request.headers.get("Authorization").map(String::as_str),
            Some("***")
        );
    }

    #[tokio::test]
    async fn default_headers_without_credentials() {
        let runner = runner(MockClient::new(echo_user));
        runner.run(&sequence(vec![record("1", "users")])).await.unwrap();
        assert_eq!(
            runner.client.requests()[0]
                .headers
                .get("Content-Type")
                .map(String::as_str),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn out_of_range_delay_fails_the_step() {
        let mut first = record("1", "users");
        first.delay_before_test_sec = Some(1e20);
        let runner = runner(MockClient::new(echo_user));

        let result = runner
            .run(&sequence(vec![first, record("2", "orders")]))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.steps.len(), 1);
        assert!(result.steps[0]
            .error
            .as_deref()
            .unwrap()
            .contains("delay_before_test_sec"));
        assert!(runner.client.requests().is_empty());
    }

    #[tokio::test]
    async fn base_url_falls_back_to_run_config() {
        let config = RunConfig {
            base_url: Some("http://fallback.test".to_string()),
            ..RunConfig::default()
        };
        let runner = DefaultSequenceRunner::with_client(
            MockClient::new(echo_user),
            config,
            ConfigTable::new(),
        );
        let seq = Sequence {
            steps: vec![record("1", "users")],
            skipped: Vec::new(),
        };

        let result = runner.run(&seq).await.unwrap();

        assert!(result.success);
        assert_eq!(runner.client.requests()[0].url, "http://fallback.test/users");
    }

    #[tokio::test]
    async fn missing_base_url_fails_before_sending() {
        let runner = runner(MockClient::new(echo_user));
        let seq = Sequence {
            steps: vec![record("1", "users")],
            skipped: Vec::new(),
        };

        let result = runner.run(&seq).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("base_url"));
        assert!(runner.client.requests().is_empty());
    }

    #[tokio::test]
    async fn config_placeholders_are_bound() {
        let mut config_table = ConfigTable::new();
        config_table.insert("tenant", json!("int[7]"));
        let mut first = record("1", "orders");
        first.payload = Some(json!({"tenant": "##tenant"}));
        let runner = DefaultSequenceRunner::with_client(
            MockClient::new(echo_user),
            RunConfig::default(),
            config_table,
        );

        runner.run(&sequence(vec![first])).await.unwrap();

        assert_eq!(
            runner.client.requests()[0].payload,
            Some(json!({"tenant": 7}))
        );
    }

    #[tokio::test]
    async fn attachment_resolves_against_attachment_dir() {
        let mut first = record("1", "upload");
        first.attachment_name = Some("doc.pdf".to_string());
        let config = RunConfig {
            attachment_dir: "fixtures/files".into(),
            ..RunConfig::default()
        };
        let runner = DefaultSequenceRunner::with_client(
            MockClient::new(echo_user),
            config,
            ConfigTable::new(),
        );

        runner.run(&sequence(vec![first])).await.unwrap();

        assert_eq!(
            runner.client.requests()[0].attachment,
            Some(std::path::PathBuf::from("fixtures/files/doc.pdf"))
        );
    }

    #[tokio::test]
    async fn fully_skipped_sequence_passes_without_requests() {
        let runner = runner(MockClient::new(echo_user));
        let seq = Sequence {
            steps: Vec::new(),
            skipped: vec!["4".into()],
        };

        let result = runner.run(&seq).await.unwrap();

        assert!(result.success);
        assert!(result.steps.is_empty());
        assert_eq!(result.skipped, vec![TestNumber::from("4")]);
        assert!(runner.client.requests().is_empty());
    }

    #[tokio::test]
    async fn run_all_keeps_order_and_isolates_failures() {
        let config = RunConfig {
            jobs: 2,
            ..RunConfig::default()
        };
        let runner = Arc::new(DefaultSequenceRunner::with_client(
            MockClient::new(echo_user),
            config,
            ConfigTable::new(),
        ));

        let mut failing = record("2", "users");
        failing.group_name = "Broken".to_string();
        failing.expected_outcome = Some(json!({"user": {"id": "nope"}}));
        let mut passing = record("3", "users");
        passing.group_name = "Healthy".to_string();

        let results = Arc::clone(&runner)
            .run_all(vec![
                sequence(vec![record("1", "users")]),
                sequence(vec![failing]),
                sequence(vec![passing]),
            ])
            .await;

        let summary: Vec<(&str, bool)> = results
            .iter()
            .map(|r| (r.group_name.as_str(), r.success))
            .collect();
        assert_eq!(
            summary,
            vec![("Users", true), ("Broken", false), ("Healthy", true)]
        );
        assert_eq!(runner.client.requests().len(), 3);
    }

    #[test]
    fn join_url_normalises_slashes() {
        assert_eq!(join_url("http://a.test/", "/users"), "http://a.test/users");
        assert_eq!(join_url("http://a.test", "users/1"), "http://a.test/users/1");
        assert_eq!(join_url("http://a.test/", ""), "http://a.test");
    }

    #[test]
    fn mask_headers_hides_secrets() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer x".to_string());
        headers.insert("X-Api-Key".to_string(), "k".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        let masked = mask_headers(&headers);
        assert_eq!(masked["Authorization"], "***");
        assert_eq!(masked["X-Api-Key"], "***");
        assert_eq!(masked["Accept"], "application/json");
    }
}
