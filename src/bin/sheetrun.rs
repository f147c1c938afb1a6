//! sheetrun CLI - runs spreadsheet-driven API test sequences.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use sheetrun::{
    prepare_workbook, DefaultSequenceRunner, RunConfig, Sequence, SequenceResult,
    TestDataManager, TestRunReport, Workbook,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// sheetrun - spreadsheet-driven API test sequence runner.
#[derive(Parser, Debug)]
#[command(name = "sheetrun", version, about)]
struct Cli {
    /// Workbook file or directory path.
    #[arg(short = 'p', long = "path", env = "SHEETRUN_TESTDATA_FILE")]
    test_path: Option<String>,

    /// Filter sequences by group name (partial match).
    #[arg(short = 'f', long = "filter")]
    test_filter: Option<String>,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Timeout in seconds per request.
    #[arg(short = 't', long = "timeout", env = "SHEETRUN_TIMEOUT")]
    timeout: Option<u64>,

    /// Base URL used when the first step of a sequence has none.
    #[arg(short = 'b', long = "base-url", env = "SHEETRUN_BASE_URL")]
    base_url: Option<String>,

    /// Directory holding upload attachments.
    #[arg(long = "attachment-dir", env = "SHEETRUN_ATTACHMENT_DIR")]
    attachment_dir: Option<PathBuf>,

    /// Number of sequences run concurrently.
    #[arg(short = 'j', long = "jobs", env = "SHEETRUN_JOBS")]
    jobs: Option<usize>,

    /// Directory to save the run report.
    #[arg(short = 'r', long = "report-dir")]
    report_dir: Option<String>,

    /// Report output format.
    #[arg(long = "report-format", default_value = "json")]
    report_format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ReportFormat {
    Json,
    Yaml,
    Text,
}

fn init_tracing(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }

    if tracing::dispatcher::has_been_set() {
        return;
    }

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

fn print_sequence_result(result: &SequenceResult, verbose: bool) {
    let status = if result.success {
        "\x1b[32mPASS\x1b[0m"
    } else {
        "\x1b[31mFAIL\x1b[0m"
    };
    info!(
        "{} sequence: {} ({} ms)",
        status, result.group_name, result.duration_ms
    );

    for (i, step) in result.steps.iter().enumerate() {
        let step_status = if step.success {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        info!(
            "  {}. {} [{}] {} ({} ms)",
            i + 1,
            step_status,
            step.test_number,
            step.name,
            step.duration_ms
        );

        if let Some(error) = &step.error {
            error!("     \x1b[31mError: {}\x1b[0m", error);
        }
        for checkpoint in &step.checkpoints {
            if let Some(detail) = &checkpoint.detail {
                error!("     {}: {}", checkpoint.name, detail);
            }
        }

        if verbose {
            debug!("     Request: {} {}", step.request.method, step.request.url);
            if let Some(body) = &step.request.body {
                debug!("     Request body: {}", truncate(&body.to_string()));
            }
            if let Some(response) = &step.response {
                debug!("     Response: Status {}", response.status);
                debug!("     Response body: {}", truncate(&response.body.to_string()));
            }
        }
    }

    if !result.skipped.is_empty() {
        info!(
            "  skipped: {}",
            result
                .skipped
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(500) {
        Some((idx, _)) => format!("{}...(truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

fn save_report(
    report: &TestRunReport,
    report_dir: &Path,
    format: ReportFormat,
) -> Result<PathBuf> {
    if !report_dir.exists() {
        fs::create_dir_all(report_dir)?;
    }

    let timestamp = Utc::now().timestamp();

    let (filename, content) = match format {
        ReportFormat::Json => (
            format!("sheetrun-{timestamp}.json"),
            serde_json::to_string_pretty(report)?,
        ),
        ReportFormat::Yaml => (
            format!("sheetrun-{timestamp}.yaml"),
            serde_yaml::to_string(report)?,
        ),
        ReportFormat::Text => {
            let mut content = String::new();
            content.push_str(&format!("Run at: {}\n", report.timestamp));
            content.push_str(&format!(
                "Passed: {}  Failed: {}  Duration: {} ms\n\n",
                report.passed, report.failed, report.total_duration_ms
            ));
            for result in &report.sequences {
                content.push_str(&format!(
                    "Sequence: {} ({})\n",
                    result.group_name,
                    if result.success { "PASS" } else { "FAIL" }
                ));
                if let Some(error) = &result.error {
                    content.push_str(&format!("Error: {error}\n"));
                }
                for (i, step) in result.steps.iter().enumerate() {
                    content.push_str(&format!(
                        "  {}. [{}] {} ({})\n",
                        i + 1,
                        step.test_number,
                        step.name,
                        if step.success { "PASS" } else { "FAIL" }
                    ));
                    for checkpoint in &step.checkpoints {
                        content.push_str(&format!(
                            "     {:?} {}\n",
                            checkpoint.verdict, checkpoint.name
                        ));
                    }
                    if let Some(error) = &step.error {
                        content.push_str(&format!("     Error: {error}\n"));
                    }
                    content.push_str(&format!("     Duration: {} ms\n", step.duration_ms));
                }
                content.push('\n');
            }
            (format!("sheetrun-{timestamp}.txt"), content)
        }
    };

    let file_path = report_dir.join(filename);
    let mut file = File::create(&file_path)?;
    file.write_all(content.as_bytes())?;

    Ok(file_path)
}

fn load_workbooks(test_path: Option<String>) -> Result<Vec<(PathBuf, Workbook)>> {
    let mut manager = TestDataManager::new();
    for path in ["tests/test_data", "testcase/test_data"] {
        if Path::new(path).exists() {
            manager.add_path(path);
        }
    }

    let workbooks = match test_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(anyhow!("Path does not exist: {}", path.display()));
            }
            manager
                .load_path(&path)
                .context(format!("Failed to load test data: {}", path.display()))?
        }
        None => manager.load_all()?,
    };

    if workbooks.is_empty() {
        return Err(anyhow!("No test data workbooks found"));
    }
    Ok(workbooks)
}

fn run_config(args: &Cli) -> RunConfig {
    let mut config = RunConfig::default();
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(dir) = &args.attachment_dir {
        config.attachment_dir = dir.clone();
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs.max(1);
    }
    config
}

fn filter_sequences(sequences: Vec<Sequence>, filter: Option<&str>) -> Vec<Sequence> {
    match filter {
        Some(filter) => {
            let filter = filter.to_lowercase();
            sequences
                .into_iter()
                .filter(|s| s.group_name().to_lowercase().contains(&filter))
                .collect()
        }
        None => sequences,
    }
}

async fn run_all_workbooks(
    workbooks: Vec<(PathBuf, Workbook)>,
    config: RunConfig,
    test_filter: Option<&str>,
    verbose: bool,
) -> Result<Vec<SequenceResult>> {
    let mut results = Vec::new();
    let mut matched = 0;

    for (path, workbook) in workbooks {
        let (sequences, config_table) = prepare_workbook(workbook)
            .context(format!("Invalid test data in {}", path.display()))?;
        let sequences = filter_sequences(sequences, test_filter);
        if sequences.is_empty() {
            debug!("No matching sequences in {}", path.display());
            continue;
        }
        matched += sequences.len();

        info!(
            "Running {} sequence(s) from {}",
            sequences.len(),
            path.display()
        );
        let runner = Arc::new(DefaultSequenceRunner::new(config.clone(), config_table));
        for result in runner.run_all(sequences).await {
            print_sequence_result(&result, verbose);
            results.push(result);
        }
    }

    if matched == 0 {
        return Err(anyhow!("No sequences matching the filter were found"));
    }
    Ok(results)
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("failed to load .env: {e}");
        }
    }

    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = run_config(&args);
    let workbooks = load_workbooks(args.test_path.clone())?;

    let total_start = Instant::now();
    let results = run_all_workbooks(
        workbooks,
        config,
        args.test_filter.as_deref(),
        args.verbose,
    )
    .await?;

    let passed = results.iter().filter(|r| r.success).count();
    let failed = results.len() - passed;
    let report = TestRunReport {
        sequences: results,
        passed,
        failed,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        timestamp: Utc::now().to_rfc3339(),
    };

    info!(
        "Summary:\n  Total: {}\n  \x1b[32mPassed: {}\x1b[0m\n  \x1b[31mFailed: {}\x1b[0m\n  Duration: {} ms",
        passed + failed,
        passed,
        failed,
        report.total_duration_ms
    );

    if let Some(dir) = args.report_dir.as_deref().map(Path::new) {
        match save_report(&report, dir, args.report_format) {
            Ok(path) => info!("Report saved: {}", path.display()),
            Err(e) => warn!("Failed to save report: {}", e),
        }
    }

    if failed > 0 {
        exit(1);
    }

    Ok(())
}
