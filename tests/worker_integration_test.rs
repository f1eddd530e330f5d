#![cfg(unix)]

use chrono::NaiveDate;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use wqi_forecast::assembler::FeatureRecord;
use wqi_forecast::db::models::Substrate;
use wqi_forecast::error::AppError;
use wqi_forecast::features::Season;
use wqi_forecast::forecast::ForecastGateway;
use wqi_forecast::notifier::{Notifier, FORECAST_READY, SUMMARY_READY, TRAINING_COMPLETED};
use wqi_forecast::summary::{ForecastPoint, SummaryGateway};
use wqi_forecast::timestamp::TimestampStore;
use wqi_forecast::training::TrainingGateway;
use wqi_forecast::worker::WorkerCommand;

const LIMIT: Duration = Duration::from_secs(20);

/// Write `body` as a shell script in `dir` and run it from there
fn script_worker(dir: &TempDir, body: &str) -> WorkerCommand {
    let script = dir.path().join("worker.sh");
    std::fs::write(&script, body).expect("Failed to write worker script");
    WorkerCommand::new("sh")
        .args([script.display().to_string()])
        .working_dir(Some(dir.path().to_path_buf()))
}

fn read_json(path: &Path) -> Value {
    let text = std::fs::read_to_string(path).expect("Worker did not capture its input");
    serde_json::from_str(&text).expect("Worker input is not JSON")
}

fn history() -> Value {
    json!([
        { "tanggal": "2024-06-01T00:00:00.000Z", "ph": 7.9, "suhu": 29.1, "is_future": 0 },
        { "tanggal": "2024-06-02", "ph": null, "suhu": null, "is_future": 1 }
    ])
}

fn feature(day: u32) -> FeatureRecord {
    FeatureRecord {
        date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
        depth: 2.0,
        substrate: Substrate::Mixed,
        ph: Some(7.8),
        temperature: Some(29.0),
        turbidity: Some(9.5),
        salinity: Some(30.5),
        rainfall: 1.2,
        month: "06".to_string(),
        season: Season::Dry,
        ph_fluctuation: 0.0,
    }
}

/// Test that the result block is parsed, the input is normalized, and the event is emitted
#[tokio::test]
async fn test_forecast_parses_result_block() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(
        &dir,
        "cat > input.json\n\
         echo 'loading model...'\n\
         echo '===BEGIN_RESULT==='\n\
         echo '{\"wqi\":82.5}'\n\
         echo '===END_RESULT==='\n\
         echo 'done'\n",
    );
    let notifier = Notifier::new(8);
    let mut events = notifier.subscribe();
    let gateway = ForecastGateway::new(worker, LIMIT, notifier);

    let result = assert_ok!(gateway.invoke(&history()).await);
    assert_eq!(result.into_inner(), json!({ "wqi": 82.5 }));

    let input = read_json(&dir.path().join("input.json"));
    assert_eq!(input[0]["tanggal"], "2024-06-01");
    assert_eq!(input[0]["is_future"], 0);
    assert_eq!(input[1]["tanggal"], "2024-06-02");
    assert!(input[1]["ph"].is_null());

    let event = assert_ok!(events.try_recv());
    assert_eq!(event.name, FORECAST_READY);
    assert_eq!(event.payload, json!({ "wqi": 82.5 }));
}

/// Test that output without markers fails and keeps the raw output
#[tokio::test]
async fn test_forecast_missing_markers() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(&dir, "cat > /dev/null\necho 'model file not found'\n");
    let notifier = Notifier::new(8);
    let mut events = notifier.subscribe();
    let gateway = ForecastGateway::new(worker, LIMIT, notifier);

    match gateway.invoke(&history()).await {
        Err(AppError::MissingResultMarker { raw_output }) => {
            assert!(raw_output.contains("model file not found"));
        }
        other => panic!("Expected MissingResultMarker error, got: {:?}", other),
    }
    assert_err!(events.try_recv());
}

/// Test that a block with invalid JSON is a parse error
#[tokio::test]
async fn test_forecast_invalid_json_block() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(
        &dir,
        "cat > /dev/null\nprintf '===BEGIN_RESULT===not-json===END_RESULT==='\n",
    );
    let gateway = ForecastGateway::new(worker, LIMIT, Notifier::new(8));

    let result = gateway.invoke(&history()).await;
    assert!(matches!(result, Err(AppError::ResultParse { .. })));
}

/// Test that a non-zero exit does not discard a valid result
#[tokio::test]
async fn test_forecast_nonzero_exit_with_result_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(
        &dir,
        "cat > /dev/null\n\
         echo '===BEGIN_RESULT===[71.0, 72.5]===END_RESULT==='\n\
         echo 'warning: cleanup failed' >&2\n\
         exit 1\n",
    );
    let gateway = ForecastGateway::new(worker, LIMIT, Notifier::new(8));

    let result = assert_ok!(gateway.invoke(&history()).await);
    assert_eq!(result.into_inner(), json!([71.0, 72.5]));
}

/// Test that invalid history never reaches the worker
#[tokio::test]
async fn test_forecast_rejects_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(&dir, "touch started\n");
    let gateway = ForecastGateway::new(worker, LIMIT, Notifier::new(8));

    let result = gateway.invoke(&json!([])).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert!(!dir.path().join("started").exists());
}

/// Test that a hung worker is killed at the limit
#[tokio::test]
async fn test_forecast_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(&dir, "cat > /dev/null\nsleep 10\n");
    let gateway = ForecastGateway::new(worker, Duration::from_millis(300), Notifier::new(8));

    let result = gateway.invoke(&history()).await;
    assert!(matches!(result, Err(AppError::Timeout { .. })));
}

/// Test that successful training stores the timestamp and announces it
#[tokio::test]
async fn test_training_success_records_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(&dir, "cat > input.json\necho 'epoch 1/1 loss=0.12'\n");
    let store = TimestampStore::new(dir.path().join("last_model_timestamp.txt"));
    let notifier = Notifier::new(8);
    let mut events = notifier.subscribe();
    let gateway = TrainingGateway::new(worker, LIMIT, store, notifier);

    let outcome = assert_ok!(gateway.train(&[feature(1), feature(2)]).await);
    assert!(outcome.log.contains("epoch 1/1"));

    let stored = assert_ok!(gateway.last_trained_at().await);
    assert_eq!(
        stored.timestamp_millis(),
        outcome.trained_at.timestamp_millis()
    );

    let input = read_json(&dir.path().join("input.json"));
    assert_eq!(input.as_array().unwrap().len(), 2);
    assert_eq!(input[1]["tanggal"], "2024-06-02");
    assert_eq!(input[1]["substrat"], "Campuran");
    assert_eq!(input[1]["fluktuasi_ph"], 0.0);

    let event = assert_ok!(events.try_recv());
    assert_eq!(event.name, TRAINING_COMPLETED);
    assert!(event.payload["timestamp"].is_string());
}

/// Test that a failed training run reports stderr and leaves no timestamp
#[tokio::test]
async fn test_training_failure() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(&dir, "cat > /dev/null\necho 'CUDA out of memory' >&2\nexit 2\n");
    let store = TimestampStore::new(dir.path().join("last_model_timestamp.txt"));
    let gateway = TrainingGateway::new(worker, LIMIT, store, Notifier::new(8));

    match gateway.train(&[feature(1)]).await {
        Err(AppError::WorkerFailed {
            exit_code, stderr, ..
        }) => {
            assert_eq!(exit_code, Some(2));
            assert!(stderr.contains("CUDA out of memory"));
        }
        other => panic!("Expected WorkerFailed error, got: {:?}", other),
    }

    assert!(matches!(
        gateway.last_trained_at().await,
        Err(AppError::NotFound(_))
    ));
}

/// Test that training refuses an empty dataset
#[tokio::test]
async fn test_training_empty_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(&dir, "exit 0\n");
    let store = TimestampStore::new(dir.path().join("last_model_timestamp.txt"));
    let gateway = TrainingGateway::new(worker, LIMIT, store, Notifier::new(8));

    assert!(matches!(gateway.train(&[]).await, Err(AppError::EmptyInput)));
}

fn points() -> Vec<ForecastPoint> {
    serde_json::from_value(json!([
        { "tanggal": "2024-06-03", "wqi": 84.1, "ph": 7.9, "suhu": 29.2, "salinitas": 30.1, "kekeruhan": 8.4 },
        { "tanggal": "2024-06-04", "wqi": 62.7, "ph": 8.6, "suhu": 31.0, "salinitas": 33.9, "kekeruhan": 20.2 }
    ]))
    .unwrap()
}

/// Test that the summary is the trimmed worker output and is announced
#[tokio::test]
async fn test_summary_returns_trimmed_output() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(&dir, "cat > prompt.txt\necho '  Kualitas air cukup baik.  '\n");
    let notifier = Notifier::new(8);
    let mut events = notifier.subscribe();
    let gateway = SummaryGateway::new(worker, LIMIT, notifier);

    let summary = assert_ok!(gateway.summarize(&points()).await);
    assert_eq!(summary.kesimpulan, "Kualitas air cukup baik.");

    let prompt = std::fs::read_to_string(dir.path().join("prompt.txt")).unwrap();
    assert!(prompt.contains("- 2024-06-04: WQI 62.7"));

    let event = assert_ok!(events.try_recv());
    assert_eq!(event.name, SUMMARY_READY);
    assert_eq!(event.payload, json!({ "kesimpulan": "Kualitas air cukup baik." }));
}

/// Test that a crashed summary worker with no output is an error
#[tokio::test]
async fn test_summary_worker_failure() {
    let dir = tempfile::tempdir().unwrap();
    let worker = script_worker(&dir, "cat > /dev/null\necho 'model not pulled' >&2\nexit 1\n");
    let gateway = SummaryGateway::new(worker, LIMIT, Notifier::new(8));

    let result = gateway.summarize(&points()).await;
    assert!(matches!(result, Err(AppError::WorkerFailed { .. })));
}
