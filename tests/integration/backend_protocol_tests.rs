/*!
 * Integration tests for the remote processing service client
 */

use parking_lot::Mutex;
use serde_json::json;
use std::time::Duration;

use subflux::app_config::BackendConfig;
use subflux::backend::{BackendClient, ProcessMode};
use subflux::errors::BackendError;
use subflux::progress::{BatchInfo, ProgressEvent};
use subflux::subtitle_processor::TranslatedSubtitle;
use tokio_util::sync::CancellationToken;

use crate::common::{self, sse_frame, Reply, ScriptedTransport};

const JOB_URL: &str = "https://api.runpod.ai/v2/endpoint123";

fn config(url: &str, api_key: &str) -> BackendConfig {
    BackendConfig {
        url: url.to_string(),
        api_key: api_key.to_string(),
        poll_interval_ms: 10,
        ..BackendConfig::default()
    }
}

fn subtitle_json(start: f64, text: &str, translated: &str) -> serde_json::Value {
    json!({"start": start, "end": start + 1.0, "text": text, "translatedText": translated})
}

#[tokio::test(start_paused = true)]
async fn test_job_statusSequence_shouldPollUntilCompleted() {
    common::init_logging();
    let transport = ScriptedTransport::new(vec![
        Reply::Json(json!({"id": "job-1", "status": "IN_QUEUE"})),
        Reply::Json(json!({"status": "IN_QUEUE"})),
        Reply::Json(json!({"status": "IN_PROGRESS"})),
        Reply::Json(json!({
            "status": "COMPLETED",
            "output": {"subtitles": [subtitle_json(0.0, "Hello", "Bonjour")]}
        })),
    ]);
    let client = BackendClient::new(transport.clone(), config(JOB_URL, "secret"));
    let events = Mutex::new(Vec::<ProgressEvent>::new());
    let on_progress = |event: ProgressEvent| events.lock().push(event);

    let result = client
        .process("vid1", "fr", ProcessMode::Single, Some(&on_progress), None)
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].translated_text, "Bonjour");

    let calls = transport.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0].method, "POST");
    assert_eq!(calls[0].url, format!("{}/run", JOB_URL));
    assert_eq!(
        calls[0].body,
        Some(json!({"input": {"video_id": "vid1", "target_lang": "fr", "force_whisper": false}}))
    );
    assert!(calls.iter().all(|c| c.bearer.as_deref() == Some("secret")));
    assert!(calls[1..].iter().all(|c| c.method == "GET" && c.url == format!("{}/status/job-1", JOB_URL)));

    let percents: Vec<f64> = events.lock().iter().filter_map(|e| e.percent).collect();
    assert!(percents.contains(&5.0));
    assert!(percents.contains(&50.0));
    assert_eq!(percents.last(), Some(&100.0));
}

#[tokio::test(start_paused = true)]
async fn test_job_failed_shouldSurfaceRemoteErrorVerbatim() {
    let transport = ScriptedTransport::new(vec![
        Reply::Json(json!({"id": "job-2"})),
        Reply::Json(json!({"status": "FAILED", "error": "oom"})),
    ]);
    let client = BackendClient::new(transport, config(JOB_URL, "secret"));

    let err = client.process("vid1", "fr", ProcessMode::Single, None, None).await.unwrap_err();
    assert!(matches!(err, BackendError::Remote(ref m) if m == "oom"));
    assert!(err.to_string().contains("oom"));
}

#[tokio::test(start_paused = true)]
async fn test_job_cancelled_shouldFailWithJobId() {
    let transport = ScriptedTransport::new(vec![
        Reply::Json(json!({"id": "job-3"})),
        Reply::Json(json!({"status": "CANCELLED"})),
    ]);
    let client = BackendClient::new(transport, config(JOB_URL, "secret"));

    let err = client.process("vid1", "fr", ProcessMode::Single, None, None).await.unwrap_err();
    assert!(err.to_string().contains("job-3"));
}

#[tokio::test]
async fn test_job_withoutApiKey_shouldFailBeforeAnyRequest() {
    let transport = ScriptedTransport::new(Vec::new());
    let client = BackendClient::new(transport.clone(), config(JOB_URL, ""));

    let err = client.process("vid1", "fr", ProcessMode::Single, None, None).await.unwrap_err();
    assert!(matches!(err, BackendError::Configuration(_)));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_job_neverCompleting_shouldTimeOut() {
    let replies = std::iter::once(Reply::Json(json!({"id": "job-4"})))
        .chain((0..1000).map(|_| Reply::Json(json!({"status": "IN_PROGRESS"}))))
        .collect();
    let transport = ScriptedTransport::new(replies);
    let mut backend = config(JOB_URL, "secret");
    backend.job_timeout_secs = 1;
    backend.poll_interval_ms = 100;
    let client = BackendClient::new(transport, backend);

    let err = client.process("vid1", "fr", ProcessMode::Single, None, None).await.unwrap_err();
    assert!(matches!(err, BackendError::Timeout(1)));
}

#[tokio::test(start_paused = true)]
async fn test_job_cancelledToken_shouldStopPolling() {
    let replies = std::iter::once(Reply::Json(json!({"id": "job-5"})))
        .chain((0..1000).map(|_| Reply::Json(json!({"status": "IN_QUEUE"}))))
        .collect();
    let transport = ScriptedTransport::new(replies);
    let client = BackendClient::new(transport.clone(), config(JOB_URL, "secret"));
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(55)).await;
            token.cancel();
        })
    };

    let err = client
        .process_with_token("vid1", "fr", ProcessMode::Single, None, None, token)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, BackendError::Cancelled));
    assert!(transport.call_count() < 10);
}

#[tokio::test]
async fn test_syncJson_shouldPostOnceAndStripProcessSuffix() {
    let transport = ScriptedTransport::new(vec![Reply::Json(json!({
        "subtitles": [{"start": 0.0, "end": 1.0, "text": "Hola"}]
    }))]);
    let client = BackendClient::new(transport.clone(), config("https://abc123.api.runpod.ai/process", "key"));

    let result = client.process("vid9", "es", ProcessMode::Single, None, None).await.unwrap();

    // a missing translation falls back to the source text
    assert_eq!(result[0].translated_text, "Hola");
    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, "https://abc123.api.runpod.ai/process");
    assert_eq!(
        calls[0].body,
        Some(json!({"videoId": "vid9", "targetLanguage": "es", "forceWhisper": false}))
    );
}

#[tokio::test]
async fn test_syncJson_errorBody_shouldBeRemoteError() {
    let transport = ScriptedTransport::new(vec![Reply::Json(json!({"error": "video unavailable"}))]);
    let client = BackendClient::new(transport, config("https://abc123.api.runpod.ai", ""));

    let err = client.process("vid9", "es", ProcessMode::Single, None, None).await.unwrap_err();
    assert_eq!(err.to_string(), "video unavailable");
}

#[tokio::test]
async fn test_eventStream_shouldDeliverPartialsThenFinalResult() {
    let first = json!({"stage": "subtitles", "subtitles": [subtitle_json(0.0, "One", "Eins")], "batchInfo": {"current": 1, "total": 2}});
    let second = json!({"stage": "subtitles", "subtitles": [subtitle_json(1.0, "Two", "Zwei")], "batchInfo": {"current": 2, "total": 2}});
    let result = json!({"result": {"subtitles": [subtitle_json(0.0, "One", "Eins"), subtitle_json(1.0, "Two", "Zwei")]}});
    let stream = format!(
        "{}{}{}{}",
        sse_frame(&json!({"stage": "transcribing", "message": "Listening", "percent": 20.0})),
        sse_frame(&first),
        sse_frame(&second),
        sse_frame(&result)
    );
    // split at awkward places, including inside the JSON
    let chunks: Vec<String> = stream
        .as_bytes()
        .chunks(7)
        .map(|c| String::from_utf8(c.to_vec()).unwrap())
        .collect();
    let transport = ScriptedTransport::new(vec![Reply::Stream(chunks)]);
    let client = BackendClient::new(transport.clone(), config("https://svc.example.com/stream", ""));

    let partials = Mutex::new(Vec::<(usize, Option<BatchInfo>)>::new());
    let on_partial = |subtitles: &[TranslatedSubtitle], info: Option<BatchInfo>| {
        partials.lock().push((subtitles.len(), info));
    };
    let stages = Mutex::new(Vec::<String>::new());
    let on_progress = |event: ProgressEvent| stages.lock().push(event.stage);

    let translated = client
        .process("vid1", "de", ProcessMode::Streaming, Some(&on_progress), Some(&on_partial))
        .await
        .unwrap();

    assert_eq!(translated.len(), 2);
    assert_eq!(translated[1].translated_text, "Zwei");
    assert_eq!(
        *partials.lock(),
        vec![
            (1, Some(BatchInfo { current: 1, total: 2 })),
            (2, Some(BatchInfo { current: 2, total: 2 })),
        ]
    );
    assert_eq!(*stages.lock(), vec!["transcribing".to_string()]);
    assert_eq!(transport.calls()[0].url, "https://svc.example.com/stream");
}

#[tokio::test]
async fn test_eventStream_singleMode_shouldUseProcessEndpoint() {
    let result = json!({"result": {"subtitles": [subtitle_json(0.0, "One", "Un")]}});
    let transport = ScriptedTransport::new(vec![Reply::Stream(vec![sse_frame(&result)])]);
    let client = BackendClient::new(transport.clone(), config("https://svc.example.com/", "token"));

    client.process("vid1", "fr", ProcessMode::Single, None, None).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls[0].url, "https://svc.example.com/process");
    assert_eq!(calls[0].bearer.as_deref(), Some("token"));
}

#[tokio::test]
async fn test_eventStream_errorFrame_shouldAbortWithMessage() {
    let frames = format!(
        "{}{}{}",
        sse_frame(&json!({"stage": "downloading", "message": "Fetching audio"})),
        sse_frame(&json!({"error": "Video is private"})),
        sse_frame(&json!({"result": {"subtitles": []}}))
    );
    let transport = ScriptedTransport::new(vec![Reply::Stream(vec![frames])]);
    let client = BackendClient::new(transport, config("https://svc.example.com", ""));

    let err = client.process("vid1", "fr", ProcessMode::Streaming, None, None).await.unwrap_err();
    assert!(matches!(err, BackendError::Remote(ref m) if m == "Video is private"));
}

#[tokio::test]
async fn test_eventStream_malformedFrame_shouldBeSkipped() {
    let frames = vec![
        "data: {not json\n\n".to_string(),
        ": keep-alive comment\n\n".to_string(),
        sse_frame(&json!({"result": {"subtitles": [subtitle_json(0.0, "One", "Uno")]}})),
    ];
    let transport = ScriptedTransport::new(vec![Reply::Stream(frames)]);
    let client = BackendClient::new(transport, config("https://svc.example.com", ""));

    let result = client.process("vid1", "it", ProcessMode::Streaming, None, None).await.unwrap();
    assert_eq!(result[0].translated_text, "Uno");
}

#[tokio::test]
async fn test_eventStream_endingWithoutResult_shouldUsePartials() {
    let partial = json!({"stage": "subtitles", "subtitles": [subtitle_json(0.0, "One", "Uno")]});
    let transport = ScriptedTransport::new(vec![Reply::Stream(vec![sse_frame(&partial)])]);
    let client = BackendClient::new(transport, config("https://svc.example.com", ""));

    let result = client.process("vid1", "it", ProcessMode::Streaming, None, None).await.unwrap();
    assert_eq!(result.len(), 1);

    let transport = ScriptedTransport::new(vec![Reply::Stream(Vec::new())]);
    let client = BackendClient::new(transport, config("https://svc.example.com", ""));
    let err = client.process("vid1", "it", ProcessMode::Streaming, None, None).await.unwrap_err();
    assert!(matches!(err, BackendError::Protocol(_)));
}

#[tokio::test]
async fn test_eventStream_httpFailure_shouldPropagate() {
    let transport = ScriptedTransport::new(vec![Reply::Fail(BackendError::Http {
        status_code: 502,
        message: "bad gateway".to_string(),
    })]);
    let client = BackendClient::new(transport, config("https://svc.example.com", ""));

    let err = client.process("vid1", "it", ProcessMode::Streaming, None, None).await.unwrap_err();
    assert!(matches!(err, BackendError::Http { status_code: 502, .. }));
}
