use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_api::client::StreamEnd;
use chat_api::{decode_stream, ChatApiError, CollectingHandler, StreamHandler};
use futures_util::stream::{self, StreamExt};

fn record(content: &str) -> String {
    format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n")
}

fn ok_chunks(chunks: Vec<String>) -> Vec<Result<Vec<u8>, ChatApiError>> {
    chunks
        .into_iter()
        .map(|chunk| Ok(chunk.into_bytes()))
        .collect()
}

#[derive(Default)]
struct OrderedHandler {
    calls: Vec<String>,
}

impl StreamHandler for OrderedHandler {
    fn on_delta(&mut self, fragment: &str) {
        self.calls.push(format!("delta:{fragment}"));
    }

    fn on_done(&mut self) {
        self.calls.push("done".to_string());
    }

    fn on_error(&mut self, message: &str) {
        self.calls.push(format!("error:{message}"));
    }
}

#[tokio::test]
async fn stream_contract_reports_deltas_then_done_on_terminal_marker() {
    let chunks = ok_chunks(vec![
        record("Hel"),
        format!("{}data: [DONE]\n", record("lo")),
        record("ignored"),
    ]);

    let mut handler = OrderedHandler::default();
    let end = decode_stream(stream::iter(chunks), None, &mut handler)
        .await
        .expect("stream should end cleanly");

    assert_eq!(end, StreamEnd::Terminal);
    assert_eq!(handler.calls, vec!["delta:Hel", "delta:lo", "done"]);
}

#[tokio::test]
async fn stream_contract_flushes_on_transport_close_without_marker() {
    let payload = record("tail");
    let chunks = ok_chunks(vec![
        record("head"),
        payload.trim_end().to_string(),
    ]);

    let mut handler = CollectingHandler::default();
    let end = decode_stream(stream::iter(chunks), None, &mut handler)
        .await
        .expect("stream should end cleanly");

    assert_eq!(end, StreamEnd::Closed);
    assert_eq!(handler.text(), "headtail");
    assert!(handler.errors.is_empty());
    assert_eq!(handler.done_count, 1);
}

#[tokio::test]
async fn stream_contract_transport_failure_after_two_fragments() {
    let mut chunks = ok_chunks(vec![record("one"), record("two")]);
    chunks.push(Err(ChatApiError::InvalidHeader("connection reset".to_string())));
    chunks.extend(ok_chunks(vec![record("never")]));

    let mut handler = OrderedHandler::default();
    let error = decode_stream(stream::iter(chunks), None, &mut handler)
        .await
        .expect_err("transport failure should surface");

    assert!(matches!(error, ChatApiError::InvalidHeader(_)));
    assert_eq!(
        handler.calls,
        vec![
            "delta:one",
            "delta:two",
            "error:invalid header: connection reset",
            "done",
        ]
    );
}

#[tokio::test]
async fn stream_contract_empty_stream_only_signals_done() {
    let mut handler = CollectingHandler::default();
    let end = decode_stream(stream::iter(ok_chunks(Vec::new())), None, &mut handler)
        .await
        .expect("empty stream is not an error");

    assert_eq!(end, StreamEnd::Closed);
    assert_eq!(handler, CollectingHandler {
        done_count: 1,
        ..CollectingHandler::default()
    });
}

#[tokio::test]
async fn stream_contract_cancellation_flushes_then_reports_error_and_done() {
    let cancellation = Arc::new(AtomicBool::new(false));
    let partial = record("partial");
    let first = vec![Ok::<_, ChatApiError>(partial.trim_end().as_bytes().to_vec())];
    let stalled = stream::iter(first).chain(stream::pending());

    let trigger = Arc::clone(&cancellation);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        trigger.store(true, Ordering::Release);
    });

    let mut handler = OrderedHandler::default();
    let error = tokio::time::timeout(
        Duration::from_secs(5),
        decode_stream(stalled, Some(&cancellation), &mut handler),
    )
    .await
    .expect("cancellation should unblock the stream")
    .expect_err("cancellation is reported as an error");

    assert!(error.is_cancelled());
    assert_eq!(
        handler.calls,
        vec!["delta:partial", "error:request was cancelled", "done"]
    );
}

#[tokio::test]
async fn stream_contract_pre_cancelled_signal_never_reads() {
    let cancellation = Arc::new(AtomicBool::new(true));
    let chunks = ok_chunks(vec![record("unread")]);

    let mut handler = CollectingHandler::default();
    let error = decode_stream(stream::iter(chunks), Some(&cancellation), &mut handler)
        .await
        .expect_err("cancelled before first read");

    assert!(error.is_cancelled());
    assert!(handler.fragments.is_empty());
    assert_eq!(handler.errors, vec!["request was cancelled".to_string()]);
    assert_eq!(handler.done_count, 1);
}
