//! Relays one interview turn from the chat provider to the browser as SSE.
//!
//! The HTTP body is fed by a bounded channel: a slow browser applies
//! backpressure to the upstream pull, and a browser that goes away closes the
//! channel, which stops the relay and drops the upstream stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::Response,
};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::llm_client::{ChatProvider, ChatRequest, FragmentStream, LlmError};
use crate::relay::framer::{self, StreamEvent};

const CHANNEL_CAPACITY: usize = 32;

/// Per-turn settings chosen by the endpoint.
#[derive(Debug, Clone, Copy)]
pub struct TurnOptions {
    pub kind: &'static str,
    /// Shown to the browser in the single `error` event.
    pub error_message: &'static str,
    pub idle_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { forwarded: usize },
    Failed { forwarded: usize },
    ClientDisconnected { forwarded: usize },
}

/// Write half of a turn. Emits at most one terminal event and nothing after it.
pub struct TurnSink {
    tx: Option<mpsc::Sender<Bytes>>,
    completed: bool,
}

/// Creates a sink and the byte stream that becomes the response body.
pub fn turn_channel() -> (TurnSink, ReceiverStream<Bytes>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        TurnSink {
            tx: Some(tx),
            completed: false,
        },
        ReceiverStream::new(rx),
    )
}

impl TurnSink {
    /// True while the browser is still reading and no terminal event was sent.
    pub fn is_open(&self) -> bool {
        !self.completed && self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Resolves once the browser side has gone away.
    pub async fn closed(&self) {
        if let Some(tx) = &self.tx {
            tx.closed().await;
        }
    }

    pub async fn send_content(&mut self, text: &str) -> bool {
        self.write(&StreamEvent::content(text)).await
    }

    /// Writes the end-of-turn marker. A no-op after any terminal write.
    pub async fn finish(&mut self) -> bool {
        self.terminate(&StreamEvent::last()).await
    }

    /// Writes the single error event. A no-op after any terminal write.
    pub async fn fail(&mut self, message: &str) -> bool {
        self.terminate(&StreamEvent::error(message)).await
    }

    async fn terminate(&mut self, event: &StreamEvent) -> bool {
        debug_assert!(event.is_terminal());
        let written = self.write(event).await;
        self.completed = true;
        written
    }

    /// Ends the response body. Safe to call repeatedly.
    pub fn end(&mut self) {
        self.completed = true;
        self.tx.take();
    }

    async fn write(&mut self, event: &StreamEvent) -> bool {
        if !self.is_open() {
            return false;
        }
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        let frame = match framer::encode(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode stream event: {e}");
                return false;
            }
        };
        if tx.send(frame).await.is_err() {
            debug!("Client disconnected mid-turn");
            self.completed = true;
            return false;
        }
        true
    }
}

/// Pulls fragments and forwards them until the provider finishes, fails,
/// or the browser disconnects. Always ends the sink.
pub async fn relay_fragments(
    mut fragments: FragmentStream,
    mut sink: TurnSink,
    options: TurnOptions,
) -> TurnOutcome {
    let mut forwarded = 0;

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = sink.closed() => None,
            next = next_fragment(&mut fragments, options.idle_timeout) => Some(next),
        };

        match next {
            None => break TurnOutcome::ClientDisconnected { forwarded },
            Some(Ok(Some(text))) => {
                if !sink.send_content(&text).await {
                    break TurnOutcome::ClientDisconnected { forwarded };
                }
                forwarded += 1;
            }
            Some(Ok(None)) => {
                sink.finish().await;
                break TurnOutcome::Completed { forwarded };
            }
            Some(Err(e)) => {
                error!("Chat stream failed after {forwarded} fragments: {e}");
                sink.fail(options.error_message).await;
                break TurnOutcome::Failed { forwarded };
            }
        }
    };

    sink.end();
    outcome
}

async fn next_fragment(
    fragments: &mut FragmentStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<String>, LlmError> {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, fragments.next()).await {
            Ok(next) => next.transpose(),
            Err(_) => Err(LlmError::IdleTimeout(limit)),
        },
        None => fragments.next().await.transpose(),
    }
}

/// Opens the upstream stream and relays it. The handshake is abandoned if the
/// browser leaves before it completes.
pub async fn run_turn(
    provider: Arc<dyn ChatProvider>,
    request: ChatRequest,
    mut sink: TurnSink,
    options: TurnOptions,
) -> TurnOutcome {
    let handshake = async {
        match options.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, provider.stream_chat(request))
                .await
                .unwrap_or(Err(LlmError::IdleTimeout(limit))),
            None => provider.stream_chat(request).await,
        }
    };

    let opened = tokio::select! {
        biased;
        _ = sink.closed() => None,
        opened = handshake => Some(opened),
    };

    match opened {
        Some(Ok(fragments)) => relay_fragments(fragments, sink, options).await,
        Some(Err(e)) => {
            error!("Chat upstream unavailable: {e}");
            sink.fail(options.error_message).await;
            sink.end();
            TurnOutcome::Failed { forwarded: 0 }
        }
        None => {
            sink.end();
            TurnOutcome::ClientDisconnected { forwarded: 0 }
        }
    }
}

/// Spawns the turn and returns the streaming response immediately.
pub fn spawn_turn(
    provider: Arc<dyn ChatProvider>,
    request: ChatRequest,
    options: TurnOptions,
) -> Response {
    let (sink, body) = turn_channel();
    let span = info_span!("turn", id = %Uuid::new_v4(), kind = options.kind);

    tokio::spawn(
        async move {
            let outcome = run_turn(provider, request, sink, options).await;
            info!(?outcome, "Turn finished");
        }
        .instrument(span),
    );

    event_stream_response(body)
}

/// Wraps the body stream with event-stream headers.
pub fn event_stream_response(body: ReceiverStream<Bytes>) -> Response {
    let mut response = Response::new(Body::from_stream(body.map(Ok::<_, Infallible>)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OPTIONS: TurnOptions = TurnOptions {
        kind: "test",
        error_message: "生成问题时出错，请重试",
        idle_timeout: None,
    };

    fn scripted(items: Vec<Result<&'static str, LlmError>>) -> FragmentStream {
        Box::pin(stream::iter(
            items.into_iter().map(|r| r.map(str::to_string)),
        ))
    }

    async fn drain(body: ReceiverStream<Bytes>) -> Vec<StreamEvent> {
        let chunks: Vec<Bytes> = body.collect().await;
        let text: String = chunks
            .iter()
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect();
        framer::decode(&text).unwrap()
    }

    struct FailingProvider;

    #[async_trait]
    impl ChatProvider for FailingProvider {
        async fn stream_chat(&self, _request: ChatRequest) -> Result<FragmentStream, LlmError> {
            Err(LlmError::UpstreamHttp {
                status: 500,
                message: "internal".into(),
            })
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".into(),
            system: None,
            user: "u".into(),
            temperature: 0.5,
            max_tokens: 10,
            disable_thinking: false,
        }
    }

    #[tokio::test]
    async fn test_n_fragments_then_single_last_marker() {
        let (sink, body) = turn_channel();
        let outcome = relay_fragments(scripted(vec![Ok("请"), Ok("介绍"), Ok("一下")]), sink, OPTIONS).await;
        assert_eq!(outcome, TurnOutcome::Completed { forwarded: 3 });

        let events = drain(body).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::content("请"),
                StreamEvent::content("介绍"),
                StreamEvent::content("一下"),
                StreamEvent::last(),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_stream_still_ends_with_marker() {
        let (sink, body) = turn_channel();
        let outcome = relay_fragments(scripted(vec![]), sink, OPTIONS).await;
        assert_eq!(outcome, TurnOutcome::Completed { forwarded: 0 });
        assert_eq!(drain(body).await, vec![StreamEvent::last()]);
    }

    #[tokio::test]
    async fn test_mid_stream_error_emits_one_error_and_no_marker() {
        let (sink, body) = turn_channel();
        let outcome = relay_fragments(
            scripted(vec![
                Ok("a"),
                Err(LlmError::UpstreamStream("boom".into())),
                Ok("never"),
            ]),
            sink,
            OPTIONS,
        )
        .await;
        assert_eq!(outcome, TurnOutcome::Failed { forwarded: 1 });

        let events = drain(body).await;
        assert_eq!(
            events,
            vec![StreamEvent::content("a"), StreamEvent::error(OPTIONS.error_message)]
        );
    }

    #[tokio::test]
    async fn test_handshake_failure_yields_only_error_event() {
        let (sink, body) = turn_channel();
        let outcome = run_turn(Arc::new(FailingProvider), request(), sink, OPTIONS).await;
        assert_eq!(outcome, TurnOutcome::Failed { forwarded: 0 });
        assert_eq!(drain(body).await, vec![StreamEvent::error(OPTIONS.error_message)]);
    }

    #[tokio::test]
    async fn test_terminal_writes_are_idempotent() {
        let (mut sink, body) = turn_channel();
        assert!(sink.send_content("x").await);
        assert!(sink.finish().await);
        assert!(!sink.finish().await);
        assert!(!sink.fail("late").await);
        assert!(!sink.send_content("late").await);
        sink.end();
        sink.end();
        assert!(!sink.is_open());

        assert_eq!(
            drain(body).await,
            vec![StreamEvent::content("x"), StreamEvent::last()]
        );
    }

    #[tokio::test]
    async fn test_disconnected_client_stops_pulling() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = pulls.clone();
        let endless: FragmentStream = Box::pin(stream::repeat_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, LlmError>("tok".to_string())
        }));

        let (sink, body) = turn_channel();
        drop(body);
        assert!(!sink.is_open());

        let outcome = relay_fragments(endless, sink, OPTIONS).await;
        assert_eq!(outcome, TurnOutcome::ClientDisconnected { forwarded: 0 });
        assert_eq!(pulls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnect_during_stream_releases_upstream() {
        let (sink, mut body) = turn_channel();
        let (frag_tx, frag_rx) = mpsc::channel::<Result<String, LlmError>>(4);
        let fragments: FragmentStream = Box::pin(ReceiverStream::new(frag_rx));

        let relay = tokio::spawn(relay_fragments(fragments, sink, OPTIONS));

        frag_tx.send(Ok("first".into())).await.unwrap();
        let first = body.next().await.unwrap();
        assert!(std::str::from_utf8(&first).unwrap().contains("first"));

        drop(body);
        let outcome = relay.await.unwrap();
        assert_eq!(outcome, TurnOutcome::ClientDisconnected { forwarded: 1 });
        // the relay dropped its end of the upstream stream
        assert!(frag_tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_upstream_times_out_with_error_event() {
        let options = TurnOptions {
            idle_timeout: Some(Duration::from_secs(5)),
            ..OPTIONS
        };
        let (sink, body) = turn_channel();
        let hung: FragmentStream = Box::pin(stream::pending::<Result<String, LlmError>>());
        let outcome = relay_fragments(hung, sink, options).await;
        assert_eq!(outcome, TurnOutcome::Failed { forwarded: 0 });
        assert_eq!(drain(body).await, vec![StreamEvent::error(OPTIONS.error_message)]);
    }

    #[tokio::test]
    async fn test_response_headers() {
        let (_sink, body) = turn_channel();
        let response = event_stream_response(body);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    }
}
