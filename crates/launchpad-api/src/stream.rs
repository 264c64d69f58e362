//! Server-sent event streams for long-running intents.
//!
//! The intent runs in its own task and reports through a [`ProgressSink`].
//! Each [`Progress`] becomes a `progress` event; when the task finishes the
//! stream ends with one `result` event (the app record) or one `error` event.
//! Pod logs are forwarded line by line as `log` events.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use serde::Serialize;
use tokio_stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tokio_util::sync::DropGuard;
use tracing::warn;

use launchpad_core::{Progress, ProgressSink};
use launchpad_orchestrator::LifecycleResult;

use crate::response::ErrorBody;

pub type EventStream =
    Sse<KeepAliveStream<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>>;

/// Run `intent` in a task and stream its progress.
///
/// `guard` lives as long as the response stream; dropping it (the client
/// went away) cancels whatever token it guards.
pub fn progress_stream<F, Fut, T>(intent: F, guard: Option<DropGuard>) -> EventStream
where
    F: FnOnce(ProgressSink) -> Fut,
    Fut: Future<Output = LifecycleResult<T>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let (sink, rx) = ProgressSink::channel();
    let task = tokio::spawn(intent(sink));

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut progress = UnboundedReceiverStream::new(rx);
        while let Some(event) = progress.next().await {
            yield Ok::<_, Infallible>(progress_event(&event));
        }
        let last = match task.await {
            Ok(Ok(value)) => json_event("result", &value),
            Ok(Err(err)) => json_event("error", &ErrorBody::from(&err)),
            Err(join) => {
                warn!(error = %join, "intent task failed");
                json_event(
                    "error",
                    &ErrorBody {
                        kind: "internal".to_string(),
                        message: join.to_string(),
                        log: None,
                    },
                )
            }
        };
        yield Ok::<_, Infallible>(last);
    };
    let stream: Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = Box::pin(stream);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Stream `lines` until the cluster side closes. Dropping the response
/// drops the receiver, which stops the log follower.
pub fn log_stream(lines: mpsc::Receiver<String>) -> EventStream {
    let stream = ReceiverStream::new(lines)
        .map(|line| Ok::<_, Infallible>(json_event("log", &serde_json::json!({ "log": line }))));
    let stream: Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = Box::pin(stream);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn progress_event(progress: &Progress) -> Event {
    json_event("progress", progress)
}

fn json_event<T: Serialize>(name: &str, value: &T) -> Event {
    match Event::default().event(name).json_data(value) {
        Ok(event) => event,
        Err(e) => Event::default().event("error").data(e.to_string()),
    }
}
