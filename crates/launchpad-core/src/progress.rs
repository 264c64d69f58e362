//! Progress events streamed to the caller while an intent runs.

use serde::Serialize;
use tokio::sync::mpsc;

/// Coarse step of a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Generate,
    Commit,
    Checkout,
    Build,
    Push,
    Namespace,
    Rollout,
    Ingress,
    Teardown,
    /// Read-only cluster queries: pod status and logs.
    Inspect,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Generate => "generate",
            Step::Commit => "commit",
            Step::Checkout => "checkout",
            Step::Build => "build",
            Step::Push => "push",
            Step::Namespace => "namespace",
            Step::Rollout => "rollout",
            Step::Ingress => "ingress",
            Step::Teardown => "teardown",
            Step::Inspect => "inspect",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Progress {
    /// A step started.
    Step { step: Step, message: String },
    /// Raw text streamed from the code generator.
    Token { text: String },
    /// A generated file finished streaming.
    File { name: String },
    /// One line of build/push output.
    Log { line: String },
}

/// Where progress goes. A disconnected or absent receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<Progress>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<Progress>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Create a sink together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Progress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, event: Progress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn step(&self, step: Step, message: impl Into<String>) {
        self.send(Progress::Step {
            step,
            message: message.into(),
        });
    }

    pub fn log(&self, line: impl Into<String>) {
        self.send(Progress::Log { line: line.into() });
    }
}
