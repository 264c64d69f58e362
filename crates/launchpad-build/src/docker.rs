//! Docker CLI builder.
//!
//! Runs `docker build --build-arg APP_NAME=<app> -t <ref> <context>` and
//! `docker push <ref>`, streaming both stdout and stderr line by line.

use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use launchpad_core::config::BuilderConfig;
use launchpad_core::{ImageTag, ProgressSink};

use crate::builder::ImageBuilder;
use crate::error::{BuildError, BuildResult};

pub struct DockerBuilder {
    docker: String,
    registry_host: String,
    tail_lines: usize,
}

impl DockerBuilder {
    pub fn new(docker: impl Into<String>, registry_host: impl Into<String>, tail_lines: usize) -> Self {
        Self {
            docker: docker.into(),
            registry_host: registry_host.into(),
            tail_lines: tail_lines.max(1),
        }
    }

    pub fn from_config(builder: &BuilderConfig, registry_host: &str) -> Self {
        Self::new(&builder.docker, registry_host, builder.log_tail_lines)
    }

    fn reference(&self, tag: &ImageTag) -> String {
        tag.reference(&self.registry_host)
    }

    async fn run(&self, args: &[String], progress: &ProgressSink) -> BuildResult<(ExitStatus, String)> {
        debug!(program = %self.docker, ?args, "running");
        let mut child = Command::new(&self.docker)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::Spawn {
                program: self.docker.clone(),
                source,
            })?;

        let mut tail = LogTail::new(self.tail_lines);
        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                return Err(BuildError::Spawn {
                    program: self.docker.clone(),
                    source: std::io::Error::other("output pipes unavailable"),
                });
            }
        };
        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                line = stdout.next_line(), if out_open => match line {
                    Ok(Some(line)) => {
                        tail.push(&line);
                        progress.log(line);
                    }
                    Ok(None) => out_open = false,
                    Err(e) => {
                        warn!(error = %e, "stdout read failed");
                        out_open = false;
                    }
                },
                line = stderr.next_line(), if err_open => match line {
                    Ok(Some(line)) => {
                        tail.push(&line);
                        progress.log(line);
                    }
                    Ok(None) => err_open = false,
                    Err(e) => {
                        warn!(error = %e, "stderr read failed");
                        err_open = false;
                    }
                },
            }
        }

        let status = child.wait().await.map_err(|source| BuildError::Spawn {
            program: self.docker.clone(),
            source,
        })?;
        Ok((status, tail.into_string()))
    }
}

#[async_trait]
impl ImageBuilder for DockerBuilder {
    async fn build(&self, context: &Path, tag: &ImageTag, progress: &ProgressSink) -> BuildResult<()> {
        let reference = self.reference(tag);
        info!(tag = %tag, context = %context.display(), "building image");
        let args = vec![
            "build".to_string(),
            "--build-arg".to_string(),
            format!("APP_NAME={}", tag.app()),
            "-t".to_string(),
            reference,
            context.display().to_string(),
        ];
        let (status, log) = self.run(&args, progress).await?;
        if !status.success() {
            warn!(tag = %tag, code = ?status.code(), "image build failed");
            return Err(BuildError::BuildFailure {
                tag: tag.to_string(),
                log,
            });
        }
        Ok(())
    }

    async fn push(&self, tag: &ImageTag, progress: &ProgressSink) -> BuildResult<()> {
        let reference = self.reference(tag);
        info!(tag = %tag, %reference, "pushing image");
        let args = vec!["push".to_string(), reference];
        let (status, log) = self.run(&args, progress).await?;
        if !status.success() {
            warn!(tag = %tag, code = ?status.code(), "image push failed");
            return Err(BuildError::PushFailure {
                tag: tag.to_string(),
                log,
            });
        }
        Ok(())
    }
}

/// Last `capacity` lines of tool output.
struct LogTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: &str) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}
