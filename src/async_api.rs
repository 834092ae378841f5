//! Async facade over the blocking sandbox calls.
//!
//! Each call runs on its own OS thread and reports back through a oneshot
//! channel, so an async caller never blocks its executor while the browser
//! runs. [`BatchRenderer`] renders many tokens with a bounded number of
//! browsers in flight.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use futures::stream::{self, StreamExt};
use log::debug;
use tokio::sync::oneshot;

use crate::assemble::{GeneratorSpec, TokenData, VirtualFileSet};
use crate::library::LibraryBundle;
use crate::{orchestrator, render, Error, RenderOptions, Result};

async fn run_blocking<T, F>(label: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    thread::Builder::new()
        .name(format!("gensandbox-{}", label))
        .spawn(move || {
            let _ = tx.send(f());
        })?;
    rx.await
        .map_err(|e| Error::Other(format!("{} canceled: {}", label, e)))?
}

/// Async [`orchestrator::eval_untrusted_html`]
pub async fn eval_untrusted_html(files: VirtualFileSet, options: RenderOptions) -> Result<String> {
    run_blocking("eval", move || orchestrator::eval_untrusted_html(files, &options)).await
}

/// Async [`orchestrator::screenshot_untrusted_html`]
pub async fn screenshot_untrusted_html(
    files: VirtualFileSet,
    output: PathBuf,
    options: RenderOptions,
) -> Result<()> {
    run_blocking("screenshot", move || {
        orchestrator::screenshot_untrusted_html(files, &output, &options)
    })
    .await
}

/// What to produce for one token
#[derive(Debug, Clone)]
pub enum RenderKind {
    Features,
    Image { output: PathBuf },
}

/// One token to render in a batch
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Caller's key for the job, echoed back with its result
    pub id: String,
    pub spec: GeneratorSpec,
    pub token: TokenData,
    pub kind: RenderKind,
}

/// Successful result of a [`RenderJob`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    Features(String),
    Image(PathBuf),
}

/// Renders jobs concurrently, at most `concurrency` browsers at a time.
///
/// Jobs are independent: one failing does not affect the others, and
/// nothing is retried.
#[derive(Debug, Clone)]
pub struct BatchRenderer {
    bundle: Arc<LibraryBundle>,
    options: RenderOptions,
    concurrency: usize,
}

impl BatchRenderer {
    pub fn new(bundle: LibraryBundle, options: RenderOptions) -> Self {
        Self {
            bundle: Arc::new(bundle),
            options,
            concurrency: num_cpus::get().max(1),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Render a single job
    pub async fn render(&self, job: RenderJob) -> Result<RenderOutput> {
        let bundle = Arc::clone(&self.bundle);
        let options = self.options.clone();
        run_blocking("render", move || match job.kind {
            RenderKind::Features => {
                render::render_features(&job.spec, &job.token, &bundle, &options)
                    .map(RenderOutput::Features)
            }
            RenderKind::Image { output } => {
                render::render_image(&job.spec, &job.token, &bundle, &output, &options)
                    .map(|()| RenderOutput::Image(output))
            }
        })
        .await
    }

    /// Render every job; results come back in completion order, keyed by
    /// job id.
    pub async fn render_batch(&self, jobs: Vec<RenderJob>) -> Vec<(String, Result<RenderOutput>)> {
        debug!(
            "rendering batch of {} jobs with concurrency {}",
            jobs.len(),
            self.concurrency
        );
        stream::iter(jobs)
            .map(|job| async move {
                let id = job.id.clone();
                (id, self.render(job).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn batch_reports_each_job_independently() {
        let renderer = BatchRenderer::new(LibraryBundle::new(), RenderOptions::default())
            .with_concurrency(2);

        let jobs = vec![
            RenderJob {
                id: "bad-lib".into(),
                spec: GeneratorSpec::new("x", "nope@1", 1.0),
                token: TokenData(json!({})),
                kind: RenderKind::Features,
            },
            RenderJob {
                id: "bad-ratio".into(),
                spec: GeneratorSpec::new("x", "none", -1.0),
                token: TokenData(json!({})),
                kind: RenderKind::Image { output: PathBuf::from("/tmp/never.png") },
            },
        ];

        let mut results = renderer.render_batch(jobs).await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], (ref id, Err(Error::UnsupportedLibrary(_))) if id == "bad-lib"));
        assert!(matches!(results[1], (ref id, Err(Error::InvalidArgument(_))) if id == "bad-ratio"));
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let r = BatchRenderer::new(LibraryBundle::new(), RenderOptions::default()).with_concurrency(0);
        assert_eq!(r.concurrency(), 1);
    }
}
