//! Background diagnostics pipeline.
//!
//! Documents are queued on every open and change; a one-second ticker picks
//! queued documents up and evaluates them off the async runtime. A document
//! already being processed stays queued, so a burst of edits collapses into
//! one evaluation plus one final pass.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use jsonnet_analysis::{DocumentCache, EvaluatorFactory};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use regex::{Captures, Regex};
use tower_lsp::async_trait;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Range, Url};
use tracing::{debug, error};

use crate::config::Configuration;
use crate::jpath;

/// The Jsonnet location formats found in evaluator and linter output:
/// `file:line msg`, `file:line:col msg`, `file:line:col-endCol msg`, and
/// `file:(line:col)-(endLine:endCol) msg`.
static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"/[^:]*:(?:(?P<start_line1>\d+)|(?P<start_line2>\d+):(?P<start_col2>\d+)|(?:(?P<start_line3>\d+):(?P<start_col3>\d+)-(?P<end_col3>\d+))|(?:\((?P<start_line4>\d+):(?P<start_col4>\d+)\)-\((?P<end_line4>\d+):(?P<end_col4>\d+)\)))\s(?P<message>.*)",
    )
    .unwrap()
});

/// Where finished diagnostics go. Abstracted from [`tower_lsp::Client`] so
/// tests can capture the published batches.
#[async_trait]
pub trait DiagnosticsSink: Send + Sync + 'static {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>);
}

#[async_trait]
impl DiagnosticsSink for tower_lsp::Client {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        self.publish_diagnostics(uri, diagnostics, None).await;
    }
}

pub struct DiagnosticsEngine {
    cache: Arc<DocumentCache>,
    factory: Arc<dyn EvaluatorFactory>,
    config: Arc<RwLock<Configuration>>,
    queue: Mutex<HashSet<Url>>,
    running: Mutex<HashSet<Url>>,
}

impl DiagnosticsEngine {
    pub fn new(
        cache: Arc<DocumentCache>,
        factory: Arc<dyn EvaluatorFactory>,
        config: Arc<RwLock<Configuration>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            factory,
            config,
            queue: Mutex::new(HashSet::new()),
            running: Mutex::new(HashSet::new()),
        })
    }

    pub fn enqueue(&self, uri: Url) {
        self.queue.lock().insert(uri);
    }

    /// Starts the ticker task. Called once, at initialize.
    pub fn spawn_loop<S: DiagnosticsSink>(self: &Arc<Self>, sink: Arc<S>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                engine.drain(&sink);
            }
        });
    }

    fn drain<S: DiagnosticsSink>(self: &Arc<Self>, sink: &Arc<S>) {
        let pending: Vec<Url> = self.queue.lock().iter().cloned().collect();
        for uri in pending {
            {
                let mut running = self.running.lock();
                if running.contains(&uri) {
                    // Still being processed; it stays queued for the next tick.
                    continue;
                }
                running.insert(uri.clone());
            }
            self.queue.lock().remove(&uri);
            tokio::spawn(Self::publish_for(Arc::clone(self), uri, Arc::clone(sink)));
        }
    }

    pub(crate) async fn publish_for<S: DiagnosticsSink>(self: Arc<Self>, uri: Url, sink: Arc<S>) {
        debug!(%uri, "publishing diagnostics");
        let result = self.diagnostics_for(&uri, sink.as_ref()).await;
        self.running.lock().remove(&uri);

        match result {
            Ok(diagnostics) => {
                sink.publish(uri.clone(), diagnostics.clone()).await;
                self.cache.update_diagnostics(&uri, diagnostics);
                debug!(%uri, "done publishing diagnostics");
            }
            Err(err) => error!("publish diagnostics: {err}"),
        }
    }

    /// Runs evaluation and (optionally) lint. Evaluation results are pushed
    /// to the sink as soon as they exist when lint still has to run.
    async fn diagnostics_for<S: DiagnosticsSink>(
        &self,
        uri: &Url,
        sink: &S,
    ) -> Result<Vec<Diagnostic>, String> {
        let doc = self
            .cache
            .get(uri)
            .map_err(|err| format!("unable to retrieve document from the cache: {err}"))?;
        let filename = uri
            .to_file_path()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|()| uri.to_string());
        let config = self.config.read().clone();
        let jpaths = jpath::resolve(&filename, &config.jpaths, config.resolve_paths_with_tanka);

        let eval_task = {
            let mut err_text = doc.err.clone();
            let run_eval = err_text.is_none() && config.enable_eval_diagnostics;
            let mut evaluator = self.factory.evaluator(&jpaths);
            evaluator.set_ext_vars(config.ext_vars.clone());
            let filename = filename.clone();
            let text = doc.text.clone();
            tokio::task::spawn_blocking(move || {
                if run_eval {
                    err_text = evaluator
                        .evaluate_anonymous_snippet(&filename, &text)
                        .err()
                        .map(|err| err.to_string());
                }
                err_text.map(|text| eval_diagnostic(&text))
            })
        };

        let lint_task = config.enable_lint_diagnostics.then(|| {
            let evaluator = self.factory.evaluator(&jpaths);
            let filename = filename.clone();
            let text = doc.text.clone();
            tokio::task::spawn_blocking(move || {
                lint_diagnostics(&evaluator.lint_snippet(&filename, &text))
            })
        });

        let mut diagnostics = Vec::new();
        diagnostics.extend(eval_task.await.map_err(|err| err.to_string())?);

        if let Some(lint_task) = lint_task {
            sink.publish(uri.clone(), diagnostics.clone()).await;
            diagnostics.extend(lint_task.await.map_err(|err| err.to_string())?);
        }

        Ok(diagnostics)
    }
}

/// One diagnostic for an evaluation or parse failure. Runtime errors keep
/// their full multi-line message and score only a warning; everything else
/// is an error with the location stripped out of the message.
pub(crate) fn eval_diagnostic(err_text: &str) -> Diagnostic {
    let mut lines = err_text.lines();
    let first = lines.next().unwrap_or("");
    let runtime_err = first.starts_with("RUNTIME ERROR:");
    let located_line = if runtime_err {
        lines.next().unwrap_or("")
    } else {
        first
    };

    let (message, range) = match LOCATION_RE.captures(located_line) {
        Some(caps) => parse_location_match(&caps),
        None => (String::new(), Range::default()),
    };

    if runtime_err {
        Diagnostic {
            range,
            severity: Some(DiagnosticSeverity::WARNING),
            source: Some("jsonnet evaluation".to_string()),
            message: err_text.to_string(),
            ..Diagnostic::default()
        }
    } else {
        Diagnostic {
            range,
            severity: Some(DiagnosticSeverity::ERROR),
            source: Some("jsonnet evaluation".to_string()),
            message,
            ..Diagnostic::default()
        }
    }
}

/// One warning per located line of the linter report.
pub(crate) fn lint_diagnostics(report: &str) -> Vec<Diagnostic> {
    LOCATION_RE
        .captures_iter(report)
        .map(|caps| {
            let (message, range) = parse_location_match(&caps);
            Diagnostic {
                range,
                severity: Some(DiagnosticSeverity::WARNING),
                source: Some("lint".to_string()),
                message,
                ..Diagnostic::default()
            }
        })
        .collect()
}

fn parse_location_match(caps: &Captures) -> (String, Range) {
    let get = |name: &str| -> Option<u32> {
        caps.name(name).and_then(|m| m.as_str().parse().ok())
    };

    let (mut line, mut col, mut end_line, mut end_col) = (1, 1, 1, 1);
    if let Some(l) = get("start_line1") {
        line = l;
        end_line = l;
    }
    if let Some(l) = get("start_line2") {
        line = l;
        end_line = l;
        col = get("start_col2").unwrap_or(1);
        end_col = col;
    }
    if let Some(l) = get("start_line3") {
        line = l;
        end_line = l;
        col = get("start_col3").unwrap_or(1);
        end_col = get("end_col3").unwrap_or(col);
    }
    if let Some(l) = get("start_line4") {
        line = l;
        end_line = get("end_line4").unwrap_or(l);
        col = get("start_col4").unwrap_or(1);
        end_col = get("end_col4").unwrap_or(col);
    }

    let message = caps
        .name("message")
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    (
        message,
        jsonnet_analysis::position::new_protocol_range(
            line.saturating_sub(1),
            col.saturating_sub(1),
            end_line.saturating_sub(1),
            end_col.saturating_sub(1),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonnet_analysis::testing::{StaticEvaluator, StaticEvaluatorFactory};
    use jsonnet_analysis::{AnalysisError, Document};
    use tower_lsp::lsp_types::Position;

    #[test]
    fn parses_line_only_locations() {
        let diag = eval_diagnostic("/tmp/test.jsonnet:4 something is wrong");
        assert_eq!(diag.message, "something is wrong");
        assert_eq!(diag.range.start, Position::new(3, 0));
        assert_eq!(diag.range.end, Position::new(3, 0));
        assert_eq!(diag.severity, Some(DiagnosticSeverity::ERROR));
    }

    #[test]
    fn parses_line_and_column_locations() {
        let diag = eval_diagnostic("/tmp/test.jsonnet:18:28 unexpected token");
        assert_eq!(diag.range.start, Position::new(17, 27));
        assert_eq!(diag.range.end, Position::new(17, 27));
    }

    #[test]
    fn parses_column_span_locations() {
        let diag = eval_diagnostic("/tmp/test.jsonnet:3:5-12 bad field");
        assert_eq!(diag.range.start, Position::new(2, 4));
        assert_eq!(diag.range.end, Position::new(2, 11));
        assert_eq!(diag.message, "bad field");
    }

    #[test]
    fn parses_full_span_locations() {
        let diag = eval_diagnostic("/tmp/test.jsonnet:(1:10)-(3:2) unterminated object");
        assert_eq!(diag.range.start, Position::new(0, 9));
        assert_eq!(diag.range.end, Position::new(2, 1));
    }

    #[test]
    fn runtime_errors_are_warnings_with_the_full_message() {
        let text = "RUNTIME ERROR: field does not exist: foo\n\t/tmp/test.jsonnet:2:10-17\tobject <anonymous>";
        let diag = eval_diagnostic(text);
        assert_eq!(diag.severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(diag.message, text);
        assert_eq!(diag.range.start, Position::new(1, 9));
    }

    #[test]
    fn unlocated_errors_fall_back_to_the_document_start() {
        let diag = eval_diagnostic("something exploded");
        assert_eq!(diag.range, Range::default());
        assert_eq!(diag.message, "");
    }

    #[test]
    fn lint_reports_yield_one_warning_per_line() {
        let report = "/tmp/a.jsonnet:2:7-10 unused variable x\n/tmp/a.jsonnet:5:1 something else\n";
        let diags = lint_diagnostics(report);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].message, "unused variable x");
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(diags[0].source.as_deref(), Some("lint"));
        assert_eq!(diags[1].range.start, Position::new(4, 0));
    }

    struct RecordingSink {
        published: Mutex<Vec<(Url, Vec<Diagnostic>)>>,
    }

    #[async_trait]
    impl DiagnosticsSink for RecordingSink {
        async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
            self.published.lock().push((uri, diagnostics));
        }
    }

    fn engine_fixture(
        evaluator: StaticEvaluator,
        config: Configuration,
    ) -> (Arc<DiagnosticsEngine>, Arc<DocumentCache>) {
        let cache = Arc::new(DocumentCache::new());
        let engine = DiagnosticsEngine::new(
            Arc::clone(&cache),
            Arc::new(StaticEvaluatorFactory::new(evaluator)),
            Arc::new(RwLock::new(config)),
        );
        (engine, cache)
    }

    #[tokio::test]
    async fn publishes_evaluation_failures() {
        let uri = Url::from_file_path("/tmp/test.jsonnet").unwrap();
        let evaluator = StaticEvaluator::new().with_eval_result(
            "/tmp/test.jsonnet",
            Err(AnalysisError::External(
                "/tmp/test.jsonnet:4 undefined variable".to_string(),
            )),
        );
        let (engine, cache) = engine_fixture(evaluator, Configuration::default());
        cache
            .put(Document::new(uri.clone(), 1, "bad".to_string()))
            .unwrap();

        let sink = Arc::new(RecordingSink {
            published: Mutex::new(Vec::new()),
        });
        engine.publish_for(uri.clone(), Arc::clone(&sink)).await;

        let published = sink.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, uri);
        assert_eq!(published[0].1.len(), 1);
        assert!(published[0].1[0].message.contains("undefined variable"));

        assert_eq!(cache.get(&uri).unwrap().diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn lint_results_are_published_after_eval_results() {
        let uri = Url::from_file_path("/tmp/test.jsonnet").unwrap();
        let evaluator = StaticEvaluator::new()
            .with_lint_output("/tmp/test.jsonnet:1:7-8 unused variable x\n");
        let config = Configuration {
            enable_lint_diagnostics: true,
            ..Configuration::default()
        };
        let (engine, cache) = engine_fixture(evaluator, config);
        cache
            .put(Document::new(uri.clone(), 1, "local x = 1; {}".to_string()))
            .unwrap();

        let sink = Arc::new(RecordingSink {
            published: Mutex::new(Vec::new()),
        });
        engine.publish_for(uri.clone(), Arc::clone(&sink)).await;

        let published = sink.published.lock();
        assert_eq!(published.len(), 2);
        assert!(published[0].1.is_empty());
        assert_eq!(published[1].1.len(), 1);
        assert_eq!(published[1].1[0].source.as_deref(), Some("lint"));
    }

    #[tokio::test]
    async fn parse_errors_surface_without_evaluation() {
        let uri = Url::from_file_path("/tmp/test.jsonnet").unwrap();
        let config = Configuration {
            enable_eval_diagnostics: false,
            ..Configuration::default()
        };
        let (engine, cache) = engine_fixture(StaticEvaluator::new(), config);
        let mut doc = Document::new(uri.clone(), 1, "{".to_string());
        doc.err = Some("/tmp/test.jsonnet:1:1 unexpected end of file".to_string());
        cache.put(doc).unwrap();

        let sink = Arc::new(RecordingSink {
            published: Mutex::new(Vec::new()),
        });
        engine.publish_for(uri.clone(), Arc::clone(&sink)).await;

        let published = sink.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1[0].message, "unexpected end of file");
        assert_eq!(published[0].1[0].severity, Some(DiagnosticSeverity::ERROR));
    }
}
