use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::gpu::ShaderStage;

/// Failures surfaced by [`crate::ProgramLifecycle`].
///
/// None of these escape a player as a panic; they are returned to the caller
/// and mirrored to the lifecycle's [`Reporter`].
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("{0} shader source is empty")]
    Validation(ShaderStage),
    #[error("{stage} shader failed to compile: {log}")]
    Compile {
        stage: ShaderStage,
        log: String,
        shader_source: String,
        excerpt: Option<String>,
    },
    #[error("program failed to link: {log}")]
    Link { log: String },
    #[error("GPU resource unavailable: {message}")]
    Resource { message: String },
    #[error("wrapper template does not contain the `{marker}` marker")]
    MissingMarker { marker: &'static str },
    #[error("program lifecycle has been disposed")]
    Disposed,
}

impl ProgramError {
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ReportKind {
        match self {
            ProgramError::Validation(_) | ProgramError::MissingMarker { .. } => {
                ReportKind::Validation
            }
            ProgramError::Compile { .. } => ReportKind::Compile,
            ProgramError::Link { .. } => ReportKind::Link,
            ProgramError::Resource { .. } | ProgramError::Disposed => ReportKind::Resource,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Validation,
    Compile,
    Link,
    UniformNotFound,
    Resource,
    Fetch,
    Loaded,
}

impl ReportKind {
    pub fn is_failure(self) -> bool {
        !matches!(self, ReportKind::UniformNotFound | ReportKind::Loaded)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReportKind::Validation => "validation",
            ReportKind::Compile => "compile",
            ReportKind::Link => "link",
            ReportKind::UniformNotFound => "uniform-not-found",
            ReportKind::Resource => "resource",
            ReportKind::Fetch => "fetch",
            ReportKind::Loaded => "loaded",
        };
        f.write_str(label)
    }
}

/// Structured diagnostic handed to the hosting UI.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub kind: ReportKind,
    pub message: String,
    pub timestamp: DateTime<Local>,
    pub stage: Option<ShaderStage>,
    pub excerpt: Option<String>,
    /// Usually the owning player's id.
    pub context: Option<String>,
}

impl RenderReport {
    pub fn new(kind: ReportKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Local::now(),
            stage: None,
            excerpt: None,
            context: None,
        }
    }

    pub fn from_error(error: &ProgramError) -> Self {
        let mut report = Self::new(error.kind(), error.to_string());
        match error {
            ProgramError::Compile { stage, excerpt, .. } => {
                report.stage = Some(*stage);
                report.excerpt = excerpt.clone();
            }
            ProgramError::Validation(stage) => report.stage = Some(*stage),
            _ => {}
        }
        report
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

type ReportSink = Rc<dyn Fn(&RenderReport)>;

/// Error channel shared by a lifecycle and its owning player.
///
/// Every report is logged through `tracing`; an optional sink receives the
/// structured value as well.
#[derive(Clone, Default)]
pub struct Reporter {
    sink: Option<ReportSink>,
    context: Option<String>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: impl Fn(&RenderReport) + 'static) -> Self {
        Self {
            sink: Some(Rc::new(sink)),
            context: None,
        }
    }

    /// Returns a reporter sharing the same sink that tags reports with `context`.
    pub fn scoped(&self, context: impl Into<String>) -> Self {
        Self {
            sink: self.sink.clone(),
            context: Some(context.into()),
        }
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn report(&self, mut report: RenderReport) {
        if report.context.is_none() {
            report.context = self.context.clone();
        }
        let context = report.context.as_deref().unwrap_or("-");
        match report.kind {
            ReportKind::Loaded => {
                tracing::info!(context, message = %report.message, "shader program ready")
            }
            ReportKind::UniformNotFound => {
                tracing::debug!(context, message = %report.message, "uniform not in program")
            }
            kind => tracing::warn!(
                context,
                kind = %kind,
                stage = ?report.stage,
                message = %report.message,
                "render failure"
            ),
        }
        if let Some(excerpt) = &report.excerpt {
            tracing::debug!(context, "source around failure:\n{excerpt}");
        }
        if let Some(sink) = &self.sink {
            sink(&report);
        }
    }

    pub fn report_error(&self, error: &ProgramError) {
        self.report(RenderReport::from_error(error));
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("sink", &self.sink.is_some())
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn scoped_reporter_tags_context_and_forwards() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let reporter = Reporter::with_sink(move |report| sink.borrow_mut().push(report.clone()));
        let scoped = reporter.scoped("p1");

        scoped.report(RenderReport::new(ReportKind::Link, "boom"));
        reporter.report(RenderReport::new(ReportKind::Fetch, "late").with_context("p2"));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].context.as_deref(), Some("p1"));
        assert_eq!(seen[1].context.as_deref(), Some("p2"));
    }

    #[test]
    fn compile_error_report_keeps_stage_and_excerpt() {
        let error = ProgramError::Compile {
            stage: ShaderStage::Fragment,
            log: "ERROR: 0:2: bad".into(),
            shader_source: "a\nb\nc".into(),
            excerpt: Some(">   2 | b".into()),
        };
        let report = RenderReport::from_error(&error);
        assert_eq!(report.kind, ReportKind::Compile);
        assert_eq!(report.stage, Some(ShaderStage::Fragment));
        assert_eq!(report.excerpt.as_deref(), Some(">   2 | b"));
        assert!(report.message.contains("fragment shader failed to compile"));
    }
}
