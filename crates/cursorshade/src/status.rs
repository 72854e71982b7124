use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use renderer::{RenderReport, ReportKind, Reporter};

/// Latest failure per player, rendered into the window title.
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    failures: Rc<RefCell<BTreeMap<String, String>>>,
}

impl StatusLine {
    /// A reporter whose reports update this status line.
    pub fn reporter(&self) -> Reporter {
        let failures = Rc::clone(&self.failures);
        Reporter::with_sink(move |report: &RenderReport| {
            let key = report.context.clone().unwrap_or_default();
            if report.kind.is_failure() {
                failures
                    .borrow_mut()
                    .insert(key, format!("{}: {}", report.kind, first_line(&report.message)));
            } else if report.kind == ReportKind::Loaded {
                failures.borrow_mut().remove(&key);
            }
        })
    }

    pub fn latest_failure(&self) -> Option<String> {
        let failures = self.failures.borrow();
        failures
            .iter()
            .next_back()
            .map(|(context, message)| format!("{context} {message}"))
    }

    pub fn failure_count(&self) -> usize {
        self.failures.borrow().len()
    }

    pub fn title(&self, mode: &str, players: usize) -> String {
        let mut title = format!("cursorshade | mode {mode} | {players} players");
        if let Some(failure) = self.latest_failure() {
            title.push_str(" | ");
            title.push_str(&failure);
        }
        title
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_shows_until_player_loads() {
        let status = StatusLine::default();
        let reporter = status.reporter().scoped("player p1");
        reporter.report(RenderReport::new(ReportKind::Compile, "bad token\nat line 4"));
        assert_eq!(status.failure_count(), 1);
        assert_eq!(
            status.title("auto", 2),
            "cursorshade | mode auto | 2 players | player p1 compile: bad token"
        );

        reporter.report(RenderReport::new(ReportKind::Loaded, "ok"));
        assert_eq!(status.failure_count(), 0);
        assert_eq!(status.title("rnd", 1), "cursorshade | mode rnd | 1 players");
    }

    #[test]
    fn missing_uniforms_are_not_failures() {
        let status = StatusLine::default();
        status
            .reporter()
            .report(RenderReport::new(ReportKind::UniformNotFound, "iMouse"));
        assert!(status.latest_failure().is_none());
    }
}
