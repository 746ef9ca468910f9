//! Console reporter with colored output

use crate::session::Session;
use crate::view::{AnnotationCell, SummaryTable};
use crate::Outcome;
use colored::Colorize;

/// Reporter for terminal output
pub struct ConsoleReporter {
    /// Whether to use colors
    use_colors: bool,
    /// List every test instead of just the ones that did not pass
    verbose: bool,
}

impl ConsoleReporter {
    /// Create a new console reporter
    pub fn new() -> Self {
        Self {
            use_colors: true,
            verbose: false,
        }
    }

    /// Disable colors
    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    /// Enable verbose output
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Print the session summary to stdout
    pub fn report(&self, source: &str, session: &Session) {
        print!("{}", self.render(source, session));
    }

    pub fn render(&self, source: &str, session: &Session) -> String {
        let mut out = String::new();
        self.push_header(&mut out, source, session);
        self.push_counts(&mut out, session);
        self.push_tests(&mut out, session);
        self.push_problems(&mut out, session);
        out
    }

    fn push_header(&self, out: &mut String, source: &str, session: &Session) {
        out.push('\n');
        out.push_str(&format!("{}\n", self.bold(&format!("Test report: {}", source))));

        let status = match session.annotations() {
            Some(a) if a.is_running => self.paint("running", "blue"),
            Some(_) => self.paint("finished", "green"),
            None => self.paint("unknown", "yellow"),
        };
        let mut line = format!("   Run: {}", status);
        if let Some(elapsed) = session.annotations().and_then(|a| a.duration()) {
            line.push_str(&format!(" (elapsed {})", format_elapsed(elapsed)));
        }
        out.push_str(&line);
        out.push_str("\n\n");
    }

    fn push_counts(&self, out: &mut String, session: &Session) {
        let table = SummaryTable::from_store(session.store());
        out.push_str(&format!("   {} {}\n", self.bold("Total:"), table.total));
        for row in &table.rows {
            let label = format!("{:<9}", row.outcome.as_str());
            out.push_str(&format!(
                "   {} {:>5}  {:>3}%\n",
                self.outcome(&label, row.outcome),
                row.count,
                row.percent
            ));
        }
        out.push('\n');
    }

    fn push_tests(&self, out: &mut String, session: &Session) {
        let store = session.store();
        let ids = if self.verbose {
            store.all_ids()
        } else {
            store.not_passed_ids()
        };
        if ids.is_empty() {
            return;
        }

        let heading = if self.verbose { "Tests:" } else { "Not passed:" };
        out.push_str(&format!("   {}\n", self.bold(heading)));
        for rec in ids.iter().filter_map(|id| store.get(id)) {
            let tag = format!("{:<9}", rec.outcome.as_str());
            out.push_str(&format!("   {} {}", self.outcome(&tag, rec.outcome), rec.id));
            if let Some(cause) = &rec.cause {
                out.push_str(&format!("  {}", self.dim(cause)));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    fn push_problems(&self, out: &mut String, session: &Session) {
        for error in session.errors() {
            out.push_str(&format!("   {} {}\n", self.paint("fetch failed:", "red"), error));
        }
        for rejection in session.rejected() {
            out.push_str(&format!(
                "   {} record #{}{}: {}\n",
                self.paint("skipped", "yellow"),
                rejection.index,
                rejection
                    .id
                    .as_deref()
                    .map(|id| format!(" ({})", id))
                    .unwrap_or_default(),
                rejection.reason
            ));
        }
        if let Some(table) = session.annotations() {
            let list: Vec<String> = table
                .rows
                .iter()
                .filter_map(|row| match &row.cell {
                    AnnotationCell::Text(v) => Some(format!("{}={}", row.key, v)),
                    AnnotationCell::List(v) => Some(format!("{}=[{}]", row.key, v.join(", "))),
                    _ => None,
                })
                .collect();
            if self.verbose && !list.is_empty() {
                out.push_str(&format!("   {}\n", self.bold("Annotations:")));
                for entry in list {
                    out.push_str(&format!("   {}\n", self.dim(&entry)));
                }
            }
        }
    }

    fn outcome(&self, text: &str, outcome: Outcome) -> String {
        let color = match outcome {
            Outcome::Pass => "green",
            Outcome::Fail => "red",
            Outcome::Error => "magenta",
            Outcome::Untested => "yellow",
        };
        self.paint(text, color)
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.use_colors {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.use_colors {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// `1h 02m 03s`, `4m 05s`, `6s`
fn format_elapsed(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Event, SessionOptions};

    fn session(summary: &str, annotations: &str) -> Session {
        let mut session = Session::new(SessionOptions::default());
        session.handle(Event::Start);
        session.handle(Event::SummaryFetched(Ok(summary.to_string())));
        session.handle(Event::AnnotationsFetched(Ok(annotations.to_string())));
        session
    }

    const SUMMARY: &str = r#"[
        {"id":"t1","outcome":"PASS","fields":[]},
        {"id":"t2","outcome":"FAIL","cause":"boom","fields":[]},
        {"outcome":"PASS","fields":[]}
    ]"#;

    #[test]
    fn test_render_counts_and_failures() {
        let s = session(
            SUMMARY,
            r#"{"qmtest.run.start_time":"2024-01-01T10:00:00","qmtest.run.end_time":"2024-01-01T10:04:05"}"#,
        );
        let out = ConsoleReporter::new().without_colors().render("bundle", &s);
        assert!(out.contains("Test report: bundle"));
        assert!(out.contains("Run: finished (elapsed 4m 05s)"));
        assert!(out.contains("Total: 2"));
        assert!(out.contains("FAIL          1   50%"));
        assert!(out.contains("FAIL      t2  boom"));
        assert!(!out.contains("PASS      t1"));
        assert!(out.contains("skipped record #2"));
    }

    #[test]
    fn test_verbose_lists_passes_and_annotations() {
        let s = session(SUMMARY, r#"{"qmtest.run.start_time":"T0","hostname":"lxbuild"}"#);
        let out = ConsoleReporter::new().without_colors().verbose().render("b", &s);
        assert!(out.contains("Run: running"));
        assert!(out.contains("PASS      t1"));
        assert!(out.contains("hostname=lxbuild"));
    }

    #[test]
    fn test_unknown_status_when_annotations_fail() {
        let mut s = Session::new(SessionOptions::default());
        s.handle(Event::Start);
        s.handle(Event::SummaryFetched(Ok("[]".into())));
        s.handle(Event::AnnotationsFetched(Ok("[]".into())));
        let out = ConsoleReporter::new().without_colors().render("b", &s);
        assert!(out.contains("Run: unknown"));
        assert!(out.contains("fetch failed: annotations.json must be a JSON object"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(chrono::Duration::seconds(6)), "6s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(3723)), "1h 02m 03s");
    }
}
