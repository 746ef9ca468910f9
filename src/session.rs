//! Page-level controller: owns the store, the views and the poll state
//!
//! A [`Session`] is driven by [`Event`]s (fetch completions, timer expiry,
//! user actions) and answers each one with the [`Effect`]s its host must
//! perform. [`run_session`] is the host used by the CLI: a single-threaded
//! loop that performs fetches against a [`ReportSource`] and feeds the
//! completions back in.

use crate::poll::{PollCommand, PollingController, MAX_POLL_INTERVAL};
use crate::reporter::html::{HtmlReporter, PageModel};
use crate::source::{FetchError, ReportSource};
use crate::store::{Rejection, ResultStore};
use crate::view::{AnnotationTable, NodeRef, ResultTree, Scope, SummaryTable, TreeAction, TreeOptions};
use crate::FieldKey;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Something the user did on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Tree(TreeAction),
    StopPolling,
    Quit,
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized command `{0}` (try: expand|collapse|toggle <id> [field], collapse-all, show-all, show-failed, stop, quit)")]
pub struct UnknownCommand(pub String);

impl FromStr for UserAction {
    type Err = UnknownCommand;

    /// Parses one command line, e.g. `expand pkg.t1 ExecTest.stdout`
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();
        let node = || match args.as_slice() {
            [id] => Some(NodeRef::Test(id.to_string())),
            [id, field] => Some(NodeRef::Field(FieldKey::new(*id, *field))),
            _ => None,
        };
        let action = match (verb, args.is_empty()) {
            ("expand", false) => node().map(TreeAction::Expand),
            ("collapse", false) => node().map(TreeAction::Collapse),
            ("toggle", false) => node().map(TreeAction::Toggle),
            ("collapse-all", true) => Some(TreeAction::CollapseAll),
            ("show-all", true) => Some(TreeAction::SetScope(Scope::All)),
            ("show-failed", true) => Some(TreeAction::SetScope(Scope::NotPassed)),
            ("stop", true) => return Ok(UserAction::StopPolling),
            ("quit" | "exit", true) => return Ok(UserAction::Quit),
            _ => None,
        };
        action
            .map(UserAction::Tree)
            .ok_or_else(|| UnknownCommand(line.trim().to_string()))
    }
}

#[derive(Debug)]
pub enum Event {
    /// Page load
    Start,
    TimerFired,
    SummaryFetched(Result<String, FetchError>),
    AnnotationsFetched(Result<String, FetchError>),
    FieldFetched(FieldKey, Result<String, FetchError>),
    User(UserAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchSummary,
    FetchAnnotations,
    FetchField(FieldKey),
    /// Deliver [`Event::TimerFired`] after the delay
    Schedule(Duration),
    CancelScheduled,
    /// Page content changed
    Render,
    Quit,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub title: String,
    pub interval: Duration,
    pub scope: Scope,
    pub tree: TreeOptions,
    /// URL the page script resolves `<id>/<field>` paths against
    pub bundle_base: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            title: "Test Report".to_string(),
            interval: crate::poll::DEFAULT_POLL_INTERVAL,
            scope: Scope::NotPassed,
            tree: TreeOptions::default(),
            bundle_base: None,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    title: String,
    store: ResultStore,
    tree: ResultTree,
    annotations: Option<AnnotationTable>,
    controller: PollingController,
    summary_error: Option<String>,
    annotations_error: Option<String>,
    rejected: Vec<Rejection>,
    stop_control_visible: bool,
    bundle_base: Option<String>,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            title: options.title,
            store: ResultStore::new(),
            tree: ResultTree::new(options.tree).with_scope(options.scope),
            annotations: None,
            controller: PollingController::new(options.interval),
            summary_error: None,
            annotations_error: None,
            rejected: Vec::new(),
            stop_control_visible: true,
            bundle_base: options.bundle_base,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn tree(&self) -> &ResultTree {
        &self.tree
    }

    pub fn annotations(&self) -> Option<&AnnotationTable> {
        self.annotations.as_ref()
    }

    pub fn controller(&self) -> &PollingController {
        &self.controller
    }

    /// Records skipped by the last successful summary ingest
    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    /// Current fetch failures, one message per failing document
    pub fn errors(&self) -> Vec<&str> {
        [&self.summary_error, &self.annotations_error]
            .into_iter()
            .filter_map(|e| e.as_deref())
            .collect()
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            Event::Start => {
                let commands = self.controller.start();
                self.apply(commands, &mut effects);
            }
            Event::TimerFired => {
                let commands = self.controller.timer_fired();
                self.apply(commands, &mut effects);
            }
            Event::SummaryFetched(result) => {
                self.ingest_summary(result);
                effects.push(Effect::Render);
                let commands = self.controller.summary_done();
                self.apply(commands, &mut effects);
            }
            Event::AnnotationsFetched(result) => {
                let running = self.ingest_annotations(result);
                effects.push(Effect::Render);
                let commands = self.controller.annotations_done(running);
                self.apply(commands, &mut effects);
            }
            Event::FieldFetched(key, result) => {
                self.tree.field_loaded(&key, result.map_err(|e| e.to_string()));
                effects.push(Effect::Render);
            }
            Event::User(UserAction::Tree(action)) => {
                if let Some(key) = self.tree.dispatch(&self.store, action) {
                    effects.push(Effect::FetchField(key));
                }
                effects.push(Effect::Render);
            }
            Event::User(UserAction::StopPolling) => {
                let commands = self.controller.stop();
                self.apply(commands, &mut effects);
                effects.push(Effect::Render);
            }
            Event::User(UserAction::Quit) => effects.push(Effect::Quit),
        }
        effects
    }

    fn ingest_summary(&mut self, result: Result<String, FetchError>) {
        let ingested = result
            .map_err(|e| e.to_string())
            .and_then(|payload| self.store.ingest_json(&payload).map_err(|e| e.to_string()));
        match ingested {
            Ok(report) => {
                if report.changed {
                    tracing::debug!(accepted = report.accepted, "summary updated");
                }
                self.rejected = report.rejected;
                self.summary_error = None;
                self.tree.sync(&self.store);
            }
            Err(message) => {
                tracing::warn!(%message, "summary unavailable, keeping last results");
                self.summary_error = Some(message);
            }
        }
    }

    /// Returns the run status, or `None` when the document is unusable
    fn ingest_annotations(&mut self, result: Result<String, FetchError>) -> Option<bool> {
        let parsed = result
            .map_err(|e| e.to_string())
            .and_then(|payload| AnnotationTable::from_json(&payload).map_err(|e| e.to_string()));
        match parsed {
            Ok(table) => {
                let running = table.is_running;
                self.annotations = Some(table);
                self.annotations_error = None;
                Some(running)
            }
            Err(message) => {
                tracing::warn!(%message, "annotations unavailable, keeping last values");
                self.annotations_error = Some(message);
                None
            }
        }
    }

    fn apply(&mut self, commands: Vec<PollCommand>, effects: &mut Vec<Effect>) {
        for command in commands {
            match command {
                PollCommand::FetchCycle => {
                    effects.push(Effect::FetchSummary);
                    effects.push(Effect::FetchAnnotations);
                }
                PollCommand::Schedule(delay) => effects.push(Effect::Schedule(delay)),
                PollCommand::CancelScheduled => effects.push(Effect::CancelScheduled),
                PollCommand::RunFinished => {}
                PollCommand::HideStopControl => self.stop_control_visible = false,
            }
        }
    }

    /// End polling without a final fetch. The page keeps the run status but
    /// loses the refresh and the stop control.
    pub fn halt_polling(&mut self) {
        self.controller.halt();
        self.stop_control_visible = false;
    }

    /// Render the full page for the current state
    pub fn render_page(&mut self) -> String {
        let summary = SummaryTable::from_store(&self.store);
        let results = self.tree.render(&self.store);
        let annotations = self
            .annotations
            .as_ref()
            .map(AnnotationTable::to_html)
            .unwrap_or_default();
        let mut notices: Vec<String> = self
            .errors()
            .into_iter()
            .map(|e| format!("fetch failed: {}", e))
            .collect();
        if !self.rejected.is_empty() {
            notices.push(format!(
                "{} summary record(s) skipped as malformed",
                self.rejected.len()
            ));
        }

        let model = PageModel {
            title: &self.title,
            running: self.controller.is_running(),
            polling: self.controller.is_polling(),
            show_stop_control: self.stop_control_visible && self.controller.is_polling(),
            refresh_secs: self.controller.interval().as_secs().max(1),
            summary_html: &summary.to_html(),
            results_html: &results,
            annotations_html: &annotations,
            notices: &notices,
            bundle_base: self.bundle_base.as_deref(),
        };
        HtmlReporter::new().page(&model)
    }
}

/// Perform a fetch effect, returning its completion event
fn perform_fetch(source: &dyn ReportSource, effect: &Effect) -> Option<Event> {
    match effect {
        Effect::FetchSummary => Some(Event::SummaryFetched(source.summary())),
        Effect::FetchAnnotations => Some(Event::AnnotationsFetched(source.annotations())),
        Effect::FetchField(key) => Some(Event::FieldFetched(key.clone(), source.field(key))),
        _ => None,
    }
}

/// Start the session and perform its first cycle, ignoring scheduling
fn run_first_cycle(session: &mut Session, source: &dyn ReportSource) {
    let mut queue = VecDeque::from([Event::Start]);
    while let Some(event) = queue.pop_front() {
        for effect in session.handle(event) {
            queue.extend(perform_fetch(source, &effect));
        }
    }
}

/// Run exactly one fetch cycle; the session is left stopped
pub fn run_single_cycle(session: &mut Session, source: &dyn ReportSource) {
    run_first_cycle(session, source);
    session.halt_polling();
}

/// Drive a session until the user quits, or until polling has ended and no
/// more user input can arrive. `on_render` receives every rendered page.
pub fn run_session<F>(
    session: &mut Session,
    source: &dyn ReportSource,
    actions: &Receiver<UserAction>,
    mut on_render: F,
) -> std::io::Result<()>
where
    F: FnMut(&str) -> std::io::Result<()>,
{
    let mut queue = VecDeque::from([Event::Start]);
    let mut deadline: Option<Instant> = None;
    let mut input_open = true;

    loop {
        while let Some(event) = queue.pop_front() {
            let mut render = false;
            for effect in session.handle(event) {
                match effect {
                    Effect::Schedule(delay) => {
                        let now = Instant::now();
                        deadline = Some(
                            now.checked_add(delay)
                                .unwrap_or_else(|| now + MAX_POLL_INTERVAL),
                        );
                    }
                    Effect::CancelScheduled => deadline = None,
                    Effect::Render => render = true,
                    Effect::Quit => return Ok(()),
                    fetch => queue.extend(perform_fetch(source, &fetch)),
                }
            }
            if render {
                on_render(&session.render_page())?;
            }
        }

        let waited = match (deadline, input_open) {
            (None, false) => return Ok(()),
            (Some(at), false) => {
                std::thread::sleep(at.saturating_duration_since(Instant::now()));
                Err(RecvTimeoutError::Timeout)
            }
            (Some(at), true) => actions.recv_timeout(at.saturating_duration_since(Instant::now())),
            (None, true) => actions.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match waited {
            Ok(action) => queue.push_back(Event::User(action)),
            Err(RecvTimeoutError::Timeout) => {
                deadline = None;
                queue.push_back(Event::TimerFired);
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("command input closed");
                input_open = false;
            }
        }
    }
}
