//! Foldable per-test result tree with lazily loaded field content
//!
//! Fold state and field content are keyed by test id / field name and are
//! only ever added to, so a re-ingested store re-renders with the same nodes
//! expanded and the same content loaded. Every user interaction goes through
//! [`ResultTree::dispatch`], which returns the field fetch to issue, if any.

use crate::store::ResultStore;
use crate::{escape_html, FieldKey, TestRecord};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;

/// Which ids the tree shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Failures, errors and untested (passes hidden)
    #[default]
    NotPassed,
    All,
}

/// Lifecycle of one field document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldContent {
    #[default]
    NotLoaded,
    Loading,
    Loaded(String),
    /// Fetch failed; the next expansion retries
    Failed(String),
}

/// Presentational state of a node, derived from fold flag and content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Collapsed,
    Expanded,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Default)]
struct FieldNode {
    expanded: bool,
    content: FieldContent,
}

impl FieldNode {
    fn state(&self) -> NodeState {
        if !self.expanded {
            return NodeState::Collapsed;
        }
        match self.content {
            FieldContent::NotLoaded => NodeState::Expanded,
            FieldContent::Loading => NodeState::Loading,
            FieldContent::Loaded(_) => NodeState::Loaded,
            FieldContent::Failed(_) => NodeState::Failed,
        }
    }
}

/// A node addressed by a user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Test(String),
    Field(FieldKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeAction {
    Expand(NodeRef),
    Collapse(NodeRef),
    Toggle(NodeRef),
    CollapseAll,
    SetScope(Scope),
}

/// Field selection and ordering
#[derive(Debug, Clone)]
pub struct TreeOptions {
    ignore: GlobSet,
    field_order: Vec<String>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            ignore: GlobSet::empty(),
            field_order: Vec::new(),
        }
    }
}

impl TreeOptions {
    /// `ignore_fields` entries are glob patterns; a plain name matches itself
    pub fn new(ignore_fields: &[String], field_order: &[String]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in ignore_fields {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            ignore: builder.build()?,
            field_order: field_order.to_vec(),
        })
    }

    pub fn is_ignored(&self, field: &str) -> bool {
        self.ignore.is_match(field)
    }

    /// Configured fields first (when present), then the rest in record order
    pub fn ordered_fields<'a>(&self, fields: &'a [String]) -> Vec<&'a str> {
        let mut out: Vec<&str> = Vec::with_capacity(fields.len());
        for wanted in &self.field_order {
            if let Some(f) = fields.iter().find(|f| *f == wanted) {
                if !self.is_ignored(f) && !out.contains(&f.as_str()) {
                    out.push(f);
                }
            }
        }
        for f in fields {
            if !self.is_ignored(f) && !out.contains(&f.as_str()) {
                out.push(f);
            }
        }
        out
    }
}

/// Hierarchical view of test outcomes; owns fold state and the field cache
#[derive(Debug, Default)]
pub struct ResultTree {
    options: TreeOptions,
    scope: Scope,
    tests: HashMap<String, bool>,
    fields: HashMap<FieldKey, FieldNode>,
}

impl ResultTree {
    pub fn new(options: TreeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn ids_to_show<'a>(&self, store: &'a ResultStore) -> &'a [String] {
        match self.scope {
            Scope::NotPassed => store.not_passed_ids(),
            Scope::All => store.all_ids(),
        }
    }

    fn shown_record<'a>(&self, store: &'a ResultStore, id: &str) -> Option<&'a TestRecord> {
        self.ids_to_show(store)
            .iter()
            .any(|shown| shown == id)
            .then(|| store.get(id))
            .flatten()
    }

    fn field_known(&self, store: &ResultStore, key: &FieldKey) -> bool {
        self.shown_record(store, &key.test_id).is_some_and(|rec| {
            rec.fields.iter().any(|f| *f == key.field) && !self.options.is_ignored(&key.field)
        })
    }

    /// Register nodes for everything currently shown; existing state is kept
    pub fn sync(&mut self, store: &ResultStore) {
        for id in self.ids_to_show(store) {
            let Some(rec) = store.get(id) else { continue };
            self.tests.entry(id.clone()).or_insert(false);
            for field in self.options.ordered_fields(&rec.fields) {
                self.fields.entry(FieldKey::new(id.as_str(), field)).or_default();
            }
        }
    }

    /// Apply a user action. Returns the field document to fetch, if the
    /// action started a load.
    pub fn dispatch(&mut self, store: &ResultStore, action: TreeAction) -> Option<FieldKey> {
        match action {
            TreeAction::SetScope(scope) => {
                self.scope = scope;
                self.sync(store);
                None
            }
            TreeAction::CollapseAll => {
                self.tests.values_mut().for_each(|e| *e = false);
                self.fields.values_mut().for_each(|n| n.expanded = false);
                None
            }
            TreeAction::Expand(node) => self.set_expanded(store, node, Some(true)),
            TreeAction::Collapse(node) => self.set_expanded(store, node, Some(false)),
            TreeAction::Toggle(node) => self.set_expanded(store, node, None),
        }
    }

    fn set_expanded(
        &mut self,
        store: &ResultStore,
        node: NodeRef,
        expand: Option<bool>,
    ) -> Option<FieldKey> {
        match node {
            NodeRef::Test(id) => {
                if self.shown_record(store, &id).is_none() {
                    tracing::debug!(%id, "ignoring action on test not shown");
                    return None;
                }
                let entry = self.tests.entry(id).or_insert(false);
                *entry = expand.unwrap_or(!*entry);
                None
            }
            NodeRef::Field(key) => {
                if !self.field_known(store, &key) {
                    tracing::debug!(%key, "ignoring action on unknown field");
                    return None;
                }
                let node = self.fields.entry(key.clone()).or_default();
                let expanded = expand.unwrap_or(!node.expanded);
                node.expanded = expanded;
                if !expanded {
                    return None;
                }
                // a field is only reachable through its (now open) test node
                self.tests.insert(key.test_id.clone(), true);
                match node.content {
                    FieldContent::NotLoaded | FieldContent::Failed(_) => {
                        node.content = FieldContent::Loading;
                        Some(key)
                    }
                    FieldContent::Loading | FieldContent::Loaded(_) => None,
                }
            }
        }
    }

    /// Record the result of a field fetch started by [`dispatch`](Self::dispatch)
    pub fn field_loaded(&mut self, key: &FieldKey, result: Result<String, String>) {
        match self.fields.get_mut(key) {
            Some(node) if node.content == FieldContent::Loading => {
                node.content = match result {
                    Ok(body) => FieldContent::Loaded(body),
                    Err(err) => {
                        tracing::warn!(%key, %err, "field fetch failed");
                        FieldContent::Failed(err)
                    }
                };
            }
            _ => tracing::debug!(%key, "dropping unexpected field result"),
        }
    }

    pub fn is_expanded(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Test(id) => self.tests.get(id).copied().unwrap_or(false),
            NodeRef::Field(key) => self.fields.get(key).is_some_and(|n| n.expanded),
        }
    }

    pub fn node_state(&self, node: &NodeRef) -> NodeState {
        match node {
            NodeRef::Test(_) if self.is_expanded(node) => NodeState::Expanded,
            NodeRef::Test(_) => NodeState::Collapsed,
            NodeRef::Field(key) => self
                .fields
                .get(key)
                .map(FieldNode::state)
                .unwrap_or(NodeState::Collapsed),
        }
    }

    pub fn content(&self, key: &FieldKey) -> Option<&FieldContent> {
        self.fields.get(key).map(|n| &n.content)
    }

    /// Render the tree for the current scope as an HTML fragment
    pub fn render(&mut self, store: &ResultStore) -> String {
        self.sync(store);
        let ids = self.ids_to_show(store);
        let mut html = format!(
            "<p class=\"scope\">Showing {} of {} tests{}</p>\n",
            ids.len(),
            store.all_ids().len(),
            match self.scope {
                Scope::NotPassed => " (not passed)",
                Scope::All => "",
            }
        );
        if ids.is_empty() {
            html.push_str("<p class=\"empty\">Nothing to show.</p>\n");
            return html;
        }

        html.push_str("<ul class=\"results\">\n");
        for id in ids {
            if let Some(rec) = store.get(id) {
                self.render_test(&mut html, rec);
            }
        }
        html.push_str("</ul>\n");
        html
    }

    fn render_test(&self, html: &mut String, rec: &TestRecord) {
        let open = self.tests.get(&rec.id).copied().unwrap_or(false);
        let id = escape_html(&rec.id);
        let title = rec
            .cause
            .as_deref()
            .map(|c| format!(" title=\"{}\"", escape_html(c)))
            .unwrap_or_default();
        html.push_str(&format!(
            "<li class=\"test {fold} outcome-{cls}\" data-node=\"{id}\"{title}><span class=\"label\"><span class=\"tag {cls}\">{outcome}</span> {id}</span>",
            fold = if open { "expanded" } else { "collapsed" },
            cls = rec.outcome.css_class(),
            outcome = rec.outcome,
        ));
        if let Some(cause) = &rec.cause {
            html.push_str(&format!(" <span class=\"cause\">{}</span>", escape_html(cause)));
        }

        let fields = self.options.ordered_fields(&rec.fields);
        if !fields.is_empty() {
            html.push_str("\n<ul class=\"fields\">\n");
            for field in fields {
                let key = FieldKey::new(rec.id.as_str(), field);
                let node = self.fields.get(&key).cloned().unwrap_or_default();
                self.render_field(html, &key, &node);
            }
            html.push_str("</ul>\n");
        }
        html.push_str("</li>\n");
    }

    fn render_field(&self, html: &mut String, key: &FieldKey, node: &FieldNode) {
        let status = match node.content {
            FieldContent::NotLoaded => "not-loaded",
            FieldContent::Loading => "loading",
            FieldContent::Loaded(_) => "loaded",
            FieldContent::Failed(_) => "failed",
        };
        html.push_str(&format!(
            "<li class=\"field {} {}\" data-node=\"{}\"><span class=\"label\">{}</span>",
            if node.expanded { "expanded" } else { "collapsed" },
            status,
            escape_html(&key.path()),
            escape_html(&key.field),
        ));
        match &node.content {
            FieldContent::NotLoaded => {}
            FieldContent::Loading => {
                html.push_str("<div class=\"content loading\">loading&hellip;</div>")
            }
            FieldContent::Loaded(body) => {
                html.push_str("<div class=\"content\">");
                html.push_str(body);
                html.push_str("</div>");
            }
            FieldContent::Failed(err) => html.push_str(&format!(
                "<div class=\"content failed\">failed to load: {} (expand again to retry)</div>",
                escape_html(err)
            )),
        }
        html.push_str("</li>\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RawRecord;

    fn scenario_store() -> ResultStore {
        let mut store = ResultStore::new();
        store.ingest(&[
            RawRecord::new("t1", "PASS").with_fields(&["log"]),
            RawRecord::new("t2", "FAIL")
                .with_cause("boom")
                .with_fields(&["log"]),
        ]);
        store
    }

    fn field(id: &str, name: &str) -> NodeRef {
        NodeRef::Field(FieldKey::new(id, name))
    }

    #[test]
    fn test_default_scope_shows_not_passed() {
        let store = scenario_store();
        let mut tree = ResultTree::default();
        let html = tree.render(&store);
        assert!(html.contains("data-node=\"t2\""));
        assert!(!html.contains("data-node=\"t1\""));
        assert!(html.contains("<span class=\"cause\">boom</span>"));
        assert!(html.contains("title=\"boom\""));
        assert!(html.contains("class=\"field collapsed not-loaded\" data-node=\"t2/log\""));
        assert_eq!(
            tree.content(&FieldKey::new("t2", "log")),
            Some(&FieldContent::NotLoaded)
        );
    }

    #[test]
    fn test_expand_field_fetches_at_most_once() {
        let store = scenario_store();
        let mut tree = ResultTree::default();
        tree.sync(&store);

        let fetch = tree.dispatch(&store, TreeAction::Expand(field("t2", "log")));
        assert_eq!(fetch, Some(FieldKey::new("t2", "log")));
        assert_eq!(tree.node_state(&field("t2", "log")), NodeState::Loading);
        assert!(tree.is_expanded(&NodeRef::Test("t2".into())));

        // still loading: the loading state de-duplicates
        assert_eq!(tree.dispatch(&store, TreeAction::Expand(field("t2", "log"))), None);

        tree.field_loaded(&FieldKey::new("t2", "log"), Ok("<pre>out</pre>".into()));
        assert_eq!(tree.node_state(&field("t2", "log")), NodeState::Loaded);

        assert_eq!(tree.dispatch(&store, TreeAction::Toggle(field("t2", "log"))), None);
        assert_eq!(tree.node_state(&field("t2", "log")), NodeState::Collapsed);
        assert_eq!(tree.dispatch(&store, TreeAction::Toggle(field("t2", "log"))), None);
        assert_eq!(tree.node_state(&field("t2", "log")), NodeState::Loaded);
    }

    #[test]
    fn test_failed_fetch_is_visible_and_retryable() {
        let store = scenario_store();
        let mut tree = ResultTree::default();
        let key = FieldKey::new("t2", "log");

        assert!(tree.dispatch(&store, TreeAction::Expand(field("t2", "log"))).is_some());
        tree.field_loaded(&key, Err("404 Not Found".into()));
        assert_eq!(tree.node_state(&field("t2", "log")), NodeState::Failed);
        let html = tree.render(&store);
        assert!(html.contains("failed to load: 404 Not Found"));

        // collapse then expand again retries
        assert_eq!(tree.dispatch(&store, TreeAction::Collapse(field("t2", "log"))), None);
        assert_eq!(
            tree.dispatch(&store, TreeAction::Expand(field("t2", "log"))),
            Some(key.clone())
        );
        tree.field_loaded(&key, Ok("ok".into()));
        assert_eq!(tree.content(&key), Some(&FieldContent::Loaded("ok".into())));
    }

    #[test]
    fn test_failed_field_does_not_block_other_nodes() {
        let mut store = ResultStore::new();
        store.ingest(&[RawRecord::new("a", "ERROR").with_fields(&["x", "y"])]);
        let mut tree = ResultTree::default();
        tree.dispatch(&store, TreeAction::Expand(field("a", "x")));
        tree.field_loaded(&FieldKey::new("a", "x"), Err("boom".into()));

        assert!(tree.dispatch(&store, TreeAction::Expand(field("a", "y"))).is_some());
        tree.dispatch(&store, TreeAction::Collapse(NodeRef::Test("a".into())));
        assert!(!tree.is_expanded(&NodeRef::Test("a".into())));
    }

    #[test]
    fn test_collapse_all_keeps_content() {
        let store = scenario_store();
        let mut tree = ResultTree::default();
        let key = FieldKey::new("t2", "log");
        tree.dispatch(&store, TreeAction::Expand(field("t2", "log")));
        tree.field_loaded(&key, Ok("body".into()));

        tree.dispatch(&store, TreeAction::CollapseAll);
        assert!(!tree.is_expanded(&NodeRef::Test("t2".into())));
        assert!(!tree.is_expanded(&field("t2", "log")));
        assert_eq!(tree.content(&key), Some(&FieldContent::Loaded("body".into())));
    }

    #[test]
    fn test_rerender_after_reingest_preserves_state() {
        let mut store = scenario_store();
        let mut tree = ResultTree::default();
        let key = FieldKey::new("t2", "log");
        tree.dispatch(&store, TreeAction::Expand(field("t2", "log")));
        tree.field_loaded(&key, Ok("cached".into()));

        store.ingest(&[
            RawRecord::new("t1", "PASS").with_fields(&["log"]),
            RawRecord::new("t2", "FAIL")
                .with_cause("boom")
                .with_fields(&["log"]),
        ]);
        let html = tree.render(&store);
        assert!(html.contains("class=\"test expanded outcome-fail\""));
        assert!(html.contains("<div class=\"content\">cached</div>"));
        assert_eq!(tree.dispatch(&store, TreeAction::Expand(field("t2", "log"))), None);
    }

    #[test]
    fn test_show_all_reuses_cached_content() {
        let store = scenario_store();
        let mut tree = ResultTree::default();
        let key = FieldKey::new("t2", "log");
        tree.dispatch(&store, TreeAction::Expand(field("t2", "log")));
        tree.field_loaded(&key, Ok("cached".into()));

        // passes are not addressable until shown
        assert_eq!(tree.dispatch(&store, TreeAction::Expand(field("t1", "log"))), None);

        tree.dispatch(&store, TreeAction::SetScope(Scope::All));
        assert_eq!(tree.ids_to_show(&store), ["t1", "t2"]);
        assert_eq!(tree.dispatch(&store, TreeAction::Expand(field("t2", "log"))), None);
        assert_eq!(
            tree.dispatch(&store, TreeAction::Expand(field("t1", "log"))),
            Some(FieldKey::new("t1", "log"))
        );
        let html = tree.render(&store);
        assert!(html.contains("Showing 2 of 2 tests"));
        assert!(html.contains("cached"));
    }

    #[test]
    fn test_field_order_and_ignore() {
        let options = TreeOptions::new(
            &["qmtest.start_time".to_string(), "debug.*".to_string()],
            &["qmtest.cause".to_string(), "missing".to_string()],
        )
        .unwrap();
        let fields: Vec<String> = ["ExecTest.stdout", "debug.env", "qmtest.start_time", "qmtest.cause"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            options.ordered_fields(&fields),
            vec!["qmtest.cause", "ExecTest.stdout"]
        );

        let mut store = ResultStore::new();
        store.ingest(&[RawRecord {
            id: Some("a".into()),
            outcome: Some("FAIL".into()),
            cause: None,
            fields: fields.clone(),
        }]);
        let mut tree = ResultTree::new(options);
        assert_eq!(
            tree.dispatch(&store, TreeAction::Expand(field("a", "debug.env"))),
            None
        );
        let html = tree.render(&store);
        assert!(!html.contains("debug.env"));
        assert!(html.find("qmtest.cause").unwrap() < html.find("ExecTest.stdout").unwrap());
    }

    #[test]
    fn test_invalid_glob_rejected() {
        assert!(TreeOptions::new(&["a[".to_string()], &[]).is_err());
    }

    #[test]
    fn test_unexpected_field_result_ignored() {
        let store = scenario_store();
        let mut tree = ResultTree::default();
        tree.sync(&store);
        let key = FieldKey::new("t2", "log");
        tree.field_loaded(&key, Ok("stray".into()));
        assert_eq!(tree.content(&key), Some(&FieldContent::NotLoaded));
    }

    #[test]
    fn test_empty_scope_renders_placeholder() {
        let mut store = ResultStore::new();
        store.ingest(&[RawRecord::new("ok", "PASS")]);
        let html = ResultTree::default().render(&store);
        assert!(html.contains("Showing 0 of 1 tests"));
        assert!(html.contains("Nothing to show."));
    }
}
