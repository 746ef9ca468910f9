//! Config schema and deserialization

use crate::poll::{DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL};
use crate::view::{Scope, TreeOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Field documents hidden from the tree unless the config says otherwise
pub const DEFAULT_IGNORE_FIELDS: [&str; 3] =
    ["qmtest.start_time", "qmtest.end_time", "qmtest.target"];

/// Fields listed first under each test, when present
pub const DEFAULT_FIELD_ORDER: [&str; 3] = ["qmtest.cause", "qmtest.exception", "qmtest.traceback"];

pub const DEFAULT_TITLE: &str = "Test Report";

/// Root config structure for .qmreportrc.json
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Extend another config file (path relative to this config)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Glob patterns for field names to leave out of the result tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_fields: Option<Vec<String>>,

    /// Field names shown first, in this order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_order: Option<Vec<String>>,

    /// Seconds between poll cycles while the run is in progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Start with passing tests shown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_all: Option<bool>,
}

impl Config {
    /// The file written by `qmreport init`: every key at its default
    pub fn template() -> Self {
        Self {
            extends: None,
            ignore_fields: Some(DEFAULT_IGNORE_FIELDS.iter().map(|s| s.to_string()).collect()),
            field_order: Some(DEFAULT_FIELD_ORDER.iter().map(|s| s.to_string()).collect()),
            poll_interval: Some(DEFAULT_POLL_INTERVAL.as_secs()),
            title: Some(DEFAULT_TITLE.to_string()),
            show_all: Some(false),
        }
    }

    /// Merge CLI overrides into config. CLI values take precedence.
    pub fn merge_with_cli(
        mut self,
        cli_interval: Option<u64>,
        cli_show_all: bool,
        cli_title: Option<&str>,
    ) -> Self {
        if cli_interval.is_some() {
            self.poll_interval = cli_interval;
        }
        if cli_show_all {
            self.show_all = Some(true);
        }
        if let Some(title) = cli_title {
            self.title = Some(title.to_string());
        }
        self
    }

    /// Merge another config into this one (for extends)
    pub fn merge_from(&mut self, base: Config) {
        if self.field_order.is_none() {
            self.field_order = base.field_order;
        }
        if self.poll_interval.is_none() {
            self.poll_interval = base.poll_interval;
        }
        if self.title.is_none() {
            self.title = base.title;
        }
        if self.show_all.is_none() {
            self.show_all = base.show_all;
        }

        // Ignore patterns accumulate, base first
        if let Some(mut fields) = base.ignore_fields {
            fields.extend(self.ignore_fields.take().unwrap_or_default());
            self.ignore_fields = Some(fields);
        }
    }

    pub fn ignore_fields(&self) -> Vec<String> {
        self.ignore_fields
            .clone()
            .unwrap_or_else(|| DEFAULT_IGNORE_FIELDS.iter().map(|s| s.to_string()).collect())
    }

    pub fn field_order(&self) -> Vec<String> {
        self.field_order
            .clone()
            .unwrap_or_else(|| DEFAULT_FIELD_ORDER.iter().map(|s| s.to_string()).collect())
    }

    /// Poll interval; zero is raised to one second, huge values capped at a day
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
            .map(|secs| Duration::from_secs(secs.max(1)).min(MAX_POLL_INTERVAL))
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    pub fn scope(&self) -> Scope {
        if self.show_all.unwrap_or(false) {
            Scope::All
        } else {
            Scope::NotPassed
        }
    }

    pub fn tree_options(&self) -> Result<TreeOptions, globset::Error> {
        TreeOptions::new(&self.ignore_fields(), &self.field_order())
    }
}
