//! Run metadata table
//!
//! The two reserved timestamp keys always come first; every other key keeps
//! its document order. An empty or missing end time means the run is active.

use crate::{escape_html, ReportError, END_TIME_KEY, START_TIME_KEY};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// How a single annotation value is displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AnnotationCell {
    Text(String),
    List(Vec<String>),
    /// End time still unset
    Running,
    /// Missing or empty value
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationRow {
    pub key: String,
    pub cell: AnnotationCell,
}

/// Ordered annotation rows plus the derived run status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationTable {
    pub rows: Vec<AnnotationRow>,
    pub is_running: bool,
}

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell_for(key: &str, value: Option<&Value>) -> AnnotationCell {
    if is_empty_value(value) {
        return if key == END_TIME_KEY {
            AnnotationCell::Running
        } else {
            AnnotationCell::None
        };
    }
    match value {
        Some(Value::Array(items)) => AnnotationCell::List(items.iter().map(scalar_text).collect()),
        Some(v) => AnnotationCell::Text(scalar_text(v)),
        None => AnnotationCell::None,
    }
}

impl AnnotationTable {
    pub fn from_map(annotations: &Map<String, Value>) -> Self {
        let mut rows = Vec::with_capacity(annotations.len() + 2);
        for key in [START_TIME_KEY, END_TIME_KEY] {
            rows.push(AnnotationRow {
                key: key.to_string(),
                cell: cell_for(key, annotations.get(key)),
            });
        }
        for (key, value) in annotations {
            if key == START_TIME_KEY || key == END_TIME_KEY {
                continue;
            }
            rows.push(AnnotationRow {
                key: key.clone(),
                cell: cell_for(key, Some(value)),
            });
        }
        Self {
            rows,
            is_running: is_empty_value(annotations.get(END_TIME_KEY)),
        }
    }

    /// Parse an `annotations.json` payload
    pub fn from_json(payload: &str) -> Result<Self, ReportError> {
        let value: Value = serde_json::from_str(payload).map_err(|source| ReportError::Json {
            document: "annotations.json",
            source,
        })?;
        match value {
            Value::Object(map) => Ok(Self::from_map(&map)),
            _ => Err(ReportError::Shape {
                document: "annotations.json",
                expected: "object",
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AnnotationCell> {
        self.rows.iter().find(|r| r.key == key).map(|r| &r.cell)
    }

    /// Elapsed run time, when both reserved timestamps parse
    pub fn duration(&self) -> Option<chrono::Duration> {
        let stamp = |key: &str| match self.get(key) {
            Some(AnnotationCell::Text(s)) => parse_timestamp(s),
            _ => None,
        };
        let (start, end) = (stamp(START_TIME_KEY)?, stamp(END_TIME_KEY)?);
        (end >= start).then(|| end - start)
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<table class=\"annotations\">\n");
        for row in &self.rows {
            let value = match &row.cell {
                AnnotationCell::Text(s) => escape_html(s),
                AnnotationCell::List(items) => {
                    let mut ul = String::from("<ul>");
                    for item in items {
                        ul.push_str(&format!("<li>{}</li>", escape_html(item)));
                    }
                    ul.push_str("</ul>");
                    ul
                }
                AnnotationCell::Running => "<span class=\"running\">running</span>".to_string(),
                AnnotationCell::None => "<span class=\"none\">none</span>".to_string(),
            };
            html.push_str(&format!(
                "<tr><th>{}</th><td>{}</td></tr>\n",
                escape_html(&row.key),
                value
            ));
        }
        html.push_str("</table>\n");
        html
    }
}

/// Accepts RFC 3339 and the bare `YYYY-MM-DDTHH:MM:SS` form (assumed UTC)
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
