//! Aggregate outcome table

use crate::store::ResultStore;
use crate::Outcome;
use serde::Serialize;

/// One non-empty outcome row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub outcome: Outcome,
    pub count: usize,
    /// `round(count / total * 100)`, ties away from zero
    pub percent: u32,
}

/// Total plus one row per outcome with a nonzero count, worst first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryTable {
    pub total: usize,
    pub rows: Vec<SummaryRow>,
}

pub fn percent(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as u32
}

impl SummaryTable {
    pub fn from_store(store: &ResultStore) -> Self {
        let counters = store.counters();
        let rows = Outcome::DISPLAY_ORDER
            .iter()
            .filter_map(|&outcome| {
                let count = counters.get(outcome);
                (count > 0).then(|| SummaryRow {
                    outcome,
                    count,
                    percent: percent(count, counters.total),
                })
            })
            .collect();
        Self {
            total: counters.total,
            rows,
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<table class=\"summary\">\n");
        html.push_str(&format!(
            "<tr class=\"total\"><th>total</th><td class=\"count\">{}</td><td></td></tr>\n",
            self.total
        ));
        for row in &self.rows {
            html.push_str(&format!(
                "<tr class=\"outcome-{cls}\"><th><span class=\"tag {cls}\">{name}</span></th><td class=\"count\">{count}</td><td class=\"pct\">{pct}%</td></tr>\n",
                cls = row.outcome.css_class(),
                name = row.outcome,
                count = row.count,
                pct = row.percent,
            ));
        }
        html.push_str("</table>\n");
        html
    }
}
