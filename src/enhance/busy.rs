//! Busy state for in-flight enhancement calls.
//!
//! Busy state is keyed by template row so a long call on one row never
//! blocks another. Each call holds a [`BusyGuard`]; dropping the guard clears
//! the state on every exit path, including early returns and panics.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::metrics::MetricsCollector;

/// Independent group of templates sharing one busy indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateRow {
    /// standard, pipeline
    Core,
    /// longform, narrative, wildcard
    Extended,
    /// custom1..3 and any other id
    Custom,
}

impl TemplateRow {
    pub fn for_template(template_id: &str) -> Self {
        match template_id {
            "standard" | "pipeline" => TemplateRow::Core,
            "longform" | "narrative" | "wildcard" => TemplateRow::Extended,
            _ => TemplateRow::Custom,
        }
    }

    pub fn all() -> [TemplateRow; 3] {
        [TemplateRow::Core, TemplateRow::Extended, TemplateRow::Custom]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateRow::Core => "core",
            TemplateRow::Extended => "extended",
            TemplateRow::Custom => "custom",
        }
    }
}

/// Point-in-time view of every row plus the legacy combined flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusySnapshot {
    pub rows: BTreeMap<TemplateRow, bool>,
    /// True while any row is busy.
    pub any: bool,
}

/// Tracks in-flight calls per template row.
#[derive(Debug, Clone, Default)]
pub struct BusyTracker {
    in_flight: Arc<Mutex<BTreeMap<TemplateRow, usize>>>,
    metrics: MetricsCollector,
}

impl BusyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a row busy until the returned guard is dropped.
    pub fn begin(&self, row: TemplateRow) -> BusyGuard {
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            *in_flight.entry(row).or_insert(0) += 1;
        }
        self.metrics.enhancement_started(row.as_str());

        BusyGuard {
            tracker: self.clone(),
            row,
        }
    }

    pub fn is_busy(&self, row: TemplateRow) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&row)
            .is_some_and(|count| *count > 0)
    }

    /// Legacy combined flag: any row busy.
    pub fn any_busy(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|count| *count > 0)
    }

    pub fn snapshot(&self) -> BusySnapshot {
        let in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let rows: BTreeMap<TemplateRow, bool> = TemplateRow::all()
            .into_iter()
            .map(|row| (row, in_flight.get(&row).is_some_and(|count| *count > 0)))
            .collect();
        let any = rows.values().any(|busy| *busy);
        BusySnapshot { rows, any }
    }

    fn finish(&self, row: TemplateRow) {
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(count) = in_flight.get_mut(&row) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    in_flight.remove(&row);
                }
            }
        }
        self.metrics.enhancement_finished(row.as_str());
    }
}

/// Clears one unit of busy state for its row when dropped.
#[derive(Debug)]
pub struct BusyGuard {
    tracker: BusyTracker,
    row: TemplateRow,
}

impl BusyGuard {
    pub fn row(&self) -> TemplateRow {
        self.row
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.tracker.finish(self.row);
    }
}
