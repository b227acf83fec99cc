//! Reconciles the denormalised `likeCount`/`commentCount` counters on screams.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::{
    errors::RepoError,
    store::{Collection, Document, Fields, Query, Store},
};

const COUNTERS: [(&str, Collection); 2] = [("likeCount", Collection::Likes), ("commentCount", Collection::Comments)];

/// One counter that disagreed with the documents it summarises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterCorrection {
    pub scream_id: String,
    pub field: &'static str,
    pub stored: i64,
    pub actual: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub scanned: usize,
    pub corrections: Vec<CounterCorrection>,
    /// Screams whose counters changed or which were deleted between the scan and
    /// the write; left for the next run.
    pub skipped: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Counter rewrite for one scream, guarded by the values the scan saw.
#[derive(Debug)]
struct PlannedFix {
    scream_id: String,
    expected: Fields,
    patch: Fields,
    corrections: Vec<CounterCorrection>,
}

fn tally(docs: &[Document]) -> HashMap<&str, i64> {
    let mut counts = HashMap::new();
    for doc in docs {
        if let Some(scream_id) = doc.get_str("screamId") {
            *counts.entry(scream_id).or_insert(0) += 1;
        }
    }
    counts
}

async fn plan(store: &Store) -> Result<(usize, Vec<PlannedFix>), RepoError> {
    let screams = store.query(&Query::new(Collection::Screams)).await?;
    let mut sources = Vec::with_capacity(COUNTERS.len());
    for (field, collection) in COUNTERS {
        sources.push((field, store.query(&Query::new(collection)).await?));
    }
    let tallies: Vec<(&'static str, HashMap<&str, i64>)> =
        sources.iter().map(|(field, docs)| (*field, tally(docs))).collect();

    let mut fixes = Vec::new();
    for scream in &screams {
        let mut fix = PlannedFix {
            scream_id: scream.id.clone(),
            expected: Fields::new(),
            patch: Fields::new(),
            corrections: Vec::new(),
        };
        for (field, counts) in &tallies {
            let stored = scream.get_i64(field).unwrap_or(0);
            let actual = counts.get(scream.id.as_str()).copied().unwrap_or(0);
            if stored != actual {
                let held = scream.fields.get(*field).cloned().unwrap_or(Value::Null);
                fix.expected.insert((*field).to_string(), held);
                fix.patch.insert((*field).to_string(), Value::from(actual));
                fix.corrections.push(CounterCorrection {
                    scream_id: scream.id.clone(),
                    field: *field,
                    stored,
                    actual,
                });
            }
        }
        if !fix.patch.is_empty() {
            fixes.push(fix);
        }
    }
    Ok((screams.len(), fixes))
}

/// Writes each fix only while the scream still holds the counters that were
/// scanned, so a concurrent like or comment is never overwritten.
async fn apply(store: &Store, scanned: usize, fixes: Vec<PlannedFix>) -> Result<RepairReport, RepoError> {
    let mut report = RepairReport {
        scanned,
        ..RepairReport::default()
    };
    for fix in fixes {
        match store
            .update_if(Collection::Screams, &fix.scream_id, fix.expected, fix.patch)
            .await
        {
            Ok(true) => report.corrections.extend(fix.corrections),
            Ok(false) | Err(RepoError::NotFound { .. }) => {
                tracing::debug!(scream_id = %fix.scream_id, "scream changed during repair; skipped");
                report.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }
    tracing::info!(
        scanned = report.scanned,
        corrected = report.corrections.len(),
        skipped = report.skipped,
        "counter repair finished"
    );
    Ok(report)
}

/// Recounts likes and comments for every scream and rewrites the counters that
/// drifted.
pub async fn repair_counters(store: &Store) -> Result<RepairReport, RepoError> {
    let (scanned, fixes) = plan(store).await?;
    apply(store, scanned, fixes).await
}
