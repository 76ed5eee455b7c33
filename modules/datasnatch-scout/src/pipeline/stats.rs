use std::collections::BTreeMap;

use datasnatch_graph::GraphStats;
use serde::Serialize;

/// Stats from a scan run. Failure counters are keyed by error kind so the
/// summary says why pages were lost, not just how many.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanStats {
    pub urls_requested: u32,
    /// Never started because the run was cancelled first.
    pub urls_not_scheduled: u32,
    pub pages_fetched: u32,
    pub fetch_failures: BTreeMap<String, u32>,
    pub parse_skips: BTreeMap<String, u32>,
    pub profiles_parsed: u32,
    pub by_strategy: BTreeMap<String, u32>,
    pub duplicates: u32,
    pub degraded: BTreeMap<String, u32>,
    pub profiles_scored: u32,
    pub profiles_unscored: u32,
    pub store_conflicts: u32,
    pub store_corruptions: u32,
    pub store_errors: u32,
    pub graph: Option<GraphStats>,
}

impl ScanStats {
    pub fn fetch_failed(&self) -> u32 {
        self.fetch_failures.values().sum()
    }

    pub fn parse_skipped(&self) -> u32 {
        self.parse_skips.values().sum()
    }

    pub(crate) fn bump(map: &mut BTreeMap<String, u32>, key: impl Into<String>) {
        *map.entry(key.into()).or_default() += 1;
    }
}

fn write_counts(
    f: &mut std::fmt::Formatter<'_>,
    counts: &BTreeMap<String, u32>,
) -> std::fmt::Result {
    for (key, n) in counts {
        writeln!(f, "  {key:<24} {n}")?;
    }
    Ok(())
}

impl std::fmt::Display for ScanStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Scan Run Complete ===")?;
        writeln!(f, "URLs requested:     {}", self.urls_requested)?;
        if self.urls_not_scheduled > 0 {
            writeln!(f, "URLs not scheduled: {}", self.urls_not_scheduled)?;
        }
        writeln!(f, "Pages fetched:      {}", self.pages_fetched)?;
        writeln!(f, "Fetch failures:     {}", self.fetch_failed())?;
        write_counts(f, &self.fetch_failures)?;
        writeln!(f, "Parse skips:        {}", self.parse_skipped())?;
        write_counts(f, &self.parse_skips)?;
        writeln!(f, "Profiles parsed:    {}", self.profiles_parsed)?;
        write_counts(f, &self.by_strategy)?;
        writeln!(f, "Duplicates:         {}", self.duplicates)?;
        writeln!(f, "Profiles scored:    {}", self.profiles_scored)?;
        writeln!(f, "Profiles unscored:  {}", self.profiles_unscored)?;
        if !self.degraded.is_empty() {
            writeln!(f, "\nDegraded enrichers:")?;
            write_counts(f, &self.degraded)?;
        }
        writeln!(f, "\nStore:")?;
        writeln!(f, "  Conflicts:   {}", self.store_conflicts)?;
        writeln!(f, "  Corruptions: {}", self.store_corruptions)?;
        writeln!(f, "  Errors:      {}", self.store_errors)?;
        if let Some(graph) = &self.graph {
            writeln!(f, "\nGraph: {graph}")?;
        }
        Ok(())
    }
}
