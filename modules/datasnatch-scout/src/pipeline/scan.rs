use std::sync::Arc;

use dashmap::DashSet;
use datasnatch_archive::{FetchEvent, Fetcher, Store, StoreOutcome};
use datasnatch_common::{
    FetchError, FetchTask, ParseError, ProfileId, ProfileRecord, ScoringError, SignalKind,
    StoreError,
};
use datasnatch_graph::{GraphBuilder, GraphStats};
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use super::stats::ScanStats;
use crate::enrichment::EnrichmentStage;
use crate::infra::run_log::{EventKind, RunLog};
use crate::parser::AdaptiveParser;
use crate::scoring::AuthenticityScorer;

/// Drives URLs through fetch → parse → enrich → score → store, then builds
/// the relationship graph over everything stored.
pub struct ScanPipeline {
    fetcher: Arc<Fetcher>,
    parser: Arc<AdaptiveParser>,
    enrichment: Arc<EnrichmentStage>,
    scorer: Arc<AuthenticityScorer>,
    store: Arc<Store>,
    graph: GraphBuilder,
    concurrency: usize,
    cancel: Option<watch::Receiver<bool>>,
    fetch_events: Option<mpsc::UnboundedReceiver<FetchEvent>>,
}

/// What became of one URL. Produced concurrently, consumed in arrival order.
enum UrlOutcome {
    FetchFailed {
        url: String,
        error: FetchError,
    },
    ParseSkipped {
        url: String,
        error: ParseError,
    },
    Duplicate {
        url: String,
        id: ProfileId,
    },
    Processed(Box<Processed>),
}

struct Processed {
    url: String,
    record: ProfileRecord,
    degraded: Vec<(SignalKind, String)>,
    score: Result<f64, ScoringError>,
    raw_write: Result<StoreOutcome, StoreError>,
    /// `None` when the scored write was skipped.
    scored_write: Option<Result<(), StoreError>>,
}

impl ScanPipeline {
    pub fn new(
        fetcher: Arc<Fetcher>,
        parser: Arc<AdaptiveParser>,
        enrichment: Arc<EnrichmentStage>,
        scorer: Arc<AuthenticityScorer>,
        store: Arc<Store>,
        graph: GraphBuilder,
    ) -> Self {
        let concurrency = fetcher.config().concurrency;
        Self {
            fetcher,
            parser,
            enrichment,
            scorer,
            store,
            graph,
            concurrency,
            cancel: None,
            fetch_events: None,
        }
    }

    /// Stop scheduling new URLs once the flag flips to `true`.
    pub fn with_cancel(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(rx);
        self
    }

    /// Terminal fetch events to copy into the run log.
    pub fn with_fetch_events(mut self, rx: mpsc::UnboundedReceiver<FetchEvent>) -> Self {
        self.fetch_events = Some(rx);
        self
    }

    /// Number of URLs processed at once. Defaults to the fetch ceiling.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub async fn run(&mut self, urls: Vec<String>, run_log: &mut RunLog) -> ScanStats {
        let mut stats = ScanStats {
            urls_requested: urls.len() as u32,
            ..Default::default()
        };
        let mut events = self.fetch_events.take();
        let this = &*self;
        let seen: DashSet<ProfileId> = DashSet::new();

        info!(urls = urls.len(), concurrency = this.concurrency, "Scan starting");

        let mut outcomes = stream::iter(urls)
            .take_while(|_| futures::future::ready(!this.is_cancelled()))
            .map(|url| this.process_url(url, &seen))
            .buffer_unordered(this.concurrency);

        let mut handled = 0u32;
        while let Some(outcome) = outcomes.next().await {
            handled += 1;
            drain_fetch_events(&mut events, run_log);
            record_outcome(outcome, &mut stats, run_log);
        }
        drop(outcomes);
        stats.urls_not_scheduled = stats.urls_requested - handled;
        if stats.urls_not_scheduled > 0 {
            warn!(skipped = stats.urls_not_scheduled, "Run cancelled before all URLs were scheduled");
        }

        this.rebuild_graph(&mut stats, run_log).await;
        drain_fetch_events(&mut events, run_log);
        self.fetch_events = events;

        info!(
            scored = stats.profiles_scored,
            unscored = stats.profiles_unscored,
            fetch_failed = stats.fetch_failed(),
            parse_skipped = stats.parse_skipped(),
            "Scan complete"
        );
        stats
    }

    async fn process_url(&self, url: String, seen: &DashSet<ProfileId>) -> UrlOutcome {
        let page = match self.fetcher.fetch(FetchTask::new(url.clone())).await {
            Ok(page) => page,
            Err(error) => return UrlOutcome::FetchFailed { url, error },
        };

        let mut record = match self.parser.parse(&page) {
            Ok(record) => record,
            Err(error) => return UrlOutcome::ParseSkipped { url, error },
        };
        drop(page);

        if !seen.insert(record.id.clone()) {
            return UrlOutcome::Duplicate {
                url,
                id: record.id,
            };
        }

        let raw_write = self.store.put_raw_profile(&record).await;
        let mut writable = true;
        if matches!(raw_write, Err(StoreError::WriteConflict { .. })) {
            // The stored listing wins; score that instead of this page's copy.
            match self.store.get_raw_profile(&record.id).await {
                Ok(Some(stored)) => record = stored,
                Ok(None) | Err(_) => writable = false,
            }
        }

        let report = self.enrichment.enrich(&mut record).await;
        let score = self.scorer.score_record(&mut record);
        let scored_write = if writable {
            Some(self.store.put_scored_profile(&record).await)
        } else {
            None
        };

        UrlOutcome::Processed(Box::new(Processed {
            url,
            record,
            degraded: report.degraded,
            score,
            raw_write,
            scored_write,
        }))
    }

    /// Batch step: the graph is derived from the full scored set in the
    /// store, never updated while workers are still writing.
    async fn rebuild_graph(&self, stats: &mut ScanStats, run_log: &mut RunLog) {
        let loaded = match self.store.load_scored_profiles().await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(error = %e, "Failed to load scored profiles for graph");
                stats.store_errors += 1;
                return;
            }
        };
        for corrupt in &loaded.corrupt {
            error!(error = %corrupt, "Corrupt scored profile skipped");
            stats.store_corruptions += 1;
        }

        let edges = self.graph.build(&loaded.records);
        let graph_stats = GraphStats::from_edges(loaded.records.len(), &edges);
        if let Err(e) = self.store.put_edges(&edges).await {
            error!(error = %e, "Failed to write edge list");
            stats.store_errors += 1;
        }
        info!(%graph_stats, "Relationship graph built");
        run_log.log(EventKind::GraphBuilt {
            profiles: loaded.records.len(),
            edges: edges.len(),
        });
        stats.graph = Some(graph_stats);
    }
}

fn drain_fetch_events(
    events: &mut Option<mpsc::UnboundedReceiver<FetchEvent>>,
    run_log: &mut RunLog,
) {
    let Some(rx) = events else {
        return;
    };
    while let Ok(event) = rx.try_recv() {
        run_log.log(match event {
            FetchEvent::Succeeded {
                url,
                attempts,
                status,
                bytes,
            } => EventKind::FetchSucceeded {
                url,
                attempts,
                status,
                bytes,
            },
            FetchEvent::Failed {
                url,
                attempts,
                error,
            } => EventKind::FetchFailed {
                url,
                attempts,
                error: error.to_string(),
            },
        });
    }
}

fn record_outcome(outcome: UrlOutcome, stats: &mut ScanStats, run_log: &mut RunLog) {
    match outcome {
        UrlOutcome::FetchFailed { url, error } => {
            warn!(url = url.as_str(), error = %error, "Fetch failed, page skipped");
            ScanStats::bump(&mut stats.fetch_failures, error.kind());
        }
        UrlOutcome::ParseSkipped { url, error } => {
            stats.pages_fetched += 1;
            warn!(url = url.as_str(), error = %error, "No profile extracted, page skipped");
            ScanStats::bump(&mut stats.parse_skips, error.kind());
            run_log.log(EventKind::ParseSkipped {
                url,
                reason: error.kind().to_string(),
            });
        }
        UrlOutcome::Duplicate { url, id } => {
            stats.pages_fetched += 1;
            stats.profiles_parsed += 1;
            stats.duplicates += 1;
            info!(url = url.as_str(), profile = id.as_str(), "Duplicate profile in run, first kept");
            run_log.log(EventKind::DuplicateProfile {
                url,
                profile_id: id.0,
            });
        }
        UrlOutcome::Processed(p) => {
            let Processed {
                url,
                record,
                degraded,
                score,
                raw_write,
                scored_write,
            } = *p;
            let id = record.id.as_str().to_string();
            stats.pages_fetched += 1;
            stats.profiles_parsed += 1;
            ScanStats::bump(&mut stats.by_strategy, record.strategy.as_str());
            run_log.log(EventKind::Parsed {
                url,
                profile_id: id.clone(),
                strategy: record.strategy.clone(),
            });

            record_store_write(format!("profiles/raw/{id}"), raw_write, stats, run_log);

            for (kind, error) in degraded {
                ScanStats::bump(&mut stats.degraded, kind.as_str());
                run_log.log(EventKind::EnrichmentDegraded {
                    profile_id: id.clone(),
                    signal: kind.to_string(),
                    error,
                });
            }

            match score {
                Ok(_) => stats.profiles_scored += 1,
                Err(e) => {
                    warn!(profile = id.as_str(), error = %e, "Profile left unscored");
                    stats.profiles_unscored += 1;
                }
            }
            run_log.log(EventKind::Scored {
                profile_id: id.clone(),
                score: record.authenticity_score,
            });

            match scored_write {
                Some(result) => record_store_write(
                    format!("profiles/scored/{id}"),
                    result.map(|()| StoreOutcome::Created),
                    stats,
                    run_log,
                ),
                None => warn!(profile = id.as_str(), "Stored raw copy unreadable, scored write skipped"),
            }
        }
    }
}

fn record_store_write(
    key: String,
    result: Result<StoreOutcome, StoreError>,
    stats: &mut ScanStats,
    run_log: &mut RunLog,
) {
    let outcome = match result {
        Ok(StoreOutcome::Created) => "created",
        Ok(StoreOutcome::Existing) => "existing",
        Err(e @ StoreError::WriteConflict { .. }) => {
            warn!(error = %e, "Store write conflict, existing entry kept");
            stats.store_conflicts += 1;
            "conflict"
        }
        Err(e @ StoreError::Corrupt { .. }) => {
            error!(error = %e, "Store corruption detected");
            stats.store_corruptions += 1;
            "corrupt"
        }
        Err(e) => {
            error!(key = key.as_str(), error = %e, "Store write failed");
            stats.store_errors += 1;
            "error"
        }
    };
    run_log.log(EventKind::StoreWrite {
        key,
        outcome: outcome.to_string(),
    });
}
