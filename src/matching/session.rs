use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, MetadataBackend, ReleaseQuery, TrackQuery};
use crate::config::{ConfigError, MatchConfig};
use crate::core::release::{CandidateError, CandidateRelease};
use crate::core::track::{LikelyMetadata, LocalTrack};
use crate::core::types::MatchKind;
use crate::matching::changes::ApplyPlan;
use crate::matching::recommend::{recommend, Decision};
use crate::matching::scoring::{score_album, score_track, ScoredCandidate};

/// Per-call options for a match
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Look these identifiers up instead of searching by text
    pub search_ids: Vec<String>,
    /// On cancellation, decide over whatever was already scored instead of
    /// returning no match
    pub best_effort: bool,
}

/// A non-fatal problem met during a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionWarning {
    BackendTimeout {
        backend: String,
    },
    BackendUnavailable {
        backend: String,
        reason: String,
    },
    MalformedResponse {
        backend: String,
        reason: String,
    },
    MalformedCandidate {
        backend: String,
        candidate: String,
        reason: String,
    },
    AlignmentInfeasible {
        backend: String,
        candidate: String,
        reason: String,
    },
    DuplicateCandidate {
        backend: String,
        candidate: String,
    },
}

impl std::fmt::Display for SessionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackendTimeout { backend } => write!(f, "{backend}: request timed out"),
            Self::BackendUnavailable { backend, reason } => {
                write!(f, "{backend}: unavailable ({reason})")
            }
            Self::MalformedResponse { backend, reason } => {
                write!(f, "{backend}: malformed response ({reason})")
            }
            Self::MalformedCandidate {
                backend,
                candidate,
                reason,
            } => write!(f, "{backend}: skipped malformed candidate {candidate} ({reason})"),
            Self::AlignmentInfeasible {
                backend,
                candidate,
                reason,
            } => write!(f, "{backend}: could not align candidate {candidate} ({reason})"),
            Self::DuplicateCandidate { backend, candidate } => {
                write!(f, "{backend}: duplicate candidate {candidate} ignored")
            }
        }
    }
}

/// Result of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub kind: MatchKind,
    pub decision: Decision,
    pub warnings: Vec<SessionWarning>,
    /// Whether cancellation was requested before the session finished
    pub cancelled: bool,
}

/// What to ask each backend
#[derive(Debug, Clone)]
enum Request {
    Release(ReleaseQuery),
    Track(TrackQuery),
    ReleaseId(String),
    TrackId(String),
}

struct Job<'a> {
    backend: usize,
    order: usize,
    request: &'a Request,
}

struct JobResult {
    backend: usize,
    order: usize,
    result: Result<Vec<CandidateRelease>, BackendError>,
}

/// A normalized candidate waiting to be scored
struct Acquired {
    source: String,
    priority: usize,
    release: CandidateRelease,
}

/// Orchestrates one album or track query across all backends.
///
/// A session is built once from a validated configuration and may run any
/// number of matches. Backends are queried concurrently with a per-call timeout;
/// failures only reduce the candidate set. Scoring runs on the rayon pool.
///
/// Each match runs under a child of the session's root token. Cancelling the
/// match token stops that match only; once it finishes, later matches get a
/// fresh token. Cancelling the root token stops every match.
pub struct MatchSession {
    config: Arc<MatchConfig>,
    backends: Vec<Arc<dyn MetadataBackend>>,
    root: CancellationToken,
    /// Token for the match in progress, or the next one to start
    cancel: Mutex<CancellationToken>,
}

impl MatchSession {
    /// Create a session. The order of `backends` is their tie-break priority.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration is invalid.
    pub fn new(
        config: MatchConfig,
        backends: Vec<Arc<dyn MetadataBackend>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let root = CancellationToken::new();
        Ok(Self {
            config: Arc::new(config),
            backends,
            cancel: Mutex::new(root.child_token()),
            root,
        })
    }

    /// Use an externally owned root token; cancelling it stops every match
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Mutex::new(token.child_token());
        self.root = token;
        self
    }

    /// Token that cancels the match in progress, or the next one to start
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.current_token().clone()
    }

    fn current_token(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm a fresh token if the last one was used up
    fn rearm(&self) {
        let mut current = self.current_token();
        if current.is_cancelled() && !self.root.is_cancelled() {
            *current = self.root.child_token();
        }
    }

    #[must_use]
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Find the release a group of local tracks belongs to
    pub async fn match_album(
        &self,
        local: &[LocalTrack],
        options: &SessionOptions,
    ) -> SessionOutcome {
        let likely = LikelyMetadata::from_tracks(local);

        let mut requests: Vec<Request> = Vec::new();
        if options.search_ids.is_empty() {
            requests.push(Request::Release(ReleaseQuery {
                artist: likely.artist().map(str::to_string),
                title: likely.album().map(str::to_string),
                track_count: Some(local.len()),
            }));
            if let Some(id) = likely.consensus_release_id() {
                requests.push(Request::ReleaseId(id.to_string()));
            }
        } else {
            requests.extend(options.search_ids.iter().cloned().map(Request::ReleaseId));
        }

        debug!(
            tracks = local.len(),
            artist = ?likely.artist(),
            album = ?likely.album(),
            "Matching album"
        );

        let config = Arc::clone(&self.config);
        let local = local.to_vec();
        self.run(MatchKind::Album, &requests, options, move |release| {
            score_album(&local, &likely, release, &config)
        })
        .await
    }

    /// Find the recording a single local track corresponds to
    pub async fn match_track(&self, local: &LocalTrack, options: &SessionOptions) -> SessionOutcome {
        let mut requests: Vec<Request> = Vec::new();
        if options.search_ids.is_empty() {
            requests.push(Request::Track(TrackQuery {
                artist: local.artist.clone(),
                title: local.title.clone(),
            }));
            if let Some(id) = &local.recording_id {
                requests.push(Request::TrackId(id.clone()));
            }
        } else {
            requests.extend(options.search_ids.iter().cloned().map(Request::TrackId));
        }

        debug!(title = ?local.title, artist = ?local.artist, "Matching track");

        let config = Arc::clone(&self.config);
        let local = local.clone();
        self.run(MatchKind::Singleton, &requests, options, move |release| {
            score_track(&local, release, &config)
        })
        .await
    }

    /// Change-set for applying a chosen candidate to the local tracks
    #[must_use]
    pub fn apply_plan(
        &self,
        kind: MatchKind,
        local: &[LocalTrack],
        chosen: &ScoredCandidate,
    ) -> ApplyPlan {
        ApplyPlan::build(kind, local, chosen, &self.config.set_fields)
    }

    async fn run<S>(
        &self,
        kind: MatchKind,
        requests: &[Request],
        options: &SessionOptions,
        scorer: S,
    ) -> SessionOutcome
    where
        S: Fn(&CandidateRelease) -> Result<ScoredCandidate, CandidateError> + Send + Sync + 'static,
    {
        let cancel = self.cancel_token();
        let mut warnings = Vec::new();

        let responses = self.acquire(requests, &cancel).await;
        let candidates = self.collect_candidates(responses, &mut warnings);

        // Checkpoint: nothing is scored once cancellation is requested
        let scored = if cancel.is_cancelled() {
            info!(candidates = candidates.len(), "Match cancelled before scoring");
            Vec::new()
        } else {
            self.score(candidates, scorer, &cancel, &mut warnings).await
        };

        let outcome = self.finish(kind, scored, warnings, options, cancel.is_cancelled());
        if outcome.cancelled {
            self.rearm();
        }
        outcome
    }

    /// Query every backend with every request, bounded by
    /// `max_concurrent_requests`, each call under its own timeout.
    ///
    /// Results are returned in backend order, then request order, regardless of
    /// completion order. Calls still in flight when cancellation is requested
    /// are dropped.
    async fn acquire(&self, requests: &[Request], cancel: &CancellationToken) -> Vec<JobResult> {
        let jobs: Vec<Job<'_>> = (0..self.backends.len())
            .flat_map(|backend| {
                requests.iter().enumerate().map(move |(order, request)| Job {
                    backend,
                    order,
                    request,
                })
            })
            .collect();

        let mut pending = stream::iter(jobs)
            .map(|job| self.call(job))
            .buffer_unordered(self.config.max_concurrent_requests);

        let mut results = Vec::new();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(completed = results.len(), "Abandoning backend requests");
                    break;
                }
                next = pending.next() => match next {
                    Some(result) => results.push(result),
                    None => break,
                },
            }
        }

        results.sort_by_key(|r| (r.backend, r.order));
        results
    }

    async fn call(&self, job: Job<'_>) -> JobResult {
        let backend = &self.backends[job.backend];
        let request = async {
            match job.request {
                Request::Release(query) => backend.search_release(query).await,
                Request::Track(query) => backend.search_track(query).await,
                Request::ReleaseId(id) => backend
                    .release_for_id(id)
                    .await
                    .map(|found| found.into_iter().collect()),
                Request::TrackId(id) => backend
                    .track_for_id(id)
                    .await
                    .map(|found| found.into_iter().collect()),
            }
        };

        let result = tokio::time::timeout(self.config.backend_timeout(), request)
            .await
            .unwrap_or(Err(BackendError::Timeout));

        JobResult {
            backend: job.backend,
            order: job.order,
            result,
        }
    }

    /// Normalize and deduplicate responses, turning failures into warnings.
    ///
    /// The first occurrence of an identifier, in backend priority order, wins.
    fn collect_candidates(
        &self,
        responses: Vec<JobResult>,
        warnings: &mut Vec<SessionWarning>,
    ) -> Vec<Acquired> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        for response in responses {
            let source = self.backends[response.backend].name().to_string();
            let releases = match response.result {
                Ok(releases) => releases,
                Err(err) => {
                    warn!(backend = %source, error = %err, "Backend request failed");
                    warnings.push(backend_warning(&source, err));
                    continue;
                }
            };

            for release in releases {
                let release = match release.normalize() {
                    Ok(release) => release,
                    Err(err) => {
                        warn!(backend = %source, error = %err, "Skipping malformed candidate");
                        warnings.push(candidate_warning(&source, err));
                        continue;
                    }
                };

                if !seen.insert(release.id.clone()) {
                    debug!(backend = %source, candidate = %release.id, "Dropping duplicate candidate");
                    warnings.push(SessionWarning::DuplicateCandidate {
                        backend: source.clone(),
                        candidate: release.id.clone(),
                    });
                    continue;
                }

                candidates.push(Acquired {
                    source: source.clone(),
                    priority: response.backend,
                    release,
                });
            }
        }

        candidates
    }

    /// Score candidates in parallel. Candidates not yet started when
    /// cancellation is requested are skipped.
    async fn score<S>(
        &self,
        candidates: Vec<Acquired>,
        scorer: S,
        cancel: &CancellationToken,
        warnings: &mut Vec<SessionWarning>,
    ) -> Vec<ScoredCandidate>
    where
        S: Fn(&CandidateRelease) -> Result<ScoredCandidate, CandidateError> + Send + Sync + 'static,
    {
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            candidates
                .into_par_iter()
                .map(|candidate| {
                    if token.is_cancelled() {
                        return None;
                    }
                    let result = scorer(&candidate.release)
                        .map(|scored| scored.with_source(candidate.source.clone(), candidate.priority));
                    Some((candidate.source, result))
                })
                .collect::<Vec<_>>()
        });

        let results = match task.await {
            Ok(results) => results,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => {
                warn!(error = %err, "Scoring task did not complete");
                Vec::new()
            }
        };

        let mut scored = Vec::new();
        for (source, result) in results.into_iter().flatten() {
            match result {
                Ok(candidate) => {
                    debug!(
                        backend = %source,
                        candidate = %candidate.release.id,
                        distance = candidate.total(),
                        "Scored candidate"
                    );
                    scored.push(candidate);
                }
                Err(err) => {
                    warn!(backend = %source, error = %err, "Excluding candidate");
                    warnings.push(candidate_warning(&source, err));
                }
            }
        }
        scored
    }

    fn finish(
        &self,
        kind: MatchKind,
        scored: Vec<ScoredCandidate>,
        warnings: Vec<SessionWarning>,
        options: &SessionOptions,
        cancelled: bool,
    ) -> SessionOutcome {
        let decision = if cancelled && !options.best_effort {
            Decision::NoMatch
        } else {
            recommend(scored, &self.config)
        };

        info!(
            %kind,
            decision = %decision.confidence(),
            best = ?decision.best().map(|c| c.release.id.as_str()),
            warnings = warnings.len(),
            cancelled,
            "Match finished"
        );

        SessionOutcome {
            kind,
            decision,
            warnings,
            cancelled,
        }
    }
}

fn backend_warning(backend: &str, err: BackendError) -> SessionWarning {
    let backend = backend.to_string();
    match err {
        BackendError::Timeout => SessionWarning::BackendTimeout { backend },
        BackendError::Unavailable(reason) => SessionWarning::BackendUnavailable { backend, reason },
        BackendError::MalformedResponse(reason) => {
            SessionWarning::MalformedResponse { backend, reason }
        }
    }
}

fn candidate_warning(backend: &str, err: CandidateError) -> SessionWarning {
    let backend = backend.to_string();
    match err {
        CandidateError::Malformed { id, reason } => SessionWarning::MalformedCandidate {
            backend,
            candidate: id,
            reason,
        },
        CandidateError::AlignmentInfeasible { id, reason } => SessionWarning::AlignmentInfeasible {
            backend,
            candidate: id,
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CatalogBackend;
    use crate::core::release::CandidateTrack;
    use crate::core::types::Confidence;

    /// Releases scored in the partial-scoring tests; far more than scoring threads
    const MANY: usize = 512;

    /// Returns the same releases for every album search
    struct FixedBackend(Vec<CandidateRelease>);

    #[async_trait::async_trait]
    impl MetadataBackend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search_release(
            &self,
            _query: &ReleaseQuery,
        ) -> Result<Vec<CandidateRelease>, BackendError> {
            Ok(self.0.clone())
        }

        async fn search_track(
            &self,
            _query: &TrackQuery,
        ) -> Result<Vec<CandidateRelease>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn catalog() -> Arc<dyn MetadataBackend> {
        let mut catalog = CatalogBackend::new("catalog");
        catalog.add_release(
            CandidateRelease::new("rel-1", "Songs", "Band")
                .with_year(2001)
                .with_tracks(vec![
                    CandidateTrack::new("First", 120.0).with_id("rec-1"),
                    CandidateTrack::new("Second", 150.0),
                ]),
        );
        Arc::new(catalog)
    }

    fn local() -> Vec<LocalTrack> {
        vec![
            LocalTrack::new("First", 120.0)
                .with_artist("Band")
                .with_album("Songs")
                .with_year(2001)
                .with_track_number(1),
            LocalTrack::new("Second", 150.0)
                .with_artist("Band")
                .with_album("Songs")
                .with_year(2001)
                .with_track_number(2),
        ]
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MatchConfig {
            top_n: 0,
            ..MatchConfig::default()
        };
        assert!(MatchSession::new(config, vec![]).is_err());
    }

    #[tokio::test]
    async fn test_no_backends_is_no_match() {
        let session = MatchSession::new(MatchConfig::default(), vec![]).unwrap();
        let outcome = session.match_album(&local(), &SessionOptions::default()).await;
        assert_eq!(outcome.decision, Decision::NoMatch);
        assert!(outcome.warnings.is_empty());
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_album_strong_match_and_plan() {
        let session = MatchSession::new(MatchConfig::default(), vec![catalog()]).unwrap();
        let tracks = local();
        let outcome = session.match_album(&tracks, &SessionOptions::default()).await;
        assert_eq!(outcome.decision.confidence(), Confidence::Strong);

        let best = outcome.decision.best().unwrap();
        assert_eq!(best.source, "catalog");
        let plan = session.apply_plan(MatchKind::Album, &tracks, best);
        assert_eq!(plan.candidate_id, "rel-1");
        assert_eq!(plan.tracks.len(), 2);
    }

    #[tokio::test]
    async fn test_search_ids() {
        let session = MatchSession::new(MatchConfig::default(), vec![catalog()]).unwrap();
        let options = SessionOptions {
            search_ids: vec!["rel-1".to_string(), "missing".to_string()],
            ..SessionOptions::default()
        };
        // Text search would find nothing for these tags
        let tracks: Vec<LocalTrack> = local()
            .into_iter()
            .map(|mut t| {
                t.album = Some("zzzz".to_string());
                t
            })
            .collect();
        let outcome = session.match_album(&tracks, &options).await;
        assert_eq!(outcome.decision.best().unwrap().release.id, "rel-1");
    }

    #[tokio::test]
    async fn test_singleton_by_recording_id() {
        let session = MatchSession::new(MatchConfig::default(), vec![catalog()]).unwrap();
        let track = LocalTrack::new("First", 120.0)
            .with_artist("Band")
            .with_recording_id("rec-1");
        let outcome = session.match_track(&track, &SessionOptions::default()).await;
        assert_eq!(outcome.kind, MatchKind::Singleton);
        assert_eq!(outcome.decision.confidence(), Confidence::Strong);
        assert_eq!(outcome.decision.best().unwrap().release.id, "rec-1");
        // text search returns the same recording under the same id
        assert!(outcome
            .warnings
            .iter()
            .all(|w| matches!(w, SessionWarning::DuplicateCandidate { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let session = MatchSession::new(MatchConfig::default(), vec![catalog()]).unwrap();
        session.cancel_token().cancel();
        let outcome = session.match_album(&local(), &SessionOptions::default()).await;
        assert!(outcome.cancelled);
        assert_eq!(outcome.decision, Decision::NoMatch);
    }

    #[tokio::test]
    async fn test_session_reusable_after_cancellation() {
        let session = MatchSession::new(MatchConfig::default(), vec![catalog()]).unwrap();
        session.cancel_token().cancel();
        let first = session.match_album(&local(), &SessionOptions::default()).await;
        assert!(first.cancelled);

        let second = session.match_album(&local(), &SessionOptions::default()).await;
        assert!(!second.cancelled);
        assert_eq!(second.decision.confidence(), Confidence::Strong);
        assert!(!session.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_root_cancellation_stops_every_match() {
        let root = CancellationToken::new();
        let session = MatchSession::new(MatchConfig::default(), vec![catalog()])
            .unwrap()
            .with_cancellation(root.clone());
        root.cancel();
        for _ in 0..2 {
            let outcome = session.match_album(&local(), &SessionOptions::default()).await;
            assert!(outcome.cancelled);
            assert_eq!(outcome.decision, Decision::NoMatch);
        }
    }

    /// Run an album match over `MANY` identical releases, cancelling from
    /// inside the first scorer call. Returns the outcome and the ids scored.
    async fn cancel_during_scoring(best_effort: bool) -> (SessionOutcome, Vec<String>) {
        let releases: Vec<CandidateRelease> = (0..MANY)
            .map(|i| {
                CandidateRelease::new(format!("rel-{i}"), "Songs", "Band")
                    .with_year(2001)
                    .with_tracks(vec![
                        CandidateTrack::new("First", 120.0),
                        CandidateTrack::new("Second", 150.0),
                    ])
            })
            .collect();
        let session =
            MatchSession::new(MatchConfig::default(), vec![Arc::new(FixedBackend(releases))])
                .unwrap();

        let token = session.cancel_token();
        let scored = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&scored);
        let tracks = local();
        let likely = LikelyMetadata::from_tracks(&tracks);
        let config = session.config().clone();
        let scorer = move |release: &CandidateRelease| {
            token.cancel();
            recorder.lock().unwrap().push(release.id.clone());
            score_album(&tracks, &likely, release, &config)
        };

        let requests = [Request::Release(ReleaseQuery::default())];
        let options = SessionOptions {
            best_effort,
            ..SessionOptions::default()
        };
        let outcome = session
            .run(MatchKind::Album, &requests, &options, scorer)
            .await;
        let ids = scored.lock().unwrap().clone();
        (outcome, ids)
    }

    #[tokio::test]
    async fn test_best_effort_decides_over_partial_scoring() {
        let (outcome, scored) = cancel_during_scoring(true).await;
        assert!(outcome.cancelled);
        assert!(!scored.is_empty());
        assert!(scored.len() < MANY, "scoring continued after cancellation");

        let decided = outcome.decision.candidates();
        assert!(!decided.is_empty());
        assert!(decided.iter().all(|c| scored.contains(&c.release.id)));
    }

    #[tokio::test]
    async fn test_cancel_during_scoring_without_best_effort() {
        let (outcome, scored) = cancel_during_scoring(false).await;
        assert!(outcome.cancelled);
        assert!(!scored.is_empty());
        assert_eq!(outcome.decision, Decision::NoMatch);
    }

    #[test]
    fn test_warning_display() {
        let warning = SessionWarning::BackendTimeout {
            backend: "slow".to_string(),
        };
        assert_eq!(warning.to_string(), "slow: request timed out");
        let warning = candidate_warning(
            "cat",
            CandidateError::Malformed {
                id: "x".to_string(),
                reason: "missing release title".to_string(),
            },
        );
        assert!(matches!(warning, SessionWarning::MalformedCandidate { .. }));
    }
}
