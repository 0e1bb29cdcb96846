//! End-to-end tests of a match session against in-process backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autotag::backend::{ReleaseQuery, TrackQuery};
use autotag::{
    BackendError, CandidateRelease, CandidateTrack, Confidence, Decision, Field, LocalTrack,
    MatchConfig, MatchKind, MatchSession, MetadataBackend, SessionOptions, SessionWarning,
};

const TITLES: [&str; 10] = [
    "Speak to Me",
    "Breathe",
    "On the Run",
    "Time",
    "The Great Gig in the Sky",
    "Money",
    "Us and Them",
    "Any Colour You Like",
    "Brain Damage",
    "Eclipse",
];

fn duration(i: usize) -> f64 {
    180.0 + 17.0 * f64::from(u32::try_from(i).unwrap())
}

fn release(id: &str, year: i32) -> CandidateRelease {
    CandidateRelease::new(id, "The Dark Side of the Moon", "Pink Floyd")
        .with_year(year)
        .with_tracks(
            TITLES
                .iter()
                .enumerate()
                .map(|(i, t)| CandidateTrack::new(*t, duration(i)))
                .collect(),
        )
}

fn local(count: usize) -> Vec<LocalTrack> {
    TITLES
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, t)| {
            LocalTrack::new(*t, duration(i))
                .with_artist("Pink Floyd")
                .with_album("The Dark Side of the Moon")
                .with_year(1973)
                .with_track_number(u32::try_from(i + 1).unwrap())
        })
        .collect()
}

/// Backend returning a fixed response, optionally after a delay
struct MockBackend {
    name: String,
    releases: Vec<CandidateRelease>,
    error: Option<BackendError>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockBackend {
    fn new(name: &str, releases: Vec<CandidateRelease>) -> Self {
        Self {
            name: name.to_string(),
            releases,
            error: None,
            delay: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(name: &str, error: BackendError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(name, Vec::new())
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with_counters(mut self, in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        self.in_flight = in_flight;
        self.peak = peak;
        self
    }

    fn boxed(self) -> Arc<dyn MetadataBackend> {
        Arc::new(self)
    }

    async fn respond(&self) -> Result<Vec<CandidateRelease>, BackendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.releases.clone()),
        }
    }
}

#[async_trait]
impl MetadataBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search_release(
        &self,
        _query: &ReleaseQuery,
    ) -> Result<Vec<CandidateRelease>, BackendError> {
        self.respond().await
    }

    async fn search_track(
        &self,
        _query: &TrackQuery,
    ) -> Result<Vec<CandidateRelease>, BackendError> {
        self.respond().await
    }

    async fn release_for_id(&self, id: &str) -> Result<Option<CandidateRelease>, BackendError> {
        let releases = self.respond().await?;
        Ok(releases.into_iter().find(|r| r.id == id))
    }
}

fn session(backends: Vec<Arc<dyn MetadataBackend>>) -> MatchSession {
    MatchSession::new(MatchConfig::default(), backends).unwrap()
}

fn ids(decision: &Decision) -> Vec<&str> {
    decision
        .candidates()
        .iter()
        .map(|c| c.release.id.as_str())
        .collect()
}

#[tokio::test]
async fn test_exact_album_is_strong_match() {
    let session = session(vec![MockBackend::new("mock", vec![release("dsotm", 1973)]).boxed()]);
    let outcome = session.match_album(&local(10), &SessionOptions::default()).await;

    assert_eq!(outcome.kind, MatchKind::Album);
    assert_eq!(outcome.decision.confidence(), Confidence::Strong);
    let best = outcome.decision.best().unwrap();
    assert!(best.total() < 0.01);
    assert_eq!(best.alignment.pairs.len(), 10);
    assert_eq!(best.source, "mock");
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn test_missing_tracks_degrade_to_ambiguous() {
    let backend = MockBackend::new("mock", vec![release("dsotm", 1973)]).boxed();
    let session = session(vec![backend]);

    let full = session.match_album(&local(10), &SessionOptions::default()).await;
    let partial = session.match_album(&local(8), &SessionOptions::default()).await;

    assert_eq!(full.decision.confidence(), Confidence::Strong);
    assert_eq!(partial.decision.confidence(), Confidence::Ambiguous);

    let best = partial.decision.best().unwrap();
    let increase = best.total() - full.decision.best().unwrap().total();
    // two of ten tracks missing, track_count weight 4 over a total weight of 15
    assert!((increase - 0.8 / 15.0).abs() < 1e-9);
    assert!((best.distance.contribution(Field::TrackCount) - 0.8 / 15.0).abs() < 1e-9);
    assert_eq!(best.alignment.unmatched_candidate, vec![8, 9]);
}

#[tokio::test]
async fn test_equal_year_offsets_are_tied() {
    let backend = MockBackend::new(
        "mock",
        vec![release("dsotm-b", 1974), release("dsotm-a", 1972)],
    )
    .boxed();
    let session = session(vec![backend]);
    let outcome = session.match_album(&local(10), &SessionOptions::default()).await;

    let Decision::AmbiguousMatch(candidates) = &outcome.decision else {
        panic!("expected ambiguous match, got {:?}", outcome.decision.confidence());
    };
    assert_eq!(ids(&outcome.decision), vec!["dsotm-a", "dsotm-b"]);
    for candidate in candidates {
        let year = candidate.distance.get(Field::Year).unwrap();
        assert!((year - 0.5).abs() < 1e-12);
    }
    assert!((candidates[0].total() - candidates[1].total()).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_tie_prefers_earlier_backend() {
    let session = session(vec![
        MockBackend::new("first", vec![release("zz-release", 1972)]).boxed(),
        MockBackend::new("second", vec![release("aa-release", 1974)]).boxed(),
    ]);
    let outcome = session.match_album(&local(10), &SessionOptions::default()).await;

    assert_eq!(outcome.decision.confidence(), Confidence::Ambiguous);
    assert_eq!(ids(&outcome.decision), vec!["zz-release", "aa-release"]);
}

#[tokio::test(start_paused = true)]
async fn test_all_backends_time_out() {
    let session = session(vec![
        MockBackend::new("slow-1", vec![release("dsotm", 1973)])
            .with_delay(Duration::from_secs(60))
            .boxed(),
        MockBackend::new("slow-2", vec![release("dsotm", 1973)])
            .with_delay(Duration::from_secs(60))
            .boxed(),
    ]);
    let outcome = session.match_album(&local(10), &SessionOptions::default()).await;

    assert_eq!(outcome.decision, Decision::NoMatch);
    assert!(!outcome.cancelled);
    assert_eq!(
        outcome.warnings,
        vec![
            SessionWarning::BackendTimeout {
                backend: "slow-1".to_string()
            },
            SessionWarning::BackendTimeout {
                backend: "slow-2".to_string()
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_does_not_hide_other_backends() {
    let session = session(vec![
        MockBackend::new("slow", vec![])
            .with_delay(Duration::from_secs(60))
            .boxed(),
        MockBackend::new("fast", vec![release("dsotm", 1973)]).boxed(),
    ]);
    let outcome = session.match_album(&local(10), &SessionOptions::default()).await;

    assert_eq!(outcome.decision.confidence(), Confidence::Strong);
    assert_eq!(outcome.decision.best().unwrap().source, "fast");
    assert_eq!(outcome.warnings.len(), 1);
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let session = session(vec![
        MockBackend::new("a", vec![release("dsotm-1", 1972), release("dsotm-2", 1973)]).boxed(),
        MockBackend::new("b", vec![release("dsotm-3", 1974)]).boxed(),
    ]);
    let tracks = local(9);

    let first = session.match_album(&tracks, &SessionOptions::default()).await;
    let second = session.match_album(&tracks, &SessionOptions::default()).await;
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_abandons_slow_backends() {
    let session = session(vec![
        MockBackend::new("fast", vec![release("dsotm", 1973)]).boxed(),
        MockBackend::new("slow", vec![])
            .with_delay(Duration::from_secs(5))
            .boxed(),
    ]);
    let token = session.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    let start = tokio::time::Instant::now();
    let outcome = session.match_album(&local(10), &SessionOptions::default()).await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(outcome.cancelled);
    assert_eq!(outcome.decision, Decision::NoMatch);
}

#[tokio::test]
async fn test_best_effort_after_cancellation_scores_nothing_new() {
    let session = session(vec![MockBackend::new("mock", vec![release("dsotm", 1973)]).boxed()]);
    session.cancel_token().cancel();

    let options = SessionOptions {
        best_effort: true,
        ..SessionOptions::default()
    };
    let outcome = session.match_album(&local(10), &options).await;

    assert!(outcome.cancelled);
    assert_eq!(outcome.decision, Decision::NoMatch);
}

#[tokio::test]
async fn test_duplicates_keep_first_backend() {
    let session = session(vec![
        MockBackend::new("primary", vec![release("dsotm", 1973)]).boxed(),
        MockBackend::new("secondary", vec![release("dsotm", 1980)]).boxed(),
    ]);
    let outcome = session.match_album(&local(10), &SessionOptions::default()).await;

    assert_eq!(outcome.decision.confidence(), Confidence::Strong);
    let best = outcome.decision.best().unwrap();
    assert_eq!(best.source, "primary");
    assert_eq!(best.release.year, Some(1973));
    assert_eq!(
        outcome.warnings,
        vec![SessionWarning::DuplicateCandidate {
            backend: "secondary".to_string(),
            candidate: "dsotm".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_malformed_and_empty_candidates_are_skipped() {
    let mut untitled = release("untitled", 1973);
    untitled.title = "  ".to_string();
    let empty = CandidateRelease::new("empty", "Nothing", "Nobody");

    let session = session(vec![MockBackend::new(
        "mock",
        vec![untitled, empty, release("dsotm", 1973)],
    )
    .boxed()]);
    let outcome = session.match_album(&local(10), &SessionOptions::default()).await;

    assert_eq!(outcome.decision.best().unwrap().release.id, "dsotm");
    assert_eq!(outcome.warnings.len(), 2);
    assert!(matches!(
        &outcome.warnings[0],
        SessionWarning::MalformedCandidate { candidate, .. } if candidate == "untitled"
    ));
    assert!(matches!(
        &outcome.warnings[1],
        SessionWarning::AlignmentInfeasible { candidate, .. } if candidate == "empty"
    ));
}

#[tokio::test]
async fn test_backend_failures_become_warnings() {
    let session = session(vec![
        MockBackend::failing("down", BackendError::Unavailable("connection refused".to_string()))
            .boxed(),
        MockBackend::failing("garbled", BackendError::MalformedResponse("bad json".to_string()))
            .boxed(),
        MockBackend::new("ok", vec![release("dsotm", 1973)]).boxed(),
    ]);
    let outcome = session.match_album(&local(10), &SessionOptions::default()).await;

    assert_eq!(outcome.decision.confidence(), Confidence::Strong);
    assert_eq!(
        outcome.warnings,
        vec![
            SessionWarning::BackendUnavailable {
                backend: "down".to_string(),
                reason: "connection refused".to_string(),
            },
            SessionWarning::MalformedResponse {
                backend: "garbled".to_string(),
                reason: "bad json".to_string(),
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let backends: Vec<Arc<dyn MetadataBackend>> = (0..3)
        .map(|i| {
            MockBackend::new(&format!("backend-{i}"), vec![release("dsotm", 1973)])
                .with_delay(Duration::from_millis(10))
                .with_counters(Arc::clone(&in_flight), Arc::clone(&peak))
                .boxed()
        })
        .collect();

    let config = MatchConfig {
        max_concurrent_requests: 2,
        ..MatchConfig::default()
    };
    let session = MatchSession::new(config, backends).unwrap();
    let options = SessionOptions {
        search_ids: vec!["dsotm".to_string(), "other".to_string()],
        ..SessionOptions::default()
    };
    let outcome = session.match_album(&local(10), &options).await;

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.decision.best().unwrap().source, "backend-0");
}

#[tokio::test]
async fn test_singleton_match() {
    let session = session(vec![MockBackend::new("mock", vec![release("dsotm", 1973)]).boxed()]);
    let track = local(10).swap_remove(5);
    let outcome = session.match_track(&track, &SessionOptions::default()).await;

    assert_eq!(outcome.kind, MatchKind::Singleton);
    assert_eq!(outcome.decision.confidence(), Confidence::Strong);
    assert_eq!(outcome.decision.best().unwrap().alignment.candidate_for(0), Some(5));
}
