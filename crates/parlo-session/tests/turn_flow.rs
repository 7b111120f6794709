//! End-to-end turn flow against mocked service endpoints.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use parlo_core::types::{Clip, LanguagePair, LanguageTag, TranscriptResult};
use parlo_core::{ParloError, Result};
use parlo_services::{LanguagePairApi, TranscriptionApi, TranslationApi};
use parlo_session::{TurnController, TurnEvent, TurnOutcome};

struct MockTranscription {
    text: &'static str,
    language: &'static str,
    fail: bool,
}

impl MockTranscription {
    fn ok(text: &'static str, language: &'static str) -> Arc<Self> {
        Arc::new(Self {
            text,
            language,
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            text: "",
            language: "",
            fail: true,
        })
    }
}

#[async_trait]
impl TranscriptionApi for MockTranscription {
    async fn transcribe(&self, _clip: &Clip) -> Result<TranscriptResult> {
        if self.fail {
            return Err(ParloError::Transcription("audio too short".into()));
        }
        Ok(TranscriptResult {
            text: self.text.into(),
            language: self.language.into(),
        })
    }
}

struct MockLanguage {
    calls: AtomicUsize,
}

impl MockLanguage {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LanguagePairApi for MockLanguage {
    async fn resolve_pair(&self, _text: &str) -> Result<LanguagePair> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LanguagePair {
            source: LanguageTag::new("en", "English"),
            target: LanguageTag::new("es", "Spanish"),
        })
    }
}

/// Streams two partials, then resolves with the full text.
struct MockTranslation {
    full: &'static str,
    fail: bool,
}

impl MockTranslation {
    fn ok(full: &'static str) -> Arc<Self> {
        Arc::new(Self { full, fail: false })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            full: "",
            fail: true,
        })
    }
}

#[async_trait]
impl TranslationApi for MockTranslation {
    async fn translate(
        &self,
        _text: &str,
        _pair: &LanguagePair,
        partial_tx: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        if self.fail {
            return Err(ParloError::Translation("rate limit exceeded".into()));
        }
        let mid = self.full.len() / 2;
        let _ = partial_tx.send(self.full[..mid].to_string());
        tokio::task::yield_now().await;
        let _ = partial_tx.send(self.full.to_string());
        Ok(self.full.to_string())
    }
}

/// Blocks until released, so tests can interleave cancellation.
struct GatedTranslation {
    release: Arc<Notify>,
    full: &'static str,
}

#[async_trait]
impl TranslationApi for GatedTranslation {
    async fn translate(
        &self,
        _text: &str,
        _pair: &LanguagePair,
        _partial_tx: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        self.release.notified().await;
        Ok(self.full.to_string())
    }
}

fn clip() -> Clip {
    Clip::wav(vec![0; 64])
}

fn controller(
    transcription: Arc<dyn TranscriptionApi>,
    language: Arc<dyn LanguagePairApi>,
    translation: Arc<dyn TranslationApi>,
) -> (Arc<TurnController>, mpsc::UnboundedReceiver<TurnEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(TurnController::new(transcription, language, translation, tx)),
        rx,
    )
}

fn drain(rx: &mut mpsc::UnboundedReceiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Run the first turn so the pair is fixed, and discard its events.
async fn fix_pair(ctrl: &TurnController, rx: &mut mpsc::UnboundedReceiver<TurnEvent>) {
    assert_eq!(ctrl.begin_turn(clip()).await, TurnOutcome::LanguagesResolved);
    drain(rx);
}

#[tokio::test]
async fn first_turn_resolves_languages_without_translating() {
    let (ctrl, mut rx) = controller(
        MockTranscription::ok("hello there", "en"),
        MockLanguage::new(),
        MockTranslation::ok("unused"),
    );

    let outcome = ctrl.begin_turn(clip()).await;
    assert_eq!(outcome, TurnOutcome::LanguagesResolved);

    let events = drain(&mut rx);
    assert!(matches!(&events[0], TurnEvent::Transcript { text, .. } if text == "hello there"));
    assert!(matches!(&events[1], TurnEvent::LanguagesResolved { pair }
        if pair.source.code == "en" && pair.target.code == "es"));
    assert_eq!(events.len(), 2);

    assert!(ctrl.messages().is_empty());
    assert!(ctrl.language_pair().is_some());
    assert!(!ctrl.is_busy());
}

#[tokio::test]
async fn second_turn_streams_translation_and_appends_message() {
    let (ctrl, mut rx) = controller(
        MockTranscription::ok("how are you", "en"),
        MockLanguage::new(),
        MockTranslation::ok("como estas"),
    );
    fix_pair(&ctrl, &mut rx).await;

    let outcome = ctrl.begin_turn(clip()).await;
    assert_eq!(outcome, TurnOutcome::Translated);

    let events = drain(&mut rx);
    let partials: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::PartialTranslation { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert!(!partials.is_empty());
    // Partials only ever grow toward the final text.
    assert!(partials.iter().all(|p| "como estas".starts_with(p.as_str())));

    let messages = ctrl.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].original_text, "how are you");
    assert_eq!(messages[0].translated_text, "como estas");
    assert_eq!(messages[0].source_lang, "en");
    assert_eq!(messages[0].target_lang, "es");
    assert!(matches!(events.last(), Some(TurnEvent::MessageAdded { .. })));
}

#[tokio::test]
async fn detected_dialect_translates_toward_target() {
    // "pt" matches neither fixed language; translation goes to the target.
    let (ctrl, mut rx) = controller(
        MockTranscription::ok("ola", "pt"),
        MockLanguage::new(),
        MockTranslation::ok("hola"),
    );
    fix_pair(&ctrl, &mut rx).await;

    assert_eq!(ctrl.begin_turn(clip()).await, TurnOutcome::Translated);
    assert_eq!(ctrl.messages()[0].target_lang, "es");
}

#[tokio::test]
async fn concurrent_turn_is_rejected_without_side_effects() {
    let release = Arc::new(Notify::new());
    let (ctrl, mut rx) = controller(
        MockTranscription::ok("hola", "es"),
        MockLanguage::new(),
        Arc::new(GatedTranslation {
            release: release.clone(),
            full: "hello",
        }),
    );
    fix_pair(&ctrl, &mut rx).await;

    let running = {
        let ctrl = ctrl.clone();
        tokio::spawn(async move { ctrl.begin_turn(clip()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(ctrl.is_busy());

    // A second clip while the first is still translating: ignored.
    assert_eq!(ctrl.begin_turn(clip()).await, TurnOutcome::Busy);

    release.notify_one();
    assert_eq!(running.await.unwrap(), TurnOutcome::Translated);
    assert_eq!(ctrl.messages().len(), 1);
    assert!(!ctrl.is_busy());
}

#[tokio::test]
async fn cancelled_turn_commits_nothing() {
    let release = Arc::new(Notify::new());
    let (ctrl, mut rx) = controller(
        MockTranscription::ok("hola", "es"),
        MockLanguage::new(),
        Arc::new(GatedTranslation {
            release: release.clone(),
            full: "hello",
        }),
    );
    fix_pair(&ctrl, &mut rx).await;

    let running = {
        let ctrl = ctrl.clone();
        tokio::spawn(async move { ctrl.begin_turn(clip()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    drain(&mut rx);

    // Cancel while the translation request is in flight, then let the
    // stale response arrive.
    ctrl.cancel_active();
    assert!(!ctrl.is_busy());
    release.notify_one();

    assert_eq!(running.await.unwrap(), TurnOutcome::Superseded);
    assert!(ctrl.messages().is_empty());
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, TurnEvent::MessageAdded { .. })));

    // The controller is immediately usable for a fresh turn.
    let next = {
        let ctrl = ctrl.clone();
        tokio::spawn(async move { ctrl.begin_turn(clip()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    release.notify_one();
    assert_eq!(next.await.unwrap(), TurnOutcome::Translated);
    assert_eq!(ctrl.messages().len(), 1);
}

/// Cancels the active turn just before resolving, so the cancellation
/// lands at the exact moment the translation completes.
struct CancelOnComplete {
    ctrl: std::sync::Mutex<Option<Arc<TurnController>>>,
    full: &'static str,
}

#[async_trait]
impl TranslationApi for CancelOnComplete {
    async fn translate(
        &self,
        _text: &str,
        _pair: &LanguagePair,
        _partial_tx: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        if let Some(ctrl) = self.ctrl.lock().unwrap().clone() {
            ctrl.cancel_active();
        }
        Ok(self.full.to_string())
    }
}

#[tokio::test]
async fn cancellation_arriving_at_completion_commits_nothing() {
    let translation = Arc::new(CancelOnComplete {
        ctrl: std::sync::Mutex::new(None),
        full: "hello",
    });
    let (ctrl, mut rx) = controller(
        MockTranscription::ok("hola", "es"),
        MockLanguage::new(),
        translation.clone(),
    );
    fix_pair(&ctrl, &mut rx).await;
    *translation.ctrl.lock().unwrap() = Some(ctrl.clone());

    // The translation succeeds, but the cancellation got there first: the
    // finished turn must drop its result instead of appending it.
    assert_eq!(ctrl.begin_turn(clip()).await, TurnOutcome::Superseded);
    assert!(ctrl.messages().is_empty());
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, TurnEvent::MessageAdded { .. })));
    assert!(!ctrl.is_busy());
}

#[tokio::test]
async fn language_pair_is_resolved_exactly_once() {
    let language = MockLanguage::new();
    let (ctrl, mut rx) = controller(
        MockTranscription::ok("hello", "en"),
        language.clone(),
        MockTranslation::ok("hola"),
    );

    fix_pair(&ctrl, &mut rx).await;
    let fixed = ctrl.language_pair();

    for _ in 0..3 {
        assert_eq!(ctrl.begin_turn(clip()).await, TurnOutcome::Translated);
    }

    assert_eq!(language.calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctrl.language_pair(), fixed);
}

#[tokio::test]
async fn transcription_failure_reports_and_releases_guard() {
    let (ctrl, mut rx) = controller(
        MockTranscription::failing(),
        MockLanguage::new(),
        MockTranslation::ok("unused"),
    );

    assert_eq!(ctrl.begin_turn(clip()).await, TurnOutcome::Failed);

    let events = drain(&mut rx);
    assert!(matches!(&events[0], TurnEvent::TurnError { message, .. }
        if message == "audio too short"));
    assert_eq!(ctrl.last_error().as_deref(), Some("audio too short"));
    assert!(ctrl.last_transcript().is_none());
    assert!(ctrl.messages().is_empty());

    // The guard was released; the next turn runs.
    assert!(!ctrl.is_busy());
}

#[tokio::test]
async fn translation_failure_rolls_back_transient_state() {
    let (ctrl, mut rx) = controller(
        MockTranscription::ok("how are you", "en"),
        MockLanguage::new(),
        MockTranslation::failing(),
    );
    fix_pair(&ctrl, &mut rx).await;

    assert_eq!(ctrl.begin_turn(clip()).await, TurnOutcome::Failed);

    assert_eq!(ctrl.last_error().as_deref(), Some("rate limit exceeded"));
    assert!(ctrl.last_transcript().is_none());
    assert!(ctrl.latest_translation().is_none());
    assert!(ctrl.messages().is_empty());
    // The fixed pair survives a failed turn.
    assert!(ctrl.language_pair().is_some());
}

/// Fails the first call, then behaves like [`MockTranslation`].
struct FlakyTranslation {
    failures_left: AtomicUsize,
    full: &'static str,
}

#[async_trait]
impl TranslationApi for FlakyTranslation {
    async fn translate(
        &self,
        _text: &str,
        _pair: &LanguagePair,
        partial_tx: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(ParloError::Translation("rate limit exceeded".into()));
        }
        let _ = partial_tx.send(self.full.to_string());
        Ok(self.full.to_string())
    }
}

#[tokio::test]
async fn next_turn_clears_previous_error() {
    let (ctrl, mut rx) = controller(
        MockTranscription::ok("hello", "en"),
        MockLanguage::new(),
        Arc::new(FlakyTranslation {
            failures_left: AtomicUsize::new(1),
            full: "hola",
        }),
    );
    fix_pair(&ctrl, &mut rx).await;

    assert_eq!(ctrl.begin_turn(clip()).await, TurnOutcome::Failed);
    assert_eq!(ctrl.last_error().as_deref(), Some("rate limit exceeded"));

    assert_eq!(ctrl.begin_turn(clip()).await, TurnOutcome::Translated);
    assert!(ctrl.last_error().is_none());
    assert_eq!(ctrl.messages().len(), 1);
}
