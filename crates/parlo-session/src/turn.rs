//! The turn controller.
//!
//! Concurrency model: an atomic in-flight guard makes turn execution
//! single-flight, and a monotonically increasing generation token
//! identifies the turn a network result belongs to. Cancelling bumps the
//! generation, so every commit a stale turn attempts afterwards fails the
//! identity check and is dropped without side effects.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parlo_core::types::{Clip, LanguagePair, Message, TranscriptResult};
use parlo_core::ParloError;
use parlo_services::{LanguagePairApi, TranscriptionApi, TranslationApi};

use crate::{TurnEvent, TurnStage};

/// How a call to [`TurnController::begin_turn`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Rejected without side effects: another turn is already running.
    Busy,
    /// First turn: the language pair is now fixed. No message is produced.
    LanguagesResolved,
    /// A message was translated and appended to the history.
    Translated,
    /// The turn was cancelled or superseded mid-flight; its results were
    /// dropped and nothing was committed.
    Superseded,
    /// A pipeline stage failed; the error was reported and transient turn
    /// state rolled back.
    Failed,
}

#[derive(Default)]
struct SessionState {
    pair: Option<LanguagePair>,
    messages: Vec<Message>,
    transcript: Option<TranscriptResult>,
    partial: Option<String>,
    last_error: Option<String>,
}

pub struct TurnController {
    transcription: Arc<dyn TranscriptionApi>,
    language: Arc<dyn LanguagePairApi>,
    translation: Arc<dyn TranslationApi>,
    event_tx: mpsc::UnboundedSender<TurnEvent>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    state: Mutex<SessionState>,
}

impl TurnController {
    pub fn new(
        transcription: Arc<dyn TranscriptionApi>,
        language: Arc<dyn LanguagePairApi>,
        translation: Arc<dyn TranslationApi>,
        event_tx: mpsc::UnboundedSender<TurnEvent>,
    ) -> Self {
        Self {
            transcription,
            language,
            translation,
            event_tx,
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Run one turn from a finished clip.
    ///
    /// The first successful turn resolves the language pair instead of
    /// translating; every later turn translates between the fixed pair and
    /// appends a message. At most one turn runs at a time; extra calls are
    /// rejected as [`TurnOutcome::Busy`].
    pub async fn begin_turn(&self, clip: Clip) -> TurnOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Turn already in flight, ignoring");
            return TurnOutcome::Busy;
        }
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Fresh turn: clear transient leftovers from the previous one.
        {
            let mut s = self.state();
            s.transcript = None;
            s.partial = None;
            s.last_error = None;
        }

        let outcome = self.run_turn(clip, token).await;

        // Only release the guard if this turn is still the active one; a
        // cancellation already released it for the turn that replaced us.
        // Checked under the state lock so a concurrent cancellation cannot
        // slip in between the check and the store.
        {
            let _s = self.state();
            if self.is_current(token) {
                self.in_flight.store(false, Ordering::SeqCst);
            }
        }
        outcome
    }

    /// Invalidate the running turn, if any. Its remaining network work is
    /// abandoned: every commit it attempts afterwards fails the identity
    /// check, and a new turn may start immediately. The bump happens under
    /// the state lock, so a commit racing with cancellation either lands
    /// entirely before it or is dropped entirely after.
    pub fn cancel_active(&self) {
        let _s = self.state();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
        debug!("Active turn invalidated");
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The fixed language pair, once the first turn has resolved it.
    pub fn language_pair(&self) -> Option<LanguagePair> {
        self.state().pair.clone()
    }

    /// Full conversation history, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    /// Transcript of the current or most recent turn.
    pub fn last_transcript(&self) -> Option<TranscriptResult> {
        self.state().transcript.clone()
    }

    /// Latest translation text: the growing partial while streaming, the
    /// final text after completion.
    pub fn latest_translation(&self) -> Option<String> {
        self.state().partial.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    async fn run_turn(&self, clip: Clip, token: u64) -> TurnOutcome {
        info!(bytes = clip.data.len(), "Turn started");

        let transcript = match self.transcription.transcribe(&clip).await {
            Ok(t) => t,
            Err(e) => return self.fail(token, TurnStage::Transcription, e),
        };
        if self
            .commit_if_current(token, |s| s.transcript = Some(transcript.clone()))
            .is_none()
        {
            return TurnOutcome::Superseded;
        }
        self.emit(TurnEvent::Transcript {
            text: transcript.text.clone(),
            language: transcript.language.clone(),
        });

        let pair = self.state().pair.clone();
        match pair {
            None => self.resolve_languages(&transcript, token).await,
            Some(pair) => self.translate(&transcript, &pair, token).await,
        }
    }

    /// First turn: fix the conversation languages from the utterance.
    async fn resolve_languages(&self, transcript: &TranscriptResult, token: u64) -> TurnOutcome {
        let pair = match self.language.resolve_pair(&transcript.text).await {
            Ok(p) => p,
            Err(e) => return self.fail(token, TurnStage::LanguageDetection, e),
        };
        // Set exactly once; a racing turn that got here first wins.
        let newly_set = self.commit_if_current(token, |s| {
            if s.pair.is_some() {
                false
            } else {
                s.pair = Some(pair.clone());
                true
            }
        });
        if newly_set != Some(true) {
            return TurnOutcome::Superseded;
        }
        info!(
            source = %pair.source.code,
            target = %pair.target.code,
            "Language pair fixed"
        );
        self.emit(TurnEvent::LanguagesResolved { pair });
        TurnOutcome::LanguagesResolved
    }

    /// Later turns: stream the translation, then append the message.
    async fn translate(
        &self,
        transcript: &TranscriptResult,
        pair: &LanguagePair,
        token: u64,
    ) -> TurnOutcome {
        let (partial_tx, mut partial_rx) = mpsc::unbounded_channel();
        let translate = self
            .translation
            .translate(&transcript.text, pair, partial_tx);
        tokio::pin!(translate);

        // Forward partials as they arrive; drop them once stale.
        let translated = loop {
            tokio::select! {
                res = &mut translate => break res,
                Some(partial) = partial_rx.recv() => {
                    if self
                        .commit_if_current(token, |s| s.partial = Some(partial.clone()))
                        .is_some()
                    {
                        self.emit(TurnEvent::PartialTranslation { text: partial });
                    }
                }
            }
        };

        let translated = match translated {
            Ok(t) => t,
            Err(e) => return self.fail(token, TurnStage::Translation, e),
        };

        let target = pair.other(&transcript.language).code.clone();
        let message = Message::new(
            transcript.text.clone(),
            translated,
            transcript.language.clone(),
            target,
        );
        let committed = self.commit_if_current(token, |s| {
            s.partial = Some(message.translated_text.clone());
            s.messages.push(message.clone());
        });
        if committed.is_none() {
            return TurnOutcome::Superseded;
        }
        info!(id = %message.id, "Turn translated");
        self.emit(TurnEvent::MessageAdded { message });
        TurnOutcome::Translated
    }

    fn fail(&self, token: u64, stage: TurnStage, err: ParloError) -> TurnOutcome {
        let message = err.to_string();
        // Roll back the turn's transient state so no half-finished turn
        // lingers on screen.
        let committed = self.commit_if_current(token, |s| {
            s.transcript = None;
            s.partial = None;
            s.last_error = Some(message.clone());
        });
        if committed.is_none() {
            return TurnOutcome::Superseded;
        }
        warn!(?stage, %message, "Turn failed");
        self.emit(TurnEvent::TurnError { stage, message });
        TurnOutcome::Failed
    }

    fn is_current(&self, token: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == token
    }

    /// Run `commit` against the session state only if `token` still
    /// identifies the active turn. The generation is read under the state
    /// lock, the same lock [`Self::cancel_active`] bumps under, so a stale
    /// turn can never interleave its commit with a cancellation.
    fn commit_if_current<T>(
        &self,
        token: u64,
        commit: impl FnOnce(&mut SessionState) -> T,
    ) -> Option<T> {
        let mut s = self.state();
        if self.generation.load(Ordering::SeqCst) != token {
            return None;
        }
        Some(commit(&mut s))
    }

    fn emit(&self, event: TurnEvent) {
        // The receiver side may be gone during shutdown.
        let _ = self.event_tx.send(event);
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
