//! Voices finalized translations through the speech endpoint.
//!
//! Voice output is strictly supplementary: every failure in here is logged
//! and swallowed, and conversation state is never touched. One playback
//! session exists at a time; starting a new one tears the previous one
//! down completely first.
//!
//! Each session runs its fetch-and-play sequence on a child task, so the
//! command loop stays responsive and a cancel fires the session token
//! while the synthesis request is still in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parlo_core::ParloError;
use parlo_services::SpeechApi;

use crate::playback::AudioSink;
use crate::unlock::OutputUnlocker;

/// Retry and debounce knobs.
#[derive(Debug, Clone)]
pub struct SpeakerConfig {
    /// Quiet period after a finalize before speaking, so a superseding
    /// update can still silence it.
    pub debounce: Duration,

    /// Device-level retries within one attempt, for outputs that reject
    /// playback transiently.
    pub play_retries: u32,
    pub play_retry_delay: Duration,

    /// Whole fetch-and-play sequences before giving up on the text.
    pub max_attempts: u32,
    /// Attempt `n` waits `n * backoff_step` before starting.
    pub backoff_step: Duration,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            play_retries: 3,
            play_retry_delay: Duration::from_millis(300),
            max_attempts: 4,
            backoff_step: Duration::from_millis(500),
        }
    }
}

/// Player lifecycle. `Loading` covers the fetch and decode of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Playing,
}

struct PendingSpeech {
    text: String,
    due: Instant,
}

type SharedSink = Arc<Mutex<Box<dyn AudioSink>>>;
type SharedState = Arc<Mutex<PlayerState>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SpeechSynthesisPlayer {
    api: Arc<dyn SpeechApi>,
    sink: SharedSink,
    unlocker: Box<dyn OutputUnlocker>,
    config: SpeakerConfig,
    state: SharedState,
    /// When voice output was switched on; `None` means disabled. Only
    /// translations finalized after this moment are spoken.
    enabled_since: Option<Instant>,
    latest_text: String,
    pending: Option<PendingSpeech>,
    session: Option<CancellationToken>,
}

impl SpeechSynthesisPlayer {
    pub fn new(
        api: Arc<dyn SpeechApi>,
        sink: Box<dyn AudioSink>,
        unlocker: Box<dyn OutputUnlocker>,
    ) -> Self {
        Self {
            api,
            sink: Arc::new(Mutex::new(sink)),
            unlocker,
            config: SpeakerConfig::default(),
            state: Arc::new(Mutex::new(PlayerState::Idle)),
            enabled_since: None,
            latest_text: String::new(),
            pending: None,
            session: None,
        }
    }

    pub fn with_config(mut self, config: SpeakerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> PlayerState {
        *lock(&self.state)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled_since.is_some()
    }

    /// Toggle voice output. Enabling records the moment so that already
    /// displayed translations are not suddenly spoken.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            if self.enabled_since.is_none() {
                self.enabled_since = Some(Instant::now());
                debug!("Voice output enabled");
            }
        } else if self.enabled_since.take().is_some() {
            debug!("Voice output disabled");
        }
    }

    /// Track the newest translation text, partial or final. A pending
    /// trigger only fires if its text is still the newest at fire time.
    pub fn note_text(&mut self, text: &str) {
        self.latest_text = text.to_string();
    }

    /// A translation finalized at `finalized_at`. Arms the trigger unless
    /// voice is off or the translation predates the enable switch.
    pub fn on_finalized(&mut self, text: &str, finalized_at: Instant) {
        let Some(enabled_since) = self.enabled_since else {
            return;
        };
        if finalized_at < enabled_since {
            debug!("Translation predates voice enable, not speaking");
            return;
        }
        self.note_text(text);
        self.pending = Some(PendingSpeech {
            text: text.to_string(),
            due: Instant::now() + self.config.debounce,
        });
    }

    /// Speak `text` immediately. User-initiated replay skips the enable
    /// gate and the quiet period but still tears down any active session.
    pub fn play_now(&mut self, text: &str) {
        self.pending = None;
        self.note_text(text);
        self.speak(text);
    }

    /// Stop speaking, abort any in-flight fetch, drop any armed trigger.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.teardown();
    }

    /// Forwarded to the platform unlocker; locked outputs retry priming.
    pub fn notify_interaction(&mut self) {
        self.unlocker.notify_interaction();
    }

    /// Advance the state machine: fire a due trigger, reap finished
    /// playback. Called on every event-loop tick.
    pub fn poll(&mut self) {
        if let Some(pending) = self.pending.take() {
            if Instant::now() >= pending.due {
                if pending.text == self.latest_text {
                    self.speak(&pending.text);
                } else {
                    debug!("Translation superseded during quiet period, not speaking");
                }
            } else {
                self.pending = Some(pending);
            }
        }

        if self.state() == PlayerState::Playing && lock(&self.sink).is_finished() {
            debug!("Playback finished");
            self.teardown();
        }
    }

    /// Deadline of the armed trigger, if any. Lets the event loop sleep
    /// precisely instead of relying on the tick alone.
    pub fn pending_due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Start a fresh session on a child task.
    fn speak(&mut self, text: &str) {
        self.teardown();
        let _ = self.unlocker.ensure_unlocked();

        let cancel = CancellationToken::new();
        self.session = Some(cancel.clone());
        tokio::spawn(run_session(
            Arc::clone(&self.api),
            Arc::clone(&self.sink),
            Arc::clone(&self.state),
            self.config.clone(),
            text.to_string(),
            cancel,
        ));
    }

    /// Tear down the active session: abort any in-flight fetch, stop the
    /// device, drop the handles. The token is cancelled before the sink
    /// and state are touched, so the old child task cannot write to
    /// either afterwards.
    fn teardown(&mut self) {
        if let Some(cancel) = self.session.take() {
            cancel.cancel();
        }
        lock(&self.sink).stop();
        *lock(&self.state) = PlayerState::Idle;
    }
}

/// One playback session: bounded fetch-and-play attempts with linear
/// backoff. Every wait races the cancel token; sink and state writes are
/// skipped once the session is cancelled.
async fn run_session(
    api: Arc<dyn SpeechApi>,
    sink: SharedSink,
    state: SharedState,
    config: SpeakerConfig,
    text: String,
    cancel: CancellationToken,
) {
    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(config.backoff_step * attempt) => {}
            }
        }
        set_state_if_active(&state, &cancel, PlayerState::Loading);
        match attempt_once(&api, &sink, &config, &text, &cancel).await {
            Ok(()) => {
                set_state_if_active(&state, &cancel, PlayerState::Playing);
                return;
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    return;
                }
                warn!(attempt, %e, "Speech playback attempt failed");
            }
        }
    }

    warn!("Giving up on speech playback");
    if !cancel.is_cancelled() {
        lock(&sink).stop();
        set_state_if_active(&state, &cancel, PlayerState::Idle);
    }
}

/// One fetch-and-play sequence.
async fn attempt_once(
    api: &Arc<dyn SpeechApi>,
    sink: &SharedSink,
    config: &SpeakerConfig,
    text: &str,
    cancel: &CancellationToken,
) -> parlo_core::Result<()> {
    let audio = tokio::select! {
        _ = cancel.cancelled() => {
            return Err(ParloError::Playback("playback cancelled".into()));
        }
        res = api.synthesize(text, cancel) => res?,
    };
    if !audio.content_type.starts_with("audio/") {
        return Err(ParloError::Playback(format!(
            "unexpected content type: {}",
            audio.content_type
        )));
    }

    let mut tries = 0;
    loop {
        let result = {
            let mut guard = lock(sink);
            // Checked under the sink lock: teardown cancels before it
            // stops the sink, so a stale session cannot play afterwards.
            if cancel.is_cancelled() {
                return Err(ParloError::Playback("playback cancelled".into()));
            }
            guard.play(&audio)
        };
        match result {
            Ok(()) => return Ok(()),
            Err(e) if tries < config.play_retries => {
                tries += 1;
                debug!(tries, %e, "Device rejected playback, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(e),
                    _ = sleep(config.play_retry_delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Write the state only while the session is alive; the check shares the
/// state lock with teardown's write, so a cancelled session can never
/// clobber its successor.
fn set_state_if_active(state: &SharedState, cancel: &CancellationToken, value: PlayerState) {
    let mut s = lock(state);
    if !cancel.is_cancelled() {
        *s = value;
    }
}

/// Commands accepted by the speaker task.
#[derive(Debug)]
enum SpeakerCommand {
    SetEnabled(bool),
    TextUpdated(String),
    Finalized { text: String, at: Instant },
    PlayNow(String),
    Interaction,
    Cancel,
}

/// Cheap cloneable handle to a spawned speaker task. Sends never block;
/// if the task is gone the command is dropped, which is fine for a
/// supplementary output.
#[derive(Clone)]
pub struct SpeakerHandle {
    tx: mpsc::UnboundedSender<SpeakerCommand>,
}

impl SpeakerHandle {
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.tx.send(SpeakerCommand::SetEnabled(enabled));
    }

    pub fn text_updated(&self, text: impl Into<String>) {
        let _ = self.tx.send(SpeakerCommand::TextUpdated(text.into()));
    }

    /// Report a finalized translation, stamped with the current moment.
    pub fn finalized(&self, text: impl Into<String>) {
        let _ = self.tx.send(SpeakerCommand::Finalized {
            text: text.into(),
            at: Instant::now(),
        });
    }

    pub fn play_now(&self, text: impl Into<String>) {
        let _ = self.tx.send(SpeakerCommand::PlayNow(text.into()));
    }

    pub fn interaction(&self) {
        let _ = self.tx.send(SpeakerCommand::Interaction);
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(SpeakerCommand::Cancel);
    }
}

/// Spawn the speaker event loop. It runs until every handle is dropped.
/// Command handling never awaits the playback session, so a cancel lands
/// even while a fetch is outstanding.
pub fn spawn(mut player: SpeechSynthesisPlayer) -> SpeakerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(50));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(SpeakerCommand::SetEnabled(on)) => player.set_enabled(on),
                    Some(SpeakerCommand::TextUpdated(text)) => player.note_text(&text),
                    Some(SpeakerCommand::Finalized { text, at }) => player.on_finalized(&text, at),
                    Some(SpeakerCommand::PlayNow(text)) => player.play_now(&text),
                    Some(SpeakerCommand::Interaction) => player.notify_interaction(),
                    Some(SpeakerCommand::Cancel) => player.cancel(),
                    None => break,
                },
                _ = tick.tick() => player.poll(),
            }
        }

        player.cancel();
        debug!("Speaker task stopped");
    });

    SpeakerHandle { tx }
}
