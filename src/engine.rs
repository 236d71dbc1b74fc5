//! Session state machine.
//!
//! One engine runs one session at a time on a single timeline. Time only moves
//! when the caller feeds a [`SessionEvent::Tick`]; at that point the engine
//! reads its [`Clock`] and fires whichever timers are due. Timers are plain
//! data tagged with the round they were armed for, so a timeout that outlives
//! its round is recognised and dropped.

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::DahditError;
use crate::morse::{MorseSymbol, MorseTable};
use crate::playback::{AudioStatus, PlaybackController, PlaybackHandle};
use crate::source::CharacterSource;
use crate::stats::{Attempt, SessionStats};
use crate::timing::Timing;
use crate::tone::{render, render_bell, ToneSpec};

/// Pause between `start` and the first prompt
pub const LEAD_IN: Duration = Duration::from_secs(1);
/// Silence after a prompt before it is played again
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(1500);
/// Slowest speed must still render every character within this
const MAX_CHARACTER_MS: f64 = 20_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Started, waiting for the first prompt
    LeadIn,
    AwaitingResponse,
    /// Answered correctly, waiting out the gap before the next prompt
    Resolved,
    Finished,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SessionState::LeadIn | SessionState::AwaitingResponse | SessionState::Resolved
        )
    }
}

/// Inputs to the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    Key(char),
    Tick,
    Stop,
}

/// What the engine reports to anyone subscribed
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Prompted {
        round_id: u64,
        character: char,
    },
    Replayed {
        round_id: u64,
        character: char,
        replay_count: u32,
    },
    Answered(Attempt),
    Finished(SessionStats),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    pub id: u64,
    pub character: char,
    pub prompted_at: Instant,
    pub replay_count: u32,
    pub resolved: bool,
    pub correct: Option<bool>,
    pub response_latency: Option<Duration>,
    /// Speed the round was prompted at; replays reuse it
    pub timing: Timing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ResponseTimer {
    round_id: u64,
    due: Instant,
}

pub struct SessionEngine<C: Clock, S: CharacterSource> {
    clock: C,
    source: S,
    playback: PlaybackController,
    tone: ToneSpec,
    lead_in: Duration,
    response_timeout: Duration,
    timing: Option<Timing>,
    state: SessionState,
    deadline: Option<Instant>,
    next_prompt_at: Option<Instant>,
    response_timer: Option<ResponseTimer>,
    round: Option<Round>,
    round_playback: PlaybackHandle,
    next_round_id: u64,
    stats: SessionStats,
    subscribers: Vec<Sender<SessionUpdate>>,
}

impl<C: Clock, S: CharacterSource> SessionEngine<C, S> {
    /// Fails if `tone` can never be rendered
    pub fn new(
        clock: C,
        source: S,
        playback: PlaybackController,
        tone: ToneSpec,
    ) -> Result<Self, DahditError> {
        tone.validate()?;
        Ok(Self {
            clock,
            source,
            playback,
            tone,
            lead_in: LEAD_IN,
            response_timeout: RESPONSE_TIMEOUT,
            timing: None,
            state: SessionState::Idle,
            deadline: None,
            next_prompt_at: None,
            response_timer: None,
            round: None,
            round_playback: PlaybackHandle::NULL,
            next_round_id: 1,
            stats: SessionStats::new(),
            subscribers: Vec::new(),
        })
    }

    pub fn with_lead_in(mut self, lead_in: Duration) -> Self {
        self.lead_in = lead_in;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Receive every update published from now on
    pub fn subscribe(&mut self) -> Receiver<SessionUpdate> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Speed the next prompt will use
    pub fn timing(&self) -> Option<Timing> {
        self.timing
    }

    pub fn tone_spec(&self) -> &ToneSpec {
        &self.tone
    }

    pub fn audio_status(&self) -> &AudioStatus {
        self.playback.audio_status()
    }

    /// True while the current round's tone is still sounding
    pub fn is_sounding(&self) -> bool {
        self.playback.is_playing(self.round_playback)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(self.clock.now()))
    }

    /// Begin a session of `duration_secs` at `wpm`.
    ///
    /// Nothing changes unless both values are valid. Calling this while a
    /// session is running does nothing.
    pub fn start(&mut self, duration_secs: f64, wpm: f64) -> Result<(), DahditError> {
        if self.state.is_running() {
            debug!("start ignored, session already running");
            return Ok(());
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(DahditError::InvalidDuration(duration_secs));
        }
        let timing = self.checked_timing(wpm)?;

        let now = self.clock.now();
        let deadline = Duration::try_from_secs_f64(duration_secs)
            .ok()
            .and_then(|length| now.checked_add(length))
            .ok_or(DahditError::InvalidDuration(duration_secs))?;
        self.timing = Some(timing);
        self.deadline = Some(deadline);
        self.next_prompt_at = Some(now + self.lead_in);
        self.response_timer = None;
        self.round = None;
        self.round_playback = PlaybackHandle::NULL;
        self.stats = SessionStats::new();
        self.state = SessionState::LeadIn;

        info!(duration_secs, wpm, "session started");
        Ok(())
    }

    /// Change speed; the round in flight keeps the speed it started with
    pub fn set_wpm(&mut self, wpm: f64) -> Result<(), DahditError> {
        let timing = self.checked_timing(wpm)?;
        debug!(wpm, "speed change queued for next prompt");
        self.timing = Some(timing);
        Ok(())
    }

    /// A speed every drawable character can be rendered at
    fn checked_timing(&self, wpm: f64) -> Result<Timing, DahditError> {
        let timing = Timing::derive(wpm)?;
        let longest = MorseTable::alphanumerics()
            .iter()
            .filter_map(|&c| MorseTable::lookup(c).ok())
            .map(|symbols| timing.character_ms(symbols))
            .fold(0.0, f64::max);
        if longest > MAX_CHARACTER_MS {
            return Err(DahditError::InvalidSpeed(wpm));
        }
        self.tone.validate_for(&timing)?;
        Ok(timing)
    }

    /// End the session now. Does nothing when idle or already finished.
    pub fn stop(&mut self) {
        if self.state.is_running() {
            info!("session stopped");
            self.finish();
        }
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Key(c) => self.on_key(c),
            SessionEvent::Tick => self.on_tick(),
            SessionEvent::Stop => self.stop(),
        }
    }

    fn on_tick(&mut self) {
        if !self.state.is_running() {
            // let a trailing bell report completion
            self.playback.poll_finished();
            return;
        }
        let now = self.clock.now();

        if let Some(handle) = self.playback.poll_finished() {
            if handle == self.round_playback {
                debug!(handle = handle.id(), "prompt tone finished");
                self.round_playback = PlaybackHandle::NULL;
            }
        }

        if self.deadline_passed(now) {
            info!("session time is up");
            self.finish();
            return;
        }

        if self.next_prompt_at.is_some_and(|due| now >= due) {
            self.next_prompt_at = None;
            self.prompt_next(now);
            return;
        }

        if let Some(timer) = self.response_timer {
            if now >= timer.due {
                self.response_timer = None;
                self.on_response_timeout(timer.round_id, now);
            }
        }
    }

    fn deadline_passed(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    fn prompt_next(&mut self, now: Instant) {
        if self.deadline_passed(now) {
            self.finish();
            return;
        }
        let Some(timing) = self.timing else {
            error!("prompt requested without a speed");
            self.finish();
            return;
        };

        let character = self.source.next().to_ascii_uppercase();
        let symbols = match MorseTable::lookup(character) {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("{e}; drawing another character");
                self.next_prompt_at = Some(now);
                return;
            }
        };

        if !self.sound(symbols, &timing) {
            self.finish();
            return;
        }

        let id = self.next_round_id;
        self.next_round_id += 1;
        self.round = Some(Round {
            id,
            character,
            prompted_at: now,
            replay_count: 0,
            resolved: false,
            correct: None,
            response_latency: None,
            timing,
        });
        self.arm_response_timer(id, symbols, &timing, now);
        self.state = SessionState::AwaitingResponse;

        debug!(round = id, %character, "prompted");
        self.publish(SessionUpdate::Prompted {
            round_id: id,
            character,
        });
    }

    fn on_response_timeout(&mut self, round_id: u64, now: Instant) {
        let Some(round) = self.round.as_mut() else {
            return;
        };
        if round.id != round_id || round.resolved {
            debug!(round_id, "ignoring stale response timer");
            return;
        }

        round.replay_count += 1;
        let (character, replay_count, timing) = (round.character, round.replay_count, round.timing);
        let symbols = match MorseTable::lookup(character) {
            Ok(symbols) => symbols,
            Err(e) => {
                error!("cannot replay round {round_id}: {e}");
                self.finish();
                return;
            }
        };

        if !self.sound(symbols, &timing) {
            self.finish();
            return;
        }
        self.arm_response_timer(round_id, symbols, &timing, now);

        debug!(round = round_id, replay_count, "replayed");
        self.publish(SessionUpdate::Replayed {
            round_id,
            character,
            replay_count,
        });
    }

    fn on_key(&mut self, c: char) {
        if self.state != SessionState::AwaitingResponse {
            return;
        }
        let now = self.clock.now();
        let Some(round) = self.round.as_mut() else {
            return;
        };

        let pressed = c.to_ascii_uppercase();
        let latency = now.saturating_duration_since(round.prompted_at);
        let correct = pressed == round.character;

        let attempt = Attempt {
            character: round.character,
            pressed,
            correct,
            latency,
            replay_count: round.replay_count,
            timestamp: Local::now(),
        };

        if correct {
            round.resolved = true;
            round.correct = Some(true);
            round.response_latency = Some(latency);
            let gap = round.timing.inter_gap();

            self.response_timer = None;
            self.playback.cancel(self.round_playback);
            self.round_playback = PlaybackHandle::NULL;
            self.next_prompt_at = Some(now + gap);
            self.state = SessionState::Resolved;
            debug!(%pressed, latency_ms = latency.as_millis() as u64, "correct");
        } else {
            round.correct = Some(false);
            debug!(%pressed, expected = %round.character, "mismatch");
        }

        self.stats.record(attempt.clone());
        self.publish(SessionUpdate::Answered(attempt));
    }

    /// Render and play one character; false if the tone spec is unusable
    fn sound(&mut self, symbols: &[MorseSymbol], timing: &Timing) -> bool {
        match render(symbols, timing, &self.tone) {
            Ok(tone) => {
                self.round_playback = self.playback.play(tone);
                true
            }
            Err(e) => {
                error!("cannot render prompt: {e}");
                false
            }
        }
    }

    fn arm_response_timer(
        &mut self,
        round_id: u64,
        symbols: &[MorseSymbol],
        timing: &Timing,
        now: Instant,
    ) {
        // long characters at low speed must finish before they are repeated
        let heard_by = timing.character_duration(symbols) + timing.inter_gap();
        let wait = self.response_timeout.max(heard_by);
        self.response_timer = Some(ResponseTimer {
            round_id,
            due: now + wait,
        });
    }

    fn finish(&mut self) {
        self.response_timer = None;
        self.next_prompt_at = None;
        self.deadline = None;
        self.playback.cancel_current();
        self.round_playback = PlaybackHandle::NULL;
        self.playback.play(render_bell(self.tone.sample_rate));
        self.state = SessionState::Finished;

        info!(
            attempts = self.stats.total_attempts(),
            correct = self.stats.total_correct(),
            "session finished"
        );
        self.publish(SessionUpdate::Finished(self.stats.clone()));
    }

    fn publish(&mut self, update: SessionUpdate) {
        self.subscribers
            .retain(|tx| tx.send(update.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::playback::{OutputEvent, OutputProbe, RecordingOutput};
    use crate::source::ScriptedSource;
    use assert_matches::assert_matches;

    type TestEngine = SessionEngine<ManualClock, ScriptedSource>;

    fn engine(script: &str) -> (TestEngine, ManualClock, OutputProbe) {
        let clock = ManualClock::new();
        let (output, probe) = RecordingOutput::new();
        let playback = PlaybackController::with_output(Box::new(output));
        let engine = SessionEngine::new(
            clock.clone(),
            ScriptedSource::new(script),
            playback,
            ToneSpec::default(),
        )
        .unwrap();
        (engine, clock, probe)
    }

    fn advance(engine: &mut TestEngine, clock: &ManualClock, ms: u64) {
        clock.advance_ms(ms);
        engine.handle(SessionEvent::Tick);
    }

    fn drain(rx: &Receiver<SessionUpdate>) -> Vec<SessionUpdate> {
        rx.try_iter().collect()
    }

    #[test]
    fn start_rejects_bad_configuration() {
        let (mut e, _, _) = engine("E");
        assert_eq!(e.start(0.0, 20.0), Err(DahditError::InvalidDuration(0.0)));
        assert_eq!(e.start(60.0, 0.0), Err(DahditError::InvalidSpeed(0.0)));
        assert_eq!(e.start(-5.0, 20.0), Err(DahditError::InvalidDuration(-5.0)));
        assert_eq!(e.state(), SessionState::Idle);
    }

    #[test]
    fn start_rejects_session_too_long_for_the_clock() {
        let (mut e, _, _) = engine("E");
        assert_eq!(e.start(1e19, 20.0), Err(DahditError::InvalidDuration(1e19)));
        assert_eq!(
            e.start(f64::MAX, 20.0),
            Err(DahditError::InvalidDuration(f64::MAX))
        );
        assert_eq!(e.state(), SessionState::Idle);
        assert!(e.start(600.0, 20.0).is_ok());
    }

    #[test]
    fn start_rejects_speed_too_slow_to_render() {
        let (mut e, clock, probe) = engine("0");
        assert_eq!(e.start(60.0, 1e-9), Err(DahditError::InvalidSpeed(1e-9)));
        // '0' is 19 units: 22.8s at 1 wpm
        assert_eq!(e.start(60.0, 1.0), Err(DahditError::InvalidSpeed(1.0)));
        assert_eq!(e.state(), SessionState::Idle);

        e.start(60.0, 2.0).unwrap();
        advance(&mut e, &clock, 1000);
        assert_eq!(e.state(), SessionState::AwaitingResponse);
        assert_eq!(probe.started().len(), 1);
    }

    #[test]
    fn set_wpm_rejects_speed_too_slow_to_render() {
        let (mut e, _, _) = engine("E");
        e.start(60.0, 20.0).unwrap();
        assert_eq!(e.set_wpm(1e-9), Err(DahditError::InvalidSpeed(1e-9)));
        assert_eq!(e.timing().unwrap().wpm(), 20.0);
    }

    #[test]
    fn start_rejects_envelope_longer_than_dot() {
        let clock = ManualClock::new();
        let (output, _) = RecordingOutput::new();
        let tone = ToneSpec {
            envelope_ms: 30.0,
            ..ToneSpec::default()
        };
        let mut e = SessionEngine::new(
            clock,
            ScriptedSource::new("E"),
            PlaybackController::with_output(Box::new(output)),
            tone,
        )
        .unwrap();

        // 60 wpm dot is 20ms
        assert_matches!(e.start(10.0, 60.0), Err(DahditError::InvalidToneSpec(_)));
        assert_eq!(e.state(), SessionState::Idle);
        assert!(e.start(10.0, 20.0).is_ok());
    }

    #[test]
    fn new_rejects_invalid_tone_spec() {
        let (output, _) = RecordingOutput::new();
        let result = SessionEngine::new(
            ManualClock::new(),
            ScriptedSource::new("E"),
            PlaybackController::with_output(Box::new(output)),
            ToneSpec {
                frequency_hz: -1.0,
                ..ToneSpec::default()
            },
        );
        assert_matches!(result.err(), Some(DahditError::InvalidToneSpec(_)));
    }

    #[test]
    fn first_prompt_waits_for_lead_in() {
        let (mut e, clock, probe) = engine("K");
        let rx = e.subscribe();
        e.start(60.0, 20.0).unwrap();
        assert_eq!(e.state(), SessionState::LeadIn);

        advance(&mut e, &clock, 999);
        assert_eq!(e.state(), SessionState::LeadIn);
        assert!(probe.started().is_empty());

        advance(&mut e, &clock, 1);
        assert_eq!(e.state(), SessionState::AwaitingResponse);
        assert_eq!(
            drain(&rx),
            vec![SessionUpdate::Prompted {
                round_id: 1,
                character: 'K'
            }]
        );
        assert_eq!(probe.started().len(), 1);
    }

    #[test]
    fn lead_in_and_timeout_can_be_tuned() {
        let clock = ManualClock::new();
        let (output, _) = RecordingOutput::new();
        let mut e = SessionEngine::new(
            clock.clone(),
            ScriptedSource::new("E"),
            PlaybackController::with_output(Box::new(output)),
            ToneSpec::default(),
        )
        .unwrap()
        .with_lead_in(Duration::from_millis(200))
        .with_response_timeout(Duration::from_secs(3));
        e.start(60.0, 20.0).unwrap();

        advance(&mut e, &clock, 200);
        assert_eq!(e.state(), SessionState::AwaitingResponse);

        advance(&mut e, &clock, 2999);
        assert_eq!(e.current_round().unwrap().replay_count, 0);
        advance(&mut e, &clock, 1);
        assert_eq!(e.current_round().unwrap().replay_count, 1);
    }

    #[test]
    fn correct_key_scores_and_cancels_timeout() {
        let (mut e, clock, probe) = engine("AB");
        let rx = e.subscribe();
        e.start(60.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);

        clock.advance_ms(700);
        e.handle(SessionEvent::Key('a'));

        assert_eq!(e.state(), SessionState::Resolved);
        let round = e.current_round().unwrap();
        assert!(round.resolved);
        assert_eq!(round.correct, Some(true));
        assert_eq!(round.response_latency, Some(Duration::from_millis(700)));
        let tally = e.stats().tally('A');
        assert_eq!((tally.attempts, tally.correct), (1, 1));
        assert_eq!(tally.total_latency, Duration::from_millis(700));

        // inter-character gap at 20 wpm is 180ms, then B is prompted
        advance(&mut e, &clock, 180);
        assert_eq!(e.current_round().unwrap().character, 'B');

        // past A's 1.5s timeout but not yet B's
        advance(&mut e, &clock, 1000);
        let updates = drain(&rx);
        assert!(!updates
            .iter()
            .any(|u| matches!(u, SessionUpdate::Replayed { .. })));
        assert_eq!(probe.started().len(), 2);
    }

    #[test]
    fn no_replay_after_correct_answer() {
        let (mut e, clock, probe) = engine("E");
        let rx = e.subscribe();
        // 4 wpm: 900ms gap before the next prompt, whose own timeout lands at 2.5s
        e.start(60.0, 4.0).unwrap();
        advance(&mut e, &clock, 1000);
        e.handle(SessionEvent::Key('E'));

        for _ in 0..10 {
            advance(&mut e, &clock, 200);
        }

        assert_eq!(e.current_round().unwrap().id, 2);
        assert_eq!(e.current_round().unwrap().replay_count, 0);
        assert!(!drain(&rx)
            .iter()
            .any(|u| matches!(u, SessionUpdate::Replayed { .. })));
        assert_eq!(probe.started().len(), 2);
    }

    #[test]
    fn mismatch_keeps_round_open() {
        let (mut e, clock, _) = engine("M");
        let rx = e.subscribe();
        e.start(60.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);
        drain(&rx);

        clock.advance_ms(300);
        e.handle(SessionEvent::Key('n'));

        assert_eq!(e.state(), SessionState::AwaitingResponse);
        let round = e.current_round().unwrap();
        assert!(!round.resolved);
        assert_eq!(round.correct, Some(false));
        let tally = e.stats().tally('M');
        assert_eq!((tally.attempts, tally.correct), (1, 0));

        let updates = drain(&rx);
        assert_matches!(
            updates.as_slice(),
            [SessionUpdate::Answered(Attempt { character: 'M', pressed: 'N', correct: false, .. })]
        );

        e.handle(SessionEvent::Key('m'));
        assert_eq!(e.state(), SessionState::Resolved);
        assert_eq!(e.current_round().unwrap().correct, Some(true));
        assert_eq!(e.stats().tally('M').attempts, 2);
    }

    #[test]
    fn mismatch_does_not_reset_timer() {
        let (mut e, clock, _) = engine("M");
        e.start(60.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);

        advance(&mut e, &clock, 1400);
        e.handle(SessionEvent::Key('x'));
        advance(&mut e, &clock, 100);

        assert_eq!(e.current_round().unwrap().replay_count, 1);
    }

    #[test]
    fn s_at_12_wpm_replays_once_at_one_and_a_half_seconds() {
        let (mut e, clock, probe) = engine("S");
        let rx = e.subscribe();
        e.start(60.0, 12.0).unwrap();
        advance(&mut e, &clock, 1000);
        drain(&rx);

        advance(&mut e, &clock, 1499);
        assert_eq!(e.current_round().unwrap().replay_count, 0);

        advance(&mut e, &clock, 1);
        let round = e.current_round().unwrap();
        assert_eq!(round.replay_count, 1);
        assert!(!round.resolved);
        assert_eq!(e.state(), SessionState::AwaitingResponse);
        assert_eq!(
            drain(&rx),
            vec![SessionUpdate::Replayed {
                round_id: 1,
                character: 'S',
                replay_count: 1
            }]
        );
        // the replay is the same 500ms of audio
        let started = probe.started();
        assert_eq!(started.len(), 2);
        assert_eq!(started[0], started[1]);
    }

    #[test]
    fn replays_once_per_timeout_and_count_grows() {
        let (mut e, clock, _) = engine("S");
        e.start(60.0, 12.0).unwrap();
        advance(&mut e, &clock, 1000);

        let mut last = 0;
        for step in 1..=30 {
            advance(&mut e, &clock, 250);
            let count = e.current_round().unwrap().replay_count;
            assert!(count >= last);
            last = count;
            assert_eq!(count, (step * 250) / 1500);
        }
    }

    #[test]
    fn replay_halts_previous_tone() {
        let (mut e, clock, probe) = engine("S");
        e.start(60.0, 12.0).unwrap();
        advance(&mut e, &clock, 1000);
        advance(&mut e, &clock, 1500);

        let events = probe.events();
        assert_matches!(
            events.as_slice(),
            [
                OutputEvent::Started { .. },
                OutputEvent::Halted,
                OutputEvent::Started { .. }
            ]
        );
    }

    #[test]
    fn long_characters_are_not_cut_off_by_their_replay() {
        let (mut e, clock, _) = engine("0");
        // at 5 wpm '0' lasts 4.56s, plus a 720ms gap
        e.start(60.0, 5.0).unwrap();
        advance(&mut e, &clock, 1000);

        advance(&mut e, &clock, 5000);
        assert_eq!(e.current_round().unwrap().replay_count, 0);
        advance(&mut e, &clock, 280);
        assert_eq!(e.current_round().unwrap().replay_count, 1);
    }

    #[test]
    fn wpm_change_applies_to_next_character_only() {
        let (mut e, clock, probe) = engine("EE");
        e.start(60.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);

        e.set_wpm(10.0).unwrap();
        assert_eq!(e.current_round().unwrap().timing.wpm(), 20.0);

        // replay of the running round stays at 20 wpm
        advance(&mut e, &clock, 1500);
        e.handle(SessionEvent::Key('e'));
        advance(&mut e, &clock, 180);
        assert_eq!(e.current_round().unwrap().timing.wpm(), 10.0);

        let started = probe.started();
        assert_eq!(started.len(), 3);
        assert_eq!(started[0], started[1]);
        assert_eq!(started[2], 2 * started[0]);
    }

    #[test]
    fn set_wpm_rejects_invalid_speed() {
        let (mut e, _, _) = engine("E");
        e.start(60.0, 20.0).unwrap();
        assert_eq!(e.set_wpm(-1.0), Err(DahditError::InvalidSpeed(-1.0)));
        assert_eq!(e.timing().unwrap().wpm(), 20.0);
    }

    #[test]
    fn stop_mid_round_reports_logged_mismatch() {
        let (mut e, clock, probe) = engine("Q");
        let rx = e.subscribe();
        e.start(60.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);
        e.handle(SessionEvent::Key('z'));
        e.handle(SessionEvent::Stop);

        assert_eq!(e.state(), SessionState::Finished);
        let finished = drain(&rx)
            .into_iter()
            .find_map(|u| match u {
                SessionUpdate::Finished(stats) => Some(stats),
                _ => None,
            })
            .expect("finished update");
        assert!(finished.tally('Q').attempts >= 1);
        assert_eq!(finished.tally('Q').correct, 0);

        // the prompt is silenced and the bell plays
        let events = probe.events();
        assert_eq!(events[events.len() - 2], OutputEvent::Halted);
        assert_matches!(events.last(), Some(OutputEvent::Started { .. }));
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let (mut e, _, probe) = engine("E");
        e.stop();
        assert_eq!(e.state(), SessionState::Idle);
        assert!(probe.events().is_empty());
    }

    #[test]
    fn stop_is_not_repeated() {
        let (mut e, _, probe) = engine("E");
        let rx = e.subscribe();
        e.start(10.0, 20.0).unwrap();
        e.stop();
        e.stop();
        assert_eq!(probe.started().len(), 1);
        let finished = drain(&rx)
            .iter()
            .filter(|u| matches!(u, SessionUpdate::Finished(_)))
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn deadline_before_reply_leaves_zero_attempts() {
        let (mut e, clock, _) = engine("T");
        let rx = e.subscribe();
        e.start(5.0, 20.0).unwrap();
        for _ in 0..10 {
            advance(&mut e, &clock, 500);
        }

        assert_eq!(e.state(), SessionState::Finished);
        let stats = drain(&rx)
            .into_iter()
            .find_map(|u| match u {
                SessionUpdate::Finished(stats) => Some(stats),
                _ => None,
            })
            .unwrap();
        assert_eq!(stats.tally('T').attempts, 0);
        assert_eq!(stats.total_attempts(), 0);
    }

    #[test]
    fn keys_are_ignored_outside_a_round() {
        let (mut e, clock, _) = engine("E");
        e.handle(SessionEvent::Key('E'));
        e.start(60.0, 20.0).unwrap();
        e.handle(SessionEvent::Key('E'));
        assert!(e.stats().is_empty());

        advance(&mut e, &clock, 1000);
        e.handle(SessionEvent::Key('E'));
        // during the gap before the next prompt
        e.handle(SessionEvent::Key('E'));
        assert_eq!(e.stats().total_attempts(), 1);
    }

    #[test]
    fn round_ids_increase() {
        let (mut e, clock, _) = engine("ETA");
        let rx = e.subscribe();
        e.start(60.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);
        for c in ['E', 'T', 'A'] {
            e.handle(SessionEvent::Key(c));
            advance(&mut e, &clock, 180);
        }

        let ids: Vec<u64> = drain(&rx)
            .into_iter()
            .filter_map(|u| match u {
                SessionUpdate::Prompted { round_id, .. } => Some(round_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn unplayable_replay_finishes_the_session() {
        let (mut e, clock, _) = engine("E");
        let rx = e.subscribe();
        e.start(60.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);
        e.round.as_mut().unwrap().character = '#';

        advance(&mut e, &clock, 1500);

        assert_eq!(e.state(), SessionState::Finished);
        assert!(e.response_timer.is_none());
        assert!(drain(&rx)
            .iter()
            .any(|u| matches!(u, SessionUpdate::Finished(_))));
    }

    #[test]
    fn stale_timer_is_ignored() {
        let (mut e, clock, _) = engine("EE");
        e.start(60.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);
        let stale = e.response_timer.unwrap();
        e.handle(SessionEvent::Key('E'));
        advance(&mut e, &clock, 180);

        clock.advance_ms(1500);
        let now = clock.now();
        e.on_response_timeout(stale.round_id, now);

        assert_eq!(e.current_round().unwrap().id, 2);
        assert_eq!(e.current_round().unwrap().replay_count, 0);
    }

    #[test]
    fn restart_after_finish_resets_stats() {
        let (mut e, clock, _) = engine("E");
        e.start(60.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);
        e.handle(SessionEvent::Key('E'));
        e.stop();
        assert_eq!(e.stats().total_attempts(), 1);

        e.start(60.0, 20.0).unwrap();
        assert_eq!(e.state(), SessionState::LeadIn);
        assert!(e.stats().is_empty());
        assert!(e.current_round().is_none());
    }

    #[test]
    fn remaining_counts_down() {
        let (mut e, clock, _) = engine("E");
        assert_eq!(e.remaining(), None);
        e.start(10.0, 20.0).unwrap();
        clock.advance_ms(2500);
        assert_eq!(e.remaining(), Some(Duration::from_millis(7500)));
    }

    #[test]
    fn runs_silently_without_audio() {
        let clock = ManualClock::new();
        let mut e = SessionEngine::new(
            clock.clone(),
            ScriptedSource::new("E"),
            PlaybackController::unavailable(DahditError::AudioUnavailable("none".into())),
            ToneSpec::default(),
        )
        .unwrap();
        e.start(5.0, 20.0).unwrap();
        advance(&mut e, &clock, 1000);
        assert_eq!(e.state(), SessionState::AwaitingResponse);
        assert!(!e.is_sounding());
        e.handle(SessionEvent::Key('E'));
        assert_eq!(e.stats().total_correct(), 1);
        assert_matches!(e.audio_status(), AudioStatus::Unavailable(_));
    }
}
