//! Best-effort audio output.
//!
//! `PlaybackController` owns at most one playing tone. The device itself sits
//! behind [`AudioOutput`]; when no device can be opened the controller keeps
//! working without one and every handle it returns is null.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info, warn};

use crate::error::DahditError;
use crate::tone::RenderedTone;

/// Identifies one call to [`PlaybackController::play`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    pub const NULL: PlaybackHandle = PlaybackHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A sink that can play one buffer at a time
pub trait AudioOutput {
    /// Replace whatever is playing with `tone`; send `handle` on `done` when it ends.
    fn start(&mut self, handle: PlaybackHandle, tone: RenderedTone, done: Sender<PlaybackHandle>);
    /// Silence output immediately
    fn halt(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioStatus {
    Available,
    Unavailable(DahditError),
}

pub struct PlaybackController {
    output: Option<Box<dyn AudioOutput>>,
    status: AudioStatus,
    current: Option<PlaybackHandle>,
    next_id: u64,
    done_tx: Sender<PlaybackHandle>,
    done_rx: Receiver<PlaybackHandle>,
}

impl PlaybackController {
    /// Open the host's default output device, downgrading to silence on failure
    pub fn open_default() -> Self {
        match CpalOutput::open() {
            Ok(output) => Self::with_output(Box::new(output)),
            Err(e) => Self::unavailable(e),
        }
    }

    pub fn with_output(output: Box<dyn AudioOutput>) -> Self {
        let (done_tx, done_rx) = mpsc::channel();
        Self {
            output: Some(output),
            status: AudioStatus::Available,
            current: None,
            next_id: 1,
            done_tx,
            done_rx,
        }
    }

    /// Controller without a device. The reason is logged here, once.
    pub fn unavailable(reason: DahditError) -> Self {
        warn!("{reason}; continuing without sound");
        let (done_tx, done_rx) = mpsc::channel();
        Self {
            output: None,
            status: AudioStatus::Unavailable(reason),
            current: None,
            next_id: 1,
            done_tx,
            done_rx,
        }
    }

    pub fn audio_status(&self) -> &AudioStatus {
        &self.status
    }

    /// Start `tone`, cutting off anything still playing
    pub fn play(&mut self, tone: RenderedTone) -> PlaybackHandle {
        let Some(output) = self.output.as_mut() else {
            return PlaybackHandle::NULL;
        };
        if self.current.take().is_some() {
            output.halt();
        }

        let handle = PlaybackHandle(self.next_id);
        self.next_id += 1;
        debug!(
            handle = handle.0,
            samples = tone.len(),
            "starting playback"
        );
        output.start(handle, tone, self.done_tx.clone());
        self.current = Some(handle);
        handle
    }

    /// Stop `handle` if it is still the active playback; otherwise nothing happens
    pub fn cancel(&mut self, handle: PlaybackHandle) {
        if handle.is_null() || self.current != Some(handle) {
            return;
        }
        if let Some(output) = self.output.as_mut() {
            output.halt();
        }
        self.current = None;
    }

    pub fn cancel_current(&mut self) {
        if let Some(handle) = self.current {
            self.cancel(handle);
        }
    }

    pub fn is_playing(&self, handle: PlaybackHandle) -> bool {
        !handle.is_null() && self.current == Some(handle)
    }

    pub fn current(&self) -> Option<PlaybackHandle> {
        self.current
    }

    /// Drain completion notices; returns the current handle if it just finished.
    /// Completions of cancelled or superseded handles are dropped.
    pub fn poll_finished(&mut self) -> Option<PlaybackHandle> {
        let mut finished = None;
        while let Ok(handle) = self.done_rx.try_recv() {
            if self.current == Some(handle) {
                self.current = None;
                finished = Some(handle);
            }
        }
        finished
    }
}

struct ActiveTone {
    handle: PlaybackHandle,
    samples: Vec<f32>,
    /// Source samples advanced per device frame
    step: f64,
    pos: f64,
    done: Sender<PlaybackHandle>,
}

#[derive(Default)]
struct Voice {
    active: Option<ActiveTone>,
}

impl Voice {
    fn next_sample(&mut self) -> f32 {
        let Some(tone) = self.active.as_mut() else {
            return 0.0;
        };
        let idx = tone.pos as usize;
        if idx < tone.samples.len() {
            tone.pos += tone.step;
            return tone.samples[idx];
        }
        if let Some(tone) = self.active.take() {
            let _ = tone.done.send(tone.handle);
        }
        0.0
    }
}

/// cpal output stream playing mono buffers on every device channel
pub struct CpalOutput {
    voice: Arc<Mutex<Voice>>,
    device_rate: u32,
    _stream: cpal::Stream,
}

impl CpalOutput {
    pub fn open() -> Result<Self, DahditError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| DahditError::AudioUnavailable("no audio output device found".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| DahditError::AudioUnavailable(format!("no output config: {e}")))?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(DahditError::AudioUnavailable(format!(
                "unsupported sample format {:?}",
                supported.sample_format()
            )));
        }

        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels.max(1) as usize;
        let device_rate = config.sample_rate.0;

        let voice = Arc::new(Mutex::new(Voice::default()));
        let voice_cb = Arc::clone(&voice);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut voice = voice_cb.lock().unwrap_or_else(|e| e.into_inner());
                    for frame in data.chunks_mut(channels) {
                        let sample = voice.next_sample();
                        frame.fill(sample);
                    }
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| DahditError::AudioUnavailable(format!("failed to build stream: {e}")))?;

        stream
            .play()
            .map_err(|e| DahditError::AudioUnavailable(format!("failed to start stream: {e}")))?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!(
            device = %device_name,
            rate = device_rate,
            channels,
            "audio output ready"
        );

        Ok(Self {
            voice,
            device_rate,
            _stream: stream,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn start(&mut self, handle: PlaybackHandle, tone: RenderedTone, done: Sender<PlaybackHandle>) {
        let step = tone.sample_rate as f64 / self.device_rate as f64;
        let mut voice = self.voice.lock().unwrap_or_else(|e| e.into_inner());
        voice.active = Some(ActiveTone {
            handle,
            samples: tone.samples,
            step,
            pos: 0.0,
            done,
        });
    }

    fn halt(&mut self) {
        let mut voice = self.voice.lock().unwrap_or_else(|e| e.into_inner());
        voice.active = None;
    }
}

/// What a [`RecordingOutput`] was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Started {
        handle: PlaybackHandle,
        samples: usize,
    },
    Halted,
}

#[derive(Default)]
struct Recording {
    events: Vec<OutputEvent>,
    active: Option<(PlaybackHandle, Sender<PlaybackHandle>)>,
}

/// Output for headless runs and tests: remembers calls instead of making sound.
/// Completion is driven by hand through [`OutputProbe::finish_current`].
#[derive(Default)]
pub struct RecordingOutput {
    shared: Arc<Mutex<Recording>>,
}

/// Read side of a [`RecordingOutput`]
#[derive(Clone)]
pub struct OutputProbe {
    shared: Arc<Mutex<Recording>>,
}

impl RecordingOutput {
    pub fn new() -> (Self, OutputProbe) {
        let shared = Arc::new(Mutex::new(Recording::default()));
        let probe = OutputProbe {
            shared: Arc::clone(&shared),
        };
        (Self { shared }, probe)
    }
}

impl AudioOutput for RecordingOutput {
    fn start(&mut self, handle: PlaybackHandle, tone: RenderedTone, done: Sender<PlaybackHandle>) {
        let mut rec = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        rec.events.push(OutputEvent::Started {
            handle,
            samples: tone.len(),
        });
        rec.active = Some((handle, done));
    }

    fn halt(&mut self) {
        let mut rec = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        rec.events.push(OutputEvent::Halted);
        rec.active = None;
    }
}

impl OutputProbe {
    pub fn events(&self) -> Vec<OutputEvent> {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .events
            .clone()
    }

    /// Sample counts of every started buffer, in order
    pub fn started(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OutputEvent::Started { samples, .. } => Some(samples),
                OutputEvent::Halted => None,
            })
            .collect()
    }

    pub fn is_active(&self) -> bool {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active
            .is_some()
    }

    /// Pretend the device reached the end of the active buffer
    pub fn finish_current(&self) -> Option<PlaybackHandle> {
        let mut rec = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        let (handle, done) = rec.active.take()?;
        let _ = done.send(handle);
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> RenderedTone {
        RenderedTone {
            samples: vec![0.5; len],
            sample_rate: 8_000,
        }
    }

    fn recording_controller() -> (PlaybackController, OutputProbe) {
        let (output, probe) = RecordingOutput::new();
        (PlaybackController::with_output(Box::new(output)), probe)
    }

    #[test]
    fn play_returns_distinct_handles() {
        let (mut pc, probe) = recording_controller();
        let a = pc.play(tone(10));
        let b = pc.play(tone(20));

        assert_ne!(a, b);
        assert!(!a.is_null() && !b.is_null());
        assert!(!pc.is_playing(a));
        assert!(pc.is_playing(b));
        assert_eq!(probe.started(), vec![10, 20]);
    }

    #[test]
    fn new_playback_halts_previous() {
        let (mut pc, probe) = recording_controller();
        pc.play(tone(10));
        pc.play(tone(10));

        assert_eq!(
            probe.events()[1],
            OutputEvent::Halted,
            "second play must silence the first"
        );
    }

    #[test]
    fn cancel_is_idempotent() {
        let (mut pc, probe) = recording_controller();
        let h = pc.play(tone(10));
        pc.cancel(h);
        pc.cancel(h);

        let halts = probe
            .events()
            .iter()
            .filter(|e| **e == OutputEvent::Halted)
            .count();
        assert_eq!(halts, 1);
        assert_eq!(pc.current(), None);
    }

    #[test]
    fn cancel_of_superseded_handle_leaves_current_alone() {
        let (mut pc, _probe) = recording_controller();
        let old = pc.play(tone(10));
        let new = pc.play(tone(10));
        pc.cancel(old);
        assert!(pc.is_playing(new));
    }

    #[test]
    fn completion_is_reported_once() {
        let (mut pc, probe) = recording_controller();
        let h = pc.play(tone(10));
        assert_eq!(pc.poll_finished(), None);

        probe.finish_current();
        assert_eq!(pc.poll_finished(), Some(h));
        assert_eq!(pc.poll_finished(), None);
        assert!(!pc.is_playing(h));
    }

    #[test]
    fn completion_after_cancel_is_skipped() {
        let (mut pc, probe) = recording_controller();
        let late_tx = pc.done_tx.clone();
        let h = pc.play(tone(10));
        pc.cancel(h);
        // a late notice from the device thread
        late_tx.send(h).unwrap();
        assert_eq!(pc.poll_finished(), None);
        assert!(!probe.is_active());
    }

    #[test]
    fn unavailable_controller_is_a_no_op() {
        let mut pc =
            PlaybackController::unavailable(DahditError::AudioUnavailable("test".into()));
        let h = pc.play(tone(10));

        assert!(h.is_null());
        pc.cancel(h);
        pc.cancel_current();
        assert_eq!(pc.poll_finished(), None);
        assert_matches::assert_matches!(pc.audio_status(), AudioStatus::Unavailable(_));
    }

    #[test]
    fn voice_resamples_and_signals_end() {
        let (tx, rx) = mpsc::channel();
        let mut voice = Voice {
            active: Some(ActiveTone {
                handle: PlaybackHandle(7),
                samples: vec![1.0, 2.0, 3.0, 4.0],
                step: 2.0,
                pos: 0.0,
                done: tx,
            }),
        };

        assert_eq!(voice.next_sample(), 1.0);
        assert_eq!(voice.next_sample(), 3.0);
        assert_eq!(voice.next_sample(), 0.0);
        assert_eq!(rx.try_recv(), Ok(PlaybackHandle(7)));
        assert!(voice.active.is_none());
        assert_eq!(voice.next_sample(), 0.0);
    }
}
