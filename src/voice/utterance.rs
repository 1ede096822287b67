//! Energy-based utterance detection
//!
//! Splits a live sample stream into utterances: speech onset when a frame's
//! RMS energy crosses the calibrated threshold, end of utterance after a
//! pause of silence.

use std::collections::VecDeque;

use super::capture::rms_energy;

/// Frame size used for energy decisions (20ms at 16kHz)
pub const FRAME_SAMPLES: usize = 320;

/// State of the utterance detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Speech onset seen, accumulating the utterance
    Speaking,
}

/// Outcome of feeding samples to the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceEvent {
    /// No speech yet
    Waiting,
    /// Inside an utterance
    Speaking,
    /// Speech followed by a full pause; call `take_utterance`
    Complete,
}

/// Tuning for the detector, all lengths in samples
#[derive(Debug, Clone, Copy)]
pub struct UtteranceSettings {
    /// RMS energy above which a frame counts as speech
    pub threshold: f32,
    /// Silence needed to end an utterance
    pub pause_samples: usize,
    /// Voiced audio needed for an utterance to count
    pub min_speech_samples: usize,
    /// Audio kept from before the onset
    pub pre_roll_samples: usize,
}

/// Detects utterance boundaries in a sample stream
pub struct UtteranceDetector {
    settings: UtteranceSettings,
    state: DetectorState,
    pending: Vec<f32>,
    pre_roll: VecDeque<f32>,
    speech_buffer: Vec<f32>,
    voiced_samples: usize,
    silence_counter: usize,
}

impl UtteranceDetector {
    /// Create a detector in the idle state
    #[must_use]
    pub fn new(settings: UtteranceSettings) -> Self {
        Self {
            settings,
            state: DetectorState::Idle,
            pending: Vec::with_capacity(FRAME_SAMPLES),
            pre_roll: VecDeque::with_capacity(settings.pre_roll_samples),
            speech_buffer: Vec::new(),
            voiced_samples: 0,
            silence_counter: 0,
        }
    }

    /// Feed freshly captured samples
    pub fn feed(&mut self, samples: &[f32]) -> UtteranceEvent {
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= FRAME_SAMPLES {
            let frame: Vec<f32> = self.pending.drain(..FRAME_SAMPLES).collect();
            if self.process_frame(&frame) {
                return UtteranceEvent::Complete;
            }
        }

        match self.state {
            DetectorState::Idle => UtteranceEvent::Waiting,
            DetectorState::Speaking => UtteranceEvent::Speaking,
        }
    }

    /// Returns true when the frame completes an utterance
    fn process_frame(&mut self, frame: &[f32]) -> bool {
        let energy = rms_energy(frame);
        let is_speech = energy > self.settings.threshold;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend(self.pre_roll.drain(..));
                    self.speech_buffer.extend_from_slice(frame);
                    self.voiced_samples = frame.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech onset");
                } else {
                    self.pre_roll.extend(frame.iter().copied());
                    while self.pre_roll.len() > self.settings.pre_roll_samples {
                        self.pre_roll.pop_front();
                    }
                }
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(frame);

                if is_speech {
                    self.voiced_samples += frame.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += frame.len();
                }

                if self.silence_counter >= self.settings.pause_samples {
                    if self.voiced_samples >= self.settings.min_speech_samples {
                        tracing::trace!(
                            samples = self.speech_buffer.len(),
                            "utterance complete"
                        );
                        return true;
                    }

                    // Too short to be speech
                    tracing::trace!(voiced = self.voiced_samples, "discarding blip");
                    self.reset();
                }
            }
        }

        false
    }

    /// Take the accumulated utterance and return to idle
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let utterance = std::mem::take(&mut self.speech_buffer);
        self.reset();
        utterance
    }

    /// Get the accumulated speech buffer
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Reset detector to idle state
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.pre_roll.clear();
        self.voiced_samples = 0;
        self.silence_counter = 0;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}
