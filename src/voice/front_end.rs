//! Microphone front end
//!
//! Owns ambient-noise calibration and the blocking "listen for an utterance"
//! operation used by the conversation engine. The input device is opened at
//! the start of every call and released when the call returns, whatever the
//! outcome.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::capture::{AudioCapture, AudioSample, SAMPLE_RATE, rms_energy};
use super::utterance::{UtteranceDetector, UtteranceEvent, UtteranceSettings};
use crate::config::ListenConfig;
use crate::Result;

/// How often the capture buffer is drained while listening
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Speech needed before an utterance counts (0.3 seconds)
const MIN_SPEECH: Duration = Duration::from_millis(300);

/// Audio kept from before the speech onset
const PRE_ROLL: Duration = Duration::from_millis(300);

/// Result of a listen call
#[derive(Debug, Clone, PartialEq)]
pub enum Heard {
    /// A complete (or phrase-capped) utterance
    Speech(AudioSample),
    /// No speech onset before the timeout
    Timeout,
}

/// Source of spoken utterances
#[async_trait(?Send)]
pub trait AudioInput {
    /// Sample ambient noise and derive the speech energy threshold
    ///
    /// # Errors
    ///
    /// Returns error if the input device cannot be used
    async fn calibrate(&mut self, duration: Duration) -> Result<f32>;

    /// Wait for an utterance
    ///
    /// `timeout` bounds the wait for speech onset; `None` waits forever.
    /// `phrase_limit` caps the utterance length once speech has started.
    ///
    /// # Errors
    ///
    /// Returns error if the input device cannot be used
    async fn listen(&mut self, timeout: Option<Duration>, phrase_limit: Duration) -> Result<Heard>;
}

/// Energy threshold limits derived from configuration
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    /// Lowest threshold ever used
    pub floor: f32,
    /// Highest threshold ever used (noisy rooms calibrate too high)
    pub ceiling: f32,
    /// Threshold as a multiple of the ambient RMS
    pub ratio: f32,
}

impl ThresholdPolicy {
    /// Threshold for a measured ambient RMS
    #[must_use]
    pub fn threshold_for(&self, ambient_rms: f32) -> f32 {
        let raw = ambient_rms * self.ratio;
        if raw > self.ceiling {
            tracing::warn!(
                calibrated = raw,
                ceiling = self.ceiling,
                "ambient noise too high, clamping energy threshold"
            );
        }
        raw.clamp(self.floor, self.ceiling)
    }
}

/// Default input device with energy-based utterance detection
pub struct Microphone {
    policy: ThresholdPolicy,
    threshold: f32,
    pause: Duration,
}

impl Microphone {
    /// Create a microphone front end
    ///
    /// The threshold starts at the policy floor until `calibrate` runs.
    ///
    /// # Errors
    ///
    /// Returns error if no usable input device exists
    pub fn new(config: &ListenConfig) -> Result<Self> {
        // Probe once so a missing device fails at startup rather than in the loop
        drop(AudioCapture::new()?);

        let policy = ThresholdPolicy {
            floor: config.energy_floor,
            ceiling: config.energy_ceiling,
            ratio: config.energy_ratio,
        };

        Ok(Self {
            policy,
            threshold: policy.floor,
            pause: config.pause,
        })
    }

    /// Current speech energy threshold
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    fn detector(&self) -> UtteranceDetector {
        UtteranceDetector::new(UtteranceSettings {
            threshold: self.threshold,
            pause_samples: samples_for(self.pause),
            min_speech_samples: samples_for(MIN_SPEECH),
            pre_roll_samples: samples_for(PRE_ROLL),
        })
    }
}

#[async_trait(?Send)]
impl AudioInput for Microphone {
    async fn calibrate(&mut self, duration: Duration) -> Result<f32> {
        let capture = AudioCapture::open()?;
        tokio::time::sleep(duration).await;
        let ambient = rms_energy(&capture.take_buffer());
        drop(capture);

        self.threshold = self.policy.threshold_for(ambient);
        tracing::info!(ambient, threshold = self.threshold, "microphone calibrated");
        Ok(self.threshold)
    }

    async fn listen(&mut self, timeout: Option<Duration>, phrase_limit: Duration) -> Result<Heard> {
        let mut feed = LiveFeed::open()?;
        let mut detector = self.detector();
        Ok(capture_utterance(&mut feed, &mut detector, timeout, phrase_limit).await)
    }
}

/// Captured audio arriving in polled chunks, with a clock
trait SampleFeed {
    /// Wait one poll interval and return what was captured meanwhile
    async fn next_chunk(&mut self) -> Vec<f32>;

    /// Time since the feed was opened
    fn elapsed(&self) -> Duration;
}

/// The default input device, drained every `POLL_INTERVAL`
struct LiveFeed {
    capture: AudioCapture,
    opened: Instant,
}

impl LiveFeed {
    fn open() -> Result<Self> {
        Ok(Self {
            capture: AudioCapture::open()?,
            opened: Instant::now(),
        })
    }
}

impl SampleFeed for LiveFeed {
    async fn next_chunk(&mut self) -> Vec<f32> {
        tokio::time::sleep(POLL_INTERVAL).await;
        self.capture.take_buffer()
    }

    fn elapsed(&self) -> Duration {
        self.opened.elapsed()
    }
}

/// Poll a feed until an utterance completes or the onset timeout passes
///
/// `timeout` only applies while no speech has started; `None` waits
/// forever. Once speech starts, `phrase_limit` caps the utterance.
async fn capture_utterance<F: SampleFeed>(
    feed: &mut F,
    detector: &mut UtteranceDetector,
    timeout: Option<Duration>,
    phrase_limit: Duration,
) -> Heard {
    let mut onset: Option<Duration> = None;

    loop {
        let chunk = feed.next_chunk().await;
        let now = feed.elapsed();

        match detector.feed(&chunk) {
            UtteranceEvent::Complete => {
                return Heard::Speech(AudioSample::new(detector.take_utterance(), SAMPLE_RATE));
            }
            UtteranceEvent::Speaking => {
                let since = *onset.get_or_insert(now);
                if now.saturating_sub(since) >= phrase_limit {
                    tracing::debug!(?phrase_limit, "phrase limit reached");
                    return Heard::Speech(AudioSample::new(detector.take_utterance(), SAMPLE_RATE));
                }
            }
            UtteranceEvent::Waiting => {
                onset = None;
                if timeout.is_some_and(|t| now >= t) {
                    return Heard::Timeout;
                }
            }
        }
    }
}

/// Number of capture samples in a duration
#[allow(clippy::cast_possible_truncation)]
fn samples_for(duration: Duration) -> usize {
    (duration.as_millis() as usize * SAMPLE_RATE as usize) / 1000
}
