//! Voice processing module
//!
//! Handles audio capture, utterance detection, wake phrase matching,
//! speech recognition and spoken output.

mod capture;
mod front_end;
mod playback;
mod speaker;
mod stt;
mod tts;
mod utterance;
mod wake_word;

pub use capture::{AudioCapture, AudioSample, SAMPLE_RATE, rms_energy, samples_to_wav};
pub use front_end::{AudioInput, Heard, Microphone, ThresholdPolicy};
pub use playback::{AudioOutput, AudioPlayback, DecodedAudio, decode_mp3, decode_wav};
pub use speaker::{SHORTENED_DISCLAIMER, Speaker, SpeechLimits, display_excerpt, prepare_speech};
pub use stt::{Recognition, SpeechRecognizer, SpeechToText, Transcriber, Transcript};
pub use tts::{AudioFormat, EspeakSynthesizer, SpeechSynthesizer, SynthesizedAudio, TextToSpeech};
pub use utterance::{
    DetectorState, FRAME_SAMPLES, UtteranceDetector, UtteranceEvent, UtteranceSettings,
};
pub use wake_word::{WakeMatch, WakeWordSet};
