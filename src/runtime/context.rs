//! Per-run character context supplied by the interaction layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The animation request being performed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationContext {
    /// Animation name, for logs.
    pub name: String,
    /// Text the animation was authored to speak, if any.
    pub speak: Option<String>,
    /// Text actually spoken after personalization; set by SPEAK-class verbs.
    pub spoken_text: Option<String>,
    /// Speech-rate override.
    pub speech_rate: Option<f64>,
    /// Voice override.
    pub voice: Option<String>,
    /// Silence trimmed from rendered speech.
    pub trim_silence_ms: u64,
    /// Whether speech text is SSML.
    pub use_ssml: bool,
    /// Volume override for this animation.
    pub volume: Option<u8>,
    /// Audio file name speech is rendered to; generated when absent.
    pub speech_file: Option<String>,
    /// Values for `{token}` substitution.
    pub variables: BTreeMap<String, String>,
}

/// The conversation interaction the animation belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionContext {
    /// Interaction name, for logs.
    pub name: String,
    /// Maximum wait for speech to start when listening.
    pub listen_timeout_ms: u64,
    /// Trailing silence that ends a capture.
    pub silence_timeout_ms: u64,
    /// Whether the key phrase may interrupt this interaction.
    pub allow_key_phrase: bool,
    /// Start listening once the current utterance finishes.
    pub listen_after_speech: bool,
    /// Recognition engine used by LISTEN.
    pub speech_engine: String,
    /// Transcript of the most recent capture, as recorded by the interaction
    /// layer when it handles a `SpeechHeard` event.
    pub last_transcript: Option<String>,
    /// Values for `{token}` substitution.
    pub variables: BTreeMap<String, String>,
}

impl Default for InteractionContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            listen_timeout_ms: 6000,
            silence_timeout_ms: 2000,
            allow_key_phrase: false,
            listen_after_speech: false,
            speech_engine: "default".to_string(),
            last_transcript: None,
            variables: BTreeMap::new(),
        }
    }
}
