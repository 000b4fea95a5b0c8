//! Capability seams consumed by the script engine.
//!
//! Concrete robot SDKs, speech providers and peer transports live outside this
//! crate; the engine only sees the traits below. Every movement-style call is
//! non-blocking from the script's point of view: implementations return once the
//! request is accepted, not when the hardware settles.

use crate::runtime::context::{AnimationContext, InteractionContext};
use crate::runtime::error::{CapabilityResult, TransportResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// reqwest-backed peer transport.
pub mod http;
/// Recording implementation used for dry runs and tests.
pub mod recording;

pub use http::HttpPeerTransport;
pub use recording::{CapabilityCall, RecordingCapabilities};

/// How a movement reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MoveTiming {
    /// Arrive after the given number of milliseconds.
    Duration(u64),
    /// Move at the given velocity (0-100).
    Velocity(f64),
}

/// Target head pose in degrees; `None` leaves an axis where it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Pitch (negative looks up).
    pub pitch: Option<f64>,
    /// Roll.
    pub roll: Option<f64>,
    /// Yaw (positive looks left).
    pub yaw: Option<f64>,
}

/// Which arm a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmSide {
    /// Left arm.
    Left,
    /// Right arm.
    Right,
}

impl ArmSide {
    /// Parse `left`/`right` (or `l`/`r`), case-insensitively.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Some(ArmSide::Left),
            "right" | "r" => Some(ArmSide::Right),
            _ => None,
        }
    }
}

/// Head and arm actuators.
#[async_trait]
pub trait Movement: Send + Sync {
    /// Move the head to `pose`.
    async fn move_head(&self, pose: HeadPose, timing: MoveTiming) -> CapabilityResult<()>;
    /// Move one arm to `degrees`.
    async fn move_arm(&self, side: ArmSide, degrees: f64, timing: MoveTiming)
    -> CapabilityResult<()>;
}

/// Drive-train control.
#[async_trait]
pub trait Locomotion: Send + Sync {
    /// Drive with linear/angular velocity for a duration.
    async fn drive_time(&self, linear: f64, angular: f64, time_ms: u64) -> CapabilityResult<()>;
    /// Drive a distance along a heading.
    async fn drive_heading(
        &self,
        heading: f64,
        distance_m: f64,
        time_ms: u64,
        reverse: bool,
    ) -> CapabilityResult<()>;
    /// Drive an arc of the given radius ending at a heading.
    async fn drive_arc(
        &self,
        heading: f64,
        radius_m: f64,
        time_ms: u64,
        reverse: bool,
    ) -> CapabilityResult<()>;
    /// Turn in place by `degrees`.
    async fn turn(&self, degrees: f64, time_ms: u64) -> CapabilityResult<()>;
    /// Decelerate to a stop.
    async fn stop(&self) -> CapabilityResult<()>;
    /// Stop all motors immediately.
    async fn halt(&self) -> CapabilityResult<()>;
}

/// Where a display layer sits on screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerSettings {
    /// Layer identifier.
    pub layer: String,
    /// Whether the layer is shown.
    pub visible: bool,
    /// Optional placement hint (`top`, `center`, `bottom`, ...).
    pub placement: Option<String>,
}

/// Content shown on a display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayContent {
    /// Plain text.
    Text(String),
    /// Image asset stored on the robot.
    Image(String),
    /// Image fetched from a URL.
    ImageUrl(String),
    /// Video asset or URL.
    Video(String),
    /// Web page URL.
    WebPage(String),
}

/// Screen layers.
#[async_trait]
pub trait Display: Send + Sync {
    /// Apply layer settings.
    async fn set_layer_settings(&self, settings: LayerSettings) -> CapabilityResult<()>;
    /// Show content on a layer.
    async fn show(&self, layer: &str, content: DisplayContent) -> CapabilityResult<()>;
    /// Clear a layer.
    async fn clear_layer(&self, layer: &str) -> CapabilityResult<()>;
}

/// Text-to-speech request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    /// Text (or SSML) to speak.
    pub text: String,
    /// Audio file name the utterance is rendered to.
    pub file_name: String,
    /// Volume 0-100.
    pub volume: u8,
    /// Whether `text` is SSML.
    pub use_ssml: bool,
    /// Silence trimmed from the rendered audio, in milliseconds.
    pub trim_silence_ms: u64,
    /// Voice override.
    pub voice: Option<String>,
    /// Speech-rate override.
    pub speech_rate: Option<f64>,
}

/// Speech capture request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Recognition engine name.
    pub engine: String,
    /// Maximum time to wait for speech to start.
    pub listen_timeout_ms: u64,
    /// Trailing silence that ends the capture.
    pub silence_timeout_ms: u64,
}

/// Audio playback, speech synthesis and recognition.
#[async_trait]
pub trait Audio: Send + Sync {
    /// Play an audio asset.
    async fn play_audio_file(&self, name: &str, volume: u8) -> CapabilityResult<()>;
    /// Speak; returns whether the provider accepted the utterance.
    async fn speak(&self, request: SpeechRequest) -> CapabilityResult<bool>;
    /// Capture one utterance and return its transcript.
    async fn capture_speech(&self, request: CaptureRequest) -> CapabilityResult<Option<String>>;
}

/// RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    /// Red.
    pub red: u8,
    /// Green.
    pub green: u8,
    /// Blue.
    pub blue: u8,
}

/// LED transition between two colours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedPattern {
    /// First colour.
    pub from: Rgb,
    /// Second colour.
    pub to: Rgb,
    /// Transition time in milliseconds.
    pub duration_ms: u64,
    /// Pattern name (`blink`, `breathe`, `transitonce`, ...).
    pub pattern: String,
}

/// Miscellaneous onboard hardware.
#[async_trait]
pub trait Hardware: Send + Sync {
    /// Set the chest LED.
    async fn set_led(&self, color: Rgb) -> CapabilityResult<()>;
    /// Run an LED transition pattern.
    async fn set_led_pattern(&self, pattern: LedPattern) -> CapabilityResult<()>;
    /// Switch the flashlight.
    async fn set_flashlight(&self, on: bool) -> CapabilityResult<()>;
    /// Take a picture, optionally showing it on screen.
    async fn take_picture(&self, name: &str, display: bool) -> CapabilityResult<()>;
    /// Write a message to the serial port.
    async fn write_serial(&self, message: &str) -> CapabilityResult<()>;
}

/// Starting and stopping on-robot skills.
#[async_trait]
pub trait SkillControl: Send + Sync {
    /// Start a skill with parameters.
    async fn run_skill(&self, id: &str, params: BTreeMap<String, String>) -> CapabilityResult<()>;
    /// Cancel a running skill.
    async fn cancel_skill(&self, id: &str) -> CapabilityResult<()>;
}

/// Peer acknowledgement returned by an awaited relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// HTTP status code the peer answered with.
    pub status: u16,
}

/// JSON transport to peer robots.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// POST `payload` to `url`.
    async fn post_json(&self, url: &str, payload: serde_json::Value) -> TransportResult<Ack>;
}

/// Outcome of template personalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Personalized {
    /// Whether any substitution happened.
    pub changed: bool,
    /// Resulting text.
    pub text: String,
}

/// Text substitution applied before speech.
pub trait TemplatePersonalization: Send + Sync {
    /// Substitute tokens in `text`.
    fn substitute(
        &self,
        text: &str,
        animation: &AnimationContext,
        interaction: &InteractionContext,
    ) -> Personalized;
}

/// Replaces `{name}` tokens with the interaction's variables, falling back to
/// the animation's variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariablePersonalization;

impl TemplatePersonalization for VariablePersonalization {
    fn substitute(
        &self,
        text: &str,
        animation: &AnimationContext,
        interaction: &InteractionContext,
    ) -> Personalized {
        let mut output = String::with_capacity(text.len());
        let mut changed = false;
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
                break;
            };
            let key = &rest[open + 1..close];
            let value = interaction
                .variables
                .get(key)
                .or_else(|| animation.variables.get(key));
            output.push_str(&rest[..open]);
            match value {
                Some(value) => {
                    output.push_str(value);
                    changed = true;
                }
                None => output.push_str(&rest[open..=close]),
            }
            rest = &rest[close + 1..];
        }
        output.push_str(rest);

        Personalized {
            changed,
            text: output,
        }
    }
}

/// Bundle of capability handles for one character.
#[derive(Clone)]
pub struct Capabilities {
    /// Head/arm actuators.
    pub movement: Arc<dyn Movement>,
    /// Drive train.
    pub locomotion: Arc<dyn Locomotion>,
    /// Screen.
    pub display: Arc<dyn Display>,
    /// Audio and speech.
    pub audio: Arc<dyn Audio>,
    /// LEDs, flashlight, camera, serial.
    pub hardware: Arc<dyn Hardware>,
    /// Skill control.
    pub skills: Arc<dyn SkillControl>,
    /// Peer fan-out transport.
    pub transport: Arc<dyn PeerTransport>,
    /// Text personalization.
    pub personalization: Arc<dyn TemplatePersonalization>,
}

impl Capabilities {
    /// Route every capability to one recorder (personalization uses
    /// [`VariablePersonalization`]).
    pub fn recording(recorder: Arc<RecordingCapabilities>) -> Self {
        Self {
            movement: recorder.clone(),
            locomotion: recorder.clone(),
            display: recorder.clone(),
            audio: recorder.clone(),
            hardware: recorder.clone(),
            skills: recorder.clone(),
            transport: recorder,
            personalization: Arc::new(VariablePersonalization),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personalization_replaces_known_tokens_only() {
        let mut interaction = InteractionContext::default();
        interaction.variables.insert("name".into(), "Ada".into());
        let mut animation = AnimationContext::default();
        animation.variables.insert("place".into(), "the lab".into());

        let result = VariablePersonalization.substitute(
            "Hi {name}, welcome to {place}. {unknown}",
            &animation,
            &interaction,
        );
        assert!(result.changed);
        assert_eq!(result.text, "Hi Ada, welcome to the lab. {unknown}");

        let result = VariablePersonalization.substitute("plain {", &animation, &interaction);
        assert!(!result.changed);
        assert_eq!(result.text, "plain {");
    }

    #[test]
    fn arm_side_parsing() {
        assert_eq!(ArmSide::parse("Left"), Some(ArmSide::Left));
        assert_eq!(ArmSide::parse(" r "), Some(ArmSide::Right));
        assert_eq!(ArmSide::parse("both"), None);
    }
}
