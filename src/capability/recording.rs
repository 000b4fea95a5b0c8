use super::{
    Ack, ArmSide, Audio, CaptureRequest, Display, DisplayContent, Hardware, HeadPose,
    LayerSettings, LedPattern, Locomotion, MoveTiming, Movement, PeerTransport, Rgb,
    SkillControl, SpeechRequest,
};
use crate::runtime::error::{CapabilityError, CapabilityResult, TransportError, TransportResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// One recorded capability invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call")]
pub enum CapabilityCall {
    /// `Movement::move_head`
    MoveHead {
        /// Target pose
        pose: HeadPose,
        /// Timing
        timing: MoveTiming,
    },
    /// `Movement::move_arm`
    MoveArm {
        /// Arm
        side: ArmSide,
        /// Target angle
        degrees: f64,
        /// Timing
        timing: MoveTiming,
    },
    /// `Locomotion::drive_time`
    DriveTime {
        /// Linear velocity
        linear: f64,
        /// Angular velocity
        angular: f64,
        /// Duration
        time_ms: u64,
    },
    /// `Locomotion::drive_heading`
    DriveHeading {
        /// Heading
        heading: f64,
        /// Distance in metres
        distance_m: f64,
        /// Duration
        time_ms: u64,
        /// Reverse
        reverse: bool,
    },
    /// `Locomotion::drive_arc`
    DriveArc {
        /// Heading
        heading: f64,
        /// Radius in metres
        radius_m: f64,
        /// Duration
        time_ms: u64,
        /// Reverse
        reverse: bool,
    },
    /// `Locomotion::turn`
    Turn {
        /// Degrees
        degrees: f64,
        /// Duration
        time_ms: u64,
    },
    /// `Locomotion::stop`
    Stop,
    /// `Locomotion::halt`
    Halt,
    /// `Display::set_layer_settings`
    LayerSettings(LayerSettings),
    /// `Display::show`
    Show {
        /// Layer
        layer: String,
        /// Content
        content: DisplayContent,
    },
    /// `Display::clear_layer`
    ClearLayer {
        /// Layer
        layer: String,
    },
    /// `Audio::play_audio_file`
    PlayAudio {
        /// Asset name
        name: String,
        /// Volume
        volume: u8,
    },
    /// `Audio::speak`
    Speak(SpeechRequest),
    /// `Audio::capture_speech`
    CaptureSpeech(CaptureRequest),
    /// `Hardware::set_led`
    Led(Rgb),
    /// `Hardware::set_led_pattern`
    LedPattern(LedPattern),
    /// `Hardware::set_flashlight`
    Flashlight {
        /// On/off
        on: bool,
    },
    /// `Hardware::take_picture`
    Picture {
        /// File name
        name: String,
        /// Shown on screen
        display: bool,
    },
    /// `Hardware::write_serial`
    Serial {
        /// Payload
        message: String,
    },
    /// `SkillControl::run_skill`
    RunSkill {
        /// Skill id
        id: String,
        /// Parameters
        params: BTreeMap<String, String>,
    },
    /// `SkillControl::cancel_skill`
    CancelSkill {
        /// Skill id
        id: String,
    },
    /// `PeerTransport::post_json`
    PostJson {
        /// Target URL
        url: String,
        /// Payload
        payload: serde_json::Value,
    },
}

/// Capability implementation that records every call instead of touching
/// hardware. Individual capabilities can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingCapabilities {
    calls: Mutex<Vec<CapabilityCall>>,
    failing: Mutex<HashSet<&'static str>>,
    unreachable_urls: Mutex<HashSet<String>>,
    transcript: Mutex<Option<String>>,
    capture_delay: Mutex<Option<Duration>>,
}

impl RecordingCapabilities {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the calls recorded so far.
    pub fn calls(&self) -> Vec<CapabilityCall> {
        self.calls.lock().clone()
    }

    /// Drain the recorded calls.
    pub fn take_calls(&self) -> Vec<CapabilityCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Make the named capability (e.g. `"audio.speak"`) fail from now on.
    pub fn fail(&self, capability: &'static str) {
        self.failing.lock().insert(capability);
    }

    /// Make posts to `url` fail.
    pub fn unreachable(&self, url: impl Into<String>) {
        self.unreachable_urls.lock().insert(url.into());
    }

    /// Transcript returned by the next speech capture.
    pub fn set_transcript(&self, transcript: impl Into<String>) {
        *self.transcript.lock() = Some(transcript.into());
    }

    /// Make speech captures take `delay` before returning.
    pub fn set_capture_delay(&self, delay: Duration) {
        *self.capture_delay.lock() = Some(delay);
    }

    fn record(&self, capability: &'static str, call: CapabilityCall) -> CapabilityResult<()> {
        debug!(capability, ?call, "capability call");
        self.calls.lock().push(call);
        if self.failing.lock().contains(capability) {
            return Err(CapabilityError::Rejected {
                capability,
                detail: "configured to fail".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Movement for RecordingCapabilities {
    async fn move_head(&self, pose: HeadPose, timing: MoveTiming) -> CapabilityResult<()> {
        self.record("movement.head", CapabilityCall::MoveHead { pose, timing })
    }

    async fn move_arm(
        &self,
        side: ArmSide,
        degrees: f64,
        timing: MoveTiming,
    ) -> CapabilityResult<()> {
        self.record(
            "movement.arm",
            CapabilityCall::MoveArm {
                side,
                degrees,
                timing,
            },
        )
    }
}

#[async_trait]
impl Locomotion for RecordingCapabilities {
    async fn drive_time(&self, linear: f64, angular: f64, time_ms: u64) -> CapabilityResult<()> {
        self.record(
            "locomotion.drive",
            CapabilityCall::DriveTime {
                linear,
                angular,
                time_ms,
            },
        )
    }

    async fn drive_heading(
        &self,
        heading: f64,
        distance_m: f64,
        time_ms: u64,
        reverse: bool,
    ) -> CapabilityResult<()> {
        self.record(
            "locomotion.heading",
            CapabilityCall::DriveHeading {
                heading,
                distance_m,
                time_ms,
                reverse,
            },
        )
    }

    async fn drive_arc(
        &self,
        heading: f64,
        radius_m: f64,
        time_ms: u64,
        reverse: bool,
    ) -> CapabilityResult<()> {
        self.record(
            "locomotion.arc",
            CapabilityCall::DriveArc {
                heading,
                radius_m,
                time_ms,
                reverse,
            },
        )
    }

    async fn turn(&self, degrees: f64, time_ms: u64) -> CapabilityResult<()> {
        self.record("locomotion.turn", CapabilityCall::Turn { degrees, time_ms })
    }

    async fn stop(&self) -> CapabilityResult<()> {
        self.record("locomotion.stop", CapabilityCall::Stop)
    }

    async fn halt(&self) -> CapabilityResult<()> {
        self.record("locomotion.halt", CapabilityCall::Halt)
    }
}

#[async_trait]
impl Display for RecordingCapabilities {
    async fn set_layer_settings(&self, settings: LayerSettings) -> CapabilityResult<()> {
        self.record("display.settings", CapabilityCall::LayerSettings(settings))
    }

    async fn show(&self, layer: &str, content: DisplayContent) -> CapabilityResult<()> {
        self.record(
            "display.show",
            CapabilityCall::Show {
                layer: layer.to_string(),
                content,
            },
        )
    }

    async fn clear_layer(&self, layer: &str) -> CapabilityResult<()> {
        self.record(
            "display.clear",
            CapabilityCall::ClearLayer {
                layer: layer.to_string(),
            },
        )
    }
}

#[async_trait]
impl Audio for RecordingCapabilities {
    async fn play_audio_file(&self, name: &str, volume: u8) -> CapabilityResult<()> {
        self.record(
            "audio.play",
            CapabilityCall::PlayAudio {
                name: name.to_string(),
                volume,
            },
        )
    }

    async fn speak(&self, request: SpeechRequest) -> CapabilityResult<bool> {
        self.record("audio.speak", CapabilityCall::Speak(request))?;
        Ok(true)
    }

    async fn capture_speech(&self, request: CaptureRequest) -> CapabilityResult<Option<String>> {
        self.record("audio.capture", CapabilityCall::CaptureSpeech(request))?;
        let delay = *self.capture_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.transcript.lock().take())
    }
}

#[async_trait]
impl Hardware for RecordingCapabilities {
    async fn set_led(&self, color: Rgb) -> CapabilityResult<()> {
        self.record("hardware.led", CapabilityCall::Led(color))
    }

    async fn set_led_pattern(&self, pattern: LedPattern) -> CapabilityResult<()> {
        self.record("hardware.led_pattern", CapabilityCall::LedPattern(pattern))
    }

    async fn set_flashlight(&self, on: bool) -> CapabilityResult<()> {
        self.record("hardware.flashlight", CapabilityCall::Flashlight { on })
    }

    async fn take_picture(&self, name: &str, display: bool) -> CapabilityResult<()> {
        self.record(
            "hardware.picture",
            CapabilityCall::Picture {
                name: name.to_string(),
                display,
            },
        )
    }

    async fn write_serial(&self, message: &str) -> CapabilityResult<()> {
        self.record(
            "hardware.serial",
            CapabilityCall::Serial {
                message: message.to_string(),
            },
        )
    }
}

#[async_trait]
impl SkillControl for RecordingCapabilities {
    async fn run_skill(&self, id: &str, params: BTreeMap<String, String>) -> CapabilityResult<()> {
        self.record(
            "skills.run",
            CapabilityCall::RunSkill {
                id: id.to_string(),
                params,
            },
        )
    }

    async fn cancel_skill(&self, id: &str) -> CapabilityResult<()> {
        self.record(
            "skills.cancel",
            CapabilityCall::CancelSkill { id: id.to_string() },
        )
    }
}

#[async_trait]
impl PeerTransport for RecordingCapabilities {
    async fn post_json(&self, url: &str, payload: serde_json::Value) -> TransportResult<Ack> {
        debug!(url, %payload, "peer post");
        self.calls.lock().push(CapabilityCall::PostJson {
            url: url.to_string(),
            payload,
        });
        if self.unreachable_urls.lock().contains(url) {
            return Err(TransportError::Request {
                url: url.to_string(),
                detail: "connection refused".to_string(),
            });
        }
        Ok(Ack { status: 200 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order_and_fails_on_request() {
        let recorder = RecordingCapabilities::new();
        recorder.set_flashlight(true).await.unwrap();
        recorder.fail("hardware.led");
        let result = recorder
            .set_led(Rgb {
                red: 1,
                green: 2,
                blue: 3,
            })
            .await;
        assert!(matches!(result, Err(CapabilityError::Rejected { .. })));

        let calls = recorder.take_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], CapabilityCall::Flashlight { on: true });
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn unreachable_urls_fail_posts() {
        let recorder = RecordingCapabilities::new();
        recorder.unreachable("http://10.0.0.9:80/x");
        assert!(
            recorder
                .post_json("http://10.0.0.9:80/x", serde_json::json!({}))
                .await
                .is_err()
        );
        assert!(
            recorder
                .post_json("http://10.0.0.8:80/x", serde_json::json!({}))
                .await
                .is_ok()
        );
    }
}
