//! Head-follow control loop.
//!
//! A periodic task steers the head towards the most recent detection with a
//! proportional law. When the target has not been seen for a while it falls
//! back to looking around. Start/stop pairs are serialized through a mutex and
//! the task is owned through a cancellation token, so stopping never races a
//! tick that is already running.

use crate::capability::{HeadPose, MoveTiming, Movement};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Closed angular range in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleRange {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl AngleRange {
    /// Clamp `value` into the range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min.min(self.max), self.max.max(self.min))
    }

    fn center(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// Look-around behavior once the target is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LookAround {
    /// Sample uniformly inside the ranges.
    #[default]
    Random,
    /// Alternate between the range minimum and maximum each tick.
    Alternating,
}

/// Head-follow tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowConfig {
    /// Tick cadence.
    pub delay_between_movements_ms: u64,
    /// Time without a detection after which the target counts as lost.
    pub lost_after_ms: u64,
    /// Proportional gain applied to the image-space error.
    pub damping: f64,
    /// Horizontal camera field of view.
    pub horizontal_fov_deg: f64,
    /// Vertical camera field of view.
    pub vertical_fov_deg: f64,
    /// Head velocity used for each move.
    pub velocity: f64,
    /// Pitch bounds.
    pub pitch: AngleRange,
    /// Roll bounds (look-around only).
    pub roll: AngleRange,
    /// Yaw bounds.
    pub yaw: AngleRange,
    /// Behavior when the target is lost.
    pub look_around: LookAround,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            delay_between_movements_ms: 500,
            lost_after_ms: 3000,
            damping: 0.6,
            horizontal_fov_deg: 70.0,
            vertical_fov_deg: 55.0,
            velocity: 60.0,
            pitch: AngleRange {
                min: -25.0,
                max: 25.0,
            },
            roll: AngleRange {
                min: -15.0,
                max: 15.0,
            },
            yaw: AngleRange {
                min: -75.0,
                max: 75.0,
            },
            look_around: LookAround::Random,
        }
    }
}

/// Pixel-space bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

/// Object or face detection reported by the perception layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Detected label (`person`, a face name, an object class).
    pub label: String,
    /// Bounding box of the detection.
    pub bounding_box: BoundingBox,
    /// Image width in pixels.
    pub image_width: f64,
    /// Image height in pixels.
    pub image_height: f64,
    /// When the detection happened.
    pub seen_at: Instant,
}

/// What the head should follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowTarget {
    /// Any face, or the face with the given label.
    Face(Option<String>),
    /// Objects with the given label.
    Object(String),
}

impl FollowTarget {
    /// Whether a detection is relevant to this target.
    pub fn accepts(&self, detection: &Detection) -> bool {
        match self {
            FollowTarget::Face(None) => true,
            FollowTarget::Face(Some(label)) | FollowTarget::Object(label) => {
                detection.label.eq_ignore_ascii_case(label)
            }
        }
    }
}

/// Fully specified head pose (degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Pitch.
    pub pitch: f64,
    /// Roll.
    pub roll: f64,
    /// Yaw.
    pub yaw: f64,
}

/// Pure pose computation, independent of timers.
#[derive(Debug, Clone)]
pub struct FollowController {
    config: FollowConfig,
    pose: Pose,
    look_toggle: bool,
}

impl FollowController {
    /// Start from the centre of the configured ranges.
    pub fn new(config: FollowConfig) -> Self {
        let pose = Pose {
            pitch: config.pitch.center(),
            roll: config.roll.center(),
            yaw: config.yaw.center(),
        };
        Self {
            config,
            pose,
            look_toggle: false,
        }
    }

    /// Current commanded pose.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Compute the next pose from the latest detection at time `now`.
    pub fn next_pose(&mut self, latest: Option<&Detection>, now: Instant) -> Pose {
        let lost_after = Duration::from_millis(self.config.lost_after_ms);
        let tracked = latest.filter(|d| now.saturating_duration_since(d.seen_at) <= lost_after);

        self.pose = match tracked {
            Some(detection) => self.track(detection),
            None => self.look_around(),
        };
        self.pose
    }

    fn track(&self, detection: &Detection) -> Pose {
        let config = &self.config;
        if detection.image_width <= 0.0 || detection.image_height <= 0.0 {
            return self.pose;
        }
        let half_w = detection.image_width / 2.0;
        let half_h = detection.image_height / 2.0;
        let center_x = detection.bounding_box.x + detection.bounding_box.width / 2.0;
        let center_y = detection.bounding_box.y + detection.bounding_box.height / 2.0;

        // Normalized offsets in [-1, 1]; positive means right of / below centre.
        let error_x = ((center_x - half_w) / half_w).clamp(-1.0, 1.0);
        let error_y = ((center_y - half_h) / half_h).clamp(-1.0, 1.0);

        let yaw_step = -error_x * (config.horizontal_fov_deg / 2.0) * config.damping;
        let pitch_step = error_y * (config.vertical_fov_deg / 2.0) * config.damping;

        Pose {
            pitch: config.pitch.clamp(self.pose.pitch + pitch_step),
            roll: self.pose.roll,
            yaw: config.yaw.clamp(self.pose.yaw + yaw_step),
        }
    }

    fn look_around(&mut self) -> Pose {
        let config = &self.config;
        match config.look_around {
            LookAround::Alternating => {
                self.look_toggle = !self.look_toggle;
                let pick = |range: AngleRange| {
                    if self.look_toggle {
                        range.max
                    } else {
                        range.min
                    }
                };
                Pose {
                    pitch: pick(config.pitch),
                    roll: pick(config.roll),
                    yaw: pick(config.yaw),
                }
            }
            LookAround::Random => {
                let mut rng = rand::thread_rng();
                let mut sample = |range: AngleRange| {
                    let (low, high) = (range.min.min(range.max), range.max.max(range.min));
                    if high > low {
                        rng.gen_range(low..=high)
                    } else {
                        low
                    }
                };
                Pose {
                    pitch: sample(config.pitch),
                    roll: sample(config.roll),
                    yaw: sample(config.yaw),
                }
            }
        }
    }
}

struct FollowTask {
    target: FollowTarget,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the periodic head-follow task for one character.
pub struct HeadFollow {
    movement: Arc<dyn Movement>,
    config: FollowConfig,
    latest: Arc<Mutex<Option<Detection>>>,
    task: Mutex<Option<FollowTask>>,
}

impl HeadFollow {
    /// Create an idle follower.
    pub fn new(movement: Arc<dyn Movement>, config: FollowConfig) -> Self {
        Self {
            movement,
            config,
            latest: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        }
    }

    /// Record a detection; ignored unless it matches the active target.
    pub fn observe(&self, detection: Detection) {
        let task = self.task.lock();
        if let Some(active) = task.as_ref() {
            if active.target.accepts(&detection) {
                *self.latest.lock() = Some(detection);
            }
        }
    }

    /// Whether the loop is running.
    pub fn is_following(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Active target, if any.
    pub fn target(&self) -> Option<FollowTarget> {
        self.task.lock().as_ref().map(|task| task.target.clone())
    }

    /// Start following `target`, replacing any running loop.
    pub fn start(&self, target: FollowTarget) {
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.cancel.cancel();
        }
        *self.latest.lock() = None;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_follow_loop(
            self.movement.clone(),
            self.config.clone(),
            self.latest.clone(),
            cancel.clone(),
        ));
        info!(follow = ?target, "head follow started");
        *task = Some(FollowTask {
            target,
            cancel,
            handle,
        });
    }

    /// Stop the loop. Safe to call when idle.
    pub fn stop(&self) {
        if let Some(previous) = self.task.lock().take() {
            previous.cancel.cancel();
            info!(follow = ?previous.target, "head follow stopped");
        }
    }
}

impl Drop for HeadFollow {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

async fn run_follow_loop(
    movement: Arc<dyn Movement>,
    config: FollowConfig,
    latest: Arc<Mutex<Option<Detection>>>,
    cancel: CancellationToken,
) {
    let mut controller = FollowController::new(config.clone());
    let mut ticker =
        tokio::time::interval(Duration::from_millis(config.delay_between_movements_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let detection = latest.lock().clone();
                let pose = controller.next_pose(detection.as_ref(), Instant::now());
                if cancel.is_cancelled() {
                    break;
                }
                let request = HeadPose {
                    pitch: Some(pose.pitch),
                    roll: Some(pose.roll),
                    yaw: Some(pose.yaw),
                };
                debug!(pitch = pose.pitch, roll = pose.roll, yaw = pose.yaw, "head follow tick");
                if let Err(err) = movement.move_head(request, MoveTiming::Velocity(config.velocity)).await {
                    warn!(error = %err, "head follow move failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityCall, RecordingCapabilities};

    fn detection(x: f64, y: f64, age: Duration) -> Detection {
        Detection {
            label: "person".into(),
            bounding_box: BoundingBox {
                x,
                y,
                width: 40.0,
                height: 40.0,
            },
            image_width: 640.0,
            image_height: 480.0,
            seen_at: Instant::now() - age,
        }
    }

    #[test]
    fn centred_target_keeps_pose() {
        let mut controller = FollowController::new(FollowConfig::default());
        let pose = controller.next_pose(
            Some(&detection(300.0, 220.0, Duration::ZERO)),
            Instant::now(),
        );
        assert!(pose.yaw.abs() < 1e-9);
        assert!(pose.pitch.abs() < 1e-9);
    }

    #[test]
    fn target_on_the_right_turns_head_right_and_clamps() {
        let mut controller = FollowController::new(FollowConfig::default());
        let now = Instant::now();
        let first = controller.next_pose(Some(&detection(600.0, 220.0, Duration::ZERO)), now);
        assert!(first.yaw < 0.0);
        for _ in 0..20 {
            controller.next_pose(Some(&detection(600.0, 220.0, Duration::ZERO)), now);
        }
        assert_eq!(controller.pose().yaw, -75.0);
    }

    #[test]
    fn lost_target_alternates_between_bounds() {
        let config = FollowConfig {
            look_around: LookAround::Alternating,
            ..FollowConfig::default()
        };
        let mut controller = FollowController::new(config);
        let stale = detection(600.0, 220.0, Duration::from_secs(10));
        let now = Instant::now();
        let a = controller.next_pose(Some(&stale), now);
        let b = controller.next_pose(Some(&stale), now);
        assert_eq!(a.yaw, 75.0);
        assert_eq!(b.yaw, -75.0);
        assert_eq!(b.pitch, -25.0);
    }

    #[test]
    fn random_look_around_stays_in_bounds() {
        let mut controller = FollowController::new(FollowConfig::default());
        for _ in 0..50 {
            let pose = controller.next_pose(None, Instant::now());
            assert!((-25.0..=25.0).contains(&pose.pitch));
            assert!((-15.0..=15.0).contains(&pose.roll));
            assert!((-75.0..=75.0).contains(&pose.yaw));
        }
    }

    #[tokio::test]
    async fn start_ticks_and_stop_is_idempotent() {
        let recorder = Arc::new(RecordingCapabilities::new());
        let config = FollowConfig {
            delay_between_movements_ms: 10,
            ..FollowConfig::default()
        };
        let follow = HeadFollow::new(recorder.clone(), config);
        follow.start(FollowTarget::Face(None));
        follow.observe(detection(300.0, 220.0, Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(follow.is_following());

        follow.stop();
        follow.stop();
        assert!(follow.target().is_none());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let settled = recorder.calls().len();
        assert!(settled > 0);
        assert!(
            recorder
                .calls()
                .iter()
                .all(|call| matches!(call, CapabilityCall::MoveHead { .. }))
        );
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(recorder.calls().len(), settled);
    }
}
