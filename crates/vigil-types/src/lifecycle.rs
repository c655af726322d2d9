use serde::{Deserialize, Serialize};

/// Lifecycle of the detection pipeline, owned by the orchestrator.
///
/// Transitions are serialized: `Idle → CameraWarming → Running → Stopping
/// → Idle`. External callers may request start or stop at any time, but no
/// two control requests interleave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Idle,
    CameraWarming,
    Running,
    Stopping,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::CameraWarming => "camera-warming",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}
