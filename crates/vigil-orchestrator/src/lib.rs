//! High-level orchestrator coordinating capture, analysis, and alerting.
//!
//! One detection run owns one loop task. The loop suspends only at its
//! three checkpoints (camera-readiness poll, frame poll, inter-iteration
//! sleep) and observes cooperative cancellation at each of them, so a stop
//! request lands within one in-flight analysis call plus a poll interval.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex,
};

use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
    time::{sleep_until, Duration, Instant},
};
use tracing::{debug, error, info, warn};
use vigil_alert::Alerter;
use vigil_analysis::{AnalyzerFactory, DangerAnalyzer};
use vigil_capture::FrameProvider;
use vigil_types::{
    config::{CaptureConfig, PipelineConfig},
    frame::CapturedFrame,
    lifecycle::LifecycleState,
    verdict::AnalysisVerdict,
    Result, VigilError,
};

/// Per-run cancellation token: a flag plus a wake-up for in-flight sleeps.
///
/// Each detection run gets its own token, so a stale run that is still
/// draining an analysis call can never be revived by a later start.
struct StopToken {
    cancelled: AtomicBool,
    wake: Notify,
}

impl StopToken {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            wake: Notify::new(),
        })
    }

    fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning false when cancelled before or
    /// during the wait. Spurious wake-ups re-arm against the deadline.
    async fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            tokio::select! {
                _ = sleep_until(deadline) => return !self.is_cancelled(),
                _ = self.wake.notified() => {
                    if self.is_cancelled() {
                        return false;
                    }
                }
            }
        }
    }
}

struct RunHandle {
    token: Arc<StopToken>,
    task: JoinHandle<()>,
}

struct Core<F, A, L> {
    frames: F,
    analyzers: A,
    alerts: L,
    capture: CaptureConfig,
    state: StdMutex<LifecycleState>,
    run: StdMutex<Option<RunHandle>>,
    /// Serializes start/stop so no two control requests interleave.
    control: Mutex<()>,
}

impl<F, A, L> Core<F, A, L> {
    fn state(&self) -> LifecycleState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(LifecycleState::Idle)
    }

    fn set_state(&self, next: LifecycleState) {
        if let Ok(mut state) = self.state.lock() {
            debug!("Lifecycle {} -> {}", *state, next);
            *state = next;
        }
    }

    /// State write on behalf of a run's loop task. The cancellation check
    /// happens under the state lock, so a task whose token was stopped can
    /// never overwrite the state a stop (or a newer run) has settled on.
    fn transition(&self, token: &StopToken, next: LifecycleState) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if token.is_cancelled() {
            return false;
        }
        debug!("Lifecycle {} -> {}", *state, next);
        *state = next;
        true
    }

    fn store_run(&self, handle: RunHandle) {
        if let Ok(mut run) = self.run.lock() {
            *run = Some(handle);
        }
    }

    fn take_run(&self) -> Option<RunHandle> {
        self.run.lock().ok().and_then(|mut run| run.take())
    }
}

/// Control surface for the capture→encode→analyze→alert pipeline.
///
/// Cheap-clone handle; all clones drive the same single active run.
pub struct Orchestrator<F, A, L>
where
    F: FrameProvider + 'static,
    A: AnalyzerFactory + 'static,
    L: Alerter + 'static,
{
    core: Arc<Core<F, A, L>>,
}

impl<F, A, L> Clone for Orchestrator<F, A, L>
where
    F: FrameProvider + 'static,
    A: AnalyzerFactory + 'static,
    L: Alerter + 'static,
{
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<F, A, L> Orchestrator<F, A, L>
where
    F: FrameProvider + 'static,
    A: AnalyzerFactory + 'static,
    L: Alerter + 'static,
{
    pub fn new(frames: F, analyzers: A, alerts: L, capture: CaptureConfig) -> Self {
        Self {
            core: Arc::new(Core {
                frames,
                analyzers,
                alerts,
                capture,
                state: StdMutex::new(LifecycleState::Idle),
                run: StdMutex::new(None),
                control: Mutex::new(()),
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.core.state()
    }

    /// Start the detection loop with a configuration snapshot.
    ///
    /// A second start while warming or running is a logged no-op. A blank
    /// API key or sub-minimum interval rejects the start outright.
    pub async fn start(&self, config: PipelineConfig) -> Result<()> {
        let _guard = self.core.control.lock().await;

        let state = self.core.state();
        if matches!(
            state,
            LifecycleState::Running | LifecycleState::CameraWarming
        ) {
            warn!("Start requested while already {state}; ignoring");
            return Ok(());
        }
        config.validate()?;

        self.core.set_state(LifecycleState::CameraWarming);
        if let Err(err) = self.core.frames.open().await {
            error!("Failed to open camera: {err}");
            self.core.set_state(LifecycleState::Idle);
            return Err(err);
        }
        // Fresh analyzer per run: key changes require a new instance.
        let analyzer = match self.core.analyzers.create(&config.api_key) {
            Ok(analyzer) => analyzer,
            Err(err) => {
                self.core.set_state(LifecycleState::Idle);
                return Err(err);
            }
        };

        info!(
            "Starting detection run (interval {}s)",
            config.interval_seconds
        );
        let token = StopToken::new();
        let core = self.core.clone();
        let loop_token = token.clone();
        let task = tokio::spawn(async move {
            run_loop(core, loop_token, config, analyzer).await;
        });
        self.core.store_run(RunHandle { token, task });
        Ok(())
    }

    /// Host-facing alias of [`start`](Self::start): the core's only run
    /// mode is the continuous detection loop.
    pub async fn start_continuous(&self, config: PipelineConfig) -> Result<()> {
        self.start(config).await
    }

    /// Cancel the detection loop but keep the camera open for single
    /// captures.
    pub async fn stop_continuous(&self) {
        let _guard = self.core.control.lock().await;
        self.halt_run();
    }

    /// Full stop: cancel the loop, close the camera, release the alerter.
    pub async fn stop(&self) {
        let _guard = self.core.control.lock().await;
        self.halt_run();
        self.core.frames.close().await;
        self.core.alerts.release();
        info!("Pipeline stopped");
    }

    /// One-shot capture outside the loop. Waits briefly for camera
    /// readiness, then requests and polls a single frame.
    pub async fn request_single_capture(&self) -> Option<CapturedFrame> {
        if !self.core.frames.is_ready() {
            warn!("Camera not ready, retrying...");
            sleep_until(Instant::now() + Duration::from_millis(500)).await;
        }
        if !self.core.frames.is_ready() {
            warn!("Camera still not ready; skipping capture");
            return None;
        }
        self.core.frames.request_frame();
        self.core
            .frames
            .poll_frame(Duration::from_millis(self.capture().frame_timeout_ms))
            .await
    }

    fn capture(&self) -> &CaptureConfig {
        &self.core.capture
    }

    fn halt_run(&self) {
        let Some(run) = self.core.take_run() else {
            return;
        };
        self.core.set_state(LifecycleState::Stopping);
        info!("Stopping detection run");
        run.token.stop();
        // The loop observes the token at its next checkpoint; an in-flight
        // analysis call drains within its own timeout. The task handle is
        // dropped, not awaited, so stop never blocks on the network. The
        // token is stopped strictly before the Idle write below, so the
        // task's guarded transitions can no longer touch state and Idle
        // stays final.
        drop(run.task);
        self.core.set_state(LifecycleState::Idle);
    }
}

enum IterationOutcome {
    NoFrame,
    Analyzed(AnalysisVerdict),
}

async fn run_loop<F, A, L>(
    core: Arc<Core<F, A, L>>,
    token: Arc<StopToken>,
    config: PipelineConfig,
    analyzer: A::Analyzer,
) where
    F: FrameProvider + 'static,
    A: AnalyzerFactory + 'static,
    L: Alerter + 'static,
{
    // Camera warm-up: bounded readiness poll before the first capture.
    let mut attempts = 0;
    while !core.frames.is_ready() && attempts < core.capture.warmup_retries {
        if !token
            .sleep(Duration::from_millis(core.capture.warmup_delay_ms))
            .await
        {
            info!("Detection run cancelled during camera warm-up");
            return;
        }
        attempts += 1;
    }
    if token.is_cancelled() {
        return;
    }
    if !core.frames.is_ready() {
        error!(
            "Camera not ready after {} retries; aborting detection run",
            core.capture.warmup_retries
        );
        if core.transition(&token, LifecycleState::Idle) {
            core.frames.close().await;
        }
        return;
    }

    if !core.transition(&token, LifecycleState::Running) {
        return;
    }
    info!("Camera ready, starting analysis loop");

    let interval = Duration::from_secs(config.interval_seconds);
    while !token.is_cancelled() {
        match run_iteration(&core, &analyzer).await {
            Ok(IterationOutcome::NoFrame) => {
                warn!("Failed to capture frame, retrying...");
                if !token
                    .sleep(Duration::from_millis(core.capture.retry_backoff_ms))
                    .await
                {
                    break;
                }
                continue;
            }
            Ok(IterationOutcome::Analyzed(verdict)) => {
                info!(
                    "Analysis result: is_danger={} response={:?}",
                    verdict.is_danger, verdict.raw_answer
                );
                if verdict.is_danger {
                    warn!("DANGER DETECTED");
                    core.alerts.play_danger_alert();
                }
            }
            Err(err) => {
                // A single bad iteration never kills the loop.
                error!("Error in analysis loop: {err}");
                if !token
                    .sleep(Duration::from_millis(core.capture.error_backoff_ms))
                    .await
                {
                    break;
                }
                continue;
            }
        }

        if token.is_cancelled() {
            break;
        }
        if !token.sleep(interval).await {
            break;
        }
    }

    info!("Analysis loop ended");
}

async fn run_iteration<F, A, L>(
    core: &Core<F, A, L>,
    analyzer: &A::Analyzer,
) -> Result<IterationOutcome>
where
    F: FrameProvider + 'static,
    A: AnalyzerFactory + 'static,
    L: Alerter + 'static,
{
    core.frames.request_frame();
    let Some(frame) = core
        .frames
        .poll_frame(Duration::from_millis(core.capture.frame_timeout_ms))
        .await
    else {
        return Ok(IterationOutcome::NoFrame);
    };

    debug!("Captured image: {} bytes", frame.jpeg.len());
    let verdict = analyzer.analyze(&frame.jpeg).await?;
    Ok(IterationOutcome::Analyzed(verdict))
}

pub fn orchestrator_error(message: impl Into<String>) -> VigilError {
    VigilError::Orchestrator(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    #[derive(Default)]
    struct MockFramesInner {
        ready_on_open: bool,
        produce_frames: bool,
        fail_open: bool,
        ready: AtomicBool,
        requested: AtomicBool,
        open_calls: AtomicUsize,
        closed: AtomicBool,
    }

    #[derive(Clone)]
    struct MockFrames(Arc<MockFramesInner>);

    impl MockFrames {
        fn healthy() -> Self {
            Self(Arc::new(MockFramesInner {
                ready_on_open: true,
                produce_frames: true,
                ..MockFramesInner::default()
            }))
        }

        fn never_ready() -> Self {
            Self(Arc::new(MockFramesInner {
                produce_frames: true,
                ..MockFramesInner::default()
            }))
        }

        fn dropping_frames() -> Self {
            Self(Arc::new(MockFramesInner {
                ready_on_open: true,
                ..MockFramesInner::default()
            }))
        }

        fn failing_open() -> Self {
            Self(Arc::new(MockFramesInner {
                fail_open: true,
                ..MockFramesInner::default()
            }))
        }
    }

    #[async_trait]
    impl FrameProvider for MockFrames {
        async fn open(&self) -> Result<()> {
            self.0.open_calls.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_open {
                return Err(VigilError::CameraUnavailable("no device".into()));
            }
            if self.0.ready_on_open {
                self.0.ready.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        fn is_ready(&self) -> bool {
            self.0.ready.load(Ordering::SeqCst)
        }

        fn request_frame(&self) {
            self.0.requested.store(true, Ordering::SeqCst);
        }

        async fn poll_frame(&self, timeout: Duration) -> Option<CapturedFrame> {
            if self.0.requested.swap(false, Ordering::SeqCst) && self.0.produce_frames {
                return Some(CapturedFrame::new(vec![0xFF, 0xD8, 0xFF]));
            }
            sleep(timeout).await;
            None
        }

        async fn close(&self) {
            self.0.closed.store(true, Ordering::SeqCst);
            self.0.ready.store(false, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockAnalyzerInner {
        answers: StdMutex<Vec<Result<AnalysisVerdict>>>,
        calls: AtomicUsize,
        called_at: StdMutex<Vec<Instant>>,
        delay: Option<Duration>,
    }

    #[derive(Clone)]
    struct MockAnalyzer(Arc<MockAnalyzerInner>);

    impl MockAnalyzer {
        fn always(verdict: AnalysisVerdict) -> Self {
            Self(Arc::new(MockAnalyzerInner {
                answers: StdMutex::new(vec![Ok(verdict)]),
                ..MockAnalyzerInner::default()
            }))
        }

        fn scripted(answers: Vec<Result<AnalysisVerdict>>) -> Self {
            Self(Arc::new(MockAnalyzerInner {
                answers: StdMutex::new(answers),
                ..MockAnalyzerInner::default()
            }))
        }

        fn slow(verdict: AnalysisVerdict, delay: Duration) -> Self {
            Self(Arc::new(MockAnalyzerInner {
                answers: StdMutex::new(vec![Ok(verdict)]),
                delay: Some(delay),
                ..MockAnalyzerInner::default()
            }))
        }

        fn calls(&self) -> usize {
            self.0.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DangerAnalyzer for MockAnalyzer {
        async fn analyze(&self, _image: &[u8]) -> Result<AnalysisVerdict> {
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            self.0
                .called_at
                .lock()
                .expect("called_at lock")
                .push(Instant::now());
            if let Some(delay) = self.0.delay {
                sleep(delay).await;
            }
            let mut answers = self.0.answers.lock().expect("answers lock");
            if answers.len() > 1 {
                answers.remove(0)
            } else {
                match &answers[0] {
                    Ok(verdict) => Ok(verdict.clone()),
                    Err(_) => Err(VigilError::Analysis("scripted failure".into())),
                }
            }
        }
    }

    struct MockFactory {
        analyzer: MockAnalyzer,
        creates: AtomicUsize,
    }

    impl MockFactory {
        fn new(analyzer: MockAnalyzer) -> Self {
            Self {
                analyzer,
                creates: AtomicUsize::new(0),
            }
        }
    }

    impl AnalyzerFactory for &'static MockFactory {
        type Analyzer = MockAnalyzer;

        fn create(&self, _api_key: &str) -> Result<MockAnalyzer> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(self.analyzer.clone())
        }
    }

    #[derive(Default)]
    struct MockAlerterInner {
        alerts: AtomicUsize,
        releases: AtomicUsize,
    }

    #[derive(Clone, Default)]
    struct MockAlerter(Arc<MockAlerterInner>);

    impl Alerter for MockAlerter {
        fn play_danger_alert(&self) {
            self.0.alerts.fetch_add(1, Ordering::SeqCst);
        }

        fn play_test_tone(&self) {}

        fn release(&self) {
            self.0.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_capture_config() -> CaptureConfig {
        CaptureConfig {
            poll_interval_ms: 100,
            frame_timeout_ms: 3000,
            warmup_retries: 20,
            warmup_delay_ms: 500,
            ..CaptureConfig::default()
        }
    }

    fn test_pipeline_config() -> PipelineConfig {
        PipelineConfig {
            api_key: "sk-test".into(),
            interval_seconds: 2,
        }
    }

    fn factory(analyzer: MockAnalyzer) -> &'static MockFactory {
        Box::leak(Box::new(MockFactory::new(analyzer)))
    }

    fn orchestrator(
        frames: MockFrames,
        analyzer: MockAnalyzer,
        alerts: MockAlerter,
    ) -> (
        Orchestrator<MockFrames, &'static MockFactory, MockAlerter>,
        &'static MockFactory,
    ) {
        let fac = factory(analyzer);
        (
            Orchestrator::new(frames, fac, alerts, test_capture_config()),
            fac,
        )
    }

    async fn wait_for_state<F, A, L>(orch: &Orchestrator<F, A, L>, target: LifecycleState)
    where
        F: FrameProvider + 'static,
        A: AnalyzerFactory + 'static,
        L: Alerter + 'static,
    {
        for _ in 0..200 {
            if orch.state() == target {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("never reached state {target}, stuck at {}", orch.state());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_api_key_rejects_start() {
        let frames = MockFrames::healthy();
        let (orch, _) = orchestrator(
            frames.clone(),
            MockAnalyzer::always(AnalysisVerdict::from_answer("NO")),
            MockAlerter::default(),
        );

        let config = PipelineConfig {
            api_key: "   ".into(),
            interval_seconds: 3,
        };
        let err = orch.start(config).await.expect_err("must reject");
        assert!(matches!(err, VigilError::Precondition(_)));
        assert_eq!(orch.state(), LifecycleState::Idle);
        assert_eq!(frames.0.open_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn camera_open_failure_returns_to_idle() {
        let frames = MockFrames::failing_open();
        let (orch, _) = orchestrator(
            frames,
            MockAnalyzer::always(AnalysisVerdict::from_answer("NO")),
            MockAlerter::default(),
        );

        let err = orch
            .start(test_pipeline_config())
            .await
            .expect_err("must fail");
        assert!(matches!(err, VigilError::CameraUnavailable(_)));
        assert_eq!(orch.state(), LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_is_noop() {
        let frames = MockFrames::healthy();
        let (orch, fac) = orchestrator(
            frames.clone(),
            MockAnalyzer::always(AnalysisVerdict::from_answer("NO")),
            MockAlerter::default(),
        );

        orch.start(test_pipeline_config()).await.expect("start");
        wait_for_state(&orch, LifecycleState::Running).await;

        orch.start(test_pipeline_config())
            .await
            .expect("second start is a no-op");
        assert_eq!(orch.state(), LifecycleState::Running);
        assert_eq!(frames.0.open_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fac.creates.load(Ordering::SeqCst), 1);
        orch.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn danger_verdict_triggers_alert() {
        let alerts = MockAlerter::default();
        let (orch, _) = orchestrator(
            MockFrames::healthy(),
            MockAnalyzer::always(AnalysisVerdict::from_answer("YES")),
            alerts.clone(),
        );

        orch.start(test_pipeline_config()).await.expect("start");
        wait_for_state(&orch, LifecycleState::Running).await;
        sleep(Duration::from_secs(5)).await;

        assert!(alerts.0.alerts.load(Ordering::SeqCst) >= 1);
        orch.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn safe_verdict_never_alerts() {
        let alerts = MockAlerter::default();
        let (orch, _) = orchestrator(
            MockFrames::healthy(),
            MockAnalyzer::always(AnalysisVerdict::from_answer("NO")),
            alerts.clone(),
        );

        orch.start(test_pipeline_config()).await.expect("start");
        wait_for_state(&orch, LifecycleState::Running).await;
        sleep(Duration::from_secs(10)).await;

        assert_eq!(alerts.0.alerts.load(Ordering::SeqCst), 0);
        orch.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_enforced_between_iterations() {
        let analyzer = MockAnalyzer::always(AnalysisVerdict::from_answer("NO"));
        let (orch, _) = orchestrator(
            MockFrames::healthy(),
            analyzer.clone(),
            MockAlerter::default(),
        );

        orch.start(test_pipeline_config()).await.expect("start");
        wait_for_state(&orch, LifecycleState::Running).await;
        sleep(Duration::from_secs(11)).await;
        orch.stop().await;

        let stamps = analyzer.0.called_at.lock().expect("called_at lock").clone();
        assert!(stamps.len() >= 3, "expected several iterations");
        for pair in stamps.windows(2) {
            let spacing = pair[1] - pair[0];
            assert!(
                spacing >= Duration::from_secs(2),
                "iterations only {spacing:?} apart"
            );
            assert!(spacing < Duration::from_millis(2500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_loop_and_settles_idle() {
        let frames = MockFrames::healthy();
        let alerts = MockAlerter::default();
        let analyzer = MockAnalyzer::always(AnalysisVerdict::from_answer("NO"));
        let (orch, _) = orchestrator(frames.clone(), analyzer.clone(), alerts.clone());

        orch.start(test_pipeline_config()).await.expect("start");
        wait_for_state(&orch, LifecycleState::Running).await;
        sleep(Duration::from_secs(5)).await;

        orch.stop().await;
        assert_eq!(orch.state(), LifecycleState::Idle);
        assert!(frames.0.closed.load(Ordering::SeqCst));
        assert_eq!(alerts.0.releases.load(Ordering::SeqCst), 1);

        let calls_after_stop = analyzer.calls();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(analyzer.calls(), calls_after_stop, "loop kept running");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_stop_at_loop_entry_settles_idle() {
        let (orch, _) = orchestrator(
            MockFrames::healthy(),
            MockAnalyzer::always(AnalysisVerdict::from_answer("NO")),
            MockAlerter::default(),
        );

        // Stop immediately after start so the control surface races the
        // loop task's entry into Running on a real scheduler.
        for _ in 0..50 {
            orch.start(test_pipeline_config()).await.expect("start");
            orch.stop().await;
            assert_eq!(orch.state(), LifecycleState::Idle);
        }

        // The pipeline must remain startable after every racing stop.
        orch.start(test_pipeline_config())
            .await
            .expect("start after racing stops");
        wait_for_state(&orch, LifecycleState::Running).await;
        orch.stop().await;
        assert_eq!(orch.state(), LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_inflight_analysis_is_bounded() {
        let analyzer = MockAnalyzer::slow(
            AnalysisVerdict::from_answer("NO"),
            Duration::from_secs(30),
        );
        let (orch, _) = orchestrator(
            MockFrames::healthy(),
            analyzer.clone(),
            MockAlerter::default(),
        );

        orch.start(test_pipeline_config()).await.expect("start");
        wait_for_state(&orch, LifecycleState::Running).await;
        // First analysis call is now in flight for 30 s.
        sleep(Duration::from_secs(1)).await;
        assert_eq!(analyzer.calls(), 1);

        orch.stop().await;
        assert_eq!(orch.state(), LifecycleState::Idle);

        // The in-flight call drains, but no further iteration starts.
        sleep(Duration::from_secs(60)).await;
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn warmup_exhaustion_aborts_run() {
        let frames = MockFrames::never_ready();
        let analyzer = MockAnalyzer::always(AnalysisVerdict::from_answer("NO"));
        let (orch, _) = orchestrator(frames.clone(), analyzer.clone(), MockAlerter::default());

        orch.start(test_pipeline_config()).await.expect("start");
        assert_eq!(orch.state(), LifecycleState::CameraWarming);

        // 20 retries x 500 ms, plus slack.
        sleep(Duration::from_secs(11)).await;
        assert_eq!(orch.state(), LifecycleState::Idle);
        assert!(frames.0.closed.load(Ordering::SeqCst));
        assert_eq!(analyzer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_misses_keep_loop_alive() {
        let frames = MockFrames::dropping_frames();
        let analyzer = MockAnalyzer::always(AnalysisVerdict::from_answer("NO"));
        let (orch, _) = orchestrator(frames, analyzer.clone(), MockAlerter::default());

        orch.start(test_pipeline_config()).await.expect("start");
        wait_for_state(&orch, LifecycleState::Running).await;
        sleep(Duration::from_secs(20)).await;

        // Every iteration timed out at the frame poll; the loop survived.
        assert_eq!(orch.state(), LifecycleState::Running);
        assert_eq!(analyzer.calls(), 0);
        orch.stop().await;
        assert_eq!(orch.state(), LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn analyzer_errors_back_off_and_continue() {
        let alerts = MockAlerter::default();
        let analyzer = MockAnalyzer::scripted(vec![
            Err(VigilError::Analysis("scripted failure".into())),
            Err(VigilError::Analysis("scripted failure".into())),
            Ok(AnalysisVerdict::from_answer("YES")),
        ]);
        let (orch, _) = orchestrator(MockFrames::healthy(), analyzer.clone(), alerts.clone());

        orch.start(test_pipeline_config()).await.expect("start");
        wait_for_state(&orch, LifecycleState::Running).await;
        sleep(Duration::from_secs(15)).await;

        assert!(analyzer.calls() >= 3);
        assert!(alerts.0.alerts.load(Ordering::SeqCst) >= 1);
        orch.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_continuous_leaves_camera_open() {
        let frames = MockFrames::healthy();
        let alerts = MockAlerter::default();
        let (orch, _) = orchestrator(
            frames.clone(),
            MockAnalyzer::always(AnalysisVerdict::from_answer("NO")),
            alerts.clone(),
        );

        orch.start_continuous(test_pipeline_config())
            .await
            .expect("start");
        wait_for_state(&orch, LifecycleState::Running).await;

        orch.stop_continuous().await;
        assert_eq!(orch.state(), LifecycleState::Idle);
        assert!(!frames.0.closed.load(Ordering::SeqCst));
        assert_eq!(alerts.0.releases.load(Ordering::SeqCst), 0);

        // A single capture still works against the open camera.
        let frame = orch.request_single_capture().await;
        assert!(frame.is_some());
        orch.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn single_capture_without_camera_returns_none() {
        let (orch, _) = orchestrator(
            MockFrames::never_ready(),
            MockAnalyzer::always(AnalysisVerdict::from_answer("NO")),
            MockAlerter::default(),
        );
        assert!(orch.request_single_capture().await.is_none());
    }
}
