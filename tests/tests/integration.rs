//! Cross-component scenarios for the resilience core.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;

use peeka_foundation::context::ResilienceContextBuilder;
use peeka_foundation::device::{DeviceProfile, OsClassification};
use peeka_foundation::fallback::{FallbackPolicy, FallbackPolicyEngine, PolicyTable};
use peeka_foundation::model_cache::{CacheKey, ModelCache, ModelCacheConfig};
use peeka_foundation::recovery::{
    HandleDisposition, OrchestratorState, RecoveryAction, RecoveryConfig, RecoveryOrchestrator,
};
use peeka_foundation::resource::{ResourceConfig, ResourceMonitor};
use peeka_foundation::thermal::{ThermalConfig, ThermalMonitor, ThermalState};
use peeka_kernel::asset::{AssetLoader, AssetQuality};
use peeka_kernel::clock::ManualClock;
use peeka_kernel::failure::{FailureEvent, FailureKind};
use peeka_kernel::session::ArSessionHandle;

use peeka_testing::{
    CountingLoader, MockArSession, RecordingNotifier, ScriptedSensor, test_event,
};

struct NullMitigation;

#[async_trait::async_trait]
impl peeka_foundation::thermal::MitigationHooks for NullMitigation {
    async fn mild(&self) {}
    async fn severe(&self) {}
}

fn test_profile() -> DeviceProfile {
    DeviceProfile {
        os: OsClassification::Ios,
        total_memory_bytes: 4 * 1024 * 1024 * 1024,
        available_memory_bytes: 2 * 1024 * 1024 * 1024,
    }
}

async fn wait_idle(orchestrator: &RecoveryOrchestrator) {
    // Paused-time tests auto-advance the clock while everything sleeps, so
    // generous virtual waits cost nothing in wall time.
    for _ in 0..4_000 {
        if orchestrator.state() == OrchestratorState::Idle {
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    panic!("orchestrator never returned to Idle");
}

// Spec scenario: memory-pressure with {AutoRecover, maxRetries=3, delay=30s};
// the action fails twice then succeeds. Expect three attempts, final state
// Idle, retry counter reset to zero.
#[tokio::test(start_paused = true)]
async fn memory_pressure_recovers_on_third_attempt() {
    peeka_testing::init_tracing();

    let notifier = RecordingNotifier::new();
    let engine = FallbackPolicyEngine::new(PolicyTable::default());
    let orchestrator =
        RecoveryOrchestrator::new(RecoveryConfig::default(), engine.clone(), notifier.clone());

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_inner = calls.clone();
    let action: RecoveryAction = Arc::new(move || {
        let attempt = calls_inner.fetch_add(1, Ordering::SeqCst);
        async move { attempt >= 2 }.boxed()
    });

    let event = test_event(FailureKind::MemoryPressure, "estimated memory critical");
    assert_eq!(
        orchestrator.handle(&event, action),
        HandleDisposition::Scheduled
    );

    wait_idle(&orchestrator).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert_eq!(engine.attempts(FailureKind::MemoryPressure), 0);
    // Automatic recovery never bothered the user.
    assert_eq!(notifier.call_count(), 0);
}

// Spec scenario: permission-denied surfaces the fallback immediately, with
// no retry scheduled, regardless of retry counters.
#[tokio::test(start_paused = true)]
async fn permission_denied_surfaces_fallback_immediately() {
    let notifier = RecordingNotifier::new();
    let engine = FallbackPolicyEngine::new(PolicyTable::default());
    let orchestrator =
        RecoveryOrchestrator::new(RecoveryConfig::default(), engine.clone(), notifier.clone());

    // Poison unrelated counters first; they must not matter.
    engine.record_attempt(FailureKind::Network);

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_inner = ran.clone();
    let action: RecoveryAction = Arc::new(move || {
        ran_inner.fetch_add(1, Ordering::SeqCst);
        async { true }.boxed()
    });

    let event = test_event(FailureKind::PermissionDenied, "camera permission denied");
    assert!(engine.should_show_fallback_surface(&event));
    assert_eq!(
        orchestrator.handle(&event, action),
        HandleDisposition::FallbackSurface
    );

    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    let calls = notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, FailureKind::PermissionDenied);
    assert!(!calls[0].2);
}

// Spec scenario: the temperature sequence [35, 40, 43, 38, 34] against
// thresholds (39, 42) yields [Normal, Elevated, Critical, Elevated, Normal].
#[tokio::test]
async fn thermal_sequence_walks_all_states() {
    let monitor = ThermalMonitor::new(
        ThermalConfig::default().with_thresholds(39.0, 42.0),
        ScriptedSensor::new(vec![35.0, 40.0, 43.0, 38.0, 34.0]),
        MockArSession::new(),
        Arc::new(NullMitigation),
    );

    let mut states = Vec::new();
    for _ in 0..5 {
        monitor.sample_once().await;
        states.push(monitor.state().await);
    }

    assert_eq!(
        states,
        vec![
            ThermalState::Normal,
            ThermalState::Elevated,
            ThermalState::Critical,
            ThermalState::Elevated,
            ThermalState::Normal,
        ]
    );
}

// Spec scenario: with both memory and thermal degradation active, clearing
// only the memory condition must leave degraded=true until thermal clears.
#[tokio::test]
async fn degraded_flag_is_or_of_memory_and_thermal() {
    let clock = ManualClock::new(0);
    let session = MockArSession::new();
    let cache = ModelCache::with_clock(
        ModelCacheConfig::default().with_max_entries(50),
        clock.clone(),
    );

    // Thermal side: drive to Elevated, then later back to Normal.
    let thermal = ThermalMonitor::new(
        ThermalConfig::default().with_thresholds(39.0, 42.0),
        ScriptedSensor::new(vec![40.0, 40.0, 35.0]),
        session.clone(),
        Arc::new(NullMitigation),
    );
    thermal.sample_once().await;
    assert!(thermal.is_degraded());

    // Memory side: fill the cache past the critical watermark.
    let loader = CountingLoader::new(64);
    for i in 0..12 {
        let identity = format!("asset-{i}");
        let key = CacheKey::new(identity.clone(), AssetQuality::default());
        let loader = loader.clone();
        cache
            .get_or_load(&key, || async move {
                loader.load(&identity, AssetQuality::default()).await
            })
            .await
            .unwrap();
    }

    let monitor = ResourceMonitor::new(
        ResourceConfig::default()
            .with_asset_costs(1, 1)
            .with_watermarks(5, 10),
        cache.clone(),
        session,
        thermal.clone(),
    );

    monitor.sample_once().await;
    assert!(monitor.is_memory_degraded());
    assert!(monitor.snapshot().await.degraded);

    // Memory recovers (cache was cleared); thermal still elevated.
    monitor.sample_once().await;
    assert!(!monitor.is_memory_degraded());
    assert!(
        monitor.snapshot().await.degraded,
        "thermal degradation must not be cleared by a memory-only recovery"
    );

    // Thermal cools down; now the combined flag clears too.
    thermal.sample_once().await;
    thermal.sample_once().await;
    assert!(!thermal.is_degraded());
    monitor.sample_once().await;
    assert!(!monitor.snapshot().await.degraded);
}

// End to end: a failed asset load publishes model-loading to the bus, the
// installed routing hands it to the orchestrator, and the retry succeeds
// once the loader recovers.
#[tokio::test(start_paused = true)]
async fn load_failure_routes_through_bus_to_recovery() {
    let session = MockArSession::new();
    let notifier = RecordingNotifier::new();

    let context = ResilienceContextBuilder::new(session)
        .with_clock(ManualClock::new(0))
        .with_device_profile(test_profile())
        .with_notifier(notifier.clone())
        .with_policy_table(PolicyTable::default().with_policy(
            FailureKind::ModelLoading,
            FallbackPolicy::auto(3, Duration::from_millis(100)),
        ))
        .build();

    let loader = CountingLoader::new(256);
    loader.fail_next(1);

    // Recovery action: reload the asset through the cache.
    let cache = context.cache.clone();
    let retry_loader = loader.clone();
    let action: RecoveryAction = Arc::new(move || {
        let cache = cache.clone();
        let loader = retry_loader.clone();
        async move {
            let key = CacheKey::new("dinosaur", AssetQuality::default());
            cache
                .get_or_load(&key, || async {
                    loader.load("dinosaur", AssetQuality::default()).await
                })
                .await
                .is_ok()
        }
        .boxed()
    });
    context.install_recovery_action(action);

    // First load fails and publishes to the bus.
    let key = CacheKey::new("dinosaur", AssetQuality::default());
    let first = context
        .cache
        .get_or_load(&key, || async {
            loader.load("dinosaur", AssetQuality::default()).await
        })
        .await;
    assert!(first.is_err());
    assert_eq!(
        context.bus.history_for(FailureKind::ModelLoading).len(),
        1
    );

    wait_idle(&context.orchestrator).await;

    assert!(context.cache.contains(&key).await);
    assert_eq!(context.orchestrator.metrics().total_successes(), 1);
    assert_eq!(context.engine.attempts(FailureKind::ModelLoading), 0);

    context.shutdown().await;
}

// A recovery action that restarts the AR session, failing twice before the
// session comes back. Exactly one recovery effort runs even though more
// session-start failures are published mid-flight.
#[tokio::test(start_paused = true)]
async fn session_restart_recovery_is_single_in_flight() {
    let session = MockArSession::new();
    session.fail_next_starts(2);

    let notifier = RecordingNotifier::new();
    let engine = FallbackPolicyEngine::new(PolicyTable::default().with_policy(
        FailureKind::SessionStart,
        FallbackPolicy::auto(3, Duration::from_millis(50)),
    ));
    let orchestrator =
        RecoveryOrchestrator::new(RecoveryConfig::default(), engine.clone(), notifier);

    let restart_session = session.clone();
    let action: RecoveryAction = Arc::new(move || {
        let session = restart_session.clone();
        async move { session.start().await.is_ok() }.boxed()
    });

    let event = test_event(FailureKind::SessionStart, "tracking lost");
    assert_eq!(
        orchestrator.handle(&event, action.clone()),
        HandleDisposition::Scheduled
    );
    // A second failure arrives while recovery is running.
    assert_eq!(
        orchestrator.handle(&event, action),
        HandleDisposition::Ignored
    );

    wait_idle(&orchestrator).await;

    // Two scripted failures, then success: three start calls total.
    assert_eq!(session.start_count.load(Ordering::SeqCst), 3);
    assert_eq!(orchestrator.metrics().total_ignored(), 1);
    assert_eq!(orchestrator.metrics().total_successes(), 1);
    assert_eq!(engine.attempts(FailureKind::SessionStart), 0);
}

// Cache governance property: after any trim the entry count respects the
// target, pinned entries always survive, and clear() zeroes everything.
#[tokio::test]
async fn cache_bound_and_pinning_hold_across_operations() {
    let clock = ManualClock::new(0);
    let cache = ModelCache::with_clock(
        ModelCacheConfig::default()
            .with_max_entries(6)
            .with_pinned_identities(vec!["mascot".to_string()]),
        clock.clone(),
    );
    let loader = CountingLoader::new(128);

    let mut identities: Vec<String> = vec!["mascot".to_string()];
    identities.extend((0..9).map(|i| format!("toy-{i}")));

    for identity in &identities {
        clock.advance(10);
        let key = CacheKey::new(identity.clone(), AssetQuality::default());
        let loader = loader.clone();
        let id = identity.clone();
        cache
            .get_or_load(&key, || async move {
                loader.load(&id, AssetQuality::default()).await
            })
            .await
            .unwrap();
        // Inserting past max trims back down immediately.
        assert!(cache.len().await <= 6);
    }

    // The pinned mascot was the oldest access the whole time.
    assert!(
        cache
            .contains(&CacheKey::new("mascot", AssetQuality::default()))
            .await
    );

    cache.trim(2).await;
    assert!(cache.len().await <= 2);
    assert!(
        cache
            .contains(&CacheKey::new("mascot", AssetQuality::default()))
            .await
    );

    cache.clear().await;
    assert_eq!(cache.len().await, 0);
    assert_eq!(cache.estimated_memory_bytes(), 0);
    assert_eq!(cache.stats().await.entries, 0);
}

// Exhaustion end state: a permanently failing recovery spends exactly its
// budget, notifies once, and leaves the orchestrator reusable.
#[tokio::test(start_paused = true)]
async fn exhausted_recovery_notifies_and_orchestrator_stays_usable() {
    let notifier = RecordingNotifier::new();
    let engine = FallbackPolicyEngine::new(PolicyTable::default().with_policy(
        FailureKind::Network,
        FallbackPolicy::auto(2, Duration::from_millis(20)),
    ));
    let orchestrator =
        RecoveryOrchestrator::new(RecoveryConfig::default(), engine.clone(), notifier.clone());

    let action: RecoveryAction = Arc::new(|| async { false }.boxed());
    let event = test_event(FailureKind::Network, "no connection");
    orchestrator.handle(&event, action);
    wait_idle(&orchestrator).await;

    assert_eq!(orchestrator.metrics().total_attempts(), 2);
    assert_eq!(orchestrator.metrics().total_exhaustions(), 1);
    assert_eq!(notifier.call_count(), 1);

    // A different kind can still recover afterwards.
    engine.reset(FailureKind::Network);
    let ok_action: RecoveryAction = Arc::new(|| async { true }.boxed());
    let other = test_event(FailureKind::SessionResume, "resume glitch");
    assert_eq!(
        orchestrator.handle(&other, ok_action),
        HandleDisposition::Scheduled
    );
    wait_idle(&orchestrator).await;
    assert_eq!(orchestrator.metrics().total_successes(), 1);
}
