use std::sync::Arc;
use std::time::Duration;

use harbor_runtime::{
    GatewayError, Kind, LifecycleEvent, RecordState, Runtime, RuntimeError, STATE_KEY, Stage,
};
use harbor_test::{
    Call, MockGateway, failing_factory, init_test_logging, mock_factory, test_config,
    test_config_builder, test_dir,
};
use tempfile::TempDir;

const COMMONS_LANG: &str = "mvn:commons-lang/commons-lang/2.6";

async fn runtime_with(gateway: MockGateway) -> (TempDir, Arc<MockGateway>, Runtime) {
    init_test_logging();
    let dir = test_dir();
    let gateway = Arc::new(gateway);
    let runtime = Runtime::build(test_config(&dir), mock_factory(Arc::clone(&gateway)));
    runtime.init().await.unwrap();
    (dir, gateway, runtime)
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_commons_lang_module_becomes_active() {
    let (_dir, _gateway, runtime) =
        runtime_with(MockGateway::new().with_unit(COMMONS_LANG, "org.apache.commons.lang")).await;

    let record = runtime.add_module(COMMONS_LANG).await.unwrap();
    assert_eq!(record.state(), RecordState::Installed);
    assert_eq!(runtime.modules().await.len(), 1);

    let report = runtime.start().await.unwrap();
    assert!(report.is_success());

    let record = runtime.module(COMMONS_LANG).await.unwrap();
    assert_eq!(record.state(), RecordState::Active);
    assert_eq!(record.metadata()[STATE_KEY], "ACTIVE");
    assert_eq!(record.name(), "org.apache.commons.lang");
    assert_eq!(record.reference(), COMMONS_LANG);
}

#[tokio::test]
async fn test_bad_reference_is_not_recorded() {
    let (_dir, _gateway, runtime) =
        runtime_with(MockGateway::new().failing_load("mvn:org.example/missing/1.0")).await;

    let err = runtime
        .add_module("mvn:org.example/missing/1.0")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::LoadFailure {
            kind: Kind::Module,
            source: GatewayError::Unresolved(_),
            ..
        }
    ));
    assert_eq!(err.reference(), Some("mvn:org.example/missing/1.0"));
    assert!(runtime.modules().await.is_empty());
}

#[tokio::test]
async fn test_dual_add_module() {
    let (_dir, gateway, runtime) = runtime_with(MockGateway::new()).await;

    let first = runtime.add_module("file:app-1.0.jar").await.unwrap();
    let second = runtime.add_module("file:app-1.0.jar").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(runtime.modules().await.len(), 1);
    assert_eq!(gateway.calls(Call::Resolve, "file:app-1.0.jar"), 1);
}

#[tokio::test]
async fn test_dual_add_extension() {
    let (_dir, gateway, runtime) = runtime_with(MockGateway::new()).await;
    let log = "mvn:org.apache.karaf.extensions/log/5.0.0";

    runtime.add_extension(log).await.unwrap();
    runtime.add_extension(log).await.unwrap();

    assert_eq!(runtime.extensions().await.len(), 1);
    assert_eq!(gateway.calls(Call::Resolve, log), 1);
}

#[tokio::test]
async fn test_module_and_extension_keys_are_independent() {
    let (_dir, gateway, runtime) = runtime_with(MockGateway::new()).await;

    let module = runtime.add_module("shared.jar").await.unwrap();
    let extension = runtime.add_extension("shared.jar").await.unwrap();

    assert_eq!(module.kind(), Kind::Module);
    assert_eq!(extension.kind(), Kind::Extension);
    assert_eq!(gateway.calls(Call::Resolve, "shared.jar"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dual_add_loads_once() {
    let (_dir, gateway, runtime) =
        runtime_with(MockGateway::new().with_resolve_delay(Duration::from_millis(50))).await;

    let adds = (0..8).map(|_| {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.add_module("slow.jar").await })
    });
    let records: Vec<_> = futures::future::join_all(adds)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(records.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(runtime.modules().await.len(), 1);
    assert_eq!(gateway.calls(Call::Resolve, "slow.jar"), 1);
}

#[tokio::test]
async fn test_add_remove_round_trip() {
    let (_dir, gateway, runtime) = runtime_with(MockGateway::new()).await;

    let first = runtime.add_module("app.jar").await.unwrap();
    runtime.start().await.unwrap();

    let removed = runtime.remove_module("app.jar").await.unwrap().unwrap();
    assert_eq!(removed.state(), RecordState::Uninstalled);
    assert!(runtime.module("app.jar").await.is_none());
    assert_eq!(gateway.calls(Call::Deactivate, "app.jar"), 1);
    assert_eq!(gateway.calls(Call::Uninstall, "app.jar"), 1);

    let again = runtime.add_module("app.jar").await.unwrap();
    assert_eq!(gateway.calls(Call::Resolve, "app.jar"), 2);
    assert_ne!(first.unit().id, again.unit().id);
}

#[tokio::test]
async fn test_remove_absent_is_noop() {
    let (_dir, gateway, runtime) = runtime_with(MockGateway::new()).await;

    assert!(runtime.remove_module("never-added.jar").await.unwrap().is_none());
    assert!(
        runtime
            .remove_extension("never-added.jar", false)
            .await
            .unwrap()
            .is_none()
    );
    assert!(gateway.call_log().is_empty());
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let (_dir, _gateway, runtime) =
        runtime_with(MockGateway::new().failing_link("broken.jar")).await;
    for reference in ["a.jar", "b.jar", "broken.jar", "c.jar"] {
        runtime.add_module(reference).await.unwrap();
    }

    let report = runtime.start().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.failed_references(), vec!["broken.jar"]);
    assert_eq!(report.failures()[0].stage, Stage::Resolve);
    assert_eq!(report.succeeded().len(), 3);
    assert_eq!(report.to_string(), "completed with 1 failures");

    for reference in ["a.jar", "b.jar", "c.jar"] {
        assert!(runtime.module(reference).await.unwrap().is_active());
    }
    assert_eq!(
        runtime.module("broken.jar").await.unwrap().state(),
        RecordState::Installed
    );
}

#[tokio::test]
async fn test_failed_activation_is_retried_on_next_start() {
    let (_dir, gateway, runtime) =
        runtime_with(MockGateway::new().failing_activate("flaky.jar")).await;
    runtime.add_module("flaky.jar").await.unwrap();

    let report = runtime.start().await.unwrap();
    assert_eq!(report.failures()[0].stage, Stage::Activate);
    assert_eq!(
        runtime.module("flaky.jar").await.unwrap().state(),
        RecordState::Resolved
    );

    runtime.start().await.unwrap();
    assert_eq!(gateway.calls(Call::Activate, "flaky.jar"), 2);
    assert_eq!(gateway.calls(Call::Link, "flaky.jar"), 1);
}

#[tokio::test]
async fn test_start_level_ordering() {
    let gateway = MockGateway::new()
        .with_start_level("late.jar", 80)
        .with_start_level("early.jar", 5)
        .with_start_level("tie-2.jar", 30)
        .with_start_level("tie-1.jar", 30);
    let (_dir, gateway, runtime) = runtime_with(gateway).await;
    for reference in ["late.jar", "default.jar", "tie-1.jar", "early.jar", "tie-2.jar"] {
        runtime.add_module(reference).await.unwrap();
    }

    runtime.start().await.unwrap();

    assert_eq!(
        gateway.references_for(Call::Activate),
        vec!["early.jar", "tie-1.jar", "tie-2.jar", "default.jar", "late.jar"]
    );
    assert_eq!(runtime.module("default.jar").await.unwrap().start_level(), 50);
}

#[tokio::test]
async fn test_extensions_start_before_modules() {
    let (_dir, gateway, runtime) =
        runtime_with(MockGateway::new().with_start_level("ext.jar", 90)).await;
    runtime.add_module("mod.jar").await.unwrap();
    runtime.add_extension("ext.jar").await.unwrap();

    runtime.start().await.unwrap();

    assert_eq!(
        gateway.references_for(Call::Activate),
        vec!["ext.jar", "mod.jar"]
    );
}

#[tokio::test]
async fn test_states_only_move_forward_during_start() {
    let (_dir, _gateway, runtime) = runtime_with(MockGateway::new()).await;
    for reference in ["a.jar", "b.jar"] {
        runtime.add_module(reference).await.unwrap();
    }
    let mut rx = runtime.subscribe();

    runtime.start().await.unwrap();

    let events = drain(&mut rx);
    for reference in ["a.jar", "b.jar"] {
        let path: Vec<(Option<RecordState>, RecordState)> = events
            .iter()
            .filter(|e| e.reference == reference)
            .map(|e| (e.from, e.to))
            .collect();
        assert_eq!(
            path,
            vec![
                (Some(RecordState::Installed), RecordState::Resolved),
                (Some(RecordState::Resolved), RecordState::Starting),
                (Some(RecordState::Starting), RecordState::Active),
            ]
        );
    }
}

#[tokio::test]
async fn test_add_after_start_activates() {
    let (_dir, gateway, runtime) =
        runtime_with(MockGateway::new().failing_activate("late-bad.jar")).await;
    runtime.start().await.unwrap();

    let record = runtime.add_module("late.jar").await.unwrap();
    assert!(record.is_active());

    let err = runtime.add_module("late-bad.jar").await.unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::ResolutionFailure {
            stage: Stage::Activate,
            ..
        }
    ));
    assert!(runtime.module("late-bad.jar").await.is_none());
    assert_eq!(gateway.calls(Call::Uninstall, "late-bad.jar"), 1);
}

#[tokio::test]
async fn test_initial_modules_load_on_first_start() {
    init_test_logging();
    let dir = test_dir();
    let gateway = Arc::new(MockGateway::new().failing_load("missing.jar"));
    let config = test_config_builder(&dir)
        .with_modules(["a.jar", "missing.jar"])
        .build()
        .unwrap();
    let runtime = Runtime::build(config, mock_factory(Arc::clone(&gateway)));
    runtime.init().await.unwrap();
    assert!(runtime.modules().await.is_empty());

    let report = runtime.start().await.unwrap();
    assert_eq!(report.failed_references(), vec!["missing.jar"]);
    assert_eq!(report.failures()[0].stage, Stage::Load);
    assert!(runtime.module("a.jar").await.unwrap().is_active());

    runtime.start().await.unwrap();
    assert_eq!(gateway.calls(Call::Resolve, "missing.jar"), 1);
}

#[tokio::test]
async fn test_stop_deactivates_in_reverse() {
    let gateway = MockGateway::new()
        .with_start_level("low.jar", 10)
        .with_start_level("high.jar", 60);
    let (_dir, gateway, runtime) = runtime_with(gateway).await;
    runtime.add_module("low.jar").await.unwrap();
    runtime.add_module("high.jar").await.unwrap();
    runtime.add_extension("ext.jar").await.unwrap();
    runtime.start().await.unwrap();

    let report = runtime.stop().await.unwrap();

    assert!(report.is_success());
    assert!(!runtime.is_started().await);
    assert_eq!(
        gateway.references_for(Call::Deactivate),
        vec!["high.jar", "low.jar", "ext.jar"]
    );
    assert_eq!(
        runtime.module("low.jar").await.unwrap().state(),
        RecordState::Resolved
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_add_during_stop_stays_installed() {
    let gateway =
        MockGateway::new().with_delay("ext-a.jar", Call::Deactivate, Duration::from_millis(300));
    let (_dir, gateway, runtime) = runtime_with(gateway).await;
    runtime.add_extension("ext-a.jar").await.unwrap();
    runtime.start().await.unwrap();

    let stopping = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let added = runtime.add_extension("ext-b.jar").await.unwrap();
    stopping.await.unwrap().unwrap();

    assert_eq!(added.state(), RecordState::Installed);
    assert!(!runtime.is_started().await);
    assert_eq!(
        runtime.extension("ext-b.jar").await.unwrap().state(),
        RecordState::Installed
    );
    assert_eq!(gateway.calls(Call::Activate, "ext-b.jar"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registries_progress_independently() {
    let gateway =
        MockGateway::new().with_delay("slow.jar", Call::Resolve, Duration::from_millis(500));
    let (_dir, _gateway, runtime) = runtime_with(gateway).await;

    let slow = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.add_module("slow.jar").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let fast = tokio::time::timeout(
        Duration::from_millis(250),
        runtime.add_extension("fast.jar"),
    )
    .await
    .expect("extension add waited on the module registry")
    .unwrap();
    assert_eq!(fast.state(), RecordState::Installed);
    assert!(!slow.is_finished());

    slow.await.unwrap().unwrap();
    assert!(runtime.module("slow.jar").await.is_some());
}

#[tokio::test]
async fn test_remove_module_stop_failure_keeps_record() {
    let (_dir, _gateway, runtime) =
        runtime_with(MockGateway::new().failing_deactivate("stuck.jar")).await;
    runtime.add_module("stuck.jar").await.unwrap();
    runtime.start().await.unwrap();

    let err = runtime.remove_module("stuck.jar").await.unwrap_err();
    assert!(matches!(err, RuntimeError::StopFailure { .. }));
    assert_eq!(err.reference(), Some("stuck.jar"));
    assert!(runtime.module("stuck.jar").await.unwrap().is_active());
}

#[tokio::test]
async fn test_force_remove_extension_swallows_errors() {
    let gateway = MockGateway::new()
        .failing_deactivate("ext.jar")
        .failing_uninstall("ext.jar");
    let (_dir, gateway, runtime) = runtime_with(gateway).await;
    runtime.add_extension("ext.jar").await.unwrap();
    runtime.start().await.unwrap();

    let err = runtime.remove_extension("ext.jar", false).await.unwrap_err();
    assert!(matches!(err, RuntimeError::StopFailure { kind: Kind::Extension, .. }));
    assert!(runtime.extension("ext.jar").await.is_some());

    let removed = runtime.remove_extension("ext.jar", true).await.unwrap().unwrap();
    assert_eq!(removed.state(), RecordState::Uninstalled);
    assert!(runtime.extensions().await.is_empty());
    assert_eq!(gateway.calls(Call::Uninstall, "ext.jar"), 1);
}

#[tokio::test]
async fn test_clear_cache_on_init() {
    let dir = test_dir();
    let cache = dir.path().join("cache");
    std::fs::create_dir_all(cache.join("stale")).unwrap();
    std::fs::write(cache.join("stale/unit.bin"), b"old").unwrap();
    std::fs::write(cache.join("index"), b"old").unwrap();

    let config = test_config_builder(&dir).with_clear_cache(true).build().unwrap();
    let runtime = Runtime::build(config, mock_factory(Arc::new(MockGateway::new())));
    runtime.init().await.unwrap();

    assert!(cache.is_dir());
    assert_eq!(std::fs::read_dir(&cache).unwrap().count(), 0);
    assert!(dir.path().join("data").is_dir());
    assert!(dir.path().join("etc").is_dir());
}

#[tokio::test]
async fn test_init_phases() {
    let dir = test_dir();
    let runtime = Runtime::build(test_config(&dir), mock_factory(Arc::new(MockGateway::new())));

    assert!(matches!(
        runtime.add_module("a.jar").await,
        Err(RuntimeError::NotInitialized)
    ));
    assert!(matches!(runtime.start().await, Err(RuntimeError::NotInitialized)));

    runtime.init().await.unwrap();
    assert!(matches!(
        runtime.init().await,
        Err(RuntimeError::AlreadyInitialized)
    ));
}

#[tokio::test]
async fn test_failed_gateway_init_is_fatal() {
    let dir = test_dir();
    let runtime = Runtime::build(
        test_config(&dir),
        failing_factory(GatewayError::Invalid("no engine".into())),
    );

    let err = runtime.init().await.unwrap_err();
    assert!(matches!(err, RuntimeError::GatewayInit(GatewayError::Invalid(_))));

    assert!(matches!(
        runtime.add_module("a.jar").await,
        Err(RuntimeError::InitFailed)
    ));
    assert!(matches!(runtime.init().await, Err(RuntimeError::InitFailed)));
    assert!(matches!(
        runtime.get_service::<Runtime>(),
        Err(RuntimeError::InitFailed)
    ));
}

#[tokio::test]
async fn test_unwritable_directory_is_fatal() {
    let dir = test_dir();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"file").unwrap();
    let config = test_config_builder(&dir)
        .with_etc_dir(blocker.join("etc"))
        .build()
        .unwrap();
    let runtime = Runtime::build(config, mock_factory(Arc::new(MockGateway::new())));

    assert!(matches!(
        runtime.init().await,
        Err(RuntimeError::Directory { .. })
    ));
    assert!(matches!(runtime.start().await, Err(RuntimeError::InitFailed)));
}

#[tokio::test]
async fn test_service_lookup() {
    #[derive(Debug)]
    struct Clock;

    let (_dir, _gateway, runtime) = runtime_with(MockGateway::new()).await;

    let this = runtime.get_service::<Runtime>().unwrap();
    assert_eq!(*this, runtime);

    assert!(matches!(
        runtime.get_service::<Clock>(),
        Err(RuntimeError::ServiceNotFound(_))
    ));
    runtime.register_service(Arc::new(Clock));
    assert!(runtime.get_service::<Clock>().is_ok());

    runtime.register_named_service("clock", Arc::new(Clock));
    assert!(runtime.get_named_service::<Clock>("clock").is_ok());
    assert!(runtime.get_named_service::<Runtime>("clock").is_err());
}

#[tokio::test]
async fn test_shutdown_tears_everything_down() {
    let (_dir, gateway, runtime) =
        runtime_with(MockGateway::new().failing_deactivate("ext.jar")).await;
    runtime.add_module("a.jar").await.unwrap();
    runtime.add_extension("ext.jar").await.unwrap();
    runtime.start().await.unwrap();

    runtime.shutdown().await.unwrap();

    assert!(runtime.modules().await.is_empty());
    assert!(runtime.extensions().await.is_empty());
    assert_eq!(gateway.calls(Call::Uninstall, "a.jar"), 1);
    assert!(matches!(
        runtime.get_service::<Runtime>(),
        Err(RuntimeError::NotInitialized)
    ));

    runtime.init().await.unwrap();
    assert!(runtime.get_service::<Runtime>().is_ok());
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_shutdown_keeps_runtime_usable() {
    let (_dir, gateway, runtime) =
        runtime_with(MockGateway::new().failing_uninstall("sticky.jar")).await;
    runtime.add_module("sticky.jar").await.unwrap();
    runtime.add_module("a.jar").await.unwrap();
    runtime.start().await.unwrap();

    let err = runtime.shutdown().await.unwrap_err();
    assert!(matches!(err, RuntimeError::UninstallFailure { .. }));
    assert_eq!(err.reference(), Some("sticky.jar"));
    assert_eq!(runtime.modules().await.len(), 1);
    assert!(runtime.get_service::<Runtime>().is_ok());

    gateway.clear_failures("sticky.jar");
    runtime.shutdown().await.unwrap();
    assert!(runtime.modules().await.is_empty());
    assert!(matches!(
        runtime.get_service::<Runtime>(),
        Err(RuntimeError::NotInitialized)
    ));
}
