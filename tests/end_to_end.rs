//! End-to-end scenarios through the public API.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use workbench::plugin::{
    PluginConfig, PluginError, PluginResult, RegistryEvent, WorkInputs, WorkOutput, Worker,
    WorkerCatalog,
};
use workbench::{Collaborators, Error, Workbench, WorkbenchConfig};

fn length(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
    let mut out = WorkOutput::new();
    out.insert("length".to_string(), json!(inputs.sample()?.length()));
    Ok(out)
}

fn doubled(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
    let len = inputs
        .require("meta")?
        .get("length")
        .and_then(Value::as_u64)
        .ok_or_else(|| PluginError::missing_input("meta.length"))?;
    let mut out = WorkOutput::new();
    out.insert("doubled".to_string(), json!(2 * len));
    Ok(out)
}

const META: &str = r#"
dependencies = ["sample"]

[[worker]]
kind = "builtin"
id = "length"

[self_test]
sample = { text = "hello" }
expect = { length = 5 }
"#;

const DERIVED: &str = r#"
dependencies = ["meta"]

[[worker]]
kind = "builtin"
id = "doubled"

[self_test]
inputs = { meta = { length = 21 } }
expect = { doubled = 42 }
"#;

fn catalog() -> WorkerCatalog {
    let mut catalog = WorkerCatalog::new();
    catalog.register("length", || Arc::new(length) as Arc<dyn Worker>);
    catalog.register("doubled", || Arc::new(doubled) as Arc<dyn Worker>);
    catalog
}

async fn workbench(dir: &Path, watch: bool) -> Workbench {
    let config = WorkbenchConfig {
        plugins: PluginConfig {
            watch,
            debounce_ms: 50,
            ..PluginConfig::for_dir(dir)
        },
        ..Default::default()
    };
    let collaborators = Collaborators::in_memory(&config.store).with_catalog(catalog());
    Workbench::init_with(config, collaborators).await.unwrap()
}

async fn next_registration(events: &mut tokio::sync::broadcast::Receiver<RegistryEvent>, name: &str) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("no registry event")
            .unwrap();
        if matches!(event, RegistryEvent::Registered { name: ref n, .. } if n == name) {
            return;
        }
    }
}

#[tokio::test]
async fn test_single_request_is_cached() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("meta.toml"), META).unwrap();
    let wb = workbench(dir.path(), false).await;
    let service = wb.service();

    let id = service.store_sample("s.bin", vec![0xAB; 42], "pe").await.unwrap();
    let first = service.work_request("meta", &id, None).await.unwrap();
    assert_eq!(first, json!({"length": 42}));

    let second = service.work_request("meta", &id, None).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(service.resolver().stats().executions, 1);
}

#[tokio::test]
async fn test_dependent_worker() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("meta.toml"), META).unwrap();
    std::fs::write(dir.path().join("derived.toml"), DERIVED).unwrap();
    let wb = workbench(dir.path(), false).await;
    let service = wb.service();

    let id = service.store_sample("s.bin", vec![1; 42], "pe").await.unwrap();
    let derived = service.work_request("derived", &id, None).await.unwrap();
    assert_eq!(derived, json!({"doubled": 84}));
}

#[tokio::test]
async fn test_sample_set_requires_members() {
    let dir = TempDir::new().unwrap();
    let wb = workbench(dir.path(), false).await;
    let service = wb.service();

    let s1 = service.store_sample("one", b"one".to_vec(), "text").await.unwrap();
    let s2 = workbench::core::Fingerprint::digest(b"never stored").to_hex();

    let err = assert_err!(service.store_sample_set(vec![s1.clone(), s2]).await);
    assert!(matches!(err, Error::NotFound { .. }));

    let set = assert_ok!(service.store_sample_set(vec![s1.clone()]).await);
    assert_eq!(service.get_sample_set(&set).await.unwrap().members, vec![s1]);
}

#[tokio::test]
async fn test_hot_reload_and_invalidation() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("meta.toml"), META).unwrap();
    let wb = workbench(dir.path(), true).await;
    let service = wb.service();
    let mut events = wb.registry().subscribe();

    let id = service.store_sample("s.bin", vec![2; 42], "pe").await.unwrap();
    service.work_request("meta", &id, None).await.unwrap();

    // A new module becomes available without a restart.
    std::fs::write(dir.path().join("derived.toml"), DERIVED).unwrap();
    next_registration(&mut events, "derived").await;
    assert_eq!(
        service.work_request("derived", &id, None).await.unwrap(),
        json!({"doubled": 84})
    );
    let executions = service.resolver().stats().executions;

    // Rewriting a module makes its cached results stale.
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::fs::write(dir.path().join("meta.toml"), META).unwrap();
    next_registration(&mut events, "meta").await;
    service.work_request("meta", &id, None).await.unwrap();
    assert_eq!(service.resolver().stats().executions, executions + 1);

    // A broken rewrite keeps the last good version.
    std::fs::write(dir.path().join("meta.toml"), "dependencies = [").unwrap();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();
        if matches!(event, RegistryEvent::Rejected { .. }) {
            break;
        }
    }
    assert!(wb.registry().contains("meta").await);
    assert_eq!(
        service.work_request("meta", &id, None).await.unwrap(),
        json!({"length": 42})
    );

    wb.shutdown().await;
}

#[tokio::test]
async fn test_shipped_workers() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("workers");
    let config = WorkbenchConfig {
        plugins: PluginConfig {
            watch: false,
            ..PluginConfig::for_dir(dir)
        },
        ..Default::default()
    };
    let wb = Workbench::init(config).await.unwrap();
    let service = wb.service();

    let id = service
        .store_sample("list.json", b"[1, 2, 3, 4]".to_vec(), "json")
        .await
        .unwrap();
    let view = service.work_request("view_customer", &id, None).await.unwrap();
    assert_eq!(view["customer"], "Unknown");
    assert_eq!(view["length"], 12);

    let keys = vec!["json_container".to_string(), "length".to_string()];
    let shape = service.work_request("json_meta", &id, Some(&keys)).await.unwrap();
    assert_eq!(shape, json!({"json_container": "list", "length": 12}));
}
