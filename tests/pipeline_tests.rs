use async_trait::async_trait;
use skiff::dispatch::{DispatchError, Dispatcher};
use skiff::output::{OutputRouter, RetryPolicy};
use skiff::record::{Ack, Batch, Record};
use skiff::registry::{DuckDbRegistry, OffsetStore};
use skiff::source::{FileTailer, TailerSettings};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

/// Dispatcher fake that records every delivered batch and acknowledges
/// each one positively.
struct CapturingDispatcher {
    sent: Arc<Mutex<Vec<Batch>>>,
}

#[async_trait]
impl Dispatcher for CapturingDispatcher {
    async fn setup(&mut self) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn send(&self, batch: &[Record]) -> Result<Ack, DispatchError> {
        self.sent.lock().unwrap().push(batch.to_vec());
        let last = batch.last().ok_or(DispatchError::EmptyBatch)?;
        Ok(Ack::new(last.clone(), false))
    }
}

fn fast_settings(max_batch_size: usize) -> TailerSettings {
    TailerSettings {
        dead_file_threshold: Duration::from_secs(60),
        dispatch_interval: Duration::from_secs(60),
        read_timeout: Duration::from_millis(20),
        poll_interval: Duration::from_millis(5),
        max_batch_size,
    }
}

async fn in_memory_registry() -> Arc<DuckDbRegistry> {
    let registry = DuckDbRegistry::in_memory().unwrap();
    registry.init_schema().await.unwrap();
    Arc::new(registry)
}

async fn wait_for_offset(registry: &DuckDbRegistry, source: &str, expected: u64) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match registry.get_offset(source).await {
            Ok(offset) if offset == expected => return,
            _ if Instant::now() < deadline => sleep(Duration::from_millis(10)).await,
            other => panic!("offset never reached {expected}: {other:?}"),
        }
    }
}

#[tokio::test]
async fn tail_dispatch_ack_commits_offset() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{\"a\":1}}\n{{\"a\":2}}\n").unwrap();
    file.flush().unwrap();
    let path = file.path().to_path_buf();
    let source = path.to_string_lossy().into_owned();

    let registry = in_memory_registry().await;
    let sent = Arc::new(Mutex::new(Vec::new()));

    let (router, handle) = OutputRouter::new(
        Box::new(CapturingDispatcher { sent: sent.clone() }),
        RetryPolicy::fixed(Duration::from_millis(5)),
        8,
    );
    let (router_stop_tx, router_stop_rx) = watch::channel(false);
    let router_task = tokio::spawn(router.run(router_stop_rx));

    let tailer = FileTailer::new(path, fast_settings(2), registry.clone());
    let ack_rx = handle.subscribe(&source);
    let (tailer_stop_tx, tailer_stop_rx) = watch::channel(false);
    let tailer_task = tokio::spawn(tailer.run(handle.queue(), ack_rx, tailer_stop_rx));

    // Both lines delivered as one batch, registry holds the total length.
    wait_for_offset(&registry, &source, 16).await;
    {
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 2);
        assert_eq!(sent[0][0].offset, 0);
        assert_eq!(sent[0][1].offset, 8);
    }

    tailer_stop_tx.send(true).unwrap();
    tailer_task.await.unwrap();
    handle.unsubscribe(&source);
    router_stop_tx.send(true).unwrap();
    router_task.await.unwrap();
}

#[tokio::test]
async fn restart_resumes_from_committed_offset() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{\"a\":1}}\n").unwrap();
    file.flush().unwrap();
    let path = file.path().to_path_buf();
    let source = path.to_string_lossy().into_owned();

    let registry = in_memory_registry().await;
    let sent = Arc::new(Mutex::new(Vec::new()));

    // First session: ship the single line, then stop everything.
    {
        let (router, handle) = OutputRouter::new(
            Box::new(CapturingDispatcher { sent: sent.clone() }),
            RetryPolicy::fixed(Duration::from_millis(5)),
            8,
        );
        let (router_stop_tx, router_stop_rx) = watch::channel(false);
        let router_task = tokio::spawn(router.run(router_stop_rx));

        let tailer = FileTailer::new(path.clone(), fast_settings(1), registry.clone());
        let ack_rx = handle.subscribe(&source);
        let (tailer_stop_tx, tailer_stop_rx) = watch::channel(false);
        let tailer_task = tokio::spawn(tailer.run(handle.queue(), ack_rx, tailer_stop_rx));

        wait_for_offset(&registry, &source, 8).await;

        tailer_stop_tx.send(true).unwrap();
        tailer_task.await.unwrap();
        handle.unsubscribe(&source);
        router_stop_tx.send(true).unwrap();
        router_task.await.unwrap();
    }

    // More data arrives while the shipper is down.
    write!(file, "{{\"a\":2}}\n").unwrap();
    file.flush().unwrap();

    // Second session resumes at the stored offset and ships only the
    // new line.
    {
        let (router, handle) = OutputRouter::new(
            Box::new(CapturingDispatcher { sent: sent.clone() }),
            RetryPolicy::fixed(Duration::from_millis(5)),
            8,
        );
        let (router_stop_tx, router_stop_rx) = watch::channel(false);
        let router_task = tokio::spawn(router.run(router_stop_rx));

        let tailer = FileTailer::new(path, fast_settings(1), registry.clone());
        let ack_rx = handle.subscribe(&source);
        let (tailer_stop_tx, tailer_stop_rx) = watch::channel(false);
        let tailer_task = tokio::spawn(tailer.run(handle.queue(), ack_rx, tailer_stop_rx));

        wait_for_offset(&registry, &source, 16).await;

        tailer_stop_tx.send(true).unwrap();
        tailer_task.await.unwrap();
        handle.unsubscribe(&source);
        router_stop_tx.send(true).unwrap();
        router_task.await.unwrap();
    }

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    // Second delivery starts where the first one ended.
    assert_eq!(sent[1][0].offset, 8);
    assert_eq!(sent[1][0].payload, serde_json::json!({"a": 2}));
}

#[tokio::test]
async fn two_sources_ship_concurrently_without_crosstalk() {
    let mut file_a = NamedTempFile::new().unwrap();
    write!(file_a, "{{\"src\":\"a\"}}\n").unwrap();
    file_a.flush().unwrap();
    let mut file_b = NamedTempFile::new().unwrap();
    write!(file_b, "{{\"src\":\"b\"}}\n").unwrap();
    file_b.flush().unwrap();

    let path_a = file_a.path().to_path_buf();
    let path_b = file_b.path().to_path_buf();
    let source_a = path_a.to_string_lossy().into_owned();
    let source_b = path_b.to_string_lossy().into_owned();

    let registry = in_memory_registry().await;
    let sent = Arc::new(Mutex::new(Vec::new()));

    let (router, handle) = OutputRouter::new(
        Box::new(CapturingDispatcher { sent }),
        RetryPolicy::fixed(Duration::from_millis(5)),
        8,
    );
    let (router_stop_tx, router_stop_rx) = watch::channel(false);
    let router_task = tokio::spawn(router.run(router_stop_rx));

    let (tailer_stop_tx, tailer_stop_rx) = watch::channel(false);
    let mut tasks = Vec::new();
    for (path, source) in [(path_a, &source_a), (path_b, &source_b)] {
        let tailer = FileTailer::new(path, fast_settings(1), registry.clone());
        let ack_rx = handle.subscribe(source);
        tasks.push(tokio::spawn(tailer.run(
            handle.queue(),
            ack_rx,
            tailer_stop_rx.clone(),
        )));
    }

    // Each source's offset advances independently; line lengths are 11
    // bytes plus the newline.
    wait_for_offset(&registry, &source_a, 12).await;
    wait_for_offset(&registry, &source_b, 12).await;

    tailer_stop_tx.send(true).unwrap();
    for task in tasks {
        task.await.unwrap();
    }
    router_stop_tx.send(true).unwrap();
    router_task.await.unwrap();
}
