use super::{DispatchError, Dispatcher};
use crate::record::{Ack, Record};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Dispatcher that indexes record batches with a bulk NDJSON POST.
pub struct HttpDispatcher {
    host: String,
    index: String,
    client: Option<reqwest::Client>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    index: BulkItemIndex,
}

#[derive(Debug, Deserialize)]
struct BulkItemIndex {
    #[serde(default)]
    status: u16,
    error: Option<BulkItemError>,
}

#[derive(Debug, Deserialize)]
struct BulkItemError {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    reason: String,
}

impl HttpDispatcher {
    pub fn new(host: &str, index: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            index: index.to_string(),
            client: None,
        }
    }

    fn bulk_payload(batch: &[Record]) -> Result<String, DispatchError> {
        let mut body = String::new();
        for record in batch {
            let doc = serde_json::to_string(record).map_err(|e| {
                DispatchError::Encode(format!("record at offset {}: {e}", record.offset))
            })?;
            body.push_str(&format!("{{\"index\":{{\"_id\":\"{}\"}}}}\n", Uuid::new_v4()));
            body.push_str(&doc);
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn setup(&mut self) -> Result<(), DispatchError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DispatchError::Setup(e.to_string()))?;
        self.client = Some(client);
        info!(host = %self.host, index = %self.index, "dispatcher ready");
        Ok(())
    }

    async fn send(&self, batch: &[Record]) -> Result<Ack, DispatchError> {
        let last = batch.last().ok_or(DispatchError::EmptyBatch)?;
        let client = self.client.as_ref().ok_or(DispatchError::NotReady)?;

        let body = Self::bulk_payload(batch)?;
        let start = Instant::now();

        let response = client
            .post(format!("{}/{}/_bulk", self.host, self.index))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let mut has_error = false;
        let mut indexed = 0usize;
        let mut failed = 0usize;

        if response.status().is_success() {
            match response.json::<BulkResponse>().await {
                Ok(bulk) => {
                    has_error = bulk.errors;
                    for item in &bulk.items {
                        if item.index.status > 201 {
                            failed += 1;
                            if let Some(err) = &item.index.error {
                                error!(
                                    status = item.index.status,
                                    kind = %err.kind,
                                    reason = %err.reason,
                                    "index item failed"
                                );
                            }
                        } else {
                            indexed += 1;
                        }
                    }
                    if failed > 0 {
                        has_error = true;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse bulk response body");
                }
            }
        } else {
            has_error = true;
            failed = batch.len();
            error!(
                status = response.status().as_u16(),
                offset = last.offset,
                "bulk request rejected"
            );
        }

        let elapsed = start.elapsed();
        info!(
            indexed,
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "indexed batch"
        );

        Ok(Ack::new(last.clone(), has_error))
    }
}
