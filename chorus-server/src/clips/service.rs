//! Batch clip service
//!
//! **Algorithm:**
//! 1. Compute each request's cache key; hits are answered immediately
//! 2. Identical keys within one batch are rendered once
//! 3. Misses run in parallel on a dedicated rayon pool
//! 4. Successful renders go into the cache
//! 5. Results are reassembled in request order
//!
//! A failed (or panicking) render yields an error entry at its index and
//! never affects the rest of the batch. The batch call returns only after
//! every miss has finished.

use super::cache::{CacheStats, ClipCache};
use super::error::RenderError;
use super::model::{ClipPayload, ClipRequest, ClipResult};
use super::renderer::ClipRenderer;
use chorus_common::{Error, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Default render pool size: a small multiple of the CPU count
pub fn default_worker_threads() -> usize {
    (num_cpus::get() * 2).max(1)
}

pub struct ClipService {
    cache: ClipCache,
    renderer: Arc<dyn ClipRenderer>,
    pool: ThreadPool,
    worker_threads: usize,
}

/// A miss to render, with every batch index that asked for it
struct PendingRender {
    key: String,
    indices: Vec<usize>,
}

impl ClipService {
    pub fn new(
        renderer: Arc<dyn ClipRenderer>,
        cache_capacity: usize,
        worker_threads: usize,
    ) -> Result<Self> {
        let worker_threads = worker_threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("clip-render-{}", i))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build render pool: {}", e)))?;

        info!(worker_threads, cache_capacity, "Clip service initialised");

        Ok(Self {
            cache: ClipCache::new(cache_capacity),
            renderer,
            pool,
            worker_threads,
        })
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) -> usize {
        let cleared = self.cache.clear();
        info!(cleared, "Clip cache cleared");
        cleared
    }

    fn render_guarded(&self, request: &ClipRequest) -> std::result::Result<ClipPayload, RenderError> {
        match catch_unwind(AssertUnwindSafe(|| self.renderer.render(request))) {
            Ok(result) => result,
            Err(_) => Err(RenderError::Internal(format!(
                "Renderer panicked on {}",
                request.file_path.display()
            ))),
        }
    }

    /// Render one clip through the cache. Returns the payload and whether it was a hit.
    pub fn render(
        &self,
        request: &ClipRequest,
    ) -> std::result::Result<(Arc<ClipPayload>, bool), RenderError> {
        let key = request.cache_key();
        if let Some(payload) = self.cache.get(&key) {
            return Ok((payload, true));
        }

        let payload = Arc::new(self.pool.install(|| self.render_guarded(request))?);
        self.cache.insert(key, Arc::clone(&payload));
        Ok((payload, false))
    }

    /// Render a batch; `result[i]` always answers `requests[i]`
    pub fn render_batch(&self, requests: &[ClipRequest]) -> Vec<ClipResult> {
        let started = Instant::now();
        let mut results: Vec<Option<ClipResult>> = vec![None; requests.len()];
        let mut pending: Vec<PendingRender> = Vec::new();
        let mut pending_by_key: HashMap<String, usize> = HashMap::new();
        let mut hits = 0usize;

        for (index, request) in requests.iter().enumerate() {
            let key = request.cache_key();
            if let Some(&slot) = pending_by_key.get(&key) {
                pending[slot].indices.push(index);
                continue;
            }
            if let Some(payload) = self.cache.get(&key) {
                results[index] = Some(ClipResult::success(
                    request.clip_id.clone(),
                    (*payload).clone(),
                    true,
                ));
                hits += 1;
                continue;
            }
            pending_by_key.insert(key.clone(), pending.len());
            pending.push(PendingRender {
                key,
                indices: vec![index],
            });
        }

        let rendered: Vec<std::result::Result<ClipPayload, RenderError>> = self.pool.install(|| {
            pending
                .par_iter()
                .map(|p| self.render_guarded(&requests[p.indices[0]]))
                .collect()
        });

        let mut failed = 0usize;
        for (p, outcome) in pending.into_iter().zip(rendered) {
            match outcome {
                Ok(payload) => {
                    let payload = Arc::new(payload);
                    self.cache.insert(p.key, Arc::clone(&payload));
                    for index in p.indices {
                        results[index] = Some(ClipResult::success(
                            requests[index].clip_id.clone(),
                            (*payload).clone(),
                            false,
                        ));
                    }
                }
                Err(e) => {
                    warn!(
                        file = %requests[p.indices[0]].file_path.display(),
                        error = %e,
                        "Clip render failed"
                    );
                    for index in p.indices {
                        failed += 1;
                        results[index] = Some(ClipResult::error(requests[index].clip_id.clone(), &e));
                    }
                }
            }
        }

        info!(
            total = requests.len(),
            cache_hits = hits,
            rendered = pending_by_key.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Clip batch complete"
        );

        results
            .into_iter()
            .zip(requests)
            .map(|(result, request)| {
                result.unwrap_or_else(|| {
                    ClipResult::error(
                        request.clip_id.clone(),
                        &RenderError::Internal("Clip was not rendered".to_string()),
                    )
                })
            })
            .collect()
    }

    /// Run [`render_batch`](Self::render_batch) off the async runtime
    pub async fn render_batch_async(self: &Arc<Self>, requests: Vec<ClipRequest>) -> Vec<ClipResult> {
        let service = Arc::clone(self);
        let ids: Vec<String> = requests.iter().map(|r| r.clip_id.clone()).collect();

        match tokio::task::spawn_blocking(move || service.render_batch(&requests)).await {
            Ok(results) => results,
            Err(e) => {
                let error = RenderError::Internal(format!("Render task failed: {}", e));
                ids.into_iter().map(|id| ClipResult::error(id, &error)).collect()
            }
        }
    }

    /// Run [`render`](Self::render) off the async runtime
    pub async fn render_async(
        self: &Arc<Self>,
        request: ClipRequest,
    ) -> std::result::Result<(Arc<ClipPayload>, bool), RenderError> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.render(&request))
            .await
            .map_err(|e| RenderError::Internal(format!("Render task failed: {}", e)))?
    }
}
