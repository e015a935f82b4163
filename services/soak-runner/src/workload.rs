//! Perpetual workload loops and their fan-out orchestration.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use store_client::StoreOps;

use crate::config::SoakConfig;
use crate::contention::{self, LOCK_NAMES};
use crate::keyspace::KeySpace;
use crate::metrics::{MetricsHandle, OpKind};

/// Collection key used by the flat set-membership loops.
const FLAT_SET_KEY: &str = "value";
/// Warm-up progress is logged once per this many writes.
const WARMUP_LOG_EVERY: usize = 10_000;

fn bucket_collection(index: usize) -> String {
    format!("keys_{}", index)
}

/// Await every workload handle, logging any task that panicked or was
/// aborted.
pub async fn drain_loops(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "workload task failed");
        }
    }
}

/// Owns the key space, payload, and store handle every loop shares.
///
/// `spawn_loops` launches the perpetual tasks; the `*_once` methods run a
/// single pass of the set-membership workloads and back both the loops and
/// the test suite.
pub struct WorkloadSuite<S> {
    store: Arc<S>,
    keyspace: KeySpace,
    payload: Arc<str>,
    config: SoakConfig,
    metrics: MetricsHandle,
}

impl<S: StoreOps + 'static> WorkloadSuite<S> {
    pub fn new(store: Arc<S>, keyspace: KeySpace, config: SoakConfig, metrics: MetricsHandle) -> Self {
        let payload = config.payload();
        Self {
            store,
            keyspace,
            payload,
            config,
            metrics,
        }
    }

    /// Write every key once with bounded parallelism.
    ///
    /// Establishes the known initial state before any loop starts; a failed
    /// write here aborts startup instead of soaking against missing keys.
    pub async fn warm_up(&self) -> Result<()> {
        let total = self.keyspace.len();
        let started = Instant::now();
        info!(
            keys = total,
            fanout = self.config.warmup_fanout,
            "starting warm-up write pass"
        );

        let mut results = stream::iter(self.keyspace.keys())
            .map(|key| {
                let store = self.store.clone();
                let payload = self.payload.clone();
                async move {
                    store
                        .set(key, &payload, None)
                        .await
                        .map_err(|e| (key.clone(), e))
                }
            })
            .buffer_unordered(self.config.warmup_fanout);

        let mut completed = 0usize;
        let mut failures = 0usize;
        while let Some(result) = results.next().await {
            completed += 1;
            if let Err((key, e)) = result {
                warn!(key = %key, error = %e, "warm-up write failed");
                failures += 1;
            }
            if completed % WARMUP_LOG_EVERY == 0 {
                info!(
                    progress = format!("{}/{}", completed, total),
                    "warm-up progress"
                );
            }
        }

        if failures > 0 {
            anyhow::bail!("warm-up failed for {} of {} keys", failures, total);
        }
        info!(
            keys = total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "warm-up complete"
        );
        Ok(())
    }

    /// Launch every perpetual loop and return their join handles.
    ///
    /// Per thread group: a random-write loop, a random-read loop, the
    /// set-membership pair (flat or bucketed, per configuration), and one
    /// contention loop per lock name. Loops run until the shutdown channel
    /// fires, then drain at the next iteration boundary.
    pub fn spawn_loops(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for _ in 0..self.config.thread_groups {
            handles.push(tokio::spawn(Arc::clone(self).set_loop(shutdown.subscribe())));
            handles.push(tokio::spawn(Arc::clone(self).get_loop(shutdown.subscribe())));
            if self.config.use_buckets {
                handles.push(tokio::spawn(
                    Arc::clone(self).bucketed_add_loop(shutdown.subscribe()),
                ));
                handles.push(tokio::spawn(
                    Arc::clone(self).bucketed_find_loop(shutdown.subscribe()),
                ));
            } else {
                handles.push(tokio::spawn(
                    Arc::clone(self).flat_add_loop(shutdown.subscribe()),
                ));
                handles.push(tokio::spawn(
                    Arc::clone(self).flat_find_loop(shutdown.subscribe()),
                ));
            }
            for name in LOCK_NAMES {
                handles.push(tokio::spawn(contention::lock_loop(
                    self.store.clone(),
                    name,
                    self.config.lock,
                    self.metrics.clone(),
                    shutdown.subscribe(),
                )));
            }
        }
        info!(
            groups = self.config.thread_groups,
            tasks = handles.len(),
            use_buckets = self.config.use_buckets,
            "workload loops launched"
        );
        handles
    }

    /// Overwrite one uniformly random key per iteration, as fast as the
    /// store answers.
    async fn set_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut rng = StdRng::from_entropy();
        loop {
            let Some(key) = self.keyspace.random_key(&mut rng) else {
                break;
            };
            let started = Instant::now();
            let result = tokio::select! {
                _ = shutdown.recv() => break,
                r = self.store.set(key, &self.payload, None) => r,
            };
            match result {
                Ok(()) => {
                    self.metrics
                        .record_success(OpKind::SetKey, key, 1, started.elapsed())
                        .await
                }
                Err(e) => self.metrics.record_error(OpKind::SetKey, key, &e).await,
            }
        }
    }

    /// Read one uniformly random key per iteration. A missing key is still a
    /// successful read.
    async fn get_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut rng = StdRng::from_entropy();
        loop {
            let Some(key) = self.keyspace.random_key(&mut rng) else {
                break;
            };
            let started = Instant::now();
            let result = tokio::select! {
                _ = shutdown.recv() => break,
                r = self.store.get(key) => r,
            };
            match result {
                Ok(_value) => {
                    self.metrics
                        .record_success(OpKind::GetKey, key, 1, started.elapsed())
                        .await
                }
                Err(e) => self.metrics.record_error(OpKind::GetKey, key, &e).await,
            }
        }
    }

    /// One flat add pass: union the entire value sequence into the single
    /// collection.
    pub async fn add_flat_once(&self) {
        let started = Instant::now();
        match self
            .store
            .add_to_set(FLAT_SET_KEY, self.keyspace.values())
            .await
        {
            Ok(()) => {
                self.metrics
                    .record_success(
                        OpKind::AddKeys,
                        FLAT_SET_KEY,
                        self.keyspace.len(),
                        started.elapsed(),
                    )
                    .await
            }
            Err(e) => {
                self.metrics
                    .record_error(OpKind::AddKeys, FLAT_SET_KEY, &e)
                    .await
            }
        }
    }

    /// One flat find pass: read the collection membership, then batch-read
    /// the full key space, timing the two phases separately.
    pub async fn find_flat_once(&self) {
        let started = Instant::now();
        match self.store.set_members(FLAT_SET_KEY).await {
            Ok(members) => {
                self.metrics
                    .record_success(
                        OpKind::FindKeys,
                        FLAT_SET_KEY,
                        members.len(),
                        started.elapsed(),
                    )
                    .await
            }
            Err(e) => {
                self.metrics
                    .record_error(OpKind::FindKeys, FLAT_SET_KEY, &e)
                    .await;
                return;
            }
        }

        let started = Instant::now();
        match self.store.get_many(self.keyspace.keys()).await {
            Ok(values) => {
                self.metrics
                    .record_success(
                        OpKind::GetKeys,
                        FLAT_SET_KEY,
                        values.len(),
                        started.elapsed(),
                    )
                    .await
            }
            Err(e) => {
                self.metrics
                    .record_error(OpKind::GetKeys, FLAT_SET_KEY, &e)
                    .await
            }
        }
    }

    /// One bucketed add pass: one union per complete bucket, fanned out with
    /// the configured width. Returns once every bucket finished.
    pub async fn add_buckets_once(&self) {
        stream::iter(0..self.keyspace.bucket_count())
            .map(|bucket| {
                let collection = bucket_collection(bucket);
                async move {
                    let members = self.keyspace.value_bucket(bucket).unwrap_or(&[]);
                    let started = Instant::now();
                    match self.store.add_to_set(&collection, members).await {
                        Ok(()) => {
                            self.metrics
                                .record_success(
                                    OpKind::AddKeys,
                                    &collection,
                                    members.len(),
                                    started.elapsed(),
                                )
                                .await
                        }
                        Err(e) => {
                            self.metrics
                                .record_error(OpKind::AddKeys, &collection, &e)
                                .await
                        }
                    }
                }
            })
            .buffer_unordered(self.config.bucket_fanout)
            .collect::<Vec<_>>()
            .await;
    }

    /// One bucketed find pass: per bucket, read the collection membership and
    /// then batch-read that bucket's keys, fanned out like the add pass.
    pub async fn find_buckets_once(&self) {
        stream::iter(0..self.keyspace.bucket_count())
            .map(|bucket| {
                let collection = bucket_collection(bucket);
                async move {
                    let started = Instant::now();
                    match self.store.set_members(&collection).await {
                        Ok(members) => {
                            self.metrics
                                .record_success(
                                    OpKind::FindKeys,
                                    &collection,
                                    members.len(),
                                    started.elapsed(),
                                )
                                .await
                        }
                        Err(e) => {
                            self.metrics
                                .record_error(OpKind::FindKeys, &collection, &e)
                                .await;
                            return;
                        }
                    }

                    let keys = self.keyspace.key_bucket(bucket).unwrap_or(&[]);
                    let started = Instant::now();
                    match self.store.get_many(keys).await {
                        Ok(values) => {
                            self.metrics
                                .record_success(
                                    OpKind::GetKeys,
                                    &collection,
                                    values.len(),
                                    started.elapsed(),
                                )
                                .await
                        }
                        Err(e) => {
                            self.metrics
                                .record_error(OpKind::GetKeys, &collection, &e)
                                .await
                        }
                    }
                }
            })
            .buffer_unordered(self.config.bucket_fanout)
            .collect::<Vec<_>>()
            .await;
    }

    async fn flat_add_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.add_flat_once() => {}
            }
        }
    }

    async fn flat_find_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.find_flat_once() => {}
            }
        }
    }

    async fn bucketed_add_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.add_buckets_once() => {}
            }
        }
    }

    async fn bucketed_find_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.find_buckets_once() => {}
            }
        }
    }
}
