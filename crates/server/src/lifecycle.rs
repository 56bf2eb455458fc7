// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process lifecycle: wiring, startup, and ordered shutdown.
//!
//! Construction order follows the dependency graph leaves-first: pool →
//! stores → event bus → dispatcher → leader-gated workers → HTTP surface.
//! Teardown runs the other way: HTTP drains first, then the leader (which
//! stops scheduler, evaluator, and reaper), then the dispatcher refuses
//! new submits, then the bus, then the pool.

use crate::branches::{BranchCatalog, HttpBranchCatalog, NullBranchCatalog};
use crate::config::Config;
use crate::dispatch::{CompletionHook, Dispatcher, RoundRobinDispatcher, WarmPoolDispatcher};
use crate::evaluator::Evaluator;
use crate::event_bus::EventBus;
use crate::http::{self, AppState, RateLimiter};
use crate::leader::{LeaderElector, LockProvider, PgLockProvider, WorkerHandle, WorkerSet};
use crate::object_store::{NullObjectStore, ObjectStore, S3ObjectStore};
use crate::reaper::Reaper;
use crate::scheduler::Scheduler;
use crate::worker::{HttpWorkerClient, WorkerClient, WorkerError};
use async_trait::async_trait;
use axum::http::HeaderValue;
use axum::Router;
use smelt_core::{RunCompleted, SystemClock, RUN_COMPLETED_CHANNEL};
use smelt_storage::{
    AuditStore, LandingZoneStore, PgAuditStore, PgLandingZoneStore, PgPipelineStore,
    PgReaperStatusStore, PgRunStore, PgScheduleStore, PgSettingsStore, PgTriggerStore,
    PipelineStore, ReaperStatusStore, RunStore, ScheduleStore, SettingsStore, StoreError,
    TriggerStore, LEADER_LOCK_KEY,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store initialization failed: {0}")]
    Store(#[from] StoreError),

    #[error("worker transport initialization failed: {0}")]
    Worker(#[from] WorkerError),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: std::net::SocketAddr, source: std::io::Error },

    #[error("TLS setup failed: {0}")]
    Tls(std::io::Error),

    #[error("HTTP server error: {0}")]
    Serve(std::io::Error),
}

/// Buffer between event sources and the evaluator.
const EVENT_BUFFER: usize = 64;

/// Background workers the leader starts: scheduler, evaluator (with its
/// event feeds), and reaper.
struct BackgroundWorkers {
    schedules: Arc<dyn ScheduleStore>,
    runs: Arc<dyn RunStore>,
    pipelines: Arc<dyn PipelineStore>,
    zones: Arc<dyn LandingZoneStore>,
    audit: Arc<dyn AuditStore>,
    settings: Arc<dyn SettingsStore>,
    reaper_status: Arc<dyn ReaperStatusStore>,
    objects: Arc<dyn ObjectStore>,
    branches: Arc<dyn BranchCatalog>,
    dispatcher: Arc<dyn Dispatcher>,
    evaluator: Arc<Evaluator<SystemClock>>,
    bus: EventBus,
    completions: broadcast::Sender<RunCompleted>,
    clock: SystemClock,
}

#[async_trait]
impl WorkerSet for BackgroundWorkers {
    async fn start(&self) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let scheduler = Scheduler::new(
            Arc::clone(&self.schedules),
            Arc::clone(&self.runs),
            Arc::clone(&self.pipelines),
            Arc::clone(&self.dispatcher),
            self.clock.clone(),
        );
        tasks.push(tokio::spawn(scheduler.run(cancel.clone())));

        // Evaluator event feeds: the cross-replica bus subscription plus
        // the local completion hook. Both are at-most-once hints.
        let (events_tx, events_rx) = mpsc::channel::<RunCompleted>(EVENT_BUFFER);

        let (bus_rx, bus_subscription) = self.bus.subscribe(RUN_COMPLETED_CHANNEL);
        let bus_forwarder = events_tx.clone();
        let bus_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let _subscription = bus_subscription;
            let mut bus_rx = bus_rx;
            loop {
                tokio::select! {
                    _ = bus_cancel.cancelled() => return,
                    payload = bus_rx.recv() => match payload {
                        Some(payload) => match RunCompleted::decode(&payload) {
                            Ok(event) => {
                                let _ = bus_forwarder.try_send(event);
                            }
                            Err(error) => {
                                tracing::warn!(%error, "discarding malformed run_completed payload");
                            }
                        },
                        None => return,
                    }
                }
            }
        }));

        let mut hook_rx = self.completions.subscribe();
        let hook_forwarder = events_tx;
        let hook_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = hook_cancel.cancelled() => return,
                    event = hook_rx.recv() => match event {
                        Ok(event) => {
                            let _ = hook_forwarder.try_send(event);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "completion hook feed lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }));

        tasks.push(tokio::spawn(
            Arc::clone(&self.evaluator).run(cancel.clone(), events_rx),
        ));

        let reaper = Reaper::new(
            Arc::clone(&self.runs),
            Arc::clone(&self.pipelines),
            Arc::clone(&self.zones),
            Arc::clone(&self.audit),
            Arc::clone(&self.settings),
            Arc::clone(&self.reaper_status),
            Arc::clone(&self.objects),
            Arc::clone(&self.branches),
            self.clock.clone(),
        );
        tasks.push(tokio::spawn(reaper.run(cancel.clone())));

        WorkerHandle::new(cancel, tasks)
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }
    let parsed: Vec<HeaderValue> =
        origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()).collect();
    Some(layer.allow_origin(parsed))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn serve(
    config: &Config,
    router: Router,
    cancel: CancellationToken,
) -> Result<(), StartupError> {
    let addr = config.listen_addr;
    match &config.tls {
        Some(tls) => {
            let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &tls.cert_file,
                &tls.key_file,
            )
            .await
            .map_err(StartupError::Tls)?;
            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
            });
            tracing::info!(%addr, "HTTPS surface listening");
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(router.into_make_service())
                .await
                .map_err(StartupError::Serve)
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|source| StartupError::Bind { addr, source })?;
            tracing::info!(%addr, "HTTP surface listening");
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
                .map_err(StartupError::Serve)
        }
    }
}

/// Run the control plane until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<(), StartupError> {
    let Some(database_url) = config.database_url.clone() else {
        tracing::info!("no DATABASE_URL; running stateless (health only)");
        let cancel = CancellationToken::new();
        let server = serve(&config, http::stateless_router(), cancel.clone());
        tokio::pin!(server);
        tokio::select! {
            result = &mut server => return result,
            _ = shutdown_signal() => {
                cancel.cancel();
                return server.await;
            }
        }
    };

    let clock = SystemClock;
    let pool = smelt_storage::connect(&database_url).await?;
    smelt_storage::run_migrations(&pool).await?;

    let runs: Arc<dyn RunStore> = Arc::new(PgRunStore::new(pool.clone()));
    let pipelines: Arc<dyn PipelineStore> = Arc::new(PgPipelineStore::new(pool.clone()));
    let schedules: Arc<dyn ScheduleStore> = Arc::new(PgScheduleStore::new(pool.clone()));
    let triggers: Arc<dyn TriggerStore> = Arc::new(PgTriggerStore::new(pool.clone()));
    let settings: Arc<dyn SettingsStore> = Arc::new(PgSettingsStore::new(pool.clone()));
    let audit: Arc<dyn AuditStore> = Arc::new(PgAuditStore::new(pool.clone()));
    let zones: Arc<dyn LandingZoneStore> = Arc::new(PgLandingZoneStore::new(pool.clone()));
    let reaper_status: Arc<dyn ReaperStatusStore> =
        Arc::new(PgReaperStatusStore::new(pool.clone()));

    let objects: Arc<dyn ObjectStore> = match &config.s3 {
        Some(s3) => Arc::new(S3ObjectStore::new(s3)),
        None => Arc::new(NullObjectStore),
    };
    let branches: Arc<dyn BranchCatalog> = match &config.branch_catalog_url {
        Some(url) => Arc::new(HttpBranchCatalog::new(url)),
        None => Arc::new(NullBranchCatalog),
    };

    // Worker transports and the dispatcher. Capacity is advertised at
    // connect time; more than one worker enables round-robin.
    let mut members = Vec::new();
    for addr in &config.worker_addrs {
        let client = HttpWorkerClient::connect(addr, config.worker_tls.as_ref()).await?;
        tracing::info!(endpoint = %addr, capacity = client.capacity(), "worker connected");
        members.push(Arc::new(WarmPoolDispatcher::new(
            Arc::new(client) as Arc<dyn WorkerClient>,
            Arc::clone(&runs),
            clock.clone(),
        )));
    }
    let (completions_tx, _) = broadcast::channel::<RunCompleted>(EVENT_BUFFER);
    let hook: CompletionHook = {
        let tx = completions_tx.clone();
        Arc::new(move |run| {
            let _ = tx.send(RunCompleted {
                run_id: run.id,
                pipeline_id: run.pipeline_id,
                status: run.status,
            });
        })
    };
    for member in &members {
        member.set_completion_hook(hook.clone());
    }
    let dispatcher: Arc<dyn Dispatcher> = match members.len() {
        1 => members.remove(0),
        _ => Arc::new(RoundRobinDispatcher::new(members)),
    };

    let bus = EventBus::new(pool.clone(), &[RUN_COMPLETED_CHANNEL]);
    let bus_cancel = CancellationToken::new();
    let bus_task = tokio::spawn(bus.clone().run(bus_cancel.clone()));

    let evaluator = Arc::new(Evaluator::new(
        Arc::clone(&triggers),
        Arc::clone(&runs),
        Arc::clone(&pipelines),
        Arc::clone(&dispatcher),
        clock.clone(),
    ));

    // Leader-gated background work; SCHEDULER_ENABLED=false keeps this
    // replica a permanent follower.
    let leader_cancel = CancellationToken::new();
    let leader_task = if config.scheduler_enabled {
        let workers = BackgroundWorkers {
            schedules,
            runs: Arc::clone(&runs),
            pipelines: Arc::clone(&pipelines),
            zones,
            audit: Arc::clone(&audit),
            settings,
            reaper_status,
            objects,
            branches,
            dispatcher: Arc::clone(&dispatcher),
            evaluator: Arc::clone(&evaluator),
            bus: bus.clone(),
            completions: completions_tx,
            clock: clock.clone(),
        };
        let lock: Arc<dyn LockProvider> =
            Arc::new(PgLockProvider::new(&database_url, LEADER_LOCK_KEY));
        let elector = LeaderElector::new(lock, Arc::new(workers));
        Some(tokio::spawn(elector.run(leader_cancel.clone())))
    } else {
        tracing::info!("background workers disabled on this replica");
        None
    };

    let state = AppState {
        runs,
        pipelines,
        triggers,
        audit,
        dispatcher: Arc::clone(&dispatcher),
        evaluator,
        clock: clock.clone(),
        api_key: config.api_key.clone(),
        limiter: (config.rate_limit > 0)
            .then(|| Arc::new(RateLimiter::new(config.rate_limit, clock.clone()))),
        query_addr: config.query_addr.clone(),
    };
    let mut router = http::router(state);
    if let Some(cors) = cors_layer(&config.cors_origins) {
        router = router.layer(cors);
    }

    let http_cancel = CancellationToken::new();
    let server = serve(&config, router, http_cancel.clone());
    tokio::pin!(server);

    let result = tokio::select! {
        result = &mut server => result,
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            // 1. Drain the HTTP surface.
            http_cancel.cancel();
            let result = server.await;
            // 2. Stop the leader (scheduler, evaluator, reaper).
            leader_cancel.cancel();
            if let Some(task) = leader_task {
                let _ = task.await;
            }
            // 3. Refuse new submissions.
            dispatcher.drain();
            // 4. Stop the event bus.
            bus_cancel.cancel();
            let _ = bus_task.await;
            // 5. Close the pool.
            pool.close().await;
            tracing::info!("shutdown complete");
            return result;
        }
    };

    // Server ended on its own (bind failure or fatal serve error).
    leader_cancel.cancel();
    bus_cancel.cancel();
    pool.close().await;
    result
}
