//! Background maintenance.
//!
//! A single worker task drains a bounded queue of [`MaintenanceTask`]s:
//! recomputing stored effective permissions after the graph changes, and
//! finishing cascade sweeps that were too large for one transaction.
//!
//! Enqueueing never blocks the caller. When the queue is full the task is
//! dropped with a warning; the next change touching the same user or role
//! schedules it again, and [`Recomputer`] can always be called directly.

use std::{
    collections::BTreeSet,
    hash::{DefaultHasher, Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use rolegate_observe::metrics;
use rolegate_types::{EffectivePermissions, EntityKind, PermissionId, RoleId, UserId};
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{CallContext, Cascade, CoreError, CoreResult, Resolver, SharedStorage};

/// Default bound on queued maintenance tasks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Lock stripes guarding per-user recomputation.
const RECOMPUTE_STRIPES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceTask {
    /// Rewrite one user's effective permissions.
    RecomputeUser(UserId),
    /// Rewrite the effective permissions of every member of a role.
    RecomputeRole(RoleId),
    /// Remove the remaining incident edges of a deleted entity.
    Sweep { kind: EntityKind, id: String },
}

impl MaintenanceTask {
    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceTask::RecomputeUser(_) => "recompute_user",
            MaintenanceTask::RecomputeRole(_) => "recompute_role",
            MaintenanceTask::Sweep { .. } => "sweep",
        }
    }
}

enum Message {
    Task(MaintenanceTask),
    Flush(oneshot::Sender<()>),
}

/// Cheap, cloneable sender side of the maintenance queue.
#[derive(Clone)]
pub struct MaintenanceHandle {
    tx: mpsc::Sender<Message>,
}

impl MaintenanceHandle {
    /// Queue `task` without waiting. Returns `false` if it was dropped.
    pub fn try_enqueue(&self, task: MaintenanceTask) -> bool {
        let name = task.name();
        match self.tx.try_send(Message::Task(task)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(task = name, "Maintenance queue full, dropping task");
                metrics::record_maintenance_dropped(name);
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(task = name, "Maintenance worker stopped, dropping task");
                metrics::record_maintenance_dropped(name);
                false
            },
        }
    }

    /// Wait until every task queued before this call has been processed.
    pub async fn flush(&self) -> CoreResult<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Message::Flush(tx))
            .await
            .map_err(|_| CoreError::Internal("Maintenance worker stopped".to_string()))?;
        rx.await.map_err(|_| CoreError::Internal("Maintenance worker stopped".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Rewrites stored effective-permission records from the live graph.
///
/// Recomputations of the same user are serialized across every clone: the
/// read of the graph and the write of the record happen under one lock, so
/// a recompute that started after a change always lands after any recompute
/// that read the graph before it.
#[derive(Clone)]
pub struct Recomputer {
    storage: SharedStorage,
    resolver: Resolver,
    locks: Arc<[Mutex<()>]>,
}

impl Recomputer {
    pub fn new(storage: SharedStorage, resolver: Resolver) -> Self {
        let locks = (0..RECOMPUTE_STRIPES).map(|_| Mutex::new(())).collect();
        Self { storage, resolver, locks }
    }

    fn lock_for(&self, user_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        &self.locks[(hasher.finish() as usize) % self.locks.len()]
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Recompute and store one user's record.
    ///
    /// A user that no longer exists has its record removed and `None` is
    /// returned.
    pub async fn recompute_user(
        &self,
        ctx: &CallContext,
        user_id: &str,
    ) -> CoreResult<Option<EffectivePermissions>> {
        let _guard = self.lock_for(user_id).lock().await;
        if !self.storage.entities().exists(EntityKind::User, user_id).await? {
            self.storage.effective().delete(user_id).await?;
            debug!(user = user_id, "User gone, cleared effective permissions");
            return Ok(None);
        }

        let permissions: BTreeSet<PermissionId> = self
            .resolver
            .effective_permissions(ctx, user_id)
            .await?
            .into_iter()
            .map(PermissionId::from)
            .collect();
        let record = EffectivePermissions::new(UserId::from(user_id), permissions);
        self.storage.effective().put(&record).await?;

        debug!(user = user_id, count = record.permissions.len(), "Recomputed effective permissions");
        Ok(Some(record))
    }

    /// Recompute every current member of `role_id`.
    ///
    /// A member that fails is logged and skipped. Returns how many members
    /// were recomputed.
    pub async fn recompute_role(&self, ctx: &CallContext, role_id: &str) -> CoreResult<usize> {
        let members = self
            .storage
            .relations()
            .reverse_neighbors(EntityKind::Role, role_id, EntityKind::User)
            .await?;

        let mut done = 0;
        for user_id in &members {
            ctx.check()?;
            match self.recompute_user(ctx, user_id).await {
                Ok(_) => done += 1,
                Err(e @ (CoreError::Cancelled | CoreError::DeadlineExceeded)) => return Err(e),
                Err(e) => {
                    warn!(role = role_id, user = %user_id, error = %e, "Failed to recompute member");
                },
            }
        }
        Ok(done)
    }
}

#[derive(Default)]
struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Owns the background task. Dropping it stops the task the same way
/// [`shutdown`] does, without waiting for the queue to drain.
///
/// [`shutdown`]: MaintenanceWorker::shutdown
pub struct MaintenanceWorker {
    handle: MaintenanceHandle,
    join: JoinHandle<()>,
    stop: oneshot::Sender<()>,
    stats: Arc<WorkerStats>,
}

impl MaintenanceWorker {
    /// Spawn the worker on the current runtime.
    pub fn start(recomputer: Recomputer, cascade: Cascade, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (stop, stop_rx) = oneshot::channel();
        let stats = Arc::new(WorkerStats::default());
        let join = tokio::spawn(run(rx, stop_rx, recomputer, cascade, Arc::clone(&stats)));
        info!(queue_capacity, "Maintenance worker started");
        Self { handle: MaintenanceHandle { tx }, join, stop, stats }
    }

    pub fn handle(&self) -> MaintenanceHandle {
        self.handle.clone()
    }

    pub fn processed(&self) -> u64 {
        self.stats.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    /// Close the queue, finish what is already queued, and wait for the
    /// task to exit. Handles still held elsewhere start dropping tasks.
    pub async fn shutdown(self) {
        let Self { handle, join, stop, stats } = self;
        drop(handle);
        let _ = stop.send(());
        if let Err(e) = join.await {
            error!(error = %e, "Maintenance worker panicked");
        }
        info!(
            processed = stats.processed.load(Ordering::Relaxed),
            failed = stats.failed.load(Ordering::Relaxed),
            "Maintenance worker stopped"
        );
    }
}

async fn run(
    mut rx: mpsc::Receiver<Message>,
    mut stop: oneshot::Receiver<()>,
    recomputer: Recomputer,
    cascade: Cascade,
    stats: Arc<WorkerStats>,
) {
    loop {
        let message = tokio::select! {
            message = rx.recv() => message,
            _ = &mut stop => {
                debug!("Maintenance worker draining queue");
                rx.close();
                while let Some(message) = rx.recv().await {
                    handle_message(message, &recomputer, &cascade, &stats).await;
                }
                return;
            }
        };
        match message {
            Some(message) => handle_message(message, &recomputer, &cascade, &stats).await,
            None => return,
        }
    }
}

async fn handle_message(
    message: Message,
    recomputer: &Recomputer,
    cascade: &Cascade,
    stats: &WorkerStats,
) {
    match message {
        Message::Task(task) => {
            let name = task.name();
            let result = execute(recomputer, cascade, task).await;
            metrics::record_maintenance_task(name, result.is_ok());
            match result {
                Ok(()) => {
                    stats.processed.fetch_add(1, Ordering::Relaxed);
                },
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(task = name, error = %e, "Maintenance task failed");
                },
            }
        },
        Message::Flush(done) => {
            let _ = done.send(());
        },
    }
}

async fn execute(recomputer: &Recomputer, cascade: &Cascade, task: MaintenanceTask) -> CoreResult<()> {
    let ctx = CallContext::new();
    match task {
        MaintenanceTask::RecomputeUser(user_id) => {
            recomputer.recompute_user(&ctx, user_id.as_str()).await?;
        },
        MaintenanceTask::RecomputeRole(role_id) => {
            recomputer.recompute_role(&ctx, role_id.as_str()).await?;
        },
        MaintenanceTask::Sweep { kind, id } => {
            cascade.sweep(recomputer.storage(), kind, &id).await?;
        },
    }
    Ok(())
}
