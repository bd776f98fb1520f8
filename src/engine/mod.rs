mod availability;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod pricing;
mod queries;
mod validate;

pub use availability::{available_cars, reserved_car_ids};
pub use error::{EngineError, ErrorKind};
pub use lifecycle::can_transition;
pub use pricing::{billable_days, total_price};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedCarState = Arc<RwLock<CarState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Blocks for one append, drains whatever else is already
/// queued, then commits the whole batch with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

/// All-or-nothing: a batch that fails partway is cut back off the log, so
/// later batches never sit behind a broken frame.
fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let result = wal.mark().and_then(|mark| {
        let written = batch
            .iter()
            .try_for_each(|(event, _)| wal.append_buffered(event))
            .and_then(|()| wal.flush_sync());
        if let Err(e) = &written
            && let Err(rollback) = wal.rollback(mark)
        {
            tracing::error!("WAL rollback after failed commit ({e}) also failed: {rollback}");
        }
        written
    });

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL commit of {} events failed: {e}", batch.len());
    }

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// The car/reservation store. Each car's state sits behind its own lock, so
/// the check-then-write sequence of a booking is serialized per car.
///
/// The maps are shared with commit tasks (see [`Engine::commit`]), which
/// finish applying an event even if the request that started it is dropped.
pub struct Engine {
    pub(super) cars: Arc<DashMap<Ulid, SharedCarState>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → car id, for cars that still exist.
    pub(super) reservation_to_car: Arc<DashMap<Ulid, Ulid>>,
    /// Reservations whose car was deleted. Read-only history.
    pub(super) detached: Arc<DashMap<Ulid, Reservation>>,
    /// Keyed by lowercased email.
    pub(super) admins: Arc<DashMap<String, Admin>>,
    pub(super) admin_lock: Arc<Mutex<()>>,
    /// Mutations hold this shared; compaction holds it exclusively so no
    /// commit lands between the snapshot and the log swap.
    pub(super) compaction_gate: Arc<RwLock<()>>,
}

pub(super) type CarGuard = OwnedRwLockWriteGuard<CarState>;
pub(super) type GateGuard = OwnedRwLockReadGuard<()>;

/// Apply a per-car event to a CarState (caller holds the lock).
fn apply_to_car(cs: &mut CarState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::CarUpdated { car } => cs.car = car.clone(),
        Event::ReservationCreated { reservation } => {
            index.insert(reservation.id, reservation.car_id);
            cs.insert_reservation(reservation.clone());
        }
        Event::ReservationStatusChanged { id, status, at, .. } => {
            if let Some(r) = cs.reservation_mut(*id) {
                r.status = *status;
                r.updated_at = *at;
            }
        }
        // Map-level events, handled by the caller.
        Event::CarCreated { .. } | Event::CarDeleted { .. } | Event::AdminRegistered { .. } => {}
    }
}

pub(crate) fn admin_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// State rebuilt from a WAL, before it is wrapped in locks.
#[derive(Default)]
struct Replayed {
    cars: HashMap<Ulid, CarState>,
    detached: HashMap<Ulid, Reservation>,
    admins: HashMap<String, Admin>,
}

impl Replayed {
    fn apply(&mut self, event: &Event, index: &DashMap<Ulid, Ulid>) {
        match event {
            Event::CarCreated { car } => {
                self.cars.insert(car.id, CarState::new(car.clone()));
            }
            Event::CarDeleted { id } => {
                if let Some(cs) = self.cars.remove(id) {
                    for r in cs.reservations {
                        index.remove(&r.id);
                        self.detached.insert(r.id, r);
                    }
                }
            }
            Event::AdminRegistered { admin } => {
                self.admins.insert(admin_key(&admin.email), admin.clone());
            }
            Event::ReservationCreated { reservation } => {
                match self.cars.get_mut(&reservation.car_id) {
                    Some(cs) => apply_to_car(cs, event, index),
                    None => {
                        self.detached.insert(reservation.id, reservation.clone());
                    }
                }
            }
            Event::ReservationStatusChanged { id, car_id, status, at } => {
                match self.cars.get_mut(car_id) {
                    Some(cs) => apply_to_car(cs, event, index),
                    None => {
                        if let Some(r) = self.detached.get_mut(id) {
                            r.status = *status;
                            r.updated_at = *at;
                        }
                    }
                }
            }
            Event::CarUpdated { car } => {
                if let Some(cs) = self.cars.get_mut(&car.id) {
                    apply_to_car(cs, event, index);
                }
            }
        }
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let reservation_to_car = Arc::new(DashMap::new());
        let mut replayed = Replayed::default();
        for event in &events {
            replayed.apply(event, &reservation_to_car);
        }

        let engine = Self {
            cars: Arc::new(
                replayed
                    .cars
                    .into_iter()
                    .map(|(id, cs)| (id, Arc::new(RwLock::new(cs))))
                    .collect(),
            ),
            wal_tx,
            notify,
            reservation_to_car,
            detached: Arc::new(replayed.detached.into_iter().collect()),
            admins: Arc::new(replayed.admins.into_iter().collect()),
            admin_lock: Arc::new(Mutex::new(())),
            compaction_gate: Arc::new(RwLock::new(())),
        };
        tracing::info!(
            "replayed {} events: {} cars, {} reservations, {} admins",
            events.len(),
            engine.cars.len(),
            engine.reservation_to_car.len() + engine.detached.len(),
            engine.admins.len()
        );
        metrics::gauge!(crate::observability::CARS_TOTAL).set(engine.cars.len() as f64);
        Ok(engine)
    }

    /// Log `event`, then run `apply` with the locks in `held`, then publish.
    ///
    /// This runs on its own task: once the event is handed to the WAL writer
    /// it will be applied in memory too, even if the caller goes away.
    pub(super) async fn commit<H, T>(
        &self,
        event: Event,
        held: H,
        apply: impl FnOnce(H) -> T + Send + 'static,
    ) -> Result<T, EngineError>
    where
        H: Send + 'static,
        T: Send + 'static,
    {
        let wal_tx = self.wal_tx.clone();
        let notify = self.notify.clone();
        let task = tokio::spawn(async move {
            wal_append(&wal_tx, &event).await?;
            let out = apply(held);
            notify.send(&event);
            Ok(out)
        });
        task.await
            .map_err(|e| EngineError::Internal(format!("commit task failed: {e}")))?
    }

    pub fn get_car_state(&self, id: &Ulid) -> Option<SharedCarState> {
        self.cars.get(id).map(|e| e.value().clone())
    }

    pub fn get_car_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_car.get(reservation_id).map(|e| *e.value())
    }

    /// Commit a per-car event. Hands the car lock back once it is applied.
    pub(super) async fn persist_and_apply(
        &self,
        gate: GateGuard,
        guard: CarGuard,
        event: Event,
    ) -> Result<CarGuard, EngineError> {
        let index = self.reservation_to_car.clone();
        let applied = event.clone();
        self.commit(event, (gate, guard), move |(gate, mut guard)| {
            apply_to_car(&mut guard, &applied, &index);
            drop(gate);
            guard
        })
        .await
    }

    /// Shared hold on the compaction gate, owned so a commit task can keep it.
    pub(super) async fn enter_gate(&self) -> GateGuard {
        self.compaction_gate.clone().read_owned().await
    }

    /// Write-lock a car, failing if it was deleted while we waited for the lock.
    pub(super) async fn lock_car(&self, id: Ulid) -> Result<CarGuard, EngineError> {
        let rs = self.get_car_state(&id).ok_or(EngineError::CarNotFound(id))?;
        let guard = rs.write_owned().await;
        if !self.cars.contains_key(&id) {
            return Err(EngineError::CarNotFound(id));
        }
        Ok(guard)
    }
}

/// Send one event to the group-commit writer and wait for its fsync.
async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::WalError(e.to_string()))
}
