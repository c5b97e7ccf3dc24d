//! Bounded admission for outstanding queries.
//!
//! Operations are queued as factories and only invoked once a slot is free,
//! so at most `max_parallel_queries` of them are ever in flight. Priority
//! items jump ahead of everything already pending.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, warn};

pub const DEFAULT_MAX_PARALLEL_QUERIES: usize = 4;

/// Progress of one queued operation, delivered in order: `Started` once it is
/// admitted, then exactly one of `Resolved` or `Rejected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent<T, E> {
    Started,
    Resolved(T),
    Rejected(E),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkError<E> {
    #[error("queued operation failed: {0}")]
    Rejected(E),
    #[error("queued operation was removed or dropped before it finished")]
    Abandoned,
}

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;
type Launch = Box<dyn FnOnce() -> Job + Send>;

struct PendingItem {
    id: u64,
    priority: bool,
    launch: Launch,
}

struct QueueState {
    max_parallel: usize,
    running: usize,
    pending: VecDeque<PendingItem>,
}

struct Shared {
    state: Mutex<QueueState>,
    next_id: AtomicU64,
    handle: Handle,
}

#[derive(Clone)]
pub struct WorkQueue {
    shared: Arc<Shared>,
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("WorkQueue")
            .field("max_parallel", &state.max_parallel)
            .field("running", &state.running)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl WorkQueue {
    /// Creates a queue on the current tokio runtime.
    pub fn new(max_parallel_queries: usize) -> Result<Self> {
        let handle = Handle::try_current().map_err(|err| {
            Error::Config(format!("work queue requires a tokio runtime: {err}"))
        })?;
        Ok(Self::with_handle(max_parallel_queries, handle))
    }

    pub fn with_handle(max_parallel_queries: usize, handle: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    max_parallel: max_parallel_queries.max(1),
                    running: 0,
                    pending: VecDeque::new(),
                }),
                next_id: AtomicU64::new(1),
                handle,
            }),
        }
    }

    /// Queues `factory`. Admission is scheduled on the runtime rather than
    /// attempted here, so the factory never runs before this returns.
    pub fn enqueue<F, Fut, T, E>(&self, factory: F, priority: bool) -> QueuedWork<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (events, receiver) = mpsc::unbounded_channel();

        let launch: Launch = Box::new(move || {
            let operation = factory();
            let _ = events.send(QueueEvent::Started);
            Box::pin(async move {
                let event = match operation.await {
                    Ok(value) => QueueEvent::Resolved(value),
                    Err(err) => QueueEvent::Rejected(err),
                };
                let _ = events.send(event);
            })
        });

        {
            let mut state = self.shared.state.lock();
            let item = PendingItem {
                id,
                priority,
                launch,
            };
            if priority {
                state.pending.push_front(item);
            } else {
                state.pending.push_back(item);
            }
        }

        let shared = Arc::clone(&self.shared);
        self.shared.handle.spawn(async move { admit(&shared) });

        QueuedWork {
            id,
            events: receiver,
        }
    }

    /// Changes the ceiling (never below one) and admits whatever now fits.
    pub fn set_max_parallel_queries(&self, max_parallel_queries: usize) {
        self.shared.state.lock().max_parallel = max_parallel_queries.max(1);
        admit(&self.shared);
    }

    pub fn max_parallel_queries(&self) -> usize {
        self.shared.state.lock().max_parallel
    }

    /// True when nothing is pending and nothing is running.
    pub fn is_empty(&self) -> bool {
        let state = self.shared.state.lock();
        state.pending.is_empty() && state.running == 0
    }

    pub fn running_count(&self) -> usize {
        self.shared.state.lock().running
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Drops a not-yet-admitted item. Its handle then reports
    /// [`WorkError::Abandoned`]. Admitted items always run to completion.
    pub fn remove_pending(&self, id: u64) -> bool {
        let removed = {
            let mut state = self.shared.state.lock();
            state
                .pending
                .iter()
                .position(|item| item.id == id)
                .and_then(|index| state.pending.remove(index))
        };

        match removed {
            Some(item) => {
                debug!(id = item.id, priority = item.priority, "removed pending operation");
                true
            }
            None => false,
        }
    }
}

/// Starts pending items while there is capacity. Slots are claimed under the
/// lock; factories run after it is released.
fn admit(shared: &Arc<Shared>) {
    let admitted: Vec<PendingItem> = {
        let mut state = shared.state.lock();
        let mut admitted = Vec::new();
        while state.running < state.max_parallel {
            let Some(item) = state.pending.pop_front() else {
                break;
            };
            state.running += 1;
            admitted.push(item);
        }
        admitted
    };

    // Every claimed slot gets an owner before any factory runs, so a factory
    // that panics cannot strand the capacity claimed for the rest.
    let admitted: Vec<(PendingItem, RunningSlot)> = admitted
        .into_iter()
        .map(|item| {
            let slot = RunningSlot {
                id: item.id,
                shared: Arc::clone(shared),
            };
            (item, slot)
        })
        .collect();

    for (item, slot) in admitted {
        debug!(id = item.id, priority = item.priority, "admitting queued operation");
        match panic::catch_unwind(AssertUnwindSafe(item.launch)) {
            Ok(job) => {
                shared.handle.spawn(async move {
                    let _slot = slot;
                    job.await;
                });
            }
            Err(_) => {
                warn!(id = item.id, "queued operation factory panicked");
                drop(slot);
            }
        }
    }
}

/// Holds one running slot; releasing it admits the next pending item.
struct RunningSlot {
    id: u64,
    shared: Arc<Shared>,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.running = state.running.saturating_sub(1);
        }
        debug!(id = self.id, "queued operation finished");
        admit(&self.shared);
    }
}

/// Handle to one queued operation.
#[derive(Debug)]
pub struct QueuedWork<T, E> {
    id: u64,
    events: mpsc::UnboundedReceiver<QueueEvent<T, E>>,
}

impl<T, E> QueuedWork<T, E> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next event; `None` once the operation is finished or
    /// abandoned.
    pub async fn next_event(&mut self) -> Option<QueueEvent<T, E>> {
        self.events.recv().await
    }

    pub fn try_event(&mut self) -> Option<QueueEvent<T, E>> {
        self.events.try_recv().ok()
    }

    /// Waits for the operation's result, skipping `Started`.
    pub async fn outcome(mut self) -> std::result::Result<T, WorkError<E>> {
        while let Some(event) = self.events.recv().await {
            match event {
                QueueEvent::Started => continue,
                QueueEvent::Resolved(value) => return Ok(value),
                QueueEvent::Rejected(err) => return Err(WorkError::Rejected(err)),
            }
        }
        Err(WorkError::Abandoned)
    }
}
