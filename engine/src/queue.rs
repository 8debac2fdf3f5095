//! Per-document task queue.
//!
//! At most one task per key is registered at a time. Enqueuing a task for an
//! occupied key cancels the displaced task first: its token flips to
//! [`TaskState::Canceled`] and the abort handle returned by its start closure
//! is fired. Cancellation is cooperative. A canceled task may still run to
//! completion, but [`TaskToken::finish_with`] refuses to run its publication.
//!
//! ```text
//! Pending ──start──▶ Running ──finish──▶ Finished
//!    │                  │
//!    └────cancel────────┴──────────────▶ Canceled
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::future::AbortHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Finished,
    Canceled,
}

impl TaskState {
    fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

type FinishHook = Box<dyn FnOnce() + Send>;

struct TaskShared {
    /// Held for the whole publication in `finish_with`, so `cancel` can never
    /// interleave with a publication in progress. Lock order: queue, then state.
    state: Mutex<TaskState>,
    on_finish: Mutex<Option<FinishHook>>,
}

impl TaskShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(TaskState::Pending),
            on_finish: Mutex::new(None),
        }
    }

    fn state(&self) -> TaskState {
        *lock(&self.state)
    }

    fn mark_running(&self) {
        let mut state = lock(&self.state);
        if *state == TaskState::Pending {
            *state = TaskState::Running;
        }
    }

    /// Returns `true` if this call moved the task to `Canceled`.
    fn cancel(&self) -> bool {
        let mut state = lock(&self.state);
        if !state.is_live() {
            return false;
        }
        *state = TaskState::Canceled;
        drop(state);
        // A canceled task never finishes, so its hook is dead weight.
        lock(&self.on_finish).take();
        true
    }

    fn run_finish_hook(&self) {
        let hook = lock(&self.on_finish).take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

/// Cancellation token handed to a task's start closure.
///
/// Owned by exactly one task. Not `Clone`: the closure moves it into whatever
/// future eventually completes the work.
pub struct TaskToken {
    shared: Arc<TaskShared>,
}

impl TaskToken {
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.shared.state() == TaskState::Canceled
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    /// Mark the task finished without publishing anything.
    pub fn finish(self) {
        self.finish_with(|| ());
    }

    /// Run `publish` unless the task was canceled, then mark it finished.
    ///
    /// This is the single cancellation checkpoint: the state check and the
    /// publication happen under the task's state lock, so a concurrent
    /// `cancel` either lands before (and `publish` is skipped) or waits until
    /// the publication is done. `publish` must not cancel its own task.
    pub fn finish_with<T>(self, publish: impl FnOnce() -> T) -> Option<T> {
        let mut state = lock(&self.shared.state);
        if !state.is_live() {
            return None;
        }
        let result = publish();
        *state = TaskState::Finished;
        drop(state);

        self.shared.run_finish_hook();
        Some(result)
    }
}

impl fmt::Debug for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskToken")
            .field("state", &self.state())
            .finish()
    }
}

type StartFn = Box<dyn FnOnce(TaskToken) -> AbortHandle + Send>;

/// One cancellable unit of work for key `K`.
///
/// `start` receives the task's token and returns the handle that aborts the
/// underlying work (typically the external process).
pub struct Task<K> {
    id: K,
    start: StartFn,
}

impl<K> Task<K> {
    pub fn new<F>(id: K, start: F) -> Self
    where
        F: FnOnce(TaskToken) -> AbortHandle + Send + 'static,
    {
        Self {
            id,
            start: Box::new(start),
        }
    }

    pub fn id(&self) -> &K {
        &self.id
    }
}

impl<K: fmt::Debug> fmt::Debug for Task<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish_non_exhaustive()
    }
}

struct Entry {
    generation: u64,
    shared: Arc<TaskShared>,
    /// `None` until the start closure has returned.
    abort: Option<AbortHandle>,
}

impl Entry {
    fn cancel(self) {
        if self.shared.cancel()
            && let Some(abort) = self.abort
        {
            abort.abort();
        }
    }
}

struct QueueInner<K> {
    entries: HashMap<K, Entry>,
    next_generation: u64,
}

/// Guarantees at most one in-flight task per key.
///
/// Cheap to clone; clones share the same registry.
pub struct TaskQueue<K> {
    inner: Arc<Mutex<QueueInner<K>>>,
}

impl<K> Clone for TaskQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for TaskQueue<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TaskQueue<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Register `task`, cancelling whatever was registered under its key,
    /// then start it.
    ///
    /// Displaced tasks are canceled under the queue lock, so by the time a
    /// key's entry is gone its task is already marked canceled. The start
    /// closure itself runs without the lock.
    pub fn enqueue(&self, task: Task<K>) {
        let Task { id, start } = task;
        let shared = Arc::new(TaskShared::new());

        {
            let mut inner = lock(&self.inner);
            if let Some(displaced) = inner.entries.remove(&id) {
                tracing::debug!(
                    task = ?id,
                    generation = displaced.generation,
                    "Cancelling superseded task"
                );
                displaced.cancel();
            }

            let generation = inner.next_generation;
            inner.next_generation += 1;
            *lock(&shared.on_finish) =
                Some(Self::deregister_hook(&self.inner, id.clone(), generation));
            inner.entries.insert(
                id.clone(),
                Entry {
                    generation,
                    shared: Arc::clone(&shared),
                    abort: None,
                },
            );
        }

        shared.mark_running();
        let abort = start(TaskToken {
            shared: Arc::clone(&shared),
        });

        let unclaimed = {
            let mut inner = lock(&self.inner);
            match inner.entries.get_mut(&id) {
                Some(entry) if Arc::ptr_eq(&entry.shared, &shared) => {
                    entry.abort = Some(abort);
                    None
                }
                _ => Some(abort),
            }
        };

        // Canceled while the start closure ran: nobody else holds the handle.
        if let Some(abort) = unclaimed
            && shared.state() == TaskState::Canceled
        {
            abort.abort();
        }
    }

    /// Cancel and deregister the task for `id`. No-op when none is registered.
    pub fn cancel(&self, id: &K) {
        let mut inner = lock(&self.inner);
        if let Some(entry) = inner.entries.remove(id) {
            tracing::debug!(task = ?id, generation = entry.generation, "Cancelling task");
            entry.cancel();
        }
    }

    /// Cancel every registered task.
    pub fn cancel_all(&self) {
        let mut inner = lock(&self.inner);
        for (_, entry) in inner.entries.drain() {
            entry.cancel();
        }
    }

    /// Whether a task is currently registered for `id`.
    #[must_use]
    pub fn is_pending(&self, id: &K) -> bool {
        lock(&self.inner).entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the entry for `id` only if it still belongs to `generation`,
    /// so a late finisher never evicts its successor.
    fn deregister_hook(
        inner: &Arc<Mutex<QueueInner<K>>>,
        id: K,
        generation: u64,
    ) -> FinishHook {
        let weak: Weak<Mutex<QueueInner<K>>> = Arc::downgrade(inner);
        Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut inner = lock(&inner);
            if inner
                .entries
                .get(&id)
                .is_some_and(|entry| entry.generation == generation)
            {
                inner.entries.remove(&id);
            }
        })
    }
}
