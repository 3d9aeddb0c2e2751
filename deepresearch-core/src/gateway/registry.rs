//! Running and finished research tasks, keyed by request id.

use crate::error::{ControllerError, ResearchError, Result};
use crate::research::{FinalAnswer, ProgressEvent, ProgressSink, TaskRecord, TaskStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Event fan-out for one task: full history for late subscribers plus a
/// broadcast sender for live ones.
///
/// History append and broadcast send happen under the same lock, so a
/// subscriber that snapshots history and then receives live events never
/// misses or duplicates one.
#[derive(Debug)]
pub struct TaskChannel {
    history: Mutex<Vec<ProgressEvent>>,
    tx: broadcast::Sender<ProgressEvent>,
    subscribers: AtomicUsize,
}

impl TaskChannel {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            history: Mutex::new(Vec::new()),
            tx,
            subscribers: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ProgressEvent>> {
        // A poisoned history is still a valid list of events.
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// History so far and a receiver for everything after it.
    pub fn subscribe(&self) -> (Vec<ProgressEvent>, broadcast::Receiver<ProgressEvent>) {
        let history = self.lock();
        let rx = self.tx.subscribe();
        self.subscribers.fetch_add(1, Ordering::SeqCst);
        (history.clone(), rx)
    }

    pub fn history(&self) -> Vec<ProgressEvent> {
        self.lock().clone()
    }

    /// Whether the terminal event has been emitted.
    pub fn is_finished(&self) -> bool {
        self.lock().last().is_some_and(ProgressEvent::is_terminal)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }
}

impl ProgressSink for TaskChannel {
    fn emit(&self, event: ProgressEvent) {
        let mut history = self.lock();
        history.push(event.clone());
        // No receivers is fine; history keeps the event.
        let _ = self.tx.send(event);
    }
}

/// Held by each stream subscriber. Dropping the last guard of an unfinished
/// task cancels the run when `cancel_on_disconnect` is set.
#[derive(Debug)]
pub struct SubscriberGuard {
    request_id: Uuid,
    channel: Arc<TaskChannel>,
    cancel: CancellationToken,
    cancel_on_disconnect: bool,
}

impl SubscriberGuard {
    pub fn new(
        request_id: Uuid,
        channel: Arc<TaskChannel>,
        cancel: CancellationToken,
        cancel_on_disconnect: bool,
    ) -> Self {
        Self {
            request_id,
            channel,
            cancel,
            cancel_on_disconnect,
        }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let previous = self.channel.subscribers.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.cancel_on_disconnect && !self.channel.is_finished() {
            info!(request_id = %self.request_id, "Last subscriber left, cancelling run");
            self.cancel.cancel();
        }
    }
}

#[derive(Debug)]
pub struct TaskEntry {
    pub record: TaskRecord,
    pub channel: Arc<TaskChannel>,
    pub cancel: CancellationToken,
}

/// Running tasks plus the most recently finished ones. Older finished tasks
/// are evicted and served from their saved records.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: HashMap<Uuid, TaskEntry>,
    event_buffer: usize,
    submitted: usize,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TaskRegistry {
    pub fn new(event_buffer: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            event_buffer,
            submitted: 0,
        }
    }

    /// Register a new running task.
    pub fn create(
        &mut self,
        query: &str,
        budget: u64,
        max_bad_attempts: u32,
    ) -> (Uuid, Arc<TaskChannel>, CancellationToken) {
        let request_id = Uuid::new_v4();
        let channel = Arc::new(TaskChannel::new(self.event_buffer));
        let cancel = CancellationToken::new();
        self.tasks.insert(
            request_id,
            TaskEntry {
                record: TaskRecord::new(request_id, query, budget, max_bad_attempts),
                channel: channel.clone(),
                cancel: cancel.clone(),
            },
        );
        self.submitted += 1;
        debug!(%request_id, "Task registered");
        (request_id, channel, cancel)
    }

    pub fn get(&self, request_id: &Uuid) -> Option<&TaskEntry> {
        self.tasks.get(request_id)
    }

    /// The task record with its event history filled in.
    pub fn snapshot(&self, request_id: &Uuid) -> Option<TaskRecord> {
        self.tasks.get(request_id).map(|entry| {
            let mut record = entry.record.clone();
            record.events = entry.channel.history();
            record
        })
    }

    /// Record the run's result. Returns the final snapshot for persistence.
    pub fn finish(
        &mut self,
        request_id: &Uuid,
        result: &Result<FinalAnswer>,
    ) -> Option<TaskRecord> {
        let entry = self.tasks.get_mut(request_id)?;
        match result {
            Ok(answer) => entry.record.complete(answer.clone()),
            Err(ResearchError::Controller(ControllerError::Cancelled)) => entry.record.cancel(),
            Err(e) => entry.record.fail(e.to_string()),
        }
        entry.record.events = entry.channel.history();
        Some(entry.record.clone())
    }

    /// Cancel a running task. `false` if unknown or already finished.
    pub fn cancel(&self, request_id: &Uuid) -> bool {
        match self.tasks.get(request_id) {
            Some(entry) if entry.record.status == TaskStatus::Running => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|e| !e.record.status.is_finished())
            .count()
    }

    /// Tasks submitted since startup, including evicted ones.
    pub fn total_count(&self) -> usize {
        self.submitted
    }

    /// Tasks currently held in memory.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop finished tasks nobody is streaming, oldest first, until at most
    /// `keep` finished tasks remain. Returns how many were dropped.
    pub fn evict_finished(&mut self, keep: usize) -> usize {
        let finished = self
            .tasks
            .values()
            .filter(|e| e.record.status.is_finished())
            .count();
        let excess = finished.saturating_sub(keep);
        if excess == 0 {
            return 0;
        }

        let mut idle: Vec<_> = self
            .tasks
            .iter()
            .filter(|(_, e)| e.record.status.is_finished() && e.channel.subscriber_count() == 0)
            .map(|(id, e)| (e.record.updated_at, *id))
            .collect();
        idle.sort();

        let evicted = idle.len().min(excess);
        for (_, request_id) in idle.into_iter().take(evicted) {
            self.tasks.remove(&request_id);
        }
        debug!(evicted, remaining = self.tasks.len(), "Evicted finished tasks");
        evicted
    }
}
