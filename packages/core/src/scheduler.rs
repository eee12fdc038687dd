//! C5 — Tick Scheduler.
//!
//! A cooperative, single-threaded discrete-event loop over a logical clock
//! `t`, mirroring the teacher's `flume`-channel-driven runtime event loop
//! (`protocol/runtime`) but replacing "drain a channel" with "drain a
//! priority queue of scheduled actions". Events are kept in a min-heap
//! keyed by `(fire_time, priority, seq_no)` per spec.md §9's design note;
//! the heap only ever stores the key plus an event id — the action and its
//! remaining lifetime live in a side table so cancellation is just a
//! hashmap removal (the heap entry is skipped lazily when it's popped).

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;

/// An action fired once per occurrence, given the logical time it fired at.
pub type Action = Arc<dyn Fn(f64) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EventSpec {
    pub at: f64,
    pub until: f64,
    /// `None` ⇒ fire once per tick while `at <= t <= until`.
    pub step: Option<f64>,
    pub priority: i32,
    pub oneshot: bool,
    pub label: String,
}

struct EventRecord {
    spec: EventSpec,
    action: Action,
}

#[derive(Clone, Copy)]
struct HeapKey {
    fire_time: f64,
    priority: i32,
    seq: u64,
    id: u64,
}

impl PartialEq for HeapKey {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for HeapKey {}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_time
            .total_cmp(&other.fire_time)
            .then(self.priority.cmp(&other.priority))
            .then(self.seq.cmp(&other.seq))
    }
}

/// Default wall-clock granularity between ticks, before `time_scale` is
/// applied (spec.md §4.5's "detail floor").
pub const DEFAULT_STEP_GRAIN: f64 = 0.1;

struct SchedulerState {
    heap: BinaryHeap<Reverse<HeapKey>>,
    events: HashMap<u64, EventRecord>,
    next_id: u64,
    next_seq: u64,
    time: f64,
}

impl SchedulerState {
    fn seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn reschedule(&mut self, id: u64, fired_at: f64, step_grain: f64) {
        let Some(record) = self.events.get(&id) else {
            return;
        };
        if record.spec.oneshot {
            self.events.remove(&id);
            return;
        }
        let next_fire = match record.spec.step {
            Some(step) => fired_at + step,
            None => fired_at + step_grain,
        };
        if next_fire > record.spec.until {
            self.events.remove(&id);
            return;
        }
        let priority = record.spec.priority;
        let seq = self.seq();
        self.heap.push(Reverse(HeapKey {
            fire_time: next_fire,
            priority,
            seq,
            id,
        }));
    }
}

/// Interior-mutable so a `Plc` can be wrapped in one `Arc` and shared
/// between the background tick loop and the HTTP control surface
/// (spec.md §6's `/time/scale`) without requiring exclusive ownership.
pub struct Scheduler {
    state: parking_lot::Mutex<SchedulerState>,
    time_scale: std::sync::atomic::AtomicU64,
    step_grain: f64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: parking_lot::Mutex::new(SchedulerState {
                heap: BinaryHeap::new(),
                events: HashMap::new(),
                next_id: 0,
                next_seq: 0,
                time: 0.0,
            }),
            time_scale: std::sync::atomic::AtomicU64::new(1.0f64.to_bits()),
            step_grain: DEFAULT_STEP_GRAIN,
        }
    }

    pub fn time(&self) -> f64 {
        self.state.lock().time
    }

    pub fn time_scale(&self) -> f64 {
        f64::from_bits(self.time_scale.load(std::sync::atomic::Ordering::Relaxed))
    }

    pub fn set_time_scale(&self, scale: f64) {
        self.time_scale.store(scale.to_bits(), std::sync::atomic::Ordering::Relaxed);
    }

    /// Register `spec`/`action`, returning the event id `cancel` expects.
    pub fn register(&self, spec: EventSpec, action: Action) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let seq = state.seq();
        state.heap.push(Reverse(HeapKey {
            fire_time: spec.at,
            priority: spec.priority,
            seq,
            id,
        }));
        state.events.insert(id, EventRecord { spec, action });
        id
    }

    /// Remove an event. A no-op if it already fired and was not periodic.
    pub fn cancel(&self, id: u64) {
        self.state.lock().events.remove(&id);
    }

    /// Run until no events remain or `shutdown` reports true. Ready events
    /// (`fire_time <= t`) within a tick fire in ascending priority, ties
    /// broken by registration order (spec.md §4.5).
    pub async fn run(&self, mut shutdown: impl FnMut() -> bool) -> Result<()> {
        loop {
            if shutdown() {
                break;
            }
            let (t, ready) = {
                let mut state = self.state.lock();
                if state.heap.is_empty() {
                    break;
                }
                let t = state.time;
                let mut ready = Vec::new();
                while let Some(&Reverse(key)) = state.heap.peek() {
                    if key.fire_time > t {
                        break;
                    }
                    state.heap.pop();
                    if state.events.contains_key(&key.id) {
                        ready.push(key);
                    }
                }
                ready.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.seq.cmp(&b.seq)));
                (t, ready)
            };

            for key in ready {
                let action = {
                    let state = self.state.lock();
                    state.events.get(&key.id).map(|r| r.action.clone())
                };
                let Some(action) = action else {
                    continue;
                };
                if let Err(e) = action(t).await {
                    log::error!("scheduled event {} failed at t={t}: {e}", key.id);
                }
                self.state.lock().reschedule(key.id, t, self.step_grain);
            }

            let is_empty = self.state.lock().heap.is_empty();
            if is_empty {
                break;
            }
            let sleep_secs = self.step_grain / self.time_scale().max(f64::EPSILON);
            tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
            self.state.lock().time += self.step_grain;
        }
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn instant_action(calls: Arc<Mutex<Vec<(f64, &'static str)>>>, label: &'static str) -> Action {
        Arc::new(move |t| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.lock().push((t, label));
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn events_fire_in_priority_order_within_a_tick() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Scheduler::new();
        scheduler.register(
            EventSpec { at: 0.0, until: 0.0, step: None, priority: 5, oneshot: true, label: "low".into() },
            instant_action(calls.clone(), "low"),
        );
        scheduler.register(
            EventSpec { at: 0.0, until: 0.0, step: None, priority: 1, oneshot: true, label: "high".into() },
            instant_action(calls.clone(), "high"),
        );
        scheduler.run(|| false).await.unwrap();
        let order: Vec<&str> = calls.lock().iter().map(|(_, label)| *label).collect();
        assert_eq!(order, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn stepped_event_fires_until_its_deadline() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Scheduler::new();
        scheduler.set_time_scale(1_000.0);
        scheduler.register(
            EventSpec { at: 0.0, until: 0.25, step: Some(0.1), priority: 2, oneshot: false, label: "tick".into() },
            instant_action(calls.clone(), "tick"),
        );
        scheduler.run(|| false).await.unwrap();
        assert_eq!(calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn cancel_prevents_further_firing() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Scheduler::new();
        scheduler.set_time_scale(1_000.0);
        let id = scheduler.register(
            EventSpec { at: 0.0, until: 1.0, step: Some(0.1), priority: 2, oneshot: false, label: "tick".into() },
            instant_action(calls.clone(), "tick"),
        );
        scheduler.cancel(id);
        scheduler.run(|| false).await.unwrap();
        assert!(calls.lock().is_empty());
    }
}
