//! Cooperative periodic task scheduler.
//!
//! Single-threaded, no preemption.  The main loop calls [`Scheduler::tick`]
//! with the current monotonic time; every enabled task whose deadline has
//! passed runs its step once, in registration order.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  tick(now)                                                   │
//! │                                                              │
//! │  for task in registration order:                             │
//! │    ├─ disabled?            → skip                            │
//! │    ├─ activation pending?  → on_enable()                     │
//! │    │     false → one-shot complete, disable                  │
//! │    │     true  → due now, or now + period if it set one   │
//! │    ├─ next_due ≤ now?      → step(), next_due = now + period │
//! │    └─ fan out every event raised above (run to completion)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tasks never call each other.  Anything a step wants to change outside
//! itself goes through its [`Context`]: events into the outbox, and
//! enable/disable/period requests for its own slot, applied by the
//! scheduler once the step returns.

use log::{debug, info};

use crate::events::{Event, EventBus, EventHandler, EventKind, Outbox, Payload, SubscriptionId};

// ═══════════════════════════════════════════════════════════════
//  Task identity and trait
// ═══════════════════════════════════════════════════════════════

/// Index of a registered task.  Only [`Scheduler::register`] creates these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A schedulable unit.
///
/// Every task is also an [`EventHandler`]; tasks that never subscribe
/// simply ignore what they are given.
pub trait Task: EventHandler {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Activation hook, run once on every disabled → enabled edge, before
    /// the first step.  Returning `false` completes the task immediately
    /// (one-shot) instead of entering periodic execution.
    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> bool {
        true
    }

    /// Periodic body.  Must not block.
    fn step(&mut self, ctx: &mut Context<'_>);
}

// ═══════════════════════════════════════════════════════════════
//  Context
// ═══════════════════════════════════════════════════════════════

/// Changes a task asked for about itself during one callback.
#[derive(Debug, Default, Clone, Copy)]
struct Request {
    enabled: Option<bool>,
    period_ms: Option<u64>,
}

/// What a running task may touch outside its own state.
pub struct Context<'a> {
    now_ms: u64,
    task: TaskId,
    outbox: &'a mut Outbox,
    request: &'a mut Request,
}

impl<'a> Context<'a> {
    fn new(now_ms: u64, task: TaskId, outbox: &'a mut Outbox, request: &'a mut Request) -> Self {
        Self {
            now_ms,
            task,
            outbox,
            request,
        }
    }

    /// Scheduler time of the current tick, in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Raise an event.  Fanned out before the scheduler moves on.
    pub fn dispatch(&mut self, kind: EventKind, payload: Payload) {
        self.outbox.push(Event::new(kind, payload));
    }

    /// Raise a payload-less event.
    pub fn signal(&mut self, kind: EventKind) {
        self.dispatch(kind, Payload::Empty);
    }

    /// Enable the calling task.  No effect if it is already enabled.
    pub fn enable(&mut self) {
        self.request.enabled = Some(true);
    }

    /// Disable the calling task.  Takes effect before its next step.
    pub fn disable(&mut self) {
        self.request.enabled = Some(false);
    }

    /// Change the calling task's period.  The next run is `now + period`.
    pub fn set_period(&mut self, period_ms: u64) {
        self.request.period_ms = Some(period_ms);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

struct TaskSlot {
    task: Box<dyn Task>,
    period_ms: u64,
    enabled: bool,
    activation_pending: bool,
    next_due_ms: u64,
    steps: u64,
}

impl TaskSlot {
    fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.activation_pending = true;
        }
        if !enabled {
            self.activation_pending = false;
        }
        self.enabled = enabled;
    }

    fn apply(&mut self, request: Request, now_ms: u64) {
        if let Some(period) = request.period_ms {
            self.period_ms = period;
            self.next_due_ms = now_ms.saturating_add(period);
        }
        if let Some(enabled) = request.enabled {
            if enabled != self.enabled {
                debug!(
                    "Scheduler: '{}' {}",
                    self.task.name(),
                    if enabled { "enabled" } else { "disabled" }
                );
            }
            self.set_enabled(enabled);
        }
    }
}

/// The scheduler engine.  Owns the fixed task set and the event bus.
pub struct Scheduler {
    slots: Vec<TaskSlot>,
    bus: EventBus,
    now_ms: u64,
    ticks: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            bus: EventBus::new(),
            now_ms: 0,
            ticks: 0,
        }
    }

    /// Add a task.  Tasks start disabled.
    pub fn register(&mut self, task: Box<dyn Task>, period_ms: u64) -> TaskId {
        let id = TaskId(self.slots.len());
        info!(
            "Scheduler: registered '{}' at slot {} (every {} ms)",
            task.name(),
            id.0,
            period_ms
        );
        self.slots.push(TaskSlot {
            task,
            period_ms,
            enabled: false,
            activation_pending: false,
            next_due_ms: 0,
            steps: 0,
        });
        id
    }

    /// Subscribe a registered task to the event bus.
    pub fn subscribe(&mut self, task: TaskId) -> SubscriptionId {
        self.bus.subscribe(task)
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Enable a task.  Its activation hook runs on the next tick.
    pub fn enable(&mut self, task: TaskId) {
        self.slots[task.0].set_enabled(true);
    }

    /// Disable a task.  It will not step again until re-enabled.
    pub fn disable(&mut self, task: TaskId) {
        self.slots[task.0].set_enabled(false);
    }

    pub fn is_enabled(&self, task: TaskId) -> bool {
        self.slots[task.0].enabled
    }

    pub fn period_ms(&self, task: TaskId) -> u64 {
        self.slots[task.0].period_ms
    }

    /// Completed periodic steps of one task.
    pub fn steps(&self, task: TaskId) -> u64 {
        self.slots[task.0].steps
    }

    pub fn task_count(&self) -> usize {
        self.slots.len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Raise an event from outside any task and fan it out before returning.
    pub fn dispatch(&mut self, kind: EventKind, payload: Payload) {
        self.bus.dispatch(kind, payload);
        self.deliver();
    }

    /// Advance the scheduler to `now_ms`.
    pub fn tick(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        self.ticks += 1;

        for index in 0..self.slots.len() {
            let id = TaskId(index);

            if self.slots[index].activation_pending && self.slots[index].enabled {
                self.slots[index].activation_pending = false;
                // Due now unless the hook asks for a different period.
                self.slots[index].next_due_ms = now_ms;
                let proceed = self.run(id, |task, ctx| task.on_enable(ctx));
                let slot = &mut self.slots[index];
                if !proceed && slot.enabled {
                    debug!("Scheduler: '{}' completed on activation", slot.task.name());
                    slot.set_enabled(false);
                }
                self.deliver();
            }

            let slot = &self.slots[index];
            if !slot.enabled || slot.activation_pending || slot.next_due_ms > now_ms {
                continue;
            }

            let period = slot.period_ms;
            self.slots[index].next_due_ms = now_ms.saturating_add(period);
            self.run(id, |task, ctx| task.step(ctx));
            self.slots[index].steps += 1;
            self.deliver();
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Run one callback of one task with a fresh context, then apply
    /// whatever it requested about itself.
    fn run<R>(&mut self, id: TaskId, f: impl FnOnce(&mut dyn Task, &mut Context<'_>) -> R) -> R {
        let now = self.now_ms;
        let mut request = Request::default();
        let slot = &mut self.slots[id.0];
        let result = {
            let mut ctx = Context::new(now, id, &mut self.bus.outbox, &mut request);
            f(slot.task.as_mut(), &mut ctx)
        };
        slot.apply(request, now);
        result
    }

    /// Fan out every pending event, including those raised by handlers,
    /// in FIFO order.
    fn deliver(&mut self) {
        while let Some(event) = self.bus.outbox.pop() {
            for index in 0..self.bus.subscriptions.len() {
                let sub = self.bus.subscriptions[index];
                if sub.enabled {
                    self.run(sub.handler, |task, ctx| task.handle_event(&event, ctx));
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
