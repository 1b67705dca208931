//! Scheduler and event bus behaviour through the public API.

use std::cell::Cell;
use std::rc::Rc;

use stirtank::adapters::sim::EventRecorder;
use stirtank::events::{Event, EventHandler, EventKind, Payload};
use stirtank::scheduler::{Context, Scheduler, Task};

/// Emits a fixed list of events on every step.
struct Source(Vec<(EventKind, Payload)>);

impl EventHandler for Source {
    fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
}

impl Task for Source {
    fn name(&self) -> &'static str {
        "source"
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        for &(kind, payload) in &self.0 {
            ctx.dispatch(kind, payload);
        }
    }
}

/// Answers `WifiConnected` with `MqttConnected`.
struct Relay;

impl EventHandler for Relay {
    fn handle_event(&mut self, event: &Event, ctx: &mut Context<'_>) {
        if event.kind == EventKind::WifiConnected {
            ctx.signal(EventKind::MqttConnected);
        }
    }
}

impl Task for Relay {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn step(&mut self, _ctx: &mut Context<'_>) {}
}

/// Counts activations and steps.
struct Counter {
    activations: Rc<Cell<u32>>,
    activate: bool,
    reschedule_to: Option<u64>,
}

impl Counter {
    fn new(activations: &Rc<Cell<u32>>) -> Self {
        Self {
            activations: Rc::clone(activations),
            activate: true,
            reschedule_to: None,
        }
    }
}

impl EventHandler for Counter {
    fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
}

impl Task for Counter {
    fn name(&self) -> &'static str {
        "counter"
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> bool {
        self.activations.set(self.activations.get() + 1);
        self.activate
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        if let Some(period) = self.reschedule_to.take() {
            ctx.set_period(period);
        }
    }
}

#[test]
fn events_reach_enabled_subscriptions_only() {
    let mut sched = Scheduler::new();
    let source = sched.register(
        Box::new(Source(vec![(EventKind::Thermocouple, Payload::Float(21.0))])),
        1000,
    );
    let (a, seen_a) = EventRecorder::new();
    let (b, seen_b) = EventRecorder::new();
    let a = sched.register(Box::new(a), 1000);
    let b = sched.register(Box::new(b), 1000);
    sched.subscribe(a);
    let sub_b = sched.subscribe(b);
    sched.events_mut().set_enabled(sub_b, false);
    sched.enable(source);

    sched.tick(0);

    assert_eq!(seen_a.payloads(EventKind::Thermocouple), vec![Payload::Float(21.0)]);
    assert!(seen_b.all().is_empty());
    assert!(!sched.events().is_enabled(sub_b));
    assert_eq!(sched.events().pending(), 0);
}

#[test]
fn handler_events_queue_behind_the_current_one() {
    let mut sched = Scheduler::new();
    let source = sched.register(
        Box::new(Source(vec![
            (EventKind::WifiConnected, Payload::Empty),
            (EventKind::Thermocouple, Payload::Float(20.0)),
        ])),
        1000,
    );
    let relay = sched.register(Box::new(Relay), 1000);
    let (recorder, events) = EventRecorder::new();
    let recorder = sched.register(Box::new(recorder), 1000);
    sched.subscribe(relay);
    sched.subscribe(recorder);
    sched.enable(source);

    sched.tick(0);

    assert_eq!(
        events.kinds(),
        vec![EventKind::WifiConnected, EventKind::Thermocouple, EventKind::MqttConnected]
    );
}

#[test]
fn reenable_activates_exactly_once() {
    let activations = Rc::new(Cell::new(0));
    let mut sched = Scheduler::new();
    let id = sched.register(Box::new(Counter::new(&activations)), 100);

    sched.enable(id);
    sched.tick(0);
    sched.tick(100);
    assert_eq!(activations.get(), 1);
    assert_eq!(sched.steps(id), 2);

    sched.disable(id);
    sched.tick(200);
    assert_eq!(sched.steps(id), 2);

    sched.enable(id);
    sched.enable(id);
    sched.tick(300);
    sched.tick(400);
    assert_eq!(activations.get(), 2);
    assert_eq!(sched.steps(id), 4);
}

#[test]
fn one_shot_never_steps() {
    let activations = Rc::new(Cell::new(0));
    let mut sched = Scheduler::new();
    let mut task = Counter::new(&activations);
    task.activate = false;
    let id = sched.register(Box::new(task), 100);

    sched.enable(id);
    sched.tick(0);
    sched.tick(100);

    assert_eq!(activations.get(), 1);
    assert_eq!(sched.steps(id), 0);
    assert!(!sched.is_enabled(id));
}

#[test]
fn late_tick_runs_once_without_catching_up() {
    let activations = Rc::new(Cell::new(0));
    let mut sched = Scheduler::new();
    let id = sched.register(Box::new(Counter::new(&activations)), 100);
    sched.enable(id);

    sched.tick(0);
    sched.tick(1000);
    assert_eq!(sched.steps(id), 2);

    sched.tick(1050);
    assert_eq!(sched.steps(id), 2);
    sched.tick(1100);
    assert_eq!(sched.steps(id), 3);
}

#[test]
fn period_change_takes_effect_from_now() {
    let activations = Rc::new(Cell::new(0));
    let mut sched = Scheduler::new();
    let mut task = Counter::new(&activations);
    task.reschedule_to = Some(500);
    let id = sched.register(Box::new(task), 100);
    sched.enable(id);

    sched.tick(0);
    assert_eq!(sched.period_ms(id), 500);
    sched.tick(100);
    sched.tick(400);
    assert_eq!(sched.steps(id), 1);
    sched.tick(500);
    assert_eq!(sched.steps(id), 2);
}
