//! Typed in-process event bus.
//!
//! Events are produced by:
//! - Device tasks (new readings, bus faults)
//! - Network tasks (association and broker transitions)
//! - The operator command channel (setpoint overrides)
//!
//! Events are consumed by any task holding a subscription, synchronously
//! and in subscription order, before the scheduler moves on to the next
//! task.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────────────┐
//! │ Device task │────▶│              │────▶│ Motor controller   │
//! │ Network task│────▶│    Outbox    │────▶│ Telemetry          │
//! │ Command task│────▶│  (FIFO, run  │────▶│ Conductivity (temp)│
//! │             │     │ to complete) │────▶│ Event log          │
//! └─────────────┘     └──────────────┘     └────────────────────┘
//! ```
//!
//! Handlers that raise further events (e.g. the broker task connecting on
//! `WifiConnected`) append to the same outbox; those events are fanned out
//! after the current one, so every subscriber sees a single global order.

use std::collections::VecDeque;

use crate::scheduler::{Context, TaskId};

/// Every kind of event that crosses a task boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // ── Bus ───────────────────────────────────────────────
    /// Upstream multiplexer acknowledged its probe.
    BusHubConnected,
    /// Upstream multiplexer did not acknowledge.
    BusHubError,
    /// Downstream port hub acknowledged its probe.
    PortHubConnected,
    /// Downstream port hub did not acknowledge.
    PortHubError,
    /// A device transaction failed; payload carries the address.
    BusFault,

    // ── Sensor data ───────────────────────────────────────
    AngleSensor1,
    AngleSensor2,
    Conductivity,
    FlowSensor1,
    Encoder1,
    Thermocouple,
    ThermocoupleConnected,

    // ── Operator ──────────────────────────────────────────
    SerialSetpoint,

    // ── Network ───────────────────────────────────────────
    WifiConnecting,
    WifiConnected,
    WifiConnectFailed,
    WifiDisconnected,
    MqttConnected,
    MqttDisconnected,
    MqttConnectFailed,
}

impl EventKind {
    /// True for kinds that carry a sensor reading.
    pub fn is_reading(self) -> bool {
        matches!(
            self,
            Self::AngleSensor1
                | Self::AngleSensor2
                | Self::Conductivity
                | Self::FlowSensor1
                | Self::Encoder1
                | Self::Thermocouple
                | Self::SerialSetpoint
        )
    }
}

/// Small fixed-size payload carried by an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Empty,
    Unsigned(u32),
    Float(f32),
    /// Named failure reason.
    Reason(&'static str),
}

impl Payload {
    pub fn as_unsigned(&self) -> Option<u32> {
        match *self {
            Self::Unsigned(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Self::Float(v) => Some(v),
            Self::Unsigned(v) => Some(v as f32),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match *self {
            Self::Reason(r) => Some(r),
            _ => None,
        }
    }
}

/// Immutable typed message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub payload: Payload,
}

impl Event {
    pub const fn new(kind: EventKind, payload: Payload) -> Self {
        Self { kind, payload }
    }

    pub const fn signal(kind: EventKind) -> Self {
        Self::new(kind, Payload::Empty)
    }
}

/// The single capability a subscriber needs: handle one event.
///
/// Handlers run inside the scheduler tick and must not block.  They may
/// raise further events and adjust their own task through `ctx`.
pub trait EventHandler {
    fn handle_event(&mut self, event: &Event, ctx: &mut Context<'_>);
}

// ═══════════════════════════════════════════════════════════════
//  Outbox
// ═══════════════════════════════════════════════════════════════

/// FIFO of events raised but not yet fanned out.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Event>,
}

impl Outbox {
    pub fn push(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Bus
// ═══════════════════════════════════════════════════════════════

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(usize);

#[derive(Debug, Clone, Copy)]
pub(crate) struct Subscription {
    pub(crate) handler: TaskId,
    pub(crate) enabled: bool,
}

/// Subscription table plus the pending outbox.
///
/// The bus does not own handlers; it names them by [`TaskId`] and the
/// [`Scheduler`](crate::scheduler::Scheduler) performs the fan-out, so a
/// task can both raise and receive events without aliasing itself.
#[derive(Debug, Default)]
pub struct EventBus {
    pub(crate) subscriptions: Vec<Subscription>,
    pub(crate) outbox: Outbox,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to every event.  Subscriptions start enabled.
    pub fn subscribe(&mut self, handler: TaskId) -> SubscriptionId {
        self.subscriptions.push(Subscription {
            handler,
            enabled: true,
        });
        SubscriptionId(self.subscriptions.len() - 1)
    }

    /// Enable or disable delivery to one subscription.
    pub fn set_enabled(&mut self, id: SubscriptionId, enabled: bool) {
        if let Some(sub) = self.subscriptions.get_mut(id.0) {
            sub.enabled = enabled;
        }
    }

    pub fn is_enabled(&self, id: SubscriptionId) -> bool {
        self.subscriptions.get(id.0).is_some_and(|s| s.enabled)
    }

    /// Queue an event for fan-out.
    pub fn dispatch(&mut self, kind: EventKind, payload: Payload) {
        self.outbox.push(Event::new(kind, payload));
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
