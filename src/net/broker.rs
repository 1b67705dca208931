//! Broker connectivity state machine.
//!
//! Follows association: enabled and connecting when the network comes up,
//! disabled when it drops.  A connect only starts the session; later steps
//! watch for it to come up and give up after the connect timeout.  While
//! connected the step services the client, and a dead session is reported
//! and re-attempted straight away.
//!
//! ```text
//!  Disconnected ──connect──▶ Connecting ──session up──▶ Connected
//!       ▲                        │                          │
//!       └──── refused/timeout ───┘◀──── liveness lost ──────┘
//! ```
//!
//! The client lives in a [`BrokerSession`] shared with the telemetry
//! publisher, so publishing never reaches into another task.

use std::cell::RefCell;
use std::rc::Rc;

use log::{info, warn};

use crate::app::ports::{BrokerClient, Publisher};
use crate::error::BrokerError;
use crate::events::{Event, EventHandler, EventKind};
use crate::scheduler::{Context, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Connected,
    /// Connect issued, session not up yet.
    Connecting,
    Disconnected,
}

/// Client plus the connection state the broker task last observed.
pub struct BrokerSession<C> {
    client: C,
    state: BrokerState,
}

impl<C: BrokerClient> BrokerSession<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            state: BrokerState::Disconnected,
        }
    }

    pub fn state(&self) -> BrokerState {
        self.state
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

/// Shared handle to one broker session.
pub struct BrokerHandle<C>(Rc<RefCell<BrokerSession<C>>>);

impl<C> Clone for BrokerHandle<C> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<C: BrokerClient> BrokerHandle<C> {
    pub fn new(client: C) -> Self {
        Self(Rc::new(RefCell::new(BrokerSession::new(client))))
    }

    pub fn state(&self) -> BrokerState {
        self.0
            .try_borrow()
            .map_or(BrokerState::Disconnected, |s| s.state)
    }

    fn set_state(&self, state: BrokerState) {
        if let Ok(mut session) = self.0.try_borrow_mut() {
            session.state = state;
        }
    }

    /// Run `f` on the client.  `None` if the session is already borrowed.
    fn with_client<T>(&self, f: impl FnOnce(&mut C) -> T) -> Option<T> {
        self.0.try_borrow_mut().ok().map(|mut s| f(&mut s.client))
    }
}

impl<C: BrokerClient> Publisher for BrokerHandle<C> {
    fn is_connected(&self) -> bool {
        self.state() == BrokerState::Connected
    }

    /// Refused unless the broker task holds a live session.
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let mut session = self.0.try_borrow_mut().map_err(|_| BrokerError::LivenessLost)?;
        if session.state != BrokerState::Connected {
            return Err(BrokerError::NoNetwork);
        }
        session.client.publish(topic, payload)
    }
}

pub struct BrokerTask<C> {
    session: BrokerHandle<C>,
    client_id: String,
    connect_timeout_ms: u64,
    attempt_started_ms: u64,
    associated: bool,
}

impl<C: BrokerClient> BrokerTask<C> {
    pub fn new(session: BrokerHandle<C>, client_id: impl Into<String>, connect_timeout_ms: u64) -> Self {
        Self {
            session,
            client_id: client_id.into(),
            connect_timeout_ms,
            attempt_started_ms: 0,
            associated: false,
        }
    }

    pub fn state(&self) -> BrokerState {
        self.session.state()
    }

    /// Start one connect attempt.  `Ok` once the attempt is under way or
    /// already answered; failure leaves the state Disconnected.
    pub fn connect(&mut self, ctx: &mut Context<'_>) -> Result<(), BrokerError> {
        if !self.associated {
            return Err(BrokerError::NoNetwork);
        }
        let started = self
            .session
            .with_client(|c| c.connect(&self.client_id))
            .unwrap_or(Err(BrokerError::LivenessLost));
        match started {
            Ok(()) => {
                self.attempt_started_ms = ctx.now_ms();
                self.session.set_state(BrokerState::Connecting);
                self.poll_attempt(ctx)
            }
            Err(e) => self.fail(ctx, e),
        }
    }

    /// Check an attempt in flight.  Stays Connecting until the session is
    /// up or the connect timeout has passed.
    fn poll_attempt(&mut self, ctx: &mut Context<'_>) -> Result<(), BrokerError> {
        if self.session.with_client(|c| c.is_connected()).unwrap_or(false) {
            self.session.set_state(BrokerState::Connected);
            info!("Broker: connected as '{}'", self.client_id);
            ctx.signal(EventKind::MqttConnected);
            return Ok(());
        }
        let waited = ctx.now_ms().saturating_sub(self.attempt_started_ms);
        if waited >= self.connect_timeout_ms {
            self.session.with_client(|c| c.disconnect());
            warn!("Broker: no answer after {} ms", waited);
            return self.fail(ctx, BrokerError::ConnectRefused);
        }
        Ok(())
    }

    fn fail(&mut self, ctx: &mut Context<'_>, e: BrokerError) -> Result<(), BrokerError> {
        warn!("Broker: {}", e);
        self.session.set_state(BrokerState::Disconnected);
        ctx.signal(EventKind::MqttConnectFailed);
        Err(e)
    }

    fn mark_disconnected(&mut self, ctx: &mut Context<'_>) {
        match self.state() {
            BrokerState::Connected => {
                self.session.set_state(BrokerState::Disconnected);
                warn!("Broker: disconnected");
                ctx.signal(EventKind::MqttDisconnected);
            }
            BrokerState::Connecting => {
                self.session.with_client(|c| c.disconnect());
                self.session.set_state(BrokerState::Disconnected);
            }
            BrokerState::Disconnected => {}
        }
    }
}

impl<C: BrokerClient> EventHandler for BrokerTask<C> {
    fn handle_event(&mut self, event: &Event, ctx: &mut Context<'_>) {
        match event.kind {
            EventKind::WifiConnected => {
                self.associated = true;
                ctx.enable();
                let _ = self.connect(ctx);
            }
            EventKind::WifiDisconnected => {
                self.associated = false;
                ctx.disable();
                self.mark_disconnected(ctx);
            }
            _ => {}
        }
    }
}

impl<C: BrokerClient> Task for BrokerTask<C> {
    fn name(&self) -> &'static str {
        "Broker"
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> bool {
        self.associated
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        match self.state() {
            BrokerState::Connected => {
                let alive = self
                    .session
                    .with_client(|c| {
                        let alive = c.is_connected();
                        if alive {
                            c.poll();
                        }
                        alive
                    })
                    .unwrap_or(true);
                if !alive {
                    self.mark_disconnected(ctx);
                    if self.associated {
                        let _ = self.connect(ctx);
                    }
                }
            }
            BrokerState::Connecting => {
                let _ = self.poll_attempt(ctx);
            }
            BrokerState::Disconnected => {
                if self.associated {
                    let _ = self.connect(ctx);
                }
            }
        }
    }
}
