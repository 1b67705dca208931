//! Host-side simulated adapters.
//!
//! Each simulator is a cheap `Clone` over shared state so a test can keep
//! one handle for inspection after moving the other into a task.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use heapless::String as HString;

use crate::app::ports::{AccessPoint, BrokerClient, EnterpriseCredentials, LineIo, LinkStatus, WifiDriver};
use crate::error::{BrokerError, Error, Result};
use crate::events::{Event, EventHandler, EventKind, Payload};
use crate::scheduler::{Context, Task};

// ───────────────────────────────────────────────────────────────
// Event recorder
// ───────────────────────────────────────────────────────────────

/// Read side of an [`EventRecorder`].
#[derive(Clone, Default)]
pub struct RecordedEvents(Rc<RefCell<Vec<Event>>>);

impl RecordedEvents {
    pub fn all(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.0.borrow().iter().map(|e| e.kind).collect()
    }

    pub fn payloads(&self, kind: EventKind) -> Vec<Payload> {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.payload)
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.0.borrow().iter().filter(|e| e.kind == kind).count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Subscriber that keeps every event it is given.  Never steps.
pub struct EventRecorder {
    events: RecordedEvents,
}

impl EventRecorder {
    pub fn new() -> (Self, RecordedEvents) {
        let events = RecordedEvents::default();
        (
            Self {
                events: events.clone(),
            },
            events,
        )
    }
}

impl EventHandler for EventRecorder {
    fn handle_event(&mut self, event: &Event, _ctx: &mut Context<'_>) {
        self.events.0.borrow_mut().push(*event);
    }
}

impl Task for EventRecorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn step(&mut self, _ctx: &mut Context<'_>) {}
}

// ───────────────────────────────────────────────────────────────
// Radio
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct WifiState {
    aps: Vec<AccessPoint>,
    status: LinkStatus,
    refuse_begin: bool,
    joined: Vec<[u8; 6]>,
    users: Vec<String>,
    disconnects: usize,
}

/// Simulated station radio.  Scan results and link status are set by
/// the test; `begin` records the pinned BSSID and reports `Connecting`.
#[derive(Clone)]
pub struct SimWifi(Rc<RefCell<WifiState>>);

impl Default for SimWifi {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWifi {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(WifiState {
            aps: Vec::new(),
            status: LinkStatus::Idle,
            refuse_begin: false,
            joined: Vec::new(),
            users: Vec::new(),
            disconnects: 0,
        })))
    }

    /// Add a visible access point whose BSSID ends in `tag`.
    pub fn add_ap(&self, ssid: &str, tag: u8, rssi: i8) {
        let ap = AccessPoint {
            ssid: HString::try_from(ssid).unwrap_or_default(),
            bssid: [0, 0, 0, 0, 0, tag],
            channel: 1 + tag % 11,
            rssi,
        };
        self.0.borrow_mut().aps.push(ap);
    }

    pub fn clear_aps(&self) {
        self.0.borrow_mut().aps.clear();
    }

    pub fn scan_results(&self) -> Vec<AccessPoint> {
        self.0.borrow().aps.clone()
    }

    pub fn set_status(&self, status: LinkStatus) {
        self.0.borrow_mut().status = status;
    }

    pub fn refuse_begin(&self, refuse: bool) {
        self.0.borrow_mut().refuse_begin = refuse;
    }

    /// BSSIDs passed to `begin`, oldest first.
    pub fn joined(&self) -> Vec<[u8; 6]> {
        self.0.borrow().joined.clone()
    }

    /// Identities presented to `begin`.
    pub fn users(&self) -> Vec<String> {
        self.0.borrow().users.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.0.borrow().disconnects
    }
}

impl WifiDriver for SimWifi {
    fn disconnect(&mut self) {
        let mut s = self.0.borrow_mut();
        s.disconnects += 1;
        s.status = LinkStatus::Disconnected;
    }

    fn scan(&mut self) -> Vec<AccessPoint> {
        self.scan_results()
    }

    fn begin(&mut self, ap: &AccessPoint, credentials: &EnterpriseCredentials<'_>) -> Result<()> {
        let mut s = self.0.borrow_mut();
        if s.refuse_begin {
            return Err(Error::AssociationFailure("driver refused"));
        }
        s.joined.push(ap.bssid);
        s.users.push(credentials.user.to_owned());
        s.status = LinkStatus::Connecting;
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        self.0.borrow().status
    }
}

// ───────────────────────────────────────────────────────────────
// Broker
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct BrokerState {
    accepting: bool,
    /// Leave accepted connects pending until [`SimBroker::answer`].
    deferred: bool,
    pending: bool,
    connected: bool,
    disconnects: usize,
    client_ids: Vec<String>,
    polls: usize,
    published: Vec<(String, String)>,
}

/// Simulated MQTT client.
#[derive(Clone)]
pub struct SimBroker(Rc<RefCell<BrokerState>>);

impl Default for SimBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBroker {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(BrokerState {
            accepting: true,
            deferred: false,
            pending: false,
            connected: false,
            disconnects: 0,
            client_ids: Vec::new(),
            polls: 0,
            published: Vec::new(),
        })))
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.0.borrow_mut().accepting = accepting;
    }

    /// Hold accepted connects open instead of answering straight away.
    pub fn set_deferred(&self, deferred: bool) {
        self.0.borrow_mut().deferred = deferred;
    }

    /// Complete a pending connect.
    pub fn answer(&self) {
        let mut s = self.0.borrow_mut();
        if s.pending {
            s.pending = false;
            s.connected = true;
        }
    }

    pub fn disconnects(&self) -> usize {
        self.0.borrow().disconnects
    }

    /// Kill the live session from the broker side.
    pub fn drop_session(&self) {
        self.0.borrow_mut().connected = false;
    }

    pub fn connect_attempts(&self) -> usize {
        self.0.borrow().client_ids.len()
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.0.borrow().client_ids.clone()
    }

    pub fn polls(&self) -> usize {
        self.0.borrow().polls
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.0.borrow().published.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.0
            .borrow()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl BrokerClient for SimBroker {
    fn connect(&mut self, client_id: &str) -> core::result::Result<(), BrokerError> {
        let mut s = self.0.borrow_mut();
        s.client_ids.push(client_id.to_owned());
        if !s.accepting {
            return Err(BrokerError::ConnectRefused);
        }
        if s.deferred {
            s.pending = true;
        } else {
            s.connected = true;
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut s = self.0.borrow_mut();
        s.disconnects += 1;
        s.pending = false;
        s.connected = false;
    }

    fn is_connected(&mut self) -> bool {
        self.0.borrow().connected
    }

    fn poll(&mut self) {
        self.0.borrow_mut().polls += 1;
    }

    fn publish(&mut self, topic: &str, payload: &str) -> core::result::Result<(), BrokerError> {
        let mut s = self.0.borrow_mut();
        if !s.connected {
            return Err(BrokerError::LivenessLost);
        }
        s.published.push((topic.to_owned(), payload.to_owned()));
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Console
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ConsoleState {
    input: VecDeque<u8>,
    output: Vec<String>,
}

/// Simulated serial console.
#[derive(Clone, Default)]
pub struct SimConsole(Rc<RefCell<ConsoleState>>);

impl SimConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if typed by the operator.
    pub fn feed(&self, bytes: &[u8]) {
        self.0.borrow_mut().input.extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<String> {
        self.0.borrow().output.clone()
    }

    pub fn clear_written(&self) {
        self.0.borrow_mut().output.clear();
    }
}

impl LineIo for SimConsole {
    fn read_byte(&mut self) -> Option<u8> {
        self.0.borrow_mut().input.pop_front()
    }

    fn write_line(&mut self, line: &str) {
        self.0.borrow_mut().output.push(line.to_owned());
    }
}
