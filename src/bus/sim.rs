//! Host-side simulated I²C bus.
//!
//! Models the upstream multiplexer routing: a device attached behind an
//! upstream port acknowledges only while that port is selected.  Each
//! device answers reads with whatever was registered for the last command
//! byte written to it.  Handles are cheap clones of shared state so a
//! test can keep one while the arbiter owns another.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

/// Address the simulated multiplexer answers on.
pub const SIM_MUX_ADDRESS: u8 = 0x70;

/// `(upstream port, address)`; `None` is the root bus.
type Node = (Option<u8>, u8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimWrite {
    pub port: Option<u8>,
    pub address: u8,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    devices: HashSet<Node>,
    silenced: HashSet<u8>,
    responses: HashMap<(Node, u8), VecDeque<Vec<u8>>>,
    last_command: HashMap<Node, u8>,
    writes: Vec<SimWrite>,
    selected: Option<u8>,
}

impl State {
    fn resolve(&self, address: u8) -> Option<Node> {
        if self.silenced.contains(&address) {
            return None;
        }
        if let Some(port) = self.selected {
            if self.devices.contains(&(Some(port), address)) {
                return Some((Some(port), address));
            }
        }
        self.devices
            .contains(&(None, address))
            .then_some((None, address))
    }

    fn on_write(&mut self, node: Node, bytes: &[u8]) {
        self.writes.push(SimWrite {
            port: node.0,
            address: node.1,
            bytes: bytes.to_vec(),
        });
        if node == (None, SIM_MUX_ADDRESS) {
            if let Some(&mask) = bytes.first() {
                self.selected = (mask != 0).then(|| mask.trailing_zeros() as u8);
            }
        }
        if let Some(&command) = bytes.first() {
            self.last_command.insert(node, command);
        }
    }

    fn on_read(&mut self, node: Node, buf: &mut [u8]) {
        buf.fill(0);
        let Some(command) = self.last_command.get(&node).copied() else {
            return;
        };
        let Some(queue) = self.responses.get_mut(&(node, command)) else {
            return;
        };
        let data = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        if let Some(data) = data {
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
        }
    }
}

/// Error raised by [`SimBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError(pub ErrorKind);

impl embedded_hal::i2c::Error for SimError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Simulated bus handle.  See the module docs.
#[derive(Debug, Clone)]
pub struct SimBus {
    state: Rc<RefCell<State>>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// A bus with only the multiplexer present.
    pub fn new() -> Self {
        let sim = Self {
            state: Rc::default(),
        };
        sim.state
            .borrow_mut()
            .devices
            .insert((None, SIM_MUX_ADDRESS));
        sim
    }

    /// Place a device behind upstream `port`.
    pub fn attach(&self, address: u8, port: u8) {
        self.state.borrow_mut().devices.insert((Some(port), address));
    }

    /// Place a device on the root bus.
    pub fn attach_root(&self, address: u8) {
        self.state.borrow_mut().devices.insert((None, address));
    }

    /// Force an address to stop (or resume) acknowledging everywhere.
    pub fn set_present(&self, address: u8, present: bool) {
        let mut s = self.state.borrow_mut();
        if present {
            s.silenced.remove(&address);
        } else {
            s.silenced.insert(address);
        }
    }

    /// Queue a read response for `command` on the device at `address`
    /// behind `port`.  The last queued response repeats forever.
    pub fn respond_at(&self, port: u8, address: u8, command: u8, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .responses
            .entry(((Some(port), address), command))
            .or_default()
            .push_back(bytes.to_vec());
    }

    /// [`respond_at`](Self::respond_at) for a device attached on exactly
    /// one port (or the root bus).
    pub fn respond(&self, address: u8, command: u8, bytes: &[u8]) {
        let node = {
            let s = self.state.borrow();
            s.devices
                .iter()
                .find(|(_, a)| *a == address)
                .copied()
                .unwrap_or((None, address))
        };
        self.state
            .borrow_mut()
            .responses
            .entry((node, command))
            .or_default()
            .push_back(bytes.to_vec());
    }

    /// Drop queued responses for one command.
    pub fn clear_responses(&self, address: u8, command: u8) {
        self.state
            .borrow_mut()
            .responses
            .retain(|((_, a), c), _| !(*a == address && *c == command));
    }

    /// Currently selected upstream port.
    pub fn selected_port(&self) -> Option<u8> {
        self.state.borrow().selected
    }

    /// Every write made to `address`, on any port, oldest first.
    pub fn writes_to(&self, address: u8) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .writes
            .iter()
            .filter(|w| w.address == address && !w.bytes.is_empty())
            .map(|w| w.bytes.clone())
            .collect()
    }

    /// Every write made to `address` while behind `port`.
    pub fn writes_at(&self, port: u8, address: u8) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .writes
            .iter()
            .filter(|w| w.port == Some(port) && w.address == address && !w.bytes.is_empty())
            .map(|w| w.bytes.clone())
            .collect()
    }

    /// Full write log, including the zero-length probe writes.
    pub fn write_log(&self) -> Vec<SimWrite> {
        self.state.borrow().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.borrow_mut().writes.clear();
    }
}

impl ErrorType for SimBus {
    type Error = SimError;
}

impl I2c for SimBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), SimError> {
        let mut s = self.state.borrow_mut();
        let Some(node) = s.resolve(address) else {
            return Err(SimError(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)));
        };
        for op in operations {
            match op {
                Operation::Write(bytes) => s.on_write(node, bytes),
                Operation::Read(buf) => s.on_read(node, buf),
            }
        }
        Ok(())
    }
}
