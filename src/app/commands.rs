//! Operator command channel on the serial console.
//!
//! Requests are single lines of the form `<index>#<value>`:
//!
//! | Index | Meaning                 | Reply / effect                   |
//! |-------|-------------------------|----------------------------------|
//! | `0`   | identify                | `0#<deviceId>`                   |
//! | `3`   | stirrer setpoint (rpm)  | `SerialSetpoint` event, 0–65535  |
//!
//! Anything else is ignored.  Readings flow the other way as
//! `<index>#<value>` lines written by the event log.

use heapless::Vec as LineBuf;
use log::{debug, warn};

use crate::app::ports::LineIo;
use crate::events::{Event, EventHandler, EventKind, Payload};
use crate::scheduler::{Context, Task};

pub const LINE_CAPACITY: usize = 256;

pub const INDEX_IDENTIFY: i64 = 0;
pub const INDEX_SETPOINT: i64 = 3;

/// A recognised request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Identify,
    Setpoint(u16),
}

/// Leading integer of `text`, ignoring surrounding whitespace.  Trailing
/// garbage ends the number; no digits at all reads as zero.
fn leading_int(text: &str) -> i64 {
    let text = text.trim();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text.strip_prefix('+').unwrap_or(text)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map_or(0, |v| sign * v)
}

/// Leading decimal number of `text`; zero if there is none.
fn leading_float(text: &str) -> f64 {
    let text = text.trim();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        let ok = c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) || (c == '.' && !seen_dot);
        if !ok {
            break;
        }
        seen_dot |= c == '.';
        end = i + c.len_utf8();
    }
    text[..end].parse::<f64>().unwrap_or(0.0)
}

/// Parse one request line.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (index, value) = match line.split_once('#') {
        Some((i, v)) => (leading_int(i), leading_float(v)),
        None => (leading_int(line), leading_float(line)),
    };
    match index {
        INDEX_IDENTIFY => Some(Command::Identify),
        INDEX_SETPOINT if (0.0..=f64::from(u16::MAX)).contains(&value) => Some(Command::Setpoint(value as u16)),
        _ => None,
    }
}

pub struct SerialCommandTask<S> {
    io: S,
    device_id: String,
    line: LineBuf<u8, LINE_CAPACITY>,
    overflowed: bool,
}

impl<S: LineIo> SerialCommandTask<S> {
    pub fn new(io: S, device_id: impl Into<String>) -> Self {
        Self {
            io,
            device_id: device_id.into(),
            line: LineBuf::new(),
            overflowed: false,
        }
    }

    fn execute(&mut self, ctx: &mut Context<'_>) {
        let Ok(text) = core::str::from_utf8(&self.line) else {
            warn!("Command: discarding non-UTF-8 line");
            return;
        };
        match parse(text) {
            Some(Command::Identify) => {
                let reply = format!("0#{}", self.device_id);
                self.io.write_line(&reply);
            }
            Some(Command::Setpoint(rpm)) => {
                debug!("Command: setpoint {} rpm", rpm);
                ctx.dispatch(EventKind::SerialSetpoint, Payload::Unsigned(u32::from(rpm)));
            }
            None => debug!("Command: ignored '{}'", text.trim_end()),
        }
    }
}

impl<S: LineIo> EventHandler for SerialCommandTask<S> {
    fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
}

impl<S: LineIo> Task for SerialCommandTask<S> {
    fn name(&self) -> &'static str {
        "Command"
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> bool {
        self.line.clear();
        self.overflowed = false;
        true
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        while let Some(byte) = self.io.read_byte() {
            if byte == b'\n' {
                if self.overflowed {
                    warn!("Command: line longer than {} bytes discarded", LINE_CAPACITY);
                } else {
                    self.execute(ctx);
                }
                self.line.clear();
                self.overflowed = false;
            } else if !self.overflowed && self.line.push(byte).is_err() {
                self.overflowed = true;
            }
        }
    }
}
