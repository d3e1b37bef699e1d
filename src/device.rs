/*
 * @file device.rs
 * @brief Serial controller board link for JASP
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Serial command link to the lab controller board.
//!
//! The board speaks one JSON object per line in both directions. Every
//! operation here is fail-open: a missing or lost board moves the link to
//! [`ConnectionState::Disconnected`] and the caller keeps running.

use std::io::{self, BufRead, BufReader, Write};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Map, Value};
use serialport::{SerialPort, SerialPortType};

use crate::error::{Error, Result};

/// Default baud rate used by the controller sketches.
pub const DEFAULT_BAUD: u32 = 9600;

/// Time to let the board reboot after the port is opened (DTR reset).
///
/// Most Arduino-class boards restart when the host opens the port and drop
/// anything written during the bootloader window.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Descriptor fragments that identify typical controller boards and USB bridges.
pub const DEFAULT_PORT_KEYWORDS: &[&str] = &["arduino", "ch340", "usb-serial", "cp210"];

/// Per-read timeout on the underlying port so a silent board never blocks.
const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Sleep between availability checks while waiting for a response.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Upper bound on stale lines dropped before a request, for chatty boards.
const MAX_DISCARDED_LINES: usize = 64;

/// Connection lifecycle of a [`DeviceLink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No open has been attempted yet.
    Unattempted,
    /// A transport is attached and usable.
    Connected,
    /// Open failed, an I/O error occurred, or the link was closed.
    Disconnected,
}

/// One command frame sent to the board.
///
/// # Details
/// Serializes to `{"cmd": <string>, "value": <any|null>}` followed by a newline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceCommand {
    /// Command name understood by the firmware (e.g. `led_on`).
    pub cmd: String,
    /// Optional argument; `null` when absent.
    pub value: Value,
}

impl DeviceCommand {
    /// Creates a command carrying a value.
    pub fn new(cmd: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            cmd: cmd.into(),
            value: value.into(),
        }
    }

    /// Creates a command whose value is `null`.
    pub fn bare(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            value: Value::Null,
        }
    }

    /// Renders the newline-terminated text frame written to the wire.
    ///
    /// # Errors
    /// Returns an error if the value cannot be serialized.
    pub fn to_frame(&self) -> Result<String> {
        let mut frame = serde_json::to_string(self)?;
        frame.push('\n');
        Ok(frame)
    }
}

/// Parsed content of one line received from the board.
///
/// # Details
/// A line that is not a JSON object is not a protocol error: it is kept
/// verbatim as [`DeviceResponse::Raw`] so callers can still surface it.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceResponse {
    /// The line parsed as a JSON object.
    Structured(Map<String, Value>),
    /// Anything else, kept as received (trimmed).
    Raw(String),
}

impl DeviceResponse {
    /// Parses one received line, falling back to the raw text.
    pub fn parse(line: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => Self::Structured(map),
            _ => Self::Raw(line.to_string()),
        }
    }

    /// Looks up a field of a structured response.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Structured(map) => map.get(key),
            Self::Raw(_) => None,
        }
    }

    /// Returns the JSON form, wrapping raw text as `{"raw": <line>}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Structured(map) => Value::Object(map.clone()),
            Self::Raw(line) => json!({ "raw": line }),
        }
    }
}

/// Line-delimited byte transport beneath a [`DeviceLink`].
///
/// # Details
/// Implemented by [`SerialTransport`] for real hardware; tests plug in an
/// in-memory wire.
pub trait Transport: Send {
    /// Writes one complete frame and flushes it.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Reads one line (without guaranteeing the trailing newline).
    fn read_line(&mut self) -> io::Result<String>;
}

/// [`Transport`] over a `serialport` device.
pub struct SerialTransport {
    port: BufReader<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Opens a serial port with the specified path and baud rate.
    ///
    /// # Arguments
    /// * `path` - The device path (e.g., "/dev/ttyUSB0" or "COM3").
    /// * `baud` - The baud rate (e.g., 9600).
    ///
    /// # Errors
    /// Returns an error if the port cannot be opened at the given path and baud.
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud).timeout(SERIAL_TIMEOUT).open()?;
        Ok(Self {
            port: BufReader::new(port),
        })
    }
}

impl Transport for SerialTransport {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let port = self.port.get_mut();
        port.write_all(frame)?;
        port.flush()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let buffered = self.port.buffer().len();
        let pending = self.port.get_ref().bytes_to_read().map_err(io::Error::from)?;
        Ok(buffered + pending as usize)
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut raw = Vec::new();
        match self.port.read_until(b'\n', &mut raw) {
            Ok(_) => {}
            // A partial line at the port timeout is still a line.
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
            Err(err) => return Err(err),
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

/// A serial device visible to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Path or name used to open the port.
    pub name: String,
    /// Human-readable descriptor text (manufacturer and product).
    pub description: String,
}

/// Decides whether a port descriptor belongs to a controller board.
pub trait PortMatcher {
    /// Returns `true` when the descriptor text identifies a usable board.
    fn matches(&self, descriptor: &str) -> bool;
}

impl<F> PortMatcher for F
where
    F: Fn(&str) -> bool,
{
    fn matches(&self, descriptor: &str) -> bool {
        self(descriptor)
    }
}

/// Case-insensitive substring allow-list.
#[derive(Clone, Debug)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    /// Builds a matcher from descriptor fragments.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_KEYWORDS)
    }
}

impl PortMatcher for KeywordMatcher {
    fn matches(&self, descriptor: &str) -> bool {
        let descriptor = descriptor.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| descriptor.contains(keyword.as_str()))
    }
}

/// Enumerates serial devices on this host.
///
/// # Details
/// Enumeration failures are logged and reported as an empty list.
pub fn available_ports() -> Vec<PortDescriptor> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|info| PortDescriptor {
                description: describe_port(&info.port_type),
                name: info.port_name,
            })
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "serial port enumeration failed");
            Vec::new()
        }
    }
}

/// Builds descriptor text from the port metadata.
fn describe_port(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => [usb.manufacturer.as_deref(), usb.product.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Picks the first port whose descriptor (or name) the matcher accepts.
///
/// # Arguments
/// * `ports` - Candidate ports, in enumeration order.
/// * `matcher` - The allow-list deciding which ports belong to a board.
///
/// # Returns
/// * `Some(name)` - Path of the first matching port.
/// * `None` - No port matched (including an empty list).
pub fn discover(ports: &[PortDescriptor], matcher: &dyn PortMatcher) -> Option<String> {
    ports
        .iter()
        .find(|port| matcher.matches(&port.description) || matcher.matches(&port.name))
        .map(|port| port.name.clone())
}

/// Owns the connection to the controller board.
///
/// # Details
/// The link is the single source of truth for hardware availability:
/// handlers consult [`DeviceLink::is_connected`] before acting. Any I/O
/// failure drops the transport and the link stays disconnected until an
/// explicit [`DeviceLink::connect`] or [`DeviceLink::open`].
pub struct DeviceLink {
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    port: Option<String>,
    last_error: Option<String>,
    settle: Duration,
}

impl Default for DeviceLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLink {
    /// Creates an unattempted link.
    pub fn new() -> Self {
        Self {
            transport: None,
            state: ConnectionState::Unattempted,
            port: None,
            last_error: None,
            settle: SETTLE_DELAY,
        }
    }

    /// Overrides the post-open settle delay.
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `true` only while a transport is attached and healthy.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Port the link was last attached to.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Cause of the most recent failure, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Probes for a board and opens it.
    ///
    /// # Details
    /// Uses `explicit` when given, otherwise runs discovery over the host's
    /// serial devices with `matcher`. This is also the only way back to
    /// `Connected` after a failure.
    ///
    /// # Arguments
    /// * `explicit` - A configured port path that bypasses discovery.
    /// * `baud` - The baud rate to open with.
    /// * `matcher` - Descriptor matcher used for discovery.
    ///
    /// # Returns
    /// * `ConnectionState` - The resulting state; never an error.
    pub fn connect(
        &mut self,
        explicit: Option<&str>,
        baud: u32,
        matcher: &dyn PortMatcher,
    ) -> ConnectionState {
        let port = match explicit {
            Some(path) => Some(path.to_string()),
            None => discover(&available_ports(), matcher),
        };
        match port {
            Some(path) => self.open(&path, baud),
            None => {
                self.fail(Error::NoDevice.to_string());
                tracing::warn!("no controller board found, continuing without hardware");
                self.state
            }
        }
    }

    /// Opens `port` and waits for the board to settle.
    ///
    /// # Returns
    /// * `ConnectionState::Connected` - The port is open.
    /// * `ConnectionState::Disconnected` - Opening failed; the cause is kept
    ///   in [`DeviceLink::last_error`].
    pub fn open(&mut self, port: &str, baud: u32) -> ConnectionState {
        match SerialTransport::open(port, baud) {
            Ok(transport) => {
                std::thread::sleep(self.settle);
                self.attach(port, Box::new(transport));
                tracing::info!(port, baud, "connected to controller board");
            }
            Err(err) => {
                tracing::warn!(port, error = %err, "controller board not connected");
                self.fail(format!("open {port}: {err}"));
            }
        }
        self.state
    }

    /// Attaches an already-open transport and marks the link connected.
    pub fn attach(&mut self, port: impl Into<String>, transport: Box<dyn Transport>) -> ConnectionState {
        self.transport = Some(transport);
        self.port = Some(port.into());
        self.last_error = None;
        self.state = ConnectionState::Connected;
        self.state
    }

    /// Sends one command frame.
    ///
    /// # Details
    /// No-ops when not connected. A failed write disconnects the link.
    ///
    /// # Arguments
    /// * `command` - The command to serialize and write.
    ///
    /// # Returns
    /// * `bool` - `true` when the frame was written.
    pub fn send(&mut self, command: &DeviceCommand) -> bool {
        if !self.is_connected() {
            tracing::debug!(cmd = %command.cmd, "device not connected, dropping command");
            return false;
        }
        let frame = match command.to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(cmd = %command.cmd, error = %err, "command could not be serialized");
                return false;
            }
        };
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        let written = transport.write_frame(frame.as_bytes());
        match written {
            Ok(()) => {
                tracing::debug!(frame = frame.trim_end(), "frame sent");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "serial write failed, disconnecting");
                self.fail(format!("write: {err}"));
                false
            }
        }
    }

    /// Waits up to `timeout` for one response line.
    ///
    /// # Details
    /// Polls for available bytes instead of blocking on the read, so a
    /// silent board costs at most `timeout`. Read errors disconnect the link.
    ///
    /// # Returns
    /// * `Some(DeviceResponse)` - A non-empty line arrived.
    /// * `None` - Not connected, nothing arrived in time, or I/O failed.
    pub fn receive(&mut self, timeout: Duration) -> Option<DeviceResponse> {
        if !self.is_connected() {
            return None;
        }
        let polled = match self.transport.as_mut() {
            Some(transport) => poll_line(transport.as_mut(), timeout),
            None => return None,
        };
        match polled {
            Ok(Some(line)) => {
                let response = DeviceResponse::parse(&line);
                if let DeviceResponse::Raw(raw) = &response {
                    tracing::debug!(line = %raw, "non-JSON response from board");
                }
                Some(response)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "serial read failed, disconnecting");
                self.fail(format!("read: {err}"));
                None
            }
        }
    }

    /// Drops lines the board sent before the next request (boot banner, acks).
    ///
    /// # Details
    /// Never waits: only bytes already available are read, up to
    /// `MAX_DISCARDED_LINES`. Read errors disconnect the link.
    ///
    /// # Returns
    /// * `usize` - Number of lines thrown away.
    pub fn discard_input(&mut self) -> usize {
        if !self.is_connected() {
            return 0;
        }
        let Some(transport) = self.transport.as_mut() else {
            return 0;
        };
        let mut discarded = 0;
        let drained = loop {
            if discarded >= MAX_DISCARDED_LINES {
                break Ok(());
            }
            match transport.bytes_available() {
                Ok(0) => break Ok(()),
                Ok(_) => {}
                Err(err) => break Err(err),
            }
            match transport.read_line() {
                Ok(line) => {
                    tracing::debug!(line = line.trim_end(), "discarding stale input");
                    discarded += 1;
                }
                Err(err) => break Err(err),
            }
        };
        if let Err(err) = drained {
            tracing::warn!(error = %err, "serial read failed, disconnecting");
            self.fail(format!("read: {err}"));
        }
        discarded
    }

    /// Releases the transport. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            tracing::info!(port = ?self.port, "closed controller link");
        }
        self.state = ConnectionState::Disconnected;
    }

    fn fail(&mut self, cause: String) {
        self.transport = None;
        self.state = ConnectionState::Disconnected;
        self.last_error = Some(cause);
    }
}

/// Polls `transport` until a line is available or `timeout` passes.
fn poll_line(transport: &mut dyn Transport, timeout: Duration) -> io::Result<Option<String>> {
    let deadline = Instant::now() + timeout;
    while transport.bytes_available()? == 0 {
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
    let line = transport.read_line()?;
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(line.to_string()))
}
