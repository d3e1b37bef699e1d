//! In-memory stand-ins for hardware and remote services used by unit tests.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::chat::ChatBackend;
use crate::conversation::Message;
use crate::device::Transport;
use crate::error::{Error, Result};
use crate::listener::{Heard, Listener};
use crate::retrieval::Retriever;
use crate::speech::Speaker;

#[derive(Default)]
struct Wire {
    written: Vec<String>,
    write_attempts: usize,
    incoming: VecDeque<String>,
    replies: VecDeque<String>,
    fail_writes: bool,
    fail_reads: bool,
}

/// Serial wire that records frames and replays queued response lines.
#[derive(Clone, Default)]
pub struct FakeTransport {
    wire: Arc<Mutex<Wire>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }

    pub fn push_response(&self, line: &str) {
        self.wire.lock().unwrap().incoming.push_back(line.to_string());
    }

    /// Queues a line that becomes readable only after the next frame is written.
    pub fn reply_on_write(&self, line: &str) {
        self.wire.lock().unwrap().replies.push_back(line.to_string());
    }

    pub fn fail_writes(&self) {
        self.wire.lock().unwrap().fail_writes = true;
    }

    pub fn fail_reads(&self) {
        self.wire.lock().unwrap().fail_reads = true;
    }

    pub fn written(&self) -> Vec<String> {
        self.wire.lock().unwrap().written.clone()
    }

    pub fn write_attempts(&self) -> usize {
        self.wire.lock().unwrap().write_attempts
    }
}

impl Transport for FakeTransport {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut wire = self.wire.lock().unwrap();
        wire.write_attempts += 1;
        if wire.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        wire.written.push(String::from_utf8_lossy(frame).into_owned());
        if let Some(reply) = wire.replies.pop_front() {
            wire.incoming.push_back(reply);
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let wire = self.wire.lock().unwrap();
        if wire.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        Ok(wire.incoming.front().map_or(0, |line| line.len() + 1))
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut wire = self.wire.lock().unwrap();
        if wire.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        Ok(wire.incoming.pop_front().map(|line| line + "\n").unwrap_or_default())
    }
}

/// Speaker that records every line instead of playing it.
#[derive(Clone, Default)]
pub struct RecordingSpeaker {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn Speaker> {
        Box::new(self.clone())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Speaker for RecordingSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.lines.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Listener that replays a fixed script, then closes (or hangs forever).
pub struct ScriptedListener {
    script: VecDeque<Heard>,
    hang_when_done: bool,
    fail: bool,
    attempts: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
}

impl ScriptedListener {
    pub fn new<I, S>(utterances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: utterances
                .into_iter()
                .map(|u| Heard::Utterance(u.into()))
                .collect(),
            hang_when_done: false,
            fail: false,
            attempts: Arc::default(),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A listener that never produces anything.
    pub fn hanging() -> Self {
        let mut listener = Self::new(Vec::<String>::new());
        listener.hang_when_done = true;
        listener
    }

    /// A listener whose every call fails immediately, like a missing microphone.
    pub fn failing() -> Self {
        let mut listener = Self::new(Vec::<String>::new());
        listener.fail = true;
        listener
    }

    /// Number of `listen` calls made so far.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }

    pub fn stopped_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }
}

#[async_trait]
impl Listener for ScriptedListener {
    async fn listen(&mut self) -> Result<Heard> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Audio("no input device".into()));
        }
        match self.script.pop_front() {
            Some(heard) => Ok(heard),
            None if self.hang_when_done => std::future::pending().await,
            None => Ok(Heard::Closed),
        }
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Backend returning a fixed reply (or failing) and recording each window.
#[derive(Clone)]
pub struct StaticBackend {
    reply: Option<String>,
    windows: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl StaticBackend {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            windows: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            windows: Arc::default(),
        }
    }

    pub fn windows(&self) -> Vec<Vec<Message>> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for StaticBackend {
    async fn send(&self, window: &[Message]) -> Result<String> {
        self.windows.lock().unwrap().push(window.to_vec());
        self.reply.clone().ok_or(Error::BackendStatus(503))
    }
}

/// Retriever returning a fixed snippet.
pub struct StaticRetriever(pub Option<String>);

#[async_trait]
impl Retriever for StaticRetriever {
    async fn lookup(&self, _query: &str) -> Option<String> {
        self.0.clone()
    }
}
