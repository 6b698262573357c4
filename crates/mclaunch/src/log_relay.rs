//! Turns the game's raw console bytes into leveled log records.
//!
//! Both child streams share one OS pipe. A dedicated thread reads it line by
//! line and feeds a [`LineAssembler`], which recognizes the game's
//! `[HH:MM:SS] [thread/LEVEL]: text` layout and folds continuation lines
//! (stack traces) into the record they belong to.

use std::{
    io::{self, BufRead, BufReader, PipeReader, PipeWriter},
    process::Stdio,
    sync::{Arc, LazyLock, Mutex, mpsc},
    thread::JoinHandle,
    time::Duration,
};

use chrono::NaiveTime;
use mclaunch_types::{LogLevel, LogRecord, LogSource};
use regex::Regex;

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d{2}:\d{2}:\d{2})\] \[(.+?)/([A-Z]+)\]: (.*)$").expect("header pattern is valid")
});

pub trait LogSink: Send + Sync {
    fn emit(&self, record: LogRecord);
}

/// Forwards records as `tracing` events under the `minecraft` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

macro_rules! emit_at {
    ($target:literal, $record:expr) => {{
        let r = $record;
        let thread = r.thread_name.as_str();
        let source = r.source.as_str();
        match r.level {
            LogLevel::Critical | LogLevel::Error => {
                tracing::error!(target: $target, thread, source, "{}", r.message)
            }
            LogLevel::Warning => tracing::warn!(target: $target, thread, source, "{}", r.message),
            LogLevel::Info => tracing::info!(target: $target, thread, source, "{}", r.message),
            LogLevel::Debug => tracing::debug!(target: $target, thread, source, "{}", r.message),
        }
    }};
}

impl LogSink for TracingSink {
    fn emit(&self, record: LogRecord) {
        match record.source {
            LogSource::Game => emit_at!("minecraft", &record),
            LogSource::Native => emit_at!("minecraft::native", &record),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: LogRecord) {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).push(record);
    }
}

/// Line-to-record state machine. Pure; holds at most one pending record.
///
/// Continuation lines belong to the most recent header until the next one,
/// even after the pending record was flushed early.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Option<LogRecord>,
    last_header: Option<(String, LogLevel, Option<NaiveTime>)>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feeds one line (terminator optional) and returns the records it completed.
    pub fn push_line(&mut self, raw: &str) -> Vec<LogRecord> {
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(caps) = HEADER.captures(line) {
            let time = NaiveTime::parse_from_str(&caps[1], "%H:%M:%S").ok();
            let level = LogLevel::from_label(&caps[3]);
            let next = LogRecord::game(&caps[2], level, time, &caps[4]);
            self.last_header = Some((caps[2].to_string(), level, time));
            return self.pending.replace(next).into_iter().collect();
        }

        if let Some(record) = self.pending.as_mut() {
            record.message.push('\n');
            record.message.push_str(line);
            return Vec::new();
        }
        match &self.last_header {
            Some((thread, level, time)) => {
                self.pending = Some(LogRecord::game(thread, *level, *time, line));
                Vec::new()
            }
            None => vec![LogRecord::native(line)],
        }
    }

    pub fn flush(&mut self) -> Option<LogRecord> {
        self.pending.take()
    }
}

/// Owns the write end of the relay pipe until [`LogRelay::close`].
pub struct LogRelay {
    writer: PipeWriter,
    reader_thread: JoinHandle<()>,
}

impl LogRelay {
    /// Pending records are held until the next header or stream end.
    pub fn new(sink: Arc<dyn LogSink>) -> io::Result<Self> {
        Self::with_fold_idle(sink, None)
    }

    /// With `Some(idle)`, a pending record that has waited `idle` for
    /// continuation lines is emitted early. Lines that arrive later still
    /// carry the last header's thread and level.
    pub fn with_fold_idle(sink: Arc<dyn LogSink>, fold_idle: Option<Duration>) -> io::Result<Self> {
        let (reader, writer) = io::pipe()?;
        let reader_thread = std::thread::Builder::new()
            .name("log-relay".to_string())
            .spawn(move || relay_loop(reader, sink, fold_idle))?;
        Ok(Self { writer, reader_thread })
    }

    /// A fresh write end, e.g. for a child's stdout or stderr.
    pub fn writer(&self) -> io::Result<PipeWriter> {
        self.writer.try_clone()
    }

    /// Stdout and stderr handles for the child process.
    pub fn stdio(&self) -> io::Result<(Stdio, Stdio)> {
        Ok((Stdio::from(self.writer()?), Stdio::from(self.writer()?)))
    }

    /// Releases the relay's own write end. The reader drains until every
    /// other copy (the child's) is closed too.
    pub fn close(self) -> RelayJoin {
        drop(self.writer);
        RelayJoin {
            handle: self.reader_thread,
        }
    }
}

pub struct RelayJoin {
    handle: JoinHandle<()>,
}

impl RelayJoin {
    /// Blocks until every buffered line has been emitted.
    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::warn!("log relay thread panicked");
        }
    }

    pub async fn finished(self) {
        if tokio::task::spawn_blocking(move || self.join()).await.is_err() {
            tracing::warn!("log relay join task failed");
        }
    }
}

fn relay_loop(reader: PipeReader, sink: Arc<dyn LogSink>, fold_idle: Option<Duration>) {
    let (tx, rx) = mpsc::channel::<String>();

    // Blocking reads happen on their own thread so that an idle pending
    // record can still be flushed on time.
    let read_side = std::thread::Builder::new()
        .name("log-relay-read".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::with_capacity(256);
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "log relay read failed");
                        break;
                    }
                }
            }
        });
    if let Err(e) = read_side {
        tracing::error!(error = %e, "failed to start log relay reader");
        return;
    }

    let mut asm = LineAssembler::new();
    loop {
        let idle = fold_idle.filter(|_| asm.has_pending());
        let line = if let Some(idle) = idle {
            match rx.recv_timeout(idle) {
                Ok(line) => line,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if let Some(record) = asm.flush() {
                        sink.emit(record);
                    }
                    continue;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(line) => line,
                Err(_) => break,
            }
        };
        for record in asm.push_line(&line) {
            sink.emit(record);
        }
    }

    if let Some(record) = asm.flush() {
        sink.emit(record);
    }
}
