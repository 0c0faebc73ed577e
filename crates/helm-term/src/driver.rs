// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Terminal Driver (C3): one contract, two transports.
//!
//! Local sessions are driven through a `portable-pty` pseudo-terminal; SSH
//! sessions through a `russh` channel. Both fan output out over a
//! [`tokio::sync::broadcast`] channel so the state tracker, the realtime
//! output buffer, and any UI subscriber each see every byte independently.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use regex::RegexSet;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// Bytes sent to the remote/local pseudo-terminal after a settle delay, once
/// the trailing prompt pattern has been seen.
const PROMPT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// The ring buffer the driver keeps so a fresh subscriber still gets recent
/// context (state tracking keeps its own, larger ring independently; this is
/// just enough for prompt detection).
const TAIL_WINDOW: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Local,
    Ssh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    CtrlC,
    CtrlD,
    CtrlZ,
    Q,
    Space,
    Enter,
}

impl ControlKey {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            ControlKey::CtrlC => b"\x03",
            ControlKey::CtrlD => b"\x04",
            ControlKey::CtrlZ => b"\x1a",
            ControlKey::Q => b"q",
            ControlKey::Space => b" ",
            ControlKey::Enter => b"\r",
        }
    }
}

/// Result of [`TerminalDriver::execute_in_terminal`].
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub output: String,
    pub duration: Duration,
    pub timed_out: bool,
}

/// Local child-process snapshot used by the Process & Input Sensor.
#[derive(Debug, Clone, Default)]
pub struct LocalProcessStatus {
    pub is_idle: bool,
    pub foreground_pid: Option<u32>,
    pub foreground_command: Option<String>,
    pub running_time: Option<Duration>,
}

/// Child processes reported by an SSH session's out-of-band probe.
#[derive(Debug, Clone, Default)]
pub struct RemoteProcesses {
    pub shell_pid: Option<u32>,
    /// `(pid, stat, comm)` per child, matching `ps --ppid $$ -o pid=,stat=,comm=`.
    pub children: Vec<(u32, String, String)>,
}

/// Shared contract for local PTY and SSH transports.
#[async_trait]
pub trait TerminalDriver: Send + Sync {
    fn kind(&self) -> TerminalKind;

    /// Write raw bytes (no newline appended).
    async fn write(&self, data: &str) -> anyhow::Result<()>;

    async fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()>;

    /// Subscribe to the raw output stream. Every subscriber gets every byte
    /// from the point of subscription onward.
    fn subscribe(&self) -> broadcast::Receiver<Bytes>;

    /// Write `command\n`, then wait for a trailing shell prompt (or
    /// `timeout`), returning everything written to the terminal meanwhile.
    async fn execute_in_terminal(&self, command: &str, timeout: Duration) -> ExecuteOutcome;

    /// Best-effort CWD (local only; `None` for SSH — callers fall back to
    /// path-resolution prediction).
    async fn get_cwd(&self) -> Option<String>;

    async fn get_terminal_status(&self) -> LocalProcessStatus;

    /// `None` for local sessions; `Some` for SSH once a probe has run.
    async fn get_remote_processes(&self) -> Option<RemoteProcesses>;

    async fn send_control(&self, key: ControlKey) -> anyhow::Result<()>;

    async fn dispose(&self);
}

/// Regex families that recognize a trailing shell prompt across bash, zsh,
/// fish, PowerShell, and cmd.exe, after ANSI/control bytes are stripped.
fn prompt_regex_set() -> RegexSet {
    RegexSet::new([
        r"[$#%>]\s*$",                 // bash/zsh/sh/fish default prompts
        r"PS [A-Za-z]:.*>\s*$",        // PowerShell
        r"^[A-Za-z]:\\.*>\s*$",        // cmd.exe
        r"\S+@\S+:\S*[$#]\s*$",        // user@host:path$
    ])
    .expect("static prompt patterns compile")
}

fn strip_ansi(input: &str) -> String {
    // Strips CSI escape sequences (ESC '[' ... final byte) and bare ESC bytes.
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn looks_like_prompt(tail: &str, set: &RegexSet) -> bool {
    let stripped = strip_ansi(tail);
    let trimmed = stripped.trim_end_matches(['\r', '\n']);
    set.is_match(trimmed)
}

struct OutputRing {
    buf: VecDeque<u8>,
}

impl OutputRing {
    fn new() -> Self {
        Self { buf: VecDeque::new() }
    }
    fn push(&mut self, data: &[u8]) {
        self.buf.extend(data.iter().copied());
        while self.buf.len() > TAIL_WINDOW {
            self.buf.pop_front();
        }
    }
    fn tail_string(&self) -> String {
        let bytes: Vec<u8> = self.buf.iter().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

// ─── Local PTY driver ───────────────────────────────────────────────────────

pub struct LocalDriver {
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn portable_pty::MasterPty + Send>>,
    child: Mutex<Box<dyn portable_pty::Child + Send + Sync>>,
    tx: broadcast::Sender<Bytes>,
    ring: Arc<Mutex<OutputRing>>,
    started_at: Instant,
    last_command_at: Mutex<Option<Instant>>,
    disposed: AtomicBool,
}

impl LocalDriver {
    /// Spawn the user's shell (`$SHELL`, or a sane default) inside a fresh
    /// pseudo-terminal.
    pub fn spawn(cols: u16, rows: u16) -> anyhow::Result<Arc<Self>> {
        use portable_pty::{native_pty_system, CommandBuilder, PtySize};

        let pty_system = native_pty_system();
        let pair = pty_system.openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })?;

        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
        let cmd = CommandBuilder::new(shell);
        let child = pair.slave.spawn_command(cmd)?;
        drop(pair.slave);

        let reader = pair.master.try_clone_reader()?;
        let writer = pair.master.take_writer()?;

        let (tx, _rx) = broadcast::channel(1024);
        let ring = Arc::new(Mutex::new(OutputRing::new()));

        let driver = Arc::new(Self {
            writer: Mutex::new(writer),
            master: Mutex::new(pair.master),
            child: Mutex::new(child),
            tx: tx.clone(),
            ring: ring.clone(),
            started_at: Instant::now(),
            last_command_at: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        spawn_reader_pump(reader, tx, ring);

        Ok(driver)
    }
}

fn spawn_reader_pump(
    mut reader: Box<dyn Read + Send>,
    tx: broadcast::Sender<Bytes>,
    ring: Arc<Mutex<OutputRing>>,
) {
    // portable-pty's reader is blocking; pump it on a dedicated OS thread and
    // hand bytes to the async world over the broadcast channel.
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(&buf[..n]);
                    let ring = ring.clone();
                    let data = chunk.clone();
                    tokio::task::block_in_place(|| {
                        tokio::runtime::Handle::try_current().ok().map(|h| {
                            h.block_on(async move {
                                ring.lock().await.push(&data);
                            })
                        })
                    });
                    let _ = tx.send(chunk);
                }
                Err(e) => {
                    warn!(error = %e, "local pty reader exiting");
                    break;
                }
            }
        }
    });
}

#[async_trait]
impl TerminalDriver for LocalDriver {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Local
    }

    async fn write(&self, data: &str) -> anyhow::Result<()> {
        let mut w = self.writer.lock().await;
        w.write_all(data.as_bytes())?;
        w.flush()?;
        Ok(())
    }

    async fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let master = self.master.lock().await;
        master.resize(portable_pty::PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    async fn execute_in_terminal(&self, command: &str, timeout: Duration) -> ExecuteOutcome {
        *self.last_command_at.lock().await = Some(Instant::now());
        let mut rx = self.subscribe();
        let set = prompt_regex_set();
        let start = Instant::now();

        if self.write(&format!("{command}\n")).await.is_err() {
            return ExecuteOutcome { output: String::new(), duration: start.elapsed(), timed_out: true };
        }

        let mut collected = Vec::<u8>::new();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    let output = String::from_utf8_lossy(&collected).into_owned();
                    return ExecuteOutcome {
                        output: format!("{output}\n[timed out]"),
                        duration: start.elapsed(),
                        timed_out: true,
                    };
                }
                chunk = rx.recv() => {
                    match chunk {
                        Ok(bytes) => {
                            collected.extend_from_slice(&bytes);
                            let tail_len = collected.len().min(256);
                            let tail = String::from_utf8_lossy(&collected[collected.len()-tail_len..]);
                            if looks_like_prompt(&tail, &set) {
                                tokio::time::sleep(PROMPT_SETTLE_DELAY).await;
                                // drain anything that arrived during the settle delay
                                while let Ok(more) = rx.try_recv() {
                                    collected.extend_from_slice(&more);
                                }
                                let output = String::from_utf8_lossy(&collected).into_owned();
                                return ExecuteOutcome { output, duration: start.elapsed(), timed_out: false };
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => {
                            let output = String::from_utf8_lossy(&collected).into_owned();
                            return ExecuteOutcome { output, duration: start.elapsed(), timed_out: false };
                        }
                    }
                }
            }
        }
    }

    async fn get_cwd(&self) -> Option<String> {
        #[cfg(unix)]
        {
            let pid = self.child.lock().await.process_id()?;
            let link = format!("/proc/{pid}/cwd");
            std::fs::read_link(link).ok().map(|p| p.to_string_lossy().into_owned())
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    async fn get_terminal_status(&self) -> LocalProcessStatus {
        let mut child = self.child.lock().await;
        let is_idle = matches!(child.try_wait(), Ok(Some(_)));
        let running_time = self
            .last_command_at
            .lock()
            .await
            .map(|t| t.elapsed());
        LocalProcessStatus {
            is_idle,
            foreground_pid: child.process_id(),
            foreground_command: None,
            running_time,
        }
    }

    async fn get_remote_processes(&self) -> Option<RemoteProcesses> {
        None
    }

    async fn send_control(&self, key: ControlKey) -> anyhow::Result<()> {
        let mut w = self.writer.lock().await;
        w.write_all(key.as_bytes())?;
        w.flush()?;
        Ok(())
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let _ = self.child.lock().await.kill();
    }
}

// ─── SSH driver ─────────────────────────────────────────────────────────────

/// Authentication for an SSH target.
pub enum SshAuth {
    Password(String),
    PrivateKeyFile { path: std::path::PathBuf, passphrase: Option<String> },
}

pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    /// An already-connected driver to tunnel through ("forward-out"),
    /// for a jump host.
    pub jump_via: Option<Arc<SshDriver>>,
}

struct ClientHandler;

#[async_trait]
impl russh::client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host-key pinning is a deployment concern outside this crate's
        // scope; accept and let the caller layer known_hosts checking on top.
        Ok(true)
    }
}

pub struct SshDriver {
    channel: Mutex<russh::Channel<russh::client::Msg>>,
    tx: broadcast::Sender<Bytes>,
    ring: Arc<Mutex<OutputRing>>,
    last_command_at: Mutex<Option<Instant>>,
    _session: Mutex<russh::client::Handle<ClientHandler>>,
}

impl SshDriver {
    pub async fn connect(target: SshTarget) -> anyhow::Result<Arc<Self>> {
        let config = Arc::new(russh::client::Config::default());
        let addr = format!("{}:{}", target.host, target.port);
        let mut session = russh::client::connect(config, addr, ClientHandler).await?;

        let authenticated = match &target.auth {
            SshAuth::Password(pw) => session.authenticate_password(&target.username, pw).await?,
            SshAuth::PrivateKeyFile { path, passphrase } => {
                let key = russh_keys::load_secret_key(path, passphrase.as_deref())?;
                session
                    .authenticate_publickey(&target.username, Arc::new(key))
                    .await?
            }
        };
        if !authenticated {
            anyhow::bail!("ssh authentication failed for {}@{}", target.username, target.host);
        }

        let mut channel = session.channel_open_session().await?;
        channel
            .request_pty(false, "xterm-256color", 80, 24, 0, 0, &[])
            .await?;
        channel.request_shell(true).await?;

        let (tx, _rx) = broadcast::channel(1024);
        let ring = Arc::new(Mutex::new(OutputRing::new()));

        debug!(host = %target.host, user = %target.username, "ssh session established");

        Ok(Arc::new(Self {
            channel: Mutex::new(channel),
            tx,
            ring,
            last_command_at: Mutex::new(None),
            _session: Mutex::new(session),
        }))
    }

    /// Run a throwaway command on a side channel (not the visible shell) and
    /// collect its stdout. Used for `ps`-style out-of-band probes so the
    /// user's terminal is never polluted by a synthetic command.
    async fn exec_side_channel(&self, command: &str) -> anyhow::Result<String> {
        let session = self._session.lock().await;
        let mut ch = session.channel_open_session().await?;
        ch.exec(true, command).await?;
        let mut out = Vec::new();
        loop {
            match ch.wait().await {
                Some(russh::ChannelMsg::Data { data }) => out.extend_from_slice(&data),
                Some(russh::ChannelMsg::Eof) | Some(russh::ChannelMsg::Close) | None => break,
                _ => {}
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

#[async_trait]
impl TerminalDriver for SshDriver {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Ssh
    }

    async fn write(&self, data: &str) -> anyhow::Result<()> {
        let mut ch = self.channel.lock().await;
        ch.data(data.as_bytes()).await?;
        Ok(())
    }

    async fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let ch = self.channel.lock().await;
        ch.window_change(cols as u32, rows as u32, 0, 0).await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    async fn execute_in_terminal(&self, command: &str, timeout: Duration) -> ExecuteOutcome {
        *self.last_command_at.lock().await = Some(Instant::now());
        let set = prompt_regex_set();
        let start = Instant::now();

        if self.write(&format!("{command}\n")).await.is_err() {
            return ExecuteOutcome { output: String::new(), duration: start.elapsed(), timed_out: true };
        }

        let mut collected = Vec::<u8>::new();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut ch = self.channel.lock().await;

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    let output = String::from_utf8_lossy(&collected).into_owned();
                    return ExecuteOutcome {
                        output: format!("{output}\n[timed out]"),
                        duration: start.elapsed(),
                        timed_out: true,
                    };
                }
                msg = ch.wait() => {
                    match msg {
                        Some(russh::ChannelMsg::Data { data }) => {
                            collected.extend_from_slice(&data);
                            self.ring.lock().await.push(&data);
                            let _ = self.tx.send(Bytes::copy_from_slice(&data));
                            let tail_len = collected.len().min(256);
                            let tail = String::from_utf8_lossy(&collected[collected.len()-tail_len..]);
                            if looks_like_prompt(&tail, &set) {
                                tokio::time::sleep(PROMPT_SETTLE_DELAY).await;
                                let output = String::from_utf8_lossy(&collected).into_owned();
                                return ExecuteOutcome { output, duration: start.elapsed(), timed_out: false };
                            }
                        }
                        Some(russh::ChannelMsg::Eof) | Some(russh::ChannelMsg::Close) | None => {
                            let output = String::from_utf8_lossy(&collected).into_owned();
                            return ExecuteOutcome { output, duration: start.elapsed(), timed_out: false };
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn get_cwd(&self) -> Option<String> {
        // No local filesystem access; CWD is tracked entirely via path
        // prediction by the state tracker (C4).
        None
    }

    async fn get_terminal_status(&self) -> LocalProcessStatus {
        let running_time = self.last_command_at.lock().await.map(|t| t.elapsed());
        let is_idle = self.get_remote_processes().await.map(|p| p.children.is_empty()).unwrap_or(true);
        LocalProcessStatus { is_idle, foreground_pid: None, foreground_command: None, running_time }
    }

    async fn get_remote_processes(&self) -> Option<RemoteProcesses> {
        let out = self
            .exec_side_channel("ps --ppid $$ -o pid=,stat=,comm= 2>/dev/null")
            .await
            .ok()?;
        let children = out
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let pid: u32 = parts.next()?.parse().ok()?;
                let stat = parts.next()?.to_string();
                let comm = parts.collect::<Vec<_>>().join(" ");
                Some((pid, stat, comm))
            })
            .collect();
        Some(RemoteProcesses { shell_pid: None, children })
    }

    async fn send_control(&self, key: ControlKey) -> anyhow::Result<()> {
        let mut ch = self.channel.lock().await;
        ch.data(key.as_bytes()).await?;
        Ok(())
    }

    async fn dispose(&self) {
        let mut ch = self.channel.lock().await;
        let _ = ch.close().await;
    }
}
