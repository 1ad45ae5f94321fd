//! Connection supervisor for a device daemon.
//!
//! A [`DeviceLink`] owns the full lifecycle of one daemon connection:
//! dialing the control and data sockets, spawning per-connection
//! reader tasks, pumping the liveness watchdog, applying the
//! disconnected-time command policy, and sequencing supervised
//! restarts when the stream goes bad.
//!
//! Failure never reaches the caller as an error. Transient socket
//! loss becomes a scheduled reconnect; fatal framing and watchdog
//! expiry become a daemon restart; everything is observable through
//! [`LinkEvent`]s on the subscriber channel.
//!
//! ## Generations
//!
//! Every successful connect bumps a generation counter, and each
//! reader task carries the generation it was spawned for. A reader
//! from a superseded connection may still be draining its socket
//! when the next session is already live; its messages are discarded
//! by a generation check before they can touch current state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use crate::capture::CaptureHandle;
use crate::codec::{EventCodec, FrameCodec};
use crate::command::{Command, Event};
use crate::config::LinkConfig;
use crate::error::TetherError;
use crate::events::LinkEvent;
use crate::frame::Frame;
use crate::restart::RestartOrchestrator;
use crate::service::ServiceControl;
use crate::watchdog::{Watchdog, WatchdogVerdict};

pub mod state;
mod stats;

pub use state::LinkState;
pub use stats::{LinkStats, LinkStatsSnapshot};

type ControlSink = SplitSink<Framed<UnixStream, EventCodec>, Command>;

// ── Internal messages ────────────────────────────────────────────

/// What a reader task forwards to the supervisor loop.
#[derive(Debug)]
enum SessionMsg {
    Event { generation: u64, event: Event },
    Frame { generation: u64, frame: Frame },
    Lost {
        generation: u64,
        channel: &'static str,
        error: Option<TetherError>,
    },
}

/// Why a connected session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Socket error or close: reconnect after the fixed delay.
    Lost,
    /// Stream desync or wedged daemon: supervised restart.
    Fatal(String),
    /// Caller asked the link to stop.
    Shutdown,
}

// ── LinkHandle ───────────────────────────────────────────────────

/// Caller-side handle to a spawned [`DeviceLink`].
#[derive(Debug)]
pub struct LinkHandle {
    cmd_tx: mpsc::Sender<Command>,
    running: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    stats: Arc<LinkStats>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    /// Hand a command to the link.
    ///
    /// Returns `false` only when the link has stopped. A command
    /// accepted here is still subject to the disconnected-time
    /// policy: while the link is offline, non-allow-listed commands
    /// are dropped with a warning rather than sent later.
    pub async fn send(&self, command: Command) -> bool {
        self.cmd_tx.send(command).await.is_ok()
    }

    /// Whether the link is currently connected.
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the link and wait for its teardown to finish.
    pub async fn shutdown(self) {
        self.running.store(false, Ordering::SeqCst);
        drop(self.cmd_tx);
        let _ = self.task.await;
    }
}

// ── DeviceLink ───────────────────────────────────────────────────

/// Supervised connection to one device daemon.
pub struct DeviceLink {
    config: LinkConfig,
    state: LinkState,
    generation: u64,
    watchdog: Watchdog,
    orchestrator: RestartOrchestrator,
    capture: Option<Box<dyn CaptureHandle>>,
    capture_open: bool,
    pending: VecDeque<Command>,
    offline_announced: bool,
    events: mpsc::Sender<LinkEvent>,
    cmd_rx: mpsc::Receiver<Command>,
    running: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    stats: Arc<LinkStats>,
}

impl DeviceLink {
    /// Construct a link and spawn its supervisor task onto the
    /// runtime.
    ///
    /// Returns the caller handle and the event subscription. The
    /// link runs until [`LinkHandle::shutdown`] is called or the
    /// event receiver is dropped.
    pub fn spawn(
        config: LinkConfig,
        service_control: Arc<dyn ServiceControl>,
        capture: Option<Box<dyn CaptureHandle>>,
    ) -> (LinkHandle, mpsc::Receiver<LinkEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);

        let link = Self::build(config, service_control, capture, cmd_rx, event_tx);
        let running = Arc::clone(&link.running);
        let ready = Arc::clone(&link.ready);
        let stats = Arc::clone(&link.stats);

        let task = tokio::spawn(link.run());

        (
            LinkHandle {
                cmd_tx,
                running,
                ready,
                stats,
                task,
            },
            event_rx,
        )
    }

    fn build(
        config: LinkConfig,
        service_control: Arc<dyn ServiceControl>,
        capture: Option<Box<dyn CaptureHandle>>,
        cmd_rx: mpsc::Receiver<Command>,
        events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        Self {
            watchdog: Watchdog::new(config.watchdog_interval, config.required_tags.clone()),
            orchestrator: RestartOrchestrator::new(config.restart.clone(), service_control),
            state: LinkState::default(),
            generation: 0,
            capture,
            capture_open: false,
            pending: VecDeque::new(),
            offline_announced: false,
            events,
            cmd_rx,
            running: Arc::new(AtomicBool::new(true)),
            ready: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(LinkStats::default()),
            config,
        }
    }

    // ── Supervisor loop ──────────────────────────────────────────

    async fn run(mut self) {
        let (msg_tx, mut msgs) = mpsc::channel::<SessionMsg>(256);
        info!(
            control = %self.config.control_socket.display(),
            "device link started"
        );

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.state.begin_connect() {
                warn!(error = %e, "unexpected link state, resetting");
                self.state.force_disconnect();
                continue;
            }
            self.emit_state().await;

            let (mut control_tx, readers) = match self.open_session(&msg_tx).await {
                Ok(session) => session,
                Err(e) => {
                    debug!(error = %e, "connect attempt failed");
                    self.state.force_disconnect();
                    self.emit_state().await;
                    self.note_offline().await;
                    self.wait_reconnect(&mut msgs).await;
                    continue;
                }
            };

            if let Err(e) = self.state.complete_connect() {
                warn!(error = %e, "unexpected link state on connect");
            }
            if self.orchestrator.is_in_flight() {
                self.orchestrator.complete();
                self.stats.restarts.fetch_add(1, Ordering::Relaxed);
            }
            self.stats.connects.fetch_add(1, Ordering::Relaxed);
            self.ready.store(true, Ordering::SeqCst);
            self.offline_announced = false;
            info!(generation = self.generation, "daemon link connected");
            self.emit_state().await;
            self.emit(LinkEvent::Ready).await;
            self.watchdog.arm();

            let end = self.run_session(&mut control_tx, &mut msgs).await;

            self.watchdog.disarm();
            self.ready.store(false, Ordering::SeqCst);

            match end {
                SessionEnd::Shutdown => {
                    self.teardown_session(readers, control_tx).await;
                    break;
                }
                SessionEnd::Lost => {
                    self.teardown_session(readers, control_tx).await;
                    self.state.force_disconnect();
                    self.emit_state().await;
                    self.note_offline().await;
                    self.wait_reconnect(&mut msgs).await;
                }
                SessionEnd::Fatal(reason) => {
                    if let Err(e) = self.state.begin_restart() {
                        warn!(error = %e, "unexpected link state on restart");
                    }
                    self.emit(LinkEvent::Restarting {
                        reason: reason.clone(),
                    })
                    .await;
                    self.emit_state().await;

                    self.teardown_session(readers, control_tx).await;
                    if self.orchestrator.begin(&reason) {
                        self.orchestrator.cycle_service().await;
                    }

                    if let Err(e) = self.state.finish_restart() {
                        warn!(error = %e, "unexpected link state after restart");
                    }
                    self.emit_state().await;
                    // Reconnect immediately; the daemon was just
                    // cycled and waited for.
                }
            }
        }

        self.close_capture().await;
        self.ready.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        info!("device link stopped");
    }

    /// Dial both sockets, open the capture device and spawn the
    /// per-generation reader tasks.
    async fn open_session(
        &mut self,
        msg_tx: &mpsc::Sender<SessionMsg>,
    ) -> Result<(ControlSink, Vec<JoinHandle<()>>), TetherError> {
        let control = UnixStream::connect(&self.config.control_socket).await?;
        let data = match &self.config.data_socket {
            Some(path) => Some(UnixStream::connect(path).await?),
            None => None,
        };

        if let Some(capture) = self.capture.as_mut() {
            capture
                .open()
                .await
                .map_err(|e| TetherError::Capture(format!("open failed: {e}")))?;
            self.capture_open = true;
        }

        self.generation += 1;
        let generation = self.generation;
        let mut readers = Vec::with_capacity(2);

        let (control_tx, control_rx) = Framed::new(control, EventCodec).split();
        readers.push(spawn_control_reader(control_rx, msg_tx.clone(), generation));

        if let Some(stream) = data {
            let framed = Framed::new(stream, FrameCodec);
            readers.push(spawn_data_reader(framed, msg_tx.clone(), generation));
        }

        Ok((control_tx, readers))
    }

    /// One connected session: pump messages until it ends.
    async fn run_session(
        &mut self,
        control_tx: &mut ControlSink,
        msgs: &mut mpsc::Receiver<SessionMsg>,
    ) -> SessionEnd {
        // Buffered commands go out first, in FIFO order, before
        // anything newly submitted.
        while let Some(cmd) = self.pending.pop_front() {
            debug!(command = %cmd.name, "flushing buffered command");
            if let Err(e) = control_tx.send(cmd).await {
                warn!(error = %e, "buffered command write failed");
                return SessionEnd::Lost;
            }
            self.stats.commands_sent.fetch_add(1, Ordering::Relaxed);
        }

        let mut ticker = self.watchdog.ticker();

        loop {
            tokio::select! {
                msg = msgs.recv() => {
                    let Some(msg) = msg else {
                        return SessionEnd::Shutdown;
                    };
                    if let Some(end) = self.on_session_msg(msg).await {
                        return end;
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        return SessionEnd::Shutdown;
                    };
                    if let Err(e) = control_tx.send(cmd).await {
                        warn!(error = %e, "command write failed");
                        return SessionEnd::Lost;
                    }
                    self.stats.commands_sent.fetch_add(1, Ordering::Relaxed);
                }
                _ = ticker.tick() => {
                    if let WatchdogVerdict::Expired { missing } = self.watchdog.check() {
                        return SessionEnd::Fatal(Watchdog::describe_missing(&missing));
                    }
                }
                frame = read_capture(&mut self.capture) => {
                    match frame {
                        Ok(frame) => self.on_frame(frame).await,
                        Err(e) => {
                            warn!(error = %e, "capture read failed");
                            return SessionEnd::Fatal(format!("capture: {e}"));
                        }
                    }
                }
                _ = wait_for_stop(&self.running) => {
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Apply one reader message, or decide how the session ends.
    async fn on_session_msg(&mut self, msg: SessionMsg) -> Option<SessionEnd> {
        match msg {
            SessionMsg::Event { generation, event } if generation == self.generation => {
                self.stats.events.fetch_add(1, Ordering::Relaxed);
                self.emit(LinkEvent::Daemon(event)).await;
                None
            }
            SessionMsg::Frame { generation, frame } if generation == self.generation => {
                self.on_frame(frame).await;
                None
            }
            SessionMsg::Lost {
                generation,
                channel,
                error,
            } if generation == self.generation => match error {
                Some(e) if e.is_fatal_framing() => Some(SessionEnd::Fatal(e.to_string())),
                Some(e) => {
                    debug!(channel, error = %e, "socket error");
                    Some(SessionEnd::Lost)
                }
                None => {
                    debug!(channel, "socket closed by daemon");
                    Some(SessionEnd::Lost)
                }
            },
            stale => {
                // A reader from a superseded connection must not
                // touch current state.
                trace!(?stale, "dropping message from stale generation");
                None
            }
        }
    }

    async fn on_frame(&mut self, frame: Frame) {
        self.watchdog.pulse(frame.tag());
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        self.stats
            .frame_bytes
            .fetch_add(frame.payload.len() as u64, Ordering::Relaxed);
        self.emit(LinkEvent::Frame(frame)).await;
    }

    /// Sit out the reconnect delay while applying the
    /// disconnected-time command policy and draining stale reader
    /// messages.
    async fn wait_reconnect(&mut self, msgs: &mut mpsc::Receiver<SessionMsg>) {
        let delay = tokio::time::sleep(self.config.reconnect_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                _ = &mut delay => return,
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        self.running.store(false, Ordering::SeqCst);
                        return;
                    };
                    self.queue_or_drop(cmd);
                }
                msg = msgs.recv() => {
                    if let Some(msg) = msg {
                        trace!(?msg, "discarding message while disconnected");
                    }
                }
                _ = wait_for_stop(&self.running) => return,
            }
        }
    }

    /// Disconnected-time command policy: buffer the allow-listed,
    /// drop the rest.
    fn queue_or_drop(&mut self, cmd: Command) {
        if !cmd.is_buffer_safe() {
            warn!(command = %cmd.name, "dropping command while disconnected");
            self.stats.commands_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if self.pending.len() >= self.config.command_buffer {
            if let Some(dropped) = self.pending.pop_front() {
                warn!(command = %dropped.name, "command buffer full, dropping oldest");
                self.stats.commands_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        debug!(command = %cmd.name, "buffering command until reconnect");
        self.pending.push_back(cmd);
    }

    async fn teardown_session(&mut self, readers: Vec<JoinHandle<()>>, control_tx: ControlSink) {
        for task in &readers {
            task.abort();
        }
        drop(control_tx);
        self.close_capture().await;
    }

    async fn close_capture(&mut self) {
        if !self.capture_open {
            return;
        }
        self.capture_open = false;
        if let Some(capture) = self.capture.as_mut() {
            if let Err(e) = capture.close().await {
                warn!(error = %e, "capture close failed");
            }
        }
    }

    async fn note_offline(&mut self) {
        if !self.offline_announced {
            self.offline_announced = true;
            self.emit(LinkEvent::Offline).await;
        }
    }

    async fn emit_state(&mut self) {
        let state = self.state.clone();
        self.emit(LinkEvent::StateChange { state }).await;
    }

    async fn emit(&mut self, event: LinkEvent) {
        if self.events.send(event).await.is_err() {
            // Subscriber gone; nothing left to serve.
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

// ── Reader tasks ─────────────────────────────────────────────────

fn spawn_control_reader(
    mut stream: SplitStream<Framed<UnixStream, EventCodec>>,
    tx: mpsc::Sender<SessionMsg>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match stream.next().await {
                Some(Ok(event)) => {
                    if tx
                        .send(SessionMsg::Event { generation, event })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Some(Err(e)) => {
                    let _ = tx
                        .send(SessionMsg::Lost {
                            generation,
                            channel: "control",
                            error: Some(e),
                        })
                        .await;
                    return;
                }
                None => {
                    let _ = tx
                        .send(SessionMsg::Lost {
                            generation,
                            channel: "control",
                            error: None,
                        })
                        .await;
                    return;
                }
            }
        }
    })
}

fn spawn_data_reader(
    mut framed: Framed<UnixStream, FrameCodec>,
    tx: mpsc::Sender<SessionMsg>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match framed.next().await {
                Some(Ok(frame)) => {
                    if tx
                        .send(SessionMsg::Frame { generation, frame })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Some(Err(e)) => {
                    let _ = tx
                        .send(SessionMsg::Lost {
                            generation,
                            channel: "data",
                            error: Some(e),
                        })
                        .await;
                    return;
                }
                None => {
                    let _ = tx
                        .send(SessionMsg::Lost {
                            generation,
                            channel: "data",
                            error: None,
                        })
                        .await;
                    return;
                }
            }
        }
    })
}

// ── Helpers ──────────────────────────────────────────────────────

/// Resolve the next capture frame, or never when no capture device
/// is attached.
async fn read_capture(
    capture: &mut Option<Box<dyn CaptureHandle>>,
) -> Result<Frame, TetherError> {
    match capture.as_mut() {
        Some(handle) => handle.read().await,
        None => std::future::pending().await,
    }
}

/// Resolves once the running flag clears.
async fn wait_for_stop(running: &Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────
