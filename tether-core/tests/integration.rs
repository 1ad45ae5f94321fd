//! Integration tests — full link lifecycle, command round-trips, and
//! failure scenarios over real UNIX domain sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;

use tether_core::{
    CaptureHandle, Command, DeviceLink, Event, Frame, FrameCodec, FrameTag, LinkConfig,
    LinkEvent, LinkHandle, NullServiceControl, TetherError,
};

// ── Helpers ──────────────────────────────────────────────────────

/// A fake daemon: listeners bound in a scratch directory plus the
/// matching link config with test-fast timings.
struct Daemon {
    _dir: TempDir,
    control: UnixListener,
    data: Option<UnixListener>,
    config: LinkConfig,
}

impl Daemon {
    fn new(with_data: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let control_path = dir.path().join("control.sock");
        let data_path = dir.path().join("data.sock");

        let control = UnixListener::bind(&control_path).unwrap();
        let data = with_data.then(|| UnixListener::bind(&data_path).unwrap());

        let mut config = LinkConfig::new(&control_path);
        if with_data {
            config = config.with_data_socket(&data_path);
        }
        config.reconnect_delay = Duration::from_millis(50);

        Self {
            _dir: dir,
            control,
            data,
            config,
        }
    }

    fn spawn_link(&self) -> (LinkHandle, mpsc::Receiver<LinkEvent>) {
        DeviceLink::spawn(self.config.clone(), Arc::new(NullServiceControl), None)
    }

    /// Accept the next link connection (control, then data).
    async fn accept(&self) -> (UnixStream, Option<UnixStream>) {
        let (control, _) = self.control.accept().await.unwrap();
        let data = match &self.data {
            Some(listener) => Some(listener.accept().await.unwrap().0),
            None => None,
        };
        (control, data)
    }
}

async fn send_event(stream: &mut UnixStream, event: &Event) {
    let mut buf = serde_json::to_vec(event).unwrap();
    buf.push(0);
    stream.write_all(&buf).await.unwrap();
}

/// Read NUL-delimited commands off the control socket.
async fn recv_command(stream: &mut UnixStream, buf: &mut Vec<u8>) -> Command {
    loop {
        if let Some(pos) = buf.iter().position(|&b| b == 0) {
            let cmd: Command = serde_json::from_slice(&buf[..pos]).unwrap();
            buf.drain(..=pos);
            return cmd;
        }
        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "daemon socket closed while waiting for a command");
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::new();
    codec.encode(frame.clone(), &mut buf).unwrap();
    buf.to_vec()
}

async fn next_event(events: &mut mpsc::Receiver<LinkEvent>) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timeout waiting for link event")
        .expect("link stopped")
}

/// Wait for the next event matching `pred`, skipping state-change
/// chatter in between.
async fn wait_for(
    events: &mut mpsc::Receiver<LinkEvent>,
    pred: impl Fn(&LinkEvent) -> bool,
) -> LinkEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

fn is_ready(ev: &LinkEvent) -> bool {
    matches!(ev, LinkEvent::Ready)
}

fn is_offline(ev: &LinkEvent) -> bool {
    matches!(ev, LinkEvent::Offline)
}

fn is_restarting(ev: &LinkEvent) -> bool {
    matches!(ev, LinkEvent::Restarting { .. })
}

// ── Lifecycle and command round-trip ─────────────────────────────

#[tokio::test]
async fn connect_ready_and_command_round_trip() {
    let daemon = Daemon::new(false);
    let (handle, mut events) = daemon.spawn_link();

    let (mut control, _) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;
    assert!(handle.ready());

    // Command toward the daemon.
    let cmd = Command::with_data("getState", serde_json::json!({ "verbose": true }));
    assert!(handle.send(cmd.clone()).await);

    let mut buf = Vec::new();
    let received = recv_command(&mut control, &mut buf).await;
    assert_eq!(received, cmd);

    // Event back from the daemon, with a sequence prefix.
    control.write_all(b"17 ").await.unwrap();
    send_event(
        &mut control,
        &Event::with_data("stateChange", serde_json::json!({ "state": "recording" })),
    )
    .await;

    let event = wait_for(&mut events, |e| matches!(e, LinkEvent::Daemon(_))).await;
    match event {
        LinkEvent::Daemon(ev) => {
            assert_eq!(ev.name, "stateChange");
            assert_eq!(ev.data, Some(serde_json::json!({ "state": "recording" })));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn concatenated_frames_dispatch_in_order() {
    let daemon = Daemon::new(true);
    let (handle, mut events) = daemon.spawn_link();

    let (_control, data) = daemon.accept().await;
    let mut data = data.unwrap();
    wait_for(&mut events, is_ready).await;

    // Two complete frames in a single write.
    let video = Frame::new(FrameTag::Video, 1, 0, 33, vec![0xAA; 100]);
    let audio = Frame::new(FrameTag::Audio, 1, 33_000, 20, vec![0xBB; 40]);
    let mut wire = encode_frame(&video);
    wire.extend_from_slice(&encode_frame(&audio));
    data.write_all(&wire).await.unwrap();

    let first = wait_for(&mut events, |e| matches!(e, LinkEvent::Frame(_))).await;
    let second = wait_for(&mut events, |e| matches!(e, LinkEvent::Frame(_))).await;
    match (first, second) {
        (LinkEvent::Frame(a), LinkEvent::Frame(b)) => {
            assert_eq!(a, video);
            assert_eq!(b, audio);
        }
        other => panic!("unexpected events: {other:?}"),
    }

    let stats = handle.stats();
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.frame_bytes, 140);

    handle.shutdown().await;
}

// ── Reconnection ─────────────────────────────────────────────────

#[tokio::test]
async fn reconnects_after_daemon_drop() {
    let daemon = Daemon::new(false);
    let (handle, mut events) = daemon.spawn_link();

    let (control, _) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;

    drop(control);
    wait_for(&mut events, is_offline).await;
    assert!(!handle.ready());

    // The listener is still bound; the link dials again after the
    // fixed delay.
    let (_control, _) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;
    assert!(handle.ready());
    assert_eq!(handle.stats().connects, 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn disconnected_command_policy_buffers_allow_listed_only() {
    let mut daemon = Daemon::new(false);
    daemon.config.reconnect_delay = Duration::from_millis(500);
    let (handle, mut events) = daemon.spawn_link();

    let (control, _) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;

    drop(control);
    wait_for(&mut events, is_offline).await;

    // While disconnected: a mutating command is dropped, a query is
    // buffered.
    assert!(handle.send(Command::new("startRecording")).await);
    assert!(handle.send(Command::new("getState")).await);

    let (mut control, _) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;

    // The buffered query is flushed first; a fresh command follows
    // it. The dropped command never shows up.
    assert!(handle.send(Command::new("setTorchMode")).await);

    let mut buf = Vec::new();
    let first = recv_command(&mut control, &mut buf).await;
    let second = recv_command(&mut control, &mut buf).await;
    assert_eq!(first.name, "getState");
    assert_eq!(second.name, "setTorchMode");
    assert_eq!(handle.stats().commands_dropped, 1);

    handle.shutdown().await;
}

// ── Restart paths ────────────────────────────────────────────────

#[tokio::test]
async fn unknown_tag_triggers_supervised_restart() {
    let daemon = Daemon::new(true);
    let (handle, mut events) = daemon.spawn_link();

    let (_control, data) = daemon.accept().await;
    let mut data = data.unwrap();
    wait_for(&mut events, is_ready).await;

    // A header with a bogus tag value poisons the stream.
    let mut header = [0u8; 20];
    header[4..8].copy_from_slice(&0x99u32.to_le_bytes());
    data.write_all(&header).await.unwrap();

    let restarting = wait_for(&mut events, is_restarting).await;
    match restarting {
        LinkEvent::Restarting { reason } => assert!(reason.contains("tag")),
        other => panic!("unexpected event: {other:?}"),
    }

    // After cycling (a no-op service control here) the link comes
    // back on its own.
    let (_control, _data) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;
    assert_eq!(handle.stats().restarts, 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn watchdog_expiry_names_missing_tag_and_restarts() {
    let mut daemon = Daemon::new(true);
    daemon.config.watchdog_interval = Duration::from_millis(200);
    daemon.config.required_tags = vec![FrameTag::Video];
    let (handle, mut events) = daemon.spawn_link();

    let (_control, _data) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;

    // No frames ever arrive: the daemon is wedged behind a healthy
    // socket.
    let restarting = wait_for(&mut events, is_restarting).await;
    match restarting {
        LinkEvent::Restarting { reason } => assert!(reason.contains("video")),
        other => panic!("unexpected event: {other:?}"),
    }

    let (_control, _data) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn malformed_control_event_does_not_drop_connection() {
    let daemon = Daemon::new(false);
    let (handle, mut events) = daemon.spawn_link();

    let (mut control, _) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;

    control.write_all(b"{broken json\0").await.unwrap();
    send_event(&mut control, &Event::new("recordingDone")).await;

    let event = wait_for(&mut events, |e| matches!(e, LinkEvent::Daemon(_))).await;
    match event {
        LinkEvent::Daemon(ev) => assert_eq!(ev.name, "recordingDone"),
        other => panic!("unexpected event: {other:?}"),
    }

    // Still connected: commands flow.
    assert!(handle.ready());
    assert!(handle.send(Command::new("getState")).await);
    let mut buf = Vec::new();
    assert_eq!(recv_command(&mut control, &mut buf).await.name, "getState");

    handle.shutdown().await;
}

// ── Capture path ─────────────────────────────────────────────────

/// Capture double producing one audio frame per read.
struct FakeCapture {
    opened: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    counter: u32,
}

#[async_trait]
impl CaptureHandle for FakeCapture {
    async fn open(&mut self) -> Result<(), TetherError> {
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&mut self) -> Result<Frame, TetherError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.counter += 1;
        Ok(Frame::new(FrameTag::Audio, self.counter, 0, 10, vec![0u8; 8]))
    }

    async fn close(&mut self) -> Result<(), TetherError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn capture_frames_flow_and_close_on_shutdown() {
    let daemon = Daemon::new(false);
    let opened = Arc::new(AtomicBool::new(false));
    let closed = Arc::new(AtomicBool::new(false));
    let capture = FakeCapture {
        opened: Arc::clone(&opened),
        closed: Arc::clone(&closed),
        counter: 0,
    };

    let (handle, mut events) = DeviceLink::spawn(
        daemon.config.clone(),
        Arc::new(NullServiceControl),
        Some(Box::new(capture)),
    );

    let (_control, _) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;
    assert!(opened.load(Ordering::SeqCst));

    let event = wait_for(&mut events, |e| matches!(e, LinkEvent::Frame(_))).await;
    match event {
        LinkEvent::Frame(frame) => assert_eq!(frame.tag(), FrameTag::Audio),
        other => panic!("unexpected event: {other:?}"),
    }

    handle.shutdown().await;
    assert!(closed.load(Ordering::SeqCst));
}

// ── Shutdown ─────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_closes_the_control_socket() {
    let daemon = Daemon::new(false);
    let (handle, mut events) = daemon.spawn_link();

    let (mut control, _) = daemon.accept().await;
    wait_for(&mut events, is_ready).await;

    handle.shutdown().await;

    // The daemon observes EOF once the link is gone.
    let mut chunk = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), control.read(&mut chunk))
        .await
        .expect("timeout waiting for EOF")
        .unwrap();
    assert_eq!(n, 0);
}
