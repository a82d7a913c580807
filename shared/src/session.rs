//! Mirroring session
//!
//! A [`Session`] bootstraps the server on one device, accepts the two
//! connections it dials back (video first, then control), reads the
//! handshake and runs one worker thread per socket:
//!
//! - the video worker demuxes access units into the session's
//!   [`VideoSink`];
//! - the control worker drains the command queue onto the control socket.
//!
//! Both workers share one cancellation token. [`Session::stop`] cancels it,
//! shuts the sockets down and joins both threads.

use std::net::{Ipv4Addr, Shutdown, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::{DeviceBridge, DeviceHandle};
use crate::config::Config;
use crate::control::{ControlMessage, Keycode};
use crate::dispatcher::{ControlDispatcher, ControlSender};
use crate::error::{Error, Result};
use crate::protocol::{CodecMeta, Handshake};
use crate::server::{ServerOptions, SERVER_FILE_MODE, SERVER_REMOTE_PATH, SERVER_SOCKET_NAME};
use crate::stats::Stats;
use crate::video::{FrameSize, Geometry, VideoDemuxer, VideoSink};

/// How often a pending accept is polled
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Capacity of the event fan-out; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 64;

/// Session settings beyond device and port
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub server: ServerOptions,

    /// Local path of the server pushed to the device
    pub server_jar: PathBuf,

    /// Read timeout on both sockets
    pub read_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            server: config.server_options(),
            server_jar: config.server_jar.clone(),
            read_timeout: config.read_timeout(),
        }
    }
}

/// Session worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    Video,
    Control,
}

/// Lifecycle notifications published by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { device_name: String },

    /// A command was discarded because the control channel is down
    CommandDropped,

    /// A worker hit an unrecoverable error; the session is winding down
    WorkerFailed { worker: Worker, error: String },

    Stopped,
}

/// State shared with the worker threads
struct Shared {
    connected: AtomicBool,
    geometry: Arc<Geometry>,
    stats: Arc<Stats>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn fail(&self, worker: Worker, cancel: &CancellationToken, err: Error) {
        error!("{:?} worker failed: {}", worker, err);
        self.connected.store(false, Ordering::SeqCst);
        cancel.cancel();
        self.emit(SessionEvent::WorkerFailed {
            worker,
            error: err.to_string(),
        });
    }
}

/// Sockets and handshake of a freshly bootstrapped server
struct Connection {
    listener: TcpListener,
    video: TcpStream,
    control: Option<TcpStream>,
    handshake: Handshake,
}

/// Everything owned while connected
struct Running {
    cancel: CancellationToken,
    listener: TcpListener,
    video_socket: TcpStream,
    control_socket: Option<TcpStream>,
    video_worker: JoinHandle<Box<dyn VideoSink>>,
    control_worker: Option<JoinHandle<()>>,
}

impl Running {
    fn is_worker(&self, id: ThreadId) -> bool {
        self.video_worker.thread().id() == id
            || self
                .control_worker
                .as_ref()
                .is_some_and(|h| h.thread().id() == id)
    }

    /// Cancel, unblock and join both workers; hands the sink back
    fn shutdown(self) -> Option<Box<dyn VideoSink>> {
        self.cancel.cancel();

        let _ = self.video_socket.shutdown(Shutdown::Both);
        if let Some(socket) = &self.control_socket {
            let _ = socket.shutdown(Shutdown::Both);
        }

        let sink = match self.video_worker.join() {
            Ok(sink) => Some(sink),
            Err(_) => {
                error!("Video worker panicked");
                None
            }
        };
        if let Some(worker) = self.control_worker {
            if worker.join().is_err() {
                error!("Control worker panicked");
            }
        }

        drop(self.listener);
        sink
    }
}

/// One mirrored device
pub struct Session {
    device: DeviceHandle,
    port: u16,
    bridge: Arc<dyn DeviceBridge>,
    options: SessionOptions,
    sink: Mutex<Option<Box<dyn VideoSink>>>,
    running: Mutex<Option<Running>>,
    control: Mutex<Option<ControlSender>>,
    handshake: Mutex<Option<Handshake>>,
    shared: Arc<Shared>,
}

impl Session {
    /// Create a disconnected session
    ///
    /// `port` is the local loopback port the device dials back to; it must
    /// be unique among concurrently running sessions.
    pub fn new(
        device: DeviceHandle,
        port: u16,
        bridge: Arc<dyn DeviceBridge>,
        options: SessionOptions,
        sink: impl VideoSink + 'static,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            device,
            port,
            bridge,
            options,
            sink: Mutex::new(Some(Box::new(sink))),
            running: Mutex::new(None),
            control: Mutex::new(None),
            handshake: Mutex::new(None),
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                geometry: Arc::new(Geometry::default()),
                stats: Stats::new(),
                events,
            }),
        }
    }

    /// Create a session and start it
    pub fn connect(
        device: DeviceHandle,
        port: u16,
        bridge: Arc<dyn DeviceBridge>,
        options: SessionOptions,
        sink: impl VideoSink + 'static,
        timeout: Duration,
    ) -> Result<Self> {
        let session = Self::new(device, port, bridge, options, sink);
        session.start(timeout)?;
        Ok(session)
    }

    /// Bootstrap the server and start both workers
    ///
    /// `timeout` bounds the wait for the device to dial back. Starting a
    /// session that is already running fails with `AlreadyConnected`.
    pub fn start(&self, timeout: Duration) -> Result<()> {
        let mut running = lock(&self.running);
        if running.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let sink = lock(&self.sink)
            .take()
            .ok_or_else(|| Error::Other("video sink is gone; create a new session".into()))?;

        let conn = match self.bootstrap(timeout) {
            Ok(conn) => conn,
            Err(e) => {
                *lock(&self.sink) = Some(sink);
                return Err(e);
            }
        };

        let device_name = if conn.handshake.device.device_name.is_empty() {
            self.device.display_name().to_string()
        } else {
            conn.handshake.device.device_name.clone()
        };
        info!(
            "Device {} connected: {} ({}x{} {})",
            self.device.serial,
            device_name,
            conn.handshake.codec.width,
            conn.handshake.codec.height,
            conn.handshake.codec.codec_tag()
        );
        *lock(&self.handshake) = Some(conn.handshake.clone());

        self.shared.geometry.clear();
        self.shared.stats.reset();

        // Set before spawning so an early worker failure is not overwritten
        self.shared.connected.store(true, Ordering::SeqCst);
        match self.spawn_workers(conn, sink) {
            Ok(workers) => *running = Some(workers),
            Err(e) => {
                self.shared.connected.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        self.shared.emit(SessionEvent::Connected { device_name });
        Ok(())
    }

    /// Stop both workers and close the sockets
    ///
    /// Blocks until both workers have exited. Queued commands that were not
    /// written yet are discarded. Must not be called from a session worker.
    pub fn stop(&self) -> Result<()> {
        let running = {
            let mut guard = lock(&self.running);
            match guard.as_ref() {
                None => return Err(Error::NotConnected),
                Some(running) if running.is_worker(thread::current().id()) => {
                    return Err(Error::Other(
                        "stop() called from a session worker".into(),
                    ))
                }
                Some(_) => {}
            }
            guard.take().ok_or(Error::NotConnected)?
        };

        *lock(&self.control) = None;
        self.shared.connected.store(false, Ordering::SeqCst);

        if let Some(sink) = running.shutdown() {
            *lock(&self.sink) = Some(sink);
        }

        info!("Session for {} stopped", self.device.serial);
        self.shared.emit(SessionEvent::Stopped);
        Ok(())
    }

    /// Queue a control command; never blocks
    ///
    /// Returns `false` if the command was dropped because no control
    /// channel is up.
    pub fn send_command(&self, msg: ControlMessage) -> bool {
        let control = lock(&self.control);
        let result = match control.as_ref() {
            Some(sender) => sender.send(msg),
            None => Err(Error::NotConnected),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("send_command() dropped {:?}: {}", msg.message_type(), e);
                self.shared.emit(SessionEvent::CommandDropped);
                false
            }
        }
    }

    /// Queue key down followed by key up
    pub fn press_key(&self, keycode: Keycode) -> bool {
        ControlMessage::key_press(keycode)
            .into_iter()
            .all(|msg| self.send_command(msg))
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Name reported by the device, else the bridge's display name
    pub fn device_name(&self) -> String {
        lock(&self.handshake)
            .as_ref()
            .map(|h| h.device.device_name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.device.display_name().to_string())
    }

    /// Size of the last decoded frame; `None` before the first one
    pub fn geometry(&self) -> Option<FrameSize> {
        self.shared.geometry.get()
    }

    /// Codec metadata from the last handshake
    pub fn codec_meta(&self) -> Option<CodecMeta> {
        lock(&self.handshake).as_ref().map(|h| h.codec)
    }

    /// `false` once stopped or after a worker failed
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.shared.stats.clone()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    fn bootstrap(&self, timeout: Duration) -> Result<Connection> {
        let bridge = &self.bridge;
        let device = &self.device;
        info!("Starting server on {} (port {})", device.serial, self.port);

        if let Err(e) = bridge.remove_all_forwards(device) {
            warn!("Failed to clear stale forwards on {}: {}", device.serial, e);
        }
        bridge.push_file(
            device,
            &self.options.server_jar,
            SERVER_REMOTE_PATH,
            SERVER_FILE_MODE,
        )?;
        bridge.create_reverse_forward(device, SERVER_SOCKET_NAME, self.port)?;

        let result = self.accept_server(timeout);

        // The forward is only needed to establish the sockets
        if let Err(e) = bridge.remove_all_forwards(device) {
            warn!("Failed to remove forwards on {}: {}", device.serial, e);
        }

        result
    }

    fn accept_server(&self, timeout: Duration) -> Result<Connection> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.port)).map_err(|e| {
            Error::bootstrap(format!("cannot listen on 127.0.0.1:{}: {}", self.port, e))
        })?;

        let command = self.options.server.command_line();
        info!("Start command: {}", command);
        self.bridge.run_remote_command(&self.device, &command)?;

        // A timeout too large to represent means no deadline
        let deadline = Instant::now().checked_add(timeout);
        let mut video = accept_before(&listener, deadline)?
            .ok_or(Error::HandshakeTimeout(timeout.as_millis() as u64))?;
        info!("Video socket connected");

        let control = if self.options.server.control {
            let socket = accept_before(&listener, deadline)?.ok_or_else(|| {
                Error::protocol("device did not open the control connection; is control disabled?")
            })?;
            info!("Control socket connected");
            Some(socket)
        } else {
            None
        };

        for socket in std::iter::once(&video).chain(control.as_ref()) {
            socket.set_nonblocking(false)?;
            socket.set_read_timeout(Some(self.options.read_timeout))?;
            socket.set_nodelay(true)?;
        }

        let handshake = Handshake::read_from(&mut video)?;

        Ok(Connection {
            listener,
            video,
            control,
            handshake,
        })
    }

    fn spawn_workers(&self, conn: Connection, mut sink: Box<dyn VideoSink>) -> Result<Running> {
        let cancel = CancellationToken::new();
        let serial = &self.device.serial;

        let control_worker = match &conn.control {
            Some(socket) => {
                let (sender, dispatcher) = ControlDispatcher::new(socket.try_clone()?, cancel.clone());
                let shared = self.shared.clone();
                let token = cancel.clone();

                let handle = thread::Builder::new()
                    .name(format!("control-{}", serial))
                    .spawn(move || {
                        match dispatcher.run() {
                            Err(_) if token.is_cancelled() => {}
                            Err(e) => shared.fail(Worker::Control, &token, e),
                            Ok(()) => {}
                        }
                        debug!("Control worker exited");
                    })?;

                *lock(&self.control) = Some(sender);
                Some(handle)
            }
            None => {
                warn!("Control is disabled; commands will be dropped");
                None
            }
        };

        let reader = conn.video.try_clone()?;
        let shared = self.shared.clone();
        let token = cancel.clone();
        let spawned = thread::Builder::new()
            .name(format!("video-{}", serial))
            .spawn(move || {
                let mut demuxer = VideoDemuxer::new(
                    reader,
                    token.clone(),
                    shared.geometry.clone(),
                    shared.stats.clone(),
                );
                if let Err(e) = demuxer.run(sink.as_mut()) {
                    shared.fail(Worker::Video, &token, e);
                }
                debug!("Video worker exited");
                sink
            });

        let video_worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                cancel.cancel();
                *lock(&self.control) = None;
                if let Some(handle) = control_worker {
                    let _ = handle.join();
                }
                return Err(e.into());
            }
        };

        Ok(Running {
            cancel,
            listener: conn.listener,
            video_socket: conn.video,
            control_socket: conn.control,
            video_worker,
            control_worker,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if lock(&self.running).is_some() {
            if let Err(e) = self.stop() {
                warn!("Failed to stop session on drop: {}", e);
            }
        }
    }
}

/// Accept one connection, giving up at `deadline` if there is one
fn accept_before(listener: &TcpListener, deadline: Option<Instant>) -> Result<Option<TcpStream>> {
    listener.set_nonblocking(true)?;

    loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("Accepted connection from {}", addr);
                return Ok(Some(stream));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Ok(None);
                }
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::bootstrap(format!("accept failed: {}", e))),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests::decode;
    use crate::control::{BackOrScreenOnEvent, KeyEventAction, MotionEventAction, Position, TouchEvent};
    use crate::protocol::{DeviceMeta, PacketHeader};
    use bytes::{Bytes, BytesMut};
    use std::io::{Read, Write};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    /// What the fake device does once the server is "started"
    #[derive(Clone)]
    struct FakeDevice {
        dial: bool,
        dial_control: bool,
        /// Bytes of the handshake actually sent
        handshake_len: usize,
        /// Raw bytes written to the video socket after the handshake
        video: Vec<u8>,
        /// Close the video socket once `video` is written
        close_video: bool,
        /// Keep the control socket open but never read from it
        stall_control: bool,
        /// Everything received on the control socket
        received: Arc<Mutex<Vec<u8>>>,
    }

    impl Default for FakeDevice {
        fn default() -> Self {
            Self {
                dial: true,
                dial_control: true,
                handshake_len: Handshake::SIZE,
                video: Vec::new(),
                close_video: false,
                stall_control: false,
                received: Arc::default(),
            }
        }
    }

    impl FakeDevice {
        fn serve(self, port: u16) {
            if !self.dial {
                return;
            }
            let Ok(mut video) = TcpStream::connect((Ipv4Addr::LOCALHOST, port)) else {
                return;
            };
            let control = if self.dial_control {
                TcpStream::connect((Ipv4Addr::LOCALHOST, port)).ok()
            } else {
                None
            };

            let mut handshake = BytesMut::new();
            Handshake {
                device: DeviceMeta {
                    device_name: "FakePhone".into(),
                },
                codec: CodecMeta {
                    codec_id: u32::from_be_bytes(*b"h264"),
                    width: 720,
                    height: 1280,
                },
            }
            .encode(&mut handshake);
            let _ = video.write_all(&handshake[..self.handshake_len]);
            let _ = video.write_all(&self.video);

            if self.close_video || self.handshake_len < Handshake::SIZE {
                let _ = video.shutdown(Shutdown::Both);
            }

            if self.stall_control {
                // Held until the session shuts the video socket down
                let _ = video.read_to_end(&mut Vec::new());
                drop(control);
            } else if let Some(mut control) = control {
                let mut buf = [0u8; 256];
                while let Ok(n) = control.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                    self.received.lock().unwrap().extend_from_slice(&buf[..n]);
                }
            } else {
                let _ = video.read_to_end(&mut Vec::new());
            }
        }
    }

    struct FakeBridge {
        device: FakeDevice,
        calls: Mutex<Vec<String>>,
        port: Mutex<Option<u16>>,
    }

    impl FakeBridge {
        fn new(device: FakeDevice) -> Arc<Self> {
            Arc::new(Self {
                device,
                calls: Mutex::default(),
                port: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    impl DeviceBridge for FakeBridge {
        fn list_devices(&self) -> Result<Vec<DeviceHandle>> {
            Ok(vec![DeviceHandle::new("fake")])
        }

        fn push_file(&self, _: &DeviceHandle, _: &Path, remote: &str, mode: u32) -> Result<()> {
            self.record(format!("push {} {:o}", remote, mode));
            Ok(())
        }

        fn create_reverse_forward(&self, _: &DeviceHandle, socket: &str, port: u16) -> Result<()> {
            self.record(format!("reverse {} {}", socket, port));
            *self.port.lock().unwrap() = Some(port);
            Ok(())
        }

        fn remove_all_forwards(&self, _: &DeviceHandle) -> Result<()> {
            self.record("remove_all_forwards");
            Ok(())
        }

        fn run_remote_command(&self, _: &DeviceHandle, command: &str) -> Result<()> {
            self.record(format!("run {}", command));
            let port = self.port.lock().unwrap().expect("reverse forward first");
            let device = self.device.clone();
            thread::spawn(move || device.serve(port));
            Ok(())
        }
    }

    fn free_port() -> u16 {
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn options() -> SessionOptions {
        SessionOptions {
            read_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    fn packet(pts: i64, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        PacketHeader::new(pts, payload.len() as u32).encode(&mut buf);
        buf.extend_from_slice(payload);
        buf.to_vec()
    }

    fn null_sink(_: &[u8], _: i64) -> Result<Option<FrameSize>> {
        Ok(None)
    }

    fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_full_session_lifecycle() {
        let mut video = packet(10, b"unit-one");
        video.extend(packet(20, b"unit-two"));
        let device = FakeDevice {
            video,
            ..Default::default()
        };
        let received = device.received.clone();
        let bridge = FakeBridge::new(device);

        let decoded = Arc::new(Mutex::new(Vec::new()));
        let sink_log = decoded.clone();
        let sink = move |payload: &[u8], pts: i64| -> Result<Option<FrameSize>> {
            sink_log.lock().unwrap().push((payload.to_vec(), pts));
            Ok(Some(FrameSize::new(720, 1280)))
        };

        let port = free_port();
        let session = Session::new(DeviceHandle::new("fake"), port, bridge.clone(), options(), sink);
        let mut events = session.subscribe();
        assert_eq!(session.geometry(), None);

        session.start(Duration::from_secs(5)).unwrap();
        assert!(session.is_connected());
        assert_eq!(session.device_name(), "FakePhone");
        assert_eq!(session.codec_meta().unwrap().codec_tag(), "h264");
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Connected {
                device_name: "FakePhone".into()
            }
        );

        wait_for("two packets", || decoded.lock().unwrap().len() == 2);
        assert_eq!(
            *decoded.lock().unwrap(),
            vec![(b"unit-one".to_vec(), 10), (b"unit-two".to_vec(), 20)]
        );
        assert_eq!(session.geometry(), Some(FrameSize::new(720, 1280)));
        assert_eq!(session.stats().snapshot().total_packets, 2);

        let c1 = ControlMessage::BackOrScreenOn(BackOrScreenOnEvent {
            action: KeyEventAction::Down,
        });
        let c2 = ControlMessage::Touch(TouchEvent::new(
            MotionEventAction::Down,
            Position::new(10, 20, 720, 1280),
        ));
        assert!(session.send_command(c1));
        assert!(session.send_command(c2));
        assert!(session.press_key(Keycode::HOME));

        let expected_len = 2 + 32 + 14 + 14;
        wait_for("control bytes", || received.lock().unwrap().len() == expected_len);
        let mut bytes = Bytes::from(received.lock().unwrap().clone());
        assert_eq!(decode(&mut bytes), c1);
        assert_eq!(decode(&mut bytes), c2);
        let [down, up] = ControlMessage::key_press(Keycode::HOME);
        assert_eq!(decode(&mut bytes), down);
        assert_eq!(decode(&mut bytes), up);

        session.stop().unwrap();
        assert!(!session.is_connected());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Stopped);

        let calls = bridge.calls();
        assert_eq!(calls[0], "remove_all_forwards");
        assert_eq!(calls[1], "push /data/local/tmp/scrcpy-server.jar 444");
        assert_eq!(calls[2], format!("reverse localabstract:scrcpy {}", port));
        assert!(calls[3].starts_with("run CLASSPATH=/data/local/tmp/scrcpy-server.jar"));
        assert_eq!(calls[4], "remove_all_forwards");
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let bridge = FakeBridge::new(FakeDevice::default());
        let session = Session::connect(
            DeviceHandle::new("fake"),
            free_port(),
            bridge,
            options(),
            null_sink,
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(matches!(
            session.start(Duration::from_secs(1)),
            Err(Error::AlreadyConnected)
        ));
        assert!(session.is_connected());
        session.stop().unwrap();
    }

    #[test]
    fn test_stop_and_send_while_disconnected() {
        let bridge = FakeBridge::new(FakeDevice::default());
        let session = Session::new(DeviceHandle::new("fake"), free_port(), bridge, options(), null_sink);
        let mut events = session.subscribe();

        assert!(matches!(session.stop(), Err(Error::NotConnected)));
        assert!(!session.press_key(Keycode::BACK));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::CommandDropped);
    }

    #[test]
    fn test_no_dial_back_times_out() {
        let bridge = FakeBridge::new(FakeDevice {
            dial: false,
            ..Default::default()
        });
        let session = Session::new(
            DeviceHandle::new("fake"),
            free_port(),
            bridge.clone(),
            options(),
            null_sink,
        );

        let err = session.start(Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, Error::HandshakeTimeout(200)), "got {:?}", err);
        assert!(!session.is_connected());
        assert_eq!(bridge.calls().last().unwrap(), "remove_all_forwards");
    }

    #[test]
    fn test_unbounded_timeout_waits_for_device() {
        let bridge = FakeBridge::new(FakeDevice::default());
        let session = Session::connect(
            DeviceHandle::new("fake"),
            free_port(),
            bridge,
            options(),
            null_sink,
            Duration::MAX,
        )
        .unwrap();

        assert!(session.is_connected());
        session.stop().unwrap();
    }

    #[test]
    fn test_missing_control_connection_is_protocol_error() {
        let bridge = FakeBridge::new(FakeDevice {
            dial_control: false,
            ..Default::default()
        });
        let session = Session::new(DeviceHandle::new("fake"), free_port(), bridge, options(), null_sink);

        let err = session.start(Duration::from_millis(300)).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {:?}", err);
    }

    #[test]
    fn test_short_handshake_is_protocol_error() {
        let bridge = FakeBridge::new(FakeDevice {
            handshake_len: 40,
            ..Default::default()
        });
        let session = Session::new(DeviceHandle::new("fake"), free_port(), bridge, options(), null_sink);

        let err = session.start(Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {:?}", err);

        // A failed start leaves the session startable
        assert!(matches!(session.stop(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_control_disabled_drops_commands() {
        let bridge = FakeBridge::new(FakeDevice {
            dial_control: false,
            ..Default::default()
        });
        let mut opts = options();
        opts.server.control = false;
        assert!(opts.server.command_line().contains("control=false"));

        let session = Session::connect(
            DeviceHandle::new("fake"),
            free_port(),
            bridge,
            opts,
            null_sink,
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(!session.press_key(Keycode::POWER));
        session.stop().unwrap();
    }

    #[test]
    fn test_truncated_stream_fails_session() {
        let mut video = packet(1, &[7u8; 100]);
        video.truncate(60);
        let bridge = FakeBridge::new(FakeDevice {
            video,
            close_video: true,
            ..Default::default()
        });
        let session = Session::new(DeviceHandle::new("fake"), free_port(), bridge, options(), null_sink);
        let mut events = session.subscribe();

        session.start(Duration::from_secs(5)).unwrap();

        let mut failure = None;
        wait_for("worker failure", || {
            while let Ok(event) = events.try_recv() {
                if let SessionEvent::WorkerFailed { worker, error } = event {
                    failure = Some((worker, error));
                }
            }
            failure.is_some()
        });

        let (worker, error) = failure.unwrap();
        assert_eq!(worker, Worker::Video);
        assert!(error.starts_with("Stream error"), "got {}", error);
        assert!(!session.is_connected());

        // The control worker was cancelled along with the video worker
        let started = Instant::now();
        session.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_stop_with_pending_commands_and_concurrent_sender() {
        // The device never reads, so the socket buffer fills, the writer
        // blocks and commands pile up in the queue
        let bridge = FakeBridge::new(FakeDevice {
            stall_control: true,
            ..Default::default()
        });
        let session = Arc::new(
            Session::connect(
                DeviceHandle::new("fake"),
                free_port(),
                bridge,
                options(),
                null_sink,
                Duration::from_secs(5),
            )
            .unwrap(),
        );

        let done = Arc::new(AtomicBool::new(false));
        let sent = Arc::new(AtomicUsize::new(0));
        let sender = {
            let session = session.clone();
            let done = done.clone();
            let sent = sent.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    if session.press_key(Keycode::VOLUME_UP) {
                        sent.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        };

        // Far more than a loopback socket buffer holds
        wait_for("a backlog of commands", || sent.load(Ordering::SeqCst) > 200_000);

        let started = Instant::now();
        session.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));

        done.store(true, Ordering::SeqCst);
        sender.join().unwrap();
        assert!(!session.press_key(Keycode::VOLUME_UP));
    }

    #[test]
    fn test_restart_after_stop() {
        let bridge = FakeBridge::new(FakeDevice::default());
        let session = Session::new(DeviceHandle::new("fake"), free_port(), bridge, options(), null_sink);

        session.start(Duration::from_secs(5)).unwrap();
        session.stop().unwrap();
        session.start(Duration::from_secs(5)).unwrap();
        assert!(session.is_connected());
        session.stop().unwrap();
    }
}
