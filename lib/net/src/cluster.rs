//! Cluster socket: a length-framed TCP protocol with rate metering, multiplexed from a single
//! poll loop thread per `ClusterSocket`. Built on a ring-buffered read/write `Channel` (a
//! `byteorder` framed header) and an accept loop / per-FD dispatch `Endpoint` with a `connecting`
//! flag that ends the connector thread. Per-message AEAD encryption and a handshake are
//! authentication machinery and out of scope here, so the wire format is the plain 4-byte length
//! prefix rather than an encrypted category header.

use crate::buffer::Buffer;
use crate::error::{NetworkError, NetworkResult};
use crate::frame::{self, MSG_HDR_SIZE};
use crate::meter::{self, METER_SEND_THRESH};
use gdf_fabric::{Publisher, QueueStatus, Subscriber, SubscriberKind};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Poll, PollOpt, Ready, Token};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const READ_BUF_SIZE: usize = 65536;
const WRITE_BUF_SIZE: usize = 65536;
const LISTENER_TOKEN: Token = Token(0);
const POLL_WAIT: Duration = Duration::from_millis(200);
const SPIN_BLOCK_SLEEP: Duration = Duration::from_secs(1);

/// Point-to-multipoint-with-feedback vs. broadcast-with-drops, per §4.3.2.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClusterVariant {
    Queue,
    Bus,
}

/// Which side of the framed stream this socket plays on every accepted connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SocketRole {
    Reader,
    Writer,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub address: String,
    pub variant: ClusterVariant,
    pub role: SocketRole,
    /// The fabric queue this socket's records flow into (READER role) or out of (WRITER role).
    pub queue_name: String,
    pub depth: usize,
    /// A blind WRITER never throttles on the meter and tolerates drops (§4.3.3).
    pub is_blind: bool,
}

/// Owns a connector thread and its poll loop. Dropping (or calling `close_connection`) flips the
/// cooperative cancel flag and joins the thread, per §5's "destructor sets `active=false` then
/// joins" idiom.
pub struct ClusterSocket {
    active: Arc<AtomicBool>,
    connecting: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    log: slog::Logger,
}

impl ClusterSocket {
    pub fn new(config: ClusterConfig, log: slog::Logger) -> NetworkResult<ClusterSocket> {
        let active = Arc::new(AtomicBool::new(true));
        let connecting = Arc::new(AtomicBool::new(true));

        let thread_active = active.clone();
        let thread_connecting = connecting.clone();
        let thread_log = log.new(slog::o!("cluster" => config.address.clone()));
        let thread_config = config.clone();

        // Bind happens on the connector thread so `new` does not block the caller on DNS/bind
        // retries; construction failures surface through the first log line instead of here.
        let join = thread::spawn(move || {
            if let Err(err) = connector_loop(thread_config, thread_active.clone(), thread_connecting, &thread_log) {
                slog::error!(thread_log, "cluster socket connector exited"; "error" => %err);
            }
            thread_active.store(false, Ordering::Release);
        });

        Ok(ClusterSocket { active, connecting, join: Some(join), log })
    }

    /// Flips `connecting=false`, causing the connector thread to stop accepting and exit; this
    /// is independent of any live connection's lifetime (§4.3.8).
    pub fn close_connection(&mut self) {
        self.connecting.store(false, Ordering::Release);
        self.active.store(false, Ordering::Release);

        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for ClusterSocket {
    fn drop(&mut self) {
        if self.join.is_some() {
            slog::debug!(self.log, "closing cluster socket");
            self.close_connection();
        }
    }
}

struct ReaderConn {
    input: Buffer,
    payload: Option<Vec<u8>>,
    payload_size: u32,
    payload_index: i64,
    prev_meter: Instant,
    pending_meter_byte: Option<u8>,
}

impl ReaderConn {
    fn new() -> ReaderConn {
        ReaderConn {
            input: Buffer::new(READ_BUF_SIZE),
            payload: None,
            payload_size: 0,
            payload_index: -(MSG_HDR_SIZE as i64),
            prev_meter: Instant::now(),
            pending_meter_byte: None,
        }
    }

    /// §4.3.5 `onAlive`: drains as much of the input stream as is available, assembling complete
    /// frames and posting each to `publisher`. Returns whether any useful work was done (spin
    /// block defence, §4.3.7).
    fn on_readable(&mut self, stream: &mut TcpStream, publisher: &Publisher) -> NetworkResult<bool> {
        let mut did_work = false;

        let ingressed = self.input.ingress(&mut *stream)?;
        if ingressed > 0 {
            did_work = true;
        }

        loop {
            if self.payload_index < 0 {
                if self.input.is_empty() {
                    break;
                }

                let byte = self.input.read_slice()[0];
                self.input.move_head(1);
                did_work = true;

                let shift = (24 - (self.payload_index + MSG_HDR_SIZE as i64) * 8) as u32;
                self.payload_size |= (byte as u32) << shift;
                self.payload_index += 1;

                if self.payload_index == 0 {
                    if !frame::validate_len(self.payload_size) {
                        return Err(NetworkError::OversizedPayload(self.payload_size));
                    }
                    self.payload = Some(vec![0u8; self.payload_size as usize]);
                }
                continue;
            }

            let payload_len = self.payload.as_ref().expect("payload allocated once header completes").len();
            let remaining = payload_len - self.payload_index as usize;

            if remaining == 0 {
                let payload = self.payload.as_ref().expect("payload present at completion");
                let status = publisher.post_copy(payload, gdf_kernel::SYS_TIMEOUT);

                match status {
                    QueueStatus::Timeout => return Ok(did_work),
                    _ => {
                        self.payload = None;
                        self.payload_size = 0;
                        self.payload_index = -(MSG_HDR_SIZE as i64);
                        did_work = true;
                    }
                }
                continue;
            }

            if self.input.is_empty() {
                break;
            }

            let available = self.input.read_slice().len();
            let take = remaining.min(available);
            let offset = self.payload_index as usize;
            self.payload.as_mut().expect("payload present mid-transfer")[offset..offset + take]
                .copy_from_slice(&self.input.read_slice()[..take]);
            self.input.move_head(take);
            self.payload_index += take as i64;
            did_work = true;
        }

        Ok(did_work)
    }

    /// Samples `publisher`'s occupancy once per `METER_PERIOD` and queues a byte to send.
    fn maybe_sample_meter(&mut self, publisher: &Publisher, now: Instant) {
        if now.duration_since(self.prev_meter) >= meter::METER_PERIOD {
            let (count, depth) = publisher.meter_sample();
            self.pending_meter_byte = Some(meter::compute_meter(count, depth));
            self.prev_meter = now;
        }
    }

    fn on_writable(&mut self, stream: &mut TcpStream) -> NetworkResult<bool> {
        if let Some(byte) = self.pending_meter_byte {
            match stream.write(&[byte]) {
                Ok(1) => {
                    self.pending_meter_byte = None;
                    Ok(true)
                }
                Ok(_) => Ok(false),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
                Err(e) => Err(e.into()),
            }
        } else {
            Ok(false)
        }
    }
}

struct WriterConn {
    output: Buffer,
    payload_ref: Option<gdf_fabric::MsgRef>,
    payload_left: usize,
    meter: gdf_kernel::Meter,
    subscriber: Arc<Subscriber>,
    is_blind: bool,
}

impl WriterConn {
    fn new(subscriber: Arc<Subscriber>, is_blind: bool) -> WriterConn {
        WriterConn {
            output: Buffer::new(WRITE_BUF_SIZE),
            payload_ref: None,
            payload_left: 0,
            meter: METER_SEND_THRESH,
            subscriber,
            is_blind,
        }
    }

    /// §4.3.6 `onWrite`: gated on the meter; drains the subscriber into the output buffer framed
    /// with a 4-byte header, then flushes the buffer to the socket.
    fn on_writable(&mut self, stream: &mut TcpStream) -> NetworkResult<bool> {
        let mut did_work = false;

        if self.meter < METER_SEND_THRESH || self.is_blind {
            while self.output.free_capacity() > MSG_HDR_SIZE {
                if self.payload_left > 0 {
                    let msg_ref = self.payload_ref.as_ref().expect("payload_left > 0 implies a held reference");
                    let bytes = msg_ref.bytes();
                    let already_sent = bytes.len() - self.payload_left;
                    let take = self.payload_left.min(self.output.free_capacity());

                    self.output.write_slice()[..take].copy_from_slice(&bytes[already_sent..already_sent + take]);
                    self.output.move_tail(take);
                    self.payload_left -= take;
                    did_work = true;

                    if self.payload_left == 0 {
                        self.payload_ref = None;
                    }
                    continue;
                }

                match self.subscriber.receive_ref(Duration::from_millis(0)) {
                    Ok(msg_ref) => {
                        let len = msg_ref.len() as u32;
                        let mut header = [0u8; MSG_HDR_SIZE];
                        frame::write_header(&mut header, len);
                        self.output.write_slice()[..MSG_HDR_SIZE].copy_from_slice(&header);
                        self.output.move_tail(MSG_HDR_SIZE);

                        self.payload_ref = Some(msg_ref);
                        self.payload_left = len as usize;
                        did_work = true;
                    }
                    Err(_) => break,
                }
            }
        }

        match self.output.egress(&mut *stream) {
            Ok(n) => {
                if n > 0 {
                    did_work = true;
                }
                Ok(did_work)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads raw, unframed meter-feedback bytes (§4.3.3); only the last byte in a batch matters.
    fn on_readable(&mut self, stream: &mut TcpStream) -> NetworkResult<bool> {
        let mut buf = [0u8; 256];
        match stream.read(&mut buf) {
            Ok(0) => Ok(false),
            Ok(n) => {
                self.meter = buf[n - 1];
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

enum Conn {
    Reader(ReaderConn),
    Writer(WriterConn),
}

fn connector_loop(
    config: ClusterConfig,
    active: Arc<AtomicBool>,
    connecting: Arc<AtomicBool>,
    log: &slog::Logger,
) -> NetworkResult<()> {
    let addr: std::net::SocketAddr = config.address.parse()?;
    let listener = TcpListener::bind(&addr)?;
    let poll = Poll::new()?;
    poll.register(&listener, LISTENER_TOKEN, Ready::readable(), PollOpt::edge())?;

    let mut events = Events::with_capacity(1024);
    let mut streams: HashMap<Token, TcpStream> = HashMap::new();
    let mut conns: HashMap<Token, Conn> = HashMap::new();
    let mut next_token = 1usize;

    let reader_publisher = if config.role == SocketRole::Reader {
        Some(gdf_fabric::publisher(&config.queue_name, config.depth))
    } else {
        None
    };

    let shared_writer_subscriber: Option<Arc<Subscriber>> =
        if config.role == SocketRole::Writer && config.variant == ClusterVariant::Queue {
            Some(Arc::new(gdf_fabric::subscriber(
                &config.queue_name,
                SubscriberKind::Confidence,
                config.depth,
                0,
            )))
        } else {
            None
        };

    let mut spin_block = false;

    while connecting.load(Ordering::Acquire) && active.load(Ordering::Acquire) {
        let mut did_work = false;
        let mut to_remove = Vec::new();

        // Force-send every writer connection's pending egress before waiting on poll: under
        // edge-triggered readiness a socket's single writable edge fires at accept and never
        // again once the peer keeps reading, so a record posted to the subscriber after that
        // edge would otherwise never be flushed. Mirrors the teacher's `Endpoint::sync` running
        // `channel.send(now)` on every live channel ahead of the live poll.
        for (token, conn) in conns.iter_mut() {
            if let Conn::Writer(w) = conn {
                let stream = streams.get_mut(token).expect("connection stream present for a live token");
                match w.on_writable(stream) {
                    Ok(work) => did_work |= work,
                    Err(err) => {
                        slog::warn!(log, "connection closed on error"; "error" => %err);
                        to_remove.push(*token);
                    }
                }
            }
        }

        poll.poll(&mut events, Some(POLL_WAIT))?;

        let now = Instant::now();

        for event in events.iter() {
            if event.token() == LISTENER_TOKEN {
                loop {
                    match listener.accept() {
                        Ok((stream, peer)) => {
                            let token = Token(next_token);
                            next_token += 1;

                            poll.register(&stream, token, Ready::readable() | Ready::writable(), PollOpt::edge())?;

                            let conn = match config.role {
                                SocketRole::Reader => Conn::Reader(ReaderConn::new()),
                                SocketRole::Writer => {
                                    let subscriber = match &shared_writer_subscriber {
                                        Some(shared) => shared.clone(),
                                        None => Arc::new(gdf_fabric::subscriber(
                                            &config.queue_name,
                                            SubscriberKind::Opportunity,
                                            config.depth,
                                            0,
                                        )),
                                    };
                                    Conn::Writer(WriterConn::new(subscriber, config.is_blind))
                                }
                            };

                            slog::debug!(log, "accepted cluster connection"; "peer" => %peer, "fd" => next_token - 1);
                            streams.insert(token, stream);
                            conns.insert(token, conn);
                            did_work = true;
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            slog::warn!(log, "accept failed"; "error" => %e);
                            break;
                        }
                    }
                }
                continue;
            }

            let token = event.token();
            let result = (|| -> NetworkResult<bool> {
                let stream = streams.get_mut(&token).expect("connection stream present for a live token");
                let conn = conns.get_mut(&token).expect("connection state present for a live token");

                let mut work = false;
                match conn {
                    Conn::Reader(r) => {
                        if event.readiness().is_readable() {
                            work |= r.on_readable(stream, reader_publisher.as_ref().expect("reader role owns a publisher"))?;
                        }
                        r.maybe_sample_meter(reader_publisher.as_ref().expect("reader role owns a publisher"), now);
                        if event.readiness().is_writable() || r.pending_meter_byte.is_some() {
                            work |= r.on_writable(stream)?;
                        }
                    }
                    Conn::Writer(w) => {
                        if event.readiness().is_readable() {
                            work |= w.on_readable(stream)?;
                        }
                        if event.readiness().is_writable() {
                            work |= w.on_writable(stream)?;
                        }
                    }
                }
                Ok(work)
            })();

            match result {
                Ok(work) => did_work |= work,
                Err(err) => {
                    slog::warn!(log, "connection closed on error"; "error" => %err);
                    to_remove.push(token);
                }
            }
        }

        for token in to_remove {
            if let Some(stream) = streams.remove(&token) {
                let _ = poll.deregister(&stream);
            }
            conns.remove(&token);
            did_work = true;
        }

        if !did_work {
            if spin_block {
                thread::sleep(SPIN_BLOCK_SLEEP);
            }
            spin_block = true;
        } else {
            spin_block = false;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream as StdTcpStream;

    fn free_address() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    }

    /// S3-flavoured smoke test: a WRITER accepts a connection, a plain `TcpStream` peer reads a
    /// single framed record back after it is posted to the internal queue.
    #[test]
    fn writer_frames_a_posted_record_onto_the_wire() {
        let address = free_address();
        let config = ClusterConfig {
            address: address.clone(),
            variant: ClusterVariant::Queue,
            role: SocketRole::Writer,
            queue_name: format!("test_cluster_writer_{}", address.replace([':', '.'], "_")),
            depth: 8,
            // A fresh WriterConn starts at meter == METER_SEND_THRESH (gated shut) and this
            // test's peer never writes a meter byte back, so the writer must be blind to send
            // at all.
            is_blind: true,
        };

        let log = gdf_kernel::logging::discard();
        let mut socket = ClusterSocket::new(config.clone(), log).unwrap();

        // Give the connector thread a moment to bind and start polling.
        thread::sleep(Duration::from_millis(100));

        let publisher = gdf_fabric::publisher(&config.queue_name, config.depth);
        let mut peer = StdTcpStream::connect(&address).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        thread::sleep(Duration::from_millis(100));
        publisher.post_copy(b"hello", Duration::from_millis(500));

        let mut header = [0u8; MSG_HDR_SIZE];
        peer.read_exact(&mut header).unwrap();
        let len = frame::read_header(&header);
        assert_eq!(len, 5);

        let mut payload = vec![0u8; len as usize];
        peer.read_exact(&mut payload).unwrap();
        assert_eq!(&payload, b"hello");

        socket.close_connection();
    }
}
