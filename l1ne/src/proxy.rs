//! # TCP Proxy
//!
//! One nonblocking acceptor thread; per accepted connection the first
//! `Running` instance in deployment order is chosen, one connection slot
//! and two splice buffers are claimed from the static pools as a group,
//! and two joined threads pump bytes until either peer closes. Resource
//! exhaustion refuses the connection outright — there is no queue.
//!
//! The two pools share one mutex, taken only to acquire and release
//! leases; buffers move out of their slots for the splice so the
//! steady-state data path holds no lock.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use l1ne_common::bounded::SlotPool;
use l1ne_common::clock::Clock;
use l1ne_common::consts::{ACCEPT_RETRY_DELAY_MS, BACKEND_CONNECT_TIMEOUT_MS, PROXY_BUFFER_SIZE};
use l1ne_common::limits::RuntimeLimits;
use l1ne_wal::{WalEntry, WalWriter};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::supervisor::{InstanceState, InstanceTable};

/// Connection bookkeeping pool capacity.
const CONNECTION_SLOTS: usize = 64;
/// Splice buffer pool capacity.
const BUFFER_SLOTS: usize = 64;
/// Concurrent splices the buffer pool can serve (two buffers each).
const MAX_CONCURRENT_SPLICES: usize = BUFFER_SLOTS / 2;

type SpliceBuffer = Box<[u8; PROXY_BUFFER_SIZE]>;

/// Error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Pool refusal: no connection slot or buffer pair available.
    #[error("proxy connection slots exhausted")]
    ResourceExhausted,

    /// No instance in `Running` state.
    #[error("no running instance available")]
    NoHealthyInstance,

    /// Backend actively refused.
    #[error("backend refused connection at {addr}")]
    BackendRefused { addr: SocketAddr },

    /// Backend route failed.
    #[error("backend unreachable at {addr}")]
    BackendUnreachable { addr: SocketAddr },

    /// Backend connect exceeded its window.
    #[error("backend connect timed out at {addr}")]
    BackendTimeout { addr: SocketAddr },

    /// IO error on the client side of the splice.
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Bookkeeping for one forwarded connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyConnection {
    pub connection_id: u64,
    pub service_id: u32,
    pub client_port: u16,
}

/// A connection slot plus its two splice buffers, held for the lifetime
/// of one forwarded connection.
pub struct ConnectionLease {
    connection_index: usize,
    client_to_backend_index: usize,
    backend_to_client_index: usize,
    client_to_backend: SpliceBuffer,
    backend_to_client: SpliceBuffer,
}

/// The two statically dimensioned pools behind the proxy.
///
/// Both pools are declared at the 64-slot maximum; the active prefix is
/// narrowed at construction to `min(proxy_connections_max, 32)` connection
/// slots and exactly twice that many buffers, so a connection slot always
/// has its buffer pair and a group acquisition cannot half-succeed.
pub struct ProxyPools {
    connections: SlotPool<ProxyConnection, CONNECTION_SLOTS>,
    buffers: SlotPool<Option<SpliceBuffer>, BUFFER_SLOTS>,
}

impl ProxyPools {
    pub fn new(max_connections: u32) -> Self {
        let active = (max_connections as usize).clamp(1, MAX_CONCURRENT_SPLICES);
        let mut pools = Self {
            connections: SlotPool::new([ProxyConnection::default(); CONNECTION_SLOTS]),
            buffers: SlotPool::new(std::array::from_fn(|_| {
                Some(Box::new([0u8; PROXY_BUFFER_SIZE]))
            })),
        };
        pools.connections.configure_active_slots(active);
        pools.buffers.configure_active_slots(active * 2);
        pools
    }

    /// Claim one connection slot and two buffers, all or nothing.
    pub fn acquire(&mut self, connection: ProxyConnection) -> Option<ConnectionLease> {
        let (connection_index, slot) = self.connections.acquire()?;
        *slot = connection;

        let Some((index_a, slot_a)) = self.buffers.acquire() else {
            self.connections.release(connection_index);
            return None;
        };
        let buffer_a = slot_a.take().expect("free buffer slot holds its buffer");

        match self.buffers.acquire() {
            Some((index_b, slot_b)) => {
                let buffer_b = slot_b.take().expect("free buffer slot holds its buffer");
                Some(ConnectionLease {
                    connection_index,
                    client_to_backend_index: index_a,
                    backend_to_client_index: index_b,
                    client_to_backend: buffer_a,
                    backend_to_client: buffer_b,
                })
            }
            None => {
                *self.buffers.slot_mut(index_a) = Some(buffer_a);
                self.buffers.release(index_a);
                self.connections.release(connection_index);
                None
            }
        }
    }

    /// Return the buffers to their slots and free all three.
    pub fn release(&mut self, lease: ConnectionLease) {
        *self.buffers.slot_mut(lease.client_to_backend_index) = Some(lease.client_to_backend);
        self.buffers.release(lease.client_to_backend_index);
        *self.buffers.slot_mut(lease.backend_to_client_index) = Some(lease.backend_to_client);
        self.buffers.release(lease.backend_to_client_index);
        self.connections.release(lease.connection_index);
    }

    pub fn busy_connections(&self) -> usize {
        self.connections.busy_count()
    }

    pub fn connection_capacity(&self) -> usize {
        self.connections.active_capacity()
    }
}

/// Shared proxy state; the acceptor and every splice thread hold an `Arc`.
pub struct Proxy {
    pools: Mutex<ProxyPools>,
    instances: InstanceTable,
    wal: Arc<Mutex<WalWriter>>,
    clock: Arc<Mutex<Clock>>,
    running: AtomicBool,
    next_connection_id: AtomicU64,
}

impl Proxy {
    pub fn new(
        limits: &RuntimeLimits,
        instances: InstanceTable,
        wal: Arc<Mutex<WalWriter>>,
        clock: Arc<Mutex<Clock>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pools: Mutex::new(ProxyPools::new(limits.proxy_connections_max())),
            instances,
            wal,
            clock,
            running: AtomicBool::new(true),
            next_connection_id: AtomicU64::new(1),
        })
    }

    /// Ask the acceptor loop to wind down after its next wakeup.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Accept until stopped. `WouldBlock` sleeps briefly and retries;
    /// per-connection failures are logged and contained.
    pub fn run_acceptor(self: &Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "proxy accepting connections");
        while self.running.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let proxy = Arc::clone(self);
                    std::thread::Builder::new()
                        .name("l1ne-splice".to_string())
                        .spawn(move || {
                            if let Err(e) = proxy.handle_connection(stream, peer) {
                                warn!(%peer, error = %e, "connection dropped");
                            }
                        })?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(ACCEPT_RETRY_DELAY_MS));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        info!("proxy acceptor stopped");
        Ok(())
    }

    /// First instance in deployment order whose state is `Running`.
    fn select_instance(&self) -> Option<(u32, SocketAddr)> {
        let table = self.instances.read();
        table
            .iter()
            .find(|i| i.state == InstanceState::Running)
            .map(|i| (i.service_id, SocketAddr::from(([127, 0, 0, 1], i.port))))
    }

    fn handle_connection(&self, client: TcpStream, peer: SocketAddr) -> Result<(), ProxyError> {
        // The listener is nonblocking; the splice must not be.
        client.set_nonblocking(false)?;

        let Some((service_id, backend_addr)) = self.select_instance() else {
            debug!(%peer, "no running instance; dropping connection");
            return Err(ProxyError::NoHealthyInstance);
        };
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        let lease = self.pools.lock().acquire(ProxyConnection {
            connection_id,
            service_id,
            client_port: peer.port(),
        });
        let Some(mut lease) = lease else {
            debug!(%peer, connection_id, "pools exhausted; refusing connection");
            return Err(ProxyError::ResourceExhausted);
        };

        let result = self.forward(
            &client,
            connection_id,
            service_id,
            peer.port(),
            backend_addr,
            &mut lease,
        );
        self.pools.lock().release(lease);
        result
    }

    fn forward(
        &self,
        client: &TcpStream,
        connection_id: u64,
        service_id: u32,
        client_port: u16,
        backend_addr: SocketAddr,
        lease: &mut ConnectionLease,
    ) -> Result<(), ProxyError> {
        let backend = TcpStream::connect_timeout(
            &backend_addr,
            Duration::from_millis(BACKEND_CONNECT_TIMEOUT_MS),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ConnectionRefused => ProxyError::BackendRefused { addr: backend_addr },
            ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                ProxyError::BackendTimeout { addr: backend_addr }
            }
            _ => ProxyError::BackendUnreachable { addr: backend_addr },
        })?;

        self.append_wal(WalEntry::proxy_accept(
            self.stamp(),
            connection_id,
            service_id,
            client_port,
        ));
        debug!(connection_id, %backend_addr, "splicing");

        let mut client_read = client.try_clone()?;
        let mut client_write = client.try_clone()?;
        let mut backend_write = backend.try_clone()?;
        let mut backend_read = backend;

        let upstream_buffer = &mut lease.client_to_backend;
        let downstream_buffer = &mut lease.backend_to_client;

        let (bytes_sent, bytes_received) = std::thread::scope(|scope| {
            let upstream = scope.spawn(move || {
                splice_direction(&mut client_read, &mut backend_write, upstream_buffer)
            });
            let received = splice_direction(&mut backend_read, &mut client_write, downstream_buffer);
            let sent = upstream.join().expect("splice thread panicked");
            (sent, received)
        });

        self.append_wal(WalEntry::proxy_close(
            self.stamp(),
            connection_id,
            bytes_sent,
            bytes_received,
        ));
        debug!(connection_id, bytes_sent, bytes_received, "connection closed");
        Ok(())
    }

    fn stamp(&self) -> u64 {
        self.clock.lock().now_us()
    }

    /// Connection-scoped WAL trouble is contained to that connection.
    fn append_wal(&self, entry: WalEntry) {
        if let Err(e) = self.wal.lock().write_entry(&entry) {
            warn!(error = %e, "WAL append failed");
        }
    }

    pub fn busy_connections(&self) -> usize {
        self.pools.lock().busy_connections()
    }
}

/// Pump one direction until EOF or a terminal error; returns bytes moved.
///
/// `WouldBlock` on the read side is retried; reset/broken-pipe class
/// errors end the direction. The peer's write side is shut down on exit
/// so the opposite direction sees EOF.
fn splice_direction(
    src: &mut TcpStream,
    dst: &mut TcpStream,
    buffer: &mut [u8; PROXY_BUFFER_SIZE],
) -> u64 {
    let mut total = 0u64;
    loop {
        match src.read(&mut buffer[..]) {
            Ok(0) => break,
            Ok(n) => {
                if dst.write_all(&buffer[..n]).is_err() {
                    break;
                }
                total += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(_) => break,
        }
    }
    let _ = dst.shutdown(Shutdown::Write);
    total
}
