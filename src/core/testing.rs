//! Test doubles shared by the core unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::connection::{ConnectionRow, ConnectionStatus, Family, Protocol, RawConnection, SocketKind};
use super::error::{Error, Result};
use super::name_cache::Clock;
use super::resolver::Resolver;
use super::source::ConnectionSource;

pub const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
pub const REMOTE: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

pub fn record(local_port: u16, remote_port: u16, status: ConnectionStatus) -> RawConnection {
    RawConnection {
        process_name: "curl".to_string(),
        pid: 100,
        protocol: Protocol::new(Family::V4, SocketKind::Stream),
        local_addr: LOCAL,
        local_port,
        remote_addr: REMOTE,
        remote_port,
        status,
    }
}

pub fn udp_listener(local_port: u16) -> RawConnection {
    RawConnection {
        process_name: "dnsmasq".to_string(),
        pid: 200,
        protocol: Protocol::new(Family::V4, SocketKind::Datagram),
        local_addr: Family::V4.unspecified(),
        local_port,
        remote_addr: Family::V4.unspecified(),
        remote_port: 0,
        status: ConnectionStatus::None,
    }
}

pub fn row(key: u64, record: RawConnection) -> ConnectionRow {
    ConnectionRow::new(key, record)
}

/// Replays queued snapshots; `None` entries fail like a permission denial.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    snapshots: Arc<Mutex<VecDeque<Option<Vec<RawConnection>>>>>,
}

impl ScriptedSource {
    pub fn push(&self, snapshot: Vec<RawConnection>) {
        self.snapshots.lock().push_back(Some(snapshot));
    }

    pub fn push_failure(&self) {
        self.snapshots.lock().push_back(None);
    }
}

impl ConnectionSource for ScriptedSource {
    fn enumerate(&mut self) -> Result<Vec<RawConnection>> {
        match self.snapshots.lock().pop_front() {
            Some(Some(snapshot)) => Ok(snapshot),
            Some(None) => Err(Error::Enumeration("permission denied".to_string())),
            None => Ok(Vec::new()),
        }
    }
}

/// Answers instantly from fixed tables; anything else fails.
#[derive(Default)]
pub struct StaticResolver {
    names: HashMap<IpAddr, String>,
    services: HashMap<(u16, SocketKind), String>,
}

impl StaticResolver {
    pub fn with_name(mut self, addr: IpAddr, name: &str) -> Self {
        self.names.insert(addr, name.to_string());
        self
    }

    pub fn with_service(mut self, port: u16, kind: SocketKind, name: &str) -> Self {
        self.services.insert((port, kind), name.to_string());
        self
    }
}

impl Resolver for StaticResolver {
    fn reverse_lookup(&self, addr: IpAddr) -> Result<String> {
        self.names.get(&addr).cloned().ok_or_else(|| Error::Lookup {
            target: addr.to_string(),
            reason: "no PTR record".to_string(),
        })
    }

    fn service_name(&self, port: u16, kind: SocketKind) -> Result<String> {
        self.services.get(&(port, kind)).cloned().ok_or_else(|| Error::Lookup {
            target: port.to_string(),
            reason: "unknown service".to_string(),
        })
    }
}

/// Fails every lookup instantly and counts the reverse lookups.
#[derive(Default)]
pub struct CountingResolver {
    calls: AtomicUsize,
}

impl CountingResolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Resolver for CountingResolver {
    fn reverse_lookup(&self, addr: IpAddr) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Unresolvable(addr.to_string()))
    }

    fn service_name(&self, port: u16, _kind: SocketKind) -> Result<String> {
        Err(Error::Unresolvable(port.to_string()))
    }
}

#[derive(Default)]
struct Gate {
    open: bool,
    allowed: HashSet<IpAddr>,
    calls: HashMap<IpAddr, usize>,
}

/// Reverse lookups block until the gate opens or the address is allowed
/// through. Every lookup fails once released.
pub struct GatedResolver {
    gate: Mutex<Gate>,
    released: Condvar,
}

impl GatedResolver {
    pub fn new() -> Self {
        Self {
            gate: Mutex::new(Gate::default()),
            released: Condvar::new(),
        }
    }

    pub fn open(&self) {
        self.gate.lock().open = true;
        self.released.notify_all();
    }

    pub fn allow(&self, addr: IpAddr) {
        self.gate.lock().allowed.insert(addr);
        self.released.notify_all();
    }

    pub fn calls_for(&self, addr: IpAddr) -> usize {
        self.gate.lock().calls.get(&addr).copied().unwrap_or(0)
    }
}

impl Resolver for GatedResolver {
    fn reverse_lookup(&self, addr: IpAddr) -> Result<String> {
        let mut gate = self.gate.lock();
        *gate.calls.entry(addr).or_insert(0) += 1;
        while !gate.open && !gate.allowed.contains(&addr) {
            self.released.wait(&mut gate);
        }
        Err(Error::Unresolvable(addr.to_string()))
    }

    fn service_name(&self, port: u16, _kind: SocketKind) -> Result<String> {
        Err(Error::Unresolvable(port.to_string()))
    }
}

pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}
