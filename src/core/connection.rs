use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use netstat2::TcpState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    pub fn unspecified(&self) -> IpAddr {
        match self {
            Family::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Family::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SocketKind {
    Stream,
    Datagram,
}

impl SocketKind {
    /// Protocol name as used by the services database.
    pub fn service_proto(&self) -> &'static str {
        match self {
            SocketKind::Stream => "tcp",
            SocketKind::Datagram => "udp",
        }
    }
}

/// Transport family and socket type. Field order gives TCP < UDP < TCPV6 < UDPV6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Protocol {
    pub family: Family,
    pub kind: SocketKind,
}

impl Protocol {
    pub const fn new(family: Family, kind: SocketKind) -> Self {
        Self { family, kind }
    }

    pub fn label(&self) -> &'static str {
        match (self.kind, self.family) {
            (SocketKind::Stream, Family::V4) => "TCP",
            (SocketKind::Datagram, Family::V4) => "UDP",
            (SocketKind::Stream, Family::V6) => "TCPV6",
            (SocketKind::Datagram, Family::V6) => "UDPV6",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    None,
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    DeleteTcb,
    Unknown,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::None => "NONE",
            ConnectionStatus::Established => "ESTABLISHED",
            ConnectionStatus::SynSent => "SYN_SENT",
            ConnectionStatus::SynRecv => "SYN_RECV",
            ConnectionStatus::FinWait1 => "FIN_WAIT1",
            ConnectionStatus::FinWait2 => "FIN_WAIT2",
            ConnectionStatus::TimeWait => "TIME_WAIT",
            ConnectionStatus::Close => "CLOSE",
            ConnectionStatus::CloseWait => "CLOSE_WAIT",
            ConnectionStatus::LastAck => "LAST_ACK",
            ConnectionStatus::Listen => "LISTEN",
            ConnectionStatus::Closing => "CLOSING",
            ConnectionStatus::DeleteTcb => "DELETE_TCB",
            ConnectionStatus::Unknown => "UNKNOWN",
        }
    }

    /// Display form: the NONE sentinel renders blank.
    pub fn display(&self) -> &'static str {
        match self {
            ConnectionStatus::None => "",
            other => other.as_str(),
        }
    }
}

impl From<TcpState> for ConnectionStatus {
    fn from(state: TcpState) -> Self {
        match state {
            TcpState::Closed => ConnectionStatus::Close,
            TcpState::Listen => ConnectionStatus::Listen,
            TcpState::SynSent => ConnectionStatus::SynSent,
            TcpState::SynReceived => ConnectionStatus::SynRecv,
            TcpState::Established => ConnectionStatus::Established,
            TcpState::FinWait1 => ConnectionStatus::FinWait1,
            TcpState::FinWait2 => ConnectionStatus::FinWait2,
            TcpState::CloseWait => ConnectionStatus::CloseWait,
            TcpState::Closing => ConnectionStatus::Closing,
            TcpState::LastAck => ConnectionStatus::LastAck,
            TcpState::TimeWait => ConnectionStatus::TimeWait,
            TcpState::DeleteTcb => ConnectionStatus::DeleteTcb,
            TcpState::Unknown => ConnectionStatus::Unknown,
        }
    }
}

/// One endpoint pair as reported by the host, already joined with its owning process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConnection {
    pub process_name: String,
    pub pid: u32,
    pub protocol: Protocol,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub status: ConnectionStatus,
}

impl RawConnection {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            protocol: self.protocol,
            local_addr: self.local_addr,
            local_port: self.local_port,
            remote_addr: self.remote_addr,
            remote_port: self.remote_port,
        }
    }
}

/// The only thing that identifies a connection across two polls. The pid is
/// deliberately not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub protocol: Protocol,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Fresh,
    Continuing,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRow {
    pub key: u64,                 // Primary key, never used for matching
    pub record: RawConnection,
    pub lifecycle: Lifecycle,
}

impl ConnectionRow {
    pub fn new(key: u64, record: RawConnection) -> Self {
        Self {
            key,
            record,
            lifecycle: Lifecycle::Fresh,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        self.record.natural_key()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.record.status
    }

    pub fn is_ghost(&self) -> bool {
        self.lifecycle == Lifecycle::Deleted
    }
}

/// True when `addr` is the all-zero sentinel of a datagram socket, rendered as "*".
pub fn is_wildcard_addr(addr: &IpAddr, protocol: Protocol) -> bool {
    protocol.kind == SocketKind::Datagram && addr.is_unspecified()
}

pub fn is_wildcard_port(port: u16, protocol: Protocol) -> bool {
    protocol.kind == SocketKind::Datagram && port == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_labels_and_order() {
        let tcp = Protocol::new(Family::V4, SocketKind::Stream);
        let udp = Protocol::new(Family::V4, SocketKind::Datagram);
        let tcp6 = Protocol::new(Family::V6, SocketKind::Stream);
        let udp6 = Protocol::new(Family::V6, SocketKind::Datagram);

        assert_eq!(tcp.label(), "TCP");
        assert_eq!(udp.label(), "UDP");
        assert_eq!(tcp6.label(), "TCPV6");
        assert_eq!(udp6.to_string(), "UDPV6");

        let mut protocols = vec![udp6, tcp6, udp, tcp];
        protocols.sort();
        assert_eq!(protocols, vec![tcp, udp, tcp6, udp6]);
    }

    #[test]
    fn test_status_display_hides_none() {
        assert_eq!(ConnectionStatus::None.display(), "");
        assert_eq!(ConnectionStatus::None.as_str(), "NONE");
        assert_eq!(ConnectionStatus::CloseWait.display(), "CLOSE_WAIT");
        assert_eq!(ConnectionStatus::from(TcpState::SynReceived), ConnectionStatus::SynRecv);
    }

    #[test]
    fn test_wildcards_only_for_datagram() {
        let udp = Protocol::new(Family::V6, SocketKind::Datagram);
        let tcp = Protocol::new(Family::V4, SocketKind::Stream);

        assert!(is_wildcard_addr(&Family::V6.unspecified(), udp));
        assert!(!is_wildcard_addr(&Family::V4.unspecified(), tcp));
        assert!(is_wildcard_port(0, udp));
        assert!(!is_wildcard_port(0, tcp));
        assert!(!is_wildcard_port(53, udp));
    }
}
