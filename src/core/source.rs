use netstat2::{get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo};
use tracing::debug;

use super::connection::{ConnectionStatus, Family, Protocol, RawConnection, SocketKind};
use super::error::{Error, Result};
use super::process::ProcessDirectory;

/// Supplier of raw connection snapshots.
pub trait ConnectionSource: Send {
    fn enumerate(&mut self) -> Result<Vec<RawConnection>>;
}

/// Reads the host's TCP and UDP tables and joins them with process names.
pub struct SystemSource {
    processes: ProcessDirectory,
}

impl SystemSource {
    pub fn new() -> Self {
        Self {
            processes: ProcessDirectory::new(),
        }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionSource for SystemSource {
    fn enumerate(&mut self) -> Result<Vec<RawConnection>> {
        let af_flags = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
        let proto_flags = ProtocolFlags::TCP | ProtocolFlags::UDP;
        let sockets_info = get_sockets_info(af_flags, proto_flags)
            .map_err(|err| Error::Enumeration(err.to_string()))?;

        self.processes.refresh();

        let mut records = Vec::with_capacity(sockets_info.len());
        for si in sockets_info {
            let Some(&pid) = si.associated_pids.first() else {
                continue;
            };

            // The process may have exited between the two reads.
            let Some(process_name) = self.processes.name(pid) else {
                debug!(pid, "process vanished, dropping row");
                continue;
            };

            let record = match si.protocol_socket_info {
                ProtocolSocketInfo::Tcp(tcp_si) => RawConnection {
                    process_name,
                    pid,
                    protocol: Protocol::new(Family::of(&tcp_si.local_addr), SocketKind::Stream),
                    local_addr: tcp_si.local_addr,
                    local_port: tcp_si.local_port,
                    remote_addr: tcp_si.remote_addr,
                    remote_port: tcp_si.remote_port,
                    status: tcp_si.state.into(),
                },
                ProtocolSocketInfo::Udp(udp_si) => {
                    let family = Family::of(&udp_si.local_addr);
                    RawConnection {
                        process_name,
                        pid,
                        protocol: Protocol::new(family, SocketKind::Datagram),
                        local_addr: udp_si.local_addr,
                        local_port: udp_si.local_port,
                        remote_addr: family.unspecified(),
                        remote_port: 0,
                        status: ConnectionStatus::None,
                    }
                }
            };
            records.push(record);
        }

        debug!(count = records.len(), "enumerated connections");
        Ok(records)
    }
}
