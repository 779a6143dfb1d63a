use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use dns_lookup::{getnameinfo, lookup_addr};

use super::connection::SocketKind;
use super::error::{Error, Result};

/// Blocking name lookups. Implementations may take seconds to answer.
pub trait Resolver: Send + Sync {
    fn reverse_lookup(&self, addr: IpAddr) -> Result<String>;

    fn service_name(&self, port: u16, kind: SocketKind) -> Result<String>;
}

/// Resolver backed by the system's `getnameinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn reverse_lookup(&self, addr: IpAddr) -> Result<String> {
        let unroutable = match addr {
            IpAddr::V4(ipv4_addr) => ipv4_addr.is_unspecified() || ipv4_addr.is_link_local(),
            IpAddr::V6(ipv6_addr) => ipv6_addr.is_unspecified() || (ipv6_addr.segments()[0] & 0xffc0) == 0xfe80,
        };
        if unroutable {
            return Err(Error::Unresolvable(addr.to_string()));
        }

        lookup_addr(&addr).map_err(|err| Error::Lookup {
            target: addr.to_string(),
            reason: io::Error::from(err).to_string(),
        })
    }

    fn service_name(&self, port: u16, kind: SocketKind) -> Result<String> {
        let sock = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let mut flags = libc::NI_NUMERICHOST;
        if kind == SocketKind::Datagram {
            flags |= libc::NI_DGRAM;
        }

        let (_, service) = getnameinfo(&sock, flags).map_err(|err| Error::Lookup {
            target: format!("{}/{}", port, kind.service_proto()),
            reason: io::Error::from(err).to_string(),
        })?;
        Ok(service)
    }
}

/// Reverse lookup that never fails: the numeric form stands in for a missing name.
pub fn name_or_numeric(resolver: &dyn Resolver, addr: IpAddr) -> String {
    resolver.reverse_lookup(addr).unwrap_or_else(|_| addr.to_string())
}

pub fn service_or_numeric(resolver: &dyn Resolver, port: u16, kind: SocketKind) -> String {
    resolver.service_name(port, kind).unwrap_or_else(|_| port.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_unroutable_addresses_are_not_queried() {
        let resolver = SystemResolver;

        assert!(matches!(
            resolver.reverse_lookup(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            Err(Error::Unresolvable(_))
        ));
        assert!(matches!(
            resolver.reverse_lookup(IpAddr::V4(Ipv4Addr::new(169, 254, 1, 1))),
            Err(Error::Unresolvable(_))
        ));
        assert!(matches!(
            resolver.reverse_lookup(IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))),
            Err(Error::Unresolvable(_))
        ));
    }

    #[test]
    fn test_fallbacks_use_numeric_forms() {
        let resolver = SystemResolver;
        let addr = IpAddr::V4(Ipv4Addr::new(169, 254, 7, 7));

        assert_eq!(name_or_numeric(&resolver, addr), "169.254.7.7");
    }
}
