//! Port probing and contiguous allocation for the server pool

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Check whether something is already listening on `localhost:port`
///
/// A successful TCP connect means the port is occupied. The probe socket is
/// scoped to this function and closed on every exit path.
pub fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
}

/// Reserve `count` contiguous ports starting at `base`
///
/// Returns `base, base+1, ..., base+count-1`. The first occupied candidate
/// fails the whole allocation; there is no retry or fallback.
///
/// # Errors
/// [`Error::PortInUse`] for the first occupied candidate, [`Error::Config`]
/// when the range would run past the maximum port number.
pub fn allocate_ports(base: u16, count: usize) -> Result<Vec<u16>> {
    let mut ports = Vec::with_capacity(count);
    for i in 0..count {
        let port = u16::try_from(i)
            .ok()
            .and_then(|offset| base.checked_add(offset))
            .ok_or_else(|| {
                Error::Config(format!("port range {base}+{count} exceeds {}", u16::MAX))
            })?;
        if is_port_in_use(port) {
            return Err(Error::PortInUse(port));
        }
        ports.push(port);
    }
    Ok(ports)
}
