use std::{io::ErrorKind, net::TcpListener};

use crate::AuthError;

/// Lowest port handed out; anything below is a well-known service port.
const MIN_EPHEMERAL_PORT: u16 = 1024;

pub fn allocate_local_port(preferred: u16) -> Result<u16, AuthError> {
    if preferred != 0 {
        // Validate availability.
        return match TcpListener::bind(("127.0.0.1", preferred)) {
            Ok(_) => Ok(preferred),
            Err(e) if e.kind() == ErrorKind::AddrInUse => Err(AuthError::PortInUse(preferred)),
            Err(e) => Err(AuthError::Bind {
                port: preferred,
                source: e,
            }),
        };
    }

    // Ask OS for an ephemeral port. The listener is dropped on return, which
    // frees the port for the callback server to bind moments later.
    for _ in 0..8 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(AuthError::PortUnavailable)?;
        let port = listener
            .local_addr()
            .map_err(AuthError::PortUnavailable)?
            .port();
        if port >= MIN_EPHEMERAL_PORT {
            return Ok(port);
        }
    }

    Err(AuthError::PortUnavailable(std::io::Error::new(
        ErrorKind::AddrNotAvailable,
        "os kept returning reserved ports",
    )))
}
