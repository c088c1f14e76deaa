//! Server status sentinels

/// Payload published by a server that is up
pub const ALIVE: &[u8] = b"alive";

/// Payload published by a server that went away
pub const DEAD: &[u8] = b"dead";

/// Status announced on a server status topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Server is accepting requests
    Alive,
    /// Server has quit
    Dead,
}

impl ServerStatus {
    /// Classify a status payload. Anything but the exact sentinels is ignored.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if is_alive(payload) {
            Some(Self::Alive)
        } else if is_dead(payload) {
            Some(Self::Dead)
        } else {
            None
        }
    }

    /// Payload bytes for this status
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Alive => ALIVE,
            Self::Dead => DEAD,
        }
    }
}

/// Check for the exact `alive` payload
pub fn is_alive(payload: &[u8]) -> bool {
    payload == ALIVE
}

/// Check for the exact `dead` payload
pub fn is_dead(payload: &[u8]) -> bool {
    payload == DEAD
}
