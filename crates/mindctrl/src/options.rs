//! Transport options
//!
//! Every option is optional. Values that are missing or below their floor
//! are replaced when read, so a caller can pass user input straight through.

use mindctrl_broker::ConnectOptions;
use std::time::Duration;

/// Smallest accepted frame ceiling
pub const MIN_FRAME_SIZE: usize = 32 * 1024;

/// Frame ceiling used when none or a too small one is given
pub const DEFAULT_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Smallest and default inbound queue capacity
pub const MIN_QUEUE_CAPACITY: usize = 100;

/// Keep-alive used when none is given, in seconds
pub const DEFAULT_KEEP_ALIVE: u16 = 1800;

/// Shortest enabled keep-alive, in seconds
pub const MIN_KEEP_ALIVE: u16 = 300;

/// Longest keep-alive, in seconds
pub const MAX_KEEP_ALIVE: u16 = u16::MAX;

/// Options accepted when opening a session
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    username: Option<String>,
    password: Option<String>,
    max_frame_size: Option<usize>,
    queue_capacity: Option<usize>,
    keep_alive: Option<i64>,
}

impl TransportOptions {
    /// Options with every value defaulted
    pub fn new() -> Self {
        Self::default()
    }

    /// Set broker credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the largest inbound frame
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = Some(size);
        self
    }

    /// Set the inbound queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set the keep-alive interval in seconds. Negative disables it.
    pub fn with_keep_alive(mut self, seconds: i64) -> Self {
        self.keep_alive = Some(seconds);
        self
    }

    /// Username, if a non-empty one was given
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref().filter(|u| !u.is_empty())
    }

    /// Password, if a non-empty one was given
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Largest inbound frame in bytes
    pub fn max_frame_size(&self) -> usize {
        match self.max_frame_size {
            Some(size) if size >= MIN_FRAME_SIZE => size,
            _ => DEFAULT_FRAME_SIZE,
        }
    }

    /// Inbound queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or(MIN_QUEUE_CAPACITY)
            .max(MIN_QUEUE_CAPACITY)
    }

    /// Keep-alive interval in seconds, 0 when disabled
    pub fn keep_alive(&self) -> u16 {
        match self.keep_alive {
            None | Some(0) => DEFAULT_KEEP_ALIVE,
            Some(seconds) if seconds < 0 => 0,
            Some(seconds) => seconds.clamp(MIN_KEEP_ALIVE as i64, MAX_KEEP_ALIVE as i64) as u16,
        }
    }

    /// Broker session parameters for `client_id`
    pub(crate) fn connect_options(
        &self,
        client_id: String,
        ack_timeout: Duration,
    ) -> ConnectOptions {
        ConnectOptions {
            client_id,
            username: self.username().map(str::to_string),
            password: self.password().map(str::to_string),
            keep_alive: self.keep_alive(),
            max_packet_size: self.max_frame_size(),
            queue_capacity: self.queue_capacity(),
            ack_timeout,
        }
    }
}
