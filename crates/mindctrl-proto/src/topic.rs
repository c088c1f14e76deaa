//! Broker topic names
//!
//! Every participant is addressed through one of three topics derived from
//! its name. Clients listen on their inbox for responses, servers listen on
//! theirs for requests, and each server keeps a retained status message on
//! its status topic.

/// Root segment shared by all mindctrl topics
pub const TOPIC_ROOT: &str = "mindctrl";

/// Prefix of every server status topic
pub const STATUS_TOPIC_PREFIX: &str = "mindctrl/statuses/";

/// Topic where `client` receives response packets
pub fn client_topic(client: &str) -> String {
    format!("{}/clients/{}", TOPIC_ROOT, client)
}

/// Topic where `server` receives request packets
pub fn server_topic(server: &str) -> String {
    format!("{}/servers/{}", TOPIC_ROOT, server)
}

/// Topic where `server` publishes its retained status
pub fn status_topic(server: &str) -> String {
    format!("{}{}", STATUS_TOPIC_PREFIX, server)
}

/// Check whether `topic` is the status topic of some server
pub fn is_status_topic(topic: &str) -> bool {
    topic.starts_with(STATUS_TOPIC_PREFIX)
}
