//! Broker client identifiers
//!
//! The broker drops an existing session when a second one connects with the
//! same client identifier, so every connection gets a fresh identifier made
//! of a prefix, the process id, a microsecond timestamp and a random number.

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generate a broker client identifier, optionally tagged with `prefix`
pub fn generate_client_id(prefix: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;

    build_client_id(prefix, std::process::id(), now, random_component(&mut OsRng, now))
}

fn build_client_id(prefix: &str, pid: u32, micros: u64, random: u64) -> String {
    let mut id = String::from("mindctrl_");
    if !prefix.is_empty() {
        id.push_str(prefix);
        id.push('_');
    }
    id.push_str(&format!("{}_{}_{}", pid, micros, random));
    id
}

/// Draw from `source`, falling back to a generator seeded from `seed` when
/// the source cannot deliver.
fn random_component<R: RngCore>(source: &mut R, seed: u64) -> u64 {
    let mut buf = [0u8; 8];
    match source.try_fill_bytes(&mut buf) {
        Ok(()) => u64::from_le_bytes(buf),
        Err(_) => StdRng::seed_from_u64(seed).next_u64(),
    }
}
