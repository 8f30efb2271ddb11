//! Generator with an explicit stop.
//!
//! Run with: cargo run --example generate

use std::time::{SystemTime, UNIX_EPOCH};

use conduit::prelude::*;

/// xorshift step, enough to make the numbers look random
fn next_random(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

#[tokio::main]
async fn main() {
    let mut state = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x2545_f491_4f6c_dd1d)
        | 1;

    let (random, stop) = generate(move || next_random(&mut state) % 1000);

    let printed = random
        .clone()
        .limit(3)
        .parallel_map(|n| n.to_string())
        .for_each(|s| println!("{s}"));
    printed.await;

    stop.stop().await;
    println!("generator stopped: {}", stop.is_stopped());
}
