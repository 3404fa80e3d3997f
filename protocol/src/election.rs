//! Deterministic responder election.
//!
//! When several peers in a room can answer a snapshot request, each computes
//! its own response delay from the request id and its own identity. The peer
//! with the smallest delay fires first; everyone else cancels upon seeing its
//! answer. No negotiation, and duplicate answers stay rare rather than
//! impossible.

/// Smallest possible response delay, in milliseconds.
pub const MIN_DELAY_MS: u64 = 30;
/// Width of the delay window the hash score is folded into.
pub const RESPONSE_WINDOW_MS: u64 = 220;

/// 32-bit FNV-1a. Ids are ASCII hex, so hashing Rust chars matches hashing
/// UTF-16 code units on other implementations.
pub fn hash32(s: &str) -> u32 {
    let mut h: u32 = 2166136261;
    for c in s.chars() {
        h ^= c as u32;
        h = h.wrapping_mul(16777619);
    }
    h
}

/// How long a responder waits before answering `req_id`. Pure: the same
/// inputs always produce the same delay.
pub fn response_delay_ms(req_id: &str, responder_id: &str) -> u64 {
    let score = (hash32(req_id) ^ hash32(responder_id)) as u64;
    MIN_DELAY_MS + score % RESPONSE_WINDOW_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_matches_fnv1a_reference_values() {
        assert_eq!(hash32(""), 2166136261);
        assert_eq!(hash32("a"), 3826002220);
        assert_eq!(hash32("req-1"), 3675655953);
        assert_eq!(hash32("deadbeefdeadbeef"), 3778508709);
    }

    #[test]
    fn it_computes_known_delays() {
        assert_eq!(response_delay_ms("req-1", "deadbeefdeadbeef"), 46);
        assert_eq!(response_delay_ms("req-1", "0123456789abcdef"), 66);
        assert_eq!(response_delay_ms("req-1", "cafebabecafebabe"), 242);
        assert_eq!(
            response_delay_ms("abcdef0123456789", "ffeeddccbbaa9988"),
            38
        );
    }

    #[test]
    fn it_is_pure() {
        let first = response_delay_ms("req-1", "deadbeefdeadbeef");
        for _ in 0..10 {
            assert_eq!(response_delay_ms("req-1", "deadbeefdeadbeef"), first);
        }
    }

    #[test]
    fn it_stays_within_the_window() {
        for i in 0..100 {
            let delay = response_delay_ms(&format!("req-{}", i), "deadbeefdeadbeef");
            assert!(delay >= MIN_DELAY_MS);
            assert!(delay < MIN_DELAY_MS + RESPONSE_WINDOW_MS);
        }
    }
}
