/// Session-scoped random identity of a peer. Regenerated per session, never
/// persisted.
pub type ClientId = String;
/// Identifies one snapshot-request/response exchange.
pub type ReqId = String;
pub type RoomId = String;
pub type ConnectionId = u64;

/// 64 bits of fresh entropy rendered as 16 hex chars.
pub fn random_id() -> String {
    let hex = uuid::Uuid::new_v4().to_simple().to_string();
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_generates_distinct_hex_ids() {
        let a = random_id();
        let b = random_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
