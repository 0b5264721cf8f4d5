//! Location helpers

/// Network zone every European location belongs to.
pub const NETWORK_ZONE: &str = "eu-central";

/// Map a location to the datacenter primary IPs and servers are placed in.
///
/// `fsn1` and unknown locations map to `fsn1-dc14`.
pub fn to_datacenter(location: &str) -> &'static str {
    match location {
        "nbg1" => "nbg1-dc3",
        _ => "fsn1-dc14",
    }
}
