//! SHA-256 collapsing signature over `{action, params, resources}`.
//!
//! `serde_json::Map` is `BTreeMap`-backed unless the `preserve_order` feature
//! is enabled (it isn't, here), so serializing it already yields keys in
//! lexicographic order — canonicalization falls out of the default
//! serialization instead of needing a bespoke writer.

use sha2::{Digest, Sha256};

use relay_broker_uri::ResourceKey;

/// Compute the hex-encoded SHA-256 signature for a task's identity.
/// `resources` is sorted before embedding so that equivalent resource *sets*
/// submitted in different orders still hash identically.
pub fn signature(
    action: &str,
    params: &serde_json::Map<String, serde_json::Value>,
    resources: &[ResourceKey],
) -> String {
    let mut sorted_resources: Vec<String> = resources.iter().map(ResourceKey::to_string).collect();
    sorted_resources.sort();

    let canonical = serde_json::json!({
        "action": action,
        "params": params,
        "resources": sorted_resources,
    });
    let bytes = serde_json::to_vec(&canonical).expect("canonical task value always serializes");

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{:02x}", byte).expect("writing to a String cannot fail");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let a = signature("ENTITY", &params(&[("id", json!(42))]), &[ResourceKey::single("ENTITY", "42")]);
        let b = signature("ENTITY", &params(&[("id", json!(42))]), &[ResourceKey::single("ENTITY", "42")]);
        assert_eq!(a, b);
    }

    #[test]
    fn key_insertion_order_does_not_affect_hash() {
        let a = signature(
            "ENTITY",
            &params(&[("id", json!(42)), ("flag", json!(true))]),
            &[],
        );
        let b = signature(
            "ENTITY",
            &params(&[("flag", json!(true)), ("id", json!(42))]),
            &[],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn resource_set_order_does_not_affect_hash() {
        let a = signature(
            "ENTITY",
            &params(&[]),
            &[ResourceKey::single("A", "1"), ResourceKey::single("B", "2")],
        );
        let b = signature(
            "ENTITY",
            &params(&[]),
            &[ResourceKey::single("B", "2"), ResourceKey::single("A", "1")],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn different_actions_hash_differently() {
        let a = signature("ENTITY", &params(&[]), &[]);
        let b = signature("RECORD", &params(&[]), &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn produces_64_hex_characters() {
        let sig = signature("ENTITY", &params(&[]), &[]);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
