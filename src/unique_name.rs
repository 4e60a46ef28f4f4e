//! Fleet-wide-unique name assignment for hub projections
//!
//! Hub projections from every member cluster land in per-member namespaces on
//! the hub, keyed by names derived here. The mapping must be deterministic
//! (the same member object always maps to the same hub name), idempotent, and
//! collision-resistant even when the concatenated identity exceeds the
//! DNS-1123 subdomain length limit.

use sha2::{Digest, Sha256};

/// Maximum length of a DNS-1123 subdomain, the limit for object names
const MAX_NAME_LENGTH: usize = 253;

/// Number of hex characters of the identity digest kept as a disambiguating
/// suffix when a name must be truncated
const DIGEST_SUFFIX_LENGTH: usize = 16;

/// Hub-side name for the export projection of a Service.
///
/// Services are always exported using the `ORIGINAL_NAMESPACE-ORIGINAL_NAME`
/// format; for example, a Service from namespace `default` with the name
/// `store` is exported with the name `default-store`. Member clusters are
/// disambiguated by their reserved hub namespaces, so the cluster ID is not
/// part of this name.
pub fn hub_export_name(namespace: &str, name: &str) -> String {
    cap_length(format!("{namespace}-{name}"))
}

/// Fleet-wide-unique name for the projection of an EndpointSlice.
///
/// Unlike Service export projections, EndpointSlice projections may be listed
/// across member namespaces by hub-side consumers, so the member cluster ID is
/// folded into the name.
pub fn fleet_unique_name(cluster_id: &str, namespace: &str, name: &str) -> String {
    cap_length(format!("{cluster_id}-{namespace}-{name}"))
}

/// Cap a derived name at the DNS-1123 subdomain limit.
///
/// Overlong names are truncated and suffixed with a digest of the full
/// identity, keeping the mapping deterministic and collision-resistant for
/// identities that share a long common prefix.
fn cap_length(name: String) -> String {
    if name.len() <= MAX_NAME_LENGTH {
        return name;
    }

    let digest = Sha256::digest(name.as_bytes());
    let mut suffix = String::with_capacity(DIGEST_SUFFIX_LENGTH);
    for byte in digest.iter().take(DIGEST_SUFFIX_LENGTH / 2) {
        suffix.push_str(&format!("{byte:02x}"));
    }

    let prefix_len = MAX_NAME_LENGTH - DIGEST_SUFFIX_LENGTH - 1;
    let mut prefix = name;
    prefix.truncate(prefix_len);
    // Names must not end with a non-alphanumeric character before the suffix.
    while prefix.ends_with('-') || prefix.ends_with('.') {
        prefix.pop();
    }

    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_name_format() {
        assert_eq!(hub_export_name("default", "store"), "default-store");
    }

    #[test]
    fn test_fleet_unique_name_format() {
        assert_eq!(
            fleet_unique_name("member-1", "default", "store-slice"),
            "member-1-default-store-slice"
        );
    }

    #[test]
    fn test_assignment_is_idempotent() {
        let first = fleet_unique_name("member-1", "prod", "api");
        let second = fleet_unique_name("member-1", "prod", "api");
        assert_eq!(first, second);
    }

    #[test]
    fn test_overlong_names_are_capped() {
        let long = "a".repeat(300);
        let name = fleet_unique_name("member-1", &long, "api");
        assert!(name.len() <= MAX_NAME_LENGTH);
    }

    #[test]
    fn test_overlong_names_with_shared_prefix_stay_distinct() {
        let prefix = "a".repeat(300);
        let first = fleet_unique_name("member-1", &prefix, "api-1");
        let second = fleet_unique_name("member-1", &prefix, "api-2");
        assert_ne!(first, second, "digest suffix must disambiguate");
    }

    #[test]
    fn test_capped_names_are_deterministic() {
        let ns = "b".repeat(400);
        assert_eq!(
            fleet_unique_name("member-1", &ns, "api"),
            fleet_unique_name("member-1", &ns, "api")
        );
    }
}
