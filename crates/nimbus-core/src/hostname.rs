//! Hostname validation for instance names.
//!
//! Accepts the RFC-1123-style label grammar:
//! `^[a-z0-9][a-z0-9-]*[a-z0-9]$`, length <= 63. A single-character name is
//! accepted (first and last char classes overlap at length 1).

/// Maximum hostname length.
pub const MAX_HOSTNAME_LEN: usize = 63;

/// Validate a hostname against the grammar above.
pub fn is_valid_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    let bytes = name.as_bytes();
    let is_label_char = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    if !is_label_char(bytes[0]) || !is_label_char(bytes[bytes.len() - 1]) {
        return false;
    }

    bytes[1..bytes.len() - 1]
        .iter()
        .all(|&b| is_label_char(b) || b == b'-')
}

/// Generate a random instance name of the form `instance-<uuid>`, used
/// when a request does not supply a custom name.
pub fn generate_instance_name() -> String {
    format!("instance-{}", uuid::Uuid::new_v4())
}

/// Derive a stable name for the `index`-th logical instance created by
/// `task_id`, used in place of [`generate_instance_name`] wherever a
/// request may be re-executed (crash recovery, a crashed process's next
/// attempt). Calling this twice with the same arguments always yields the
/// same name, so a re-run reconciles against the instance rows and
/// provider resources a prior, interrupted run already created instead of
/// duplicating them.
pub fn deterministic_instance_name(task_id: uuid::Uuid, index: usize) -> String {
    format!("instance-{task_id}-{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(is_valid_hostname("web1"));
        assert!(is_valid_hostname("my-web-server-01"));
    }

    #[test]
    fn accepts_single_char() {
        assert!(is_valid_hostname("a"));
        assert!(is_valid_hostname("9"));
    }

    #[test]
    fn rejects_empty() {
        assert!(!is_valid_hostname(""));
    }

    #[test]
    fn rejects_leading_or_trailing_hyphen() {
        assert!(!is_valid_hostname("-bad"));
        assert!(!is_valid_hostname("bad-"));
    }

    #[test]
    fn rejects_uppercase_and_symbols() {
        assert!(!is_valid_hostname("Under_Score$"));
    }

    #[test]
    fn rejects_length_64() {
        let name: String = std::iter::repeat('a').take(64).collect();
        assert!(!is_valid_hostname(&name));
    }

    #[test]
    fn accepts_length_63() {
        let name: String = std::iter::repeat('a').take(63).collect();
        assert!(is_valid_hostname(&name));
    }

    #[test]
    fn generated_names_are_valid_hostnames_modulo_uuid_dashes() {
        // instance-<uuid> is longer than 63 chars with the "instance-"
        // prefix plus a 36-char UUID (9 + 36 = 45), so it fits, and UUIDs
        // are lowercase hex plus hyphens -- valid label characters.
        let name = generate_instance_name();
        assert!(name.len() <= MAX_HOSTNAME_LEN);
        assert!(name.starts_with("instance-"));
    }

    #[test]
    fn deterministic_names_are_stable_and_valid() {
        let task_id = uuid::Uuid::new_v4();
        let first = deterministic_instance_name(task_id, 0);
        let second = deterministic_instance_name(task_id, 0);
        assert_eq!(first, second, "same task id and index must yield the same name");
        assert!(is_valid_hostname(&first));
    }

    #[test]
    fn deterministic_names_differ_by_index() {
        let task_id = uuid::Uuid::new_v4();
        assert_ne!(
            deterministic_instance_name(task_id, 0),
            deterministic_instance_name(task_id, 1)
        );
    }
}
