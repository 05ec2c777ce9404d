use sha2::{Digest, Sha256};

/// Normalize an error message for fingerprinting: lowercase, collapse runs of
/// whitespace, trim.
///
/// Normalization is versioned: this is v1. Stripping timestamps or ephemeral
/// identifiers would change every historical fingerprint and break incident
/// correlation, so any strengthening has to ship as an explicit migration,
/// not a silent edit here.
pub fn normalize(message: &str) -> String {
    message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable dedup key for a failure stream: the first 16 hex characters of the
/// SHA-256 of the normalized message.
pub fn error_hash(message: &str) -> String {
    let digest = Sha256::digest(normalize(message).as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("  Connection   REFUSED \t by peer\n"), "connection refused by peer");
        assert_eq!(normalize("plain"), "plain");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn hash_is_referentially_transparent() {
        let a = error_hash("Connection refused");
        let b = error_hash("Connection refused");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_ignores_case_and_spacing() {
        assert_eq!(error_hash("Connection  Refused"), error_hash("connection refused"));
        assert_ne!(error_hash("connection refused"), error_hash("connection reset"));
    }

    #[test]
    fn hash_is_sixteen_hex_chars() {
        let h = error_hash("anything at all");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_message_hashes_the_empty_string() {
        // SHA-256 of "" starts with e3b0c44298fc1c14.
        assert_eq!(error_hash(""), "e3b0c44298fc1c14");
        assert_eq!(error_hash("   "), "e3b0c44298fc1c14");
    }
}
