use uuid::Uuid;

/// Length of a session id
pub const SESSION_ID_LEN: usize = 12;

/// Generate a short session identifier
/// Format: first 12 lowercase hex characters of a UUID v4
pub fn generate_session_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(SESSION_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_session_id_length() {
        assert_eq!(generate_session_id().len(), SESSION_ID_LEN);
    }

    #[test]
    fn test_generate_session_id_format() {
        let id = generate_session_id();

        // Should only contain lowercase hex characters
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(id.chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generate_session_id_uniqueness() {
        let mut ids = HashSet::new();

        // Generate 1000 ids and check they're all unique
        for _ in 0..1000 {
            assert!(ids.insert(generate_session_id()), "Generated duplicate session ID");
        }
    }
}
