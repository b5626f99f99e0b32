use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

/// API keys are opaque UUID strings handed to external callers.
pub fn generate_api_key() -> String {
    Uuid::new_v4().to_string()
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Mask an API key for display: keep enough to recognize it, never enough
/// to use it.
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }
    format!("{}****{}", &key[..4], &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_key_hides_the_middle() {
        let key = "12345678-abcd-efgh-ijkl-1234567890ab";
        let masked = mask_api_key(key);
        assert!(masked.starts_with("1234"));
        assert!(masked.ends_with("90ab"));
        assert!(!masked.contains("abcd-efgh"));
    }

    #[test]
    fn short_key_fully_masked() {
        assert_eq!(mask_api_key("abc"), "****");
    }
}
