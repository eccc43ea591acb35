use validator::ValidationError;

const MAX_SDP_LEN: usize = 64 * 1024;
const MAX_CANDIDATE_LEN: usize = 1024;

pub fn validate_sdp(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.len() > MAX_SDP_LEN {
        return Err(ValidationError::new("sdp_length"));
    }
    Ok(())
}

pub fn validate_candidate_attr(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.len() > MAX_CANDIDATE_LEN {
        return Err(ValidationError::new("candidate_length"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_oversized_sdp() {
        assert!(validate_sdp("").is_err());
        assert!(validate_sdp("v=0\r\no=- 0 0 IN IP4 127.0.0.1").is_ok());
        assert!(validate_sdp(&"a".repeat(MAX_SDP_LEN + 1)).is_err());
    }

    #[test]
    fn rejects_oversized_candidate_attr() {
        assert!(validate_candidate_attr("candidate:1 1 udp 1 10.0.0.1 9 typ host").is_ok());
        assert!(validate_candidate_attr(&"c".repeat(MAX_CANDIDATE_LEN + 1)).is_err());
    }
}
