//! Access-token generation and validation
//!
//! Tokens authenticate both human users and MCP clients against the gateway.
//! Generated tokens are 256-bit random values rendered as unpadded URL-safe
//! base64. Operator-supplied tokens are accepted as long as they meet the
//! minimum length and contain no whitespace.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

const TOKEN_BYTES: usize = 32;
const MIN_TOKEN_LEN: usize = 8;

/// Reasons an operator-supplied access token is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidToken {
    #[error("access token must be at least {MIN_TOKEN_LEN} characters long")]
    TooShort,

    #[error("access token must not contain whitespace characters")]
    ContainsWhitespace,
}

/// Generate a new secure random access token
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Validate an operator-supplied access token
///
/// Deliberately permissive beyond the minimum length and whitespace rules,
/// leaving token hygiene up to the operator.
pub fn validate_access_token(token: &str) -> Result<(), InvalidToken> {
    if token.len() < MIN_TOKEN_LEN {
        return Err(InvalidToken::TooShort);
    }
    if token.chars().any(char::is_whitespace) {
        return Err(InvalidToken::ContainsWhitespace);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_token_decodes_to_32_bytes() {
        let token = generate_access_token();
        assert!(!token.contains('='));
        let decoded = URL_SAFE_NO_PAD.decode(&token).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn generated_tokens_pass_validation() {
        for _ in 0..100 {
            validate_access_token(&generate_access_token()).unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_generations_are_distinct() {
        let handles: Vec<_> = (0..1000)
            .map(|_| tokio::spawn(async { generate_access_token() }))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            seen.insert(handle.await.unwrap());
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn rejects_short_tokens() {
        assert_eq!(validate_access_token(""), Err(InvalidToken::TooShort));
        assert_eq!(validate_access_token("abc1234"), Err(InvalidToken::TooShort));
    }

    #[test]
    fn rejects_whitespace() {
        for token in ["has space8", "has\ttab8", "has\nnewline", "trailing-ws "] {
            assert_eq!(validate_access_token(token), Err(InvalidToken::ContainsWhitespace));
        }
    }

    #[test]
    fn accepts_minimal_valid_token() {
        validate_access_token("abcd1234").unwrap();
    }
}
