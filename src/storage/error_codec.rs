//! Error token codec
//!
//! A recorded error is stored in a single column as percent-encoded JSON,
//! which keeps `;` and line breaks out of the token. The empty token means
//! "no error" and is what V2 lines carry when nothing went wrong.

use crate::storage::types::RecordedError;

/// Name given to errors whose token could not be decoded
const PLACEHOLDER_NAME: &str = "Error";

/// Encode an error into a delimiter-safe token
pub fn encode(error: &RecordedError) -> String {
    let json = serde_json::to_string(error).unwrap_or_else(|_| {
        serde_json::json!({ "name": error.name, "message": error.message }).to_string()
    });
    urlencoding::encode(&json).into_owned()
}

/// Decode a token produced by [`encode`]
///
/// Never fails: a token that is not percent-encoded JSON still yields an
/// error value carrying the raw token as its message.
pub fn decode(token: &str) -> Option<RecordedError> {
    if token.is_empty() {
        return None;
    }

    let decoded = match urlencoding::decode(token) {
        Ok(text) => text.into_owned(),
        Err(e) => {
            tracing::debug!("Error token is not valid percent-encoding: {}", e);
            return Some(placeholder(token));
        }
    };

    match serde_json::from_str::<RecordedError>(&decoded) {
        Ok(error) => Some(error),
        Err(e) => {
            tracing::debug!("Error token is not a serialized error: {}", e);
            Some(placeholder(&decoded))
        }
    }
}

fn placeholder(message: &str) -> RecordedError {
    RecordedError::new(PLACEHOLDER_NAME, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_token_is_no_error() {
        assert!(decode("").is_none());
    }

    #[test]
    fn test_token_has_no_delimiters() {
        let error = RecordedError::new("ValidationError", "bad input;\nline two\r")
            .additional_information(json!({"field": "a;b"}));

        let token = encode(&error);
        assert!(!token.contains(';'));
        assert!(!token.contains('\n'));
        assert!(!token.contains('\r'));
        assert!(!token.is_empty());

        assert_eq!(decode(&token), Some(error));
    }

    #[test]
    fn test_code_survives() {
        let error = RecordedError::new("NotFoundError", "no such process").code(404);
        let decoded = decode(&encode(&error)).unwrap();
        assert_eq!(decoded.code, Some(404));
        assert_eq!(decoded.name, "NotFoundError");
    }

    #[test]
    fn test_malformed_token_degrades() {
        let decoded = decode("not%20json").unwrap();
        assert_eq!(decoded.name, "Error");
        assert_eq!(decoded.message, "not json");

        // Invalid UTF-8 after percent-decoding
        let decoded = decode("%FF%FE").unwrap();
        assert_eq!(decoded.message, "%FF%FE");
    }

    #[test]
    fn test_plain_json_token_is_accepted() {
        let decoded = decode(r#"{"name":"TypeError","message":"x is undefined"}"#).unwrap();
        assert_eq!(decoded.name, "TypeError");
        assert_eq!(decoded.message, "x is undefined");
    }
}
