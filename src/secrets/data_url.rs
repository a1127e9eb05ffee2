use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;

use super::SecretError;

/// Decodes an RFC 2397 `data:` URL into its payload.
///
/// `data:[<mediatype>][;base64],<data>`. Without `;base64` the payload is
/// percent-decoded.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, SecretError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| SecretError::InvalidDataUrl("missing data: scheme".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| SecretError::InvalidDataUrl("missing ',' separator".into()))?;

    if header.ends_with(";base64") {
        STANDARD
            .decode(payload)
            .or_else(|_| URL_SAFE.decode(payload))
            .map_err(|err| SecretError::InvalidDataUrl(err.to_string()))
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_payload() {
        assert_eq!(
            decode_data_url("data:text/plain;base64,aHVudGVyMg==").unwrap(),
            b"hunter2"
        );
    }

    #[test]
    fn test_percent_encoded_payload() {
        assert_eq!(decode_data_url("data:,a%20b").unwrap(), b"a b");
    }

    #[test]
    fn test_malformed() {
        assert!(decode_data_url("data:nocomma").is_err());
        assert!(decode_data_url("file:x").is_err());
        assert!(decode_data_url("data:;base64,@@@").is_err());
    }
}
