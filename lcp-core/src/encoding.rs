use data_encoding::BASE64;

use crate::error::DecodeError;

/**
    Decode standard (non-URL-safe) base64, the encoding used throughout
    license JSON and certificate fields.
*/
pub fn base64_decode(s: impl AsRef<[u8]>) -> Result<Vec<u8>, DecodeError> {
    BASE64.decode(s.as_ref()).map_err(|e| DecodeError {
        kind: "base64",
        reason: e.to_string(),
    })
}

pub fn base64_encode(data: impl AsRef<[u8]>) -> String {
    BASE64.encode(data.as_ref())
}

pub fn hex_encode(data: impl AsRef<[u8]>) -> String {
    hex::encode(data.as_ref())
}

pub fn hex_decode(s: impl AsRef<str>) -> Result<Vec<u8>, DecodeError> {
    hex::decode(s.as_ref()).map_err(|e| DecodeError {
        kind: "hex",
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip() {
        let data = b"White whales are huge!";
        let encoded = base64_encode(data);
        let decoded = base64_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn base64_bad_input() {
        let err = base64_decode("not valid base64!!").unwrap_err();
        assert_eq!(err.kind, "base64");
    }

    #[test]
    fn hex_round_trip() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        let encoded = hex_encode(data);
        assert_eq!(encoded, "deadbeef");
        assert_eq!(hex_decode(&encoded).unwrap(), data);
    }
}
