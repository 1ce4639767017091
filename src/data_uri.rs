use std::{fmt, path::Path, str::FromStr};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{FlowError, Result};

/// A base64 `data:` URI, e.g. `data:image/jpeg;base64,/9j/4AAQ...`.
#[derive(Clone, PartialEq, Eq)]
pub struct DataUri {
    mime_type: String,
    data: String,
}

impl DataUri {
    /// Encode raw bytes with an explicit MIME type.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: BASE64.encode(bytes),
        }
    }

    /// Encode raw bytes, guessing the MIME type from a file name.
    pub fn from_bytes_guessed(bytes: &[u8], file_name: impl AsRef<Path>) -> Self {
        let mime = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string();
        Self::from_bytes(bytes, mime)
    }

    /// Parse `data:<mime>[;param=value]*;base64,<payload>`.
    ///
    /// The payload must be non-empty, valid base64.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix("data:").ok_or_else(|| {
            FlowError::invalid_input("photo must be a data URI starting with 'data:'")
        })?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| FlowError::invalid_input("data URI has no ',' before its payload"))?;
        let meta = meta.strip_suffix(";base64").ok_or_else(|| {
            FlowError::invalid_input("data URI must use base64 encoding (';base64,')")
        })?;
        let mime_type = meta.split(';').next().unwrap_or_default().trim();
        if mime_type.is_empty() || !mime_type.contains('/') {
            return Err(FlowError::invalid_input(format!(
                "data URI has no valid MIME type: '{mime_type}'"
            )));
        }
        if payload.is_empty() {
            return Err(FlowError::invalid_input("data URI payload is empty"));
        }
        BASE64
            .decode(payload)
            .map_err(|e| FlowError::invalid_input(format!("data URI payload is not base64: {e}")))?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data: payload.to_string(),
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The payload, still base64-encoded.
    pub fn base64_data(&self) -> &str {
        &self.data
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.data)
            .map_err(|e| FlowError::invalid_input(format!("data URI payload is not base64: {e}")))
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}

// Payloads run to megabytes; keep logs readable.
impl fmt::Debug for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataUri")
            .field("mime_type", &self.mime_type)
            .field("base64_len", &self.data.len())
            .finish()
    }
}

impl FromStr for DataUri {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_parses_back() {
        let uri = DataUri::from_bytes(b"leaf", "image/png");
        let text = uri.to_string();
        assert_eq!(text, "data:image/png;base64,bGVhZg==");

        let parsed: DataUri = text.parse().unwrap();
        assert_eq!(parsed, uri);
        assert_eq!(parsed.decode().unwrap(), b"leaf");
    }

    #[test]
    fn guesses_mime_from_extension() {
        let uri = DataUri::from_bytes_guessed(b"\xff\xd8", "monstera.jpg");
        assert_eq!(uri.mime_type(), "image/jpeg");
    }

    #[test]
    fn accepts_extra_parameters() {
        let uri = DataUri::parse("data:image/webp;name=leaf.webp;base64,AAAA").unwrap();
        assert_eq!(uri.mime_type(), "image/webp");
    }

    #[test]
    fn rejects_malformed_uris() {
        for bad in [
            "",
            "image/png;base64,AAAA",
            "data:image/png,AAAA",
            "data:;base64,AAAA",
            "data:image/png;base64,",
            "data:image/png;base64,not base64!",
        ] {
            let err = DataUri::parse(bad).unwrap_err();
            assert!(err.is_validation(), "{bad}: {err}");
        }
    }
}
