use tracing::debug;

use crate::error::InputError;

/// Decoded diagnostic card plus its line-split form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDump {
    pub label: String,
    pub text: String,
    pub lines: Vec<String>,
    pub lossy: bool,
}

impl RawDump {
    pub fn from_bytes(label: impl Into<String>, bytes: &[u8]) -> Result<Self, InputError> {
        let label = label.into();
        if let Some(offset) = bytes.iter().position(|byte| *byte == 0) {
            return Err(InputError::Binary { label, offset });
        }

        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let (text, lossy) = match std::str::from_utf8(bytes) {
            Ok(text) => (text.to_string(), false),
            Err(_) => {
                debug!("{label} contains invalid UTF-8; decoding lossily");
                (String::from_utf8_lossy(bytes).into_owned(), true)
            }
        };
        Self::build(label, text, lossy)
    }

    pub fn from_text(label: impl Into<String>, text: &str) -> Result<Self, InputError> {
        Self::from_bytes(label, text.as_bytes())
    }

    fn build(label: String, text: String, lossy: bool) -> Result<Self, InputError> {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        if text.trim().is_empty() {
            return Err(InputError::Empty { label });
        }
        let lines = text.lines().map(str::to_string).collect();
        Ok(Self {
            label,
            text,
            lines,
            lossy,
        })
    }

    pub fn line_refs(&self) -> Vec<&str> {
        self.lines.iter().map(String::as_str).collect()
    }

    pub fn digest(bytes: &[u8]) -> String {
        blake3::hash(bytes).to_hex().to_string()
    }
}
