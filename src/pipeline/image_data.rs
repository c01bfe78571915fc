use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use image::ImageFormat;
use thiserror::Error;

/// Media-type header carried by stored step outputs and chained form fields.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageDataError {
    #[error("image payload is empty")]
    Empty,
    #[error("image payload is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("image data URL must start with 'data:image/png;base64,'")]
    MissingDataUrlPrefix,
}

/// Encoded PNG produced by the processing service. Cloning shares the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    base64: Arc<str>,
}

impl EncodedImage {
    /// Wraps a raw base64 payload as returned in the service's `image` field.
    pub fn from_base64(payload: &str) -> Result<Self, ImageDataError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(ImageDataError::Empty);
        }
        BASE64_STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| ImageDataError::InvalidBase64(e.to_string()))?;
        Ok(Self {
            base64: Arc::from(payload),
        })
    }

    /// Strips the PNG data-URL header and wraps what remains.
    pub fn from_data_url(value: &str) -> Result<Self, ImageDataError> {
        let payload = value
            .strip_prefix(PNG_DATA_URL_PREFIX)
            .ok_or(ImageDataError::MissingDataUrlPrefix)?;
        Self::from_base64(payload)
    }

    pub fn as_base64(&self) -> &str {
        &self.base64
    }

    /// Form-field value used when this image feeds the next step.
    pub fn to_data_url(&self) -> String {
        format!("{PNG_DATA_URL_PREFIX}{}", self.base64)
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>, ImageDataError> {
        BASE64_STANDARD
            .decode(self.base64.as_bytes())
            .map_err(|e| ImageDataError::InvalidBase64(e.to_string()))
    }

    pub fn encoded_len(&self) -> usize {
        self.base64.len()
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("encoded_len", &self.base64.len())
            .finish()
    }
}

/// User-supplied source image, held as opaque bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct OriginalImage {
    bytes: Arc<[u8]>,
    file_name: String,
    mime: String,
}

impl OriginalImage {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Result<Self, ImageDataError> {
        if bytes.is_empty() {
            return Err(ImageDataError::Empty);
        }
        let file_name = file_name.into();
        let file_name = if file_name.trim().is_empty() {
            String::from("image.png")
        } else {
            file_name.trim().to_string()
        };
        let mime = sniff_mime(bytes.as_slice(), file_name.as_str());
        Ok(Self {
            bytes: Arc::from(bytes),
            file_name,
            mime,
        })
    }

    /// Accepts either a bare base64 payload or any `data:<mime>;base64,` URL.
    pub fn from_base64_upload(
        data: &str,
        file_name: impl Into<String>,
    ) -> Result<Self, ImageDataError> {
        let data = data.trim();
        let payload = match data.strip_prefix("data:") {
            Some(rest) => rest
                .split_once(";base64,")
                .map(|(_, payload)| payload)
                .ok_or(ImageDataError::MissingDataUrlPrefix)?,
            None => data,
        };
        let bytes = BASE64_STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| ImageDataError::InvalidBase64(e.to_string()))?;
        Self::new(bytes, file_name)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn file_name(&self) -> &str {
        self.file_name.as_str()
    }

    pub fn mime(&self) -> &str {
        self.mime.as_str()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for OriginalImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginalImage")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn sniff_mime(bytes: &[u8], file_name: &str) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return String::from(format.to_mime_type());
    }
    mime_for_path(Path::new(file_name))
}

fn mime_for_path(path: &Path) -> String {
    path.extension()
        .and_then(ImageFormat::from_extension)
        .map(|format| String::from(format.to_mime_type()))
        .unwrap_or_else(|| String::from("application/octet-stream"))
}
