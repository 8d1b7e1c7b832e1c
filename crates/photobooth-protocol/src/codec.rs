use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// MIME type of every image that crosses the upload boundary.
pub const JPEG_MIME: &str = "image/jpeg";

const DATA_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// An encoded `data:<mime>;base64,<payload>` image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub data: Vec<u8>,
}

impl DataUri {
    pub fn new(mime: &str, data: Vec<u8>) -> Self {
        Self {
            mime: mime.to_string(),
            data,
        }
    }

    pub fn jpeg(data: Vec<u8>) -> Self {
        Self::new(JPEG_MIME, data)
    }

    /// Serialize to the textual URI form used in request bodies and downloads
    pub fn encode(&self) -> String {
        let payload = STANDARD.encode(&self.data);
        let mut uri =
            String::with_capacity(DATA_SCHEME.len() + self.mime.len() + BASE64_MARKER.len() + payload.len());
        uri.push_str(DATA_SCHEME);
        uri.push_str(&self.mime);
        uri.push_str(BASE64_MARKER);
        uri.push_str(&payload);
        uri
    }
}
