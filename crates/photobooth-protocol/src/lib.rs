pub mod codec;
pub mod packets;

pub use codec::{DataUri, JPEG_MIME};
pub use packets::{
    interpret_response, ImageUploadResult, UploadError, UploadImage, UploadOutcome, UploadRequest,
    UploadResponse, UPLOAD_PATH,
};
