use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Fixed text shown for transport failures.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error";
/// Fixed text shown when a response body cannot be decoded.
pub const PARSE_ERROR_MESSAGE: &str = "Failed to parse response";
/// Fallback when an upload fails without a structured error body.
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed";

#[derive(Error, Debug)]
pub enum MediaError {
    /// No response was received.
    #[error("Network error: {0}")]
    Network(#[from] BridgeError),

    /// The service answered with a non-success status.
    #[error("Media service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The body did not match the documented shape.
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl MediaError {
    /// Text for error slots and failed upload outcomes.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::Network(_) => NETWORK_ERROR_MESSAGE.to_string(),
            MediaError::Api { message, .. } => message.clone(),
            MediaError::Parse(_) => PARSE_ERROR_MESSAGE.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            MediaError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A file refused before any request is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("File too large. Maximum size is {}MB.", .max_bytes / (1024 * 1024))]
    TooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("Only images and videos are allowed.")]
    UnsupportedType { content_type: String },
}

pub type Result<T> = std::result::Result<T, MediaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let network = MediaError::from(BridgeError::Timeout);
        assert_eq!(network.user_message(), "Network error");

        let api = MediaError::Api {
            status: 404,
            message: "media item not found".to_string(),
        };
        assert_eq!(api.user_message(), "media item not found");
        assert_eq!(api.status(), Some(404));

        assert_eq!(
            MediaError::Parse("eof".to_string()).user_message(),
            "Failed to parse response"
        );
    }

    #[test]
    fn test_rejection_texts() {
        let too_large = UploadRejection::TooLarge {
            size_bytes: 200 * 1024 * 1024,
            max_bytes: 100 * 1024 * 1024,
        };
        assert_eq!(too_large.to_string(), "File too large. Maximum size is 100MB.");

        let wrong_type = UploadRejection::UnsupportedType {
            content_type: "application/pdf".to_string(),
        };
        assert_eq!(wrong_type.to_string(), "Only images and videos are allowed.");
    }
}
