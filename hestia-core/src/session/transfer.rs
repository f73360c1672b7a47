//! Upload and post sub-state carried by a session
//!
//! Both live behind the session's transfer lock. The store checks
//! [`TransferState::is_busy`] under that same lock before repurposing a
//! session, so an in-flight upload can never be reset underneath its writer.

use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;

/// A completed transfer goes straight back to `Idle`; its byte count and
/// destination stay readable until the next upload begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    Idle,
    InProgress,
    /// The body stopped before it was complete
    Interrupted,
}

#[derive(Debug, Default)]
pub struct UploadState {
    pub status: UploadStatus,
    /// Declared body length, when known
    pub content_size: Option<u64>,
    pub received: u64,
    /// Path of the last file written by a multipart part
    pub destination: Option<PathBuf>,
    pub(crate) file: Option<File>,
    pub last_error: Option<String>,
}

impl UploadState {
    pub fn begin(&mut self, content_size: Option<u64>) {
        *self = UploadState { status: UploadStatus::InProgress, content_size, ..Default::default() };
    }

    pub fn finish(&mut self) {
        self.file = None;
        self.status = UploadStatus::Idle;
    }

    /// Record a broken transfer; the partial destination file is left for cleanup
    pub fn interrupt(&mut self, reason: impl Into<String>) {
        self.file = None;
        self.status = UploadStatus::Interrupted;
        self.last_error = Some(reason.into());
    }
}

/// Field currently being decoded plus the fields seen so far in this body
#[derive(Debug, Default)]
pub struct PostState {
    /// True between the first body chunk and `finish`/`abort`
    pub active: bool,
    pub current_key: Option<String>,
    pub current_value: Vec<u8>,
    pub last_field: Option<(String, String)>,
    pub params: HashMap<String, String>,
    pub login_user: Option<String>,
    pub login_password: Option<String>,
}

impl PostState {
    pub fn reset(&mut self) {
        *self = PostState::default();
    }
}

#[derive(Debug, Default)]
pub struct TransferState {
    pub upload: UploadState,
    pub post: PostState,
}

impl TransferState {
    /// Mid-upload or mid-post
    pub fn is_busy(&self) -> bool {
        self.post.active || self.upload.status == UploadStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_tracks_upload_and_post() {
        let mut transfer = TransferState::default();
        assert!(!transfer.is_busy());

        transfer.upload.begin(Some(10));
        assert!(transfer.is_busy());
        transfer.upload.interrupt("client gone");
        assert!(!transfer.is_busy());
        assert_eq!(transfer.upload.status, UploadStatus::Interrupted);
        assert_eq!(transfer.upload.last_error.as_deref(), Some("client gone"));

        transfer.post.active = true;
        assert!(transfer.is_busy());
    }

    #[test]
    fn test_finish_returns_to_idle() {
        let mut upload = UploadState::default();
        upload.begin(Some(4));
        upload.received = 4;
        upload.finish();
        assert_eq!(upload.status, UploadStatus::Idle);
        assert_eq!(upload.received, 4);
        assert!(upload.last_error.is_none());
    }
}
