use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::llm::media::UploadedImage;
use crate::session::SessionStore;

/// The latest photo a chat sent, waiting for its "Analyze Outfit" button.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub upload_message_id: i32,
    pub image: UploadedImage,
}

#[derive(Clone, Default)]
pub struct AppState {
    pub sessions: SessionStore,
    pub pending_uploads: Arc<Mutex<HashMap<i64, PendingUpload>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A newer upload replaces the chat's previous one.
    pub fn set_pending_upload(&self, chat_id: i64, upload: PendingUpload) {
        self.pending_uploads.lock().insert(chat_id, upload);
    }

    /// Returns the chat's upload only if `upload_message_id` is still its latest.
    pub fn pending_upload_for(&self, chat_id: i64, upload_message_id: i32) -> Option<UploadedImage> {
        self.pending_uploads
            .lock()
            .get(&chat_id)
            .filter(|pending| pending.upload_message_id == upload_message_id)
            .map(|pending| pending.image.clone())
    }
}
