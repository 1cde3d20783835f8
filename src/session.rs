//! Per-chat analysis state and the upload → analyze → archive workflow.
//!
//! A session starts `Idle`. Every successful analysis moves it to
//! `HasCurrent`, archiving the previous current entry first. Failures never
//! touch the state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::media::{load_image, EncodedImage, ImageError, ImageSource, UploadedImage};
use crate::llm::openai::AnalysisError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// One analyzed photo. Becomes a history entry once superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisEntry {
    pub image: UploadedImage,
    pub feedback: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    HasCurrent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    current: Option<AnalysisEntry>,
    // oldest first
    history: Vec<AnalysisEntry>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.current.is_some() {
            SessionPhase::HasCurrent
        } else {
            SessionPhase::Idle
        }
    }

    pub fn current(&self) -> Option<&AnalysisEntry> {
        self.current.as_ref()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// History in display order, most recent first.
    pub fn history_newest_first(&self) -> impl Iterator<Item = &AnalysisEntry> {
        self.history.iter().rev()
    }

    /// Records a successful analysis. Only call this after the model replied.
    pub fn record(&mut self, image: UploadedImage, feedback: String) -> &AnalysisEntry {
        if let Some(previous) = self.current.take() {
            self.history.push(previous);
        }
        self.current.insert(AnalysisEntry { image, feedback })
    }
}

/// Sessions keyed by chat id. The lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<i64, SessionState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, chat_id: i64) -> SessionPhase {
        self.sessions
            .lock()
            .get(&chat_id)
            .map_or(SessionPhase::Idle, SessionState::phase)
    }

    pub fn history_len(&self, chat_id: i64) -> usize {
        self.sessions
            .lock()
            .get(&chat_id)
            .map_or(0, SessionState::history_len)
    }

    /// Copies only the current entry, never the history.
    pub fn current(&self, chat_id: i64) -> Option<AnalysisEntry> {
        self.sessions
            .lock()
            .get(&chat_id)
            .and_then(|session| session.current().cloned())
    }

    /// Full copy including every archived image. Meant for `/history`.
    pub fn snapshot(&self, chat_id: i64) -> SessionState {
        self.sessions
            .lock()
            .get(&chat_id)
            .cloned()
            .unwrap_or_else(SessionState::new)
    }

    pub fn record(&self, chat_id: i64, image: UploadedImage, feedback: String) -> AnalysisEntry {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(chat_id).or_default();
        session.record(image, feedback).clone()
    }
}

/// Runs one analysis for `chat_id`. The analyzer only sees the encoded
/// image; the session is updated once it returns `Ok`.
pub async fn run_analysis<F, Fut>(
    store: &SessionStore,
    chat_id: i64,
    source: ImageSource,
    analyzer: F,
) -> Result<AnalysisEntry, WorkflowError>
where
    F: FnOnce(EncodedImage) -> Fut,
    Fut: Future<Output = Result<String, AnalysisError>>,
{
    let image = load_image(&source)?;
    let encoded = image.encode();
    info!(
        "Analyzing {} ({} bytes, {}) for chat {} ({:?})",
        image.name,
        image.bytes.len(),
        encoded.mime_type,
        chat_id,
        store.phase(chat_id)
    );

    let feedback = match analyzer(encoded).await {
        Ok(feedback) => feedback,
        Err(err) => {
            warn!("Analysis for chat {chat_id} failed; session left unchanged: {err}");
            return Err(err.into());
        }
    };

    let entry = store.record(chat_id, image, feedback);
    info!(
        "Chat {} now has a current analysis and {} archived",
        chat_id,
        store.history_len(chat_id)
    );
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn upload(name: &str) -> ImageSource {
        ImageSource::InMemory {
            bytes: name.as_bytes().to_vec(),
            name: name.to_string(),
        }
    }

    async fn succeed(store: &SessionStore, chat_id: i64, name: &str, reply: &str) -> AnalysisEntry {
        let reply = reply.to_string();
        run_analysis(store, chat_id, upload(name), |_| async move { Ok(reply) })
            .await
            .unwrap()
    }

    #[test]
    fn new_session_is_idle() {
        let session = SessionState::new();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.current().is_none());
        assert_eq!(session.history_len(), 0);
    }

    #[tokio::test]
    async fn shirt_then_pants_archives_the_shirt() {
        let store = SessionStore::new();

        succeed(&store, 1, "shirt.png", "A1").await;
        let session = store.snapshot(1);
        let current = session.current().unwrap();
        assert_eq!(current.image.name, "shirt.png");
        assert_eq!(current.feedback, "A1");
        assert_eq!(session.history_len(), 0);

        succeed(&store, 1, "pants.jpg", "A2").await;
        let session = store.snapshot(1);
        let current = session.current().unwrap();
        assert_eq!(current.image.name, "pants.jpg");
        assert_eq!(current.feedback, "A2");
        let history: Vec<_> = session.history_newest_first().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].image.name, "shirt.png");
        assert_eq!(history[0].image.bytes, b"shirt.png".to_vec());
        assert_eq!(history[0].feedback, "A1");
    }

    #[tokio::test]
    async fn n_successes_leave_n_minus_one_in_history() {
        let store = SessionStore::new();
        let n = 6;
        for i in 1..=n {
            succeed(&store, 9, &format!("look{i}.png"), &format!("A{i}")).await;
        }

        let session = store.snapshot(9);
        assert_eq!(session.phase(), SessionPhase::HasCurrent);
        assert_eq!(session.history_len(), n - 1);
        assert_eq!(session.current().unwrap().feedback, format!("A{n}"));

        let feedback: Vec<_> = session
            .history_newest_first()
            .map(|entry| entry.feedback.clone())
            .collect();
        let expected: Vec<_> = (1..n).rev().map(|i| format!("A{i}")).collect();
        assert_eq!(feedback, expected);
    }

    #[tokio::test]
    async fn failed_analysis_leaves_state_unchanged() {
        let store = SessionStore::new();
        succeed(&store, 3, "shirt.png", "A1").await;
        succeed(&store, 3, "pants.jpg", "A2").await;
        let before = store.snapshot(3);

        let result = run_analysis(&store, 3, upload("hat.png"), |_| async {
            Err(AnalysisError::MalformedResponse)
        })
        .await;

        assert!(matches!(
            result,
            Err(WorkflowError::Analysis(AnalysisError::MalformedResponse))
        ));
        assert_eq!(store.snapshot(3), before);
    }

    #[tokio::test]
    async fn failure_on_an_idle_session_stays_idle() {
        let store = SessionStore::new();
        let result = run_analysis(&store, 4, upload("hat.png"), |_| async {
            Err(AnalysisError::MalformedResponse)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(store.snapshot(4).phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn unsupported_path_fails_before_the_analyzer_runs() {
        let dir = std::env::temp_dir().join(format!("ai-stylist-session-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("outfit.bmp");
        std::fs::write(&path, b"BM").unwrap();

        let called = AtomicBool::new(false);
        let store = SessionStore::new();
        let result = run_analysis(&store, 5, ImageSource::Path(path), |_| {
            called.store(true, Ordering::SeqCst);
            async { Ok("never".to_string()) }
        })
        .await;

        assert!(matches!(
            result,
            Err(WorkflowError::Image(ImageError::UnsupportedFormat { .. }))
        ));
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(store.snapshot(5), SessionState::new());
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let store = SessionStore::new();
        let path = std::env::temp_dir().join("ai-stylist-no-such-outfit.jpg");
        let result = run_analysis(&store, 6, ImageSource::Path(path), |_| async {
            Ok("never".to_string())
        })
        .await;
        assert!(matches!(
            result,
            Err(WorkflowError::Image(ImageError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn analyzer_receives_the_encoded_upload() {
        let store = SessionStore::new();
        let entry = run_analysis(&store, 7, upload("abc"), |encoded| async move {
            Ok(encoded.base64)
        })
        .await
        .unwrap();
        assert_eq!(entry.feedback, "YWJj");
    }

    #[tokio::test]
    async fn store_reads_match_the_snapshot() {
        let store = SessionStore::new();
        assert_eq!(store.phase(12), SessionPhase::Idle);
        assert_eq!(store.history_len(12), 0);
        assert!(store.current(12).is_none());

        for i in 1..=3 {
            succeed(&store, 12, &format!("look{i}.png"), &format!("A{i}")).await;
        }
        let snapshot = store.snapshot(12);
        assert_eq!(store.phase(12), snapshot.phase());
        assert_eq!(store.history_len(12), 2);
        assert_eq!(store.current(12).as_ref(), snapshot.current());
        assert_eq!(store.current(12).unwrap().feedback, "A3");
    }

    #[test]
    fn current_does_not_copy_history() {
        let store = SessionStore::new();
        store.record(13, UploadedImage::new(vec![0; 4096], "old.png"), "A1".to_string());
        store.record(13, UploadedImage::new(vec![1; 8], "new.png"), "A2".to_string());

        let current = store.current(13).unwrap();
        assert_eq!(current.image.bytes.len(), 8);
        assert_eq!(store.history_len(13), 1);
    }

    #[tokio::test]
    async fn chats_keep_separate_sessions() {
        let store = SessionStore::new();
        succeed(&store, 10, "shirt.png", "A1").await;
        succeed(&store, 11, "pants.jpg", "B1").await;
        assert_eq!(store.snapshot(10).history_len(), 0);
        assert_eq!(store.snapshot(11).current().unwrap().feedback, "B1");
    }
}
