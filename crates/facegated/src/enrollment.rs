use crate::engine::{EngineError, EngineHandle};
use facegate_core::{EnrollmentRecord, Frame, FrameError};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] FrameError),
    #[error("no face detected in the uploaded image")]
    NoFaceDetected,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Holds at most one enrollment. Replacement swaps a whole `Arc`, so readers
/// see either the old record or the new one.
pub struct EnrollmentStore {
    label: String,
    slot: RwLock<Option<Arc<EnrollmentRecord>>>,
}

impl EnrollmentStore {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            slot: RwLock::new(None),
        }
    }

    /// Snapshot of the current enrollment.
    pub fn current(&self) -> Option<Arc<EnrollmentRecord>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_enrolled(&self) -> bool {
        self.current().is_some()
    }

    /// Replace any previous enrollment.
    pub fn replace(&self, record: EnrollmentRecord) -> Arc<EnrollmentRecord> {
        let record = Arc::new(record);
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        record
    }

    /// Drop the enrollment. Returns whether one was present.
    pub fn clear(&self) -> bool {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    /// Decode an uploaded image, detect its face, and make it the enrollment.
    ///
    /// On any failure the previous enrollment is left in place.
    pub async fn enroll(
        &self,
        engine: &EngineHandle,
        image: &[u8],
    ) -> Result<Arc<EnrollmentRecord>, EnrollError> {
        let frame = Frame::decode(image)?;
        let (width, height) = (frame.width, frame.height);

        let detection = engine
            .detect_image(frame)
            .await?
            .ok_or(EnrollError::NoFaceDetected)?;

        let record = self.replace(EnrollmentRecord::new(self.label.clone(), detection.descriptor));
        tracing::info!(
            label = %record.label,
            width,
            height,
            dim = record.descriptor.len(),
            confidence = detection.bbox.confidence,
            "enrollment updated"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::testing::{descriptor, png_bytes, FixedProvider, StaticSource};

    #[test]
    fn test_replace_overwrites() {
        let store = EnrollmentStore::new("User");
        assert!(!store.is_enrolled());

        store.replace(EnrollmentRecord::new("User", descriptor(&[1.0])));
        let before = store.current().unwrap();
        store.replace(EnrollmentRecord::new("User", descriptor(&[2.0])));

        // A snapshot taken earlier stays intact; the slot holds only the new one.
        assert_eq!(before.descriptor.values(), &[1.0]);
        assert_eq!(store.current().unwrap().descriptor.values(), &[2.0]);
    }

    #[test]
    fn test_clear() {
        let store = EnrollmentStore::new("User");
        assert!(!store.clear());
        store.replace(EnrollmentRecord::new("User", descriptor(&[1.0])));
        assert!(store.clear());
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_enroll_uses_fixed_label() {
        let engine = spawn_engine(FixedProvider::loader(Some(descriptor(&[0.5, 0.5]))), StaticSource::opener()).unwrap();
        let store = EnrollmentStore::new("Foydalanuvchi");

        let record = store.enroll(&engine, &png_bytes()).await.unwrap();
        assert_eq!(record.label, "Foydalanuvchi");
        assert_eq!(record.descriptor.values(), &[0.5, 0.5]);
        assert!(store.is_enrolled());
    }

    #[tokio::test]
    async fn test_no_face_keeps_previous() {
        let engine = spawn_engine(FixedProvider::loader(None), StaticSource::opener()).unwrap();
        let store = EnrollmentStore::new("User");
        store.replace(EnrollmentRecord::new("User", descriptor(&[9.0])));

        let err = store.enroll(&engine, &png_bytes()).await.unwrap_err();
        assert!(matches!(err, EnrollError::NoFaceDetected));
        assert_eq!(store.current().unwrap().descriptor.values(), &[9.0]);
    }

    #[tokio::test]
    async fn test_undecodable_upload() {
        let engine = spawn_engine(FixedProvider::loader(None), StaticSource::opener()).unwrap();
        let store = EnrollmentStore::new("User");

        let err = store.enroll(&engine, b"GIF89a-but-not-really").await.unwrap_err();
        assert!(matches!(err, EnrollError::InvalidImage(_)));
        assert!(!store.is_enrolled());
    }
}
