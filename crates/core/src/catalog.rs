//! Typed access to persisted videos and frames.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::StoreError,
    store::{Collection, Store},
    types::{Frame, FrameDescription, VideoInfo},
};

const FRAMES_BY_VIDEO: &str = "video_id";

/// Persisted form of a frame. Thumbnails are session-scoped and not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub id: String,
    pub video_id: String,
    pub timestamp: f64,
    #[serde(with = "base64_bytes")]
    pub image: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<FrameDescription>,
}

impl FrameRecord {
    /// Snapshot of a captured frame; `None` when it carries no image.
    pub fn from_frame(video_id: &str, frame: &Frame) -> Option<Self> {
        Some(Self {
            id: frame.id.clone(),
            video_id: video_id.to_string(),
            timestamp: frame.timestamp,
            image: frame.image.clone()?,
            description: frame.description().cloned(),
        })
    }

    pub fn into_frame(self) -> Frame {
        Frame::restore(self.id, self.timestamp, Some(self.image), None, self.description)
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(value)?)
}

pub struct Catalog<S> {
    store: S,
}

impl<S: Store> Catalog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn save_video_info(&self, video: &VideoInfo) -> Result<(), StoreError> {
        self.store
            .put(Collection::Videos, &video.id, &serde_json::to_value(video)?)
            .await
    }

    pub async fn get_video_info(&self, video_id: &str) -> Result<Option<VideoInfo>, StoreError> {
        self.store
            .get(Collection::Videos, video_id)
            .await?
            .map(decode)
            .transpose()
    }

    /// Every stored video, oldest first.
    pub async fn all_videos(&self) -> Result<Vec<VideoInfo>, StoreError> {
        let mut videos = self
            .store
            .get_all(Collection::Videos)
            .await?
            .into_iter()
            .map(decode::<VideoInfo>)
            .collect::<Result<Vec<_>, _>>()?;
        videos.sort_by_key(|v| v.created_at);
        Ok(videos)
    }

    /// Removes the video and every frame that belongs to it.
    pub async fn delete_video(&self, video_id: &str) -> Result<(), StoreError> {
        self.store.delete(Collection::Videos, video_id).await?;
        self.delete_video_frames(video_id).await
    }

    pub async fn delete_video_frames(&self, video_id: &str) -> Result<(), StoreError> {
        for frame in self.video_frames(video_id).await? {
            self.store.delete(Collection::Frames, &frame.id).await?;
        }
        Ok(())
    }

    pub async fn save_frame(&self, frame: &FrameRecord) -> Result<(), StoreError> {
        self.store
            .put(Collection::Frames, &frame.id, &serde_json::to_value(frame)?)
            .await
    }

    pub async fn get_frame(&self, frame_id: &str) -> Result<Option<FrameRecord>, StoreError> {
        self.store
            .get(Collection::Frames, frame_id)
            .await?
            .map(decode)
            .transpose()
    }

    /// Frames of a video ordered by timestamp.
    pub async fn video_frames(&self, video_id: &str) -> Result<Vec<FrameRecord>, StoreError> {
        let mut frames = self
            .store
            .get_all_by_index(Collection::Frames, FRAMES_BY_VIDEO, &Value::from(video_id))
            .await?
            .into_iter()
            .map(decode::<FrameRecord>)
            .collect::<Result<Vec<_>, _>>()?;
        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(frames)
    }

    /// Stores a description on an existing frame. Unknown ids are ignored.
    pub async fn update_frame_description(
        &self,
        frame_id: &str,
        description: &FrameDescription,
    ) -> Result<(), StoreError> {
        if let Some(mut frame) = self.get_frame(frame_id).await? {
            frame.description = Some(description.clone());
            self.save_frame(&frame).await?;
        }
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), StoreError> {
        self.store.clear(Collection::Videos).await?;
        self.store.clear(Collection::Frames).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn video(id: &str, created_at: u64) -> VideoInfo {
        VideoInfo {
            id: id.to_string(),
            name: format!("{id}.mp4"),
            duration: 12.0,
            width: 1920,
            height: 1080,
            size: 4096,
            frames: Vec::new(),
            created_at,
        }
    }

    fn record(id: &str, video_id: &str, timestamp: f64) -> FrameRecord {
        FrameRecord {
            id: id.to_string(),
            video_id: video_id.to_string(),
            timestamp,
            image: vec![0xFF, 0xD8, 0xFF, 0x00],
            description: None,
        }
    }

    #[tokio::test]
    async fn test_videos_sorted_by_creation() {
        let catalog = Catalog::new(MemoryStore::new());
        catalog.save_video_info(&video("b", 20)).await.unwrap();
        catalog.save_video_info(&video("a", 10)).await.unwrap();

        let ids: Vec<String> = catalog
            .all_videos()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_frame_image_survives_storage() {
        let catalog = Catalog::new(MemoryStore::new());
        catalog.save_frame(&record("f1", "v1", 0.0)).await.unwrap();

        let raw = serde_json::to_value(record("f1", "v1", 0.0)).unwrap();
        assert_eq!(raw["image"], "/9j/AA==");

        let loaded = catalog.get_frame("f1").await.unwrap().unwrap();
        assert_eq!(loaded.image, vec![0xFF, 0xD8, 0xFF, 0x00]);
    }

    #[tokio::test]
    async fn test_delete_video_cascades_to_frames() {
        let catalog = Catalog::new(MemoryStore::new());
        catalog.save_video_info(&video("v1", 1)).await.unwrap();
        catalog.save_frame(&record("f2", "v1", 5.0)).await.unwrap();
        catalog.save_frame(&record("f1", "v1", 0.0)).await.unwrap();
        catalog.save_frame(&record("g1", "v2", 0.0)).await.unwrap();

        let ids: Vec<String> = catalog
            .video_frames("v1")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["f1", "f2"]);

        catalog.delete_video("v1").await.unwrap();
        assert!(catalog.get_video_info("v1").await.unwrap().is_none());
        assert!(catalog.video_frames("v1").await.unwrap().is_empty());
        assert!(catalog.get_frame("g1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_frame_description() {
        let catalog = Catalog::new(MemoryStore::new());
        catalog.save_frame(&record("f1", "v1", 0.0)).await.unwrap();

        let description = FrameDescription {
            en: "a bridge at dusk".into(),
            zh: "黄昏时的桥".into(),
        };
        catalog.update_frame_description("f1", &description).await.unwrap();
        catalog.update_frame_description("nope", &description).await.unwrap();

        let frame = catalog.get_frame("f1").await.unwrap().unwrap().into_frame();
        assert_eq!(frame.description(), Some(&description));
        assert!(catalog.get_frame("nope").await.unwrap().is_none());
    }
}
