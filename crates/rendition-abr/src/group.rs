#![forbid(unsafe_code)]

use std::sync::Arc;

use crate::{SelectionError, SelectionResult};

/// Metadata of one encoded track.
///
/// Formats are shared as `Arc<Format>` and compared by identity when looked
/// up in a selection: two formats with equal fields are still distinct
/// tracks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Format {
    /// Track identifier from the manifest (if available).
    pub id: Option<String>,
    /// Peak bitrate in bits per second (if known).
    pub bitrate: Option<u64>,
    /// Video width in pixels.
    pub width: Option<u32>,
    /// Video height in pixels.
    pub height: Option<u32>,
    /// Frames per second.
    pub frame_rate: Option<f32>,
    /// Codec information (e.g., "avc1.64001f,mp4a.40.2").
    pub codecs: Option<String>,
    /// Container format (MP4, MPEG-TS, etc.).
    pub container: Option<String>,
}

impl Format {
    #[must_use]
    pub fn new(bitrate: u64) -> Self {
        Self {
            bitrate: Some(bitrate),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    #[must_use]
    pub fn with_codecs(mut self, codecs: impl Into<String>) -> Self {
        self.codecs = Some(codecs.into());
        self
    }

    #[must_use]
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Bitrate used for ordering and budget checks; unknown counts as zero.
    #[must_use]
    pub fn bitrate_or_zero(&self) -> u64 {
        self.bitrate.unwrap_or(0)
    }
}

/// Immutable, ordered set of tracks carrying the same content.
#[derive(Clone, Debug)]
pub struct TrackGroup {
    formats: Vec<Arc<Format>>,
}

impl TrackGroup {
    /// Build a group from its formats.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::InvalidArgument`] if `formats` is empty.
    pub fn new<I>(formats: I) -> SelectionResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<Arc<Format>>,
    {
        let formats: Vec<Arc<Format>> = formats.into_iter().map(Into::into).collect();
        if formats.is_empty() {
            return Err(SelectionError::InvalidArgument(
                "track group must contain at least one format".into(),
            ));
        }
        Ok(Self { formats })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<Format>> {
        self.formats.get(index)
    }

    /// Index of `format` in the group, located by identity.
    #[must_use]
    pub fn index_of(&self, format: &Arc<Format>) -> Option<usize> {
        self.formats.iter().position(|f| Arc::ptr_eq(f, format))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Format>> {
        self.formats.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_is_rejected() {
        let result = TrackGroup::new(Vec::<Format>::new());
        assert!(matches!(result, Err(SelectionError::InvalidArgument(_))));
    }

    #[test]
    fn index_of_uses_identity_not_value() {
        let group = TrackGroup::new([Format::new(500_000), Format::new(500_000)]).unwrap();
        let first = group.get(0).unwrap();
        let second = group.get(1).unwrap();

        assert_eq!(**first, **second);
        assert_eq!(group.index_of(first), Some(0));
        assert_eq!(group.index_of(second), Some(1));
        assert_eq!(group.index_of(&Arc::new(Format::new(500_000))), None);
    }

    #[test]
    fn builder_sets_fields() {
        let format = Format::new(2_000_000)
            .with_id("v2")
            .with_size(1280, 720)
            .with_frame_rate(30.0)
            .with_codecs("avc1.64001f")
            .with_container("fmp4");

        assert_eq!(format.id.as_deref(), Some("v2"));
        assert_eq!(format.width, Some(1280));
        assert_eq!(format.height, Some(720));
        assert_eq!(format.bitrate_or_zero(), 2_000_000);
        assert_eq!(Format::default().bitrate_or_zero(), 0);
    }
}
