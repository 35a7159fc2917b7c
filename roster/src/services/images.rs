//! Event image editing.

use crate::metrics::IMAGE_EDIT_CONFLICTS;
use roster_core::environment::Clock;
use roster_core::types::{Event, EventId, FileId, FileRef, timestamp};
use roster_core::{AggregateStore, Resource, RosterError, StoreError};
use std::collections::HashSet;
use std::sync::Arc;

/// Images to drop from an event and images to attach.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageEdit {
    /// Ids of attached images to drop; unknown ids are ignored
    pub remove: Vec<FileId>,
    /// New images, placed before the surviving ones in this order
    pub add: Vec<FileRef>,
}

impl ImageEdit {
    /// Apply to an image list, returning `(new list, removed images)`.
    #[must_use]
    pub fn apply(self, images: Vec<FileRef>) -> (Vec<FileRef>, Vec<FileRef>) {
        let remove: HashSet<FileId> = self.remove.into_iter().collect();
        let (removed, kept): (Vec<FileRef>, Vec<FileRef>) =
            images.into_iter().partition(|image| remove.contains(&image.id));

        (self.add.into_iter().chain(kept).collect(), removed)
    }
}

/// Result of an image edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageEditOutcome {
    /// The event as saved
    pub event: Event,
    /// Dropped references. Their stored bytes are untouched.
    pub removed: Vec<FileRef>,
}

/// Image editing over a version-checked whole-event save.
#[derive(Clone)]
pub struct EventImages {
    store: Arc<dyn AggregateStore>,
    clock: Arc<dyn Clock>,
}

impl EventImages {
    /// Create an image editing service.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Drop and attach images in one save.
    ///
    /// # Errors
    ///
    /// - [`RosterError::NotFound`] if the event does not exist
    /// - [`RosterError::ConcurrencyConflict`] if the event changed between the
    ///   read and the save; retry the whole edit
    /// - [`RosterError::StoreUnavailable`] if the store fails
    pub async fn edit_event_images(&self, event_id: EventId, edit: ImageEdit) -> Result<ImageEditOutcome, RosterError> {
        let mut event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| RosterError::not_found(Resource::Event, event_id))?;
        let expected = event.version;

        let (images, removed) = edit.apply(std::mem::take(&mut event.images));
        event.images = images;
        event.updated_at = timestamp::truncate(self.clock.now());

        match self.store.save_event(event.clone(), Some(expected)).await {
            Ok(version) => {
                event.version = version;
                tracing::info!(
                    %event_id,
                    %version,
                    images = event.images.len(),
                    removed = removed.len(),
                    "Event images updated"
                );
                Ok(ImageEditOutcome { event, removed })
            },
            Err(error @ StoreError::ConcurrencyConflict { .. }) => {
                metrics::counter!(IMAGE_EDIT_CONFLICTS).increment(1);
                tracing::warn!(%event_id, %expected, error = %error, "Image edit lost a version race");
                Err(error.into())
            },
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_testing::fixtures::image;

    #[test]
    fn new_images_come_first_and_removed_are_returned() {
        let (a, b, c) = (image("a.png"), image("b.png"), image("c.png"));
        let new = image("new.png");
        let edit = ImageEdit {
            remove: vec![b.id, FileId::new()],
            add: vec![new.clone()],
        };

        let (images, removed) = edit.apply(vec![a.clone(), b.clone(), c.clone()]);

        assert_eq!(images, vec![new, a, c]);
        assert_eq!(removed, vec![b]);
    }

    #[test]
    fn empty_edit_keeps_images() {
        let images = vec![image("a.png"), image("b.png")];
        let (after, removed) = ImageEdit::default().apply(images.clone());
        assert_eq!(after, images);
        assert!(removed.is_empty());
    }
}
