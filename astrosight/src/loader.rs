//! Boundary to the external image decoder.
//!
//! Decoding raw or scientific containers is the caller's business; the
//! pipeline only sees [`Loader`] and the images it hands back.

use std::collections::{HashMap, HashSet};

use common::CancelToken;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{Cancelled, Error};
use crate::frame::{Frame, FrameError, FrameRole, FrameStack, Provenance, SourceId};
use crate::image::Image;

/// A decoded exposure with whatever capture metadata the container carried.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedImage {
    pub image: Image,
    pub provenance: Provenance,
}

impl LoadedImage {
    pub fn new(image: Image) -> Self {
        Self {
            image,
            provenance: Provenance::default(),
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("Source '{id}' not found")]
    NotFound { id: SourceId },

    #[error("Failed to decode '{id}': {message}")]
    Decode { id: SourceId, message: String },

    #[error("Unsupported format '{format}' for '{id}'")]
    UnsupportedFormat { id: SourceId, format: String },

    #[error("I/O error reading '{id}': {message}")]
    Io { id: SourceId, message: String },
}

/// Decodes one source into an image. Called from several threads at once.
pub trait Loader: Send + Sync {
    fn load(&self, source: &SourceId, role: FrameRole) -> Result<LoadedImage, LoadError>;
}

/// Outcome of [`load_stack`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Frames appended to the stack.
    pub loaded: usize,
    /// Sources that failed to load, in request order.
    pub skipped: Vec<(SourceId, LoadError)>,
}

/// Loader over images already in memory, keyed by source id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    images: HashMap<SourceId, LoadedImage>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<SourceId>, image: LoadedImage) {
        self.images.insert(id.into(), image);
    }

    pub fn with(mut self, id: impl Into<SourceId>, image: Image) -> Self {
        self.insert(id, LoadedImage::new(image));
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl Loader for InMemoryLoader {
    fn load(&self, source: &SourceId, _role: FrameRole) -> Result<LoadedImage, LoadError> {
        self.images
            .get(source)
            .cloned()
            .ok_or_else(|| LoadError::NotFound { id: source.clone() })
    }
}

/// Load `sources` in parallel and append them to `stack` in request order.
///
/// Sources that fail to load are skipped with a warning and listed in the
/// report. A source id already in the stack, or requested twice, is rejected
/// before anything is loaded. On cancellation the stack is left untouched.
pub fn load_stack<L: Loader + ?Sized>(
    loader: &L,
    stack: &mut FrameStack,
    sources: &[SourceId],
    cancel: &CancelToken,
) -> Result<LoadReport, Error> {
    let role = stack.role();

    let mut seen = HashSet::with_capacity(sources.len());
    for id in sources {
        if stack.position(id).is_some() || !seen.insert(id) {
            return Err(FrameError::DuplicateSource {
                role,
                id: id.clone(),
            }
            .into());
        }
    }

    let results: Vec<Option<Result<LoadedImage, LoadError>>> = sources
        .par_iter()
        .map(|id| {
            if cancel.is_cancelled() {
                return None;
            }
            let loaded = loader.load(id, role);
            if loaded.is_ok() {
                debug!(source = %id, role = %role, "Loaded frame");
            }
            Some(loaded)
        })
        .collect();
    let Some(results) = results.into_iter().collect::<Option<Vec<_>>>() else {
        return Err(Cancelled.into());
    };

    let mut report = LoadReport::default();
    for (id, result) in sources.iter().zip(results) {
        match result {
            Ok(loaded) => {
                let frame = Frame::new(id.clone(), loaded.image).with_provenance(loaded.provenance);
                stack.push(frame)?;
                report.loaded += 1;
            }
            Err(err) => {
                warn!(source = %id, role = %role, error = %err, "Skipping frame that failed to load");
                report.skipped.push((id.clone(), err));
            }
        }
    }

    info!(
        role = %role,
        loaded = report.loaded,
        skipped = report.skipped.len(),
        "Loaded stack"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::constant_image;

    fn ids(names: &[&str]) -> Vec<SourceId> {
        names.iter().map(|&n| SourceId::from(n)).collect()
    }

    fn loader() -> InMemoryLoader {
        InMemoryLoader::new()
            .with("a", constant_image(2, 2, 1, 1.0))
            .with("b", constant_image(2, 2, 1, 2.0))
            .with("c", constant_image(2, 2, 1, 3.0))
    }

    #[test]
    fn test_load_keeps_request_order() {
        let mut stack = FrameStack::new(FrameRole::Dark);
        let report =
            load_stack(&loader(), &mut stack, &ids(&["c", "a", "b"]), &CancelToken::new())
                .unwrap();

        assert_eq!(report.loaded, 3);
        assert!(report.skipped.is_empty());
        let order: Vec<&str> = stack.iter().map(|f| f.source().as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(stack.frames()[0].image().pixels()[0], 3.0);
    }

    #[test]
    fn test_missing_source_skipped() {
        let mut stack = FrameStack::new(FrameRole::Light);
        let report =
            load_stack(&loader(), &mut stack, &ids(&["a", "missing", "b"]), &CancelToken::new())
                .unwrap();

        assert_eq!(report.loaded, 2);
        assert_eq!(
            report.skipped,
            vec![(
                SourceId::from("missing"),
                LoadError::NotFound {
                    id: SourceId::from("missing")
                }
            )]
        );
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_duplicate_source_rejected_before_loading() {
        let mut stack = FrameStack::new(FrameRole::Light);
        load_stack(&loader(), &mut stack, &ids(&["a"]), &CancelToken::new()).unwrap();

        let err =
            load_stack(&loader(), &mut stack, &ids(&["b", "a"]), &CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::DuplicateSource { .. })
        ));
        assert_eq!(stack.len(), 1);

        let err =
            load_stack(&loader(), &mut stack, &ids(&["c", "c"]), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::Frame(_)));
    }

    #[test]
    fn test_cancelled_load_leaves_stack_untouched() {
        let mut stack = FrameStack::new(FrameRole::Light);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = load_stack(&loader(), &mut stack, &ids(&["a", "b"]), &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_provenance_carried_to_frame() {
        let mut loader = InMemoryLoader::new();
        let provenance = Provenance {
            iso: Some(800),
            ..Provenance::default()
        };
        loader.insert(
            "x",
            LoadedImage::new(constant_image(1, 1, 1, 0.0)).with_provenance(provenance.clone()),
        );

        let mut stack = FrameStack::new(FrameRole::Light);
        load_stack(&loader, &mut stack, &ids(&["x"]), &CancelToken::new()).unwrap();
        assert_eq!(stack.frames()[0].provenance(), &provenance);
    }
}
