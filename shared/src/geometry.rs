//! Aspect ratios for trip photo carousels.
//!
//! Probing only reads image headers. Every image in a batch is probed
//! concurrently and the answers are joined back by position, so a slow or
//! broken image never shifts its neighbours.

use std::collections::HashMap;
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::trip::{ImagePayload, TripId};

pub const FALLBACK_ASPECT_RATIO: f64 = 16.0 / 9.0;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("image payload is empty")]
    Empty,

    #[error("image payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("could not sniff image format: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not read image header: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image reports a zero-sized canvas: {width}x{height}")]
    ZeroSized { width: u32, height: u32 },

    #[error("image probe did not finish: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageAspect {
    /// Width divided by height.
    pub ratio: f64,
    /// `false` when the ratio is the fallback.
    pub probed: bool,
}

impl ImageAspect {
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            ratio: FALLBACK_ASPECT_RATIO,
            probed: false,
        }
    }

    pub fn from_dimensions(width: u32, height: u32) -> Result<Self, ProbeError> {
        if width == 0 || height == 0 {
            return Err(ProbeError::ZeroSized { width, height });
        }
        Ok(Self {
            ratio: f64::from(width) / f64::from(height),
            probed: true,
        })
    }
}

#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn dimensions(&self, image: &ImagePayload) -> Result<(u32, u32), ProbeError>;
}

pub const DEFAULT_PROBE_CONCURRENCY: usize = 4;

/// Reads dimensions from the encoded header without decoding pixels.
///
/// Base64 decoding and header parsing run on the blocking pool, at most
/// `max_concurrent` at a time, so a batch of large photos never stalls the
/// runtime driving the HTTP requests.
#[derive(Debug, Clone)]
pub struct DecodingProbe {
    semaphore: Arc<Semaphore>,
}

impl DecodingProbe {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Probes still allowed to start right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for DecodingProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_CONCURRENCY)
    }
}

#[async_trait]
impl ImageProbe for DecodingProbe {
    async fn dimensions(&self, image: &ImagePayload) -> Result<(u32, u32), ProbeError> {
        let _permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| ProbeError::Aborted(e.to_string()))?;

        let payload = image.clone();
        tokio::task::spawn_blocking(move || probe_dimensions(&payload))
            .await
            .map_err(|e| ProbeError::Aborted(e.to_string()))?
    }
}

pub fn probe_dimensions(image: &ImagePayload) -> Result<(u32, u32), ProbeError> {
    let bytes = image.decode()?;
    if bytes.is_empty() {
        return Err(ProbeError::Empty);
    }
    let reader = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

/// One aspect per image, in input order. Never fails: an image that cannot be
/// probed gets [`FALLBACK_ASPECT_RATIO`].
#[instrument(skip_all, fields(images = images.len()))]
pub async fn resolve_all(probe: &dyn ImageProbe, images: &[ImagePayload]) -> Vec<ImageAspect> {
    let probes = images.iter().enumerate().map(|(index, image)| async move {
        let aspect = probe
            .dimensions(image)
            .await
            .and_then(|(width, height)| ImageAspect::from_dimensions(width, height));
        match aspect {
            Ok(aspect) => aspect,
            Err(e) => {
                warn!(index, error = %e, "image probe failed, using fallback ratio");
                ImageAspect::fallback()
            }
        }
    });
    join_all(probes).await
}

/// Probed ratios keyed by payload digest. Fallbacks are never stored.
pub struct AspectCache {
    entries: LruCache<blake3::Hash, f64>,
}

impl AspectCache {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, digest: &blake3::Hash) -> Option<ImageAspect> {
        self.entries.get(digest).map(|ratio| ImageAspect {
            ratio: *ratio,
            probed: true,
        })
    }

    pub fn put(&mut self, digest: blake3::Hash, aspect: ImageAspect) {
        if aspect.probed {
            self.entries.put(digest, aspect.ratio);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarouselKey {
    Trip(TripId),
    /// The image list of the trip being composed.
    Draft,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub key: CarouselKey,
    pub generation: u64,
    pub indices: Vec<usize>,
    pub payloads: Vec<ImagePayload>,
}

struct Carousel {
    generation: u64,
    identity: Vec<blake3::Hash>,
    aspects: Vec<Option<ImageAspect>>,
}

pub struct GeometryTracker {
    carousels: HashMap<CarouselKey, Carousel>,
    cache: AspectCache,
    next_generation: u64,
}

impl GeometryTracker {
    #[must_use]
    pub fn new(cache_capacity: NonZeroUsize) -> Self {
        Self {
            carousels: HashMap::new(),
            cache: AspectCache::new(cache_capacity),
            next_generation: 1,
        }
    }

    /// Starts tracking `images` under `key`. Returns the probes still needed
    /// when the sequence differs from the one already tracked; ratios known
    /// from the cache are filled in straight away.
    pub fn track(&mut self, key: CarouselKey, images: &[ImagePayload]) -> Option<ProbeRequest> {
        let identity: Vec<blake3::Hash> = images.iter().map(ImagePayload::digest).collect();
        if self
            .carousels
            .get(&key)
            .is_some_and(|c| c.identity == identity)
        {
            return None;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let aspects: Vec<Option<ImageAspect>> =
            identity.iter().map(|digest| self.cache.get(digest)).collect();
        let indices: Vec<usize> = aspects
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.is_none().then_some(i))
            .collect();
        let payloads = indices.iter().map(|&i| images[i].clone()).collect();

        debug!(?key, generation, images = images.len(), missing = indices.len(), "tracking carousel");
        self.carousels.insert(
            key,
            Carousel {
                generation,
                identity,
                aspects,
            },
        );

        (!indices.is_empty()).then_some(ProbeRequest {
            key,
            generation,
            indices,
            payloads,
        })
    }

    /// Stores probe results. Results for a superseded generation are
    /// discarded and `false` is returned.
    pub fn apply(
        &mut self,
        key: CarouselKey,
        generation: u64,
        indices: &[usize],
        aspects: &[ImageAspect],
    ) -> bool {
        let Some(carousel) = self.carousels.get_mut(&key) else {
            debug!(?key, generation, "discarding aspects for untracked carousel");
            return false;
        };
        if carousel.generation != generation {
            debug!(
                ?key,
                generation,
                current = carousel.generation,
                "discarding aspects for stale carousel"
            );
            return false;
        }
        if indices.len() != aspects.len() {
            warn!(?key, expected = indices.len(), got = aspects.len(), "probe answer length mismatch");
        }

        for (&index, aspect) in indices.iter().zip(aspects) {
            if let Some(slot) = carousel.aspects.get_mut(index) {
                *slot = Some(*aspect);
                self.cache.put(carousel.identity[index], *aspect);
            }
        }
        true
    }

    /// Current ratios for `key`. Images still being probed report the
    /// fallback.
    #[must_use]
    pub fn ratios(&self, key: CarouselKey) -> Vec<f64> {
        self.carousels.get(&key).map_or_else(Vec::new, |c| {
            c.aspects
                .iter()
                .map(|a| a.map_or(FALLBACK_ASPECT_RATIO, |a| a.ratio))
                .collect()
        })
    }

    #[must_use]
    pub fn is_resolved(&self, key: CarouselKey) -> bool {
        self.carousels
            .get(&key)
            .is_some_and(|c| c.aspects.iter().all(Option::is_some))
    }

    pub fn forget(&mut self, key: CarouselKey) {
        self.carousels.remove(&key);
    }

    #[must_use]
    pub fn cached_ratios(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn png(width: u32, height: u32) -> ImagePayload {
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        ImagePayload::from_bytes(bytes.get_ref())
    }

    /// Payloads are `"<width>x<height>"`; anything else fails. Later images
    /// answer first.
    struct ScriptedProbe {
        total: u64,
    }

    #[async_trait]
    impl ImageProbe for ScriptedProbe {
        async fn dimensions(&self, image: &ImagePayload) -> Result<(u32, u32), ProbeError> {
            let (w, rest) = image.as_str().split_once('x').ok_or(ProbeError::Empty)?;
            let (h, index) = rest.split_once('#').ok_or(ProbeError::Empty)?;
            let index: u64 = index.parse().map_err(|_| ProbeError::Empty)?;
            tokio::time::sleep(Duration::from_millis((self.total - index) * 10)).await;
            let w = w.parse().map_err(|_| ProbeError::Empty)?;
            let h = h.parse().map_err(|_| ProbeError::Empty)?;
            Ok((w, h))
        }
    }

    struct InstantProbe;

    #[async_trait]
    impl ImageProbe for InstantProbe {
        async fn dimensions(&self, image: &ImagePayload) -> Result<(u32, u32), ProbeError> {
            let (w, h) = image.as_str().split_once('x').ok_or(ProbeError::Empty)?;
            Ok((
                w.parse().map_err(|_| ProbeError::Empty)?,
                h.parse().map_err(|_| ProbeError::Empty)?,
            ))
        }
    }

    #[test]
    fn test_probe_reads_png_header() {
        assert_eq!(probe_dimensions(&png(40, 30)).unwrap(), (40, 30));
    }

    #[test]
    fn test_probe_rejects_garbage() {
        assert!(matches!(
            probe_dimensions(&ImagePayload::new("not base64!")),
            Err(ProbeError::Encoding(_))
        ));
        assert!(probe_dimensions(&ImagePayload::from_bytes(b"plain text")).is_err());
        assert!(matches!(
            probe_dimensions(&ImagePayload::new("")),
            Err(ProbeError::Empty)
        ));
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        assert!(matches!(
            ImageAspect::from_dimensions(0, 10),
            Err(ProbeError::ZeroSized { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_all_with_corrupt_middle_image() {
        let images = vec![png(400, 300), ImagePayload::new("corrupt"), png(100, 200)];
        let aspects = resolve_all(&DecodingProbe::default(), &images).await;

        assert_eq!(aspects.len(), 3);
        assert!((aspects[0].ratio - 4.0 / 3.0).abs() < f64::EPSILON);
        assert!(aspects[0].probed);
        assert_eq!(aspects[1], ImageAspect::fallback());
        assert!((aspects[2].ratio - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_decoding_probe_resolves_a_batch_in_order() {
        let probe = DecodingProbe::new(2);
        let images: Vec<ImagePayload> = (1..=6u32).map(|i| png(i * 10, 10)).collect();

        let aspects = resolve_all(&probe, &images).await;

        let ratios: Vec<f64> = aspects.iter().map(|a| a.ratio).collect();
        assert_eq!(ratios, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(aspects.iter().all(|a| a.probed));
        assert_eq!(probe.available(), 2);
    }

    #[tokio::test]
    async fn test_decoding_probe_waits_for_a_free_permit() {
        let probe = DecodingProbe::new(1);
        let image = png(40, 20);
        let held = Arc::clone(&probe.semaphore).acquire_owned().await.unwrap();
        assert_eq!(probe.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), probe.dimensions(&image)).await;
        assert!(blocked.is_err());

        drop(held);
        assert_eq!(probe.dimensions(&image).await.unwrap(), (40, 20));
        assert_eq!(probe.available(), 1);
    }

    #[tokio::test]
    async fn test_closed_probe_reports_aborted() {
        let probe = DecodingProbe::new(1);
        probe.semaphore.close();
        assert!(matches!(
            probe.dimensions(&png(4, 4)).await,
            Err(ProbeError::Aborted(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_all_keeps_input_order_when_completion_is_reversed() {
        let images: Vec<ImagePayload> = (1..=4u32)
            .map(|i| ImagePayload::new(format!("{}x{}#{}", i * 100, 100, i)))
            .collect();
        let aspects = resolve_all(&ScriptedProbe { total: 5 }, &images).await;
        let ratios: Vec<f64> = aspects.iter().map(|a| a.ratio).collect();
        assert_eq!(ratios, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_all_probes_concurrently() {
        let images: Vec<ImagePayload> = (1..=4u32)
            .map(|i| ImagePayload::new(format!("100x100#{i}")))
            .collect();
        let started = tokio::time::Instant::now();
        resolve_all(&ScriptedProbe { total: 5 }, &images).await;
        // Sequential probing would take 40+30+20+10 ms.
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_tracker_requests_only_missing_ratios() {
        let mut tracker = GeometryTracker::new(NonZeroUsize::new(8).unwrap());
        let a = ImagePayload::new("300x100");
        let b = ImagePayload::new("100x100");
        let key = CarouselKey::Trip(TripId(1));

        let request = tracker.track(key, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(request.indices, vec![0, 1]);
        assert_eq!(tracker.ratios(key), vec![FALLBACK_ASPECT_RATIO; 2]);

        let aspects = vec![
            ImageAspect::from_dimensions(300, 100).unwrap(),
            ImageAspect::fallback(),
        ];
        assert!(tracker.apply(key, request.generation, &request.indices, &aspects));
        assert_eq!(tracker.ratios(key), vec![3.0, FALLBACK_ASPECT_RATIO]);
        assert!(tracker.is_resolved(key));
        assert_eq!(tracker.cached_ratios(), 1);

        // Same sequence again: nothing to do.
        assert!(tracker.track(key, &[a.clone(), b.clone()]).is_none());

        // Reordered: the cached image is known, the failed one is retried.
        let request = tracker.track(CarouselKey::Draft, &[b, a]).unwrap();
        assert_eq!(request.indices, vec![0]);
        assert_eq!(tracker.ratios(CarouselKey::Draft), vec![FALLBACK_ASPECT_RATIO, 3.0]);
    }

    #[test]
    fn test_tracker_discards_stale_generation() {
        let mut tracker = GeometryTracker::new(NonZeroUsize::new(8).unwrap());
        let key = CarouselKey::Draft;
        let first = tracker.track(key, &[ImagePayload::new("1x1")]).unwrap();
        let second = tracker
            .track(key, &[ImagePayload::new("2x1"), ImagePayload::new("3x1")])
            .unwrap();

        let stale = [ImageAspect::from_dimensions(1, 1).unwrap()];
        assert!(!tracker.apply(key, first.generation, &first.indices, &stale));
        assert_eq!(tracker.ratios(key).len(), 2);

        let fresh = [
            ImageAspect::from_dimensions(2, 1).unwrap(),
            ImageAspect::from_dimensions(3, 1).unwrap(),
        ];
        assert!(tracker.apply(key, second.generation, &second.indices, &fresh));
        assert_eq!(tracker.ratios(key), vec![2.0, 3.0]);

        tracker.forget(key);
        assert!(tracker.ratios(key).is_empty());
        assert!(!tracker.apply(key, second.generation, &second.indices, &fresh));
    }

    #[test]
    fn test_empty_sequence_needs_no_probe() {
        let mut tracker = GeometryTracker::new(NonZeroUsize::new(8).unwrap());
        assert!(tracker.track(CarouselKey::Draft, &[]).is_none());
        assert!(tracker.is_resolved(CarouselKey::Draft));
    }

    proptest! {
        #[test]
        fn prop_resolve_all_is_positional(
            dims in proptest::collection::vec(proptest::option::of((1u32..5000, 1u32..5000)), 0..12)
        ) {
            let images: Vec<ImagePayload> = dims
                .iter()
                .map(|d| match d {
                    Some((w, h)) => ImagePayload::new(format!("{w}x{h}")),
                    None => ImagePayload::new("corrupt"),
                })
                .collect();

            let aspects = futures::executor::block_on(resolve_all(&InstantProbe, &images));

            prop_assert_eq!(aspects.len(), dims.len());
            for (aspect, d) in aspects.iter().zip(&dims) {
                match d {
                    Some((w, h)) => {
                        prop_assert!(aspect.probed);
                        prop_assert!((aspect.ratio - f64::from(*w) / f64::from(*h)).abs() < 1e-12);
                    }
                    None => prop_assert_eq!(*aspect, ImageAspect::fallback()),
                }
            }
        }
    }
}
