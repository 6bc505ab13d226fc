//! Tests for the media cache engine
//!
//! Concurrency cases hold page responses on oneshot gates so interleavings
//! are exact.

mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use bridge_traits::error::BridgeError;
    use core_media::api::UploadResponse;
    use core_media::cache::{LoadOutcome, MediaCache};
    use core_media::error::MediaError;
    use core_media::models::{MediaFilter, TypeFilter, UploadFile, VisibilityFilter};
    use core_media::trigger::{BoundaryMarker, ContinuationTrigger, ManualBoundary};
    use core_media::upload::{UploadCoordinator, UploadOutcome};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn all() -> MediaFilter {
        MediaFilter::default()
    }

    #[tokio::test]
    async fn test_pages_of_45_items() {
        let api = FakeMediaApi::new();
        api.push_page(numbered_page(0, 20, 1, 20, 45));
        api.push_page(numbered_page(20, 20, 2, 20, 45));
        api.push_page(numbered_page(40, 5, 3, 20, 45));
        let cache = MediaCache::new(api.clone());

        cache.load(all(), 1).await.unwrap();
        let view = cache.view(all()).unwrap();
        assert_eq!(view.items.len(), 20);
        assert!(view.has_more);

        cache.fetch_more(all()).await.unwrap();
        let view = cache.view(all()).unwrap();
        assert_eq!(view.items.len(), 40);
        assert!(view.has_more);

        cache.fetch_more(all()).await.unwrap();
        let view = cache.view(all()).unwrap();
        assert_eq!(view.items.len(), 45);
        assert!(!view.has_more);
        assert_eq!(view.current_page, 3);

        assert_eq!(cache.fetch_more(all()).await.unwrap(), LoadOutcome::Skipped);
        assert_eq!(
            *api.list_calls.lock(),
            vec![(all(), 1), (all(), 2), (all(), 3)]
        );
    }

    #[tokio::test]
    async fn test_overlapping_pages_never_duplicate() {
        let api = FakeMediaApi::new();
        // A row inserted server-side shifts "b" onto page 2 as well.
        api.push_page(page_of(&["a", "b"], 1, 2, 5));
        api.push_page(page_of(&["b", "c"], 2, 2, 5));
        api.push_page(page_of(&["c", "d", "a"], 3, 2, 5));
        let cache = MediaCache::new(api.clone());

        cache.load(all(), 1).await.unwrap();
        cache.fetch_more(all()).await.unwrap();
        cache.load(all(), 3).await.unwrap();

        let view = cache.view(all()).unwrap();
        let unique: HashSet<_> = view.items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(unique.len(), view.items.len());
        assert_eq!(ids(&view.items), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_refresh_discards_in_flight_page() {
        let api = FakeMediaApi::new();
        api.push_page(page_of(&["a", "b"], 1, 2, 6));
        let stale_gate = api.push_gated_page(page_of(&["c", "d"], 2, 2, 6));
        api.push_page(page_of(&["z", "a"], 1, 2, 7));
        let cache = MediaCache::new(api.clone());

        cache.load(all(), 1).await.unwrap();

        let in_flight = tokio::spawn({
            let cache = cache.clone();
            async move { cache.fetch_more(all()).await }
        });
        yield_until(|| api.list_call_count() == 2).await;

        assert_eq!(
            cache.refresh(all()).await.unwrap(),
            LoadOutcome::Applied { page: 1, added: 2 }
        );

        stale_gate.send(()).ok();
        assert_eq!(in_flight.await.unwrap().unwrap(), LoadOutcome::Discarded);

        let view = cache.view(all()).unwrap();
        assert_eq!(ids(&view.items), vec!["z", "a"]);
        assert_eq!(view.current_page, 1);
        assert_eq!(view.total_count, 7);
        assert!(view.has_more);
        assert!(!view.is_loading && !view.is_loading_more);
    }

    #[tokio::test]
    async fn test_refresh_resets_has_more() {
        let api = FakeMediaApi::new();
        api.push_page(page_of(&["a"], 1, 2, 1));
        let gate = api.push_gated_page(page_of(&["a", "b"], 1, 2, 3));
        let cache = MediaCache::new(api.clone());

        cache.load(all(), 1).await.unwrap();
        assert!(!cache.view(all()).unwrap().has_more);

        let refresh = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh(all()).await }
        });
        yield_until(|| api.list_call_count() == 2).await;

        let view = cache.view(all()).unwrap();
        assert!(view.items.is_empty());
        assert!(view.has_more);
        assert!(view.is_loading);

        gate.send(()).ok();
        refresh.await.unwrap().unwrap();
        assert_eq!(ids(&cache.view(all()).unwrap().items), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fetch_more_is_skipped_while_in_flight() {
        let api = FakeMediaApi::new();
        api.push_page(page_of(&["a", "b"], 1, 2, 6));
        let gate = api.push_gated_page(page_of(&["c", "d"], 2, 2, 6));
        let cache = MediaCache::new(api.clone());
        cache.load(all(), 1).await.unwrap();

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.fetch_more(all()).await }
        });
        yield_until(|| api.list_call_count() == 2).await;
        assert!(cache.view(all()).unwrap().is_loading_more);

        assert_eq!(cache.fetch_more(all()).await.unwrap(), LoadOutcome::Skipped);
        assert_eq!(api.list_call_count(), 2);

        gate.send(()).ok();
        assert_eq!(
            first.await.unwrap().unwrap(),
            LoadOutcome::Applied { page: 2, added: 2 }
        );
    }

    #[tokio::test]
    async fn test_insert_then_fetch_yields_single_copy() {
        let api = FakeMediaApi::new();
        api.push_page(page_of(&["a", "b"], 1, 2, 4));
        api.push_page(page_of(&["new", "c"], 2, 2, 5));
        let cache = MediaCache::new(api.clone());
        cache.load(all(), 1).await.unwrap();

        assert_eq!(cache.insert_optimistic(&photo("new")), 1);
        let view = cache.view(all()).unwrap();
        assert_eq!(ids(&view.items), vec!["new", "a", "b"]);
        assert_eq!(view.total_count, 5);

        cache.fetch_more(all()).await.unwrap();
        let view = cache.view(all()).unwrap();
        assert_eq!(ids(&view.items), vec!["new", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_remove_from_any_page() {
        let api = FakeMediaApi::new();
        api.push_page(page_of(&["a", "b"], 1, 2, 10));
        api.push_page(page_of(&["c", "d"], 2, 2, 10));
        let cache = MediaCache::new(api.clone());
        cache.load(all(), 1).await.unwrap();
        cache.fetch_more(all()).await.unwrap();

        assert_eq!(cache.remove_optimistic("c"), 1);
        let view = cache.view(all()).unwrap();
        assert_eq!(ids(&view.items), vec!["a", "b", "d"]);
        assert_eq!(view.total_count, 9);

        assert_eq!(cache.remove_optimistic("a"), 1);
        assert_eq!(cache.view(all()).unwrap().total_count, 8);

        assert_eq!(cache.remove_optimistic("missing"), 0);
        assert_eq!(cache.view(all()).unwrap().total_count, 8);
    }

    #[tokio::test]
    async fn test_remove_touches_every_view() {
        let api = FakeMediaApi::new();
        let photos = MediaFilter::new(TypeFilter::Photo, VisibilityFilter::All);
        api.push_page(page_of(&["a", "b"], 1, 2, 2));
        api.push_page(page_of(&["b"], 1, 2, 1));
        let cache = MediaCache::new(api.clone());
        cache.load(all(), 1).await.unwrap();
        cache.load(photos, 1).await.unwrap();

        assert_eq!(cache.remove_optimistic("b"), 2);
        assert_eq!(cache.view(photos).unwrap().total_count, 0);
        assert!(cache.view(photos).unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_failed_page_keeps_items_and_has_more() {
        let api = FakeMediaApi::new();
        api.push_page(page_of(&["a", "b"], 1, 2, 4));
        api.push_page_error(MediaError::Network(BridgeError::Timeout));
        api.push_page(page_of(&["c", "d"], 2, 2, 4));
        let cache = MediaCache::new(api.clone());
        cache.load(all(), 1).await.unwrap();

        assert!(cache.fetch_more(all()).await.is_err());
        let view = cache.view(all()).unwrap();
        assert_eq!(view.error.as_deref(), Some("Network error"));
        assert_eq!(ids(&view.items), vec!["a", "b"]);
        assert_eq!(view.current_page, 1);
        assert!(view.has_more);
        assert!(!view.is_loading_more);

        cache.fetch_more(all()).await.unwrap();
        let view = cache.view(all()).unwrap();
        assert!(view.error.is_none());
        assert_eq!(view.items.len(), 4);
    }

    #[tokio::test]
    async fn test_evicted_view_drops_late_response() {
        let api = FakeMediaApi::new();
        let gate = api.push_gated_page(page_of(&["a"], 1, 2, 1));
        let cache = MediaCache::new(api.clone());
        let handle = cache.observe(all());

        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load(all(), 1).await }
        });
        yield_until(|| api.list_call_count() == 1).await;

        drop(handle);
        assert!(cache.view(all()).is_none());

        gate.send(()).ok();
        assert_eq!(pending.await.unwrap().unwrap(), LoadOutcome::Discarded);
        assert!(cache.view(all()).is_none());
    }

    #[tokio::test]
    async fn test_trigger_waits_for_initial_load() {
        let api = FakeMediaApi::new();
        let gate = api.push_gated_page(page_of(&["a", "b"], 1, 2, 4));
        api.push_page(page_of(&["c", "d"], 2, 2, 4));
        let cache = MediaCache::new(api.clone());

        let boundary = Arc::new(ManualBoundary::new());
        let trigger = ContinuationTrigger::attach(
            cache.clone(),
            all(),
            boundary.clone(),
            BoundaryMarker {
                filter: all(),
                rendered: 0,
            },
        );

        let initial = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load(all(), 1).await }
        });
        yield_until(|| api.list_call_count() == 1).await;

        boundary.signal();
        assert!(!trigger.is_pending());
        assert_eq!(api.list_call_count(), 1);

        gate.send(()).ok();
        initial.await.unwrap().unwrap();

        boundary.signal();
        boundary.signal();
        trigger.wait_idle().await;

        assert_eq!(*api.list_calls.lock(), vec![(all(), 1), (all(), 2)]);
        assert_eq!(cache.view(all()).unwrap().items.len(), 4);
    }

    #[tokio::test]
    async fn test_upload_during_refresh_survives_stale_page() {
        let api = FakeMediaApi::new();
        api.push_page(page_of(&["x", "y"], 1, 20, 2));
        let gate = api.push_gated_page(page_of(&["x", "y"], 1, 20, 2));
        api.push_upload(UploadResponse::Created(photo("new")));
        let cache = MediaCache::new(api.clone());
        cache.load(all(), 1).await.unwrap();

        let refresh = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh(all()).await }
        });
        yield_until(|| api.list_call_count() == 2).await;

        let coordinator = UploadCoordinator::new(cache.clone());
        let file = UploadFile::new("IMG_1.jpg", "image/jpeg", vec![0u8; 16]);
        let outcome = coordinator.upload(&file, false, None).await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Uploaded(ref item) if item.id == "new"));

        gate.send(()).ok();
        refresh.await.unwrap().unwrap();

        let view = cache.view(all()).unwrap();
        assert_eq!(ids(&view.items), vec!["new", "x", "y"]);
        assert_eq!(view.total_count, 3);
    }

    #[tokio::test]
    async fn test_remove_during_refresh_is_not_undone() {
        let api = FakeMediaApi::new();
        api.push_page(page_of(&["a", "b", "c"], 1, 20, 3));
        let gate = api.push_gated_page(page_of(&["a", "b", "c"], 1, 20, 3));
        let cache = MediaCache::new(api.clone());
        cache.load(all(), 1).await.unwrap();

        let refresh = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh(all()).await }
        });
        yield_until(|| api.list_call_count() == 2).await;

        cache.delete("b").await.unwrap();

        gate.send(()).ok();
        assert_eq!(
            refresh.await.unwrap().unwrap(),
            LoadOutcome::Applied { page: 1, added: 2 }
        );

        let view = cache.view(all()).unwrap();
        assert_eq!(ids(&view.items), vec!["a", "c"]);
        assert_eq!(view.total_count, 2);
    }
}
