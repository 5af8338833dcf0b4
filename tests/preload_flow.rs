mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{queue, track, Harness};
use encore::preload::{EntryState, PreloadManager, PreloadOutcome};
use encore::queue::{PlayMode, PlaybackState, RepeatMode};

fn at(index: usize) -> PlaybackState {
    PlaybackState {
        current_index: Some(index),
        ..Default::default()
    }
}

fn manager(h: &Harness, capacity: usize) -> PreloadManager {
    PreloadManager::new(h.checker.clone(), h.backend.clone(), capacity)
}

#[tokio::test]
async fn preloads_the_sequential_next_track() {
    let h = Harness::new();
    let m = manager(&h, 3);
    let q = queue(&["a", "b", "c"]);

    let outcome = m.preload_next(&q, &at(0), |_, _| panic!("no refresh expected")).await;
    assert_eq!(
        outcome,
        PreloadOutcome::Loaded {
            index: 1,
            track_id: "b".into()
        }
    );
    assert!(m.get_preloaded_audio("b").is_some());
    assert_eq!(m.status("b"), Some(EntryState::Ready));
    assert_eq!(m.progress(), 100);
    assert!(!m.is_preloading());
}

#[tokio::test]
async fn concurrent_calls_probe_and_load_once() {
    let h = Harness::new();
    let m = manager(&h, 3);
    let q = queue(&["a", "b", "c"]);
    let state = at(0);

    let (first, second) = tokio::join!(
        m.preload_next(&q, &state, |_, _| {}),
        m.preload_next(&q, &state, |_, _| {})
    );

    assert!(matches!(first, PreloadOutcome::Loaded { .. }));
    assert_eq!(second, PreloadOutcome::InFlight { track_id: "b".into() });
    assert_eq!(h.probe.call_count(), 1);
    assert_eq!(h.backend.created_count(), 1);

    let again = m.preload_next(&q, &state, |_, _| {}).await;
    assert_eq!(again, PreloadOutcome::AlreadyCached { track_id: "b".into() });
    assert_eq!(h.probe.call_count(), 1);
}

#[tokio::test]
async fn cache_evicts_oldest_insertion_first() {
    let h = Harness::new();
    let m = manager(&h, 3);
    let q = queue(&["a", "b", "c", "d", "e"]);

    for current in 0..4 {
        m.preload_next(&q, &at(current), |_, _| {}).await;
        assert!(m.cached_ids().len() <= 3);
    }
    // lookups never reorder entries
    assert!(m.get_preloaded_audio("c").is_some());
    assert_eq!(m.cached_ids(), vec!["c", "d", "e"]);
    assert!(m.get_preloaded_audio("b").is_none());

    let evicted = h.backend.element_for("https://cdn.test/b.mp3").unwrap();
    assert_eq!(evicted.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_source_is_refreshed_before_loading() {
    let h = Harness::new();
    h.probe.kill("https://cdn.test/b.mp3");
    let mut fresh = track("b");
    fresh.source_url = Some("https://cdn.test/b-v2.mp3".into());
    h.catalog.put(fresh.clone());

    let m = manager(&h, 3);
    let q = queue(&["a", "b"]);
    let mut updates = Vec::new();
    let outcome = m
        .preload_next(&q, &at(0), |index, t| updates.push((index, t.clone())))
        .await;

    assert!(matches!(outcome, PreloadOutcome::Loaded { index: 1, .. }));
    assert_eq!(updates, vec![(1, fresh)]);
    assert!(h.backend.element_for("https://cdn.test/b-v2.mp3").is_some());
    assert!(h.backend.element_for("https://cdn.test/b.mp3").is_none());
}

#[tokio::test]
async fn load_error_is_absorbed() {
    let h = Harness::new();
    h.backend.break_url("https://cdn.test/b.mp3");
    let m = manager(&h, 3);
    let q = queue(&["a", "b"]);

    let outcome = m.preload_next(&q, &at(0), |_, _| {}).await;
    assert!(matches!(outcome, PreloadOutcome::Failed { ref track_id, .. } if track_id == "b"));
    assert!(m.get_preloaded_audio("b").is_none());
    assert_eq!(m.status("b"), Some(EntryState::Failed));
    assert_eq!(m.progress(), 0);
    assert!(!m.is_preloading());

    let element = h.backend.element_for("https://cdn.test/b.mp3").unwrap();
    assert_eq!(element.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn nothing_to_preload_at_end_or_without_source() {
    let h = Harness::new();
    let m = manager(&h, 3);
    let mut q = queue(&["a", "b"]);

    let outcome = m.preload_next(&q, &at(1), |_, _| {}).await;
    assert_eq!(outcome, PreloadOutcome::NothingNext);

    q[1].track.source_url = None;
    let outcome = m.preload_next(&q, &at(0), |_, _| {}).await;
    assert_eq!(outcome, PreloadOutcome::MissingSource { index: 1 });
    assert_eq!(h.probe.call_count(), 0);
    assert_eq!(h.backend.created_count(), 0);
}

#[tokio::test]
async fn shuffle_order_picks_the_target() {
    let h = Harness::new();
    let m = manager(&h, 3);
    let q = queue(&["a", "b", "c"]);
    let state = PlaybackState {
        current_index: Some(2),
        is_playing: true,
        play_mode: PlayMode {
            shuffle: true,
            repeat: RepeatMode::Off,
        },
        shuffle_order: vec![2, 0, 1],
    };

    let outcome = m.preload_next(&q, &state, |_, _| {}).await;
    assert_eq!(
        outcome,
        PreloadOutcome::Loaded {
            index: 0,
            track_id: "a".into()
        }
    );
}

#[tokio::test]
async fn clearing_releases_every_handle() {
    let h = Harness::new();
    let m = Arc::new(manager(&h, 3));
    let q = queue(&["a", "b", "c"]);
    m.preload_next(&q, &at(0), |_, _| {}).await;
    m.preload_next(&q, &at(1), |_, _| {}).await;

    assert!(m.clear_preloaded_audio("b"));
    assert!(!m.clear_preloaded_audio("b"));
    m.clear_all_preloaded_audio();
    assert!(m.cached_ids().is_empty());

    for url in ["https://cdn.test/b.mp3", "https://cdn.test/c.mp3"] {
        let element = h.backend.element_for(url).unwrap();
        assert_eq!(element.released.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn dropped_call_leaves_no_stale_guard() {
    let h = Harness::new();
    let m = manager(&h, 3);
    let q = queue(&["a", "b"]);

    // the first branch suspends inside the health check and is then dropped
    let state = at(0);
    tokio::select! {
        biased;
        _ = m.preload_next(&q, &state, |_, _| {}) => panic!("preload should still be pending"),
        _ = std::future::ready(()) => {}
    }
    assert_eq!(h.probe.call_count(), 1);
    assert!(!m.is_preloading());
    assert_eq!(m.status("b"), None);

    let retry = m.preload_next(&q, &at(0), |_, _| {}).await;
    assert_eq!(
        retry,
        PreloadOutcome::Loaded {
            index: 1,
            track_id: "b".into()
        }
    );
}

#[tokio::test]
async fn oversized_capacity_is_held_to_three() {
    let h = Harness::new();
    let m = manager(&h, 10);
    let q = queue(&["a", "b", "c", "d", "e", "f"]);

    for current in 0..5 {
        m.preload_next(&q, &at(current), |_, _| {}).await;
    }
    assert_eq!(m.cached_ids(), vec!["d", "e", "f"]);
}

#[tokio::test]
async fn taking_a_handle_skips_release() {
    let h = Harness::new();
    let m = manager(&h, 3);
    let q = queue(&["a", "b"]);
    m.preload_next(&q, &at(0), |_, _| {}).await;

    assert!(m.take_preloaded_audio("b").is_some());
    assert!(m.cached_ids().is_empty());
    m.clear_all_preloaded_audio();
    let b = h.backend.element_for("https://cdn.test/b.mp3").unwrap();
    assert_eq!(b.released.load(Ordering::SeqCst), 0);
}
