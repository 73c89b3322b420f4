//! Playback sequencer integration tests
//!
//! Drives a running sequencer through its handle and observes the result on
//! the notification bus and the mock session's call log.

mod helpers;

use helpers::{next_event, next_played, track, tracks, MockSession, ScriptedPlaylist, SessionCall};
use sith_ap::error::Error;
use sith_ap::playback::{PlaybackSequencer, RunningSequencer, TrackCollection};
use sith_common::events::{EventBus, PlayerEvent, TrackOrigin};
use std::sync::Arc;
use std::time::Duration;

fn start(session: &Arc<MockSession>) -> (RunningSequencer, EventBus) {
    let bus = EventBus::new(64);
    let sequencer = PlaybackSequencer::new(session.clone(), Arc::new(bus.clone())).spawn();
    (sequencer, bus)
}

#[tokio::test]
async fn test_context_queue_interleaving() {
    let session = MockSession::new();
    let (sequencer, bus) = start(&session);
    let mut rx = bus.subscribe();
    let handle = sequencer.handle();

    handle
        .play(TrackCollection::search_results(tracks(&["A", "B", "C"])), 0)
        .unwrap();
    assert_eq!(next_played(&mut rx).await, "A");

    handle.end_of_track();
    assert_eq!(next_played(&mut rx).await, "B");

    handle.queue("spotify:track:Z").unwrap();
    handle.end_of_track();
    match next_event(&mut rx).await {
        PlayerEvent::PlayTrack { uid, origin, .. } => {
            assert_eq!(uid, "Z");
            assert_eq!(origin, TrackOrigin::Queue);
        }
        other => panic!("expected play-track, got {:?}", other),
    }

    // The queued track did not move the context cursor
    handle.end_of_track();
    match next_event(&mut rx).await {
        PlayerEvent::PlayTrack { uid, origin, .. } => {
            assert_eq!(uid, "C");
            assert_eq!(origin, TrackOrigin::Context);
        }
        other => panic!("expected play-track, got {:?}", other),
    }

    assert_eq!(session.loads(), vec!["A", "B", "Z", "C"]);
    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_full_cycle_wraps_to_start() {
    let session = MockSession::new();
    let (sequencer, bus) = start(&session);
    let mut rx = bus.subscribe();
    let handle = sequencer.handle();

    let playlist = ScriptedPlaylist::new(tracks(&["A", "B", "C"]));
    handle.play(TrackCollection::playlist(playlist), 1).unwrap();
    assert_eq!(next_played(&mut rx).await, "B");

    let mut visited = Vec::new();
    for _ in 0..3 {
        handle.end_of_track();
        visited.push(next_played(&mut rx).await);
    }
    assert_eq!(visited, vec!["C", "A", "B"]);

    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_queued_tracks_play_in_order_before_context() {
    let session = MockSession::new();
    let (sequencer, bus) = start(&session);
    let mut rx = bus.subscribe();
    let handle = sequencer.handle();

    handle
        .play(TrackCollection::search_results(tracks(&["A", "B"])), 0)
        .unwrap();
    assert_eq!(next_played(&mut rx).await, "A");

    handle.queue_track(track("X")).unwrap();
    handle.queue_track(track("Y")).unwrap();

    handle.end_of_track();
    assert_eq!(next_played(&mut rx).await, "X");
    handle.end_of_track();
    assert_eq!(next_played(&mut rx).await, "Y");
    handle.end_of_track();
    assert_eq!(next_played(&mut rx).await, "B");

    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_queue_does_not_start_playback() {
    let session = MockSession::new();
    let (sequencer, bus) = start(&session);
    let mut rx = bus.subscribe();
    let handle = sequencer.handle();

    handle.queue("spotify:track:Q").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.calls().is_empty());

    // Play replaces the context but leaves the queue alone
    handle
        .play(TrackCollection::search_results(tracks(&["A"])), 0)
        .unwrap();
    assert_eq!(next_played(&mut rx).await, "A");
    handle.end_of_track();
    assert_eq!(next_played(&mut rx).await, "Q");

    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_end_of_track_with_nothing_to_play_is_ignored() {
    let session = MockSession::new();
    let (sequencer, _bus) = start(&session);

    sequencer.handle().end_of_track();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.calls().is_empty());

    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_reordered_playlist_resumes_after_moved_track() {
    let session = MockSession::new();
    let (sequencer, bus) = start(&session);
    let mut rx = bus.subscribe();
    let handle = sequencer.handle();

    let playlist = ScriptedPlaylist::new(tracks(&["A", "B", "C", "D"]));
    handle
        .play(TrackCollection::playlist(playlist.clone()), 0)
        .unwrap();
    assert_eq!(next_played(&mut rx).await, "A");

    playlist.set(tracks(&["B", "C", "A", "D"]));
    handle.end_of_track();
    assert_eq!(next_played(&mut rx).await, "D");

    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_load_failure_reported_and_playback_continues() {
    let session = MockSession::new();
    session.fail_load("B");
    let (sequencer, bus) = start(&session);
    let mut rx = bus.subscribe();
    let handle = sequencer.handle();

    handle
        .play(TrackCollection::search_results(tracks(&["A", "B", "C"])), 0)
        .unwrap();
    assert_eq!(next_played(&mut rx).await, "A");

    handle.end_of_track();
    match next_event(&mut rx).await {
        PlayerEvent::PlayTrackFailed { uid, uri, error } => {
            assert_eq!(uid, "B");
            assert_eq!(uri, "spotify:track:B");
            assert!(error.contains("not available"));
        }
        other => panic!("expected play-track-failed, got {:?}", other),
    }

    // No retry; the next end-of-track moves past the failed track
    handle.end_of_track();
    assert_eq!(next_played(&mut rx).await, "C");

    let plays = session
        .calls()
        .into_iter()
        .filter(|call| *call == SessionCall::Play)
        .count();
    assert_eq!(plays, 2);

    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_emptied_playlist_stops_session() {
    let session = MockSession::new();
    let (sequencer, bus) = start(&session);
    let mut rx = bus.subscribe();
    let handle = sequencer.handle();

    let playlist = ScriptedPlaylist::new(tracks(&["A", "B"]));
    handle
        .play(TrackCollection::playlist(playlist.clone()), 0)
        .unwrap();
    assert_eq!(next_played(&mut rx).await, "A");

    playlist.set(Vec::new());
    handle.end_of_track();

    let stopped = helpers::eventually(Duration::from_secs(2), || {
        session.calls().ends_with(&[SessionCall::Pause, SessionCall::Unload])
    })
    .await;
    assert!(stopped, "calls: {:?}", session.calls());

    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_play_empty_collection_stops_session() {
    let session = MockSession::new();
    let (sequencer, _bus) = start(&session);

    sequencer
        .handle()
        .play(TrackCollection::search_results(Vec::new()), 0)
        .unwrap();

    let stopped = helpers::eventually(Duration::from_secs(2), || {
        session.calls() == vec![SessionCall::Pause, SessionCall::Unload]
    })
    .await;
    assert!(stopped, "calls: {:?}", session.calls());

    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_invalid_link_rejected_without_queueing() {
    let session = MockSession::new();
    let (sequencer, bus) = start(&session);
    let mut rx = bus.subscribe();
    let handle = sequencer.handle();

    let result = handle.queue("not-a-link");
    assert!(matches!(result, Err(Error::Session(_))));

    handle
        .play(TrackCollection::search_results(tracks(&["A", "B"])), 0)
        .unwrap();
    assert_eq!(next_played(&mut rx).await, "A");
    handle.end_of_track();
    assert_eq!(next_played(&mut rx).await, "B");

    sequencer.shutdown().await;
}

#[tokio::test]
async fn test_requests_after_shutdown_fail() {
    let session = MockSession::new();
    let (sequencer, _bus) = start(&session);
    let handle = sequencer.handle();

    sequencer.shutdown().await;

    let result = handle.play(TrackCollection::search_results(tracks(&["A"])), 0);
    assert!(matches!(result, Err(Error::ShuttingDown)));
    handle.end_of_track();
    assert!(session.calls().is_empty());
}
