use std::sync::Once;

use crawlwatch_core::{
    update, ChapterSummary, CrawlConfig, CrawlStatus, Effect, JobPhase, Msg, Notification,
    NotificationLevel, ProgressFrame, SessionHandle, StopReason, TrackerState,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(crawlwatch_logging::initialize_for_tests);
}

fn connected(config: CrawlConfig) -> TrackerState {
    let (state, _) = update(
        TrackerState::with_config(config),
        Msg::ConnectionChanged { connected: true },
    );
    state
}

fn started(config: CrawlConfig, session: &str) -> TrackerState {
    let (state, _) = update(connected(config), Msg::StartRequested);
    let (state, _) = update(
        state,
        Msg::StartSucceeded {
            session: SessionHandle::new(session),
        },
    );
    state
}

fn frame(state: TrackerState, session: &str, frame: ProgressFrame) -> (TrackerState, Vec<Effect>) {
    update(
        state,
        Msg::FrameReceived {
            session: SessionHandle::new(session),
            frame,
        },
    )
}

fn config(start: u32, end: u32) -> CrawlConfig {
    CrawlConfig::new(start, end, false).unwrap()
}

#[test]
fn start_while_disconnected_notifies_without_server_call() {
    init_logging();
    let (state, effects) = update(TrackerState::new(), Msg::StartRequested);

    assert_eq!(state.phase(), JobPhase::Idle);
    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::failure(
            "not connected to the crawl server"
        ))]
    );
}

#[test]
fn start_freezes_config_and_subscribes_on_success() {
    init_logging();
    let (state, effects) = update(connected(config(2, 4)), Msg::StartRequested);
    assert_eq!(effects, vec![Effect::StartCrawl { config: config(2, 4) }]);
    assert_eq!(state.phase(), JobPhase::Starting);

    // Editing the draft mid-flight must not change the job's range.
    let (state, _) = update(state, Msg::ConfigChanged(config(1, 100)));
    let (state, effects) = update(
        state,
        Msg::StartSucceeded {
            session: SessionHandle::new("s-1"),
        },
    );

    assert_eq!(
        effects,
        vec![
            Effect::Subscribe {
                session: SessionHandle::new("s-1")
            },
            Effect::Notify(Notification::success("crawl started")),
        ]
    );
    let view = state.view();
    assert_eq!(view.phase, JobPhase::Running);
    assert_eq!(view.config, config(2, 4));
    assert_eq!(view.session, Some(SessionHandle::new("s-1")));
}

#[test]
fn second_start_is_ignored_while_job_runs() {
    init_logging();
    let state = started(config(1, 5), "s-1");
    assert!(!state.view().can_start);

    let (state, effects) = update(state, Msg::StartRequested);
    assert!(effects.is_empty());
    assert_eq!(state.session(), Some(&SessionHandle::new("s-1")));

    let (state, effects) = update(state, Msg::StartRequested);
    assert!(effects.is_empty());
    assert_eq!(state.phase(), JobPhase::Running);
}

#[test]
fn start_failure_echoes_server_message() {
    init_logging();
    let (state, _) = update(connected(config(1, 5)), Msg::StartRequested);
    let (state, effects) = update(
        state,
        Msg::StartFailed {
            message: "crawler busy".to_string(),
        },
    );

    assert_eq!(state.phase(), JobPhase::Idle);
    assert_eq!(state.session(), None);
    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::failure(
            "could not start crawl: crawler busy"
        ))]
    );
}

#[test]
fn percentage_tracks_pages_and_survives_late_frame_after_completion() {
    init_logging();
    let mut state = started(config(1, 5), "s-1");
    let mut shown = Vec::new();
    for page in 1..=5 {
        let (next, effects) = frame(
            state,
            "s-1",
            ProgressFrame::new(CrawlStatus::InProgress).at_page(page),
        );
        assert!(effects.is_empty());
        shown.push(next.view().percentage);
        state = next;
    }
    assert_eq!(
        shown,
        vec![Some(20), Some(40), Some(60), Some(80), Some(100)]
    );

    let (state, effects) = frame(state, "s-1", ProgressFrame::new(CrawlStatus::Completed));
    assert_eq!(
        effects,
        vec![
            Effect::Notify(Notification::success("crawl completed")),
            Effect::ReleaseSubscription,
        ]
    );
    let completed = state.view();
    assert_eq!(completed.status, Some(CrawlStatus::Completed));
    assert_eq!(completed.percentage, Some(100));
    let mut state = state;
    assert!(state.consume_dirty());

    let (mut state, effects) = frame(
        state,
        "s-1",
        ProgressFrame::new(CrawlStatus::InProgress).at_page(3),
    );
    assert!(effects.is_empty());
    let after = state.view();
    assert_eq!(after.status, completed.status);
    assert_eq!(after.percentage, completed.percentage);
    assert_eq!(after.current_page, completed.current_page);
    assert!(!state.consume_dirty());
}

#[test]
fn error_frame_is_terminal_with_default_message() {
    init_logging();
    let state = started(config(1, 3), "s-1");
    let (state, effects) = frame(state, "s-1", ProgressFrame::new(CrawlStatus::Error));
    assert_eq!(
        effects,
        vec![
            Effect::Notify(Notification::failure("crawl failed: unknown error")),
            Effect::ReleaseSubscription,
        ]
    );
    assert_eq!(state.phase(), JobPhase::Finished);

    // A second ERROR frame must not notify again.
    let mut again = ProgressFrame::new(CrawlStatus::Error);
    again.fatal_error = Some("late".to_string());
    let (state, effects) = frame(state, "s-1", again);
    assert!(effects.is_empty());
    assert_eq!(state.view().fatal_error, None);
}

#[test]
fn error_frame_carries_server_message() {
    init_logging();
    let state = started(config(1, 3), "s-1");
    let mut failed = ProgressFrame::new(CrawlStatus::Error);
    failed.fatal_error = Some("source unreachable".to_string());

    let (_state, effects) = frame(state, "s-1", failed);
    let notice = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::Notify(notice) => Some(notice.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(notice.level, NotificationLevel::Failure);
    assert_eq!(notice.text, "crawl failed: source unreachable");
}

#[test]
fn frames_for_stale_session_are_discarded() {
    init_logging();
    let state = started(config(1, 5), "old");
    let (state, _) = frame(
        state,
        "old",
        ProgressFrame::new(CrawlStatus::Completed),
    );
    let (state, _) = update(state, Msg::StartRequested);
    let (state, _) = update(
        state,
        Msg::StartSucceeded {
            session: SessionHandle::new("new"),
        },
    );

    let (state, effects) = frame(
        state,
        "old",
        ProgressFrame::new(CrawlStatus::InProgress).at_page(4),
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().status, None);

    // Frame delivered on the new topic but stamped with another session id.
    let mut forged = ProgressFrame::new(CrawlStatus::InProgress).at_page(2);
    forged.session_id = Some(SessionHandle::new("old"));
    let (state, _) = frame(state, "new", forged);
    assert_eq!(state.view().status, None);

    let (state, _) = frame(
        state,
        "new",
        ProgressFrame::new(CrawlStatus::InProgress).at_page(2),
    );
    assert_eq!(state.view().percentage, Some(40));
}

#[test]
fn last_completed_chapter_is_sticky_and_errors_are_snapshots() {
    init_logging();
    let chapter = ChapterSummary {
        comic_name: "Berserk".to_string(),
        chapter_number: "12".to_string(),
        chapter_title: "Guardian".to_string(),
        image_count: 21,
    };
    let state = started(config(1, 5), "s-1");

    let mut first = ProgressFrame::new(CrawlStatus::InProgress).at_page(1);
    first.last_completed_chapter = Some(chapter.clone());
    first.errors = vec![crawlwatch_core::ItemError {
        item_identifier: "a".to_string(),
        error_message: "boom".to_string(),
    }];
    let (state, _) = frame(state, "s-1", first);

    let (state, _) = frame(
        state,
        "s-1",
        ProgressFrame::new(CrawlStatus::InProgress).at_page(2),
    );
    let view = state.view();
    assert_eq!(view.last_chapter, Some(chapter));
    assert!(view.errors.is_empty());
}

#[test]
fn stop_without_session_is_benign() {
    init_logging();
    let (state, effects) = update(connected(config(1, 5)), Msg::StopRequested);
    assert_eq!(state.phase(), JobPhase::Idle);
    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::info("no crawl session is running"))]
    );
}

#[test]
fn stop_failure_keeps_last_known_status() {
    init_logging();
    let state = started(config(1, 5), "s-1");
    let (state, _) = frame(
        state,
        "s-1",
        ProgressFrame::new(CrawlStatus::InProgress).at_page(2),
    );
    let (state, effects) = update(state, Msg::StopRequested);
    assert_eq!(
        effects,
        vec![Effect::StopCrawl {
            session: SessionHandle::new("s-1"),
            reason: StopReason::Operator,
        }]
    );

    let (state, effects) = update(
        state,
        Msg::StopFailed {
            session: SessionHandle::new("s-1"),
            message: "gateway timeout".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::failure(
            "could not stop crawl: gateway timeout"
        ))]
    );
    assert_eq!(state.view().status, Some(CrawlStatus::InProgress));
    assert_eq!(state.phase(), JobPhase::Running);
}

#[test]
fn acknowledged_stop_allows_a_new_start() {
    init_logging();
    let state = started(config(1, 5), "s-1");
    let (state, _) = update(
        state,
        Msg::StopSucceeded {
            session: SessionHandle::new("s-1"),
        },
    );
    assert!(state.can_start());

    let (_state, effects) = update(state, Msg::StartRequested);
    assert_eq!(effects, vec![Effect::StartCrawl { config: config(1, 5) }]);
}

#[test]
fn reconnect_rebinds_tracked_session() {
    init_logging();
    let state = started(config(1, 5), "s-1");
    let (state, _) = update(state, Msg::ConnectionChanged { connected: false });
    assert!(!state.view().connected);

    let (_state, effects) = update(state, Msg::ConnectionChanged { connected: true });
    assert_eq!(
        effects,
        vec![
            Effect::Subscribe {
                session: SessionHandle::new("s-1")
            },
            Effect::FetchStatus {
                session: SessionHandle::new("s-1")
            },
        ]
    );
}

#[test]
fn closing_mid_run_stops_exactly_once() {
    init_logging();
    let state = started(config(1, 5), "s-1");
    let (state, _) = frame(
        state,
        "s-1",
        ProgressFrame::new(CrawlStatus::InProgress).at_page(2),
    );

    let (state, effects) = update(state, Msg::ViewClosed);
    assert_eq!(
        effects,
        vec![
            Effect::StopCrawl {
                session: SessionHandle::new("s-1"),
                reason: StopReason::Abandoned,
            },
            Effect::ReleaseSubscription,
        ]
    );

    let (_state, effects) = update(state, Msg::ViewClosed);
    assert!(effects.is_empty());
}

#[test]
fn closing_after_completion_does_not_stop() {
    init_logging();
    let state = started(config(1, 5), "s-1");
    let (state, _) = frame(state, "s-1", ProgressFrame::new(CrawlStatus::Completed));

    let (_state, effects) = update(state, Msg::ViewClosed);
    assert_eq!(effects, vec![Effect::ReleaseSubscription]);
}

#[test]
fn closing_without_session_does_not_stop() {
    init_logging();
    let (_state, effects) = update(connected(config(1, 5)), Msg::ViewClosed);
    assert_eq!(effects, vec![Effect::ReleaseSubscription]);
}

#[test]
fn start_response_after_close_is_tracked_but_not_stopped() {
    init_logging();
    let (state, _) = update(connected(config(1, 5)), Msg::StartRequested);
    let (state, effects) = update(state, Msg::ViewClosed);
    assert_eq!(effects, vec![Effect::ReleaseSubscription]);

    let (state, effects) = update(
        state,
        Msg::StartSucceeded {
            session: SessionHandle::new("late"),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.session(), Some(&SessionHandle::new("late")));

    let (_state, effects) = update(state, Msg::ViewClosed);
    assert!(effects.is_empty());
}

fn reconnected(state: TrackerState) -> TrackerState {
    let (state, _) = update(state, Msg::ConnectionChanged { connected: false });
    let (state, _) = update(state, Msg::ConnectionChanged { connected: true });
    state
}

fn snapshot(
    state: TrackerState,
    session: &str,
    frame: ProgressFrame,
) -> (TrackerState, Vec<Effect>) {
    update(
        state,
        Msg::SnapshotReceived {
            session: SessionHandle::new(session),
            frame,
        },
    )
}

#[test]
fn snapshot_fills_the_gap_after_reconnect() {
    init_logging();
    let state = started(config(1, 5), "s-1");
    let (state, _) = frame(state, "s-1", ProgressFrame::new(CrawlStatus::InProgress).at_page(1));
    let state = reconnected(state);

    let (state, effects) = snapshot(
        state,
        "s-1",
        ProgressFrame::new(CrawlStatus::InProgress).at_page(3),
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().current_page, Some(3));
    assert_eq!(state.view().percentage, Some(60));
}

#[test]
fn snapshot_older_than_pushed_frame_is_dropped() {
    init_logging();
    let state = started(config(1, 5), "s-1");
    let (state, _) = frame(state, "s-1", ProgressFrame::new(CrawlStatus::InProgress).at_page(1));
    let state = reconnected(state);
    let (state, _) = frame(state, "s-1", ProgressFrame::new(CrawlStatus::InProgress).at_page(4));

    let (state, effects) = snapshot(
        state,
        "s-1",
        ProgressFrame::new(CrawlStatus::InProgress).at_page(3),
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().current_page, Some(4));
    assert_eq!(state.view().percentage, Some(80));
}

#[test]
fn terminal_snapshot_wins_over_pushed_frames() {
    init_logging();
    let state = started(config(1, 5), "s-1");
    let state = reconnected(state);
    let (state, _) = frame(state, "s-1", ProgressFrame::new(CrawlStatus::InProgress).at_page(4));

    let (state, effects) = snapshot(state, "s-1", ProgressFrame::new(CrawlStatus::Completed));
    assert_eq!(
        effects,
        vec![
            Effect::Notify(Notification::success("crawl completed")),
            Effect::ReleaseSubscription,
        ]
    );
    assert_eq!(state.phase(), JobPhase::Finished);
    assert_eq!(state.view().percentage, Some(100));
}
