use crawlwatch_logging::{crawl_debug, crawl_info, crawl_warn};

use crate::{
    CrawlStatus, Effect, Msg, Notification, ProgressFrame, SessionHandle, StopReason, TrackerState,
};

const UNKNOWN_ERROR: &str = "unknown error";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: TrackerState, msg: Msg) -> (TrackerState, Vec<Effect>) {
    let effects = match msg {
        Msg::ConfigChanged(config) => {
            state.set_config(config);
            Vec::new()
        }
        Msg::ConnectionChanged { connected } => {
            state.set_connected(connected);
            if connected && !state.is_closed() {
                resubscribe(&mut state)
            } else {
                Vec::new()
            }
        }
        Msg::ConnectionFailed { message } => {
            crawl_warn!("Push channel unavailable: {}", message);
            state.set_connected(false);
            Vec::new()
        }
        Msg::StartRequested => {
            if state.is_closed() {
                Vec::new()
            } else if !state.is_connected() {
                vec![Effect::Notify(Notification::failure(
                    "not connected to the crawl server",
                ))]
            } else if !state.can_start() {
                crawl_debug!("Start ignored: phase={:?}", state.phase());
                Vec::new()
            } else {
                let config = state.begin_start();
                vec![Effect::StartCrawl { config }]
            }
        }
        Msg::StartSucceeded { session } => {
            state.track(session.clone());
            if state.is_closed() {
                crawl_warn!(
                    "Session {} started after the view closed; it is not being watched",
                    session
                );
                Vec::new()
            } else {
                vec![
                    Effect::Subscribe { session },
                    Effect::Notify(Notification::success("crawl started")),
                ]
            }
        }
        Msg::StartFailed { message } => {
            state.abort_start();
            vec![Effect::Notify(Notification::failure(format!(
                "could not start crawl: {message}"
            )))]
        }
        Msg::StopRequested => match state.job() {
            None => vec![Effect::Notify(Notification::info(
                "no crawl session is running",
            ))],
            Some(job) if job.terminal => vec![Effect::Notify(Notification::info(
                "crawl has already finished",
            ))],
            Some(job) => vec![Effect::StopCrawl {
                session: job.session.clone(),
                reason: StopReason::Operator,
            }],
        },
        Msg::StopSucceeded { session } => {
            let tracked = state.session() == Some(&session);
            if tracked {
                if let Some(job) = state.job_mut() {
                    job.stop_acknowledged = true;
                }
            }
            vec![Effect::Notify(Notification::success("crawl stopped"))]
        }
        Msg::StopFailed { session, message } => {
            crawl_warn!("Stop for session {} failed: {}", session, message);
            vec![Effect::Notify(Notification::failure(format!(
                "could not stop crawl: {message}"
            )))]
        }
        Msg::FrameReceived { session, frame } => apply_frame(&mut state, session, frame),
        Msg::SnapshotReceived { session, frame } => {
            let awaited = matches!(
                state.job(),
                Some(job) if job.session == session && job.awaiting_snapshot
            );
            let wanted = awaited || frame.status.is_terminal();
            if wanted {
                apply_frame(&mut state, session, frame)
            } else {
                crawl_debug!("Snapshot for {} is older than pushed frames, dropped", session);
                Vec::new()
            }
        }
        Msg::SubscribeFailed { session } => {
            crawl_warn!(
                "Could not bind progress topic for session {}; waiting for reconnect",
                session
            );
            Vec::new()
        }
        Msg::ViewClosed => close_view(&mut state),
    };

    (state, effects)
}

fn resubscribe(state: &mut TrackerState) -> Vec<Effect> {
    match state.job_mut() {
        Some(job) if !job.terminal => {
            job.awaiting_snapshot = true;
            vec![
                Effect::Subscribe {
                    session: job.session.clone(),
                },
                Effect::FetchStatus {
                    session: job.session.clone(),
                },
            ]
        }
        _ => Vec::new(),
    }
}

fn apply_frame(state: &mut TrackerState, session: SessionHandle, frame: ProgressFrame) -> Vec<Effect> {
    if state.is_closed() {
        return Vec::new();
    }
    match state.job() {
        None => {
            crawl_debug!("Dropping frame for {}: no tracked session", session);
            return Vec::new();
        }
        Some(job) if job.session != session => {
            crawl_debug!(
                "Dropping frame for stale session {} (tracking {})",
                session,
                job.session
            );
            return Vec::new();
        }
        Some(job) if job.terminal => {
            crawl_debug!("Dropping frame for finished session {}", session);
            return Vec::new();
        }
        Some(_) => {}
    }
    if let Some(claimed) = &frame.session_id {
        if *claimed != session {
            crawl_warn!(
                "Dropping frame claiming session {} on topic of {}",
                claimed,
                session
            );
            return Vec::new();
        }
    }

    let Some(job) = state.job_mut() else {
        return Vec::new();
    };
    if let Some(chapter) = &frame.last_completed_chapter {
        job.last_chapter = Some(chapter.clone());
    }
    let status = frame.status;
    let fatal_error = frame.fatal_error.clone();
    job.latest = Some(frame);
    job.awaiting_snapshot = false;

    match status {
        CrawlStatus::Started | CrawlStatus::InProgress => Vec::new(),
        CrawlStatus::Completed => {
            job.terminal = true;
            crawl_info!("Session {} completed", session);
            vec![
                Effect::Notify(Notification::success("crawl completed")),
                Effect::ReleaseSubscription,
            ]
        }
        CrawlStatus::Error => {
            job.terminal = true;
            let message = fatal_error.unwrap_or_else(|| UNKNOWN_ERROR.to_string());
            crawl_warn!("Session {} failed: {}", session, message);
            vec![
                Effect::Notify(Notification::failure(format!("crawl failed: {message}"))),
                Effect::ReleaseSubscription,
            ]
        }
    }
}

fn close_view(state: &mut TrackerState) -> Vec<Effect> {
    if state.is_closed() {
        return Vec::new();
    }
    let abandoned = match state.job() {
        Some(job) if !job.terminal && state.status() == Some(CrawlStatus::InProgress) => {
            Some(job.session.clone())
        }
        _ => None,
    };
    state.close();

    let mut effects = Vec::with_capacity(2);
    if let Some(session) = abandoned {
        crawl_info!("Tracking view closed mid-run, stopping session {}", session);
        effects.push(Effect::StopCrawl {
            session,
            reason: StopReason::Abandoned,
        });
    }
    effects.push(Effect::ReleaseSubscription);
    effects
}
