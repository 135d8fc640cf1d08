use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Local;
use crawlwatch_core::{CrawlConfig, CrawlStatus, JobPhase, SessionHandle, TrackerView};
use crawlwatch_engine::{
    ChannelConnection, ChannelSettings, ControlSettings, CrawlTracker, JobControl,
    SessionController, StompConnection, StopOutcome, TrackerUpdate,
};
use crawlwatch_logging::{crawl_info, crawl_warn};
use tokio::sync::mpsc;

use crate::cli::{Cli, RunArgs};
use crate::render;

/// How long Ctrl-C waits for the abandonment stop before exiting anyway.
const STOP_GRACE: Duration = Duration::from_secs(5);

enum Outcome {
    Finished(CrawlStatus),
    StartFailed,
    Interrupted,
    ChannelClosed,
}

/// Starts a crawl once the push channel is up and follows it to the end.
pub async fn run(cli: &Cli, args: &RunArgs) -> anyhow::Result<()> {
    let config = CrawlConfig::new(args.start_page, args.end_page, args.save_drive)?;
    let ws_url = cli.channel_url()?;
    crawl_info!("Following crawls via {} and {}", cli.base_url, ws_url);

    let connection: Arc<dyn ChannelConnection> = Arc::new(
        StompConnection::new(&ws_url, ChannelSettings::default())
            .with_context(|| format!("push channel url {ws_url:?}"))?,
    );
    let control = SessionController::new(&cli.base_url, ControlSettings::default())?
        .with_channel(connection.clone());
    let (tracker, mut updates) = CrawlTracker::new(connection, Arc::new(control), config);

    println!("{}", render::status_line(&tracker.view()));
    tracker.open();

    let outcome = follow(&tracker, &mut updates).await;

    if matches!(outcome, Outcome::Interrupted) {
        println!("interrupted, leaving the crawl");
    }
    if let Some(stop) = tracker.close() {
        match tokio::time::timeout(STOP_GRACE, stop).await {
            Ok(_) => crawl_info!("Abandonment stop settled"),
            Err(_) => crawl_warn!("Abandonment stop still pending after {:?}", STOP_GRACE),
        }
    }
    print_pending(&mut updates);

    match outcome {
        Outcome::Finished(CrawlStatus::Error) => bail!("crawl failed"),
        Outcome::StartFailed => bail!("crawl could not be started"),
        Outcome::ChannelClosed => bail!("tracker stopped unexpectedly"),
        Outcome::Finished(_) | Outcome::Interrupted => Ok(()),
    }
}

async fn follow(
    tracker: &CrawlTracker,
    updates: &mut mpsc::UnboundedReceiver<TrackerUpdate>,
) -> Outcome {
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut start_sent = false;

    loop {
        let update = tokio::select! {
            _ = &mut interrupt => return Outcome::Interrupted,
            update = updates.recv() => update,
        };
        match update {
            None => return Outcome::ChannelClosed,
            Some(TrackerUpdate::Notice(notice)) => {
                println!("{}", render::notice_line(&notice, Local::now()));
            }
            Some(TrackerUpdate::View(view)) => {
                print_view(&view);
                if !start_sent && view.connected && view.can_start {
                    start_sent = true;
                    tracker.start();
                } else if start_sent && view.phase == JobPhase::Idle {
                    return Outcome::StartFailed;
                } else if view.phase == JobPhase::Finished {
                    return Outcome::Finished(view.status.unwrap_or(CrawlStatus::Completed));
                }
            }
        }
    }
}

fn print_view(view: &TrackerView) {
    println!("{}", render::status_line(view));
    for line in render::detail_lines(view) {
        println!("{line}");
    }
}

// Notices queued behind the last view (completion, failure) still get shown.
fn print_pending(updates: &mut mpsc::UnboundedReceiver<TrackerUpdate>) {
    while let Ok(update) = updates.try_recv() {
        if let TrackerUpdate::Notice(notice) = update {
            println!("{}", render::notice_line(&notice, Local::now()));
        }
    }
}

pub async fn stop(cli: &Cli, session: &str) -> anyhow::Result<()> {
    let control = SessionController::new(&cli.base_url, ControlSettings::default())?;
    match control.stop_crawling(Some(&SessionHandle::new(session))).await? {
        StopOutcome::Stopped(session) => println!("stopped crawl {session}"),
        StopOutcome::NoActiveSession => println!("no crawl session to stop"),
    }
    Ok(())
}

pub async fn status(cli: &Cli, session: &str) -> anyhow::Result<()> {
    let control = SessionController::new(&cli.base_url, ControlSettings::default())?;
    match control.fetch_status(&SessionHandle::new(session)).await? {
        Some(frame) => {
            for line in render::frame_lines(&frame) {
                println!("{line}");
            }
        }
        None => println!("server has no progress for {session}"),
    }
    Ok(())
}
