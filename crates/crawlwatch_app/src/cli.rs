use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crawlwatch_logging::LogDestination;
use log::LevelFilter;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Start, follow and stop comic crawl jobs", long_about = None)]
pub struct Cli {
    /// Base URL of the crawl server's HTTP API
    #[arg(long, env = "CRAWLWATCH_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,
    /// WebSocket endpoint of the push channel (derived from --base-url if omitted)
    #[arg(long, env = "CRAWLWATCH_WS_URL", global = true)]
    pub ws_url: Option<String>,
    /// Where log lines go
    #[arg(long, value_enum, default_value_t = LogTarget::File, global = true)]
    pub log_to: LogTarget,
    #[arg(long, default_value = "info", value_parser = parse_level, global = true)]
    pub log_level: LevelFilter,
    #[arg(long, default_value = "./crawlwatch.log", global = true)]
    pub log_file: PathBuf,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Start a crawl and follow it until it finishes; Ctrl-C leaves and stops it
    Run(RunArgs),
    /// Stop a crawl by session id
    Stop { session: String },
    /// Print the server's latest snapshot for a session id
    Status { session: String },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// First listing page to crawl (1-based)
    #[arg(long, default_value_t = 1)]
    pub start_page: u32,
    /// Last listing page to crawl, inclusive
    #[arg(long, default_value_t = 5)]
    pub end_page: u32,
    /// Store downloaded images on the server's external drive
    #[arg(long)]
    pub save_drive: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    File,
    Terminal,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::File => LogDestination::File,
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

impl Cli {
    pub fn channel_url(&self) -> anyhow::Result<String> {
        match &self.ws_url {
            Some(url) => Ok(url.clone()),
            None => channel_url_for(&self.base_url),
        }
    }
}

fn parse_level(raw: &str) -> Result<LevelFilter, String> {
    raw.parse()
        .map_err(|_| format!("unknown log level {raw:?} (off, error, warn, info, debug, trace)"))
}

/// `http://host/api` becomes `ws://host/api/ws/websocket`.
pub fn channel_url_for(base_url: &str) -> anyhow::Result<String> {
    let mut url =
        Url::parse(base_url).with_context(|| format!("invalid base url {base_url:?}"))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => bail!("cannot derive a push channel url from scheme {other:?}"),
    };
    if url.set_scheme(scheme).is_err() {
        bail!("cannot switch {base_url:?} to {scheme}");
    }
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments.pop_if_empty().push("ws").push("websocket");
        }
        Err(()) => bail!("base url {base_url:?} cannot carry a path"),
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn derives_channel_url_from_base() {
        assert_eq!(
            channel_url_for("http://localhost:8080/api").unwrap(),
            "ws://localhost:8080/api/ws/websocket"
        );
        assert_eq!(
            channel_url_for("https://crawl.example.com/api/").unwrap(),
            "wss://crawl.example.com/api/ws/websocket"
        );
        assert!(channel_url_for("ftp://example.com").is_err());
    }

    #[test]
    fn explicit_ws_url_wins() {
        let cli = Cli::try_parse_from([
            "crawlwatch",
            "--ws-url",
            "ws://other:9000/ws",
            "status",
            "abc",
        ])
        .unwrap();
        assert_eq!(cli.channel_url().unwrap(), "ws://other:9000/ws");
    }

    #[test]
    fn run_defaults_match_server_defaults() {
        let cli = Cli::try_parse_from(["crawlwatch", "run"]).unwrap();
        let CliCommand::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!((args.start_page, args.end_page, args.save_drive), (1, 5, false));
        assert_eq!(cli.log_level, LevelFilter::Info);
        assert_eq!(cli.log_to, LogTarget::File);
    }

    #[test]
    fn parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "crawlwatch",
            "run",
            "--start-page",
            "3",
            "--end-page",
            "9",
            "--save-drive",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let CliCommand::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!((args.start_page, args.end_page, args.save_drive), (3, 9, true));
        assert_eq!(cli.log_level, LevelFilter::Debug);
    }
}
