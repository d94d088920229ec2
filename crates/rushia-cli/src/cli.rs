//! Argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rushia_config::ConfigDocument;
use rushia_telemetry::GlobalContextGuard;
use rushia_tracker::MediaFormat;
use url::Url;
use uuid::Uuid;

use crate::client::{AppContext, CliResult, init_telemetry, load_config, parse_url};
use crate::commands::cookie::{handle_cookie_clear, handle_cookie_upload};
use crate::commands::download::{handle_download, handle_retry};
use crate::commands::history::handle_history;
use crate::commands::session::{handle_reset, handle_resume, handle_save, handle_status};

/// Parses CLI arguments, executes the requested command and reports the
/// outcome. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let command_name = command_label(&cli.command);
    let trace_id = Uuid::new_v4().to_string();

    let ctx = match prepare(&cli, &trace_id) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };
    let _context = GlobalContextGuard::new(command_name, trace_id.as_str());

    match dispatch(cli.command, &ctx).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::debug!(command = command_name, exit_code = err.exit_code(), "command failed");
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

fn prepare(cli: &Cli, trace_id: &str) -> CliResult<AppContext> {
    let config = load_config(cli)?;
    init_telemetry(&config)?;
    AppContext::new(config, cli.output, trace_id)
}

pub(crate) async fn dispatch(command: Command, ctx: &AppContext) -> CliResult<()> {
    match command {
        Command::Download(args) => handle_download(ctx, args).await,
        Command::Resume(args) => handle_resume(ctx, args).await,
        Command::Status(args) => handle_status(ctx, args).await,
        Command::History(args) => handle_history(ctx, args).await,
        Command::Save(args) => handle_save(ctx, args).await,
        Command::Reset => handle_reset(ctx),
        Command::Retry(args) => handle_retry(ctx, args).await,
        Command::Cookie(cookie) => match cookie {
            CookieCommand::Upload(args) => handle_cookie_upload(ctx, args).await,
            CookieCommand::Clear(args) => handle_cookie_clear(ctx, args).await,
        },
    }
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Download(_) => "download",
        Command::Resume(_) => "resume",
        Command::Status(_) => "status",
        Command::History(_) => "history",
        Command::Save(_) => "save",
        Command::Reset => "reset",
        Command::Retry(_) => "retry",
        Command::Cookie(CookieCommand::Upload(_)) => "cookie_upload",
        Command::Cookie(CookieCommand::Clear(_)) => "cookie_clear",
    }
}

#[derive(Parser)]
#[command(name = "rushia", about = "Submit and follow media downloads")]
pub(crate) struct Cli {
    #[arg(long, global = true, value_parser = parse_url, help = "Base URL of the download service")]
    pub(crate) api_url: Option<Url>,
    #[arg(long, global = true, help = "Per-request timeout in seconds")]
    pub(crate) timeout: Option<u64>,
    #[arg(long, global = true, env = "RUSHIA_CONFIG", help = "JSON configuration file")]
    pub(crate) config: Option<PathBuf>,
    #[arg(long, global = true, help = "Directory holding the task pointer and history")]
    pub(crate) state_dir: Option<PathBuf>,
    #[arg(
        long = "output",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    /// Flags that take precedence over file and environment configuration.
    pub(crate) fn config_overrides(&self) -> ConfigDocument {
        ConfigDocument {
            api_url: self.api_url.as_ref().map(Url::to_string),
            http_timeout_secs: self.timeout,
            state_dir: self.state_dir.clone(),
            ..ConfigDocument::default()
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Submit a URL and optionally follow it to completion.
    Download(DownloadArgs),
    /// Restore the task followed by a previous run and keep watching it.
    Resume(WatchArgs),
    /// Show the service's view of one task.
    Status(StatusArgs),
    /// List recent tasks, reconciling unfinished ones with the service.
    History(HistoryArgs),
    /// Fetch the completed artifact and forget the followed task.
    Save(SaveArgs),
    /// Stop following the current task.
    Reset,
    /// Submit the most recent task again.
    Retry(WatchArgs),
    /// Manage cookie files used for restricted media.
    #[command(subcommand)]
    Cookie(CookieCommand),
}

#[derive(Subcommand)]
pub(crate) enum CookieCommand {
    /// Upload a Netscape-format cookie file (.txt).
    Upload(CookieUploadArgs),
    /// Delete an uploaded cookie file.
    Clear(CookieClearArgs),
}

#[derive(Args)]
pub(crate) struct DownloadArgs {
    pub(crate) url: String,
    #[arg(long, value_enum, default_value_t = FormatArg::M4a)]
    pub(crate) format: FormatArg,
    #[arg(long, conflicts_with = "cookie_file", help = "Previously uploaded cookie id")]
    pub(crate) cookie_id: Option<String>,
    #[arg(long, help = "Cookie file to upload before submitting")]
    pub(crate) cookie_file: Option<PathBuf>,
    #[arg(long, help = "Follow the task until it finishes")]
    pub(crate) watch: bool,
    #[arg(long, default_value_t = 0, requires = "watch", help = "Resubmit up to N times on failure")]
    pub(crate) retries: u32,
}

#[derive(Args, Default)]
pub(crate) struct WatchArgs {
    #[arg(long, help = "Follow the task until it finishes")]
    pub(crate) watch: bool,
}

#[derive(Args)]
pub(crate) struct StatusArgs {
    pub(crate) task_id: String,
}

#[derive(Args, Default)]
pub(crate) struct HistoryArgs {
    #[arg(long, help = "Keep reconciling until no task is in progress")]
    pub(crate) watch: bool,
}

#[derive(Args, Default)]
pub(crate) struct SaveArgs {
    #[arg(long, help = "Destination directory (defaults to the current directory)")]
    pub(crate) dest: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct CookieUploadArgs {
    pub(crate) file: PathBuf,
}

#[derive(Args)]
pub(crate) struct CookieClearArgs {
    pub(crate) cookie_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum FormatArg {
    #[value(alias = "audio")]
    M4a,
    #[value(alias = "video")]
    Mp4,
}

impl From<FormatArg> for MediaFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::M4a => Self::Audio,
            FormatArg::Mp4 => Self::Video,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}
