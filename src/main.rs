use std::path::PathBuf;

use clap::{Parser, Subcommand};
use headsync::git::CheckoutStrategy;
use headsync::hooks::HookEventType;
use headsync::sync::Cancellation;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "headsync",
    version,
    about = "Track branch, tag and pull request heads of a Bitbucket repository",
    long_about = None,
    arg_required_else_help = true
)]
struct Cli {
    /// Source config file (defaults to `<config dir>/headsync/source.toml`).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the checkout plan (remotes, refspecs, extensions) for a head.
    Resolve {
        #[command(subcommand)]
        head: HeadArgs,
    },
    /// Translate a push notification into head updates.
    Hook {
        /// Event key, e.g. `repo:refs_changed` or `mirror:repo_synchronized`.
        #[arg(long)]
        event: HookEventType,
        /// Payload file; `-` or omitted reads stdin.
        #[arg(long, value_name = "FILE")]
        payload: Option<PathBuf>,
        /// Where the notification came from.
        #[arg(long, default_value = "cli")]
        origin: String,
    },
    /// Fetch branches whose expected commits are missing from a clone.
    FallbackFetch {
        /// Repository to repair.
        #[arg(long, value_name = "DIR", default_value = ".")]
        repo: PathBuf,
        /// Clone URL to fetch from.
        #[arg(long)]
        url: String,
        /// Remote alias the fetched branches are stored under.
        #[arg(long, default_value = "primary")]
        remote: String,
        /// Expected branch tips as `BRANCH=HASH`.
        #[arg(required = true, value_name = "BRANCH=HASH", value_parser = commands::parse_branch_hash)]
        branches: Vec<(String, String)>,
    },
}

#[derive(Subcommand, Debug)]
enum HeadArgs {
    /// A branch of the configured repository.
    Branch {
        name: String,
        /// Pin to this commit.
        #[arg(long)]
        hash: Option<String>,
    },
    /// A tag of the configured repository.
    Tag {
        name: String,
        #[arg(long)]
        hash: Option<String>,
    },
    /// An open pull request.
    Pr {
        #[arg(long)]
        id: String,
        /// Source branch.
        #[arg(long)]
        branch: String,
        /// Target branch.
        #[arg(long)]
        target: String,
        /// Owner of the source repository (defaults to the configured owner).
        #[arg(long)]
        source_owner: Option<String>,
        /// Source repository (defaults to the configured repository).
        #[arg(long)]
        source_repo: Option<String>,
        #[arg(long, default_value = "merge")]
        strategy: CheckoutStrategy,
        /// Target branch commit; pins the plan when given with `--pull-hash`.
        #[arg(long, requires = "pull_hash")]
        target_hash: Option<String>,
        /// Source branch commit.
        #[arg(long, requires = "target_hash")]
        pull_hash: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

#[cfg(unix)]
fn register_signals(cancel: &Cancellation) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, cancel.flag()) {
            log::warn!("Cannot install handler for signal {signal}: {e}");
        }
    }
}

#[cfg(not(unix))]
fn register_signals(_cancel: &Cancellation) {}

fn main() {
    let Cli {
        config,
        verbose,
        command,
    } = Cli::parse();
    init_logging(verbose);

    let cancel = Cancellation::new();
    register_signals(&cancel);

    let result = match command {
        Command::Resolve { head } => commands::resolve::run(config.as_deref(), head, &cancel),
        Command::Hook {
            event,
            payload,
            origin,
        } => commands::hook::run(config.as_deref(), event, payload.as_deref(), &origin, &cancel),
        Command::FallbackFetch {
            repo,
            url,
            remote,
            branches,
        } => commands::fallback::run(&repo, &url, &remote, branches, &cancel),
    };

    if let Err(e) = result {
        if cancel.is_cancelled() || commands::is_interrupted(&e) {
            eprintln!("Interrupted");
            std::process::exit(130);
        }
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
