use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod commands;

#[derive(Parser)]
#[command(
    name = "shutdown-timer",
    version,
    about = "Schedule a shutdown, reboot or suspend"
)]
struct Cli {
    /// Verbose logging (RUST_LOG overrides)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the timer in the foreground, reading intents from stdin
    Run,
    /// Schedule the power action
    Start {
        /// Minutes from now (defaults to the shutdown slider)
        #[arg(long)]
        minutes: Option<u32>,
        /// poweroff, reboot or suspend
        #[arg(long)]
        mode: Option<String>,
    },
    /// Cancel the scheduled power action
    Stop,
    /// Change the power action mode
    Mode {
        /// poweroff, reboot or suspend
        mode: String,
    },
    /// Show the current schedule
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "shutdown_timer_core=debug,shutdown_timer=debug,info"
    } else {
        "shutdown_timer_core=info,shutdown_timer=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
                .with_filter(filter),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Run => commands::daemon::run(),
        Commands::Start { minutes, mode } => commands::schedule::start(minutes, mode),
        Commands::Stop => commands::schedule::stop(),
        Commands::Mode { mode } => commands::schedule::set_mode(&mode),
        Commands::Status { json } => commands::schedule::status(json),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
