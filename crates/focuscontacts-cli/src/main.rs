use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "focuscontacts", version, about = "FocusContacts CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Template management
    Template {
        #[command(subcommand)]
        action: commands::template::TemplateAction,
    },
    /// Allowed-contact management
    Contact {
        #[command(subcommand)]
        action: commands::contact::ContactAction,
    },
    /// Manual Begin/End
    Focus {
        #[command(subcommand)]
        action: commands::focus::FocusAction,
    },
    /// Show the timers derived from schedules
    Alarms(commands::alarms::AlarmsArgs),
    /// Re-derive timers and self-heal a missed start
    Reconcile(commands::reconcile::ReconcileArgs),
    /// Run the scheduler until interrupted
    Daemon(commands::daemon::DaemonArgs),
    /// Simulated device state
    Device {
        #[command(subcommand)]
        action: commands::device::DeviceAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FOCUSCONTACTS_LOG")
        .or_else(|_| EnvFilter::try_new(focuscontacts_core::Config::load_or_default().log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Template { action } => commands::template::run(action),
        Commands::Contact { action } => commands::contact::run(action),
        Commands::Focus { action } => commands::focus::run(action),
        Commands::Alarms(args) => commands::alarms::run(args),
        Commands::Reconcile(args) => commands::reconcile::run(args),
        Commands::Daemon(args) => commands::daemon::run(args),
        Commands::Device { action } => commands::device::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
