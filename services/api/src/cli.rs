use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tour_booking::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Tour Booking Engine",
    about = "Serve or demonstrate school tour availability and booking from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// List a day's free tour slots and book one against in-memory stores
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON file of calendar connections used to seed the credential store
    #[arg(long)]
    pub(crate) connections: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["tour-booking-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn serve_accepts_overrides_and_seed_file() {
        let cli = Cli::try_parse_from([
            "tour-booking-api",
            "serve",
            "--port",
            "8080",
            "--connections",
            "connections.json",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(8080));
                assert_eq!(args.connections, Some(PathBuf::from("connections.json")));
                assert!(args.host.is_none());
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn demo_parses_dates_and_busy_spans() {
        let cli = Cli::try_parse_from([
            "tour-booking-api",
            "demo",
            "--date",
            "2025-10-01",
            "--busy",
            "13:00-14:30",
        ])
        .expect("parses");

        assert!(matches!(cli.command, Some(Command::Demo(_))));
    }
}
