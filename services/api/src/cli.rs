use crate::demo::{run_demo, DemoArgs};
use crate::server;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use evisa::error::AppError;
use evisa::workflows::visa::eligibility::{
    format_display_date, minimum_expiry_for, parse_calendar_date,
};
use evisa::workflows::visa::{validate_passport_expiry, EligibilityResult};

#[derive(Parser, Debug)]
#[command(
    name = "E-Visa Application Service",
    about = "Run the e-visa application service or check passport eligibility from the command line",
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
    /// Passport utilities
    Passport {
        #[command(subcommand)]
        command: PassportCommand,
    },
    /// Walk a sample application through every step and checkout
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum PassportCommand {
    /// Check whether a passport stays valid long enough after arrival
    Check(PassportCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct PassportCheckArgs {
    /// Passport expiry date (YYYY-MM-DD)
    #[arg(long)]
    pub(crate) expiry: String,
    /// Planned arrival date (YYYY-MM-DD)
    #[arg(long)]
    pub(crate) arrival: Option<String>,
    /// Evaluation date (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Passport {
            command: PassportCommand::Check(args),
        } => {
            println!("{}", passport_check_report(&args));
            Ok(())
        }
        Command::Demo(args) => run_demo(args).await,
    }
}

pub(crate) fn passport_check_report(args: &PassportCheckArgs) -> String {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let result = validate_passport_expiry(&args.expiry, args.arrival.as_deref(), today);

    let mut lines = vec![format!("Evaluated on: {}", format_display_date(today))];
    if let Some(minimum) = args
        .arrival
        .as_deref()
        .and_then(parse_calendar_date)
        .and_then(minimum_expiry_for)
    {
        lines.push(format!(
            "Expiry must fall after: {}",
            format_display_date(minimum)
        ));
    }
    lines.push(match result {
        EligibilityResult::Valid => "Result: eligible".to_string(),
        EligibilityResult::Invalid(reason) => format!("Result: not eligible ({reason})"),
    });
    lines.join("\n")
}
