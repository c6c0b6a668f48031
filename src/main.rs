use std::process;

use catalog_cache::{
    cache::{ParamValue, generate_key},
    config::{self, Command, KeyArgs, ReplayArgs, Settings},
    error::AppError,
    infra::{fixture::Fixture, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Key(args) => run_key(args),
        Command::Replay(args) => run_replay(settings, args).await,
    }
}

fn run_key(args: KeyArgs) -> Result<(), AppError> {
    let params = args
        .params
        .iter()
        .map(|(name, raw)| (name.clone(), parse_param_value(raw)));
    let key = generate_key(&args.prefix, params)?;
    println!("{key}");
    Ok(())
}

/// JSON when it parses, the raw text otherwise.
fn parse_param_value(raw: &str) -> ParamValue {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(ParamValue::from)
        .unwrap_or_else(|_| ParamValue::from(raw))
}

async fn run_replay(settings: Settings, args: ReplayArgs) -> Result<(), AppError> {
    let fixture = Fixture::load(&args.fixture).await?;
    info!(
        fixture = %args.fixture.display(),
        products = fixture.products.len(),
        entries = fixture.entries.len(),
        events = fixture.events.len(),
        "Replaying fixture"
    );

    let report = fixture.replay(settings.cache_config()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
