use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use demand_forecaster::{config, forecast, ml, repo, telemetry};
use config::Config;
use demand_forecaster::domain::ForecastRequest;
use forecast::ForecastService;
use std::sync::Arc;
use telemetry::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const USAGE: &str = "usage: demand-forecaster <start RFC3339> [horizon_hours]\n       demand-forecaster week <YYYY-MM-DD>";

enum Command {
    Forecast(ForecastRequest),
    Week(NaiveDate),
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args {
        [cmd, date] if cmd == "week" => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("invalid date '{date}'"))?;
            Ok(Command::Week(date))
        }
        [start] | [start, _] => {
            let start = DateTime::parse_from_rfc3339(start)
                .with_context(|| format!("invalid start '{start}'"))?
                .with_timezone(&Utc);
            let horizon = match args.get(1) {
                Some(h) => h.parse().with_context(|| format!("invalid horizon '{h}'"))?,
                None => 24,
            };
            Ok(Command::Forecast(ForecastRequest::new(start, horizon)))
        }
        _ => bail!(USAGE),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let cfg = Config::load()?;
    let models = ml::ModelManifest::load(&cfg.data.manifest_path)?.into_bundle()?;
    let history = repo::CsvHistoricalStore::open(&cfg.data.history_csv)?;
    let service = ForecastService::from_config(
        &cfg,
        models,
        Arc::new(history),
        Arc::new(repo::ClimatologyWeatherProvider::new()),
    )?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        telemetry::shutdown_signal().await;
        warn!("shutdown requested, cancelling forecast");
        on_signal.cancel();
    });

    let output = match command {
        Command::Forecast(request) => {
            info!(start = %request.start, horizon = request.horizon_hours, "forecast requested");
            serde_json::to_string_pretty(&service.forecast(request, &cancel).await?)?
        }
        Command::Week(date) => {
            info!(%date, "weekly forecast requested");
            serde_json::to_string_pretty(&service.forecast_week(date, &cancel).await?)?
        }
    };
    println!("{output}");
    Ok(())
}
