use std::process;

use anyhow::{Context, Result};
use storefront_service::metrics;
use storefront_service::{CmsClient, logging};

use settings::{OutputFormat, Settings};

mod output;
mod settings;

async fn execute(settings: Settings) -> Result<()> {
    let Settings {
        config,
        output_format,
        command,
    } = settings;

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd,
            config.metrics.custom_tags.clone(),
        )?;
    }

    let query = command.query()?;
    let client = CmsClient::new(&config.cms).context("failed to create CMS client")?;

    tracing::info!(query = %query.cache_key(), locale = client.locale(), "Querying the CMS");
    let response = client
        .fetch(&query)
        .await
        .with_context(|| format!("failed to fetch {}", query.kind()))?;

    match output_format {
        OutputFormat::Json => output::print_json(&response),
        OutputFormat::Compact => output::print_compact(&query, &response, client.base_url()),
    }
}

#[tokio::main]
async fn main() {
    let settings = match Settings::get() {
        Ok(settings) => settings,
        Err(error) => {
            logging::ensure_log_error(&error);
            process::exit(1);
        }
    };

    logging::init_logging(&settings.config);

    if let Err(error) = execute(settings).await {
        logging::ensure_log_error(&error);
        process::exit(1);
    }
}
