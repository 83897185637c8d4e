use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use storefront_service::Query;
use storefront_service::config::Config;
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Outputs the raw CMS response as JSON.
    Json,
    /// Outputs the products or categories as a table.
    Compact,
}

/// A utility that queries the storefront catalog from the headless CMS.
///
/// Settings are read from the YAML file given by `--config`, and can be overridden by
/// the `STOREFRONT_API_URL` environment variable and the options below.
#[derive(Clone, Parser, Debug)]
#[command(author, version, about, long_about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The URL of the CMS to connect to.
    #[arg(long, global = true)]
    pub url: Option<Url>,

    /// The locale to request content in, e.g. `ru` or `uz`.
    #[arg(long, global = true)]
    pub locale: Option<String>,

    /// The output format.
    #[arg(long, value_enum, default_value = "json", global = true)]
    format: OutputFormat,

    /// The severity level of logging output.
    ///
    /// Possible values:
    /// off, error, warn, info, debug, trace
    #[arg(long, global = true)]
    log_level: Option<LevelFilter>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Lists products, optionally filtered.
    Products {
        /// Only products made of this material.
        #[arg(long, conflicts_with_all = ["category", "category_ids"])]
        material: Option<String>,

        /// Only products in the category with this slug.
        #[arg(long, conflicts_with = "category_ids")]
        category: Option<String>,

        /// Only products in any of these categories, by numeric id.
        #[arg(long, value_delimiter = ',')]
        category_ids: Vec<u64>,
    },

    /// Shows a single product.
    Product {
        /// The document id of the product.
        document_id: String,
    },

    /// Lists categories.
    Categories {
        /// Fetch a single page of categories, starting at 1.
        #[arg(long)]
        page: Option<u32>,

        /// The size of a page.
        #[arg(long, default_value_t = 25, requires = "page")]
        page_size: u32,
    },

    /// Shows a single category, by document id or by slug.
    Category {
        /// The document id of the category.
        #[arg(required_unless_present = "slug")]
        document_id: Option<String>,

        /// Look the category up by its slug instead.
        #[arg(long, conflicts_with = "document_id")]
        slug: Option<String>,

        /// Include the products of the category.
        #[arg(long, requires = "slug")]
        with_products: bool,
    },

    /// Shows the global site settings.
    Global,
}

impl Command {
    /// The CMS query this command runs.
    pub fn query(&self) -> Result<Query> {
        let query = match self.clone() {
            Command::Products {
                material: Some(material),
                ..
            } => Query::ProductsByMaterial { material },
            Command::Products {
                category: Some(slug),
                ..
            } => Query::ProductsByCategorySlug { slug },
            Command::Products { category_ids, .. } if !category_ids.is_empty() => {
                Query::ProductsByCategoryIds { ids: category_ids }
            }
            Command::Products { .. } => Query::Products,
            Command::Product { document_id } => Query::Product { document_id },
            Command::Categories {
                page: Some(page),
                page_size,
            } => Query::CategoriesPage { page, page_size },
            Command::Categories { page: None, .. } => Query::Categories,
            Command::Category {
                slug: Some(slug),
                with_products: true,
                ..
            } => Query::CategoryWithProducts { slug },
            Command::Category {
                slug: Some(slug), ..
            } => Query::CategoryBySlug { slug },
            Command::Category {
                document_id: Some(document_id),
                ..
            } => Query::Category { document_id },
            Command::Category { .. } => bail!("either a document id or `--slug` is required"),
            Command::Global => Query::Global,
        };
        Ok(query)
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub config: Config,
    pub output_format: OutputFormat,
    pub command: Command,
}

impl Settings {
    pub fn get() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self> {
        let mut config = Config::get(cli.config.as_deref()).context("failed loading config")?;

        if let Some(url) = cli.url {
            config.cms.url = url;
        }
        if let Some(locale) = cli.locale {
            config.cms.locale = locale;
        }
        if let Some(level) = cli.log_level {
            config.logging.level = level;
        }

        Ok(Settings {
            config,
            output_format: cli.format,
            command: cli.command,
        })
    }
}
