//! Command-line definition and dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::commands::{admin, datasources, predict, predictors};
use crate::output::{print_info, OutputFormat};

/// Predictive tables CLI
#[derive(Parser, Debug)]
#[command(name = "ptq")]
#[command(author, version, about = "CLI for predictive tables", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via PTQ_API_URL env var)
    #[arg(long, env = "PTQ_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create and train a predictor
    Train {
        /// Predictor name
        name: String,

        /// Target column(s), comma separated
        #[arg(long)]
        predict: String,

        /// Query selecting the training rows
        #[arg(long, conflicts_with = "external_datasource")]
        select_data_query: Option<String>,

        /// Saved datasource holding the training rows
        #[arg(long)]
        external_datasource: Option<String>,

        /// Wait until training has finished
        #[arg(long)]
        join: bool,

        /// Stop training after this many seconds
        #[arg(long)]
        stop_after: Option<u64>,
    },

    /// List predictors and their status
    Predictors {
        /// Show a single predictor
        #[arg(long, short)]
        name: Option<String>,
    },

    /// Query a predictor
    Predict {
        /// Predictor name
        name: String,

        /// Feature value as column=value (repeatable)
        #[arg(long = "where", short = 'w')]
        conditions: Vec<String>,

        /// Predict for every row this query returns
        #[arg(long, conflicts_with_all = ["conditions", "external_datasource"])]
        select_data_query: Option<String>,

        /// Predict for every row of a saved datasource
        #[arg(long, conflicts_with = "conditions")]
        external_datasource: Option<String>,

        /// Columns to return (defaults to all)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },

    /// Delete a predictor through the command queue
    Delete {
        /// Predictor name
        name: String,

        /// Cancel training in progress
        #[arg(long)]
        force: bool,
    },

    /// Show queued and processed commands
    Commands,

    /// List the tables of the virtual database
    Tables,

    /// Manage datasources
    #[command(subcommand)]
    Datasources(DatasourceCommands),
}

#[derive(Subcommand, Debug)]
pub enum DatasourceCommands {
    /// List saved datasources
    List,

    /// Save rows from a JSON file ({"columns": [...], "rows": [[...]]})
    Upload {
        name: String,

        #[arg(long)]
        file: PathBuf,
    },

    /// Save a query against an integration
    Link {
        name: String,

        #[arg(long)]
        integration: String,

        #[arg(long)]
        query: String,
    },

    /// Delete a datasource
    Delete { name: String },
}

/// Execute a parsed command line against the API at `api_url`
pub async fn run(command: Commands, api_url: &str, format: OutputFormat, verbose: bool) -> Result<()> {
    if verbose {
        print_info(&format!("Using API at {}", api_url));
    }
    let client = ApiClient::new(api_url)?;

    match command {
        Commands::Train {
            name,
            predict,
            select_data_query,
            external_datasource,
            join,
            stop_after,
        } => {
            let source =
                predictors::TrainingSource::from_args(select_data_query, external_datasource)?;
            predictors::train(&client, &name, &predict, source, join, stop_after, format).await?;
        }
        Commands::Predictors { name } => {
            predictors::list_predictors(&client, name, format).await?;
        }
        Commands::Predict {
            name,
            conditions,
            select_data_query,
            external_datasource,
            columns,
        } => {
            let input = match (select_data_query, external_datasource) {
                (Some(q), _) => predict::PredictInput::Query(q),
                (None, Some(d)) => predict::PredictInput::Datasource(d),
                (None, None) => predict::PredictInput::Point(conditions),
            };
            predict::predict(&client, &name, input, columns, format).await?;
        }
        Commands::Delete { name, force } => {
            let command = admin::delete_command(&name, force)?;
            admin::enqueue(&client, &command, format).await?;
        }
        Commands::Commands => admin::list_commands(&client, format).await?,
        Commands::Tables => admin::list_tables(&client, format).await?,
        Commands::Datasources(ds) => match ds {
            DatasourceCommands::List => datasources::list(&client, format).await?,
            DatasourceCommands::Upload { name, file } => {
                datasources::upload(&client, &name, &file, format).await?;
            }
            DatasourceCommands::Link {
                name,
                integration,
                query,
            } => {
                datasources::link(&client, &name, &integration, &query, format).await?;
            }
            DatasourceCommands::Delete { name } => {
                datasources::delete(&client, &name, format).await?;
            }
        },
    }

    Ok(())
}
