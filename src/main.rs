use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assetlink::cli::commands;
use assetlink::{config, Api};

#[derive(Parser)]
#[command(name = "assetlink")]
#[command(version, about = "Asset-management platform CRUD, task and storage client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (YAML); environment variables are used when omitted
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Read entities
    Read {
        /// Entity type, e.g. Task
        entity: String,

        /// Filter expression as JSON, e.g. '[["name","is","Foo"]]'
        #[arg(long)]
        filter: Option<String>,

        /// Comma-separated fields to return
        #[arg(long)]
        fields: Option<String>,

        /// Page number
        #[arg(long)]
        page: Option<u32>,

        /// Rows per page
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Check an async task once
    Resolve {
        task_id: String,
    },

    /// Wait for an async task to finish
    Poll {
        task_id: String,
    },

    /// Upload a file to object storage and record it as an attachment
    Upload {
        /// Local file
        path: PathBuf,

        /// Object key behind the bucket, e.g. project/seq/shot/v001.mov
        key: String,

        /// Project reference as JSON, e.g. '{"id":1,"type":"Project"}'
        #[arg(long)]
        project: Option<String>,

        /// Entity to link the attachment to, as JSON
        #[arg(long)]
        entity: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Each invocation performs one operation; a single thread is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;
    let api = Api::new(config).context("Failed to initialise HTTP transport")?;

    match cli.command {
        Commands::Read {
            entity,
            filter,
            fields,
            page,
            page_size,
        } => {
            commands::cmd_read(&api, &entity, filter.as_deref(), fields.as_deref(), page, page_size).await?;
        }
        Commands::Resolve { task_id } => {
            commands::cmd_resolve(&api, &task_id).await?;
        }
        Commands::Poll { task_id } => {
            commands::cmd_poll(&api, &task_id).await?;
        }
        Commands::Upload {
            path,
            key,
            project,
            entity,
        } => {
            commands::cmd_upload(&api, &path, &key, project.as_deref(), entity.as_deref()).await?;
        }
    }

    Ok(())
}
