//! `resourcectl`: derive, inspect and retire image resources from the shell.
//!
//! Every command prints its result as JSON on stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::{Level, info};

use resources::config::AppConfig;
use resources::derivation::{CropFields, DeriveError, DeriveOptions, PartialDerivation};
use resources::placeholder::GameRef;
use resources::state::AppState;
use resources::transcode::CropBox;

#[derive(Parser, Debug)]
#[command(name = "resourcectl", version, about, long_about = None)]
struct Args {
    /// Configuration file, with or without extension.
    #[arg(long, short, env = "RESOURCES_CONFIG", default_value = "config/resources")]
    config: String,

    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List resource types with their parent and aspect ratio.
    Types,
    /// Store an upload as a root rendition and derive all descendants.
    Derive {
        type_identifier: String,
        file: PathBuf,
        #[arg(long)]
        game: Option<i32>,
        #[arg(long)]
        user: Option<i32>,
        #[arg(long)]
        product: Option<i32>,
        #[arg(long)]
        site: Option<i32>,
        /// Crop box as `x,y,w,h` in source pixels.
        #[arg(long)]
        crop: Option<CropBox>,
    },
    /// Re-run the cascade below a stored resource.
    Cascade {
        resource_id: i32,
        /// Only record these descendant types. Repeatable.
        #[arg(long = "only")]
        only: Vec<String>,
    },
    /// Re-render a resource with a crop box, replacing it.
    Recrop { resource_id: i32, crop: CropBox },
    /// Soft-delete a resource.
    Delete { resource_id: i32 },
    /// Active resources of a game, grouped by type, newest first.
    List {
        game_id: i32,
        #[arg(long = "type")]
        type_identifier: Option<String>,
    },
    /// The rendition shown for a game, or its placeholder.
    Primary {
        game_id: i32,
        type_identifier: String,
        #[arg(long, default_value = "")]
        platform: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load_from(&args.config).context("Failed to load config")?;
    info!(config = %args.config, types = config.resource_types.len(), "Configuration loaded");

    let (state, _db) = AppState::connect(&config)
        .await
        .context("Failed to initialize resources")?;

    let output = run(&state, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(state: &AppState, command: Command) -> Result<Value> {
    match command {
        Command::Types => Ok(Value::Array(
            state
                .registry
                .iter()
                .map(|ty| {
                    json!({
                        "id": ty.id,
                        "identifier": ty.identifier,
                        "parent": state.registry.parent(ty).map(|p| &p.identifier),
                        "path": ty.path,
                        "max_width": ty.max_width,
                        "aspect_ratio": ty.aspect_ratio,
                        "aspect_ratio_label": state.registry.aspect_ratio_label(ty),
                        "quality": ty.quality,
                    })
                })
                .collect(),
        )),

        Command::Derive {
            type_identifier,
            file,
            game,
            user,
            product,
            site,
            crop,
        } => {
            let upload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let options = DeriveOptions {
                game_id: game,
                user_id: user,
                product_id: product,
                site_id: site,
                crop: crop.map(CropFields::from),
            };

            match state.engine.derive(upload, &type_identifier, &options).await {
                Ok(derivation) => Ok(json!({
                    "root": derivation.root,
                    "children": derivation.children,
                })),
                Err(DeriveError::Partial(partial)) => partial_failure(&partial),
                Err(e) => Err(e.into()),
            }
        }

        Command::Cascade { resource_id, only } => {
            let root = state
                .catalog
                .find(resource_id)
                .await?
                .with_context(|| format!("Resource {resource_id} not found"))?;
            let only = (!only.is_empty()).then_some(only.as_slice());

            match state.engine.derive_children(&root, only).await {
                Ok(created) => Ok(json!({ "created": created })),
                Err(DeriveError::Partial(partial)) => partial_failure(&partial),
                Err(e) => Err(e.into()),
            }
        }

        Command::Recrop { resource_id, crop } => {
            let resource = state
                .catalog
                .find(resource_id)
                .await?
                .with_context(|| format!("Resource {resource_id} not found"))?;
            match state.engine.recrop(&resource, crop).await {
                Ok(replacement) => Ok(json!({ "replaced": resource.id, "resource": replacement })),
                Err(DeriveError::Supersede {
                    replaced,
                    replacement,
                    source,
                }) => {
                    println!("{}", serde_json::to_string_pretty(&replacement)?);
                    bail!(
                        "Recorded replacement {} but resource {replaced} is still active ({source}); \
                         retry with `resourcectl delete {replaced}`",
                        replacement.id
                    )
                }
                Err(e) => Err(e.into()),
            }
        }

        Command::Delete { resource_id } => {
            state.catalog.soft_delete(resource_id).await?;
            Ok(json!({ "deleted": resource_id }))
        }

        Command::List {
            game_id,
            type_identifier,
        } => {
            let mut cache = state.cache();
            match type_identifier {
                Some(identifier) => {
                    state.registry.resolve(&identifier)?;
                    Ok(serde_json::to_value(cache.all(game_id, &identifier).await?)?)
                }
                None => Ok(serde_json::to_value(cache.for_entity(game_id, false).await?)?),
            }
        }

        Command::Primary {
            game_id,
            type_identifier,
            platform,
        } => {
            state.registry.resolve(&type_identifier)?;
            let mut cache = state.cache();
            let primary = cache
                .primary(&GameRef::new(game_id, platform), &type_identifier)
                .await?;
            Ok(json!({
                "placeholder": primary.is_placeholder(),
                "resource": primary.resource(),
            }))
        }
    }
}

/// Prints what was committed and what is missing, then fails.
fn partial_failure(partial: &PartialDerivation) -> Result<Value> {
    let failures: Vec<Value> = partial
        .failures
        .iter()
        .map(|f| {
            json!({
                "type": f.type_identifier,
                "stage": f.stage,
                "error": f.error.to_string(),
                "pending": f.pending,
            })
        })
        .collect();
    let report = json!({
        "root": partial.root,
        "created": partial.created,
        "failures": failures,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    bail!(
        "{} variant(s) missing; retry with `resourcectl cascade {} {}`",
        partial.failures.len(),
        partial.root.id,
        partial
            .missing_types()
            .iter()
            .map(|t| format!("--only {t}"))
            .collect::<Vec<_>>()
            .join(" ")
    )
}
