mod cli;

use crate::cli::{Command, ExpiryArg, FormatArg, SortArg, CLI};
use anyhow::Context;
use clap::Parser;
use std::io::Write;
use tracing::info;
use waypoint_codegen::RandomGenerator;
use waypoint_core::{ExpiryPreset, LinkRecord, RecordId};
use waypoint_registry::{
    CreateOutcome, CreateRequest, ExportFormat, Registry, ResolveOutcome, SortKey,
};
use waypoint_store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = CLI::try_parse()?;

    let store = SqliteStore::connect(&config.db_path)
        .await
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;
    let registry = Registry::new(store, RandomGenerator::new());

    match config.command {
        Command::Create {
            url,
            alias,
            expires,
            secret,
            force,
        } => {
            let mut request = CreateRequest::new(url);
            request.alias = alias;
            request.expiry = preset_for(expires).into();
            request.secret = secret;
            request.force = force;

            match registry.create(request).await? {
                CreateOutcome::Created(record) => {
                    info!(id = %record.id, "created");
                    print_record(&record);
                }
                CreateOutcome::DuplicateFound(record) => {
                    println!("already registered:");
                    print_record(&record);
                }
            }
        }

        Command::Resolve { key, secret } => match registry
            .resolve(&key, secret.as_deref(), None)
            .await?
        {
            ResolveOutcome::Found(record) => println!("{}", record.original_url),
            ResolveOutcome::NotFound => anyhow::bail!("no link registered under {key:?}"),
            ResolveOutcome::Expired => anyhow::bail!("link {key:?} has expired"),
            ResolveOutcome::SecretRequired => {
                anyhow::bail!("link {key:?} is gated; pass --secret")
            }
        },

        Command::List { sort } => {
            let key = match sort {
                SortArg::Created => SortKey::CreatedAt,
                SortArg::Visits => SortKey::VisitCount,
                SortArg::Code => SortKey::Code,
            };
            for record in registry.sorted(key).await? {
                print_record(&record);
            }
        }

        Command::Search { query } => {
            let hits = registry.search(&query).await?;
            if hits.is_empty() {
                println!("no matches");
            }
            for record in hits {
                print_record(&record);
            }
        }

        Command::Delete { id } => {
            if registry.delete(RecordId::from_u64(id)).await? {
                println!("deleted {id}");
            } else {
                println!("no link with id {id}");
            }
        }

        Command::Sweep => {
            let report = registry.sweep().await?;
            println!(
                "removed {} expired links, trimmed {} histories",
                report.removed, report.trimmed
            );
        }

        Command::Export { format, output } => {
            let format = match format {
                FormatArg::Json => ExportFormat::Json,
                FormatArg::Csv => ExportFormat::Csv,
            };
            let bytes = registry.export(format).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("writing export to {}", path.display()))?;
                    println!("wrote {} bytes to {}", bytes.len(), path.display());
                }
                None => std::io::stdout().write_all(&bytes)?,
            }
        }
    }

    Ok(())
}

fn preset_for(arg: ExpiryArg) -> ExpiryPreset {
    match arg {
        ExpiryArg::Never => ExpiryPreset::Never,
        ExpiryArg::OneHour => ExpiryPreset::OneHour,
        ExpiryArg::OneDay => ExpiryPreset::OneDay,
        ExpiryArg::SevenDays => ExpiryPreset::SevenDays,
        ExpiryArg::ThirtyDays => ExpiryPreset::ThirtyDays,
    }
}

fn print_record(record: &LinkRecord) {
    let alias = record
        .alias
        .as_ref()
        .map(|alias| format!(" (alias {})", alias.as_str()))
        .unwrap_or_default();
    let expires = record
        .expires_at
        .map(|at| format!(", expires {at}"))
        .unwrap_or_default();
    println!(
        "{} {}{} -> {} [{} visits{}]",
        record.id,
        record.code.as_str(),
        alias,
        record.original_url,
        record.visit_count,
        expires
    );
}
