use crate::error::{RegistryError, Result};
use waypoint_core::LinkRecord;

/// Serialization formats for a registry dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full records, including visit history, as pretty-printed JSON.
    Json,
    /// One summary row per record. History and secrets are omitted.
    Csv,
}

pub fn export_records(records: &[LinkRecord], format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => to_json(records),
        ExportFormat::Csv => to_csv(records),
    }
}

fn to_json(records: &[LinkRecord]) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(records).map_err(|err| RegistryError::Export(err.to_string()))
}

fn to_csv(records: &[LinkRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record([
            "id",
            "code",
            "alias",
            "original_url",
            "normalized_url",
            "created_at",
            "expires_at",
            "visit_count",
        ])
        .map_err(|err| RegistryError::Export(err.to_string()))?;

    for record in records {
        writer
            .write_record([
                record.id.to_string(),
                record.code.as_str().to_string(),
                record
                    .alias
                    .as_ref()
                    .map(|alias| alias.as_str().to_string())
                    .unwrap_or_default(),
                record.original_url.clone(),
                record.normalized_url.clone(),
                record.created_at.to_string(),
                record
                    .expires_at
                    .map(|at| at.to_string())
                    .unwrap_or_default(),
                record.visit_count.to_string(),
            ])
            .map_err(|err| RegistryError::Export(err.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|err| RegistryError::Export(err.to_string()))
}
