//! Data Loading
//!
//! Farm, species, override and dependency tables are read from CSV or Parquet
//! through Polars, or from JSON arrays of flat objects, and flattened into
//! [`Record`]s. Nulls become absent cells so downstream code sees them as missing.

use crate::catalog::RecordIndex;
use crate::config::CompiledConfig;
use crate::exclusion::SpeciesDependency;
use crate::params::{build_params_index, ParamsIndex};
use crate::record::{Record, Value};
use anyhow::{bail, Context, Result};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Columns of the optional dependency table
pub const DEPENDS_ON_COLUMN: &str = "depends_on";

/// Load a table by file extension (`.csv`, `.parquet`, `.json`)
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let records = match ext.as_str() {
        "csv" => dataframe_to_records(&read_csv(path)?)?,
        "parquet" => dataframe_to_records(&read_parquet(path)?)?,
        "json" => read_json_records(path)?,
        other => bail!("Unsupported table format '{}': {:?}", other, path),
    };

    tracing::debug!("Loaded {} rows from {:?}", records.len(), path);
    Ok(records)
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
        .finish()
        .with_context(|| format!("Failed to load CSV: {:?}", path))
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    LazyFrame::scan_parquet(path, Default::default())
        .with_context(|| format!("Failed to scan parquet: {:?}", path))?
        .collect()
        .with_context(|| format!("Failed to load parquet: {:?}", path))
}

fn read_json_records(path: &Path) -> Result<Vec<Record>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Expected a JSON array of objects: {:?}", path))
}

/// Flatten a DataFrame row-wise
///
/// Booleans and strings are kept as-is, list columns become list cells of
/// strings, and every other dtype is read as Float64.
pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<Record>> {
    let mut records = vec![Record::new(); df.height()];

    for column in df.get_columns() {
        let name = column.name().to_string();

        match column.dtype() {
            DataType::Boolean => {
                let values = column.bool()?;
                for (record, v) in records.iter_mut().zip(values.into_iter()) {
                    if let Some(v) = v {
                        record.insert(name.as_str(), v);
                    }
                }
            }
            DataType::String => {
                let values = column.str()?;
                for (record, v) in records.iter_mut().zip(values.into_iter()) {
                    if let Some(v) = v {
                        record.insert(name.as_str(), v);
                    }
                }
            }
            DataType::List(_) => {
                let values = column.list()?;
                for (idx, record) in records.iter_mut().enumerate() {
                    if let Some(items) = values.get_as_series(idx) {
                        let items = items.cast(&DataType::String)?;
                        let items: Vec<String> = items
                            .str()?
                            .into_iter()
                            .flatten()
                            .map(str::to_string)
                            .collect();
                        record.insert(name.as_str(), items);
                    }
                }
            }
            _ => {
                let cast = column.cast(&DataType::Float64).with_context(|| {
                    format!("Column '{}' is neither numeric, string nor boolean", name)
                })?;
                let values = cast.f64()?;
                for (record, v) in records.iter_mut().zip(values.into_iter()) {
                    if let Some(v) = v {
                        record.insert(name.as_str(), Value::Number(v));
                    }
                }
            }
        }
    }

    Ok(records)
}

/// Input locations for one batch
#[derive(Debug, Clone)]
pub struct InputPaths {
    pub config: PathBuf,
    pub farms: PathBuf,
    pub species: PathBuf,
    pub overrides: Option<PathBuf>,
    pub dependencies: Option<PathBuf>,
}

/// Everything a batch run needs, indexed and validated
pub struct EngineInputs {
    pub config: CompiledConfig,
    pub farms: RecordIndex,
    pub species: RecordIndex,
    pub params: ParamsIndex,
    pub dependencies: Vec<SpeciesDependency>,
}

impl EngineInputs {
    pub fn load(paths: &InputPaths) -> Result<Self> {
        let config = CompiledConfig::load(&paths.config)?;

        let farms = RecordIndex::from_records(load_records(&paths.farms)?, &config.ids.farm);
        let species =
            RecordIndex::from_records(load_records(&paths.species)?, &config.ids.species);

        let params = match &paths.overrides {
            Some(path) => {
                let rows = load_records(path)?;
                build_params_index(&rows, &config)
                    .with_context(|| format!("Invalid species overrides: {:?}", path))?
            }
            None => ParamsIndex::new(),
        };

        let dependencies = match &paths.dependencies {
            Some(path) => SpeciesDependency::from_records(
                &load_records(path)?,
                &config.ids.species,
                DEPENDS_ON_COLUMN,
            ),
            None => Vec::new(),
        };

        tracing::info!("  Farms: {}", farms.len());
        tracing::info!("  Species: {}", species.len());
        tracing::info!("  Overrides: {}", params.len());
        tracing::info!("  Dependencies: {}", dependencies.len());

        Ok(Self {
            config,
            farms,
            species,
            params,
            dependencies,
        })
    }
}
