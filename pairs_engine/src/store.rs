/// store.rs - Named CSV datasets on disk
///
/// Layout: `<dir>/<name>.csv` with columns `date` (YYYY-MM-DD) and `value`.
/// `export` appends to an existing dataset or creates it; rows for dates
/// already stored are replaced by the new values.  `import` of a missing
/// dataset is a recoverable `NotFound`.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{PairsError, Result};
use crate::series::TimeSeries;

const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub struct DataStore {
    dir: PathBuf,
}

impl DataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let ok = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '='))
            && !name.starts_with('.');
        if !ok {
            return Err(PairsError::InvalidParameter {
                name:   "dataset name",
                reason: format!("{name:?} is not a plain file name"),
            });
        }
        Ok(self.dir.join(format!("{name}.csv")))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Read a dataset.
    pub fn import(&self, name: &str) -> Result<TimeSeries<f64>> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(PairsError::NotFound(format!("dataset {name} ({})", path.display())));
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.clone()))?
            .finish()?;

        let dates = df.column("date")?.str()?;
        let values = df.column("value")?.cast(&DataType::Float64)?;
        let values = values.f64()?;

        let mut index = Vec::with_capacity(df.height());
        let mut out = Vec::with_capacity(df.height());
        for (i, (d, v)) in dates.into_iter().zip(values.into_iter()).enumerate() {
            let date = d
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FMT).ok())
                .ok_or_else(|| PairsError::Storage(format!("{name}: bad date at row {i}")))?;
            index.push(date);
            out.push(v.unwrap_or(f64::NAN));
        }
        debug!(name, rows = out.len(), "imported dataset");
        TimeSeries::new(index, out)
    }

    /// Append-or-create.  Returns the number of rows stored afterwards.
    pub fn export(&self, name: &str, series: &TimeSeries<f64>) -> Result<usize> {
        let path = self.path_for(name)?;
        let mut rows: BTreeMap<NaiveDate, f64> = BTreeMap::new();

        match self.import(name) {
            Ok(saved) => rows.extend(saved.iter().map(|(d, v)| (d, *v))),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let before = rows.len();
        rows.extend(series.iter().map(|(d, v)| (d, *v)));

        fs::create_dir_all(&self.dir)?;
        let dates: Vec<String> = rows.keys().map(|d| d.format(DATE_FMT).to_string()).collect();
        let values: Vec<f64> = rows.values().copied().collect();
        let mut df = df!(
            "date" => dates,
            "value" => values,
        )?;

        let mut file = fs::File::create(&path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)?;

        info!(
            "Saved {} to {} ({} new rows, {} total)",
            name,
            path.display(),
            rows.len() - before,
            rows.len()
        );
        Ok(rows.len())
    }

    /// Names of every stored dataset, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let pattern = format!("{}/*.csv", glob::Pattern::escape(&self.dir.to_string_lossy()));
        let paths = glob::glob(&pattern).map_err(|e| PairsError::Storage(e.to_string()))?;
        let mut names: Vec<String> = paths
            .filter_map(|p| p.ok())
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }
}
