use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Read a whitespace-separated numeric table.
///
/// Blank lines and `#` comments are skipped. The column count is sniffed
/// from the first data row and enforced on the rest.
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<f64>>> {
    let path = path.as_ref();
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("Could not open {}", path.display()))?,
    );

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut ncolumns = None;
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Could not read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let row: Vec<f64> = trimmed
            .split_whitespace()
            .map(|field| {
                field.parse::<f64>().with_context(|| {
                    format!(
                        "Could not parse '{field}' on line {} of {}",
                        line_number + 1,
                        path.display()
                    )
                })
            })
            .collect::<Result<_>>()?;

        match ncolumns {
            None => ncolumns = Some(row.len()),
            Some(expected) if expected != row.len() => bail!(
                "Inconsistent column count on line {} of {}: expected {expected}, found {}",
                line_number + 1,
                path.display(),
                row.len()
            ),
            Some(_) => {}
        }
        rows.push(row);
    }

    if rows.is_empty() {
        bail!("No data rows in {}", path.display());
    }
    Ok(rows)
}

/// Read a three-column observation table: covariate, observation,
/// uncertainty.
pub fn read_observations<P: AsRef<Path>>(path: P) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let path = path.as_ref();
    let rows = read_table(path)?;
    if rows[0].len() != 3 {
        bail!(
            "Expected 3 columns (covariate, observation, uncertainty) in {}, found {}",
            path.display(),
            rows[0].len()
        );
    }
    let mut covariates = Vec::with_capacity(rows.len());
    let mut observations = Vec::with_capacity(rows.len());
    let mut uncertainties = Vec::with_capacity(rows.len());
    for row in rows {
        covariates.push(row[0]);
        observations.push(row[1]);
        uncertainties.push(row[2]);
    }
    Ok((covariates, observations, uncertainties))
}
