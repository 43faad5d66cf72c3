//! MCMC chain export to CSV (and reading it back for `norm-plot`).
//!
//! One row per walker position: `step,walker,<param names...>`.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::domain::McmcChain;
use crate::error::AppError;

/// Write a chain to CSV.
pub fn write_chains_csv(path: &Path, chain: &McmcChain) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create chains CSV '{}': {e}", path.display())))?;

    writeln!(file, "step,walker,{}", chain.names.join(","))
        .map_err(|e| AppError::new(2, format!("Failed to write chains CSV header: {e}")))?;

    for step in 0..chain.nsteps {
        for walker in 0..chain.nwalkers {
            let values: Vec<String> = chain
                .position(step, walker)
                .iter()
                .map(|v| format!("{v:.10e}"))
                .collect();
            writeln!(file, "{step},{walker},{}", values.join(","))
                .map_err(|e| AppError::new(2, format!("Failed to write chains CSV row: {e}")))?;
        }
    }

    info!(path = %path.display(), nsteps = chain.nsteps, nwalkers = chain.nwalkers, "wrote chains");
    Ok(())
}

/// Read a chain written by [`write_chains_csv`].
///
/// Rows may come in any order but every `(step, walker)` pair must be present once.
pub fn read_chains_csv(path: &Path) -> Result<McmcChain, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open chains CSV '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read chains CSV header: {e}")))?
        .clone();
    if headers.len() < 3 || &headers[0] != "step" || &headers[1] != "walker" {
        return Err(AppError::new(
            2,
            format!("'{}' is not a chains CSV (expected `step,walker,...`).", path.display()),
        ));
    }
    let names: Vec<String> = headers.iter().skip(2).map(str::to_string).collect();

    let mut rows: Vec<(usize, usize, Vec<f64>)> = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.map_err(|e| AppError::new(2, format!("chains CSV line {line}: {e}")))?;
        let bad = |what: &str| AppError::new(2, format!("chains CSV line {line}: invalid {what}"));
        let step: usize = record.get(0).and_then(|s| s.parse().ok()).ok_or_else(|| bad("step"))?;
        let walker: usize = record.get(1).and_then(|s| s.parse().ok()).ok_or_else(|| bad("walker"))?;
        let values: Vec<f64> = (2..headers.len())
            .map(|i| record.get(i).and_then(|s| s.parse().ok()).ok_or_else(|| bad(&headers[i])))
            .collect::<Result<_, _>>()?;
        rows.push((step, walker, values));
    }
    if rows.is_empty() {
        return Err(AppError::new(3, format!("Chains CSV '{}' has no samples.", path.display())));
    }

    let nsteps = rows.iter().map(|r| r.0).max().unwrap_or(0) + 1;
    let nwalkers = rows.iter().map(|r| r.1).max().unwrap_or(0) + 1;
    if rows.len() != nsteps * nwalkers {
        return Err(AppError::new(
            2,
            format!(
                "Chains CSV has {} rows, expected {nsteps} steps x {nwalkers} walkers.",
                rows.len()
            ),
        ));
    }
    rows.sort_by_key(|r| (r.0, r.1));
    if let Some(dup) = rows.windows(2).find(|w| (w[0].0, w[0].1) == (w[1].0, w[1].1)) {
        return Err(AppError::new(
            2,
            format!("Chains CSV repeats step {} walker {}.", dup[0].0, dup[0].1),
        ));
    }

    Ok(McmcChain {
        names,
        nwalkers,
        nsteps,
        samples: rows.into_iter().map(|r| r.2).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_survive_a_round_trip() {
        let chain = McmcChain {
            names: vec!["Av".to_string(), "Rv".to_string()],
            nwalkers: 2,
            nsteps: 3,
            samples: (0..6).map(|i| vec![0.1 * i as f64, 3.0 + i as f64]).collect(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("star_mefit_chains.csv");
        write_chains_csv(&path, &chain).unwrap();

        let back = read_chains_csv(&path).unwrap();
        assert_eq!(back.names, chain.names);
        assert_eq!((back.nsteps, back.nwalkers), (3, 2));
        for (a, b) in back.samples.iter().flatten().zip(chain.samples.iter().flatten()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn incomplete_chain_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "step,walker,Av\n0,0,1.0\n0,1,1.1\n1,0,1.2\n").unwrap();
        assert_eq!(read_chains_csv(&path).unwrap_err().exit_code(), 2);

        // Right row count, but (1, 0) twice and (1, 1) missing.
        std::fs::write(&path, "step,walker,Av\n0,0,1.0\n0,1,1.1\n1,0,1.2\n1,0,1.3\n").unwrap();
        let err = read_chains_csv(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("repeats step 1 walker 0"));

        std::fs::write(&path, "a,b,c\n").unwrap();
        assert!(read_chains_csv(&path).is_err());
    }
}
