//! Dataset I/O for σ-MART.
//!
//! JSON schemas for the inputs and outputs of the pipeline: region
//! partitions, system descriptions (linear or uncertain PWA), dense and
//! sparse probability matrices (indexed `[to, from]`, with an explicit
//! unsafe slot), and the synthesized certificate. Loaders validate
//! shapes and invariants before any computation starts; every failure
//! here is a dataset-parse error, never a panic.

use mart_core::{MartError, ProbBound};
use mart_geom::Hyperrectangle;
use mart_prob::{
    AffineMap, LinearGaussian, PwaPiece, StochasticSystem, TransitionMatrices, UncertainPwa,
};
use mart_synth::BarrierCertificate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors at the dataset boundary.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid dataset: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] MartError),
}

impl From<DatasetError> for MartError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Core(e) => e,
            other => MartError::DatasetParse(other.to_string()),
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, DatasetError> {
    let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DatasetError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn matrix_from_rows(rows: &[Vec<f64>], what: &str) -> Result<Array2<f64>, DatasetError> {
    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if nrows == 0 || ncols == 0 {
        return Err(DatasetError::Invalid(format!("{what} is empty")));
    }
    let mut m = Array2::<f64>::zeros((nrows, ncols));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != ncols {
            return Err(DatasetError::Invalid(format!(
                "{what} row {i} has {} entries, expected {ncols}",
                row.len()
            )));
        }
        for (j, &v) in row.iter().enumerate() {
            m[[i, j]] = v;
        }
    }
    Ok(m)
}

// ---------------------------------------------------------------------------
// Partitions.
// ---------------------------------------------------------------------------

/// One region's per-coordinate bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionBounds {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
}

/// The `partitions` dataset: shape (N, 2, m).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionsFile {
    pub partitions: Vec<PartitionBounds>,
}

pub fn load_partitions(path: &Path) -> Result<Vec<Hyperrectangle>, DatasetError> {
    let file: PartitionsFile = read_json(path)?;
    partitions_from_records(&file.partitions)
}

pub fn partitions_from_records(
    records: &[PartitionBounds],
) -> Result<Vec<Hyperrectangle>, DatasetError> {
    if records.is_empty() {
        return Err(DatasetError::Invalid("no partitions".to_string()));
    }
    records
        .iter()
        .map(|r| {
            Hyperrectangle::new(
                Array1::from_vec(r.low.clone()),
                Array1::from_vec(r.high.clone()),
            )
            .map_err(DatasetError::from)
        })
        .collect()
}

pub fn save_partitions(
    path: &Path,
    partitions: &[Hyperrectangle],
) -> Result<(), DatasetError> {
    let records: Vec<PartitionBounds> = partitions
        .iter()
        .map(|h| PartitionBounds {
            low: h.low().to_vec(),
            high: h.high().to_vec(),
        })
        .collect();
    write_json(path, &PartitionsFile { partitions: records })
}

// ---------------------------------------------------------------------------
// Systems.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffineMapRecord {
    pub a: Vec<Vec<f64>>,
    pub b: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PwaPieceRecord {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
    pub maps: Vec<AffineMapRecord>,
}

/// System description, tagged by dynamics kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SystemFile {
    Linear {
        a: Vec<Vec<f64>>,
        b: Vec<f64>,
        sigma: Vec<f64>,
        safe_low: Vec<f64>,
        safe_high: Vec<f64>,
    },
    Pwa {
        sigma: Vec<f64>,
        safe_low: Vec<f64>,
        safe_high: Vec<f64>,
        pieces: Vec<PwaPieceRecord>,
    },
}

fn affine_from_record(record: &AffineMapRecord) -> Result<AffineMap, DatasetError> {
    let a = matrix_from_rows(&record.a, "dynamics matrix")?;
    AffineMap::new(a, Array1::from_vec(record.b.clone())).map_err(DatasetError::from)
}

pub fn load_system(path: &Path) -> Result<StochasticSystem, DatasetError> {
    let file: SystemFile = read_json(path)?;
    system_from_record(&file)
}

pub fn system_from_record(file: &SystemFile) -> Result<StochasticSystem, DatasetError> {
    match file {
        SystemFile::Linear {
            a,
            b,
            sigma,
            safe_low,
            safe_high,
        } => {
            let safe = Hyperrectangle::new(
                Array1::from_vec(safe_low.clone()),
                Array1::from_vec(safe_high.clone()),
            )?;
            let system = LinearGaussian::new(
                matrix_from_rows(a, "dynamics matrix")?,
                Array1::from_vec(b.clone()),
                Array1::from_vec(sigma.clone()),
                safe,
            )?;
            Ok(StochasticSystem::Linear(system))
        }
        SystemFile::Pwa {
            sigma,
            safe_low,
            safe_high,
            pieces,
        } => {
            let safe = Hyperrectangle::new(
                Array1::from_vec(safe_low.clone()),
                Array1::from_vec(safe_high.clone()),
            )?;
            let pieces: Vec<PwaPiece> = pieces
                .iter()
                .map(|p| {
                    let region = Hyperrectangle::new(
                        Array1::from_vec(p.low.clone()),
                        Array1::from_vec(p.high.clone()),
                    )?;
                    let maps: Vec<AffineMap> = p
                        .maps
                        .iter()
                        .map(affine_from_record)
                        .collect::<Result<_, _>>()?;
                    PwaPiece::new(region, maps).map_err(DatasetError::from)
                })
                .collect::<Result<_, _>>()?;
            let system =
                UncertainPwa::new(pieces, Array1::from_vec(sigma.clone()), safe)?;
            Ok(StochasticSystem::Pwa(system))
        }
    }
}

// ---------------------------------------------------------------------------
// Probability matrices.
// ---------------------------------------------------------------------------

/// Dense probability matrices, `[to][from]`, with separate unsafe rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseProbabilityFile {
    pub matrix_prob_lower: Vec<Vec<f64>>,
    pub matrix_prob_upper: Vec<Vec<f64>>,
    pub matrix_prob_unsafe_lower: Vec<f64>,
    pub matrix_prob_unsafe_upper: Vec<f64>,
}

/// One sparse column: per-source-region (indices, values) with the
/// explicit N+1-th unsafe slot addressed as index N.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseColumnRecord {
    pub indices: Vec<usize>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseProbabilityFile {
    pub num_regions: usize,
    pub columns: Vec<SparseColumnRecord>,
}

/// Either probability layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbabilityFile {
    Sparse(SparseProbabilityFile),
    Dense(DenseProbabilityFile),
}

pub fn load_probabilities(path: &Path) -> Result<TransitionMatrices, DatasetError> {
    let file: ProbabilityFile = read_json(path)?;
    match file {
        ProbabilityFile::Dense(dense) => matrices_from_dense(&dense),
        ProbabilityFile::Sparse(sparse) => matrices_from_sparse(&sparse),
    }
}

pub fn matrices_from_dense(
    file: &DenseProbabilityFile,
) -> Result<TransitionMatrices, DatasetError> {
    let lower = matrix_from_rows(&file.matrix_prob_lower, "matrix_prob_lower")?;
    let upper = matrix_from_rows(&file.matrix_prob_upper, "matrix_prob_upper")?;
    let n = lower.ncols();
    if lower.nrows() != n || upper.nrows() != n || upper.ncols() != n {
        return Err(DatasetError::Invalid(format!(
            "probability matrices must be square and matching, got {}x{} and {}x{}",
            lower.nrows(),
            lower.ncols(),
            upper.nrows(),
            upper.ncols()
        )));
    }
    if file.matrix_prob_unsafe_lower.len() != n || file.matrix_prob_unsafe_upper.len() != n {
        return Err(DatasetError::Invalid(format!(
            "unsafe vectors must have length {n}"
        )));
    }

    let columns: Vec<Vec<(usize, ProbBound)>> = (0..n)
        .map(|j| {
            let mut column: Vec<(usize, ProbBound)> = Vec::new();
            for i in 0..n {
                let bound = ProbBound::new(
                    lower[[i, j]].min(upper[[i, j]]),
                    upper[[i, j]],
                );
                if bound.upper > 0.0 {
                    column.push((i, bound));
                }
            }
            column.push((
                n,
                ProbBound::new(
                    file.matrix_prob_unsafe_lower[j].min(file.matrix_prob_unsafe_upper[j]),
                    file.matrix_prob_unsafe_upper[j],
                ),
            ));
            column
        })
        .collect();
    TransitionMatrices::from_bound_columns(n, &columns).map_err(DatasetError::from)
}

pub fn matrices_from_sparse(
    file: &SparseProbabilityFile,
) -> Result<TransitionMatrices, DatasetError> {
    let n = file.num_regions;
    if file.columns.len() != n {
        return Err(DatasetError::Invalid(format!(
            "expected {n} columns, got {}",
            file.columns.len()
        )));
    }
    let columns: Vec<Vec<(usize, ProbBound)>> = file
        .columns
        .iter()
        .enumerate()
        .map(|(j, col)| {
            if col.indices.len() != col.lower.len() || col.indices.len() != col.upper.len() {
                return Err(DatasetError::Invalid(format!(
                    "column {j}: indices/lower/upper lengths differ"
                )));
            }
            let mut entries: Vec<(usize, ProbBound)> = col
                .indices
                .iter()
                .zip(col.lower.iter().zip(col.upper.iter()))
                .map(|(&i, (&l, &u))| (i, ProbBound::new(l.min(u), u)))
                .collect();
            entries.sort_by_key(|&(i, _)| i);
            Ok(entries)
        })
        .collect::<Result<_, _>>()?;
    TransitionMatrices::from_bound_columns(n, &columns).map_err(DatasetError::from)
}

/// Persist matrices in the sparse layout.
pub fn save_probabilities(
    path: &Path,
    matrices: &TransitionMatrices,
) -> Result<(), DatasetError> {
    let n = matrices.num_regions();
    let columns: Vec<SparseColumnRecord> = (0..n)
        .map(|j| {
            let mut indices = Vec::new();
            let mut lower = Vec::new();
            let mut upper = Vec::new();
            for (i, u) in matrices.upper.column(j) {
                indices.push(i);
                lower.push(matrices.lower.get(i, j));
                upper.push(u);
            }
            SparseColumnRecord {
                indices,
                lower,
                upper,
            }
        })
        .collect();
    write_json(
        path,
        &SparseProbabilityFile {
            num_regions: n,
            columns,
        },
    )
}

// ---------------------------------------------------------------------------
// Certificates.
// ---------------------------------------------------------------------------

/// The synthesized certificate on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateFile {
    pub barrier: Vec<f64>,
    pub eta: f64,
    pub beta: f64,
    pub beta_per_region: Vec<f64>,
}

pub fn save_certificate(
    path: &Path,
    certificate: &BarrierCertificate,
) -> Result<(), DatasetError> {
    write_json(
        path,
        &CertificateFile {
            barrier: certificate.values.to_vec(),
            eta: certificate.eta,
            beta: certificate.beta,
            beta_per_region: certificate.beta_per_region.to_vec(),
        },
    )
}

pub fn load_certificate(path: &Path) -> Result<BarrierCertificate, DatasetError> {
    let file: CertificateFile = read_json(path)?;
    if file.barrier.len() != file.beta_per_region.len() {
        return Err(DatasetError::Invalid(
            "barrier and beta_per_region lengths differ".to_string(),
        ));
    }
    Ok(BarrierCertificate {
        values: Array1::from_vec(file.barrier),
        eta: file.eta,
        beta: file.beta,
        beta_per_region: Array1::from_vec(file.beta_per_region),
    })
}

/// The barrier vector as plain text, one value per line.
pub fn save_barrier_txt(
    path: &Path,
    certificate: &BarrierCertificate,
) -> Result<(), DatasetError> {
    let mut text = String::new();
    for v in certificate.values.iter() {
        text.push_str(&format!("{v:.17e}\n"));
    }
    std::fs::write(path, text).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mart_data_test_{name}"))
    }

    #[test]
    fn test_partitions_round_trip() {
        let partitions = vec![
            Hyperrectangle::new(arr1(&[-1.0, 0.0]), arr1(&[0.0, 1.0])).unwrap(),
            Hyperrectangle::new(arr1(&[0.0, 0.0]), arr1(&[1.0, 1.0])).unwrap(),
        ];
        let path = temp_path("partitions.json");
        save_partitions(&path, &partitions).unwrap();
        let back = load_partitions(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(back.len(), 2);
        assert_relative_eq!(back[0].low()[0], -1.0);
        assert_relative_eq!(back[1].high()[1], 1.0);
    }

    #[test]
    fn test_partitions_reject_inverted() {
        let json = r#"{ "partitions": [ { "low": [1.0], "high": [0.0] } ] }"#;
        let file: PartitionsFile = serde_json::from_str(json).unwrap();
        assert!(partitions_from_records(&file.partitions).is_err());
    }

    #[test]
    fn test_linear_system_from_json() {
        let json = r#"{
            "kind": "linear",
            "a": [[0.95]],
            "b": [0.0],
            "sigma": [0.01],
            "safe_low": [-1.0],
            "safe_high": [1.0]
        }"#;
        let file: SystemFile = serde_json::from_str(json).unwrap();
        let system = system_from_record(&file).unwrap();
        assert_eq!(system.dimensionality(), 1);
        assert_relative_eq!(system.noise_sigma()[0], 0.01);
    }

    #[test]
    fn test_pwa_system_from_json() {
        let json = r#"{
            "kind": "pwa",
            "sigma": [0.1],
            "safe_low": [-1.0],
            "safe_high": [1.0],
            "pieces": [
                {
                    "low": [-1.0], "high": [0.0],
                    "maps": [ { "a": [[0.5]], "b": [0.0] } ]
                },
                {
                    "low": [0.0], "high": [1.0],
                    "maps": [
                        { "a": [[0.8]], "b": [-0.05] },
                        { "a": [[0.8]], "b": [0.05] }
                    ]
                }
            ]
        }"#;
        let file: SystemFile = serde_json::from_str(json).unwrap();
        let system = system_from_record(&file).unwrap();
        assert_eq!(system.expected_region_count(), Some(2));
    }

    #[test]
    fn test_system_rejects_nonpositive_sigma() {
        let json = r#"{
            "kind": "linear",
            "a": [[1.0]],
            "b": [0.0],
            "sigma": [0.0],
            "safe_low": [-1.0],
            "safe_high": [1.0]
        }"#;
        let file: SystemFile = serde_json::from_str(json).unwrap();
        assert!(system_from_record(&file).is_err());
    }

    #[test]
    fn test_dense_probability_file() {
        let file = DenseProbabilityFile {
            matrix_prob_lower: vec![vec![0.6, 0.1], vec![0.1, 0.6]],
            matrix_prob_upper: vec![vec![0.8, 0.3], vec![0.3, 0.8]],
            matrix_prob_unsafe_lower: vec![0.0, 0.0],
            matrix_prob_unsafe_upper: vec![0.1, 0.1],
        };
        let matrices = matrices_from_dense(&file).unwrap();
        assert_eq!(matrices.num_regions(), 2);
        // [to, from] orientation.
        assert_relative_eq!(matrices.bound(0, 1).upper, 0.3);
        assert_relative_eq!(matrices.bound(2, 0).upper, 0.1);
    }

    #[test]
    fn test_dense_rejects_shape_mismatch() {
        let file = DenseProbabilityFile {
            matrix_prob_lower: vec![vec![0.6, 0.1]],
            matrix_prob_upper: vec![vec![0.8, 0.3], vec![0.3, 0.8]],
            matrix_prob_unsafe_lower: vec![0.0, 0.0],
            matrix_prob_unsafe_upper: vec![0.1, 0.1],
        };
        assert!(matrices_from_dense(&file).is_err());
    }

    #[test]
    fn test_sparse_probability_round_trip() {
        let file = SparseProbabilityFile {
            num_regions: 2,
            columns: vec![
                SparseColumnRecord {
                    indices: vec![0, 1, 2],
                    lower: vec![0.6, 0.1, 0.0],
                    upper: vec![0.8, 0.3, 0.1],
                },
                SparseColumnRecord {
                    indices: vec![1, 2],
                    lower: vec![0.8, 0.0],
                    upper: vec![1.0, 0.2],
                },
            ],
        };
        let matrices = matrices_from_sparse(&file).unwrap();

        let path = temp_path("probabilities.json");
        save_probabilities(&path, &matrices).unwrap();
        let back = load_probabilities(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(back, matrices);
    }

    #[test]
    fn test_certificate_round_trip_and_txt() {
        let cert = BarrierCertificate {
            values: arr1(&[0.1, 0.5, 1.0]),
            eta: 0.1,
            beta: 0.02,
            beta_per_region: arr1(&[0.02, 0.01, 0.001]),
        };
        let path = temp_path("certificate.json");
        save_certificate(&path, &cert).unwrap();
        let back = load_certificate(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_relative_eq!(back.eta, 0.1);
        assert_relative_eq!(back.values[2], 1.0);

        let txt_path = temp_path("barrier.txt");
        save_barrier_txt(&txt_path, &cert).unwrap();
        let text = std::fs::read_to_string(&txt_path).unwrap();
        std::fs::remove_file(&txt_path).ok();
        assert_eq!(text.lines().count(), 3);
        let first: f64 = text.lines().next().unwrap().parse().unwrap();
        assert_relative_eq!(first, 0.1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_partitions(Path::new("/nonexistent/mart.json")).unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }
}
