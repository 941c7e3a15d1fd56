use ndarray::{concatenate, Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use subspace_residual::{Partition, ReconstructionPipeline, ScorerConfig};

const CONFIG: &str = r#"
max_rank = 6
factorization = "auto"
preprocessing = "center"
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let n_features = 12;

    // Negatives live near a 3-dimensional subspace; positives leave it along the last feature.
    let loadings = Array2::from_shape_fn((3, n_features), |_| rng.gen_range(-1.0..1.0));
    let mut sample = |n_rows: usize, shift: f64| -> Array2<f64> {
        let factors = Array2::from_shape_fn((n_rows, 3), |_| rng.gen_range(-2.0..2.0));
        let mut rows = factors.dot(&loadings);
        rows.mapv_inplace(|v| v + rng.gen_range(-0.05..0.05));
        rows.column_mut(n_features - 1).mapv_inplace(|v| v + shift);
        rows
    };
    let design = concatenate(
        Axis(0),
        &[sample(300, 0.0).view(), sample(30, 1.5).view()],
    )?;
    let labels: Array1<bool> = (0..design.nrows()).map(|i| i >= 300).collect();

    // Every fifth row is held out.
    let (test, train): (Vec<usize>, Vec<usize>) = (0..design.nrows()).partition(|i| i % 5 == 0);
    let partition = Partition::new(train, test);

    let config = ScorerConfig::from_toml_str(CONFIG)?;
    let report = ReconstructionPipeline::new(config)?.run(design.view(), labels.view(), &partition)?;

    println!("Basis: {} directions over {} features", report.basis.n_directions(), report.basis.n_features());
    println!("Orthogonality error: {:e}", report.basis_diagnostics.orthogonality_error);
    for entry in &report.selection.sweep {
        println!(
            "  rank {:>2}: AUC {:.4}, mean residual {:.4}",
            entry.rank, entry.auc, entry.mean_residual
        );
    }
    println!("Selected rank {} (train AUC {:.4})", report.selection.rank, report.selection.auc);
    match report.test.auc {
        Some(auc) => println!("Held-out AUC at that rank: {:.4}", auc),
        None => println!("Held-out partition has a single class; no AUC."),
    }
    Ok(())
}
