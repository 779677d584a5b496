//! Occlusion attribution.
//!
//! The contribution of feature `i` is `logit(x) - logit(x')` where `x'` is
//! `x` with feature `i` replaced by the model's baseline value. Features that
//! already sit at their baseline contribute exactly zero and are skipped.

use super::Classifier;
use rayon::prelude::*;

/// Per-feature contributions in input order.
pub fn occlusion<M: Classifier + ?Sized>(model: &M, x: &[f32]) -> Vec<f32> {
    let reference = model.logit(x);
    let baseline = model.baseline();
    (0..x.len())
        .into_par_iter()
        .map_init(
            || x.to_vec(),
            |buf, i| {
                let b = baseline.map_or(0.0, |b| b[i]);
                let original = buf[i];
                if original == b {
                    return 0.0;
                }
                buf[i] = b;
                let occluded = model.logit(buf);
                buf[i] = original;
                reference - occluded
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// z = 2*x0 - 3*x2
    struct Linear;

    impl Classifier for Linear {
        fn input_size(&self) -> usize {
            4
        }

        fn logit(&self, x: &[f32]) -> f32 {
            2.0 * x[0] - 3.0 * x[2]
        }
    }

    #[test]
    fn linear_model_contributions() {
        let c = occlusion(&Linear, &[1.0, 5.0, 0.5, 0.0]);
        assert_eq!(c, vec![2.0, 0.0, -1.5, 0.0]);
    }

    #[test]
    fn deterministic_order() {
        let x: Vec<f32> = vec![0.25, 0.5, 0.75, 1.0];
        let a = occlusion(&Linear, &x);
        let b = occlusion(&Linear, &x);
        assert_eq!(a, b);
    }
}
