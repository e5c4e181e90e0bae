//! Random forest classifier evaluated from exported tree arrays

use super::{check_width, BinaryClassifier, NUM_CLASSES};
use crate::error::{ClassifierError, ModelContractViolation};
use crate::features::AlignedFeatureRow;
use serde::{Deserialize, Serialize};

/// One fitted tree in parallel-array form.
///
/// Node `i` is a leaf when `children_left[i] < 0`. Otherwise samples with
/// `x[feature[i]] <= threshold[i]` descend to `children_left[i]`, the rest to
/// `children_right[i]`. `value[i]` holds the class weights (counts or
/// fractions) for class 0 and class 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf([f64; NUM_CLASSES]),
}

#[derive(Debug, Clone)]
struct CompiledTree {
    nodes: Vec<Node>,
}

impl CompiledTree {
    fn compile(index: usize, tree: &DecisionTree) -> Result<(Self, usize), ModelContractViolation> {
        let n = tree.children_left.len();
        let violation = |msg: String| ModelContractViolation::new(format!("tree {}: {}", index, msg));

        if n == 0 {
            return Err(violation("tree has no nodes".to_string()));
        }
        if [
            tree.children_right.len(),
            tree.feature.len(),
            tree.threshold.len(),
            tree.value.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err(violation("node arrays have different lengths".to_string()));
        }

        let mut nodes = Vec::with_capacity(n);
        let mut width = 0;

        for i in 0..n {
            let left = tree.children_left[i];
            if left < 0 {
                nodes.push(Node::Leaf(normalize_leaf(&tree.value[i]).map_err(|m| violation(format!("node {}: {}", i, m)))?));
                continue;
            }

            let right = tree.children_right[i];
            // Children always follow their parent, which rules out cycles
            let in_range = |c: i64| c > i as i64 && (c as usize) < n;
            if !in_range(left) || !in_range(right) {
                return Err(violation(format!("node {} has invalid children", i)));
            }
            let feature = tree.feature[i];
            if feature < 0 {
                return Err(violation(format!("node {} splits on feature {}", i, feature)));
            }
            let threshold = tree.threshold[i];
            if threshold.is_nan() {
                return Err(violation(format!("node {} has a NaN threshold", i)));
            }

            width = width.max(feature as usize + 1);
            nodes.push(Node::Split {
                feature: feature as usize,
                threshold,
                left: left as usize,
                right: right as usize,
            });
        }

        Ok((Self { nodes }, width))
    }

    fn leaf_for(&self, x: &[f64]) -> &[f64; NUM_CLASSES] {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf(dist) => return dist,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

fn normalize_leaf(value: &[f64]) -> Result<[f64; NUM_CLASSES], String> {
    if value.len() != NUM_CLASSES {
        return Err(format!(
            "leaf has {} class weights, expected {}",
            value.len(),
            NUM_CLASSES
        ));
    }
    if value.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err("leaf weights must be finite and non-negative".to_string());
    }
    let total: f64 = value.iter().sum();
    if total <= 0.0 {
        return Err("leaf weights sum to zero".to_string());
    }
    Ok([value[0] / total, value[1] / total])
}

/// Averages the leaf class distributions of every tree
#[derive(Debug, Clone)]
pub struct RandomForestClassifier {
    trees: Vec<CompiledTree>,
    n_features: usize,
}

impl RandomForestClassifier {
    /// Validate and compile exported trees.
    ///
    /// `n_features` defaults to the highest feature index used by any split.
    pub fn new(
        trees: &[DecisionTree],
        n_features: Option<usize>,
    ) -> Result<Self, ModelContractViolation> {
        if trees.is_empty() {
            return Err(ModelContractViolation::new("random forest has no trees"));
        }

        let mut compiled = Vec::with_capacity(trees.len());
        let mut used_width = 0;
        for (i, tree) in trees.iter().enumerate() {
            let (tree, width) = CompiledTree::compile(i, tree)?;
            used_width = used_width.max(width);
            compiled.push(tree);
        }

        let n_features = match n_features {
            Some(n) if n < used_width => {
                return Err(ModelContractViolation::new(format!(
                    "trees split on feature index {} but the model declares {} features",
                    used_width - 1,
                    n
                )))
            }
            Some(n) => n,
            None => used_width,
        };

        Ok(Self {
            trees: compiled,
            n_features,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn proba_row(&self, x: &[f64]) -> [f64; NUM_CLASSES] {
        let mut sum = [0.0; NUM_CLASSES];
        for tree in &self.trees {
            let dist = tree.leaf_for(x);
            sum[0] += dist[0];
            sum[1] += dist[1];
        }
        let n = self.trees.len() as f64;
        [sum[0] / n, sum[1] / n]
    }
}

impl BinaryClassifier for RandomForestClassifier {
    fn predict(&self, rows: &[AlignedFeatureRow]) -> Result<Vec<i64>, ClassifierError> {
        check_width(rows, self.n_features)?;
        Ok(rows
            .iter()
            .map(|r| {
                let p = self.proba_row(r.as_slice());
                // Ties go to the first class
                if p[1] > p[0] {
                    1
                } else {
                    0
                }
            })
            .collect())
    }

    fn predict_proba(&self, rows: &[AlignedFeatureRow]) -> Result<Vec<Vec<f64>>, ClassifierError> {
        check_width(rows, self.n_features)?;
        Ok(rows
            .iter()
            .map(|r| self.proba_row(r.as_slice()).to_vec())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Splits on `feature <= threshold`; left leaf favours class 0
    fn stump(feature: i64, threshold: f64, left: [f64; 2], right: [f64; 2]) -> DecisionTree {
        DecisionTree {
            children_left: vec![1, -1, -1],
            children_right: vec![2, -1, -1],
            feature: vec![feature, -2, -2],
            threshold: vec![threshold, -2.0, -2.0],
            value: vec![vec![10.0, 10.0], left.to_vec(), right.to_vec()],
        }
    }

    fn row(values: &[f64]) -> AlignedFeatureRow {
        AlignedFeatureRow::new(values.to_vec())
    }

    #[test]
    fn test_single_stump() {
        let forest = RandomForestClassifier::new(&[stump(0, 650.0, [8.0, 2.0], [1.0, 9.0])], Some(1)).unwrap();

        let proba = forest.predict_proba(&[row(&[600.0]), row(&[700.0])]).unwrap();
        assert!((proba[0][0] - 0.8).abs() < 1e-12);
        assert!((proba[1][1] - 0.9).abs() < 1e-12);

        let labels = forest.predict(&[row(&[600.0]), row(&[700.0])]).unwrap();
        assert_eq!(labels, vec![0, 1]);
    }

    #[test]
    fn test_threshold_is_inclusive_left() {
        let forest = RandomForestClassifier::new(&[stump(0, 650.0, [1.0, 0.0], [0.0, 1.0])], None).unwrap();
        assert_eq!(forest.predict(&[row(&[650.0])]).unwrap(), vec![0]);
    }

    #[test]
    fn test_forest_averages_trees() {
        let trees = [
            stump(0, 0.5, [1.0, 0.0], [0.0, 1.0]),
            stump(1, 0.5, [1.0, 0.0], [0.0, 1.0]),
        ];
        let forest = RandomForestClassifier::new(&trees, None).unwrap();
        assert_eq!(forest.n_features(), 2);
        assert_eq!(forest.n_trees(), 2);

        let proba = forest.predict_proba(&[row(&[1.0, 0.0])]).unwrap();
        assert_eq!(proba[0], vec![0.5, 0.5]);
        // A tie resolves to class 0
        assert_eq!(forest.predict(&[row(&[1.0, 0.0])]).unwrap(), vec![0]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let forest = RandomForestClassifier::new(
            &[
                stump(0, 0.3, [3.0, 1.0], [2.0, 5.0]),
                stump(0, 0.7, [4.0, 4.0], [1.0, 6.0]),
            ],
            None,
        )
        .unwrap();
        for x in [0.0, 0.5, 1.0] {
            let p = &forest.predict_proba(&[row(&[x])]).unwrap()[0];
            assert!((p[0] + p[1] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_wrong_width_rejected() {
        let forest = RandomForestClassifier::new(&[stump(0, 0.5, [1.0, 0.0], [0.0, 1.0])], Some(3)).unwrap();
        assert!(matches!(
            forest.predict(&[row(&[1.0])]),
            Err(ClassifierError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_multiclass_leaf_rejected() {
        let mut tree = stump(0, 0.5, [1.0, 0.0], [0.0, 1.0]);
        tree.value[1] = vec![1.0, 2.0, 3.0];
        let err = RandomForestClassifier::new(&[tree], None).unwrap_err();
        assert!(err.reason.contains("class weights"));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut tree = stump(0, 0.5, [1.0, 0.0], [0.0, 1.0]);
        tree.children_left[0] = 0;
        assert!(RandomForestClassifier::new(&[tree], None).is_err());
    }

    #[test]
    fn test_mismatched_arrays_rejected() {
        let mut tree = stump(0, 0.5, [1.0, 0.0], [0.0, 1.0]);
        tree.threshold.pop();
        assert!(RandomForestClassifier::new(&[tree], None).is_err());
    }

    #[test]
    fn test_declared_width_too_small() {
        let err = RandomForestClassifier::new(&[stump(4, 0.5, [1.0, 0.0], [0.0, 1.0])], Some(2)).unwrap_err();
        assert!(err.reason.contains("feature index 4"));
    }

    #[test]
    fn test_empty_forest_rejected() {
        assert!(RandomForestClassifier::new(&[], None).is_err());
    }
}
