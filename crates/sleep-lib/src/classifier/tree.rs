//! Decision trees used by the forest and boosting ensembles
//!
//! Two growers share one node type:
//! - `ClassificationTree`: CART with Gini impurity, leaves hold class
//!   frequencies (random forest members)
//! - `RegressionTree`: second-order gradient tree, leaves hold Newton steps
//!   `-G / (H + lambda)` (gradient boosting members)

use ndarray::{Array2, ArrayView1};
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tree node with a leaf payload of type `V`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode<V> {
    Leaf {
        value: V,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode<V>>,
        right: Box<TreeNode<V>>,
    },
}

impl<V> TreeNode<V> {
    /// Route a row to its leaf
    pub fn leaf(&self, row: ArrayView1<f64>) -> &V {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Growth limits for a classification tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn (without replacement) at every node
    pub max_features: usize,
}

/// Gini CART tree over dense class indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationTree {
    root: TreeNode<Vec<f64>>,
}

impl ClassificationTree {
    /// Grow a tree on the rows listed in `indices` (repeats allowed, as in a
    /// bootstrap sample).
    pub fn fit<R: Rng>(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        indices: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut grower = ClassificationGrower {
            x,
            y,
            n_classes,
            params,
            rng,
        };
        let root = grower.grow(indices.to_vec(), 0);
        Self { root }
    }

    /// Class frequencies of the leaf the row falls into
    pub fn predict_row(&self, row: ArrayView1<f64>) -> &[f64] {
        self.root.leaf(row)
    }

    pub fn root(&self) -> &TreeNode<Vec<f64>> {
        &self.root
    }
}

struct ClassificationGrower<'a, R> {
    x: &'a Array2<f64>,
    y: &'a [usize],
    n_classes: usize,
    params: &'a TreeParams,
    rng: &'a mut R,
}

impl<R: Rng> ClassificationGrower<'_, R> {
    fn counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += 1;
        }
        counts
    }

    fn leaf(&self, counts: &[usize]) -> TreeNode<Vec<f64>> {
        let total: usize = counts.iter().sum();
        let value = counts
            .iter()
            .map(|&c| if total > 0 { c as f64 / total as f64 } else { 0.0 })
            .collect();
        TreeNode::Leaf { value }
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode<Vec<f64>> {
        let counts = self.counts(&indices);
        let n = indices.len();
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        if pure
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf
            || self.params.max_depth.is_some_and(|d| depth >= d)
        {
            return self.leaf(&counts);
        }

        let Some((feature, threshold)) = self.best_split(&indices, &counts) else {
            return self.leaf(&counts);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[[i, feature]] <= threshold);

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    /// Lowest weighted Gini split across a random subset of features
    fn best_split(&mut self, indices: &[usize], counts: &[usize]) -> Option<(usize, f64)> {
        let n_features = self.x.ncols();
        let k = self.params.max_features.clamp(1, n_features);
        let features = sample(&mut *self.rng, n_features, k);

        let n = indices.len();
        let parent = gini(counts, n);
        let mut best: Option<(usize, f64, f64)> = None;

        let mut order: Vec<usize> = indices.to_vec();
        for feature in features.iter() {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left = vec![0usize; self.n_classes];
            let mut right = counts.to_vec();

            for pos in 0..n - 1 {
                let class = self.y[order[pos]];
                left[class] += 1;
                right[class] -= 1;

                let here = self.x[[order[pos], feature]];
                let next = self.x[[order[pos + 1], feature]];
                if here == next {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < self.params.min_samples_leaf || n_right < self.params.min_samples_leaf {
                    continue;
                }

                let impurity = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / n as f64;
                if parent - impurity > 1e-12 && best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, (here + next) / 2.0, impurity));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Growth limits for a boosting tree
#[derive(Debug, Clone, Copy)]
pub struct RegressionTreeParams {
    pub max_depth: usize,
    pub reg_lambda: f64,
    pub min_child_weight: f64,
}

/// Second-order regression tree over gradient/hessian pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: TreeNode<f64>,
}

impl RegressionTree {
    /// Grow a tree on `rows`, splitting only on `features`
    pub fn fit(
        x: &Array2<f64>,
        grad: &[f64],
        hess: &[f64],
        rows: &[usize],
        features: &[usize],
        params: &RegressionTreeParams,
    ) -> Self {
        let grower = RegressionGrower {
            x,
            grad,
            hess,
            features,
            params,
        };
        Self {
            root: grower.grow(rows.to_vec(), 0),
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        *self.root.leaf(row)
    }

    pub fn root(&self) -> &TreeNode<f64> {
        &self.root
    }
}

struct RegressionGrower<'a> {
    x: &'a Array2<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: &'a RegressionTreeParams,
}

impl RegressionGrower<'_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.reg_lambda)
    }

    fn grow(&self, rows: Vec<usize>, depth: usize) -> TreeNode<f64> {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();
        let leaf = TreeNode::Leaf {
            value: -g / (h + self.params.reg_lambda),
        };

        if depth >= self.params.max_depth || rows.len() < 2 {
            return leaf;
        }

        let Some((feature, threshold)) = self.best_split(&rows, g, h) else {
            return leaf;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.x[[i, feature]] <= threshold);

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<(usize, f64)> {
        let parent = self.score(g, h);
        let mut best: Option<(usize, f64, f64)> = None;
        let mut order = rows.to_vec();

        for &feature in self.features {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let (mut gl, mut hl) = (0.0, 0.0);
            for pos in 0..order.len() - 1 {
                gl += self.grad[order[pos]];
                hl += self.hess[order[pos]];

                let here = self.x[[order[pos], feature]];
                let next = self.x[[order[pos + 1], feature]];
                if here == next {
                    continue;
                }

                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent);
                if gain > 1e-12 && best.map_or(true, |(_, _, b)| gain > b) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn params(max_features: usize) -> TreeParams {
        TreeParams {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features,
        }
    }

    #[test]
    fn test_classification_tree_separates_classes() {
        let x = array![[0.0, 5.0], [1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [4.0, 5.0], [5.0, 5.0]];
        let y = vec![0, 0, 1, 1, 2, 2];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let tree = ClassificationTree::fit(&x, &y, 3, &[0, 1, 2, 3, 4, 5], &params(2), &mut rng);

        for (i, &class) in y.iter().enumerate() {
            let dist = tree.predict_row(x.row(i));
            assert_eq!(dist.len(), 3);
            assert_eq!(dist[class], 1.0);
        }
        // constant second feature is never used
        assert_eq!(tree.root().n_leaves(), 3);
    }

    #[test]
    fn test_classification_tree_max_depth() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = vec![0, 1, 0, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let p = TreeParams {
            max_depth: Some(1),
            ..params(1)
        };

        let tree = ClassificationTree::fit(&x, &y, 2, &[0, 1, 2, 3], &p, &mut rng);
        assert!(tree.root().depth() <= 1);

        let dist = tree.predict_row(x.row(0));
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pure_node_is_leaf() {
        let x = array![[0.0], [1.0]];
        let y = vec![1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = ClassificationTree::fit(&x, &y, 2, &[0, 1], &params(1), &mut rng);
        assert_eq!(tree.root().depth(), 0);
        assert_eq!(tree.predict_row(x.row(0)), &[0.0, 1.0]);
    }

    #[test]
    fn test_regression_tree_newton_leaves() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        // gradients pull left rows up and right rows down
        let grad = vec![-1.0, -1.0, 1.0, 1.0];
        let hess = vec![1.0, 1.0, 1.0, 1.0];
        let p = RegressionTreeParams {
            max_depth: 2,
            reg_lambda: 0.0,
            min_child_weight: 0.0,
        };

        let tree = RegressionTree::fit(&x, &grad, &hess, &[0, 1, 2, 3], &[0], &p);
        assert!((tree.predict_row(x.row(0)) - 1.0).abs() < 1e-12);
        assert!((tree.predict_row(x.row(3)) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_regression_tree_lambda_shrinks_leaves() {
        let x = array![[0.0], [1.0]];
        let grad = vec![-1.0, -1.0];
        let hess = vec![1.0, 1.0];
        let p = RegressionTreeParams {
            max_depth: 0,
            reg_lambda: 2.0,
            min_child_weight: 0.0,
        };
        let tree = RegressionTree::fit(&x, &grad, &hess, &[0, 1], &[0], &p);
        // -G / (H + lambda) = 2 / 4
        assert!((tree.predict_row(x.row(0)) - 0.5).abs() < 1e-12);
    }
}
