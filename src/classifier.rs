//! Pre-trained random forest classifier.
//!
//! The model is trained offline (scikit-learn `RandomForestClassifier`) and
//! its trees are dumped to JSON once. The process loads that artifact at
//! startup and only ever reads it afterwards.
//!
//! ```json
//! {
//!   "n_features": 30,
//!   "classes": [0, 1],
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 5, "threshold": 0.0, "left": 1, "right": 2 },
//!         { "value": [12.0, 3.0] },
//!         { "value": [1.0, 40.0] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Split nodes send `x[feature] <= threshold` left. Leaves hold per-class
//! weights; the forest averages the normalized leaf distributions and
//! predicts the most probable class, as scikit-learn does.
//!
//! # Exporting a trained model
//!
//! Each entry of the fitted model's `estimators_` becomes one tree. Walk
//! `tree_` node by node in index order:
//!
//! ```text
//! t = estimator.tree_
//! for i in range(t.node_count):
//!     if t.children_left[i] == -1:
//!         node = {"value": list(t.value[i][0])}
//!     else:
//!         node = {"feature": int(t.feature[i]), "threshold": float(t.threshold[i]),
//!                 "left": int(t.children_left[i]), "right": int(t.children_right[i])}
//! ```
//!
//! scikit-learn numbers nodes depth first, so children always follow their
//! parent and the indices carry over unchanged. `classes` is the model's
//! `classes_` and `n_features` its `n_features_in_`. The bundled
//! `model/forest.json` is a small hand-built forest marked `"demo": true`;
//! loading it logs a warning.

use crate::features::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Class the training data uses for legitimate sites
pub const LEGITIMATE_CLASS: i64 = 1;
/// Class the training data uses for phishing sites
pub const PHISHING_CLASS: i64 = 0;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model expects {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },
    #[error("invalid model: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class: i64,
    /// Probability per entry of `Classifier::classes`
    pub probabilities: Vec<f64>,
}

/// Binary URL classifier. Implementations are immutable after construction
/// and safe to share between request handlers.
pub trait Classifier: Send + Sync {
    fn n_features(&self) -> usize;

    fn classes(&self) -> &[i64];

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError>;

    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ModelError> {
        let probabilities = self.predict_proba(features)?;
        if probabilities.len() != self.classes().len() {
            return Err(ModelError::Invalid(format!(
                "{} probabilities for {} classes",
                probabilities.len(),
                self.classes().len()
            )));
        }
        // first maximum wins, like numpy's argmax
        let mut best = 0;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = i;
            }
        }
        let class = *self
            .classes()
            .get(best)
            .ok_or_else(|| ModelError::Invalid("no classes".to_string()))?;
        Ok(Prediction {
            class,
            probabilities,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Normalized class distribution of the leaf `features` falls into
    fn leaf_distribution(&self, features: &[f64]) -> Vec<f64> {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Node::Leaf { value } => {
                    let total: f64 = value.iter().sum();
                    return value.iter().map(|v| v / total).collect();
                }
            }
        }
    }

    fn validate(
        &self,
        tree_index: usize,
        n_features: usize,
        n_classes: usize,
    ) -> Result<(), ModelError> {
        let invalid = |msg: String| ModelError::Invalid(format!("tree {tree_index}: {msg}"));

        if self.nodes.is_empty() {
            return Err(invalid("no nodes".to_string()));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(invalid(format!("node {i} splits on feature {feature}")));
                    }
                    if !threshold.is_finite() {
                        return Err(invalid(format!("node {i} has a non-finite threshold")));
                    }
                    // children always come later, so traversal terminates
                    for child in [*left, *right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(invalid(format!("node {i} has bad child {child}")));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(invalid(format!(
                            "leaf {i} has {} weights for {n_classes} classes",
                            value.len()
                        )));
                    }
                    if value.iter().any(|v| !v.is_finite() || *v < 0.0)
                        || value.iter().sum::<f64>() <= 0.0
                    {
                        return Err(invalid(format!("leaf {i} has unusable weights")));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub classes: Vec<i64>,
    pub trees: Vec<Tree>,
    /// Set on the placeholder artifact shipped with the crate
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub demo: bool,
}

impl RandomForest {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read model {path}: {e}"))?;
        let forest = Self::from_json(&content)?;
        log::info!(
            "Loaded model {} ({} trees, {} features)",
            path,
            forest.trees.len(),
            forest.n_features
        );
        if forest.demo {
            log::warn!(
                "Model {path} is the demo artifact; export a trained forest for real predictions"
            );
        }
        Ok(forest)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let forest: RandomForest = serde_json::from_str(json)?;
        forest.validate()?;
        Ok(forest)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Reject artifacts that do not match the feature layout or the class
    /// polarity this service reports
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_features != FEATURE_COUNT {
            return Err(ModelError::FeatureCount {
                expected: FEATURE_COUNT,
                actual: self.n_features,
            });
        }
        if self.classes != [PHISHING_CLASS, LEGITIMATE_CLASS] {
            return Err(ModelError::Invalid(format!(
                "classes must be [{PHISHING_CLASS}, {LEGITIMATE_CLASS}], found {:?}",
                self.classes
            )));
        }
        if self.trees.is_empty() {
            return Err(ModelError::Invalid("forest has no trees".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i, self.n_features, self.classes.len())?;
        }
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        if features.len() != self.n_features {
            return Err(ModelError::FeatureCount {
                expected: self.n_features,
                actual: features.len(),
            });
        }

        let x = features.as_slice();
        let mut sums = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (sum, p) in sums.iter_mut().zip(tree.leaf_distribution(x)) {
                *sum += p;
            }
        }

        let n = self.trees.len() as f64;
        Ok(sums.into_iter().map(|s| s / n).collect())
    }
}
