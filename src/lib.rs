pub mod api;
pub mod classifier;
pub mod config;
pub mod convert;
pub mod domain_age;
pub mod domain_utils;
pub mod features;
pub mod page_fetch;
pub mod reputation;
pub mod service;
pub mod shortener;

pub use classifier::{Classifier, RandomForest};
pub use config::Config;
pub use convert::{ConversionResult, LabelConverter, Verdict};
pub use features::{FeatureExtraction, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use service::{PredictionResponse, PredictionService};
