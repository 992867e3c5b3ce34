use crate::classifier::{Classifier, ModelError, Prediction};
use crate::config::Config;
use crate::convert::{ConversionResult, ConvertError, LabelConverter};
use crate::features::{FeatureExtraction, FeatureVector};
use crate::shortener::{LinkShortener, TinyUrlShortener};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("URL is empty")]
    EmptyUrl,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub url: String,
    pub raw_prediction: i64,
    pub result: ConversionResult,
}

impl PredictionResponse {
    /// Entry reported for a batch item that could not be processed
    pub fn failed(url: &str) -> Self {
        Self {
            url: url.to_string(),
            raw_prediction: 0,
            result: ConversionResult::processing_error(url),
        }
    }
}

/// A prediction together with the feature vector and class probabilities
/// behind it
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub features: FeatureVector,
    pub prediction: Prediction,
    pub classes: Vec<i64>,
    pub response: PredictionResponse,
}

/// Runs URLs through extraction, classification and conversion.
///
/// Holds only read-only shared state, so clones are cheap and every request
/// is independent of the others.
#[derive(Clone)]
pub struct PredictionService {
    extractor: Arc<FeatureExtraction>,
    classifier: Arc<dyn Classifier>,
    converter: Arc<LabelConverter>,
    batch_concurrency: usize,
}

impl PredictionService {
    pub fn new(
        extractor: FeatureExtraction,
        classifier: Arc<dyn Classifier>,
        converter: LabelConverter,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            extractor: Arc::new(extractor),
            classifier,
            converter: Arc::new(converter),
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Wires extraction, shortening and batching from the configuration
    pub fn from_config(config: &Config, classifier: Arc<dyn Classifier>) -> anyhow::Result<Self> {
        let extractor = FeatureExtraction::new(
            &config.lookups,
            &config.reputation,
            config.suspicious_hosts.clone(),
        )?;

        let converter = if config.shortener.enabled {
            let shortener: Arc<dyn LinkShortener> =
                Arc::new(TinyUrlShortener::new(&config.shortener)?);
            let timeout = Duration::from_secs(config.shortener.timeout_seconds);
            LabelConverter::new(Some(shortener), timeout)
        } else {
            LabelConverter::plain()
        };

        Ok(Self::new(
            extractor,
            classifier,
            converter,
            config.service.batch_concurrency,
        ))
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub async fn predict_one(&self, url: &str) -> Result<PredictionResponse, PredictError> {
        if url.trim().is_empty() {
            return Err(PredictError::EmptyUrl);
        }
        log::debug!("{url}: extracting features");
        let features = self.extractor.extract(url).await;

        log::debug!("{url}: predicting");
        let prediction = self.classifier.predict(&features)?;

        log::debug!("{url}: converting class {}", prediction.class);
        let result = self.converter.convert(url, prediction.class).await?;

        log::debug!("{url}: responded {}", result.label);
        Ok(PredictionResponse {
            url: url.to_string(),
            raw_prediction: prediction.class,
            result,
        })
    }

    /// Classifies every URL; the output has one entry per input, in input order.
    pub async fn predict_batch(&self, urls: &[String]) -> Vec<PredictionResponse> {
        let permits = Arc::new(Semaphore::new(self.batch_concurrency));
        let mut tasks = JoinSet::new();

        for (index, url) in urls.iter().enumerate() {
            let service = self.clone();
            let permits = Arc::clone(&permits);
            let url = url.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let outcome = service.predict_one(&url).await;
                (index, outcome)
            });
        }

        let mut results: Vec<Option<PredictionResponse>> = vec![None; urls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(response))) => results[index] = Some(response),
                Ok((index, Err(e))) => {
                    log::warn!("Batch item {} ({}) failed: {}", index, urls[index], e);
                }
                Err(e) => log::error!("Batch task aborted: {e}"),
            }
        }

        results
            .into_iter()
            .zip(urls)
            .map(|(result, url)| result.unwrap_or_else(|| PredictionResponse::failed(url)))
            .collect()
    }

    pub async fn explain(&self, url: &str) -> Result<Explanation, PredictError> {
        if url.trim().is_empty() {
            return Err(PredictError::EmptyUrl);
        }
        let features = self.extractor.extract(url).await;
        let prediction = self.classifier.predict(&features)?;
        let result = self.converter.convert(url, prediction.class).await?;
        Ok(Explanation {
            response: PredictionResponse {
                url: url.to_string(),
                raw_prediction: prediction.class,
                result,
            },
            features,
            prediction,
            classes: self.classifier.classes().to_vec(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classifier::tests::sample_forest_json;
    use crate::classifier::RandomForest;
    use crate::convert::tests::FixedShortener;
    use crate::features::FEATURE_COUNT;

    /// Calls everything phishing that is served over plain http
    struct HttpIsPhishing;

    impl Classifier for HttpIsPhishing {
        fn n_features(&self) -> usize {
            FEATURE_COUNT
        }

        fn classes(&self) -> &[i64] {
            &[0, 1]
        }

        fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            if features.get("https") == Some(1.0) {
                Ok(vec![0.1, 0.9])
            } else {
                Ok(vec![0.9, 0.1])
            }
        }
    }

    /// Model that panics on URLs containing an `@`
    struct PanicsOnAt;

    impl Classifier for PanicsOnAt {
        fn n_features(&self) -> usize {
            FEATURE_COUNT
        }

        fn classes(&self) -> &[i64] {
            &[0, 1]
        }

        fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            if features.get("symbol_at") == Some(-1.0) {
                panic!("model blew up");
            }
            Ok(vec![0.3, 0.7])
        }
    }

    struct WrongWidth;

    impl Classifier for WrongWidth {
        fn n_features(&self) -> usize {
            12
        }

        fn classes(&self) -> &[i64] {
            &[0, 1]
        }

        fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            Err(ModelError::FeatureCount {
                expected: 12,
                actual: features.len(),
            })
        }
    }

    /// Claims a class the converter does not know
    struct ThreeClasses;

    impl Classifier for ThreeClasses {
        fn n_features(&self) -> usize {
            FEATURE_COUNT
        }

        fn classes(&self) -> &[i64] {
            &[0, 1, 2]
        }

        fn predict_proba(&self, _features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            Ok(vec![0.1, 0.1, 0.8])
        }
    }

    fn service_with(classifier: Arc<dyn Classifier>) -> PredictionService {
        PredictionService::new(
            FeatureExtraction::offline(Vec::new()),
            classifier,
            LabelConverter::plain(),
            4,
        )
    }

    pub(crate) fn offline_service() -> PredictionService {
        service_with(Arc::new(HttpIsPhishing))
    }

    #[tokio::test]
    async fn test_predict_one() {
        let service = offline_service();

        let safe = service.predict_one("https://www.google.com").await.unwrap();
        assert_eq!(safe.raw_prediction, 1);
        assert_eq!(safe.url, "https://www.google.com");
        assert_eq!(safe.result.label, "Safe");

        let phishing = service.predict_one("http://8csdg3iejj.lilagoraj.pl/").await.unwrap();
        assert_eq!(phishing.raw_prediction, 0);
        assert_eq!(phishing.result.message, "Still want to Continue");
    }

    #[tokio::test]
    async fn test_predict_one_uses_shortened_link() {
        let service = PredictionService::new(
            FeatureExtraction::offline(Vec::new()),
            Arc::new(HttpIsPhishing),
            LabelConverter::new(
                Some(Arc::new(FixedShortener("https://tinyurl.com/xyz"))),
                Duration::from_secs(1),
            ),
            2,
        );
        let response = service.predict_one("https://www.example.com/").await.unwrap();
        assert_eq!(response.url, "https://www.example.com/");
        assert_eq!(response.result.display_url, "https://tinyurl.com/xyz");
    }

    #[tokio::test]
    async fn test_predict_one_errors() {
        assert!(matches!(
            offline_service().predict_one("").await,
            Err(PredictError::EmptyUrl)
        ));
        assert!(matches!(
            service_with(Arc::new(WrongWidth)).predict_one("https://example.com").await,
            Err(PredictError::Model(_))
        ));
        assert!(matches!(
            service_with(Arc::new(ThreeClasses)).predict_one("https://example.com").await,
            Err(PredictError::Convert(ConvertError::UnknownClass(2)))
        ));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let service = offline_service();
        let urls = vec!["good.example.com".to_string(), "bad-malformed-???".to_string()];

        let results = service.predict_batch(&urls).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "good.example.com");
        assert_eq!(results[1].url, "bad-malformed-???");

        let many: Vec<String> = (0..40)
            .map(|i| {
                if i % 2 == 0 {
                    format!("https://site{i}.example.com/")
                } else {
                    format!("http://site{i}.example.com/")
                }
            })
            .collect();
        let results = service.predict_batch(&many).await;
        assert_eq!(results.len(), many.len());
        for (i, (response, url)) in results.iter().zip(&many).enumerate() {
            assert_eq!(&response.url, url);
            assert_eq!(response.raw_prediction, if i % 2 == 0 { 1 } else { 0 });
        }
    }

    #[tokio::test]
    async fn test_batch_contains_failures() {
        let service = service_with(Arc::new(PanicsOnAt));
        let urls = vec![
            "https://www.example.com".to_string(),
            "http://user@evil.example/".to_string(),
            String::new(),
            "https://www.example.org".to_string(),
        ];

        let results = service.predict_batch(&urls).await;
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].result.label, "Safe");
        assert_eq!(results[1], PredictionResponse::failed("http://user@evil.example/"));
        assert_eq!(results[2], PredictionResponse::failed(""));
        assert_eq!(results[3].url, "https://www.example.org");
        assert_eq!(results[3].result.label, "Safe");

        let json = serde_json::to_value(&results[1]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "url": "http://user@evil.example/",
                "raw_prediction": 0,
                "result": ["http://user@evil.example/", "Not Safe", "Error in processing"]
            })
        );
    }

    #[tokio::test]
    async fn test_from_config_offline() {
        let mut config = Config::default();
        config.lookups.offline = true;
        config.shortener.enabled = false;
        config.service.batch_concurrency = 2;

        let service = PredictionService::from_config(&config, Arc::new(HttpIsPhishing)).unwrap();
        let response = service.predict_one("https://www.example.com/").await.unwrap();
        assert_eq!(response.result.display_url, "https://www.example.com/");
        assert_eq!(response.raw_prediction, 1);
    }

    #[tokio::test]
    async fn test_explain_with_forest() {
        let forest = RandomForest::from_json(&sample_forest_json()).unwrap();
        let service = service_with(Arc::new(forest));

        let explanation = service.explain("http://125.98.3.123/fake.html").await.unwrap();
        assert_eq!(explanation.features.len(), FEATURE_COUNT);
        assert_eq!(explanation.classes, vec![0, 1]);
        assert_eq!(explanation.prediction.class, 0);
        assert_eq!(explanation.response.result.label, "Not Safe");
        let total: f64 = explanation.prediction.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
