#![allow(clippy::uninlined_format_args)]

use phish_detect::{Classifier, Config, PredictionService, RandomForest};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let model_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Config::default().server.model_path);

    println!("Testing the full pipeline with model {}...", model_path);

    let forest = RandomForest::from_file(&model_path)?;
    let classifier: Arc<dyn Classifier> = Arc::new(forest);

    let mut config = Config::default();
    config.shortener.enabled = false;
    let service = PredictionService::from_config(&config, classifier)?;

    let test_urls = vec![
        ("http://8csdg3iejj.lilagoraj.pl/", false),
        ("https://www.google.com", true),
    ];

    for (url, expect_safe) in test_urls {
        println!("\n=== Testing URL: {} ===", url);

        let explanation = match service.explain(url).await {
            Ok(explanation) => explanation,
            Err(e) => {
                println!("❌ Prediction failed: {}", e);
                continue;
            }
        };

        for (name, value) in explanation.features.named() {
            println!("  {:<24} {:>4}", name, value);
        }
        println!("  Probabilities: {:?}", explanation.prediction.probabilities);

        let result = &explanation.response.result;
        println!("  Result: [{}, {}, {}]", result.display_url, result.label, result.message);

        if result.is_safe() == expect_safe {
            println!("✅ As expected");
        } else {
            println!("🚨 Unexpected verdict");
        }
    }

    println!("\n=== Testing batch ordering ===");
    let batch = vec!["good.example.com".to_string(), "bad-malformed-???".to_string()];
    for response in service.predict_batch(&batch).await {
        println!("  {} → {:?}", response.url, response.result);
    }

    Ok(())
}
