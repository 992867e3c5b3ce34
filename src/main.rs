use clap::{Arg, Command};
use log::LevelFilter;
use phish_detect::config::Config;
use phish_detect::{api, Classifier, PredictionService, RandomForest};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("phish-detect")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing URL classification service")
        .long_about(
            "phish-detect - Classifies URLs as safe or phishing:\n\
             • 30 lexical, page, WHOIS, DNS and reputation indicators\n\
             • Pre-trained random forest loaded once at startup\n\
             • JSON API for single URLs and ordered batches",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/phish-detect.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and the model artifact")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging with per-feature details")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-url")
                .long("check-url")
                .value_name("URL")
                .help("Classify one URL, print its features and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .value_name("ADDR")
                .help("Address to serve the API on (overrides server.listen)")
                .action(clap::ArgAction::Set),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/phish-detect.yaml");

    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if let Some(listen) = matches.get_one::<String>("listen") {
        config.server.listen = listen.clone();
    }

    let forest = match RandomForest::from_file(&config.server.model_path) {
        Ok(forest) => forest,
        Err(e) => {
            log::error!("Failed to load model: {e}");
            eprintln!("Error loading model '{}': {e}", config.server.model_path);
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        println!("🔍 Testing configuration...");
        println!();
        println!("Listen address: {}", config.server.listen);
        println!("Model: {} ({} trees)", config.server.model_path, forest.tree_count());
        println!("Batch concurrency: {}", config.service.batch_concurrency);
        println!(
            "Network lookups: {}",
            if config.lookups.offline { "disabled" } else { "enabled" }
        );
        println!(
            "Reputation lookups: {}",
            if config.reputation.enabled { "enabled" } else { "disabled" }
        );
        println!("Suspicious hosts: {}", config.suspicious_hosts.len());
        println!("✅ Configuration is valid");
        return;
    }

    let tree_count = forest.tree_count();
    let classifier: Arc<dyn Classifier> = Arc::new(forest);
    let service = match PredictionService::from_config(&config, classifier) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error initializing prediction service: {e}");
            process::exit(1);
        }
    };

    if let Some(url) = matches.get_one::<String>("check-url") {
        check_url(&service, url).await;
        return;
    }

    if let Err(e) = serve(&config, service, tree_count).await {
        log::error!("Server error: {e}");
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

async fn serve(
    config: &Config,
    service: PredictionService,
    tree_count: usize,
) -> anyhow::Result<()> {
    let app = api::app(service, tree_count);
    let listener = tokio::net::TcpListener::bind(config.server.listen.as_str()).await?;
    log::info!("phish-detect listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {e}");
            }
            log::info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn check_url(service: &PredictionService, url: &str) {
    println!("🧪 Checking URL: {url}");
    println!();

    let explanation = match service.explain(url).await {
        Ok(explanation) => explanation,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    println!("Features:");
    for (name, value) in explanation.features.named() {
        let marker = if explanation.features.is_available(name) {
            ""
        } else {
            "  (unavailable)"
        };
        println!("  {name:<24} {value:>4}{marker}");
    }
    println!();

    let probabilities = &explanation.prediction.probabilities;
    for (class, probability) in explanation.classes.iter().zip(probabilities) {
        println!("P(class {class}) = {probability:.4}");
    }
    println!();

    let response = &explanation.response;
    println!("Raw prediction: {}", response.raw_prediction);
    println!(
        "Result: [{}, {}, {}]",
        response.result.display_url, response.result.label, response.result.message
    );
}
