use clap::{Arg, Command};
use log::LevelFilter;
use phishsift::config::Config;
use phishsift::detectors::brand_visual::BrandVisualDetector;
use phishsift::detectors::knowledge::KnowledgeDetector;
use phishsift::detectors::llm::LlmDetector;
use phishsift::detectors::tactics::TacticsDetector;
use phishsift::detectors::urls::UrlDetector;
use phishsift::detectors::{Detector, DetectorId};
use phishsift::engine::FusionEngine;
use phishsift::knowledge_base::KnowledgeBase;
use phishsift::message::Message;
use phishsift::registry::ComponentRegistry;
use phishsift::statistics::{StatEvent, StatisticsCollector};
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let matches = Command::new("phishsift")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multi-signal phishing analysis engine")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/phishsift.yaml"),
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
                .help("Test configuration validity")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("analyze")
                .long("analyze")
                .value_name("FILE")
                .help("Analyze a message file (YAML or JSON) and print the result")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Print run statistics after analysis")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
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

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        println!("Configuration OK: {config_path}");
        println!("  threshold: {}", config.threshold);
        println!("  detector timeout: {}s", config.detector_timeout_seconds);
        for (id, detector) in &config.detectors {
            println!(
                "  {id}: weight {}, {}",
                detector.weight,
                if detector.enabled { "enabled" } else { "disabled" }
            );
        }
        return;
    }

    if let Some(message_file) = matches.get_one::<String>("analyze") {
        let show_stats = matches.get_flag("stats");
        if let Err(e) = analyze_file(&config, message_file, show_stats).await {
            eprintln!("Analysis failed: {e:#}");
            process::exit(1);
        }
        return;
    }

    eprintln!("No action requested; try --analyze FILE or --help");
    process::exit(1);
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::info!("Config file {path} not found, using defaults");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    match Config::default().to_file(path) {
        Ok(()) => println!("Default configuration written to {path}"),
        Err(e) => {
            eprintln!("Failed to write configuration: {e:#}");
            process::exit(1);
        }
    }
}

async fn analyze_file(config: &Config, message_file: &str, show_stats: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(message_file)?;
    let message: Message = serde_yaml::from_str(&content)?;

    let engine = build_engine(config)?;
    let stats = StatisticsCollector::new();

    let result = engine.analyze(&message).await;
    stats.record_event(StatEvent::MessageAnalyzed {
        suspicious: result.is_suspicious(),
        confidence: result.confidence,
        analysis_time_ms: result.analysis_time_ms,
    });
    for detector in result.technical_details.errors.keys() {
        stats.record_event(StatEvent::DetectorError {
            detector: *detector,
        });
    }

    println!("{}", serde_json::to_string_pretty(&result)?);

    if show_stats {
        if let Some(snapshot) = stats.snapshot().await {
            eprintln!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(())
}

fn build_engine(config: &Config) -> anyhow::Result<FusionEngine> {
    let registry = Arc::new(ComponentRegistry::new());
    let mut detectors: Vec<Arc<dyn Detector>> = Vec::new();

    let (enabled, weight) = config.detector(DetectorId::Tactics);
    registry.register(DetectorId::Tactics, weight, true, enabled);
    detectors.push(Arc::new(TacticsDetector::new()?));

    let (enabled, weight) = config.detector(DetectorId::Urls);
    registry.register(DetectorId::Urls, weight, true, enabled);
    detectors.push(Arc::new(UrlDetector::new()));

    let (enabled, weight) = config.detector(DetectorId::BrandVisual);
    registry.register(DetectorId::BrandVisual, weight, true, enabled);
    detectors.push(Arc::new(BrandVisualDetector::new()));

    let knowledge = Arc::new(KnowledgeBase::load(
        config.knowledge_base_path.as_deref().map(Path::new),
    )?);
    let (enabled, weight) = config.detector(DetectorId::Knowledge);
    registry.register(DetectorId::Knowledge, weight, true, enabled);
    detectors.push(Arc::new(KnowledgeDetector::new(knowledge)));

    let api_key = std::env::var(&config.llm.api_key_env).ok();
    let llm = LlmDetector::new(
        config.llm.endpoint.clone(),
        config.llm.model.clone(),
        api_key,
    );
    let (enabled, weight) = config.detector(DetectorId::Llm);
    registry.register(DetectorId::Llm, weight, llm.is_available(), enabled);
    detectors.push(Arc::new(llm));

    Ok(FusionEngine::new(registry, detectors)
        .with_threshold(config.threshold)
        .with_detector_timeout(Duration::from_secs(config.detector_timeout_seconds)))
}
