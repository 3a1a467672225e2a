// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use crate::classifier::Classifier;
use crate::config::ClassifierConfig;
use crate::inference::ClassificationResult;
use crate::models::{ConnectionKind, OrtRuntime};
use crate::vision::ImageRef;

/// Classify garment images by color and type
#[derive(Parser, Debug)]
#[command(name = "garment-vision")]
#[command(version)]
#[command(about = "Classify garment images by color and type", long_about = None)]
pub struct Cli {
    /// Images to classify
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "GARMENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding (or caching) the model files
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Download models from this base URL instead of reading them locally
    #[arg(long)]
    pub base_url: Option<String>,

    /// Intra-op threads per inference session
    #[arg(long)]
    pub threads: Option<usize>,

    /// Current network link: unmetered or metered
    #[arg(long)]
    pub connection: Option<ConnectionKind>,

    /// Print results as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Resolve configuration: file or environment, then command-line flags
    pub fn resolve_config(&self) -> Result<ClassifierConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = ClassifierConfig::from_file(path)?;
                config.apply_env(|key| std::env::var(key).ok())?;
                config
            }
            None => ClassifierConfig::from_env()?,
        };

        if let Some(dir) = &self.model_dir {
            config.models.dir = dir.clone();
        }
        if let Some(url) = &self.base_url {
            config.models.base_url = Some(url.clone());
        }
        if let Some(threads) = self.threads {
            config.runtime.num_threads = threads;
        }
        if let Some(connection) = self.connection {
            config.network.connection = connection;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Execute CLI command
///
/// Returns the number of images that failed to classify.
pub async fn execute(cli: Cli) -> Result<usize> {
    let config = cli.resolve_config()?;
    let distributor = config.distributor()?;

    // Results are read from `classify`; the event receiver is not needed
    let (classifier, _) =
        Classifier::start(config.vision_config(), distributor, Arc::new(OrtRuntime));
    classifier
        .wait_until_ready()
        .await
        .context("Models could not be provisioned")?;

    let mut failures = 0;
    for path in &cli.images {
        match classifier.classify(ImageRef::Path(path.clone())).await {
            Ok(results) => println!("{}", format_results(path, &results, cli.json)?),
            Err(e) => {
                failures += 1;
                eprintln!("❌ {}: {}", path.display(), e);
            }
        }
    }

    Ok(failures)
}

fn format_results(
    path: &std::path::Path,
    results: &[ClassificationResult],
    json: bool,
) -> Result<String> {
    if json {
        let line = serde_json::json!({
            "image": path.display().to_string(),
            "results": results,
        });
        return Ok(serde_json::to_string(&line)?);
    }

    let summary: Vec<String> = results
        .iter()
        .map(|r| format!("{} ({:.1}%)", r.label, r.score * 100.0))
        .collect();
    Ok(format!("{}: {}", path.display(), summary.join(", ")))
}
