
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password};

use super::{Config, ConfigError, EmbeddingConfig, SearchConfig};
use crate::embeddings::EmbeddingClient;

#[inline]
pub async fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Table Memory Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Embedding API").bold().yellow());
    eprintln!("Configure the OpenAI-compatible endpoint used to embed table rows.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Search Defaults").bold().yellow());
    configure_search(&mut config.search)?;

    config.vectorization.auto_vectorize = Confirm::new()
        .with_prompt("Vectorize all tables when a new conversation is opened?")
        .default(config.vectorization.auto_vectorize)
        .interact()?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_embedding_connection(&config.embedding).await {
        eprintln!("{}", style("✓ Embedding API connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the embedding API").yellow()
        );
        eprintln!("You can continue, but vectorization will fail until the API is reachable.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  API URL: {}", style(&config.embedding.api_url).cyan());
    eprintln!("  API Key: {}", style(config.embedding.masked_api_key()).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!(
        "  Batch Size: {}",
        style(config.embedding.max_batch_size).cyan()
    );
    eprintln!(
        "  Retries: {} (delay {}ms)",
        style(config.embedding.retry_times).cyan(),
        style(config.embedding.retry_delay_ms).cyan()
    );
    match config.embedding.embeddings_url() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Search Settings:").bold().yellow());
    eprintln!("  Top K: {}", style(config.search.top_k).cyan());
    eprintln!("  Min Score: {}", style(config.search.min_score).cyan());
    eprintln!(
        "  Auto Vectorize: {}",
        style(config.vectorization.auto_vectorize).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    Config::load_default().or_else(|_| -> Result<Config> {
        eprintln!(
            "{}",
            style("No usable configuration found. Using defaults.").yellow()
        );
        let config_dir = Config::config_dir().context("Failed to locate config directory")?;
        Ok(Config {
            base_dir: config_dir,
            ..Config::default()
        })
    })
}

fn validate_api_url(input: &str) -> Result<(), ConfigError> {
    EmbeddingConfig {
        api_url: input.to_string(),
        ..EmbeddingConfig::default()
    }
    .base_url()
    .map(|_| ())
}

fn validate_batch_size(input: usize) -> Result<(), &'static str> {
    if input == 0 {
        Err("Batch size must be greater than 0")
    } else if input > 1000 {
        Err("Batch size must be 1000 or less")
    } else {
        Ok(())
    }
}

fn validate_min_score(input: f32) -> Result<(), &'static str> {
    if (0.0..=1.0).contains(&input) {
        Ok(())
    } else {
        Err("Minimum score must be between 0 and 1")
    }
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let api_url: String = Input::new()
        .with_prompt("API base URL")
        .default(embedding.api_url.clone())
        .validate_with(|input: &String| validate_api_url(input))
        .interact_text()?;

    let api_key = Password::new()
        .with_prompt(format!(
            "API key [{}] (leave empty to keep)",
            embedding.masked_api_key()
        ))
        .allow_empty_password(true)
        .interact()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let max_batch_size: usize = Input::new()
        .with_prompt("Texts per embedding request")
        .default(embedding.max_batch_size)
        .validate_with(|input: &usize| validate_batch_size(*input))
        .interact_text()?;

    let retry_times: u32 = Input::new()
        .with_prompt("Attempts per request")
        .default(embedding.retry_times)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=10).contains(input) {
                Ok(())
            } else {
                Err("Attempts must be between 1 and 10")
            }
        })
        .interact_text()?;

    embedding.set_api_url(api_url)?;
    if !api_key.trim().is_empty() {
        embedding.api_key = api_key.trim().to_string();
    }
    embedding.set_model(model)?;
    embedding.set_max_batch_size(max_batch_size)?;
    embedding.set_retry_times(retry_times)?;

    Ok(())
}

fn configure_search(search: &mut SearchConfig) -> Result<()> {
    let top_k: usize = Input::new()
        .with_prompt("Results per search")
        .default(search.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Top K must be between 1 and 100")
            }
        })
        .interact_text()?;

    let min_score: f32 = Input::new()
        .with_prompt("Minimum similarity score")
        .default(search.min_score)
        .validate_with(|input: &f32| validate_min_score(*input))
        .interact_text()?;

    search.set_top_k(top_k)?;
    search.set_min_score(min_score)?;

    Ok(())
}

async fn test_embedding_connection(embedding: &EmbeddingConfig) -> bool {
    if !embedding.has_api_key() {
        return false;
    }

    match EmbeddingClient::new(embedding.clone()) {
        Ok(client) => client.test_connection().await,
        Err(_) => false,
    }
}
