//! Config validation CLI tool
//!
//! Validates a mylove configuration file and reports any errors.

use mylove_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a mylove configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match mylove_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", mylove_config::CURRENT_CONFIG_VERSION);
            println!("  Database: {} (schema v{})", settings.name, settings.version);
            println!("  File: {}", settings.database_path().display());
            match settings.quota_bytes {
                Some(quota) => println!("  Quota: {} bytes", quota),
                None => println!("  Quota: unlimited"),
            }

            println!();
            println!("Stores:");
            for store in &settings.stores {
                let key = if store.auto_increment {
                    format!("{} (auto)", store.key_path)
                } else {
                    store.key_path.clone()
                };
                println!("  - {} [key: {}]", store.name, key);
                for index in &store.indexes {
                    let unique = if index.unique { ", unique" } else { "" };
                    println!("      index {} on {}{}", index.name, index.key_path, unique);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                mylove_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                mylove_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                mylove_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                mylove_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        mylove_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
