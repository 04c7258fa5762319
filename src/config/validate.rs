//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use std::collections::HashSet;

use crate::common::error::ConfigError;
use crate::config::types::Config;

const TOKEN_PLACEHOLDERS: [&str; 2] = ["YOUR_TELEGRAM_TOKEN_HERE", "YOUR_DISCORD_TOKEN_HERE"];

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    check_token("telegram.token", &config.telegram.token, &mut errors);
    check_token("discord.token", &config.discord.token, &mut errors);

    if config.bridges.is_empty() {
        errors.push("bridges is empty - no message routing configured".to_string());
    }

    let mut names = HashSet::new();
    for (i, bridge) in config.bridges.iter().enumerate() {
        if bridge.name.is_empty() {
            errors.push(format!("bridges[{}].name is required", i));
        } else if !names.insert(bridge.name.as_str()) {
            errors.push(format!("bridges[{}].name '{}' is used more than once", i, bridge.name));
        }

        let valid_directions = [
            "both",
            "telegram_to_discord",
            "discord_to_telegram",
            "t2d",
            "d2t",
        ];
        if !valid_directions.contains(&bridge.direction.to_lowercase().as_str()) {
            errors.push(format!(
                "bridges[{}].direction '{}' is invalid (use: both, telegram_to_discord, discord_to_telegram)",
                i, bridge.direction
            ));
        }

        if bridge.telegram.chat_id == 0 {
            errors.push(format!("bridges[{}].telegram.chat_id must be non-zero", i));
        }
        if matches!(bridge.telegram.thread_id, Some(t) if t <= 0) {
            errors.push(format!("bridges[{}].telegram.thread_id must be positive", i));
        }
        if bridge.discord.channel_id == 0 {
            errors.push(format!("bridges[{}].discord.channel_id must be non-zero", i));
        }
        if let Some(ref format) = bridge.discord.format {
            if !format.contains("%message") {
                errors.push(format!(
                    "bridges[{}].discord.format must contain %message",
                    i
                ));
            }
        }
    }

    if config.relay.anti_spam_window_secs == 0 {
        errors.push("relay.anti_spam_window_secs must be non-zero".to_string());
    }
    if config.relay.identity_capacity == 0 {
        errors.push("relay.identity_capacity must be non-zero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

fn check_token(field: &str, token: &str, errors: &mut Vec<String>) {
    if token.is_empty() {
        errors.push(format!("{} is required", field));
    } else if TOKEN_PLACEHOLDERS.contains(&token) {
        errors.push(format!("{} has not been configured (still using placeholder)", field));
    }
}
