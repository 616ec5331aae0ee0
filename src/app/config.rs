// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::domain::types::FeeMode;
use alloy::primitives::Address;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const GWEI: u128 = 1_000_000_000;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_debug")]
    pub debug: bool,
    pub database_url: Option<String>,

    // Network endpoints
    pub upstream_rpc_url: String,
    /// Raw transactions and bundle legs go here; everything else to upstream.
    pub sequencer_rpc_url: Option<String>,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    // Watched contracts
    pub router_address: Address,
    pub factory_address: Address,
    pub sniper_contract: Address,

    // Internal auth between proxy and bid API
    pub auth_token: String,

    // Listen ports
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// When set, detections are POSTed to this bid API instead of the
    /// in-process pipeline (split-process deployment).
    pub notify_url: Option<String>,

    // Fee ladder
    #[serde(default = "default_fee_mode")]
    pub fee_mode: FeeMode,
    #[serde(default = "default_priority_fee_gwei")]
    pub priority_fee_gwei: u64,
    #[serde(default = "default_fee_step_wei")]
    pub fee_step_wei: u64,
    #[serde(default = "default_min_fee_gwei")]
    pub min_fee_gwei: u64,
    #[serde(default = "default_max_fee_gwei")]
    pub max_fee_gwei: u64,

    // Snipe transaction shape
    #[serde(default = "default_snipe_gas_limit")]
    pub snipe_gas_limit: u64,
    #[serde(default = "default_snipe_deadline_secs")]
    pub snipe_deadline_secs: u64,

    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

// Defaults
fn default_debug() -> bool {
    false
}
fn default_chain_id() -> u64 {
    8453
}
fn default_proxy_port() -> u16 {
    8545
}
fn default_api_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9000
}
fn default_fee_mode() -> FeeMode {
    FeeMode::FeeMarket
}
fn default_priority_fee_gwei() -> u64 {
    2
}
fn default_fee_step_wei() -> u64 {
    1_000_000
}
fn default_min_fee_gwei() -> u64 {
    1
}
fn default_max_fee_gwei() -> u64 {
    20
}
fn default_snipe_gas_limit() -> u64 {
    300_000
}
fn default_snipe_deadline_secs() -> u64 {
    300
}
fn default_event_queue_depth() -> usize {
    256
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let selected_config = resolve_config_path(path);
        let mut builder = Config::builder();

        if let Some(ref selected_path) = selected_config {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: CLI (in main) > env/.env > selected profile file.
        builder = builder.add_source(Environment::default());

        let settings: GlobalSettings = builder.build()?.try_deserialize()?;

        // Basic Validation
        if settings.upstream_rpc_url.trim().is_empty() {
            return Err(AppError::Config("UPSTREAM_RPC_URL is missing".to_string()));
        }
        if settings.auth_token.trim().is_empty() {
            return Err(AppError::Config("AUTH_TOKEN is missing".to_string()));
        }
        url::Url::parse(&settings.upstream_rpc_url)
            .map_err(|e| AppError::Config(format!("Invalid upstream RPC URL: {}", e)))?;
        if let Some(sequencer) = &settings.sequencer_rpc_url {
            url::Url::parse(sequencer)
                .map_err(|e| AppError::Config(format!("Invalid sequencer RPC URL: {}", e)))?;
        }
        if let Some(notify) = &settings.notify_url {
            url::Url::parse(notify)
                .map_err(|e| AppError::Config(format!("Invalid notify URL: {}", e)))?;
        }

        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    /// Sequencer endpoint, falling back to the upstream RPC when a deployment
    /// has no dedicated one.
    pub fn sequencer_url(&self) -> String {
        self.sequencer_rpc_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.upstream_rpc_url.clone())
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.database_url.clone())
            .unwrap_or_else(|| "sqlite://oxidity_gateway.db".to_string())
    }

    pub fn priority_fee_wei(&self) -> u128 {
        u128::from(self.priority_fee_gwei) * GWEI
    }

    pub fn min_fee_wei(&self) -> u128 {
        u128::from(self.min_fee_gwei).max(1) * GWEI
    }

    pub fn max_fee_wei(&self) -> u128 {
        u128::from(self.max_fee_gwei).max(u128::from(self.min_fee_gwei)) * GWEI
    }

    pub fn fee_step(&self) -> u128 {
        u128::from(self.fee_step_wei).max(1)
    }

    pub fn snipe_gas_limit_value(&self) -> u64 {
        self.snipe_gas_limit.max(21_000)
    }

    pub fn snipe_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.snipe_deadline_secs.max(30))
    }

    pub fn event_queue_depth_value(&self) -> usize {
        self.event_queue_depth.max(1)
    }
}

fn resolve_config_path(path: Option<&str>) -> Option<String> {
    if let Some(path) = path {
        return Some(path.to_string());
    }
    detect_active_config_file()
}

fn detect_active_config_file() -> Option<String> {
    // Check common config.*.toml files first
    let priority_files = [
        "config.prod.toml",
        "config.dev.toml",
        "config.testnet.toml",
        "config.example.toml",
        "config.toml",
    ];

    for file in priority_files.iter() {
        if let Some(true) = config_has_active_flag(file) {
            return Some((*file).to_string());
        }
    }

    // Fallback: scan current dir for config.*.toml with THIS_ACTIVE = true
    if let Ok(entries) = fs::read_dir(".") {
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && name.starts_with("config.")
                && name.ends_with(".toml")
                && let Some(true) = config_has_active_flag(name)
            {
                return Some(name.to_string());
            }
        }
    }

    None
}

fn config_has_active_flag(path: &str) -> Option<bool> {
    let p = Path::new(path);
    if !p.exists() {
        return None;
    }

    Config::builder()
        .add_source(File::from(p))
        .build()
        .ok()?
        .get_bool("THIS_ACTIVE")
        .ok()
}
