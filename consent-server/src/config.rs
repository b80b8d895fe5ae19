use std::{fs, ops::RangeInclusive};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Clone, Deserialize)]
#[command(name = "server")]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    #[clap(long)]
    #[arg(short = 'c')]
    #[serde(default)]
    pub config: Option<String>,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("consent_server=info,tower_http=info"))]
    #[serde(default = "default_rust_log")]
    pub rust_log: String,
    #[clap(long, env)]
    #[arg(value_parser = port_in_range,short = 'p', default_value_t = 30050)]
    #[serde(default = "default_port")]
    pub port: u16,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("0.0.0.0"))]
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Pending decisions kept for the authorization endpoint.
    #[clap(long, env)]
    #[arg(default_value_t = 512)]
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// TOML file with clients, identity resources and API scopes.
    #[clap(long, env)]
    #[serde(default)]
    pub registry: Option<String>,
}

fn default_rust_log() -> String {
    String::from("consent_server=info,tower_http=info")
}

fn default_endpoint() -> String {
    String::from("0.0.0.0")
}

fn default_port() -> u16 {
    30050
}

fn default_cache_size() -> usize {
    512
}

const PORT_RANGE: RangeInclusive<usize> = 1..=65535;

fn port_in_range(s: &str) -> Result<u16, String> {
    let port: usize = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a port number"))?;
    if PORT_RANGE.contains(&port) {
        Ok(port as u16)
    } else {
        Err(format!(
            "port not in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ))
    }
}

pub fn load(cfg: &str) -> Result<AppConfig> {
    let content =
        fs::read_to_string(cfg).context("could not read config file")?;
    parse(&content)
}

fn parse(content: &str) -> Result<AppConfig> {
    let config: AppConfig =
        toml::from_str(content).context("could not parse config file")?;
    port_in_range(&config.port.to_string()).map_err(anyhow::Error::msg)?;
    Ok(config)
}
