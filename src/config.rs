use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use thiserror::Error;

use crate::chat::{DEFAULT_MAX_SESSIONS, ModelConfig};
use crate::core::DebtForm;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("--debt expects NAME:PRINCIPAL:RATE_PERCENT:PAYMENT, got {0:?}")]
    InvalidDebtSpec(String),

    #[error("{0} must be > 0")]
    NotPositive(&'static str),
}

#[derive(Parser, Debug)]
#[command(
    name = "payoff",
    about = "Debt payoff planner: balance projections plus a repayment chat assistant"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the web page and JSON API.
    Serve(ServeArgs),
    /// Project balances for debts given on the command line and print the chart JSON.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,
    #[arg(
        long,
        env = "SESSION_MAX_TURNS",
        default_value_t = 200,
        help = "Conversation turns kept per session"
    )]
    pub session_max_turns: usize,
    #[arg(
        long,
        env = "SESSION_MAX_COUNT",
        default_value_t = DEFAULT_MAX_SESSIONS,
        help = "Conversations kept in memory; the least recently active is dropped first"
    )]
    pub session_max_count: usize,
    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    #[arg(
        long,
        env = "GEMINI_API_KEY",
        hide_env_values = true,
        help = "Chat is disabled when no key is set"
    )]
    pub api_key: Option<String>,
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-1.5-flash")]
    pub model_name: String,
    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com"
    )]
    pub model_base_url: String,
    #[arg(long, env = "MODEL_TIMEOUT_SECS", default_value_t = 60)]
    pub model_timeout_secs: u64,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(
        long = "debt",
        required = true,
        value_parser = parse_debt_spec,
        help = "NAME:PRINCIPAL:RATE_PERCENT:PAYMENT, repeatable"
    )]
    pub debts: Vec<DebtSpec>,
    #[arg(long, help = "Fix the chart color seed")]
    pub seed: Option<u64>,
}

/// One `--debt` argument, split but not yet parsed as numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct DebtSpec {
    pub name: String,
    pub principal: String,
    pub rate: String,
    pub payment: String,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub session_max_turns: usize,
    pub session_max_count: usize,
    pub model: Option<ModelConfig>,
}

impl ServeArgs {
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        if self.session_max_turns == 0 {
            return Err(ConfigError::NotPositive("--session-max-turns"));
        }
        if self.session_max_count == 0 {
            return Err(ConfigError::NotPositive("--session-max-count"));
        }
        let model = self.model.into_config()?;
        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            session_max_turns: self.session_max_turns,
            session_max_count: self.session_max_count,
            model,
        })
    }
}

impl ModelArgs {
    fn into_config(self) -> Result<Option<ModelConfig>, ConfigError> {
        if self.model_timeout_secs == 0 {
            return Err(ConfigError::NotPositive("--model-timeout-secs"));
        }
        Ok(self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| ModelConfig {
                api_key,
                model: self.model_name,
                base_url: self.model_base_url,
                timeout: Duration::from_secs(self.model_timeout_secs),
            }))
    }
}

impl SimulateArgs {
    /// Lays the specs out the way the page submits them, so both go through
    /// the same parser.
    pub fn to_form(&self) -> DebtForm {
        let mut form = DebtForm::default();
        for spec in &self.debts {
            form.name.push(spec.name.clone());
            form.principal.push(Value::String(spec.principal.clone()));
            form.rate.push(Value::String(spec.rate.clone()));
            form.payment.push(Value::String(spec.payment.clone()));
        }
        form
    }
}

pub fn parse_debt_spec(raw: &str) -> Result<DebtSpec, ConfigError> {
    // Split from the right so names may contain ':'.
    let mut fields = raw.rsplitn(4, ':');
    let (Some(payment), Some(rate), Some(principal), Some(name)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(ConfigError::InvalidDebtSpec(raw.to_string()));
    };
    if name.trim().is_empty() {
        return Err(ConfigError::InvalidDebtSpec(raw.to_string()));
    }
    Ok(DebtSpec {
        name: name.to_string(),
        principal: principal.to_string(),
        rate: rate.to_string(),
        payment: payment.to_string(),
    })
}
