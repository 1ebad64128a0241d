use std::env;

use coach_engine::{CoachConfig, EngineError};

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub coach: CoachConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, EngineError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            coach: CoachConfig::from_env()?,
        })
    }
}
