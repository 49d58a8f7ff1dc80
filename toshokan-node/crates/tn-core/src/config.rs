use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

pub fn required_env(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing env: {name}"))
}

pub fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

pub fn duration_secs_from_env(name: &str, default_secs: u64) -> Result<Duration> {
    match env::var(name) {
        Ok(value) => {
            let secs: u64 = value
                .parse()
                .map_err(|err| anyhow!("invalid seconds for {name}: {err}"))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}

pub struct NodeConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
}

impl NodeConfig {
    pub fn load() -> Result<Self> {
        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            redis_url: optional_env("REDIS_URL"),
            cache_ttl: duration_secs_from_env("CACHE_TTL_SECONDS", 3600)?,
        })
    }
}
