use std::{env, fmt::Display, str::FromStr};

use anyhow::Context;
use tracing::info;

pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub default_radius_km: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set to the food-share Postgres instance")?,
            max_connections: try_load("DB_MAX_CONNECTIONS", "5")?,
            default_radius_km: try_load("DEFAULT_RADIUS_KM", "25")?,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {key} value `{raw}`: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trimmed_values() {
        let radius: f64 = parse_value("DEFAULT_RADIUS_KM", " 12.5 ").expect("valid radius");
        assert_eq!(radius, 12.5);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = parse_value::<u32>("DB_MAX_CONNECTIONS", "many").expect_err("not a number");
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }
}
