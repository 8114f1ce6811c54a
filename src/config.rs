use serde::Deserialize;

use crate::buffer::replacer::ReplacerType;
use crate::error::Result;

#[derive(Debug, PartialEq, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
}

/// Pool sizing and policy knobs, loaded from an optional config file with
/// environment overrides.
#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    /// number of frames per pool instance.
    pub pool_size: usize,
    /// number of pool instances the page id space is sharded over.
    pub num_instances: usize,
    pub replacer_type: ReplacerType,
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "debug")?
            .set_default("pool_size", 64i64)?
            .set_default("num_instances", 1i64)?
            .set_default("replacer_type", "lru")?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("BUFPOOL"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() -> Result<()> {
        let cfg = Config::new("")?;
        assert_eq!(LogLevel::Debug, cfg.log_level);
        assert_eq!(64, cfg.pool_size);
        assert_eq!(1, cfg.num_instances);
        assert_eq!(ReplacerType::Lru, cfg.replacer_type);
        Ok(())
    }
}
