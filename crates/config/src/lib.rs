mod error;
mod loader;
mod proxy;

use std::path::Path;

use serde::Deserialize;

pub use error::Error;
pub use proxy::{ProxyConfig, TrustedProxy};

pub(crate) type Result<T> = std::result::Result<T, error::Error>;

#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub proxy: ProxyConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
        loader::load(path)
    }
}
