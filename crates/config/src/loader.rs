use std::path::Path;

use crate::Config;

pub(crate) fn load<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;

    Ok(config)
}
