//! Configuration for the catalog CLI

use core_config::{ConfigError, Environment, FromEnv};
use database::mongodb::MongoConfig;
use domain_catalog::{CatalogSettings, CloudinaryConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub mongo: MongoConfig,
    /// `None` when no Cloudinary credentials are set; only `create` needs them.
    pub cloudinary: Option<CloudinaryConfig>,
    pub catalog: CatalogSettings,
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        let cloudinary = match CloudinaryConfig::from_env() {
            Ok(config) => Some(config),
            Err(ConfigError::MissingEnvVar(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(Self {
            environment: Environment::from_env(),
            mongo: MongoConfig::from_env()?,
            cloudinary,
            catalog: CatalogSettings::from_env()?,
        })
    }
}
