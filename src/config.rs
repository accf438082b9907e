//! Connection settings for the relational and document stores
//!
//! Values come from the process environment (after `.env` is loaded with
//! `dotenv`), falling back to the defaults of the local teaching database.
//! Command-line flags override individual fields after loading.

use crate::error::{Result, TabulatorError};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;

pub const DEFAULT_PG_DBNAME: &str = "tm351test";
pub const DEFAULT_PG_HOST: &str = "localhost";
pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_PG_USER: &str = "test";
pub const DEFAULT_PG_PASSWORD: &str = "test";

pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_MONGODB_DATABASE: &str = "accidents";

/// Postgres connection parameters.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgSettings {
    pub dbname: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Default for PgSettings {
    fn default() -> Self {
        Self {
            dbname: DEFAULT_PG_DBNAME.to_string(),
            host: DEFAULT_PG_HOST.to_string(),
            port: DEFAULT_PG_PORT,
            user: DEFAULT_PG_USER.to_string(),
            password: DEFAULT_PG_PASSWORD.to_string(),
        }
    }
}

// Hand-written so passwords never reach log output.
impl std::fmt::Debug for PgSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSettings")
            .field("dbname", &self.dbname)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl PgSettings {
    /// Same server and credentials, different database.
    pub fn for_database(&self, dbname: &str) -> Self {
        Self {
            dbname: dbname.to_string(),
            ..self.clone()
        }
    }

    /// Typed connect options; every field reaches sqlx unchanged.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.dbname)
    }

    /// Connection target with the password masked, for logs only.
    pub fn redacted_url(&self) -> String {
        format!("postgresql://{}:***@{}:{}/{}", self.user, self.host, self.port, self.dbname)
    }
}

/// MongoDB connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocStoreSettings {
    pub uri: String,
    pub database: String,
}

impl Default for DocStoreSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_MONGODB_URI.to_string(),
            database: DEFAULT_MONGODB_DATABASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub postgres: PgSettings,
    pub docstore: DocStoreSettings,
}

impl Settings {
    /// Load `.env` if present, then read settings from the environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset keys keep their defaults.
    ///
    /// Keys: `PGDATABASE`, `PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`,
    /// `MONGODB_URI`, `MONGODB_DATABASE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        let pg = &mut settings.postgres;

        if let Some(v) = lookup("PGDATABASE") {
            pg.dbname = v;
        }
        if let Some(v) = lookup("PGHOST") {
            pg.host = v;
        }
        if let Some(v) = lookup("PGPORT") {
            pg.port = v
                .trim()
                .parse()
                .map_err(|_| TabulatorError::Config(format!("PGPORT must be a port number, got '{}'", v)))?;
        }
        if let Some(v) = lookup("PGUSER") {
            pg.user = v;
        }
        if let Some(v) = lookup("PGPASSWORD") {
            pg.password = v;
        }

        if let Some(v) = lookup("MONGODB_URI") {
            settings.docstore.uri = v;
        }
        if let Some(v) = lookup("MONGODB_DATABASE") {
            settings.docstore.database = v;
        }

        Ok(settings)
    }
}
