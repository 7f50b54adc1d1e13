//! Runtime configuration, read from the environment.

/// Port on which `restartServer` is honored.
pub const MAINTENANCE_PORT: u16 = 3535;

const DEFAULT_PORT: u16 = 3434;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Opaque connection string handed to the repository collaborator.
    pub database_url: String,
    pub port: u16,
    pub base_url: String,
    pub session_secret: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a number, got {raw:?}"))?,
            Err(_) => DEFAULT_PORT,
        };
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));
        let session_secret = std::env::var("SESSION_SECRET")
            .map_err(|_| anyhow::anyhow!("SESSION_SECRET must be set"))?;

        Ok(Self {
            database_url,
            port,
            base_url,
            session_secret,
        })
    }

    /// `restartServer` is only honored on the maintenance port.
    pub fn restart_allowed(&self) -> bool {
        self.port == MAINTENANCE_PORT
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/driftmere_test".to_string(),
            port: DEFAULT_PORT,
            base_url: "http://localhost:3434".to_string(),
            session_secret: "test-secret".to_string(),
        }
    }
}
