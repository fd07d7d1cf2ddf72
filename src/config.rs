//! Configuração do BIDTRACK carregada a partir de `bidtrack.toml`.
//!
//! A struct [`BidtrackConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `BIDTRACK_LOG` tem precedência sobre o arquivo
//! para o nível de log.

use serde::Deserialize;
use std::path::Path;

use crate::error::{ExecutionError, Result};
use crate::resolver::PollConfig;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "bidtrack.toml";

/// Variável de ambiente que sobrescreve `log_level`.
pub const LOG_ENV: &str = "BIDTRACK_LOG";

/// Configuração de nível superior carregada de `bidtrack.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct BidtrackConfig {
    /// Filtro de log no formato do `EnvFilter` (ex.: "info", "bidtrack=debug").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Tempo máximo de espera por um job no resolver, em milissegundos.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Atraso base do polling em milissegundos.
    #[serde(default = "default_poll_base_delay_ms")]
    pub poll_base_delay_ms: u64,

    /// Teto do atraso entre duas leituras.
    #[serde(default = "default_poll_max_delay_ms")]
    pub poll_max_delay_ms: u64,
}

// Valor padrão para o nível de log: "info".
fn default_log_level() -> String {
    "info".to_string()
}

// Valor padrão para o timeout de espera: 30s.
fn default_wait_timeout_ms() -> u64 {
    30_000
}

// Valor padrão para o atraso base: 50ms.
fn default_poll_base_delay_ms() -> u64 {
    50
}

// Valor padrão para o teto do atraso: 1000ms.
fn default_poll_max_delay_ms() -> u64 {
    1000
}

impl Default for BidtrackConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            wait_timeout_ms: default_wait_timeout_ms(),
            poll_base_delay_ms: default_poll_base_delay_ms(),
            poll_max_delay_ms: default_poll_max_delay_ms(),
        }
    }
}

impl BidtrackConfig {
    /// Carrega a configuração de `bidtrack.toml` no diretório atual.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração do caminho indicado.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<BidtrackConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(level) = std::env::var(LOG_ENV)
            && !level.is_empty()
        {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejeita combinações de polling que não fazem sentido.
    pub fn validate(&self) -> Result<()> {
        if self.poll_base_delay_ms > self.poll_max_delay_ms {
            return Err(ExecutionError::Config(format!(
                "poll_base_delay_ms ({}) exceeds poll_max_delay_ms ({})",
                self.poll_base_delay_ms, self.poll_max_delay_ms
            )));
        }
        Ok(())
    }

    /// Parâmetros de polling para o [`JobStateResolver`](crate::resolver::JobStateResolver).
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            base_delay_ms: self.poll_base_delay_ms,
            max_delay_ms: self.poll_max_delay_ms,
            timeout_ms: self.wait_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = BidtrackConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.wait_timeout_ms, 30_000);
        assert_eq!(config.poll_base_delay_ms, 50);
        assert_eq!(config.poll_max_delay_ms, 1000);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            wait_timeout_ms = 5000
            poll_base_delay_ms = 10
        "#;
        let config: BidtrackConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.wait_timeout_ms, 5000);
        assert_eq!(config.poll_base_delay_ms, 10);
        assert_eq!(config.poll_max_delay_ms, 1000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_max_delay_ms = 250").unwrap();
        writeln!(file, "wait_timeout_ms = 1200").unwrap();

        let config = BidtrackConfig::load_from(file.path()).unwrap();
        let poll = config.poll_config();
        assert_eq!(poll.max_delay_ms, 250);
        assert_eq!(poll.timeout_ms, 1200);
        assert_eq!(poll.base_delay_ms, 50);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wait_timeout_ms = \"soon\"").unwrap();
        assert!(BidtrackConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn base_delay_above_max_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_base_delay_ms = 2000").unwrap();
        writeln!(file, "poll_max_delay_ms = 100").unwrap();

        let err = BidtrackConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ExecutionError::Config(ref msg) if msg.contains("poll_base_delay_ms")));
        assert!(BidtrackConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BidtrackConfig::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.wait_timeout_ms, 30_000);
    }
}
