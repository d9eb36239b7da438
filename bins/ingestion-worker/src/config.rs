use std::path::Path;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use ingest_api::{EnvelopeFields, MAX_ENVELOPE_SIZE, TRANSPORT_HARD_CAP};
use ingest_engine::HEALTH_CHECK_DETAIL_TYPE;

use crate::error::WorkerError;

pub const DEFAULT_CONFIG_PATH: &str = "worker.toml";
pub const DEFAULT_FEED_URL: &str = "https://blockchain.info/unconfirmed-transactions?format=json";

#[derive(Parser)]
#[command(name = "ingestion-worker", about = "Воркер загрузки данных из feed'а в шину событий")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Крутить ingestion-циклы до Ctrl+C
    Serve(WorkerArgs),
    /// Один health-check цикл; код выхода 0 — здоров
    Healthcheck(WorkerArgs),
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct WorkerArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = "INGESTION_WORKER_CONFIG")]
    pub config: String,

    /// Имя шины EventBridge
    #[arg(long, env = "EVENT_BUS_NAME")]
    pub event_bus_name: Option<String>,

    /// detail-type обычных envelope'ов
    #[arg(long, env = "EVENT_DETAIL_TYPE")]
    pub detail_type: Option<String>,

    /// Период тиков планировщика, мс
    #[arg(long, env = "INGESTION_INTERVAL")]
    pub interval_ms: Option<u64>,

    /// ARN потока-получателя, кладётся в resources каждого envelope'а
    #[arg(long, env = "INGESTION_DATA_STREAM_ARN")]
    pub data_stream_arn: Option<String>,

    #[arg(long, env = "INGESTION_FEED_URL")]
    pub feed_url: Option<String>,

    /// Таймаут HTTP запроса к feed'у, мс
    #[arg(long, env = "INGESTION_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Бюджет размера envelope'а, байт
    #[arg(long, env = "MAX_ENVELOPE_SIZE")]
    pub max_envelope_size: Option<usize>,

    /// Прикладывать timestamp к entry
    #[arg(long, env = "INGESTION_ATTACH_TIMESTAMP")]
    pub attach_timestamp: Option<bool>,

    /// detail-type health-check envelope'ов
    #[arg(long, env = "HEALTH_CHECK_DETAIL_TYPE")]
    pub health_detail_type: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub event_bus_name: Option<String>,
    pub detail_type: Option<String>,
    pub interval_ms: Option<u64>,
    pub data_stream_arn: Option<String>,
    pub feed_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_envelope_size: Option<usize>,
    pub attach_timestamp: Option<bool>,
    pub health_detail_type: Option<String>,
}

impl Config {
    pub fn parse(content: &str, path: &str) -> Result<Self, WorkerError> {
        toml::from_str(content)
            .map_err(|e| WorkerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    /// Отсутствие файла по умолчанию не ошибка; явно заданный путь обязан существовать.
    pub fn load(path: &str) -> Result<Self, WorkerError> {
        if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content, path)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: defaults < config.toml < env/CLI
#[derive(Debug, Clone, PartialEq)]
pub struct Effective {
    pub event_bus_name: String,
    pub detail_type: String,
    pub interval: Duration,
    pub data_stream_arn: Option<String>,
    pub feed_url: String,
    pub timeout: Duration,
    pub max_envelope_size: usize,
    pub attach_timestamp: bool,
    pub health_detail_type: String,
}

impl Effective {
    pub fn new(args: &WorkerArgs) -> Result<Self, WorkerError> {
        let cfg = Config::load(&args.config)?;
        Self::merge(args, cfg)
    }

    pub fn merge(args: &WorkerArgs, cfg: Config) -> Result<Self, WorkerError> {
        let interval_ms = args.interval_ms.or(cfg.interval_ms).unwrap_or(1000);
        let timeout_ms = args.timeout_ms.or(cfg.timeout_ms).unwrap_or(5000);
        let max_envelope_size = args.max_envelope_size.or(cfg.max_envelope_size).unwrap_or(MAX_ENVELOPE_SIZE);

        if interval_ms == 0 {
            return Err(invalid("interval_ms must be > 0"));
        }
        if timeout_ms == 0 {
            return Err(invalid("timeout_ms must be > 0"));
        }
        if max_envelope_size == 0 || max_envelope_size > TRANSPORT_HARD_CAP {
            return Err(invalid(format!(
                "max_envelope_size must be in 1..={TRANSPORT_HARD_CAP}, got {max_envelope_size}"
            )));
        }

        Ok(Self {
            event_bus_name: args.event_bus_name.clone().or(cfg.event_bus_name).unwrap_or_else(|| "default".into()),
            detail_type: args.detail_type.clone().or(cfg.detail_type).unwrap_or_else(|| "Incoming Data".into()),
            interval: Duration::from_millis(interval_ms),
            // пустая переменная окружения == не задано
            data_stream_arn: args.data_stream_arn.clone().or(cfg.data_stream_arn).filter(|arn| !arn.is_empty()),
            feed_url: args.feed_url.clone().or(cfg.feed_url).unwrap_or_else(|| DEFAULT_FEED_URL.into()),
            timeout: Duration::from_millis(timeout_ms),
            max_envelope_size,
            attach_timestamp: args.attach_timestamp.or(cfg.attach_timestamp).unwrap_or(false),
            health_detail_type: args
                .health_detail_type
                .clone()
                .or(cfg.health_detail_type)
                .unwrap_or_else(|| HEALTH_CHECK_DETAIL_TYPE.into()),
        })
    }

    /// Метаданные обычных ingestion envelope'ов.
    pub fn envelope_fields(&self) -> EnvelopeFields {
        let fields = EnvelopeFields::new(self.detail_type.as_str()).with_timestamp(self.attach_timestamp);
        match &self.data_stream_arn {
            Some(arn) => fields.with_resource(arn.as_str()),
            None => fields,
        }
    }
}

fn invalid(detail: impl Into<String>) -> WorkerError {
    WorkerError::Config { context: "validate", detail: detail.into() }
}
