use crate::error::{AppError, AppResult, ConfigError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 默认配置文件名
const DEFAULT_CONFIG_FILE: &str = "credence.toml";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// 题库存放目录（Databases.txt 与 n.xml）
    pub data_dir: PathBuf,
    /// 远程题库清单地址
    pub manifest_url: String,
    /// 预读缓冲下限
    pub look_ahead_min: usize,
    /// 预读缓冲上限
    pub look_ahead_max: usize,
    /// 读取第 0 题之前至少生成的题目数
    pub warmup_count: usize,
    /// 读取题目时的最长等待时间（毫秒）
    pub question_wait_ms: u64,
    /// 生成任务空闲时的轮询间隔（毫秒）
    pub idle_tick_ms: u64,
    /// 单次下载超时（秒）
    pub fetch_timeout_secs: u64,
    /// 下载失败后的重试次数，0 表示不重试
    pub fetch_retries: u32,
    /// 单个文件的最大下载字节数
    pub max_download_bytes: u64,
    /// 固定随机种子（测试与复现用）
    pub rng_seed: Option<u64>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 演示模式下输出的题目数
    pub demo_question_count: usize,
    /// 启动时是否先同步远程题库
    pub update_on_start: bool,
}

/// 预读缓冲参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LookAhead {
    pub min: usize,
    pub max: usize,
    pub warmup: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("StreamingAssets"),
            manifest_url: "http://appliedrationality.org/uploads/games/credence/Databases.txt"
                .to_string(),
            look_ahead_min: 2,
            look_ahead_max: 10,
            warmup_count: 2,
            question_wait_ms: 2000,
            idle_tick_ms: 50,
            fetch_timeout_secs: 30,
            fetch_retries: 0,
            max_download_bytes: 64 * 1024 * 1024,
            rng_seed: None,
            verbose_logging: false,
            demo_question_count: 5,
            update_on_start: false,
        }
    }
}

impl Config {
    /// 加载配置：默认值 → TOML 文件（可选）→ 环境变量
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("CREDENCE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        let config = config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        Self::from_toml_str(&content, path)
    }

    fn from_toml_str(content: &str, path: &Path) -> AppResult<Self> {
        toml::from_str(content).map_err(|source| {
            AppError::Config(ConfigError::FileParseFailed {
                path: path.display().to_string(),
                source,
            })
        })
    }

    /// 用环境变量覆盖配置
    pub fn apply_env(self) -> Self {
        Self {
            data_dir: std::env::var("CREDENCE_DATA_DIR").map(PathBuf::from).unwrap_or(self.data_dir),
            manifest_url: std::env::var("CREDENCE_MANIFEST_URL").unwrap_or(self.manifest_url),
            look_ahead_min: env_parse("LOOK_AHEAD_MIN").unwrap_or(self.look_ahead_min),
            look_ahead_max: env_parse("LOOK_AHEAD_MAX").unwrap_or(self.look_ahead_max),
            warmup_count: env_parse("WARMUP_COUNT").unwrap_or(self.warmup_count),
            question_wait_ms: env_parse("QUESTION_WAIT_MS").unwrap_or(self.question_wait_ms),
            idle_tick_ms: env_parse("IDLE_TICK_MS").unwrap_or(self.idle_tick_ms),
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS").unwrap_or(self.fetch_timeout_secs),
            fetch_retries: env_parse("FETCH_RETRIES").unwrap_or(self.fetch_retries),
            max_download_bytes: env_parse("MAX_DOWNLOAD_BYTES").unwrap_or(self.max_download_bytes),
            rng_seed: env_parse("RNG_SEED").or(self.rng_seed),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
            demo_question_count: env_parse("DEMO_QUESTION_COUNT").unwrap_or(self.demo_question_count),
            update_on_start: env_parse("UPDATE_ON_START").unwrap_or(self.update_on_start),
        }
    }

    /// 检查预读参数与下载上限
    pub fn validate(&self) -> AppResult<()> {
        if self.look_ahead_max == 0 {
            return Err(AppError::invalid_config("look_ahead_max", "必须大于 0"));
        }
        if self.max_download_bytes == 0 {
            return Err(AppError::invalid_config("max_download_bytes", "必须大于 0"));
        }
        if self.look_ahead_min > self.look_ahead_max {
            return Err(AppError::invalid_config(
                "look_ahead_min",
                format!("{} 大于 look_ahead_max {}", self.look_ahead_min, self.look_ahead_max),
            ));
        }
        if self.warmup_count == 0 || self.warmup_count > self.look_ahead_max {
            return Err(AppError::invalid_config(
                "warmup_count",
                format!("必须在 1..={} 之间", self.look_ahead_max),
            ));
        }
        Ok(())
    }

    pub fn look_ahead(&self) -> LookAhead {
        LookAhead {
            min: self.look_ahead_min,
            max: self.look_ahead_max,
            warmup: self.warmup_count,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
