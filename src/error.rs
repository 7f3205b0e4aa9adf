use thiserror::Error;

/// 应用程序错误类型
///
/// 题目生成子系统内没有致命错误：调用方记录日志后降级为
/// "可用的生成器/题库变少" 或者一条过期的状态消息。
#[derive(Debug, Error)]
pub enum AppError {
    /// 题库内容格式错误
    #[error("题库内容错误: {0}")]
    Source(#[from] SourceError),
    /// 网络请求错误
    #[error("网络错误: {0}")]
    Network(#[from] NetworkError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 等待超时，题目尚未生成
    #[error("第 {index} 道题尚未生成 (已等待 {waited_ms} 毫秒)")]
    NotReady { index: usize, waited_ms: u64 },
    /// 生成任务已停止
    #[error("题目生成已停止")]
    Stopped,
    /// 注册表中没有该题库
    #[error("未知题库: {url}")]
    UnknownDatabase { url: String },
}

/// 题库内容错误
#[derive(Debug, Error)]
pub enum SourceError {
    /// XML 解析失败
    #[error("XML 解析失败 (位置 {position}): {message}")]
    MalformedXml { position: usize, message: String },
    /// 题库中没有任何生成器
    #[error("题库中没有可用的生成器")]
    NoGenerators,
    /// 表格缺少必要的行
    #[error("表格缺少第 {line} 行")]
    MissingLine { line: usize },
    /// 清单格式错误
    #[error("清单第 {line} 行格式错误: {message}")]
    MalformedManifest { line: usize, message: String },
}

/// 网络请求错误
#[derive(Debug, Error)]
pub enum NetworkError {
    /// 请求失败
    #[error("请求失败 ({url}): {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// 服务端返回错误状态码
    #[error("请求 {url} 返回状态码 {status}")]
    BadStatus { url: String, status: u16 },
    /// 内容超过大小上限
    #[error("下载 {url} 超过大小上限 {limit} 字节")]
    TooLarge { url: String, limit: u64 },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 删除文件失败
    #[error("删除文件失败 ({path}): {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    FileParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件删除错误
    pub fn file_delete_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::DeleteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建网络请求失败错误
    pub fn request_failed(url: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Network(NetworkError::RequestFailed {
            url: url.into(),
            source,
        })
    }

    /// 创建配置值错误
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// 创建清单格式错误
    pub fn malformed_manifest(line: usize, message: impl Into<String>) -> Self {
        AppError::Source(SourceError::MalformedManifest {
            line,
            message: message.into(),
        })
    }
}

impl From<quick_xml::Error> for AppError {
    fn from(err: quick_xml::Error) -> Self {
        AppError::Source(SourceError::MalformedXml {
            position: 0,
            message: err.to_string(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
