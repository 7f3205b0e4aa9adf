/// 题库下载客户端
///
/// 封装所有与远程题库相关的 HTTP 调用：超时、有限次重试、逐块读取以便汇报进度
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, NetworkError};

/// 重试之间的基础等待时间
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// 按 `Content-Length` 预分配的上限，更大的内容边读边扩容
const MAX_PREALLOC: u64 = 1024 * 1024;

/// 题库下载客户端
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    retries: u32,
    max_bytes: u64,
}

impl FetchClient {
    /// 创建新的下载客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| AppError::request_failed("<client>", e))?;

        Ok(Self {
            client,
            retries: config.fetch_retries,
            max_bytes: config.max_download_bytes,
        })
    }

    /// 下载文本内容
    pub async fn fetch_text(&self, url: &str) -> AppResult<String> {
        let bytes = self.fetch_with_progress(url, |_| {}).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 下载内容，每收到一块数据就回调当前完成比例（0.0 - 1.0）
    ///
    /// 服务端没有给出长度时比例保持为 0，直到下载结束
    pub async fn fetch_with_progress<F>(&self, url: &str, mut on_progress: F) -> AppResult<Vec<u8>>
    where
        F: FnMut(f32),
    {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, &mut on_progress).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!("下载失败 ({}/{}): {}，稍后重试", attempt, self.retries, e);
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once<F>(&self, url: &str, on_progress: &mut F) -> AppResult<Vec<u8>>
    where
        F: FnMut(f32),
    {
        debug!("GET {}", url);
        on_progress(0.0);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::request_failed(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Network(NetworkError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let too_large = || {
            AppError::Network(NetworkError::TooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            })
        };

        // 长度由服务端声明，只作参考
        let total = response.content_length().filter(|len| *len > 0);
        if total.is_some_and(|len| len > self.max_bytes) {
            return Err(too_large());
        }
        let mut body = Vec::with_capacity(total.map_or(0, |len| len.min(MAX_PREALLOC)) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::request_failed(url, e))?
        {
            if body.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
            if let Some(total) = total {
                on_progress((body.len() as f32 / total as f32).min(1.0));
            }
        }

        on_progress(1.0);
        debug!("下载完成: {} ({} 字节)", url, body.len());
        Ok(body)
    }
}
