//! 题库清单（逐行文本）
//!
//! 远程清单：计数行、条目数行，之后每个条目两行 `name`、`url`。
//! 本地清单：比远程多出开头的全局槽位计数，每个条目额外带 `storage_slot`、`used`、`downloaded`。

use crate::error::{AppError, AppResult};
use crate::models::DatabaseDescriptor;

/// 本地清单内容
#[derive(Debug, Clone, Default)]
pub struct LocalManifest {
    /// 下一个可分配的存储槽位
    pub next_slot: u32,
    pub databases: Vec<DatabaseDescriptor>,
}

/// 逐行读取，并记录行号用于报错
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
        }
    }

    fn next_line(&mut self, what: &str) -> AppResult<(usize, &'a str)> {
        match self.inner.next() {
            Some((index, line)) => Ok((index + 1, line.trim_end_matches('\r'))),
            None => Err(AppError::malformed_manifest(0, format!("缺少 {}", what))),
        }
    }

    fn next_parsed<T: std::str::FromStr>(&mut self, what: &str) -> AppResult<T> {
        let (line_no, line) = self.next_line(what)?;
        line.trim()
            .parse()
            .map_err(|_| AppError::malformed_manifest(line_no, format!("{} 无法解析: '{}'", what, line)))
    }

    fn next_bool(&mut self, what: &str) -> AppResult<bool> {
        let (line_no, line) = self.next_line(what)?;
        match line.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(AppError::malformed_manifest(
                line_no,
                format!("{} 不是布尔值: '{}'", what, line),
            )),
        }
    }
}

/// 解析远程清单，只含 name 与 url
///
/// 第一行计数对远程清单没有意义，读取后忽略
pub fn parse_remote_manifest(text: &str) -> AppResult<Vec<DatabaseDescriptor>> {
    let mut lines = Lines::new(text);
    lines.next_line("计数行")?;
    let count: usize = lines.next_parsed("条目数")?;

    let mut databases = Vec::with_capacity(count);
    for _ in 0..count {
        let (_, name) = lines.next_line("name")?;
        let (_, url) = lines.next_line("url")?;
        databases.push(DatabaseDescriptor::discovered(name.trim(), url.trim()));
    }
    Ok(databases)
}

/// 解析本地清单
pub fn parse_local_manifest(text: &str) -> AppResult<LocalManifest> {
    let mut lines = Lines::new(text);
    let next_slot: u32 = lines.next_parsed("全局槽位计数")?;
    let count: usize = lines.next_parsed("条目数")?;

    let mut databases = Vec::with_capacity(count);
    for _ in 0..count {
        let (_, name) = lines.next_line("name")?;
        let (_, url) = lines.next_line("url")?;
        let storage_slot = lines.next_parsed("storage_slot")?;
        let used = lines.next_bool("used")?;
        let downloaded = lines.next_bool("downloaded")?;
        databases.push(DatabaseDescriptor {
            name: name.trim().to_string(),
            url: url.trim().to_string(),
            storage_slot,
            used,
            downloaded,
        });
    }
    Ok(LocalManifest {
        next_slot,
        databases,
    })
}

/// 序列化为本地清单格式（布尔值写作 `True` / `False`）
pub fn write_local_manifest(manifest: &LocalManifest) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n{}\n", manifest.next_slot, manifest.databases.len()));
    for db in &manifest.databases {
        out.push_str(&format!(
            "{}\n{}\n{}\n{}\n{}\n",
            db.name,
            db.url,
            db.storage_slot,
            bool_text(db.used),
            bool_text(db.downloaded)
        ));
    }
    out
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}
