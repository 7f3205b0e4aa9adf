/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::info;

use crate::config::Config;
use crate::orchestrator::SyncReport;

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 程序启动 - 题目生成 ({})",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("📁 题库目录: {}", config.data_dir.display());
    info!(
        "📊 预读缓冲: {}-{}，预热 {} 题",
        config.look_ahead_min, config.look_ahead_max, config.warmup_count
    );
    if let Some(seed) = config.rng_seed {
        info!("🎲 固定随机种子: {}", seed);
    }
    info!("{}", "=".repeat(60));
}

/// 记录题库加载信息
///
/// # 参数
/// - `total`: 题库总数
/// - `used`: 已启用的题库数
/// - `generators`: 参与出题的生成器数
pub fn log_databases_loaded(total: usize, used: usize, generators: usize) {
    info!("✓ 找到 {} 个题库，已启用 {} 个", total, used);
    info!("📋 参与出题的生成器: {} 个", generators);
}

/// 记录题库同步结果
pub fn log_sync_complete(report: &SyncReport) {
    info!("\n{}", "─".repeat(60));
    info!("📥 题库同步完成");
    info!("🆕 新发现: {}", report.added);
    info!("✅ 下载成功: {}", report.downloaded);
    info!("❌ 失败: {}", report.failed);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `printed`: 输出的题目数
/// - `requested`: 计划输出的题目数
/// - `answers`: 作答记录数
pub fn print_final_stats(printed: usize, requested: usize, answers: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 运行统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 输出题目: {}/{}", printed, requested);
    info!("📝 作答记录: {}", answers);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
