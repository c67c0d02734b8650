// ==========================================
// 日志系统初始化
// ==========================================
// 基于 tracing / tracing-subscriber, RUST_LOG 可整体覆盖
// 再平衡执行链路 (编排器) 缺省放到 debug, 冲突重试与舱壁跳过都要可见
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 缺省过滤器: 全局 info, 编排器链路 debug
const DEFAULT_FILTER: &str = "info,inventory_rebalance::engine::orchestrator=debug";

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 覆盖缺省过滤器
///   例如: RUST_LOG=inventory_rebalance=trace 或 RUST_LOG=warn
///
/// # 示例
/// ```no_run
/// use inventory_rebalance::logging;
/// logging::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();
}

/// 初始化测试环境的日志系统
///
/// 集成测试的 setup 会重复调用, 用 try_init 吞掉重复注册;
/// 输出走 test_writer, 只有失败的用例才打印。
/// 缺省只放开本 crate 的 debug, 避免 rusqlite trace 噪音淹没断言上下文。
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("inventory_rebalance=debug"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
