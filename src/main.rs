// ==========================================
// 排班表导入暂存系统 - 主入口
// ==========================================
// 用途: 初始化数据库并输出最近批次概况
// 环境变量: SCHEDULE_IMPORT_DB_PATH / RUST_LOG / SCHEDULE_IMPORT_LOG_FORMAT
// ==========================================

use anyhow::Context;
use schedule_import::app::{get_default_db_path, AppState};
use schedule_import::logging;

const RECENT_BATCH_LIMIT: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", schedule_import::APP_NAME);
    tracing::info!("系统版本: {}", schedule_import::VERSION);
    tracing::info!("==================================================");

    // 获取数据库路径
    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path.clone())
        .await
        .with_context(|| format!("无法初始化AppState: {}", db_path))?;

    let schema_version = state.schema_version()?;
    tracing::info!(
        schema_version = ?schema_version,
        config = ?state.import_api.config(),
        "AppState初始化成功"
    );

    let batches = state.import_api.list_batches(RECENT_BATCH_LIMIT)?;
    if batches.is_empty() {
        tracing::info!("暂无导入批次");
    }
    for batch in batches {
        tracing::info!(
            batch_id = %batch.batch_id,
            status = %batch.status,
            file_name = %batch.file_name,
            block_number = batch.block_number,
            academic_year = %batch.academic_year,
            range = %format!("{} ~ {}", batch.range_start, batch.range_end),
            rows = batch.row_count,
            "最近批次"
        );
    }

    Ok(())
}
