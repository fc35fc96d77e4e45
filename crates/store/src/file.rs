use chrono::Utc;
use cohida_core::market::entity::CandlePoint;
use cohida_core::store::error::StoreError;
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 导出文件格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// # Summary
/// 把检索结果落到本地文件，作为数据库之外的可选出口。
///
/// # Invariants
/// - 文件名为 `{SYMBOL}_{label}_{YYYYmmdd_HHMMSS}.{ext}`，symbol 中的 `-` 替换为 `_`。
/// - CSV 列依次为 symbol、timestamp、open_price、high_price、low_price、close_price、volume。
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// # Summary
    /// 写出一批 K 线。
    ///
    /// # Logic
    /// 1. 空数据只告警，仍生成只有表头（CSV）或空数组（JSON）的文件。
    /// 2. 目录不存在时自动创建。
    ///
    /// # Arguments
    /// * `symbol` - 交易对。
    /// * `label` - 文件名中的用途标签，例如 `historical` 或 `1h`。
    /// * `points` - 待导出数据。
    /// * `format` - 导出格式。
    ///
    /// # Returns
    /// 写出的文件路径。
    pub fn write(
        &self,
        symbol: &str,
        label: &str,
        points: &[CandlePoint],
        format: ExportFormat,
    ) -> Result<PathBuf, StoreError> {
        if points.is_empty() {
            warn!("Exporting empty data set for {}", symbol);
        }
        fs::create_dir_all(&self.dir)?;

        let file_name = format!(
            "{}_{}_{}.{}",
            symbol.replace('-', "_"),
            label,
            Utc::now().format("%Y%m%d_%H%M%S"),
            format.extension()
        );
        let path = self.dir.join(file_name);

        match format {
            ExportFormat::Csv => write_csv(&path, points)?,
            ExportFormat::Json => write_json(&path, points)?,
        }

        info!("Exported {} data points to {}", points.len(), path.display());
        Ok(path)
    }
}

fn write_csv(path: &Path, points: &[CandlePoint]) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    if points.is_empty() {
        writer
            .write_record([
                "symbol",
                "timestamp",
                "open_price",
                "high_price",
                "low_price",
                "close_price",
                "volume",
            ])
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
    }
    for point in points {
        writer
            .serialize(point)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(path: &Path, points: &[CandlePoint]) -> Result<(), StoreError> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, points)
        .map_err(|e| StoreError::Serialization(e.to_string()))
}
