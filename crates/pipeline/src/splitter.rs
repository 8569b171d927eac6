use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use dockpipe_core::{DockingError, Result};
use dockpipe_domain::{Batch, BatchPlan, LigandDatabase, LigandRecord, RECORD_SEPARATOR};
use tracing::{debug, info};

/// 批次划分器
///
/// 单次顺序扫描数据库文件，按记录终止符计数切分批次。
/// 划分只产生元数据（字节范围），任意批次可独立物化，
/// 不需要重新读取之前的内容。
pub struct BatchSplitter {
    database: LigandDatabase,
    batch_size: usize,
}

impl BatchSplitter {
    pub fn new(database: LigandDatabase, batch_size: usize) -> Self {
        Self {
            database,
            batch_size,
        }
    }

    /// 扫描数据库并生成批次计划
    ///
    /// 批次边界完全由终止符计数决定；最后一个不满的批次也会输出。
    /// 空数据库或 batch_size 为 0 时返回 `InvalidInput`。
    pub fn split(&self) -> Result<Vec<BatchPlan>> {
        if self.batch_size == 0 {
            return Err(DockingError::InvalidInput(
                "batch_size 必须大于等于 1".to_string(),
            ));
        }

        let file = File::open(&self.database.path).map_err(|e| {
            DockingError::InvalidInput(format!(
                "无法打开配体数据库 {}: {e}",
                self.database.path.display()
            ))
        })?;
        let mut reader = BufReader::new(file);

        let mut plans = Vec::new();
        let mut line = String::new();
        let mut position: u64 = 0;
        let mut batch_start: u64 = 0;
        let mut separators_in_batch = 0usize;
        let mut total_records = 0usize;

        loop {
            line.clear();
            let bytes = reader.read_line(&mut line)?;
            if bytes == 0 {
                break;
            }
            position += bytes as u64;

            if line.trim_end() == RECORD_SEPARATOR {
                separators_in_batch += 1;
                total_records += 1;

                if separators_in_batch == self.batch_size {
                    plans.push(BatchPlan {
                        index: plans.len(),
                        offset: batch_start,
                        len: position - batch_start,
                        record_count: separators_in_batch,
                    });
                    batch_start = position;
                    separators_in_batch = 0;
                }
            }
        }

        // 刷出最后一个不满的批次
        if separators_in_batch > 0 {
            plans.push(BatchPlan {
                index: plans.len(),
                offset: batch_start,
                len: position - batch_start,
                record_count: separators_in_batch,
            });
        }

        if total_records == 0 {
            return Err(DockingError::InvalidInput(format!(
                "配体数据库 {} 为空或不含任何记录",
                self.database.path.display()
            )));
        }

        info!(
            database = %self.database.path.display(),
            records = total_records,
            batches = plans.len(),
            "数据库划分完成"
        );
        Ok(plans)
    }

    /// 物化单个批次：只读取该批次的字节范围并切成记录
    pub fn materialize(&self, plan: &BatchPlan) -> Result<Batch> {
        let mut file = File::open(&self.database.path)?;
        file.seek(SeekFrom::Start(plan.offset))?;

        let mut content = vec![0u8; plan.len as usize];
        file.read_exact(&mut content)?;
        let content = String::from_utf8(content).map_err(|e| {
            DockingError::InvalidInput(format!("批次 {} 包含非UTF-8内容: {e}", plan.index))
        })?;

        let mut records = Vec::with_capacity(plan.record_count);
        let mut current = String::new();
        for line in content.lines() {
            current.push_str(line);
            current.push('\n');
            if line.trim_end() == RECORD_SEPARATOR {
                let ordinal = records.len() + 1;
                records.push(LigandRecord::new(
                    &self.database.label,
                    plan.index,
                    ordinal,
                    std::mem::take(&mut current),
                ));
            }
        }

        debug!(batch_index = plan.index, records = records.len(), "批次物化完成");
        Ok(Batch {
            index: plan.index,
            records,
        })
    }
}
