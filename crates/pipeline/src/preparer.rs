use std::sync::Arc;

use dockpipe_core::{DockingError, Result};
use dockpipe_domain::{Batch, BatchWorkspace, LigandConverter, Receptor, WorkList};
use tracing::{info, warn};

/// 配体准备器
///
/// 把批次内每条记录转换成引擎原生格式，并写出文件清单。
/// 单个配体转换失败按跳过策略处理：记录标识并继续，不中止批次。
pub struct LigandPreparer {
    converter: Arc<dyn LigandConverter>,
}

impl LigandPreparer {
    pub fn new(converter: Arc<dyn LigandConverter>) -> Self {
        Self { converter }
    }

    /// 准备一个批次：逐配体转换，写出文件清单
    ///
    /// 文件清单首行是受体的格点图描述文件，其余按批次内顺序
    /// 列出所有转换成功的配体文件。
    pub async fn prepare(
        &self,
        batch: &Batch,
        receptor: &Receptor,
        workspace: &BatchWorkspace,
    ) -> Result<WorkList> {
        workspace.ensure_layout().await?;
        let ligand_dir = workspace.ligand_dir();

        let mut ligand_files = Vec::with_capacity(batch.len());
        let mut skipped = Vec::new();

        for record in &batch.records {
            match self.converter.convert(record, &ligand_dir).await {
                Ok(path) => ligand_files.push(path),
                Err(DockingError::ConversionFailed { ligand_id, message }) => {
                    warn!(batch_index = batch.index, ligand_id = %ligand_id, %message, "配体转换失败，跳过");
                    skipped.push(ligand_id);
                }
                Err(e) => return Err(e),
            }
        }

        let mut filelist = String::new();
        filelist.push_str(&receptor.maps_fld.display().to_string());
        filelist.push('\n');
        for file in &ligand_files {
            filelist.push_str(&file.display().to_string());
            filelist.push('\n');
        }

        let filelist_path = workspace.filelist_path();
        tokio::fs::write(&filelist_path, filelist).await?;

        info!(
            batch_index = batch.index,
            converted = ligand_files.len(),
            skipped = skipped.len(),
            "批次准备完成"
        );

        Ok(WorkList {
            batch_index: batch.index,
            filelist: filelist_path,
            ligand_files,
            skipped,
        })
    }
}
