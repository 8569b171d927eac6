use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use dockpipe_core::{DockingError, Result};
use dockpipe_domain::{Receptor, ReceptorPreparer};
use tokio::process::Command;
use tracing::info;

/// 脚本式受体准备器
///
/// 调用外部准备命令（抓取结构、加氢、autogrid生成格点图），
/// 然后核对产物：PDBQT、格点图描述文件和至少一个格点图。
/// 任何一步失败都是运行级致命错误。
pub struct ScriptReceptorPreparer {
    binary: String,
}

impl ScriptReceptorPreparer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ReceptorPreparer for ScriptReceptorPreparer {
    async fn prepare(&self, structure_id: &str, receptor_dir: &Path) -> Result<Receptor> {
        tokio::fs::create_dir_all(receptor_dir).await?;
        info!(structure_id, "开始受体准备");

        let output = Command::new(&self.binary)
            .arg(structure_id)
            .current_dir(receptor_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                DockingError::ReceptorPreparationFailed(format!(
                    "启动 {} 失败: {e}",
                    self.binary
                ))
            })?;

        if !output.status.success() {
            return Err(DockingError::ReceptorPreparationFailed(format!(
                "{} 退出码 {:?}: {}",
                self.binary,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let pdbqt = receptor_dir.join(format!("{structure_id}.pdbqt"));
        let maps_fld = receptor_dir.join(format!("{structure_id}.maps.fld"));
        for required in [&pdbqt, &maps_fld] {
            if !required.exists() {
                return Err(DockingError::ReceptorPreparationFailed(format!(
                    "准备产物缺失: {}",
                    required.display()
                )));
            }
        }

        let mut map_files = Vec::new();
        let mut entries = tokio::fs::read_dir(receptor_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "map") {
                map_files.push(path);
            }
        }
        if map_files.is_empty() {
            return Err(DockingError::ReceptorPreparationFailed(format!(
                "{structure_id} 没有任何格点图文件"
            )));
        }
        map_files.sort();

        info!(structure_id, maps = map_files.len(), "受体准备完成");
        Ok(Receptor {
            structure_id: structure_id.to_string(),
            pdbqt,
            maps_fld,
            map_files,
        })
    }
}
