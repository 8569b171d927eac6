use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use dockpipe_core::{DockingError, Result};
use dockpipe_domain::{LigandConverter, LigandRecord};
use tokio::process::Command;
use tracing::debug;

/// 基于obabel的配体转换器
///
/// 把单条SDF记录写成临时文件，调用obabel转换成PDBQT，
/// 加氢（pH 7）并用GAFF力场优化。转换产物中的MODEL/ENDMDL
/// 行会被剥离，引擎不接受多模型文件。
pub struct ObabelConverter {
    binary: String,
}

impl ObabelConverter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl LigandConverter for ObabelConverter {
    async fn convert(&self, record: &LigandRecord, output_dir: &Path) -> Result<PathBuf> {
        let input_path = output_dir.join(format!("{}.sdf", record.id));
        let output_path = output_dir.join(format!("{}.pdbqt", record.id));
        tokio::fs::write(&input_path, &record.content).await?;

        debug!(ligand_id = %record.id, "开始配体格式转换");

        let output = Command::new(&self.binary)
            .arg(&input_path)
            .arg("-O")
            .arg(&output_path)
            .arg("-p")
            .arg("7")
            .arg("-ff")
            .arg("GAFF")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DockingError::ConversionFailed {
                ligand_id: record.id.clone(),
                message: format!("启动 {} 失败: {e}", self.binary),
            })?;

        if !output.status.success() {
            return Err(DockingError::ConversionFailed {
                ligand_id: record.id.clone(),
                message: format!(
                    "{} 退出码 {:?}: {}",
                    self.binary,
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let converted =
            tokio::fs::read_to_string(&output_path)
                .await
                .map_err(|e| DockingError::ConversionFailed {
                    ligand_id: record.id.clone(),
                    message: format!("转换产物不可读: {e}"),
                })?;

        // 剥离多模型标记
        let cleaned: String = converted
            .lines()
            .filter(|line| !line.starts_with("MODEL") && !line.starts_with("ENDMDL"))
            .map(|line| format!("{line}\n"))
            .collect();
        tokio::fs::write(&output_path, cleaned).await?;
        tokio::fs::remove_file(&input_path).await?;

        Ok(output_path)
    }
}
