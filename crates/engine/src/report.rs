use std::path::Path;

use dockpipe_core::{DockingError, Result};
use dockpipe_domain::{ParsedReport, RankedPose, ReportParser};

/// 对接报告解析器
///
/// 兼容两种报告格式：
/// - DLG：每个运行一行 `Estimated Free Energy of Binding = ... kcal/mol`，
///   按能量升序编排名（最低能量为第一名）
/// - Vina式PDBQT：`REMARK VINA RESULT: <能量> ...` 行，按出现顺序编排名
///
/// 配体标识取报告文件名，批次内序号取文件名末尾的 `_<n>` 后缀。
pub struct DockedReportParser;

const DLG_ENERGY_MARKER: &str = "Estimated Free Energy of Binding";
const VINA_RESULT_MARKER: &str = "REMARK VINA RESULT:";

impl ReportParser for DockedReportParser {
    fn parse(&self, report: &Path) -> Result<ParsedReport> {
        let stem = report
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                DockingError::Serialization(format!("无效的报告文件名: {}", report.display()))
            })?
            .to_string();
        // 序号参与并列命中的裁决，宁可拒绝也不默认为0
        let ordinal = stem
            .rsplit('_')
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                DockingError::Serialization(format!(
                    "报告文件名 {} 缺少批次内序号后缀",
                    report.display()
                ))
            })?;

        let content = std::fs::read_to_string(report)?;

        let mut dlg_energies = Vec::new();
        let mut vina_energies = Vec::new();
        for line in content.lines() {
            if let Some(rest) = line.split(DLG_ENERGY_MARKER).nth(1) {
                if let Some(energy) = parse_leading_float(rest.trim_start_matches([' ', '='])) {
                    dlg_energies.push(energy);
                }
            } else if let Some(rest) = line.strip_prefix(VINA_RESULT_MARKER) {
                if let Some(energy) = parse_leading_float(rest) {
                    vina_energies.push(energy);
                }
            }
        }

        let poses = if !dlg_energies.is_empty() {
            // DLG的运行结果无序，能量最低者为第一名
            dlg_energies.sort_by(|a, b| a.total_cmp(b));
            ranked(&dlg_energies)
        } else {
            ranked(&vina_energies)
        };

        if poses.is_empty() {
            return Err(DockingError::Serialization(format!(
                "报告 {} 不含任何结合能",
                report.display()
            )));
        }

        Ok(ParsedReport {
            ligand_id: stem,
            ordinal,
            poses,
        })
    }
}

fn ranked(energies: &[f64]) -> Vec<RankedPose> {
    energies
        .iter()
        .enumerate()
        .map(|(i, &energy)| RankedPose {
            rank: i as u32 + 1,
            energy,
        })
        .collect()
}

fn parse_leading_float(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}
