use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SDF记录终止符，独占一行
pub const RECORD_SEPARATOR: &str = "$$$$";

/// 配体数据库：一个SDF文件加上用于目录命名的标签
///
/// 加载后不可变，记录顺序即文件中出现的顺序。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LigandDatabase {
    pub label: String,
    pub path: PathBuf,
}

impl LigandDatabase {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }
}

/// 单条配体记录
///
/// `ordinal` 是批次内的1起始序号，`id` 由数据库标签、批次索引和序号拼成，
/// 保证整个运行内唯一且可复现。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LigandRecord {
    pub id: String,
    pub ordinal: usize,
    pub content: String,
}

impl LigandRecord {
    pub fn new(db_label: &str, batch_index: usize, ordinal: usize, content: String) -> Self {
        Self {
            id: format!("{db_label}_batch{batch_index}_{ordinal}"),
            ordinal,
            content,
        }
    }
}

/// 批次划分计划：记录数据库中一段字节范围及其包含的记录数
///
/// 只持有元数据，不持有记录内容，因此任何批次都可以独立物化
/// 而无需重新读取之前的批次。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchPlan {
    /// 0起始的批次索引
    pub index: usize,
    /// 批次内容在数据库文件中的起始字节偏移
    pub offset: u64,
    /// 批次内容的字节长度
    pub len: u64,
    /// 批次包含的配体记录数
    pub record_count: usize,
}

/// 物化后的批次：索引加上按原始顺序排列的记录
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub index: usize,
    pub records: Vec<LigandRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 配体准备的产物：文件清单和批次内所有转换成功的配体文件
#[derive(Debug, Clone, PartialEq)]
pub struct WorkList {
    pub batch_index: usize,
    /// 文件清单路径，首行为受体格点图描述文件
    pub filelist: PathBuf,
    /// 转换成功的配体文件，保持批次内顺序
    pub ligand_files: Vec<PathBuf>,
    /// 转换失败被跳过的配体标识
    pub skipped: Vec<String>,
}

/// 准备完成的受体：PDBQT文件、格点图描述文件和各原子类型的格点图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receptor {
    pub structure_id: String,
    pub pdbqt: PathBuf,
    pub maps_fld: PathBuf,
    pub map_files: Vec<PathBuf>,
}

/// 批次终态失败的原因
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail")]
pub enum FailReason {
    /// 引擎错误，重试预算耗尽
    Engine(String),
    /// 引擎报告成功但报告文件缺失或不可解析
    MissingReport(String),
    /// 批次内所有配体都无法转换
    Preparation(String),
}

/// 对接作业状态机：Queued -> Running -> {Succeeded, Failed}，
/// 取消可以发生在任何非终态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed(FailReason),
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed(_) | JobStatus::Cancelled
        )
    }
}

/// 一个对接作业：一个批次的工作清单加上共享受体
#[derive(Debug, Clone)]
pub struct DockingJob {
    pub id: String,
    pub batch_index: usize,
    pub worklist: WorkList,
    pub status: JobStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DockingJob {
    pub fn new(worklist: WorkList) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            batch_index: worklist.batch_index,
            worklist,
            status: JobStatus::Queued,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// 更新作业状态并维护时间戳
    pub fn update_status(&mut self, status: JobStatus) {
        match &status {
            JobStatus::Running => {
                self.started_at = Some(Utc::now());
            }
            s if s.is_terminal() => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        self.status = status;
    }
}

/// 报告中的一个构象：排名和结合自由能（kcal/mol）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedPose {
    pub rank: u32,
    pub energy: f64,
}

/// 单个配体的解析后报告
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedReport {
    pub ligand_id: String,
    /// 批次内序号，用于并列打破
    pub ordinal: usize,
    pub poses: Vec<RankedPose>,
}

impl ParsedReport {
    /// 排名第一的构象（每个配体的最佳姿势）
    pub fn rank_one(&self) -> Option<&RankedPose> {
        self.poses.iter().find(|p| p.rank == 1)
    }
}

/// 聚合候选：某配体的最佳构象能量及其在运行中的位置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LigandResult {
    pub ligand_id: String,
    pub energy: f64,
    pub batch_index: usize,
    pub ordinal: usize,
}

impl LigandResult {
    /// 是否优于当前最佳：能量严格更低获胜；
    /// 能量相等时批次索引更小获胜，再相等时批次内序号更小获胜
    pub fn outranks(&self, best: &LigandResult) -> bool {
        if self.energy < best.energy {
            return true;
        }
        if self.energy == best.energy {
            return (self.batch_index, self.ordinal) < (best.batch_index, best.ordinal);
        }
        false
    }
}

/// 运行结束方式
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RunStatus {
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

/// 聚合结果：最佳命中，或没有任何有利结合
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "hit")]
pub enum RunResult {
    BestHit(LigandResult),
    NoFavorableBinding,
}

/// 单个批次的最终结局
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchOutcome {
    pub batch_index: usize,
    pub status: JobStatus,
    pub attempts: u32,
    pub skipped_ligands: Vec<String>,
    pub report_count: usize,
}

/// 运行报告：持久化到工作目录的 run_report.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub structure_id: String,
    pub database_label: String,
    pub status: RunStatus,
    pub result: RunResult,
    pub batches: Vec<BatchOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
