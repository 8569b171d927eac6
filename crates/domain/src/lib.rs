//! 领域层：对接流水线的实体、端口和磁盘布局
//!
//! 不包含任何外部进程或调度逻辑，只定义数据模型和协作者接口。

pub mod entities;
pub mod ports;
pub mod workspace;

pub use entities::{
    Batch, BatchOutcome, BatchPlan, DockingJob, FailReason, JobStatus, LigandDatabase,
    LigandRecord, LigandResult, ParsedReport, RankedPose, Receptor, RunReport, RunResult,
    RunStatus, WorkList, RECORD_SEPARATOR,
};
pub use ports::{DockingEngine, LigandConverter, ReceptorPreparer, ReportParser};
pub use workspace::{BatchWorkspace, RunWorkspace};
