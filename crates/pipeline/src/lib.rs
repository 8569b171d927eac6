//! 流水线层：批次划分、配体准备、GPU调度、结果聚合与运行协调

pub mod aggregator;
pub mod coordinator;
pub mod preparer;
pub mod scheduler;
pub mod splitter;

#[cfg(test)]
pub mod test_utils;

pub use aggregator::ResultAggregator;
pub use coordinator::PipelineCoordinator;
pub use preparer::LigandPreparer;
pub use scheduler::{CompletedBatch, GpuJobScheduler, RetryPolicy, ScheduledJob, SchedulerConfig};
pub use splitter::BatchSplitter;
