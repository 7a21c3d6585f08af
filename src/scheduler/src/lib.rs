#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;
#[macro_use]
extern crate lazy_static;

pub mod accelerator_library;
pub mod bitstream_diff;
pub mod elastic_scheduler;
pub mod heuristics;
pub mod placement;
pub mod plan;
pub mod plan_evaluator;
pub mod pre_scheduling;
pub mod run_linker;

pub use accelerator_library::{AcceleratorLibrary, Decorator, DefaultAcceleratorLibrary};
pub use bitstream_diff::BitstreamLoadPlan;
pub use elastic_scheduler::{
    BenchmarkStats, ElasticResourceScheduler, SchedulingRequest, SchedulingResult,
};
pub use heuristics::{default_heuristics, HeuristicChoice, ModuleSelection};
pub use placement::{SearchOutcome, SearchStats};
pub use plan::{ExecutionPlan, PlanData, PlanSet, Run};
pub use run_linker::{NodeLinks, ReuseTarget, RunNode, ScheduledRun};
