pub mod service;

pub use service::{
    analyze_many, analyze_now, get_job, job_report, load_firmware_catalog, submit_analysis,
    AnalyzeRequest, JobSnapshot, JobStatus,
};
