pub mod artifact;
pub mod capture;
pub mod context;
pub mod encrypt;
pub mod events;
pub mod file_ext;
pub mod fleet;
pub mod host;
pub mod incremental;
pub mod job;
pub mod logging;
pub mod notifications;
pub mod pipeline;
pub mod plan;
pub mod redacted;
pub mod remote;
pub mod report;
pub mod result_error;
pub mod runner;
pub mod validate;
