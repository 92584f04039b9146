//! # fleet_backup
//!
//! Backs up files and command output from a fleet of remote hosts over ssh.
//!
//! ## Features
//!
//! - **Per-host jobs**: pre-hooks, paths and command captures, post-hooks
//! - **Incremental runs**: only files changed during the last days
//! - **Encryption**: artifacts streamed through a local `gpg`
//! - **Reports**: HTML result tables mailed over SMTP or written to files
//! - **Parallel hosts**: optional rayon pool across hosts
//!
//! ## Quick Start
//!
//! ```no_run
//! use fleet_backup::backup::context::{RunContext, RunSettings};
//! use fleet_backup::backup::fleet::FleetDriver;
//! use fleet_backup::backup::plan::BackupPlan;
//! use fleet_backup::backup::remote::ssh::SshShell;
//! use std::sync::Arc;
//!
//! let plan = BackupPlan::load("backup-plan.yaml")?;
//! let settings = RunSettings::builder().destdir("/backups").build();
//! let ctx = RunContext::new(Arc::new(SshShell::default()), settings);
//! let all_ok = FleetDriver::new(&ctx, &plan).run(&[])?;
//! std::process::exit(if all_ok { 0 } else { 1 });
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
