use clap::Parser;
use fleet_backup::backup::context::{RunContext, RunSettings};
use fleet_backup::backup::fleet::FleetDriver;
use fleet_backup::backup::host::HostSelector;
use fleet_backup::backup::incremental::IncrementalWindow;
use fleet_backup::backup::logging::{self, DEFAULT_LOG_FILE};
use fleet_backup::backup::plan::BackupPlan;
use fleet_backup::backup::remote::ssh::SshShell;
use fleet_backup::backup::result_error::error::Error;
use fleet_backup::backup::result_error::result::Result;
use fleet_backup::backup::result_error::WithMsg;
use fleet_backup::backup::validate::validate_writable_dir;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use tracing::error;

/// Back up files and command output of remote hosts over ssh
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Only log what would be done, contact no host
    #[arg(long, visible_alias = "dry")]
    simulate: bool,
    /// Only archive files changed during the last day
    #[arg(short, long)]
    incremental: bool,
    /// Only archive files changed during the last DAYS days
    #[arg(long, value_name = "DAYS")]
    since: Option<f64>,
    /// Full backup, wins over --incremental and --since
    #[arg(long)]
    full: bool,
    /// Location of the backup plan
    #[arg(short, long, default_value = "backup-plan.yaml")]
    plan: PathBuf,
    /// Hosts backed up at the same time
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    jobs: u16,
    /// Log file appended to on every run
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,
    /// Only log to the console
    #[arg(long)]
    no_log_file: bool,
    /// Existing directory receiving the artifacts
    destdir: PathBuf,
    /// `[user@]host` keys of the plan, all hosts when omitted
    hosts: Vec<String>,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    logging::init((!args.no_log_file).then_some(args.log_file.as_path()));

    match run(args) {
        Ok(true) => exit(0),
        Ok(false) => {
            error!("Backup finished with errors");
            exit(1)
        }
        Err(e) => {
            error!("{e}");
            exit(1)
        }
    }
}

fn run(args: Args) -> Result<bool> {
    validate_writable_dir(&args.destdir)
        .map_err(Error::from)
        .with_msg(format!("Invalid destination directory {:?}", args.destdir))?;
    let window = IncrementalWindow::from_flags(args.incremental, args.since, args.full)?;
    let hosts = args
        .hosts
        .iter()
        .map(|h| h.parse::<HostSelector>())
        .collect::<Result<Vec<_>>>()?;
    let plan = BackupPlan::load(&args.plan)?;

    let settings = RunSettings::builder()
        .destdir(args.destdir)
        .simulate(args.simulate)
        .window(window)
        .jobs(args.jobs.into())
        .build();
    let ctx = RunContext::new(Arc::new(SshShell::default()), settings);
    FleetDriver::new(&ctx, &plan).run(&hosts)
}
