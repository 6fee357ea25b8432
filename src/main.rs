//! Binary entry point for the cloudwait CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;

use cloudwait::{
    ObjectListing, ProcessCommandRunner, Provisioner, RemoteShell, ScalewayBackend,
    ScalewayBackendError, ScalewayConfig, ScalewayObjectStorage, ServerDetails, ServerTemplate,
    SnapshotDetails, SshConfig, StorageError, TeardownReport, WaitConfig, WorkflowError,
    ZoneSnapshots, list_objects, logging,
};

mod cli;

use cli::{Cli, Command, LampCommand, ListObjectsCommand};

/// Exit status used when a teardown left servers behind.
const EXIT_TEARDOWN_INCOMPLETE: i32 = 2;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("ssh configuration error: {0}")]
    Remote(String),
    #[error(transparent)]
    Workflow(#[from] WorkflowError<ScalewayBackendError>),
    #[error(transparent)]
    Storage(#[from] WorkflowError<StorageError>),
}

type ScalewayProvisioner = Provisioner<ScalewayBackend, ProcessCommandRunner>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::setup_tracing(cli.log_filter.as_deref());

    let exit_code = match dispatch(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn build_provisioner() -> Result<ScalewayProvisioner, CliError> {
    let scaleway_config =
        ScalewayConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let policies = WaitConfig::load_without_cli_args()
        .and_then(|config| config.to_policies())
        .map_err(|err| CliError::Config(err.to_string()))?;
    let ssh_config =
        SshConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;

    let template = ServerTemplate::from(&scaleway_config);
    let backend =
        ScalewayBackend::new(scaleway_config).map_err(|err| CliError::Backend(err.to_string()))?;
    let shell = RemoteShell::with_process_runner(ssh_config)
        .map_err(|err| CliError::Remote(err.to_string()))?;

    Ok(Provisioner::new(backend, shell, template, policies))
}

async fn dispatch(command: Command) -> Result<i32, CliError> {
    match command {
        Command::ListObjects(args) => list_bucket(&args).await,
        other => provision(other).await,
    }
}

async fn list_bucket(args: &ListObjectsCommand) -> Result<i32, CliError> {
    let config =
        ScalewayConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let storage =
        ScalewayObjectStorage::from_config(&config).map_err(|err| CliError::Config(err.to_string()))?;
    let listing = list_objects(&storage, &args.bucket, &args.prefix).await?;
    write_objects(io::stdout().lock(), &listing);
    Ok(0)
}

async fn provision(command: Command) -> Result<i32, CliError> {
    let provisioner = build_provisioner()?;
    let mut stdout = io::stdout().lock();

    match command {
        Command::CreateServer(args) => {
            let servers = provisioner.create_servers(&args.name, args.count).await?;
            for server in &servers {
                write_server(&mut stdout, server);
            }
            Ok(0)
        }
        Command::Publish(args) => {
            let published = provisioner.publish(&args.name, &args.page).await?;
            write_server(&mut stdout, &published.server);
            writeln!(stdout, "Go to {}", published.url).ok();
            Ok(0)
        }
        Command::DeleteServers(args) => {
            let report = provisioner.delete_servers(&args.prefix).await?;
            write_report(&mut stdout, &report);
            Ok(teardown_exit_code(&report))
        }
        Command::CreateSnapshot(args) => {
            let snapshot = provisioner
                .create_snapshot(&args.volume_prefix, &args.name)
                .await?;
            write_snapshot(&mut stdout, &snapshot);
            Ok(0)
        }
        Command::ListSnapshots(args) => {
            let listed = provisioner.list_snapshots(&args.zones).await?;
            write_zone_snapshots(&mut stdout, &listed);
            Ok(0)
        }
        Command::Lamp(LampCommand::Create { name }) => {
            let lamp = provisioner.launch_lamp(&name).await?;
            write_server(&mut stdout, &lamp.server);
            writeln!(stdout, "Go to {}", lamp.url).ok();
            Ok(0)
        }
        Command::Lamp(LampCommand::Destroy { name }) => {
            let report = provisioner.destroy_lamp(&name).await?;
            write_report(&mut stdout, &report);
            Ok(teardown_exit_code(&report))
        }
        Command::ListObjects(args) => list_bucket(&args).await,
    }
}

fn teardown_exit_code(report: &TeardownReport) -> i32 {
    if report.is_clean() {
        0
    } else {
        EXIT_TEARDOWN_INCOMPLETE
    }
}

fn write_server(mut target: impl Write, server: &ServerDetails) {
    let address = server
        .public_ip
        .map_or_else(|| String::from("-"), |ip| ip.to_string());
    writeln!(
        target,
        "{}\t{}\t{}\t{}\t{address}",
        server.name, server.id, server.zone, server.status
    )
    .ok();
}

fn write_snapshot(mut target: impl Write, snapshot: &SnapshotDetails) {
    writeln!(
        target,
        "{}\t{}\t{}\t{}",
        snapshot.name,
        snapshot.id,
        snapshot.status,
        snapshot.volume_id.as_deref().unwrap_or("-")
    )
    .ok();
}

fn write_zone_snapshots(mut target: impl Write, listed: &[ZoneSnapshots]) {
    for zone in listed {
        writeln!(target, "{}:", zone.zone).ok();
        if zone.snapshots.is_empty() {
            writeln!(target, "  (none)").ok();
        }
        for snapshot in &zone.snapshots {
            write!(target, "  ").ok();
            write_snapshot(&mut target, snapshot);
        }
    }
}

fn write_objects(mut target: impl Write, listing: &ObjectListing) {
    if listing.objects.is_empty() {
        writeln!(target, "No objects in {}", listing.bucket).ok();
        return;
    }
    for object in &listing.objects {
        writeln!(
            target,
            "{}\t{}\t{}",
            object.key, object.size_bytes, object.last_modified
        )
        .ok();
    }
    writeln!(
        target,
        "{} objects, {} bytes",
        listing.objects.len(),
        listing.total_bytes()
    )
    .ok();
}

fn write_report(mut target: impl Write, report: &TeardownReport) {
    if report.attempted() == 0 && report.cleanup.is_empty() {
        writeln!(target, "No matching servers").ok();
        return;
    }
    for handle in &report.deleted {
        writeln!(target, "deleted\t{}\t{}", handle.id, handle.zone).ok();
    }
    for failure in &report.failures {
        writeln!(
            target,
            "failed\t{}\t{}\t{}",
            failure.server.id, failure.server.zone, failure.message
        )
        .ok();
    }
    for handle in &report.residual {
        writeln!(target, "present\t{}\t{}", handle.id, handle.zone).ok();
    }
    for step in &report.cleanup {
        let line = step.error.as_ref().map_or_else(
            || format!("removed\t{}", step.resource),
            |message| format!("cleanup-failed\t{}\t{message}", step.resource),
        );
        writeln!(target, "{line}").ok();
    }
    writeln!(target, "{report}").ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use cloudwait::{
        CleanupStep, ObjectSummary, ServerHandle, ServerStatus, SnapshotStatus, TeardownFailure,
    };

    use super::*;

    fn handle(id: &str) -> ServerHandle {
        ServerHandle {
            id: id.to_owned(),
            zone: String::from("fr-par-1"),
        }
    }

    fn render(write: impl FnOnce(&mut Vec<u8>)) -> String {
        let mut buf = Vec::new();
        write(&mut buf);
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn write_server_prints_tab_separated_fields() {
        let server = ServerDetails {
            id: String::from("srv-1"),
            name: String::from("web"),
            zone: String::from("fr-par-1"),
            status: ServerStatus::Running,
            public_ip: Some(IpAddr::V4(Ipv4Addr::new(51, 15, 0, 10))),
        };

        let rendered = render(|buf| write_server(buf, &server));

        assert_eq!(rendered, "web\tsrv-1\tfr-par-1\trunning\t51.15.0.10\n");
    }

    #[test]
    fn write_zone_snapshots_marks_empty_zones() {
        let listed = vec![
            ZoneSnapshots {
                zone: String::from("nl-ams-1"),
                snapshots: Vec::new(),
            },
            ZoneSnapshots {
                zone: String::from("fr-par-1"),
                snapshots: vec![SnapshotDetails {
                    id: String::from("snap-1"),
                    name: String::from("nightly"),
                    zone: String::from("fr-par-1"),
                    status: SnapshotStatus::Available,
                    volume_id: None,
                }],
            },
        ];

        let rendered = render(|buf| write_zone_snapshots(buf, &listed));

        assert_eq!(
            rendered,
            "nl-ams-1:\n  (none)\nfr-par-1:\n  nightly\tsnap-1\tavailable\t-\n"
        );
    }

    #[test]
    fn write_report_lists_every_outcome() {
        let report = TeardownReport {
            deleted: vec![handle("srv-1")],
            failures: vec![TeardownFailure {
                server: handle("srv-2"),
                message: String::from("locked"),
            }],
            residual: vec![handle("srv-3")],
            cleanup: Vec::new(),
        };

        let rendered = render(|buf| write_report(buf, &report));

        assert!(rendered.contains("deleted\tsrv-1\tfr-par-1\n"));
        assert!(rendered.contains("failed\tsrv-2\tfr-par-1\tlocked\n"));
        assert!(rendered.contains("present\tsrv-3\tfr-par-1\n"));
        assert!(rendered.ends_with("deleted 1, failed 1, still present 1\n"));
        assert_eq!(teardown_exit_code(&report), EXIT_TEARDOWN_INCOMPLETE);
    }

    #[test]
    fn write_report_lists_cleanup_steps() {
        let report = TeardownReport {
            deleted: vec![handle("srv-1")],
            cleanup: vec![
                CleanupStep {
                    resource: String::from("security group sg-1"),
                    error: None,
                },
                CleanupStep {
                    resource: String::from("security group sg-2"),
                    error: Some(String::from("in use")),
                },
            ],
            ..TeardownReport::default()
        };

        let rendered = render(|buf| write_report(buf, &report));

        assert!(rendered.contains("removed\tsecurity group sg-1\n"));
        assert!(rendered.contains("cleanup-failed\tsecurity group sg-2\tin use\n"));
        assert_eq!(teardown_exit_code(&report), EXIT_TEARDOWN_INCOMPLETE);
    }

    #[test]
    fn write_report_shows_cleanup_without_servers() {
        let report = TeardownReport {
            cleanup: vec![CleanupStep {
                resource: String::from("security group sg-1"),
                error: None,
            }],
            ..TeardownReport::default()
        };

        let rendered = render(|buf| write_report(buf, &report));

        assert!(rendered.starts_with("removed\tsecurity group sg-1\n"));
        assert_eq!(teardown_exit_code(&report), 0);
    }

    #[test]
    fn write_objects_prints_keys_and_totals() {
        let listing = ObjectListing {
            bucket: String::from("cloudwait-example"),
            prefix: String::new(),
            objects: vec![ObjectSummary {
                key: String::from("createObjectFromString"),
                size_bytes: 11,
                last_modified: String::from("2024-05-01T12:00:00.000Z"),
            }],
        };

        let rendered = render(|buf| write_objects(buf, &listing));

        assert_eq!(
            rendered,
            "createObjectFromString\t11\t2024-05-01T12:00:00.000Z\n1 objects, 11 bytes\n"
        );
    }

    #[test]
    fn write_objects_reports_empty_bucket() {
        let listing = ObjectListing {
            bucket: String::from("cloudwait-example"),
            prefix: String::from("missing"),
            objects: Vec::new(),
        };

        assert_eq!(
            render(|buf| write_objects(buf, &listing)),
            "No objects in cloudwait-example\n"
        );
    }

    #[test]
    fn empty_report_is_clean() {
        let report = TeardownReport::default();
        assert_eq!(render(|buf| write_report(buf, &report)), "No matching servers\n");
        assert_eq!(teardown_exit_code(&report), 0);
    }

    #[test]
    fn write_error_writes_cli_error() {
        let err = CliError::Config(String::from("missing Scaleway API secret key"));
        let rendered = render(|buf| write_error(buf, &err));
        assert_eq!(
            rendered,
            "configuration error: missing Scaleway API secret key\n"
        );
    }
}
