//! panelo command line

use anyhow::Result;
use clap::{Parser, Subcommand};
use panelo_config::AppKind;
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "panelo")]
#[command(about = "Panelo - hosting panel provisioning tool")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides RUST_LOG and the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Run without root privileges
    #[arg(long, global = true)]
    skip_root_check: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the host
    Install {
        /// Panel domain, defaults to the detected address
        domain: Option<String>,
        /// Administrative email, defaults to admin@<hostname>
        email: Option<String>,
    },

    /// Show the ordered provisioning plan
    Plan,

    /// Validate the configuration file
    Validate,

    /// Manage a single component
    Component {
        /// Component id, e.g. `web-server` or `runtime:nodejs`
        id: String,
        #[command(subcommand)]
        action: ComponentAction,
    },

    /// Deploy an application
    Deploy {
        /// Application kind
        kind: AppKind,
        /// Application name
        name: String,
        /// Domain routed to the application
        domain: String,
        /// Framework variant
        #[arg(long)]
        variant: Option<String>,
        /// Runtime version
        #[arg(long)]
        version: Option<String>,
        /// Owning user
        #[arg(short, long, default_value = "admin")]
        user: String,
        /// Request a certificate for the domain
        #[arg(long)]
        tls: bool,
    },

    /// Manage deployed applications
    App {
        #[command(subcommand)]
        command: AppCommands,
    },

    /// Manage panel users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage certificates
    Cert {
        #[command(subcommand)]
        command: CertCommands,
    },

    /// Manage backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Start the panel services
    Start,

    /// Stop the panel services
    Stop,

    /// Show component status
    Status,

    /// Inspect provisioning runs
    Journal {
        #[command(subcommand)]
        command: JournalCommands,
    },

    /// Undo the changes of a provisioning run
    Rollback {
        /// Run id
        run: String,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum ComponentAction {
    /// Install the component
    Install,
    /// Start its services
    Start,
    /// Stop its services
    Stop,
    /// Show its status
    Status,
    /// Restart its services
    Restart,
}

#[derive(Subcommand)]
enum AppCommands {
    /// List applications
    List,
    /// Show the live status of an application
    Status {
        /// Application name
        name: String,
        /// Owning user
        #[arg(short, long, default_value = "admin")]
        user: String,
    },
    /// Start an application
    Start {
        /// Application name
        name: String,
        /// Owning user
        #[arg(short, long, default_value = "admin")]
        user: String,
    },
    /// Stop an application
    Stop {
        /// Application name
        name: String,
        /// Owning user
        #[arg(short, long, default_value = "admin")]
        user: String,
    },
    /// Restart an application
    Restart {
        /// Application name
        name: String,
        /// Owning user
        #[arg(short, long, default_value = "admin")]
        user: String,
    },
    /// Remove an application, keeping its files
    Remove {
        /// Application name
        name: String,
        /// Owning user
        #[arg(short, long, default_value = "admin")]
        user: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user and print its generated password
    Add {
        /// Login name
        name: String,
        /// Email address
        email: String,
        /// Grant the admin role
        #[arg(long)]
        admin: bool,
    },
    /// List users
    List,
    /// Deactivate a user
    Deactivate {
        /// Login name
        name: String,
    },
    /// Remove a user with its applications and domains
    Remove {
        /// Login name
        name: String,
    },
}

#[derive(Subcommand)]
enum CertCommands {
    /// Issue a certificate
    Issue {
        /// Domain name
        domain: String,
        /// Contact email for the ACME account
        email: Option<String>,
    },
    /// Renew certificates close to expiry
    Renew,
    /// List certificates
    List,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Write a backup archive
    Run,
    /// List backup archives
    List,
}

#[derive(Subcommand)]
enum JournalCommands {
    /// List provisioning runs
    List,
    /// Show the steps of a run
    Show {
        /// Run id
        run: String,
    },
}

impl Commands {
    /// Whether the command only reads local files
    fn read_only(&self) -> bool {
        matches!(
            self,
            Commands::Plan
                | Commands::Validate
                | Commands::App {
                    command: AppCommands::List
                }
                | Commands::User {
                    command: UserCommands::List
                }
                | Commands::Cert {
                    command: CertCommands::List
                }
                | Commands::Backup {
                    command: BackupCommands::List
                }
                | Commands::Journal { .. }
        )
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = smol::block_on(run(cli)) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let global = commands::Global {
        config: cli.config,
        log_level: cli.log_level,
    };
    let config = match cli.command {
        Commands::Validate => return commands::validate::run(&global),
        _ => global.load_config()?,
    };
    let _guard = logging::init(global.log_level.as_deref(), &config);

    if !cli.skip_root_check && !cli.command.read_only() {
        commands::ensure_root()?;
    }

    match cli.command {
        Commands::Install { domain, email } => {
            commands::install::run(config, domain, email).await
        }
        Commands::Plan => commands::plan::run(&config),
        Commands::Validate => commands::validate::run(&global),
        Commands::Component { id, action } => commands::component::run(config, &id, action).await,
        Commands::Deploy {
            kind,
            name,
            domain,
            variant,
            version,
            user,
            tls,
        } => {
            let request = panelo_provision::DeployRequest {
                name,
                domain,
                kind,
                variant,
                version,
                user,
                tls,
            };
            commands::app::deploy(config, request).await
        }
        Commands::App { command } => commands::app::run(config, command).await,
        Commands::User { command } => commands::user::run(config, command).await,
        Commands::Cert { command } => commands::cert::run(config, command).await,
        Commands::Backup { command } => commands::backup::run(config, command).await,
        Commands::Start => commands::services::start(config).await,
        Commands::Stop => commands::services::stop(config).await,
        Commands::Status => commands::services::status(config).await,
        Commands::Journal { command } => commands::journal::run(config, command),
        Commands::Rollback { run } => commands::journal::rollback(config, &run).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deploy_arguments() {
        let cli = Cli::try_parse_from([
            "panelo", "deploy", "wordpress", "blog", "blog.example.com", "--user", "alice", "--tls",
        ])
        .unwrap();
        match cli.command {
            Commands::Deploy {
                kind,
                name,
                domain,
                user,
                tls,
                variant,
                ..
            } => {
                assert_eq!(kind, AppKind::Wordpress);
                assert_eq!(name, "blog");
                assert_eq!(domain, "blog.example.com");
                assert_eq!(user, "alice");
                assert!(tls);
                assert!(variant.is_none());
            }
            _ => panic!("parsed the wrong command"),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(Cli::try_parse_from(["panelo", "deploy", "ruby", "x", "x.example.com"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "panelo",
            "status",
            "--config",
            "/tmp/panelo.yaml",
            "--skip-root-check",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/panelo.yaml")));
        assert!(cli.skip_root_check);
        assert!(!cli.command.read_only());
    }

    #[test]
    fn test_listing_commands_are_read_only() {
        for args in [
            vec!["panelo", "plan"],
            vec!["panelo", "app", "list"],
            vec!["panelo", "journal", "show", "abc"],
            vec!["panelo", "backup", "list"],
        ] {
            let cli = Cli::try_parse_from(args.clone()).unwrap();
            assert!(cli.command.read_only(), "{:?}", args);
        }
        let cli = Cli::try_parse_from(["panelo", "backup", "run"]).unwrap();
        assert!(!cli.command.read_only());
    }
}
