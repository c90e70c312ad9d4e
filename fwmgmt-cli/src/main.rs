//! fwmgmt: manage firewall group memberships from the command line.
//!
//! Tracks one membership resource in a local JSON state file and drives its
//! lifecycle (create, read, update, delete, import) against the management
//! web API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use fwmgmt_groups::{
    ClientConfig, GroupDetails, Members, MembershipReconciler, MembershipState, MgmtClient,
    Outcome, ReconcileError, RequestOptions, ResourceKind, ResourceLifecycle,
};
use tabled::{Table, Tabled};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod state_file;

use state_file::TrackedResource;

#[derive(Parser)]
#[command(name = "fwmgmt")]
#[command(about = "Manage firewall group memberships", long_about = None)]
struct Cli {
    /// Management web API root
    #[arg(short, long, env = "FWMGMT_SERVER", default_value = "https://127.0.0.1/web_api")]
    server: String,

    /// Login user
    #[arg(short, long, env = "FWMGMT_USER")]
    user: Option<String>,

    /// Login password
    #[arg(long, env = "FWMGMT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Domain to log into (multi-domain servers)
    #[arg(long, env = "FWMGMT_DOMAIN")]
    domain: Option<String>,

    /// Existing session id; skips login and logout
    #[arg(long, env = "FWMGMT_SID", hide_env_values = true)]
    sid: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// Request timeout in seconds
    #[arg(long, default_value = "60")]
    timeout: u64,

    /// State file tracking the managed resource
    #[arg(long, default_value = "fwmgmt-state.json")]
    state: PathBuf,

    /// Apply changes despite warnings
    #[arg(long)]
    ignore_warnings: bool,

    /// Apply changes despite errors
    #[arg(long)]
    ignore_errors: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add members to a group and start tracking the relation
    Create {
        /// Resource kind: member, network-member or member-set
        #[arg(short, long)]
        kind: ResourceKind,

        #[command(flatten)]
        desired: DesiredArgs,
    },

    /// Refresh the tracked resource from the server
    Read,

    /// Change the tracked resource to a new desired state
    Update {
        #[command(flatten)]
        desired: DesiredArgs,
    },

    /// Remove the tracked relation from the group
    Delete,

    /// Start tracking an existing relation by identifier
    Import {
        /// Resource kind: member, network-member or member-set
        #[arg(short, long)]
        kind: ResourceKind,

        /// Composite identifier, e.g. <group-uid>/<member-uid>
        id: String,
    },

    /// Print the tracked resource without contacting the server
    Show,
}

/// Desired state given on the command line.
#[derive(Args, Debug, Clone)]
struct DesiredArgs {
    /// Group name
    #[arg(short, long)]
    group: String,

    /// Member name (repeat for member-set resources)
    #[arg(short, long = "member")]
    members: Vec<String>,

    /// Group comments (member-set only)
    #[arg(long)]
    comments: Option<String>,

    /// Group color (member-set only)
    #[arg(long)]
    color: Option<String>,

    /// Group tag (member-set only, repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,
}

impl DesiredArgs {
    fn to_state(&self, kind: ResourceKind) -> Result<MembershipState> {
        let members = if kind.is_single() {
            match self.members.as_slice() {
                [member] => Members::One(member.clone()),
                _ => bail!("{} resources take exactly one --member", kind),
            }
        } else {
            Members::set(self.members.iter().cloned())
        };

        Ok(MembershipState {
            group: self.group.clone(),
            members,
            details: GroupDetails {
                comments: self.comments.clone(),
                color: self.color.clone(),
                tags: self.tags.iter().cloned().collect(),
            },
        })
    }
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "GROUP")]
    group: String,
    #[tabled(rename = "MEMBERS")]
    members: String,
}

impl From<&TrackedResource> for ResourceRow {
    fn from(tracked: &TrackedResource) -> Self {
        let members: Vec<String> = tracked.state.members.names().into_iter().collect();
        Self {
            id: tracked.id.clone(),
            kind: tracked.kind.to_string(),
            group: tracked.state.group.clone(),
            members: if members.is_empty() {
                "-".to_string()
            } else {
                members.join(", ")
            },
        }
    }
}

fn print_resource(tracked: &TrackedResource) {
    println!("{}", Table::new([ResourceRow::from(tracked)]));
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.server.clone(),
            username: self.user.clone(),
            password: self.password.clone(),
            domain: self.domain.clone(),
            session_id: self.sid.clone(),
            timeout: Duration::from_secs(self.timeout),
            accept_invalid_certs: self.insecure,
        }
    }

    fn request_options(&self) -> RequestOptions {
        RequestOptions {
            ignore_warnings: self.ignore_warnings.then_some(true),
            ignore_errors: self.ignore_errors.then_some(true),
        }
    }

    /// Log in and build a reconciler for `kind`.
    async fn connect(&self, kind: ResourceKind) -> Result<MembershipReconciler<MgmtClient>> {
        let client = MgmtClient::new(self.client_config())?;
        client
            .login()
            .await
            .context("Failed to log in to management server")?;
        Ok(MembershipReconciler::new(client, kind).with_options(self.request_options()))
    }

    /// End the session unless it was handed in with --sid.
    async fn disconnect(&self, reconciler: &MembershipReconciler<MgmtClient>) {
        if self.sid.is_some() {
            return;
        }
        if let Err(e) = reconciler.store().logout().await {
            warn!("Logout failed: {}", e);
        }
    }
}

async fn load_tracked(path: &Path) -> Result<TrackedResource> {
    state_file::load(path)
        .await?
        .with_context(|| format!("No resource tracked in {}", path.display()))
}

/// Store the outcome of a lifecycle call in the state file.
async fn persist(path: &Path, kind: ResourceKind, outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Present { id, state } => {
            let tracked = TrackedResource::new(kind, &id, state);
            state_file::save(path, &tracked).await?;
            print_resource(&tracked);
        }
        Outcome::Absent => {
            state_file::clear(path).await?;
            println!("Group no longer exists; resource removed from state");
        }
    }
    Ok(())
}

/// Like [`persist`], but a failure that left a new relation behind still
/// records its identifier with the desired state.
async fn persist_result(
    path: &Path,
    kind: ResourceKind,
    desired: &MembershipState,
    result: std::result::Result<Outcome, ReconcileError>,
) -> Result<()> {
    match result {
        Ok(outcome) => persist(path, kind, outcome).await,
        Err(e) => {
            if let Some(id) = e.created_id() {
                warn!(%id, "Recording identifier of the created membership");
                state_file::save(path, &TrackedResource::new(kind, id, desired.clone())).await?;
            }
            Err(e.into())
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Show => {
            let tracked = load_tracked(&cli.state).await?;
            print_resource(&tracked);
        }

        Commands::Create { kind, desired } => {
            if state_file::load(&cli.state).await?.is_some() {
                bail!(
                    "{} already tracks a resource; delete it or use another --state",
                    cli.state.display()
                );
            }
            let desired = desired.to_state(*kind)?;
            let reconciler = cli.connect(*kind).await?;
            let result = reconciler.create(&desired).await;
            cli.disconnect(&reconciler).await;
            persist_result(&cli.state, *kind, &desired, result).await?;
        }

        Commands::Read => {
            let tracked = load_tracked(&cli.state).await?;
            let id = tracked.resource_id()?;
            let reconciler = cli.connect(tracked.kind).await?;
            let result = reconciler.read(&id).await;
            cli.disconnect(&reconciler).await;
            persist(&cli.state, tracked.kind, result?).await?;
        }

        Commands::Update { desired } => {
            let tracked = load_tracked(&cli.state).await?;
            let id = tracked.resource_id()?;
            let desired = desired.to_state(tracked.kind)?;
            let reconciler = cli.connect(tracked.kind).await?;
            let result = reconciler.update(&id, &tracked.state, &desired).await;
            cli.disconnect(&reconciler).await;
            persist_result(&cli.state, tracked.kind, &desired, result).await?;
        }

        Commands::Delete => {
            let tracked = load_tracked(&cli.state).await?;
            let id = tracked.resource_id()?;
            let reconciler = cli.connect(tracked.kind).await?;
            let result = reconciler.delete(&id, &tracked.state).await;
            cli.disconnect(&reconciler).await;
            result?;
            state_file::clear(&cli.state).await?;
            println!("Deleted {}", id);
        }

        Commands::Import { kind, id } => {
            let reconciler = cli.connect(*kind).await?;
            let result = reconciler.import(id).await;
            cli.disconnect(&reconciler).await;
            match result? {
                Outcome::Absent => bail!("Nothing to import: group of {} does not exist", id),
                outcome => persist(&cli.state, *kind, outcome).await?,
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fwmgmt=info,fwmgmt_groups=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!("Management server: {}", cli.server);

    run(&cli).await
}
