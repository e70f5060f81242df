//! cfsec: apply security group bindings and entitlements from a manifest.
//!
//! Remote state is read from and written back to a JSON state file, which
//! also records the id and last applied spec of each resource:
//! - `plan` shows the bind/unbind and entitle/revoke calls `apply` would make
//! - `apply` creates or updates both resources
//! - `read` prints the manifest as it currently exists remotely
//! - `destroy` unbinds and revokes everything the recorded resources refresh to
//! - `import` records an existing resource id against the manifest

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use cfsec_reconcile::{
    BindAsg, BindAsgSpec, CancellationToken, Diff, EntitleAsg, EntitleAsgSpec, MemoryStore,
    Reconciler, RelationKind, ResourceStatus,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod state;

use state::{Manifest, Recorded, Resources, StateFile};

/// cfsec - security group bindings and entitlements
#[derive(Parser, Debug)]
#[command(name = "cfsec", version, about)]
struct Args {
    /// Manifest with `bind`, `force` and `entitle` blocks
    #[arg(long, env = "CFSEC_MANIFEST", default_value = "cfsec.json")]
    manifest: PathBuf,

    /// State file holding remote associations and recorded resources
    #[arg(long, env = "CFSEC_STATE", default_value = "cfsec.state.json")]
    state: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "cfsec=info,cfsec_reconcile=info,audit=info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what apply would change
    Plan,
    /// Converge remote state to the manifest
    Apply,
    /// Print the manifest refreshed from remote state
    Read,
    /// Remove everything the recorded resources refresh to
    Destroy,
    /// Record an existing resource id so apply updates it in place
    Import {
        #[arg(value_enum)]
        resource: ResourceName,
        id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ResourceName {
    BindAsg,
    EntitleAsg,
}

/// Both resources over their stores, plus what has been recorded so far.
struct Session {
    bind: BindAsg<MemoryStore>,
    entitle: EntitleAsg<MemoryStore>,
    resources: Resources,
}

impl Session {
    fn open(state: StateFile) -> Self {
        Self {
            bind: BindAsg::new(MemoryStore::from_snapshot(state.spaces)),
            entitle: EntitleAsg::new(MemoryStore::from_snapshot(state.organizations)),
            resources: state.resources,
        }
    }

    async fn into_state(self) -> StateFile {
        StateFile {
            spaces: self.bind.reconciler().store().snapshot().await,
            organizations: self.entitle.reconciler().store().snapshot().await,
            resources: self.resources,
        }
    }

    /// Recorded specs refreshed from remote state, or empty specs.
    async fn refreshed(&self) -> Result<(BindAsgSpec, EntitleAsgSpec)> {
        let bind = match &self.resources.bind_asg {
            Some(recorded) => self.bind.read(&recorded.spec).await?,
            None => BindAsgSpec::default(),
        };
        let entitle = match &self.resources.entitle_asg {
            Some(recorded) => self.entitle.read(&recorded.spec).await?,
            None => EntitleAsgSpec::default(),
        };
        Ok((bind, entitle))
    }

    /// Unrecorded resources are planned the way `create` applies them.
    async fn plan(&self, manifest: &Manifest) -> Result<String> {
        let bind = match &self.resources.bind_asg {
            Some(recorded) => {
                let prior = self.bind.read(&recorded.spec).await?;
                self.bind.plan(&prior, &manifest.bind_asg).await?
            }
            None => self.bind.plan_create(&manifest.bind_asg).await?,
        };
        let entitle = match &self.resources.entitle_asg {
            Some(recorded) => {
                let prior = self.entitle.read(&recorded.spec).await?;
                self.entitle.plan(&prior, &manifest.entitle_asg).await?
            }
            None => self.entitle.plan_create(&manifest.entitle_asg).await?,
        };

        let mut out = render_diff("bind_asg", RelationKind::SpaceBinding, &bind);
        out.push_str(&render_diff(
            "entitle_asg",
            RelationKind::OrgEntitlement,
            &entitle,
        ));
        Ok(out)
    }

    async fn apply(&mut self, manifest: &Manifest, cancel: &CancellationToken) -> Result<()> {
        let (prior_bind, prior_entitle) = self.refreshed().await?;

        let spec = &manifest.bind_asg;
        let id = match &self.resources.bind_asg {
            Some(recorded) => {
                let status = self
                    .bind
                    .reconcile(&recorded.id, &prior_bind, spec, cancel)
                    .await
                    .context("bind_asg")?;
                report("bind_asg", &status);
                recorded.id.clone()
            }
            None => self.bind.create(spec, cancel).await.context("bind_asg")?,
        };
        self.resources.bind_asg = Some(Recorded {
            id,
            spec: spec.clone(),
        });

        let spec = &manifest.entitle_asg;
        let id = match &self.resources.entitle_asg {
            Some(recorded) => {
                let status = self
                    .entitle
                    .reconcile(&recorded.id, &prior_entitle, spec, cancel)
                    .await
                    .context("entitle_asg")?;
                report("entitle_asg", &status);
                recorded.id.clone()
            }
            None => self
                .entitle
                .create(spec, cancel)
                .await
                .context("entitle_asg")?,
        };
        self.resources.entitle_asg = Some(Recorded {
            id,
            spec: spec.clone(),
        });

        Ok(())
    }

    async fn read(&self) -> Result<Manifest> {
        let (bind_asg, entitle_asg) = self.refreshed().await?;
        Ok(Manifest {
            bind_asg,
            entitle_asg,
        })
    }

    /// Record `id` for `resource`, tracking the manifest's declared relations.
    fn import(&mut self, resource: ResourceName, id: &str, manifest: &Manifest) {
        let id = cfsec_reconcile::resource::import(id);
        info!("Imported {:?} {}", resource, id);
        match resource {
            ResourceName::BindAsg => {
                self.resources.bind_asg = Some(Recorded {
                    id,
                    spec: manifest.bind_asg.clone(),
                })
            }
            ResourceName::EntitleAsg => {
                self.resources.entitle_asg = Some(Recorded {
                    id,
                    spec: manifest.entitle_asg.clone(),
                })
            }
        }
    }

    /// Finalize what each recorded resource refreshes to, which with `force`
    /// and admin privilege is every observed binding.
    async fn destroy(&mut self, cancel: &CancellationToken) -> Result<()> {
        if let Some(recorded) = &self.resources.bind_asg {
            let spec = self.bind.read(&recorded.spec).await?;
            self.bind
                .finalize(&recorded.id, &spec, cancel)
                .await
                .context("bind_asg")?;
            self.resources.bind_asg = None;
        }
        if let Some(recorded) = &self.resources.entitle_asg {
            let spec = self.entitle.read(&recorded.spec).await?;
            self.entitle
                .finalize(&recorded.id, &spec, cancel)
                .await
                .context("entitle_asg")?;
            self.resources.entitle_asg = None;
        }
        Ok(())
    }
}

fn render_diff(resource: &str, kind: RelationKind, diff: &Diff) -> String {
    let mut out = String::new();
    if diff.is_empty() {
        let _ = writeln!(out, "{resource}: no changes");
        return out;
    }
    let _ = writeln!(out, "{resource}:");
    for relation in &diff.to_remove {
        let _ = writeln!(out, "  - {} {}", kind.remove_op(), relation);
    }
    for relation in &diff.to_add {
        let _ = writeln!(out, "  + {} {}", kind.add_op(), relation);
    }
    out
}

fn report(resource: &str, status: &ResourceStatus) {
    if status.converged {
        info!(
            "{} {}: +{} -{}{}",
            resource,
            status.id,
            status.added,
            status.removed,
            if status.adopted { " (adopted)" } else { "" }
        );
    } else {
        warn!("{} {} did not converge", resource, status.id);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling after the in-flight call");
            on_signal.cancel();
        }
    });

    let state = state::load_state(&args.state).await?;
    let mut session = Session::open(state);

    match args.command {
        Command::Plan => {
            let manifest = state::load_manifest(&args.manifest).await?;
            print!("{}", session.plan(&manifest).await?);
            Ok(())
        }
        Command::Read => {
            let manifest = session.read().await?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            Ok(())
        }
        Command::Apply => {
            let manifest = state::load_manifest(&args.manifest).await?;
            let result = session.apply(&manifest, &cancel).await;
            // partial progress is real remote state, persist it either way
            state::save_state(&args.state, &session.into_state().await).await?;
            result
        }
        Command::Destroy => {
            let result = session.destroy(&cancel).await;
            state::save_state(&args.state, &session.into_state().await).await?;
            result
        }
        Command::Import { resource, id } => {
            let manifest = state::load_manifest(&args.manifest).await?;
            session.import(resource, &id, &manifest);
            state::save_state(&args.state, &session.into_state().await).await
        }
    }
}
