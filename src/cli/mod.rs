use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::store::StoreEngine;

pub mod commands;

#[derive(Parser)]
#[command(name = "storefleet")]
#[command(version)]
#[command(about = "Provision and tear down storefronts on Kubernetes through queued jobs")]
#[command(long_about = "storefleet accepts create/delete requests, records them in its database and \
                       queues a job for each. Run 'storefleet worker' to process the queue: it installs \
                       the store chart with helm, configures the storefront in-container and keeps an \
                       audit trail of every step.")]
pub struct Cli {
    /// Configuration file layered over storefleet.toml and the defaults
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process provisioning and deletion jobs until interrupted
    Worker,
    /// Queue a new store for provisioning
    Create {
        /// Store name; also the basis of its namespace and hostname
        name: String,
        /// Storefront engine
        #[arg(long, default_value = "woocommerce")]
        engine: StoreEngine,
        /// Admin login (defaults to "admin")
        #[arg(long)]
        admin_user: Option<String>,
        /// Admin password (generated when omitted)
        #[arg(long)]
        admin_password: Option<String>,
    },
    /// Queue a READY or FAILED store for deletion
    Delete {
        id: Uuid,
    },
    /// Show one store
    Show {
        id: Uuid,
        /// Include deleted stores
        #[arg(long)]
        all: bool,
    },
    /// List stores
    List {
        /// Include deleted stores
        #[arg(long)]
        all: bool,
    },
    /// Show a store's audit trail, newest first
    Audit {
        id: Uuid,
    },
    /// Print the resolved configuration as TOML
    Config,
}
