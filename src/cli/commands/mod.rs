use anyhow::Result;
use std::sync::Arc;

use super::{Cli, Commands};
use crate::config::OrchestratorConfig;
use crate::database::DatabaseManager;
use crate::jobs::SqliteJobQueue;
use crate::service::StoreService;
use crate::store::SqliteStoreRepository;

pub mod stores;
pub mod worker;

/// Shared handles every database-backed command needs
pub struct AppContext {
    pub config: OrchestratorConfig,
    pub database: DatabaseManager,
    pub repository: Arc<SqliteStoreRepository>,
    pub queue: Arc<SqliteJobQueue>,
}

impl AppContext {
    pub async fn connect(config: OrchestratorConfig) -> Result<Self> {
        let database = DatabaseManager::new(&config.database).await?;
        let repository = Arc::new(SqliteStoreRepository::new(database.pool().clone()));
        let queue = Arc::new(SqliteJobQueue::new(
            database.pool().clone(),
            config.worker.poll_interval(),
            config.worker.visibility_timeout(),
        ));
        Ok(Self {
            config,
            database,
            repository,
            queue,
        })
    }

    pub fn service(&self) -> StoreService {
        StoreService::new(self.repository.clone(), self.queue.clone())
    }
}

/// Run a parsed command line against resolved configuration
pub async fn execute(cli: Cli, config: OrchestratorConfig) -> Result<()> {
    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let context = AppContext::connect(config).await?;
    let result = match cli.command {
        Commands::Worker => worker::WorkerCommand.execute(&context).await,
        Commands::Create {
            name,
            engine,
            admin_user,
            admin_password,
        } => {
            stores::CreateCommand {
                name,
                engine,
                admin_user,
                admin_password,
            }
            .execute(&context)
            .await
        }
        Commands::Delete { id } => stores::DeleteCommand { id }.execute(&context).await,
        Commands::Show { id, all } => stores::ShowCommand { id, all }.execute(&context).await,
        Commands::List { all } => stores::ListCommand { all }.execute(&context).await,
        Commands::Audit { id } => stores::AuditCommand { id }.execute(&context).await,
        Commands::Config => Ok(()),
    };

    context.database.shutdown().await;
    result
}
