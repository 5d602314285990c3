use anyhow::Result;
use uuid::Uuid;

use super::AppContext;
use crate::service::CreateStoreRequest;
use crate::store::{AuditLogEntry, Store, StoreEngine};

pub struct CreateCommand {
    pub name: String,
    pub engine: StoreEngine,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
}

impl CreateCommand {
    pub async fn execute(self, context: &AppContext) -> Result<()> {
        let created = context
            .service()
            .create_store(CreateStoreRequest {
                name: self.name,
                engine: self.engine,
                admin_user: self.admin_user,
                admin_password: self.admin_password,
            })
            .await?;

        println!("✅ Store queued for provisioning");
        print_store(&created.store);
        println!();
        // Shown once; there is no way to read it back later.
        println!("🔑 Admin user:     {}", created.credentials.admin_user);
        println!("🔑 Admin password: {}", created.credentials.admin_password);
        Ok(())
    }
}

pub struct DeleteCommand {
    pub id: Uuid,
}

impl DeleteCommand {
    pub async fn execute(self, context: &AppContext) -> Result<()> {
        let store = context.service().delete_store(self.id).await?;
        println!("🗑️  Store queued for deletion");
        print_store(&store);
        Ok(())
    }
}

pub struct ShowCommand {
    pub id: Uuid,
    pub all: bool,
}

impl ShowCommand {
    pub async fn execute(self, context: &AppContext) -> Result<()> {
        let store = context.service().get_store(self.id, self.all).await?;
        print_store(&store);
        Ok(())
    }
}

pub struct ListCommand {
    pub all: bool,
}

impl ListCommand {
    pub async fn execute(self, context: &AppContext) -> Result<()> {
        let stores = context.service().list_stores(self.all).await?;
        if stores.is_empty() {
            println!("No stores");
            return Ok(());
        }

        println!("{:<36}  {:<24}  {:<12}  URL", "ID", "NAME", "STATUS");
        for store in stores {
            println!(
                "{:<36}  {:<24}  {:<12}  {}",
                store.id,
                store.name,
                store.status,
                store.url.as_deref().unwrap_or("-")
            );
        }
        Ok(())
    }
}

pub struct AuditCommand {
    pub id: Uuid,
}

impl AuditCommand {
    pub async fn execute(self, context: &AppContext) -> Result<()> {
        let trail = context.service().audit_trail(self.id).await?;
        for entry in &trail {
            print_audit_entry(entry);
        }
        Ok(())
    }
}

fn print_store(store: &Store) {
    println!("   ID:      {}", store.id);
    println!("   Name:    {}", store.name);
    println!("   Engine:  {}", store.engine);
    println!("   Status:  {}", store.status);
    println!("   URL:     {}", store.url.as_deref().unwrap_or("-"));
    println!("   Admin:   {}", store.admin_url().as_deref().unwrap_or("-"));
    println!("   Created: {}", store.created_at.to_rfc3339());
}

fn print_audit_entry(entry: &AuditLogEntry) {
    if entry.details.is_empty() {
        println!("{}  {}", entry.timestamp.to_rfc3339(), entry.event);
    } else {
        println!("{}  {}  {}", entry.timestamp.to_rfc3339(), entry.event, entry.details);
    }
}
