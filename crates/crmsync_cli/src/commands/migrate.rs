use crmsync::db;
use crmsync::migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;

use crate::MigrateAction;

/// Applied and pending migration names after an action ran.
#[derive(Debug, Default)]
struct SchemaReport {
    applied: Vec<String>,
    pending: Vec<String>,
}

impl SchemaReport {
    async fn read(db: &DatabaseConnection) -> Result<Self, sea_orm::DbErr> {
        let applied = Migrator::get_applied_migrations(db).await?;
        let pending = Migrator::get_pending_migrations(db).await?;
        Ok(Self {
            applied: applied.iter().map(|m| m.name().to_string()).collect(),
            pending: pending.iter().map(|m| m.name().to_string()).collect(),
        })
    }
}

async fn apply(
    db: &DatabaseConnection,
    action: &MigrateAction,
) -> Result<SchemaReport, sea_orm::DbErr> {
    match action {
        MigrateAction::Up => Migrator::up(db, None).await?,
        // One step at a time; the schema has a single migration today.
        MigrateAction::Down => Migrator::down(db, Some(1)).await?,
        MigrateAction::Status => {}
        MigrateAction::Fresh => Migrator::fresh(db).await?,
    }
    SchemaReport::read(db).await
}

pub(crate) async fn handle_migrate(
    action: MigrateAction,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = db::connect(database_url).await?;
    let report = apply(&db, &action).await?;

    match action {
        MigrateAction::Status => {
            for name in &report.applied {
                println!("  applied  {name}");
            }
            for name in &report.pending {
                println!("  pending  {name}");
            }
        }
        MigrateAction::Down => println!(
            "Rolled back. {} applied, {} pending.",
            report.applied.len(),
            report.pending.len()
        ),
        MigrateAction::Up | MigrateAction::Fresh => {
            println!("Schema up to date ({} applied).", report.applied.len())
        }
    }

    Ok(())
}
