//! Database connection utilities.

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

/// Pragmas applied to every SQLite connection.
///
/// WAL lets the registry's readers run next to worker upserts, the busy
/// timeout absorbs lock contention from up to `workers` concurrent writers,
/// and `NORMAL` sync is safe under WAL.
const SQLITE_PRAGMAS: [&str; 3] = [
    "PRAGMA journal_mode=WAL",
    "PRAGMA busy_timeout=5000",
    "PRAGMA synchronous=NORMAL",
];

fn is_sqlite_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite:")
}

async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    for pragma in SQLITE_PRAGMAS {
        db.execute(Statement::from_string(backend, pragma.to_string()))
            .await?;
    }
    Ok(())
}

/// Open a connection to `database_url` (e.g. `sqlite://crmsync.db?mode=rwc`).
///
/// SQLite connections get WAL journaling, a 5 second busy timeout and
/// `synchronous=NORMAL`.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;
    if is_sqlite_url(database_url) {
        configure_sqlite(&db).await?;
    }
    Ok(db)
}

/// Open a connection and bring the schema up to date.
///
/// ```ignore
/// let db = crmsync::connect_and_migrate("sqlite::memory:").await?;
/// ```
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = connect(database_url).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}
