pub mod models;
pub mod queries;

use anyhow::{Context, Result};
use mongodb::{Client, Database, IndexModel, bson::doc, options::IndexOptions};

const DEFAULT_DB_NAME: &str = "medai";

/// Create the MongoDB connection. Opened once at process start and shared
/// by every request through the application state.
pub async fn create_client(uri: &str) -> Result<Client> {
    let client = Client::with_uri_str(uri)
        .await
        .context("Failed to connect to MongoDB")?;

    // Ping to verify connection
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .context("Failed to ping MongoDB")?;

    tracing::info!("Successfully connected to MongoDB");
    Ok(client)
}

/// Get the database handle, honoring an explicit name override before
/// falling back to the one embedded in the connection string.
pub fn get_database(client: &Client, name_override: Option<&str>) -> Database {
    match name_override {
        Some(name) => client.database(name),
        None => client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DB_NAME)),
    }
}

/// Ensure the indexes the data model relies on. The unique email index is
/// load-bearing: it is what makes two concurrent registrations with the
/// same address race safely (at most one insert succeeds).
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    let users = db.collection::<models::User>("users");
    users
        .create_index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await
        .context("Failed to create unique email index")?;

    let analyses = db.collection::<models::Analysis>("analyses");
    analyses
        .create_index(
            IndexModel::builder()
                .keys(doc! { "userId": 1, "createdAt": -1 })
                .build(),
        )
        .await
        .context("Failed to create analysis history index")?;

    Ok(())
}
