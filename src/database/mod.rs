use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::error::Error;

pub const USERS: &str = "users";
pub const LETTERS: &str = "letters";

#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, Box<dyn Error>> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        // Connection pool
        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(2);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        let db = client.database(database_name(uri));

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { db };

        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Creates the indexes used by user lookups and letter listings
    async fn ensure_indexes(&self) -> Result<(), Box<dyn Error>> {
        log::info!("🔧 Creating database indexes...");

        let users = self.collection::<mongodb::bson::Document>(USERS);

        let user_id_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        match users.create_index(user_id_index).await {
            Ok(_) => log::info!("   ✅ Index created: users(user_id) unique"),
            Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
        }

        let user_email_index = IndexModel::builder().keys(doc! { "email": 1 }).build();

        match users.create_index(user_email_index).await {
            Ok(_) => log::info!("   ✅ Index created: users(email)"),
            Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
        }

        let letters = self.collection::<mongodb::bson::Document>(LETTERS);

        // letters(user_id, updated_at) - listar cartas do dono
        let letters_owner_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "updated_at": -1 })
            .build();

        match letters.create_index(letters_owner_index).await {
            Ok(_) => log::info!("   ✅ Index created: letters(user_id, updated_at)"),
            Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
        }

        // letters(collaborators) - cartas compartilhadas
        let letters_shared_index = IndexModel::builder()
            .keys(doc! { "collaborators": 1 })
            .build();

        match letters.create_index(letters_shared_index).await {
            Ok(_) => log::info!("   ✅ Index created: letters(collaborators)"),
            Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    pub async fn ping(&self) -> bool {
        self.db.run_command(doc! { "ping": 1 }).await.is_ok()
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    /// Handle that never reached a server; for code paths that fail before any query
    #[cfg(test)]
    pub(crate) async fn unconnected() -> Self {
        let client = Client::with_uri_str("mongodb://127.0.0.1:1/letters_test?serverSelectionTimeoutMS=200")
            .await
            .expect("static test URI parses");
        Self {
            db: client.database("letters_test"),
        }
    }
}

/// Extracts the database name from the URI path, or `letters` when absent.
pub fn database_name(uri: &str) -> &str {
    let without_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    without_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .and_then(|path| path.split('?').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("letters")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_from_uri() {
        assert_eq!(database_name("mongodb://localhost:27017/letters_prod"), "letters_prod");
        assert_eq!(
            database_name("mongodb+srv://u:p@cluster.mongodb.net/app?retryWrites=true"),
            "app"
        );
        assert_eq!(database_name("mongodb://localhost:27017"), "letters");
        assert_eq!(database_name("mongodb://localhost:27017/?w=majority"), "letters");
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_mongodb_connection() {
        dotenv::dotenv().ok();
        let uri = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017/letters_test".to_string());

        let db = MongoDB::new(&uri).await;
        assert!(db.is_ok());
        assert!(db.unwrap().ping().await);
    }
}
