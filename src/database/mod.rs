use mongodb::{Client, Collection, Database};
use std::error::Error;

pub const USERS: &str = "users";
pub const PAPERS: &str = "research_papers";
pub const REVIEWS: &str = "reviews";
pub const PAYMENTS: &str = "payments";
pub const EARNINGS: &str = "researcher_earnings";

#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

/// Database name from the URI path, e.g. `mongodb://host/ScholarShare?x=y`
pub fn database_name_from_uri(uri: &str) -> &str {
    let without_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    without_scheme
        .split_once('/')
        .map(|(_, path)| path.split('?').next().unwrap_or(""))
        .filter(|name| !name.is_empty())
        .unwrap_or("ScholarShare")
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, Box<dyn Error>> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(2);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        let db_name = database_name_from_uri(uri);
        let db = client.database(db_name);

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { db };
        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Creates necessary indexes (unique constraints included)
    async fn ensure_indexes(&self) -> Result<(), Box<dyn Error>> {
        use mongodb::bson::{doc, Document};
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        log::info!("🔧 Creating database indexes...");

        let unique = || IndexOptions::builder().unique(true).build();

        let indexes: Vec<(&str, IndexModel, &str)> = vec![
            (
                USERS,
                IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build(),
                "users(email) unique",
            ),
            (
                USERS,
                IndexModel::builder().keys(doc! { "user_id": 1 }).options(unique()).build(),
                "users(user_id) unique",
            ),
            (
                PAPERS,
                IndexModel::builder().keys(doc! { "status": 1, "created_at": -1 }).build(),
                "research_papers(status, created_at)",
            ),
            (
                PAPERS,
                IndexModel::builder().keys(doc! { "author_id": 1 }).build(),
                "research_papers(author_id)",
            ),
            (
                PAPERS,
                IndexModel::builder().keys(doc! { "status": 1, "checks.status": 1 }).build(),
                "research_papers(status, checks.status)",
            ),
            (
                REVIEWS,
                IndexModel::builder()
                    .keys(doc! { "paper_id": 1, "reviewer_id": 1 })
                    .options(unique())
                    .build(),
                "reviews(paper_id, reviewer_id) unique",
            ),
            (
                PAYMENTS,
                IndexModel::builder().keys(doc! { "user_id": 1, "kind": 1, "status": 1 }).build(),
                "payments(user_id, kind, status)",
            ),
            (
                PAYMENTS,
                IndexModel::builder().keys(doc! { "stripe_session_id": 1 }).build(),
                "payments(stripe_session_id)",
            ),
            (
                EARNINGS,
                IndexModel::builder().keys(doc! { "researcher_id": 1 }).options(unique()).build(),
                "researcher_earnings(researcher_id) unique",
            ),
        ];

        for (collection, index, label) in indexes {
            match self.collection::<Document>(collection).create_index(index).await {
                Ok(_) => log::info!("   ✅ Index created: {}", label),
                Err(e) => log::debug!("   ℹ️  Index already exists: {} ({})", label, e),
            }
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub async fn health_check(&self) -> bool {
        self.db
            .run_command(mongodb::bson::doc! { "ping": 1 })
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_name_from_uri() {
        assert_eq!(database_name_from_uri("mongodb://localhost:27017/Papers"), "Papers");
        assert_eq!(
            database_name_from_uri("mongodb+srv://u:p@cluster.example.net/Scholar?retryWrites=true"),
            "Scholar"
        );
        assert_eq!(database_name_from_uri("mongodb://localhost:27017"), "ScholarShare");
        assert_eq!(database_name_from_uri("mongodb://localhost:27017/"), "ScholarShare");
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_mongodb_connection() {
        dotenv::dotenv().ok();
        let uri = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017/ScholarShareTest".to_string());
        let db = MongoDB::new(&uri).await;
        assert!(db.is_ok());
        assert!(db.unwrap().health_check().await);
    }
}
