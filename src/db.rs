use log::info;
use mongodb::{options::ClientOptions, Client, Database};

use crate::error::StoreError;
use crate::repository::{mongo::MongoRepository, Entity};

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        info!("Connected to MongoDB database {}", db_name);
        Ok(MongoDB { client, db })
    }

    pub fn repository<T: Entity + Send + Sync>(&self) -> MongoRepository<T> {
        MongoRepository::new(self.db.collection::<T>(T::COLLECTION))
    }
}
