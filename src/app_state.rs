use std::sync::Arc;

use crate::config::Config;
use crate::db::MongoDB;
use crate::error::StoreError;
use crate::models::{
    department::Department,
    issue::{Issue, OldIssue},
    team::Team,
    user::User,
};
use crate::repository::{
    memory::{MemoryIssueLedger, MemoryRepository},
    mongo::MongoIssueLedger,
    IssueLedger, RepositoryObject,
};

#[derive(Clone)]
pub struct AppState {
    pub users: RepositoryObject<User>,
    pub departments: RepositoryObject<Department>,
    pub teams: RepositoryObject<Team>,
    pub issues: RepositoryObject<Issue>,
    pub old_issues: RepositoryObject<OldIssue>,
    pub ledger: Arc<dyn IssueLedger>,
    pub config: Config,
}

impl AppState {
    pub async fn mongo(mongodb: &MongoDB, config: Config) -> Result<Self, StoreError> {
        let users = mongodb.repository::<User>();
        users.ensure_index("email", true).await?;
        let departments = mongodb.repository::<Department>();
        departments.ensure_index("email_id", true).await?;
        let issues = mongodb.repository::<Issue>();
        issues.ensure_index("status", false).await?;
        let old_issues = mongodb.repository::<OldIssue>();
        old_issues.ensure_index("originalIssueId", false).await?;

        let ledger = MongoIssueLedger::new(
            mongodb.client.clone(),
            issues.collection.clone(),
            old_issues.collection.clone(),
        );

        Ok(Self {
            users: Arc::new(users),
            departments: Arc::new(departments),
            teams: Arc::new(mongodb.repository::<Team>()),
            issues: Arc::new(issues),
            old_issues: Arc::new(old_issues),
            ledger: Arc::new(ledger),
            config,
        })
    }

    pub fn in_memory(config: Config) -> Self {
        let issues = MemoryRepository::<Issue>::new();
        let old_issues = MemoryRepository::<OldIssue>::new();
        let ledger = MemoryIssueLedger::new(issues.clone(), old_issues.clone());

        Self {
            users: Arc::new(MemoryRepository::<User>::new().with_unique("email")),
            departments: Arc::new(MemoryRepository::<Department>::new().with_unique("email_id")),
            teams: Arc::new(MemoryRepository::<Team>::new()),
            issues: Arc::new(issues),
            old_issues: Arc::new(old_issues),
            ledger: Arc::new(ledger),
            config,
        }
    }
}
