// Record store client: table reads/writes, access policy, change notifications

use crate::access::{can_delete, effective_role};
use crate::error::{ClientError, ClientResult};
use crate::feed::{ChangeFeed, ChangeKind, Subscription};
use crate::filter::{Filter, OrderBy, SortDirection};
use crate::models::{
    AccountStatus, Actor, CATALOG_TABLE, Role, SUBMISSIONS_TABLE, SubmissionForm, SubmissionRecord,
    SystemUserAccount, ThesisCatalogEntry, USERS_TABLE, new_id, now_ms,
};
use crate::record::Record;
use crate::store::Store;
use eyre::Context;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// New account as entered in the admin dashboard
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Identity already created with the auth provider
    pub auth_id: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

/// New catalog row as produced by bulk ingestion
#[derive(Debug, Clone)]
pub struct NewCatalogEntry {
    pub barcode: String,
    pub title: String,
    pub authors: Vec<String>,
    pub department: String,
    pub publication_year: i32,
}

/// Shared handle to the store; cheap to clone across threads
#[derive(Clone)]
pub struct RecordStoreClient {
    store: Arc<Mutex<Store>>,
    feed: Arc<ChangeFeed>,
}

impl RecordStoreClient {
    pub fn open<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let mut store = Store::open(path)?;

        if store.take_reindex_pending() {
            let submissions = store.rebuild_indexes::<SubmissionRecord>()?;
            let catalog = store.rebuild_indexes::<ThesisCatalogEntry>()?;
            let users = store.rebuild_indexes::<SystemUserAccount>()?;
            info!(submissions, catalog, users, "Rebuilt table indexes after sync");
        }

        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            feed: ChangeFeed::new(),
        })
    }

    /// Force a rebuild of the query cache from the JSONL logs
    ///
    /// Returns the number of rows indexed across all tables.
    pub fn sync(&self) -> eyre::Result<usize> {
        let mut store = self.store()?;
        store.sync()?;
        store.take_reindex_pending();

        let rows = store.rebuild_indexes::<SubmissionRecord>()?
            + store.rebuild_indexes::<ThesisCatalogEntry>()?
            + store.rebuild_indexes::<SystemUserAccount>()?;
        drop(store);

        self.feed.notify(SUBMISSIONS_TABLE, ChangeKind::Update);
        Ok(rows)
    }

    pub fn feed(&self) -> &Arc<ChangeFeed> {
        &self.feed
    }

    fn store(&self) -> ClientResult<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| ClientError::Fetch("store lock poisoned".to_string()))
    }

    /// Load every row of `T`'s table ordered by one of its indexed fields
    pub fn load_all<T: Record>(&self, ordering_field: &str, direction: SortDirection) -> ClientResult<Vec<T>> {
        let order = OrderBy::new(ordering_field, direction);
        let rows = self
            .store()?
            .list_ordered::<T>(&[], &order)
            .with_context(|| format!("Failed to load {}", T::collection_name()))?;

        debug!(table = T::collection_name(), count = rows.len(), "Loaded table");
        Ok(rows)
    }

    /// Admin view read: all submissions, newest first
    pub fn load_submissions(&self) -> ClientResult<Vec<SubmissionRecord>> {
        self.load_all("submitted_at", SortDirection::Desc)
    }

    /// Notify subscribers of tables that another process wrote to
    ///
    /// Writes made through this client notify as they happen; this picks up
    /// the rest. Returns the number of tables signalled.
    pub fn poll_changes(&self) -> ClientResult<usize> {
        let tables = self
            .store()?
            .poll_external_changes()
            .context("Failed to check for external writes")?;

        for table in &tables {
            debug!(table = %table, "External write detected");
            self.feed.notify(table, ChangeKind::Update);
        }
        Ok(tables.len())
    }

    /// Register for change signals on `table`
    pub fn subscribe<F>(&self, table: &str, on_change: F) -> Subscription
    where
        F: Fn(ChangeKind) + Send + Sync + 'static,
    {
        self.feed.subscribe(table, on_change)
    }

    // ========================================================================
    // Submissions
    // ========================================================================

    /// Public form path: validate, insert, notify
    pub fn insert_submission(&self, form: &SubmissionForm) -> ClientResult<SubmissionRecord> {
        let record = form.validate(new_id(), now_ms())?;

        self.store()?
            .create(record.clone())
            .context("Failed to insert submission")?;

        info!(id = %record.id, category = %record.category(), "Submission received");
        self.feed.notify(SUBMISSIONS_TABLE, ChangeKind::Insert);
        Ok(record)
    }

    /// Hard delete a submission; Admin only
    pub fn delete_submission(&self, actor: &Actor, id: &str) -> ClientResult<()> {
        {
            let mut store = self.store()?;
            Self::require_admin(&store, actor, "delete submissions")?;

            let removed = store
                .delete::<SubmissionRecord>(id)
                .context("Failed to delete submission")?;
            if !removed {
                return Err(ClientError::Fetch(format!("submission {} not found", id)));
            }
        }

        info!(id, actor = %actor.auth_id, "Submission deleted");
        self.feed.notify(SUBMISSIONS_TABLE, ChangeKind::Delete);
        Ok(())
    }

    // ========================================================================
    // Access policy
    // ========================================================================

    /// Role for `auth_id`: look up the account, then fall back to the default
    pub fn resolve_role(&self, auth_id: &str) -> ClientResult<Role> {
        let store = self.store()?;
        Ok(effective_role(Self::find_account(&store, auth_id)?.as_ref()))
    }

    fn find_account(store: &Store, auth_id: &str) -> ClientResult<Option<SystemUserAccount>> {
        let accounts: Vec<SystemUserAccount> = store
            .list(&[Filter::eq("auth_id", auth_id)])
            .context("Failed to look up account")?;
        Ok(accounts.into_iter().next())
    }

    /// Store-side check, independent of whatever role the caller holds
    fn require_admin(store: &Store, actor: &Actor, action: &str) -> ClientResult<()> {
        let role = effective_role(Self::find_account(store, &actor.auth_id)?.as_ref());
        if can_delete(role) {
            return Ok(());
        }

        warn!(actor = %actor.auth_id, %role, action, "Rejected by access policy");
        Err(ClientError::permission(format!("{} role cannot {}", role, action)))
    }

    // ========================================================================
    // System users
    // ========================================================================

    pub fn load_users(&self) -> ClientResult<Vec<SystemUserAccount>> {
        self.load_all("created_at", SortDirection::Desc)
    }

    /// Add an account; Admin only once any account exists
    pub fn insert_user(&self, actor: Option<&Actor>, user: NewUser) -> ClientResult<SystemUserAccount> {
        let account = {
            let mut store = self.store()?;

            let existing: Vec<SystemUserAccount> = store.list(&[]).context("Failed to list accounts")?;
            if !existing.is_empty() {
                let actor = actor.ok_or_else(|| ClientError::permission("sign in to add accounts"))?;
                Self::require_admin(&store, actor, "add accounts")?;
            }
            if existing.iter().any(|a| a.auth_id == user.auth_id) {
                return Err(ClientError::Fetch(format!("account for {} already exists", user.auth_id)));
            }

            let account = SystemUserAccount {
                id: new_id(),
                auth_id: user.auth_id,
                display_name: user.display_name,
                email: user.email,
                role: user.role,
                status: AccountStatus::Active,
                last_login_at: None,
                created_at: now_ms(),
            };
            store.create(account.clone()).context("Failed to insert account")?;
            account
        };

        info!(id = %account.id, role = %account.role, "Account created");
        self.feed.notify(USERS_TABLE, ChangeKind::Insert);
        Ok(account)
    }

    pub fn delete_user(&self, actor: &Actor, id: &str) -> ClientResult<()> {
        {
            let mut store = self.store()?;
            Self::require_admin(&store, actor, "remove accounts")?;

            if !store.delete::<SystemUserAccount>(id).context("Failed to delete account")? {
                return Err(ClientError::Fetch(format!("account {} not found", id)));
            }
        }

        info!(id, "Account removed");
        self.feed.notify(USERS_TABLE, ChangeKind::Delete);
        Ok(())
    }

    /// Stamp a sign-in on the account for `auth_id`, if there is one
    pub fn record_login(&self, auth_id: &str) -> ClientResult<Option<SystemUserAccount>> {
        let updated = {
            let mut store = self.store()?;
            let Some(mut account) = Self::find_account(&store, auth_id)? else {
                return Ok(None);
            };
            account.last_login_at = Some(now_ms().max(account.created_at));
            store.update(account.clone()).context("Failed to record login")?;
            account
        };

        self.feed.notify(USERS_TABLE, ChangeKind::Update);
        Ok(Some(updated))
    }

    // ========================================================================
    // Thesis catalog
    // ========================================================================

    /// Default catalog read: non-deleted rows, newest upload first
    pub fn load_catalog(&self) -> ClientResult<Vec<ThesisCatalogEntry>> {
        let order = OrderBy::new("uploaded_at", SortDirection::Desc);
        let rows = self
            .store()?
            .list_ordered(&[Filter::eq("deleted", false)], &order)
            .context("Failed to load catalog")?;
        Ok(rows)
    }

    pub fn insert_catalog_entry(&self, entry: NewCatalogEntry) -> ClientResult<ThesisCatalogEntry> {
        let barcode = entry.barcode.trim().to_string();
        if barcode.is_empty() {
            return Err(crate::error::ValidationError::MissingField("Barcode").into());
        }

        let row = {
            let mut store = self.store()?;
            let previous = store
                .get::<ThesisCatalogEntry>(&barcode)
                .context("Failed to check barcode")?;
            if previous.as_ref().is_some_and(|existing| !existing.deleted) {
                return Err(ClientError::Fetch(format!("barcode {} already catalogued", barcode)));
            }

            // A re-upload must outrank the soft-deleted version in the log
            let now = previous.map_or(now_ms(), |p| now_ms().max(p.updated_at + 1));
            let row = ThesisCatalogEntry {
                barcode,
                title: entry.title,
                authors: entry.authors,
                department: entry.department,
                publication_year: entry.publication_year,
                uploaded_at: now,
                updated_at: now,
                deleted: false,
            };
            store.create(row.clone()).context("Failed to insert catalog entry")?;
            row
        };

        self.feed.notify(CATALOG_TABLE, ChangeKind::Insert);
        Ok(row)
    }

    /// Set the soft-delete flag; Admin only
    pub fn soft_delete_catalog_entry(&self, actor: &Actor, barcode: &str) -> ClientResult<()> {
        {
            let mut store = self.store()?;
            Self::require_admin(&store, actor, "remove catalog entries")?;

            let mut row = store
                .get::<ThesisCatalogEntry>(barcode)
                .context("Failed to read catalog entry")?
                .filter(|row| !row.deleted)
                .ok_or_else(|| ClientError::Fetch(format!("catalog entry {} not found", barcode)))?;

            row.deleted = true;
            row.updated_at = now_ms().max(row.updated_at + 1);
            store.update(row).context("Failed to soft-delete catalog entry")?;
        }

        info!(barcode, "Catalog entry soft-deleted");
        self.feed.notify(CATALOG_TABLE, ChangeKind::Update);
        Ok(())
    }
}
