// thesisdesk - Thesis submission intake and administration over SQLite+JSONL

pub mod access;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod feed;
pub mod filter;
pub mod jsonl;
pub mod models;
pub mod query;
pub mod record;
pub mod store;
pub mod view;

// Re-export main types for convenience
pub use client::{NewCatalogEntry, NewUser, RecordStoreClient};
pub use config::Config;
pub use error::{ClientError, ClientResult, ValidationError};
pub use export::{EXPORT_FILENAME, export_csv, write_export};
pub use feed::{ChangeFeed, ChangeKind, Subscription};
pub use filter::{Filter, FilterOp, OrderBy, SortDirection};
pub use models::{
    AccountStatus, Actor, Affiliation, Campus, Role, SubmissionForm, SubmissionRecord, SubmitterCategory,
    SystemUserAccount, ThesisCatalogEntry, now_ms,
};
pub use query::{Criteria, SearchField, Selection, SortKey, filter_sort, search_catalog};
pub use record::{IndexValue, Record};
pub use store::Store;
pub use view::{Notice, Pumped, RecordsView, ViewState};
