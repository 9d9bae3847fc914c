use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use eyre::{Result, eyre};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use thesisdesk::{
    Actor, Campus, Config, Criteria, NewCatalogEntry, NewUser, Notice, Pumped, RecordStoreClient,
    RecordsView, Role, SearchField, Selection, SortDirection, SortKey, SubmissionForm, SubmissionRecord,
    SubmitterCategory, search_catalog, write_export,
};

#[derive(Parser)]
#[command(name = "thesisdesk")]
#[command(about = "Thesis submission intake and administration")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Config file (default: <config dir>/thesisdesk/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the store (overrides config)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Auth id of the signed-in admin (overrides config)
    #[arg(short, long)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a thesis through the public form
    Submit(SubmitArgs),

    /// List submissions
    List(CriteriaArgs),

    /// Export the filtered submissions to thesis_submissions.csv
    Export {
        #[command(flatten)]
        criteria: CriteriaArgs,

        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete a submission (Admin only)
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Keep the list on screen, reloading on every change
    Watch(CriteriaArgs),

    /// Manage the thesis catalog
    #[command(subcommand)]
    Catalog(CatalogCommands),

    /// Manage system user accounts
    #[command(subcommand)]
    Users(UserCommands),

    /// Rebuild the SQLite cache from JSONL files
    Sync,
}

#[derive(Args)]
struct SubmitArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    category: SubmitterCategory,

    /// Institutional id (affiliated only)
    #[arg(long)]
    id_number: Option<String>,

    /// Institution name (external only)
    #[arg(long)]
    institution: Option<String>,

    #[arg(long)]
    campus: Campus,

    /// Program (affiliated only)
    #[arg(long)]
    program: Option<String>,

    #[arg(long)]
    title: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum FieldArg {
    All,
    Name,
    Id,
    Program,
    Title,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Date,
    Name,
    Campus,
    Title,
    Category,
}

#[derive(Args)]
struct CriteriaArgs {
    /// Case-insensitive search term
    #[arg(long, default_value = "")]
    search: String,

    /// Field the search term applies to
    #[arg(long, value_enum, default_value = "all")]
    field: FieldArg,

    /// affiliated, external or all
    #[arg(long, default_value = "all")]
    category: String,

    /// Campus name or all
    #[arg(long, default_value = "all")]
    campus: String,

    /// Exact submission date (YYYY-MM-DD); wins over --from/--to
    #[arg(long)]
    on: Option<String>,

    /// Range start (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// Range end, inclusive (YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,

    #[arg(long, value_enum, default_value = "date")]
    sort: SortArg,

    /// Sort ascending (default: descending)
    #[arg(long)]
    asc: bool,
}

impl CriteriaArgs {
    fn to_criteria(&self) -> Result<Criteria> {
        let category = match self.category.trim() {
            c if c.eq_ignore_ascii_case("all") => Selection::All,
            c => Selection::Only(c.parse::<SubmitterCategory>()?),
        };
        let campus = match self.campus.trim() {
            c if c.eq_ignore_ascii_case("all") => Selection::All,
            c => Selection::Only(c.parse::<Campus>()?),
        };

        Ok(Criteria {
            term: self.search.clone(),
            search_field: match self.field {
                FieldArg::All => SearchField::All,
                FieldArg::Name => SearchField::Name,
                FieldArg::Id => SearchField::IdOrInstitution,
                FieldArg::Program => SearchField::Program,
                FieldArg::Title => SearchField::Title,
            },
            category,
            campus,
            exact_date: self.on.clone(),
            range_start: self.from.clone(),
            range_end: self.to.clone(),
            sort_key: match self.sort {
                SortArg::Date => SortKey::SubmittedAt,
                SortArg::Name => SortKey::FullName,
                SortArg::Campus => SortKey::Campus,
                SortArg::Title => SortKey::Title,
                SortArg::Category => SortKey::Category,
            },
            direction: if self.asc { SortDirection::Asc } else { SortDirection::Desc },
        })
    }
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// Add one catalog entry
    Add {
        #[arg(long)]
        barcode: String,
        #[arg(long)]
        title: String,
        /// Repeat for each author, in order
        #[arg(long = "author")]
        authors: Vec<String>,
        #[arg(long)]
        department: String,
        #[arg(long)]
        year: i32,
    },

    /// List catalog entries, newest upload first
    List,

    /// Search title, barcode, department and authors
    Search { term: String },

    /// Soft-delete an entry (Admin only)
    Remove { barcode: String },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add an account for an existing auth identity
    Add {
        #[arg(long)]
        auth_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "reader")]
        role: Role,
    },

    /// List accounts
    List,

    /// Remove an account (Admin only)
    Remove { id: String },

    /// Show the effective role for an auth id
    Role { auth_id: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.store_path {
        config.store_path = path;
    }
    if let Some(actor) = cli.actor {
        config.actor = Some(actor);
    }

    let client = RecordStoreClient::open(&config.store_path)?;

    match cli.command {
        Commands::Submit(args) => {
            let form = SubmissionForm {
                full_name: args.name,
                category: Some(args.category),
                affiliated_id: args.id_number,
                institution: args.institution,
                campus: Some(args.campus),
                program: args.program,
                thesis_title: args.title,
            };
            let record = client.insert_submission(&form)?;
            println!("{} {}", "Submitted".green(), record.id);
        }
        Commands::List(args) => {
            let view = loaded_view(&client, &config, args.to_criteria()?);
            print_notice(view.state().notice.as_ref());
            print_submissions(&view.state().visible(), view.state().records.len());
        }
        Commands::Export { criteria, out } => {
            let view = loaded_view(&client, &config, criteria.to_criteria()?);
            if let Some(notice @ (Notice::Retryable(_) | Notice::AccessDenied(_))) = &view.state().notice {
                print_notice(Some(notice));
                return Err(eyre!("Export skipped: records could not be loaded"));
            }
            let rows = view.state().visible();
            let path = write_export(&out.unwrap_or_else(|| config.export_dir.clone()), &rows)?;
            println!("{} {} rows to {}", "Exported".green(), rows.len(), path.display());
        }
        Commands::Delete { id, yes } => {
            let actor = signed_in(&client, &config)?;
            let mut view = loaded_view(&client, &config, Criteria::default());

            let Some(record) = view.state().records.iter().find(|r| r.id == id).cloned() else {
                return Err(eyre!("No submission with id {}", id));
            };

            view.request_delete(&id);
            if !yes && !confirm(&format!("Delete submission from {} ({})?", record.full_name, record.thesis_title))? {
                view.cancel_delete();
                println!("Cancelled");
                return Ok(());
            }

            let deleted = view.confirm_delete(&actor);
            print_notice(view.state().notice.as_ref());
            if !deleted {
                return Err(eyre!("Delete failed"));
            }
        }
        Commands::Watch(args) => {
            let mut view = RecordsView::mount(client.clone(), config.load_timeout());
            view.set_criteria(args.to_criteria()?);
            loop {
                match view.pump(Duration::from_secs(1)) {
                    Pumped::Reloaded => {
                        println!("{}", "-- submissions --".bold());
                        print_submissions(&view.state().visible(), view.state().records.len());
                    }
                    Pumped::LoadFailed | Pumped::TimedOut => {
                        print_notice(view.state().notice.as_ref());
                        view.dismiss_notice();
                    }
                    _ => {}
                }
            }
        }
        Commands::Catalog(cmd) => run_catalog(&client, &config, cmd)?,
        Commands::Users(cmd) => run_users(&client, &config, cmd)?,
        Commands::Sync => {
            let rows = client.sync()?;
            println!("{} {} rows from {}", "Synced".green(), rows, config.store_path.display());
        }
    }

    Ok(())
}

fn run_catalog(client: &RecordStoreClient, config: &Config, cmd: CatalogCommands) -> Result<()> {
    match cmd {
        CatalogCommands::Add {
            barcode,
            title,
            authors,
            department,
            year,
        } => {
            let entry = client.insert_catalog_entry(NewCatalogEntry {
                barcode,
                title,
                authors,
                department,
                publication_year: year,
            })?;
            println!("{} {}", "Catalogued".green(), entry.barcode);
        }
        CatalogCommands::List => {
            for entry in client.load_catalog()? {
                println!(
                    "{:<12} {:<40} {:<20} {} ({})",
                    entry.barcode,
                    entry.title,
                    entry.department,
                    entry.publication_year,
                    entry.authors.join("; ")
                );
            }
        }
        CatalogCommands::Search { term } => {
            let entries = client.load_catalog()?;
            for entry in search_catalog(&entries, &term) {
                println!("{:<12} {}", entry.barcode, entry.title);
            }
        }
        CatalogCommands::Remove { barcode } => {
            let actor = signed_in(client, config)?;
            client.soft_delete_catalog_entry(&actor, &barcode)?;
            println!("{} {}", "Removed".green(), barcode);
        }
    }
    Ok(())
}

fn run_users(client: &RecordStoreClient, config: &Config, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Add {
            auth_id,
            name,
            email,
            role,
        } => {
            let actor = match &config.actor {
                Some(_) => Some(signed_in(client, config)?),
                None => None,
            };
            let account = client.insert_user(
                actor.as_ref(),
                NewUser {
                    auth_id,
                    display_name: name,
                    email,
                    role,
                },
            )?;
            println!("{} {} ({})", "Added".green(), account.id, account.role);
        }
        UserCommands::List => {
            for user in client.load_users()? {
                let last_login = user
                    .last_login_at
                    .and_then(chrono::DateTime::from_timestamp_millis)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<38} {:<24} {:<30} {:<7} {:<9} {}",
                    user.id, user.display_name, user.email, user.role, user.status, last_login
                );
            }
        }
        UserCommands::Remove { id } => {
            let actor = signed_in(client, config)?;
            client.delete_user(&actor, &id)?;
            println!("{} {}", "Removed".green(), id);
        }
        UserCommands::Role { auth_id } => {
            let role = client.resolve_role(&auth_id)?;
            println!("{}", role);
        }
    }
    Ok(())
}

/// Resolve the configured actor's role once, at session start
fn signed_in(client: &RecordStoreClient, config: &Config) -> Result<Actor> {
    let auth_id = config
        .actor
        .clone()
        .ok_or_else(|| eyre!("No actor configured; pass --actor or set THESISDESK_ACTOR"))?;

    let role = client.resolve_role(&auth_id)?;
    client.record_login(&auth_id)?;
    Ok(Actor { auth_id, role })
}

fn loaded_view(client: &RecordStoreClient, config: &Config, criteria: Criteria) -> RecordsView {
    let mut view = RecordsView::mount(client.clone(), config.load_timeout());
    view.set_criteria(criteria);
    view.settle(config.load_timeout() + Duration::from_secs(1));
    view
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_notice(notice: Option<&Notice>) {
    match notice {
        Some(Notice::Info(msg)) => println!("{}", msg.green()),
        Some(Notice::Retryable(msg)) => eprintln!("{} {}", msg.yellow(), "(retry with the same command)".dimmed()),
        Some(Notice::AccessDenied(msg)) => eprintln!("{}", msg.red()),
        Some(Notice::Invalid(msg)) => eprintln!("{}", msg.red()),
        None => {}
    }
}

fn print_submissions(rows: &[SubmissionRecord], total: usize) {
    if rows.is_empty() {
        println!("{}", "No submissions".dimmed());
        return;
    }

    println!(
        "{:<10} {:<24} {:<10} {:<20} {:<6} {:<20} {}",
        "DATE".bold(),
        "NAME".bold(),
        "CATEGORY".bold(),
        "ID/INSTITUTION".bold(),
        "CAMPUS".bold(),
        "PROGRAM".bold(),
        "TITLE".bold()
    );
    for r in rows {
        let date = r.submitted_on().map(|d| d.to_string()).unwrap_or_default();
        println!(
            "{:<10} {:<24} {:<10} {:<20} {:<6} {:<20} {}",
            date,
            r.full_name,
            r.category(),
            r.id_or_institution(),
            r.campus,
            r.program().unwrap_or("-"),
            r.thesis_title
        );
    }
    println!("{} of {} shown", rows.len(), total);
}
