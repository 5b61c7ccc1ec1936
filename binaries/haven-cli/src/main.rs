//! Haven CLI
//!
//! Browse and post to the peer forum, explore the resource library, request
//! counselor appointments and run moderation tasks against the configured
//! document store.

mod render;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use haven_community::{
    BookingRequest, BookingStatus, Community, Forum, KindFilter, Member, Post,
    PostDraft, ResourceDraft, ResourceKind, TimeSlot, COUNSELORS,
};
use haven_config::{HavenConfig, StoreConfig};
use haven_core::{DocumentStore, SharedStore};
use haven_docstore::{parse_seed, MemoryStore, SnapshotFile};
use haven_feed::{FeedLoader, PendingIncrement, ViewRenderer};
use haven_mongodb::{MongoSettings, MongoStore};
use render::{Listing, TextRenderer};

#[derive(Parser)]
#[command(name = "haven")]
#[command(about = "Haven - anonymous peer support, resources and counseling")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config_dir>/haven/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Member id to act as
    #[arg(long, global = true, default_value = "local")]
    uid: String,

    /// Member email to act as
    #[arg(long, global = true, default_value = "member@haven.local")]
    email: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show forum posts, newest first
    Posts {
        /// Number of pages to fetch
        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// Publish a forum post
    Post {
        #[arg(short, long)]
        title: String,

        #[arg(short = 'm', long)]
        content: String,

        /// Show your handle instead of "Anonymous"
        #[arg(long)]
        named: bool,
    },

    /// Like a post
    Like {
        /// Post id
        id: String,

        /// Like count currently displayed
        #[arg(long, default_value = "0")]
        current: u64,
    },

    /// Report a post to moderators
    Report {
        /// Post id
        id: String,
    },

    /// Browse the resource library
    Resources {
        /// all, video, audio, article or game
        #[arg(short, long, default_value = "all")]
        kind: String,

        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// Add a resource to the library
    AddResource {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// video, audio, article or game
        #[arg(short, long)]
        kind: String,

        #[arg(short, long)]
        url: String,

        /// e.g. "10 min"
        #[arg(long)]
        duration: Option<String>,
    },

    /// List counselors and appointment times
    Counselors,

    /// Request a counselor appointment
    Book {
        /// Counselor id (see `haven counselors`)
        #[arg(long)]
        counselor: String,

        /// Date as YYYY-MM-DD
        #[arg(long)]
        date: String,

        /// Time slot, e.g. 14:00
        #[arg(long)]
        time: String,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Moderation tasks
    Moderate {
        #[command(subcommand)]
        command: ModerateCommands,
    },

    /// Load documents from a JSON seed file
    Seed {
        /// {"collection": [{...}, ...]}
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ModerateCommands {
    /// Dashboard counts
    Stats,

    /// Posts, most reported first
    Reported {
        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// Booking requests, newest first
    Bookings {
        /// pending, approved or rejected
        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// Approve a booking
    Approve { id: String },

    /// Reject a booking
    Reject { id: String },

    /// Delete a forum post
    DeletePost { id: String },

    /// Delete a library resource
    DeleteResource { id: String },

    /// List administrators
    Admins,

    /// Grant the administrator role
    AddAdmin { uid: String, email: String },

    /// Revoke the administrator role
    RemoveAdmin { uid: String },

    /// Become the first administrator while there are none
    Setup,
}

/// The configured store, plus its snapshot file for the memory backend
struct Backend {
    store: SharedStore,
    snapshot: Option<(Arc<MemoryStore>, SnapshotFile)>,
}

impl Backend {
    async fn open(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::Memory { snapshot } => {
                let (memory, snapshot) = match snapshot {
                    Some(path) => {
                        let file = SnapshotFile::at_path(path);
                        (Arc::new(file.load()?), Some(file))
                    }
                    None => (Arc::new(MemoryStore::new()), None),
                };
                Ok(Self {
                    store: memory.clone(),
                    snapshot: snapshot.map(|file| (memory, file)),
                })
            }
            StoreConfig::Mongo {
                uri,
                database,
                timeout_ms,
            } => {
                let settings = MongoSettings {
                    uri: uri.clone(),
                    database: database.clone(),
                    timeout: Duration::from_millis(*timeout_ms),
                };
                let store = MongoStore::connect(&settings)
                    .await
                    .context("connecting to MongoDB")?;
                Ok(Self {
                    store: Arc::new(store),
                    snapshot: None,
                })
            }
        }
    }

    /// Write the memory store back to its snapshot
    fn persist(&self) -> Result<()> {
        if let Some((memory, file)) = &self.snapshot {
            file.save(memory)?;
            tracing::debug!("Saved snapshot to {}", file.path().display());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("haven=info".parse()?)
                .add_directive("haven_community=info".parse()?)
                .add_directive("haven_feed=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = HavenConfig::load(cli.config.as_deref())?;
    let backend = Backend::open(&config.store).await?;
    let community = Community::from_config(backend.store.clone(), &config);
    let member = Member::new(cli.uid, cli.email);

    match cli.command {
        Commands::Posts { pages } => {
            let feed = community.forum.feed()?;
            show_pages("FORUM", &feed, Listing::Posts, pages).await
        }
        Commands::Post {
            title,
            content,
            named,
        } => {
            let draft = PostDraft {
                title,
                content,
                anonymous: !named,
            };
            let echo = community.forum.compose(&member, draft).await?;
            backend.persist()?;

            let post = Post::from_item(&echo);
            println!("\n  Posted as {} ({})", post.author_name, post.date_label());
            println!("  id: {}", post.id);
            Ok(())
        }
        Commands::Like { id, current } => {
            let pending = community.forum.like(&id, current);
            println!("  ♥ {}", pending.display());
            settle(pending).await;
            backend.persist()
        }
        Commands::Report { id } => cmd_report(&community.forum, &backend, &member, &id).await,
        Commands::Resources { kind, pages } => {
            let filter: KindFilter = kind.parse()?;
            let feed = community.library.feed(filter)?;
            show_pages("RESOURCES", &feed, Listing::Resources, pages).await
        }
        Commands::AddResource {
            title,
            description,
            kind,
            url,
            duration,
        } => {
            let draft = ResourceDraft {
                title,
                description,
                kind: kind.parse::<ResourceKind>()?,
                url,
                duration,
            };
            community.moderation.admins().ensure_admin(&member).await?;
            let id = community.library.add(draft).await?;
            backend.persist()?;
            println!("  Added resource {}", id);
            Ok(())
        }
        Commands::Counselors => cmd_counselors(),
        Commands::Book {
            counselor,
            date,
            time,
            notes,
        } => {
            let request = BookingRequest {
                counselor_id: counselor,
                date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .with_context(|| format!("'{}' is not a YYYY-MM-DD date", date))?,
                time: time.parse::<TimeSlot>()?,
                notes,
            };
            let today = Utc::now().date_naive();
            let id = community.bookings.request(&member, request, today).await?;
            backend.persist()?;
            println!("  Booking requested ({}), status: pending", id);
            Ok(())
        }
        Commands::Moderate { command } => cmd_moderate(&community, &backend, &member, command).await,
        Commands::Seed { file } => cmd_seed(&backend, &file).await,
    }
}

/// Print up to `pages` pages of a feed
async fn show_pages(title: &str, feed: &FeedLoader, listing: Listing, pages: usize) -> Result<()> {
    let renderer = TextRenderer::new(listing);

    println!("\n  {}", title);
    println!("  {}\n", "=".repeat(title.len()));

    let mut stream = std::pin::pin!(feed.pages().take(pages));
    let mut shown = 0;
    while let Some(page) = stream.next().await {
        let items = page?;
        shown += items.len();
        println!("{}\n", renderer.render(&items, feed.state()));
    }

    if shown == 0 {
        println!("{}", renderer.render(&[], feed.state()));
    }
    Ok(())
}

/// Wait for a counter update so the process does not exit before it lands
async fn settle(pending: PendingIncrement) {
    if pending.was_suppressed() {
        return;
    }
    if let Err(e) = pending.settled().await {
        eprintln!("  (not saved: {})", e);
    }
}

async fn cmd_report(forum: &Forum, backend: &Backend, member: &Member, id: &str) -> Result<()> {
    let Some(item) = backend.store.get(forum.collection(), id).await? else {
        bail!("post {} not found", id);
    };
    let post = Post::from_item(&item);
    let pending = forum.report(member, &post)?;
    settle(pending).await;
    backend.persist()?;
    println!("  Reported. Thank you for helping keep Haven safe.");
    Ok(())
}

fn cmd_counselors() -> Result<()> {
    println!("\n  COUNSELORS");
    println!("  ==========\n");
    for counselor in COUNSELORS.iter() {
        println!(
            "  {}  {} ({})",
            counselor.id, counselor.name, counselor.specialization
        );
    }

    let slots: Vec<String> = TimeSlot::all().map(TimeSlot::label).collect();
    println!("\n  Times: {}", slots.join(", "));
    Ok(())
}

async fn cmd_moderate(
    community: &Community,
    backend: &Backend,
    member: &Member,
    command: ModerateCommands,
) -> Result<()> {
    let moderation = &community.moderation;
    match command {
        ModerateCommands::Stats => {
            let stats = moderation.stats(member).await?;
            println!("\n  DASHBOARD");
            println!("  =========\n");
            println!("  Forum posts:      {}", stats.posts);
            println!("  Resources:        {}", stats.resources);
            println!("  Pending bookings: {}", stats.pending_bookings);
            Ok(())
        }
        ModerateCommands::Reported { pages } => {
            let feed = moderation.reported_posts(member).await?;
            show_pages("REPORTED POSTS", &feed, Listing::Posts, pages).await
        }
        ModerateCommands::Bookings { status, pages } => {
            let status = status.map(|s| s.parse::<BookingStatus>()).transpose()?;
            let feed = moderation.bookings(member, status).await?;
            show_pages("BOOKINGS", &feed, Listing::Bookings, pages).await
        }
        ModerateCommands::Approve { id } => {
            moderation
                .set_booking_status(member, &id, BookingStatus::Approved)
                .await?;
            backend.persist()?;
            println!("  Booking {} approved", id);
            Ok(())
        }
        ModerateCommands::Reject { id } => {
            moderation
                .set_booking_status(member, &id, BookingStatus::Rejected)
                .await?;
            backend.persist()?;
            println!("  Booking {} rejected", id);
            Ok(())
        }
        ModerateCommands::DeletePost { id } => {
            moderation.delete_post(member, &id).await?;
            backend.persist()?;
            println!("  Post {} deleted", id);
            Ok(())
        }
        ModerateCommands::DeleteResource { id } => {
            moderation.delete_resource(member, &id).await?;
            backend.persist()?;
            println!("  Resource {} deleted", id);
            Ok(())
        }
        ModerateCommands::Admins => {
            let admins = moderation.admins().list(member).await?;
            println!("\n  ADMINISTRATORS");
            println!("  ==============\n");
            for admin in admins {
                let you = if admin.uid == member.uid { " (you)" } else { "" };
                println!("  {}  {}{}", admin.uid, admin.email, you);
            }
            Ok(())
        }
        ModerateCommands::AddAdmin { uid, email } => {
            moderation.admins().add(member, &uid, &email).await?;
            backend.persist()?;
            println!("  {} is now an administrator", email);
            Ok(())
        }
        ModerateCommands::RemoveAdmin { uid } => {
            moderation.admins().remove(member, &uid).await?;
            backend.persist()?;
            println!("  Administrator {} removed", uid);
            Ok(())
        }
        ModerateCommands::Setup => {
            moderation.admins().claim_first(member).await?;
            backend.persist()?;
            println!("  {} is now the administrator", member.email);
            Ok(())
        }
    }
}

async fn cmd_seed(backend: &Backend, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let collections = parse_seed(&content)?;

    for (collection, records) in collections {
        let count = records.len();
        for record in records {
            backend.store.insert(&collection, record).await?;
        }
        println!("  {}: {} documents", collection, count);
    }

    backend.persist()?;
    tracing::info!("Seeded from {}", file.display());
    Ok(())
}
