//! Event Roster Demo
//!
//! Walks through the participant lifecycle and the roster query:
//! - Users join an event (twice, to show idempotency)
//! - An organizer verifies one participant
//! - The roster is searched, sorted and paginated
//! - Event images are replaced
//!
//! # Usage
//!
//! ```bash
//! # In-memory store
//! cargo run --bin roster-demo
//!
//! # PostgreSQL (uses DATABASE_URL)
//! cargo run --bin roster-demo -- --postgres
//! ```

use roster::services::ImageEdit;
use roster::{Config, RosterApp};
use roster_core::AggregateStore;
use roster_core::environment::SystemClock;
use roster_core::query::{ParticipantFilter, QueryOptions};
use roster_core::types::{User, VerificationStatus};
use roster_postgres::PostgresUserDirectory;
use roster_testing::InMemoryStore;
use roster_testing::fixtures::{self, EventBuilder};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    roster::metrics::register_metrics();

    println!("\n============================================");
    println!("   Event Roster - Live Demo");
    println!("============================================\n");

    let use_postgres = std::env::args().any(|arg| arg == "--postgres");
    let alice = fixtures::user("Alice");
    let bob = fixtures::user("Bob");
    let carol = fixtures::user("Carol");
    let event = EventBuilder::new()
        .title("Rust Meetup")
        .image(fixtures::image("poster.png"))
        .build();

    let (app, store): (RosterApp, Arc<dyn AggregateStore>) = if use_postgres {
        println!("Connecting to PostgreSQL...");
        let (app, store) = RosterApp::connect(&config).await?;
        let users = PostgresUserDirectory::from_pool(store.pool().clone());
        for user in [&alice, &bob, &carol] {
            users.upsert_user(user).await?;
        }
        let store: Arc<dyn AggregateStore> = store;
        (app, store)
    } else {
        println!("Using the in-memory store");
        let store = InMemoryStore::new();
        for user in [&alice, &bob, &carol] {
            let _: User = store.insert_user(user.clone());
        }
        let app = RosterApp::in_memory(&store, Arc::new(SystemClock), config.roster.default_page_limit);
        let store: Arc<dyn AggregateStore> = Arc::new(store);
        (app, store)
    };

    store.save_event(event.clone(), None).await?;
    println!("Created event '{}' ({})\n", event.details.title, event.id);

    // ========== Join ==========
    for user in [&alice, &bob, &carol] {
        let participant = app.lifecycle.join_event(event.id, user.id).await?;
        println!("  {} joined (participant {})", participant.user.name, participant.id);
    }
    let again = app.lifecycle.join_event(event.id, alice.id).await?;
    println!("  {} joined again: same participant {}\n", again.user.name, again.id);

    // ========== Verify ==========
    let verified = app
        .lifecycle
        .verify_participant(event.id, bob.id, VerificationStatus::Verified)
        .await?;
    println!("  {} verified: {}\n", verified.user.name, verified.is_verified.as_i64());

    // ========== Query ==========
    let page = app
        .queries
        .query_participants(
            event.id,
            ParticipantFilter::default(),
            QueryOptions {
                sort_by: Some("is_verified:desc,created_at:asc".to_string()),
                limit: Some(2),
                page: Some(1),
            },
        )
        .await?;
    println!("Roster, verified first, page 1 of {}:", page.total_pages);
    println!("{}\n", serde_json::to_string_pretty(&page)?);

    let page = app
        .queries
        .query_participants(event.id, ParticipantFilter::search("ALI"), QueryOptions::default())
        .await?;
    println!(
        "Search 'ALI': {} result(s) of {} participant(s)\n",
        page.results.len(),
        page.total_results
    );

    // ========== Images ==========
    let outcome = app
        .images
        .edit_event_images(
            event.id,
            ImageEdit {
                remove: event.images.iter().map(|image| image.id).collect(),
                add: vec![fixtures::image("banner.png"), fixtures::image("venue.png")],
            },
        )
        .await?;
    println!(
        "Images now: {:?} (removed {:?}, version {})",
        outcome.event.images.iter().map(|i| i.original_name.as_str()).collect::<Vec<_>>(),
        outcome.removed.iter().map(|i| i.original_name.as_str()).collect::<Vec<_>>(),
        outcome.event.version
    );

    println!("\nDemo complete");
    Ok(())
}
