use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::Row;
use tokio::net::TcpListener;
use tracing::{info, warn};

use mentorlink_api::{
    build_router,
    services::{
        resources::{self, CreateResourceRequest},
        users::{self, UpdateProfileRequest},
    },
    AppState,
};
use mentorlink_auth::{AuthError, Registration, Role};
use mentorlink_config::{load as load_config, AppConfig};
use mentorlink_runtime::{telemetry, BackendServices};

const SEED_PASSWORD: &str = "mentorlink-demo";

#[derive(Parser)]
#[command(name = "mentorlink")]
#[command(about = "MentorLink backend (serves HTTP by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve,
    /// Create demo mentors, mentees and resources
    SeedData,
    /// Print every user with role and points
    DumpUsers,
    /// Delete all users and everything that references them
    ClearData,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::SeedData => seed_data(config).await,
        Commands::DumpUsers => dump_users(config).await,
        Commands::ClearData => clear_data(config).await,
    }
}

async fn app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    Ok(AppState::new(
        services.db_pool,
        services.authenticator,
        services.ai,
        config,
    ))
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    info!("starting MentorLink backend");

    let address = format!("{}:{}", config.http.address, config.http.port);
    let state = app_state(config).await?;
    let app = build_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(mentorlink_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    info!("backend shut down");
    Ok(())
}

struct SeedUser {
    handle: &'static str,
    name: &'static str,
    role: Role,
    bio: &'static str,
    skills: &'static [&'static str],
    interests: &'static [&'static str],
}

const SEED_USERS: &[SeedUser] = &[
    SeedUser {
        handle: "ada",
        name: "Ada Mentor",
        role: Role::Mentor,
        bio: "Systems engineer, ten years of Rust and C++.",
        skills: &["rust", "systems", "performance"],
        interests: &["compilers", "teaching"],
    },
    SeedUser {
        handle: "grace",
        name: "Grace Mentor",
        role: Role::Mentor,
        bio: "Backend lead who likes databases a little too much.",
        skills: &["sql", "distributed systems", "career growth"],
        interests: &["public speaking"],
    },
    SeedUser {
        handle: "linus",
        name: "Linus Mentee",
        role: Role::Mentee,
        bio: "Student learning systems programming.",
        skills: &["python"],
        interests: &["rust", "operating systems"],
    },
    SeedUser {
        handle: "margaret",
        name: "Margaret Mentee",
        role: Role::Mentee,
        bio: "Junior developer moving into backend work.",
        skills: &["javascript"],
        interests: &["sql", "career growth"],
    },
];

async fn seed_data(config: AppConfig) -> anyhow::Result<()> {
    info!("seeding database with demo data");
    let state = app_state(config).await?;

    let mut first_mentor = None;
    for seed in SEED_USERS {
        let email = format!("{}@mentorlink.dev", seed.handle);
        let registration = Registration {
            email: &email,
            password: SEED_PASSWORD,
            display_name: seed.name,
            role: seed.role,
        };
        let user = match state.authenticator().register_with_password(registration).await {
            Ok(user) => user,
            Err(AuthError::UserExists) => {
                warn!(%email, "seed user already exists, skipping");
                continue;
            }
            Err(error) => return Err(error).with_context(|| format!("failed to register {email}")),
        };

        users::update_profile(
            state.db_pool(),
            user.id,
            UpdateProfileRequest {
                bio: Some(seed.bio.to_string()),
                skills: Some(seed.skills.iter().map(|skill| skill.to_string()).collect()),
                interests: Some(seed.interests.iter().map(|item| item.to_string()).collect()),
                ..Default::default()
            },
        )
        .await
        .map_err(|error| anyhow::anyhow!("failed to seed profile for {email}: {error}"))?;

        if seed.role == Role::Mentor && first_mentor.is_none() {
            first_mentor = Some(user);
        }
        println!("created {:<8} {email}", seed.role.as_str());
    }

    if let Some(mentor) = first_mentor {
        let seeds = [
            ("The Rust Programming Language", "https://doc.rust-lang.org/book/", "book", vec!["rust"]),
            ("Use The Index, Luke", "https://use-the-index-luke.com/", "article", vec!["sql", "databases"]),
        ];
        for (title, url, kind, tags) in seeds {
            let resource = resources::create_resource(
                &state,
                &mentor,
                CreateResourceRequest {
                    title: title.to_string(),
                    url: url.to_string(),
                    description: String::new(),
                    kind: Some(kind.to_string()),
                    tags: tags.into_iter().map(str::to_string).collect(),
                },
            )
            .await
            .map_err(|error| anyhow::anyhow!("failed to seed resource {title}: {error}"))?;
            println!("created resource {}", resource.public_id);
        }
    }

    println!("seed users share the password `{SEED_PASSWORD}`");
    Ok(())
}

async fn dump_users(config: AppConfig) -> anyhow::Result<()> {
    let state = app_state(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT id, public_id, email, display_name, role, points, level, last_seen_at
        FROM users
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .fetch_all(state.db_pool())
    .await
    .context("failed to fetch users")?;

    println!("=== USERS ===");
    if rows.is_empty() {
        println!("No users found in database");
        return Ok(());
    }

    println!(
        "{:<5} {:<26} {:<30} {:<20} {:<7} {:<7} {:<6} {:<25}",
        "ID", "Public ID", "Email", "Name", "Role", "Points", "Level", "Last Seen"
    );
    println!("{}", "-".repeat(130));
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let public_id: String = row.try_get("public_id")?;
        let email: String = row.try_get("email")?;
        let display_name: String = row.try_get("display_name")?;
        let role: String = row.try_get("role")?;
        let points: i64 = row.try_get("points")?;
        let level: i64 = row.try_get("level")?;
        let last_seen_at: Option<String> = row.try_get("last_seen_at")?;

        println!(
            "{:<5} {:<26} {:<30} {:<20} {:<7} {:<7} {:<6} {:<25}",
            id,
            public_id,
            email,
            display_name,
            role,
            points,
            level,
            last_seen_at.as_deref().unwrap_or("never")
        );
    }
    Ok(())
}

async fn clear_data(config: AppConfig) -> anyhow::Result<()> {
    let state = app_state(config).await?;

    let mut tx = state.db_pool().begin().await?;
    sqlx::query("DELETE FROM resources")
        .execute(&mut *tx)
        .await
        .context("failed to clear resources")?;
    sqlx::query("DELETE FROM conversations")
        .execute(&mut *tx)
        .await
        .context("failed to clear conversations")?;
    let users = sqlx::query("DELETE FROM users")
        .execute(&mut *tx)
        .await
        .context("failed to clear users")?;
    tx.commit().await?;

    info!(users = users.rows_affected(), "database cleared");
    println!("removed {} users and their data", users.rows_affected());
    Ok(())
}
