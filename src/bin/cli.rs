use sqlx::Row;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use rolegate::authz::{self, catalog, DevModeConfig, PermissionResolver};
use rolegate::db::{self, SqliteRolePermissionStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "rolegate administration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Print the permission catalog
    Catalog,
    /// Create a role
    RoleCreate {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Holders of a system role are allowed every permission
        #[arg(long)]
        system: bool,
    },
    /// Grant (or with --revoke, explicitly revoke) a permission on a role
    RoleGrant {
        role: String,
        permission: String,
        #[arg(long)]
        revoke: bool,
    },
    /// Assign a role to the user with the given email
    AssignRole { email: String, role: String },
    /// Evaluate a permission for a user and print the deciding rule
    Check {
        #[arg(long)]
        email: String,
        #[arg(long)]
        permission: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; fall back to the crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::Catalog => {
            for group in catalog::groups() {
                println!("{} - {}", group.category, group.description);
                for permission in group.permissions {
                    println!("  {}", permission);
                }
            }
        }
        Commands::RoleCreate {
            name,
            display_name,
            description,
            system,
        } => {
            let pool = get_pool().await?;
            let role = db::rbac::create_role(
                &pool,
                &name,
                display_name.as_deref(),
                description.as_deref(),
                system,
            )
            .await?;
            println!("Created role {} ({})", role.name, role.id);
        }
        Commands::RoleGrant {
            role,
            permission,
            revoke,
        } => {
            let pool = get_pool().await?;
            let permission = catalog::require_known(&permission)?;
            let role = db::rbac::find_role_by_name(&pool, &role)
                .await?
                .with_context(|| format!("role not found: {role}"))?;
            db::rbac::set_grant(&pool, role.id, permission, !revoke, None).await?;
            let verb = if revoke { "Revoked" } else { "Granted" };
            println!("{verb} {permission} on {}", role.name);
        }
        Commands::AssignRole { email, role } => {
            let pool = get_pool().await?;
            let user = db::users::find_by_email(&pool, &email)
                .await?
                .with_context(|| format!("user not found: {email}"))?;
            let role = db::rbac::find_role_by_name(&pool, &role)
                .await?
                .with_context(|| format!("role not found: {role}"))?;
            db::rbac::assign_role(&pool, user.id, role.id).await?;
            println!("Assigned {} to {}", role.name, user.email);
        }
        Commands::Check { email, permission } => {
            let pool = get_pool().await?;
            let user = db::users::find_by_email(&pool, &email)
                .await?
                .with_context(|| format!("user not found: {email}"))?;

            let store = Arc::new(SqliteRolePermissionStore::new(pool.clone()));
            let resolver = PermissionResolver::new(store).with_dev_mode(DevModeConfig::from_env());
            let principal = authz::load_principal(&pool, resolver.store(), user.id).await;
            let evaluation = resolver.explain(&principal, &permission).await;

            println!("{:?} {} for {} ({})", evaluation.decision, permission, user.email, evaluation.rule);
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    use std::str::FromStr;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options = SqliteConnectOptions::from_str(&database_url)
        .with_context(|| format!("invalid DATABASE_URL: {database_url}"))?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let tracked: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;
    let applied_versions: HashSet<i64> = if tracked.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when run from the repo root, else the crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
