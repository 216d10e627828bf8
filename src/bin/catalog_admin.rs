//! Catalog management tool.
//!
//! ```bash
//! catalog-admin migrate
//! catalog-admin add-category "Shirts"
//! catalog-admin list-categories
//! catalog-admin set-role alice admin
//! catalog-admin import-image ~/photos/red-shirt.png --name red-shirt.png
//! ```
//!
//! Reads the same environment files and variables as the web server.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use shop_catalog::auth::Role;
use shop_catalog::catalog::{Catalog, ImageStore};
use shop_catalog::config::{AppConfig, app_figment};
use shop_catalog::{db, env};

#[derive(Parser)]
#[command(name = "catalog-admin")]
#[command(author, version, about = "Shop catalog management tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create a product category
    AddCategory {
        /// Category name, must be unique
        name: String,
    },
    /// Print every category with its id
    ListCategories,
    /// Change a user's role (`admin` or `customer`)
    SetRole { username: String, role: Role },
    /// Copy an image file into the upload directory
    ImportImage {
        path: PathBuf,
        /// Name to store the image under, defaults to the file's own name
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {e}");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_figment(&app_figment(rocket::Config::figment()))
        .context("reading configuration")?;
    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    match cli.command {
        Commands::Migrate => {
            println!("Database is up to date");
        }
        Commands::AddCategory { name } => {
            let catalog = Catalog::new(pool.clone(), ImageStore::new(&config.upload_dir));
            let category = catalog.create_category(&name).await?;
            println!("Created category {} ({})", category.name, category.id);
        }
        Commands::ListCategories => {
            let catalog = Catalog::new(pool.clone(), ImageStore::new(&config.upload_dir));
            for category in catalog.list_categories().await? {
                println!("{:>5}  {}", category.id, category.name);
            }
        }
        Commands::SetRole { username, role } => {
            db::update_user_role(&pool, &username, role).await?;
            println!("{} is now {}", username, role);
        }
        Commands::ImportImage { path, name } => {
            let store = ImageStore::new(&config.upload_dir);
            let stored = store
                .import(&path, name.as_deref())
                .await
                .with_context(|| format!("importing {}", path.display()))?;
            println!("Stored {} as {}", path.display(), stored);
        }
    }

    pool.close().await;
    Ok(())
}
