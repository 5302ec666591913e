use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod config;
mod db;
mod error;
mod geo;
mod impact;
mod models;
mod report;

use config::Config;
use models::{non_negative, Coordinate, ImpactRecord, ImpactTotals, NewClaim, NewListing, Status};

#[derive(Parser)]
#[command(name = "foodshare-impact")]
#[command(about = "Food sharing marketplace: listings, claims, moderation and impact tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import impact records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Enter or replace the impact figures for one day
    Record {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, default_value_t = 0.0)]
        food_saved_kg: f64,
        #[arg(long, default_value_t = 0)]
        people_helped: i64,
        #[arg(long, default_value_t = 0)]
        meals_provided: i64,
        /// Estimated from food saved when omitted
        #[arg(long)]
        co2_reduced_kg: Option<f64>,
        #[arg(long, default_value_t = 0.0)]
        waste_diverted_kg: f64,
        #[arg(long, default_value_t = 0.0)]
        volunteer_hours: f64,
        #[arg(long, default_value_t = 0)]
        partner_organizations: i64,
    },
    /// Aggregate impact from manual records and completed claims
    Impact {
        #[arg(long)]
        since_days: Option<i64>,
        /// Print the totals as JSON
        #[arg(long)]
        json: bool,
    },
    /// Post a new listing for moderation
    Post {
        #[arg(long)]
        title: String,
        #[arg(long)]
        donor: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        quantity_kg: f64,
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
        #[arg(long)]
        pickup_by: Option<NaiveDate>,
    },
    /// List listings, optionally by status
    Listings {
        #[arg(long)]
        status: Option<Status>,
    },
    /// Approve or decline a pending listing
    Moderate {
        #[arg(long)]
        listing: Uuid,
        #[arg(long)]
        decision: Status,
    },
    /// Request part or all of an approved listing
    Claim {
        #[arg(long)]
        listing: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        quantity_kg: f64,
    },
    /// Approve, decline or complete a claim
    Resolve {
        #[arg(long)]
        claim: Uuid,
        #[arg(long)]
        status: Status,
    },
    /// Find approved listings near a location
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long)]
        radius_km: Option<f64>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown impact report
    Report {
        #[arg(long)]
        since_days: Option<i64>,
        #[arg(long, default_value = "impact-report.md")]
        out: PathBuf,
    },
    /// Print refreshed impact totals whenever listings, claims or records change
    Watch,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "foodshare_impact=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_totals(totals: &ImpactTotals) {
    let mut output = String::new();
    report::write_totals(&mut output, totals);
    print!("{output}");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    if let Err(err) = run(cli.command, &config, &pool).await {
        tracing::error!("command failed: {err:#}");
        return Err(err);
    }

    Ok(())
}

async fn run(command: Commands, config: &Config, pool: &PgPool) -> anyhow::Result<()> {
    match command {
        Commands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let stored = db::import_csv(pool, &csv).await?;
            println!("Stored {stored} impact records from {}.", csv.display());
        }
        Commands::Record {
            date,
            food_saved_kg,
            people_helped,
            meals_provided,
            co2_reduced_kg,
            waste_diverted_kg,
            volunteer_hours,
            partner_organizations,
        } => {
            let record = ImpactRecord {
                date,
                food_saved_kg: non_negative(food_saved_kg),
                people_helped: people_helped.max(0),
                meals_provided: meals_provided.max(0),
                co2_reduced_kg: co2_reduced_kg
                    .map(non_negative)
                    .unwrap_or_else(|| impact::estimate_co2_kg(food_saved_kg)),
                waste_diverted_kg: non_negative(waste_diverted_kg),
                volunteer_hours: non_negative(volunteer_hours),
                partner_organizations: partner_organizations.max(0),
            };
            db::upsert_impact_record(pool, &record).await?;
            println!("Impact for {date} recorded.");
        }
        Commands::Impact { since_days, json } => {
            let since_date = since_days.map(impact::cutoff_date);
            let sources = db::fetch_impact_sources(pool, since_date).await?;
            let totals = impact::aggregate_sources(&sources);

            if json {
                println!("{}", serde_json::to_string_pretty(&totals)?);
            } else if totals.record_count == 0 && totals.claim_count == 0 {
                println!("No impact recorded for this window.");
            } else {
                println!(
                    "Impact across {} stored records and {} completed claims:",
                    totals.record_count, totals.claim_count
                );
                print_totals(&totals);
            }
        }
        Commands::Post {
            title,
            donor,
            description,
            quantity_kg,
            lat,
            lon,
            pickup_by,
        } => {
            let location = match (lat, lon) {
                (Some(latitude), Some(longitude)) => Some(Coordinate::new(latitude, longitude)),
                _ => None,
            };
            let listing = db::create_listing(
                pool,
                &NewListing {
                    donor_name: donor,
                    title,
                    description,
                    quantity_kg,
                    location,
                    pickup_by,
                },
            )
            .await?;
            println!("Listing {} posted and awaiting moderation.", listing.id);
        }
        Commands::Listings { status } => {
            let listings = db::fetch_listings(pool, status).await?;

            if listings.is_empty() {
                println!("No listings found.");
                return Ok(());
            }

            for listing in listings.iter() {
                println!(
                    "- {} [{}] {} from {} ({:.1} kg)",
                    listing.id, listing.status, listing.title, listing.donor_name, listing.quantity_kg
                );
            }
        }
        Commands::Moderate { listing, decision } => {
            let listing = db::moderate_listing(pool, listing, decision).await?;
            println!("Listing {} is now {}.", listing.id, listing.status);
        }
        Commands::Claim {
            listing,
            name,
            email,
            quantity_kg,
        } => {
            let claim = db::create_claim(
                pool,
                &NewClaim {
                    listing_id: listing,
                    claimant_name: name,
                    claimant_email: email,
                    quantity_kg,
                },
            )
            .await?;
            println!("Claim {} requested for {:.1} kg.", claim.id, claim.quantity_kg);
        }
        Commands::Resolve { claim, status } => {
            let claim = db::resolve_claim(pool, claim, status).await?;
            println!("Claim {} is now {}.", claim.id, claim.status);
        }
        Commands::Nearby {
            lat,
            lon,
            radius_km,
            limit,
        } => {
            let origin = Coordinate::new(lat, lon);
            anyhow::ensure!(origin.is_valid(), "location {lat}, {lon} is out of range");
            let radius_km = radius_km.unwrap_or(config.default_radius_km);
            let listings = db::fetch_listings(pool, Some(Status::Approved)).await?;
            let nearby = geo::within_radius(listings, origin, radius_km);

            if nearby.is_empty() {
                println!("No open listings within {radius_km:.1} km.");
                return Ok(());
            }

            println!("Open listings within {radius_km:.1} km:");
            for (listing, distance_km) in nearby.iter().take(limit) {
                println!(
                    "- {:.2} km: {} from {} ({:.1} kg) [{}]",
                    distance_km, listing.title, listing.donor_name, listing.quantity_kg, listing.id
                );
            }
        }
        Commands::Report { since_days, out } => {
            let since_date = since_days.map(impact::cutoff_date);
            let sources = db::fetch_impact_sources(pool, since_date).await?;
            let listings = db::fetch_listings(pool, None).await?;
            let report = report::build_report(since_date, &sources, &listings);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch => {
            let mut listener = db::listen_for_changes(pool).await?;
            tracing::info!(channel = db::CHANGE_CHANNEL, "watching for changes");
            print_totals(&impact::aggregate_sources(&db::fetch_impact_sources(pool, None).await?));

            loop {
                let notification = listener.recv().await?;
                tracing::info!(table = notification.payload(), "change received, refetching impact");
                let sources = db::fetch_impact_sources(pool, None).await?;
                println!();
                print_totals(&impact::aggregate_sources(&sources));
            }
        }
    }

    Ok(())
}
