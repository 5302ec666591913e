use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{Executor, PgPool, Postgres, Row};
use uuid::Uuid;

use crate::error::FoodShareError;
use crate::impact;
use crate::models::{
    FoodClaim, FoodListing, ImpactRecord, ImpactSources, NewClaim, NewListing, Status,
};

/// Channel the table triggers publish on; the payload is the table name.
pub const CHANGE_CHANNEL: &str = "food_share_changes";

const LISTING_COLUMNS: &str = "id, donor_name, title, description, quantity_kg, \
     latitude, longitude, status, pickup_by, created_at";
const CLAIM_COLUMNS: &str = "id, listing_id, claimant_name, claimant_email, quantity_kg, \
     status, created_at, completed_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let listings = vec![
        (
            "seed-listing-001",
            "Sunrise Bakery",
            "Day-old sourdough loaves",
            12.0,
            Some((40.7306, -73.9866)),
            "completed",
        ),
        (
            "seed-listing-002",
            "Green Fork Cafe",
            "Vegetable soup, 20 portions",
            8.5,
            Some((40.7411, -73.9897)),
            "approved",
        ),
        (
            "seed-listing-003",
            "Harbor Market",
            "Mixed bruised apples",
            15.0,
            None,
            "pending",
        ),
    ];

    for (source_key, donor, title, quantity_kg, location, status) in listings {
        sqlx::query(
            r#"
            INSERT INTO food_share.food_listings
            (id, donor_name, title, quantity_kg, latitude, longitude, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(donor)
        .bind(title)
        .bind(quantity_kg)
        .bind(location.map(|(lat, _): (f64, f64)| lat))
        .bind(location.map(|(_, lon): (f64, f64)| lon))
        .bind(status)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let claims = vec![
        (
            "seed-claim-001",
            "seed-listing-001",
            "Maya Chen",
            "maya.chen@example.org",
            7.0,
            "completed",
        ),
        (
            "seed-claim-002",
            "seed-listing-001",
            "Omar Haddad",
            "omar.haddad@example.org",
            5.0,
            "completed",
        ),
        (
            "seed-claim-003",
            "seed-listing-002",
            "Lena Ortiz",
            "lena.ortiz@example.org",
            4.0,
            "pending",
        ),
    ];

    for (source_key, listing_key, name, email, quantity_kg, status) in claims {
        let listing_id: Uuid = sqlx::query(
            "SELECT id FROM food_share.food_listings WHERE source_key = $1",
        )
        .bind(listing_key)
        .fetch_one(pool)
        .await?
        .get("id");

        sqlx::query(
            r#"
            INSERT INTO food_share.food_claims
            (id, listing_id, claimant_name, claimant_email, quantity_kg, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(listing_id)
        .bind(name)
        .bind(email)
        .bind(quantity_kg)
        .bind(status)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let records = vec![
        (
            NaiveDate::from_ymd_opt(2026, 1, 31).context("invalid date")?,
            142.0,
            61,
            338,
            355.0,
            150.5,
            46.0,
            4,
        ),
        (
            NaiveDate::from_ymd_opt(2026, 2, 28).context("invalid date")?,
            187.5,
            74,
            446,
            468.75,
            190.0,
            52.5,
            6,
        ),
    ];

    for (date, food, people, meals, co2, waste, hours, partners) in records {
        upsert_impact_record(
            pool,
            &ImpactRecord {
                date,
                food_saved_kg: food,
                people_helped: people,
                meals_provided: meals,
                co2_reduced_kg: co2,
                waste_diverted_kg: waste,
                volunteer_hours: hours,
                partner_organizations: partners,
            },
        )
        .await?;
    }

    Ok(())
}

/// Inserts or replaces the record for `record.date`. Returns true when a row changed.
pub async fn upsert_impact_record<'e, E>(executor: E, record: &ImpactRecord) -> anyhow::Result<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO food_share.impact_records
        (id, date, food_saved_kg, people_helped, meals_provided, co2_reduced_kg,
         waste_diverted_kg, volunteer_hours, partner_organizations)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (date) DO UPDATE
        SET food_saved_kg = EXCLUDED.food_saved_kg,
            people_helped = EXCLUDED.people_helped,
            meals_provided = EXCLUDED.meals_provided,
            co2_reduced_kg = EXCLUDED.co2_reduced_kg,
            waste_diverted_kg = EXCLUDED.waste_diverted_kg,
            volunteer_hours = EXCLUDED.volunteer_hours,
            partner_organizations = EXCLUDED.partner_organizations
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(record.date)
    .bind(record.food_saved_kg)
    .bind(record.people_helped)
    .bind(record.meals_provided)
    .bind(record.co2_reduced_kg)
    .bind(record.waste_diverted_kg)
    .bind(record.volunteer_hours)
    .bind(record.partner_organizations)
    .execute(executor)
    .await?;

    tracing::debug!(date = %record.date, "impact record stored");
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_impact_records(
    pool: &PgPool,
    since_date: Option<NaiveDate>,
) -> anyhow::Result<Vec<ImpactRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT date, food_saved_kg, people_helped, meals_provided, co2_reduced_kg,
               waste_diverted_kg, volunteer_hours, partner_organizations
        FROM food_share.impact_records
        WHERE $1::date IS NULL OR date >= $1
        ORDER BY date
        "#,
    )
    .bind(since_date)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(ImpactRecord {
            date: row.get("date"),
            food_saved_kg: row.get("food_saved_kg"),
            people_helped: row.get("people_helped"),
            meals_provided: row.get("meals_provided"),
            co2_reduced_kg: row.get("co2_reduced_kg"),
            waste_diverted_kg: row.get("waste_diverted_kg"),
            volunteer_hours: row.get("volunteer_hours"),
            partner_organizations: row.get("partner_organizations"),
        });
    }

    Ok(records)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let records = impact::read_impact_csv(file)?;
    let mut stored = 0usize;

    // One transaction so a failing row leaves nothing behind.
    let mut tx = pool.begin().await?;
    for (index, record) in records.iter().enumerate() {
        let changed = upsert_impact_record(&mut *tx, record)
            .await
            .with_context(|| format!("failed to store data row {} ({})", index + 1, record.date))?;
        if changed {
            stored += 1;
        }
    }
    tx.commit().await?;

    tracing::info!(stored, path = %csv_path.display(), "impact records imported");
    Ok(stored)
}

fn listing_from_row(row: &PgRow) -> anyhow::Result<FoodListing> {
    Ok(FoodListing {
        id: row.get("id"),
        donor_name: row.get("donor_name"),
        title: row.get("title"),
        description: row.get("description"),
        quantity_kg: row.get("quantity_kg"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        status: row.get::<String, _>("status").parse()?,
        pickup_by: row.get("pickup_by"),
        created_at: row.get("created_at"),
    })
}

fn claim_from_row(row: &PgRow) -> anyhow::Result<FoodClaim> {
    Ok(FoodClaim {
        id: row.get("id"),
        listing_id: row.get("listing_id"),
        claimant_name: row.get("claimant_name"),
        claimant_email: row.get("claimant_email"),
        quantity_kg: row.get("quantity_kg"),
        status: row.get::<String, _>("status").parse()?,
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

fn check_quantity(quantity_kg: f64) -> Result<(), FoodShareError> {
    if quantity_kg.is_finite() && quantity_kg > 0.0 {
        Ok(())
    } else {
        Err(FoodShareError::InvalidQuantity(quantity_kg))
    }
}

/// Validates a claim of `requested` kg against what is left on the listing.
fn check_available(
    requested: f64,
    listing_kg: f64,
    already_claimed_kg: f64,
) -> Result<(), FoodShareError> {
    check_quantity(requested)?;
    let available = (listing_kg - already_claimed_kg).max(0.0);
    if requested > available {
        return Err(FoodShareError::ClaimExceedsAvailable {
            requested,
            available,
        });
    }
    Ok(())
}

pub async fn create_listing(pool: &PgPool, listing: &NewListing) -> anyhow::Result<FoodListing> {
    check_quantity(listing.quantity_kg)?;
    if let Some(location) = listing.location {
        anyhow::ensure!(
            location.is_valid(),
            "listing location {}, {} is out of range",
            location.latitude,
            location.longitude
        );
    }

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO food_share.food_listings
        (id, donor_name, title, description, quantity_kg, latitude, longitude, status, pickup_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {LISTING_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&listing.donor_name)
    .bind(&listing.title)
    .bind(&listing.description)
    .bind(listing.quantity_kg)
    .bind(listing.location.map(|c| c.latitude))
    .bind(listing.location.map(|c| c.longitude))
    .bind(Status::Pending.as_str())
    .bind(listing.pickup_by)
    .fetch_one(pool)
    .await?;

    let created = listing_from_row(&row)?;
    tracing::info!(listing_id = %created.id, title = %created.title, "listing posted");
    Ok(created)
}

pub async fn fetch_listings(pool: &PgPool, status: Option<Status>) -> anyhow::Result<Vec<FoodListing>> {
    let mut query = format!("SELECT {LISTING_COLUMNS} FROM food_share.food_listings");
    if status.is_some() {
        query.push_str(" WHERE status = $1");
    }
    query.push_str(" ORDER BY created_at DESC");

    let mut rows = sqlx::query(&query);
    if let Some(value) = status {
        rows = rows.bind(value.as_str());
    }

    rows.fetch_all(pool)
        .await?
        .iter()
        .map(listing_from_row)
        .collect()
}

/// Admin moderation of a listing: approve or decline.
pub async fn moderate_listing(pool: &PgPool, listing_id: Uuid, decision: Status) -> anyhow::Result<FoodListing> {
    anyhow::ensure!(
        matches!(decision, Status::Approved | Status::Declined),
        "moderation decision must be approve or decline, got {decision}"
    );

    let mut tx = pool.begin().await?;
    let row = sqlx::query(&format!(
        "SELECT {LISTING_COLUMNS} FROM food_share.food_listings WHERE id = $1 FOR UPDATE"
    ))
    .bind(listing_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(FoodShareError::ListingNotFound(listing_id))?;
    let listing = listing_from_row(&row)?;
    let next = listing.status.transition(decision, "listing")?;

    let row = sqlx::query(&format!(
        "UPDATE food_share.food_listings SET status = $2 WHERE id = $1 RETURNING {LISTING_COLUMNS}"
    ))
    .bind(listing_id)
    .bind(next.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(%listing_id, status = %next, "listing moderated");
    listing_from_row(&row)
}

pub async fn create_claim(pool: &PgPool, claim: &NewClaim) -> anyhow::Result<FoodClaim> {
    check_quantity(claim.quantity_kg)?;

    let mut tx = pool.begin().await?;
    let row = sqlx::query(&format!(
        "SELECT {LISTING_COLUMNS} FROM food_share.food_listings WHERE id = $1 FOR UPDATE"
    ))
    .bind(claim.listing_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(FoodShareError::ListingNotFound(claim.listing_id))?;
    let listing = listing_from_row(&row)?;

    if listing.status != Status::Approved {
        return Err(FoodShareError::ListingNotClaimable {
            id: listing.id,
            status: listing.status.to_string(),
        }
        .into());
    }

    let claimed_kg: f64 = sqlx::query(
        r#"
        SELECT COALESCE(SUM(quantity_kg), 0)::float8 AS claimed
        FROM food_share.food_claims
        WHERE listing_id = $1 AND status <> 'declined'
        "#,
    )
    .bind(listing.id)
    .fetch_one(&mut *tx)
    .await?
    .get("claimed");
    check_available(claim.quantity_kg, listing.quantity_kg, claimed_kg)?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO food_share.food_claims
        (id, listing_id, claimant_name, claimant_email, quantity_kg, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {CLAIM_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(listing.id)
    .bind(&claim.claimant_name)
    .bind(claim.claimant_email.trim())
    .bind(claim.quantity_kg)
    .bind(Status::Pending.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    let created = claim_from_row(&row)?;
    tracing::info!(claim_id = %created.id, listing_id = %listing.id, quantity_kg = created.quantity_kg, "claim requested");
    Ok(created)
}

/// Advances a claim. Completing a claim also completes its approved listing.
pub async fn resolve_claim(pool: &PgPool, claim_id: Uuid, next: Status) -> anyhow::Result<FoodClaim> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query(&format!(
        "SELECT {CLAIM_COLUMNS} FROM food_share.food_claims WHERE id = $1 FOR UPDATE"
    ))
    .bind(claim_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(FoodShareError::ClaimNotFound(claim_id))?;
    let claim = claim_from_row(&row)?;
    let next = claim.status.transition(next, "claim")?;

    let row = sqlx::query(&format!(
        r#"
        UPDATE food_share.food_claims
        SET status = $2,
            completed_at = CASE WHEN $2 = 'completed' THEN now() ELSE completed_at END
        WHERE id = $1
        RETURNING {CLAIM_COLUMNS}
        "#
    ))
    .bind(claim_id)
    .bind(next.as_str())
    .fetch_one(&mut *tx)
    .await?;

    if next == Status::Completed {
        let completed = sqlx::query(
            "UPDATE food_share.food_listings SET status = 'completed' WHERE id = $1 AND status = 'approved'",
        )
        .bind(claim.listing_id)
        .execute(&mut *tx)
        .await?;
        if completed.rows_affected() > 0 {
            tracing::info!(listing_id = %claim.listing_id, "listing completed");
        }
    }
    tx.commit().await?;

    tracing::info!(%claim_id, status = %next, "claim resolved");
    claim_from_row(&row)
}

pub async fn fetch_completed_claims(
    pool: &PgPool,
    since_date: Option<NaiveDate>,
) -> anyhow::Result<Vec<FoodClaim>> {
    sqlx::query(&format!(
        r#"
        SELECT {CLAIM_COLUMNS}
        FROM food_share.food_claims
        WHERE status = 'completed'
          AND ($1::date IS NULL OR COALESCE(completed_at, created_at)::date >= $1)
        ORDER BY COALESCE(completed_at, created_at)
        "#
    ))
    .bind(since_date)
    .fetch_all(pool)
    .await?
    .iter()
    .map(claim_from_row)
    .collect()
}

/// Stored records and completed claims on or after `since_date`.
pub async fn fetch_impact_sources(
    pool: &PgPool,
    since_date: Option<NaiveDate>,
) -> anyhow::Result<ImpactSources> {
    let records = fetch_impact_records(pool, since_date).await?;
    let claims = fetch_completed_claims(pool, since_date).await?;
    tracing::debug!(records = records.len(), claims = claims.len(), "impact inputs fetched");
    Ok(ImpactSources { records, claims })
}

pub async fn listen_for_changes(pool: &PgPool) -> anyhow::Result<PgListener> {
    let mut listener = PgListener::connect_with(pool)
        .await
        .context("failed to open notification connection")?;
    listener.listen(CHANGE_CHANNEL).await?;
    Ok(listener)
}
