use std::collections::{BTreeMap, HashSet};
use std::io::Read;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};

use crate::models::{FoodClaim, ImpactRecord, ImpactSources, ImpactTotals, MonthlyImpact, Status};

/// kg CO2-equivalent avoided per kg of food kept out of landfill.
pub const CO2_KG_PER_FOOD_KG: f64 = 2.5;
/// Average weight of one meal.
pub const FOOD_KG_PER_MEAL: f64 = 0.42;

pub fn cutoff_date(since_days: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(since_days.max(1))
}

pub fn aggregate(records: &[ImpactRecord]) -> ImpactTotals {
    let mut totals = ImpactTotals::default();

    for record in records {
        totals.record_count += 1;
        totals.first_date = Some(match totals.first_date {
            Some(first) => first.min(record.date),
            None => record.date,
        });
        totals.last_date = Some(match totals.last_date {
            Some(last) => last.max(record.date),
            None => record.date,
        });
        totals.food_saved_kg += record.food_saved_kg;
        totals.people_helped = totals.people_helped.saturating_add(record.people_helped);
        totals.meals_provided = totals.meals_provided.saturating_add(record.meals_provided);
        totals.co2_reduced_kg += record.co2_reduced_kg;
        totals.waste_diverted_kg += record.waste_diverted_kg;
        totals.volunteer_hours += record.volunteer_hours;
        totals.partner_organizations = totals.partner_organizations.max(record.partner_organizations);
    }

    totals
}

/// Stored records plus the claims-derived days they sit alongside.
pub fn combine(sources: &ImpactSources) -> Vec<ImpactRecord> {
    let mut records = sources.records.clone();
    records.extend(derive_daily_from_claims(&sources.claims));
    records
}

/// Totals over `sources`; `record_count` counts stored records only.
pub fn aggregate_sources(sources: &ImpactSources) -> ImpactTotals {
    let mut totals = aggregate(&combine(sources));
    totals.record_count = sources.records.len();
    totals.claim_count = sources
        .claims
        .iter()
        .filter(|claim| claim.status == Status::Completed)
        .count();
    totals
}

pub fn estimate_co2_kg(food_kg: f64) -> f64 {
    if food_kg.is_finite() && food_kg > 0.0 {
        food_kg * CO2_KG_PER_FOOD_KG
    } else {
        0.0
    }
}

pub fn estimate_meals(food_kg: f64) -> i64 {
    if food_kg.is_finite() && food_kg > 0.0 {
        (food_kg / FOOD_KG_PER_MEAL).floor() as i64
    } else {
        0
    }
}

/// Impact of the completed claims in `claims`, dated `date`.
pub fn derive_from_claims(date: NaiveDate, claims: &[FoodClaim]) -> ImpactRecord {
    let mut record = ImpactRecord::empty(date);
    let mut claimants = HashSet::new();

    for claim in claims.iter().filter(|claim| claim.status == Status::Completed) {
        if claim.quantity_kg.is_finite() && claim.quantity_kg > 0.0 {
            record.food_saved_kg += claim.quantity_kg;
        }
        claimants.insert(claim.claimant_email.trim().to_lowercase());
    }

    record.waste_diverted_kg = record.food_saved_kg;
    record.people_helped = claimants.len() as i64;
    record.meals_provided = estimate_meals(record.food_saved_kg);
    record.co2_reduced_kg = estimate_co2_kg(record.food_saved_kg);
    record
}

/// One derived record per day on which completed claims landed, oldest first.
pub fn derive_daily_from_claims(claims: &[FoodClaim]) -> Vec<ImpactRecord> {
    let mut days: BTreeMap<NaiveDate, Vec<FoodClaim>> = BTreeMap::new();

    for claim in claims.iter().filter(|claim| claim.status == Status::Completed) {
        days.entry(claim.impact_date()).or_default().push(claim.clone());
    }

    days.into_iter()
        .map(|(date, claims)| derive_from_claims(date, &claims))
        .collect()
}

pub fn summarize_by_month(records: &[ImpactRecord]) -> Vec<MonthlyImpact> {
    let mut months: BTreeMap<String, Vec<ImpactRecord>> = BTreeMap::new();

    for record in records {
        months
            .entry(record.date.format("%Y-%m").to_string())
            .or_default()
            .push(record.clone());
    }

    months
        .into_iter()
        .map(|(month, records)| MonthlyImpact {
            month,
            totals: aggregate(&records),
        })
        .collect()
}

pub fn read_impact_csv<R: Read>(reader: R) -> anyhow::Result<Vec<ImpactRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<ImpactRecord>().enumerate() {
        let record = result.with_context(|| format!("invalid impact record on data row {}", index + 1))?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).expect("valid date")
    }

    fn record(on: NaiveDate, food_saved_kg: f64, partner_organizations: i64) -> ImpactRecord {
        ImpactRecord {
            date: on,
            food_saved_kg,
            people_helped: 4,
            meals_provided: 10,
            co2_reduced_kg: food_saved_kg * 2.0,
            waste_diverted_kg: food_saved_kg,
            volunteer_hours: 1.5,
            partner_organizations,
        }
    }

    fn claim(email: &str, quantity_kg: f64, status: Status) -> FoodClaim {
        FoodClaim {
            id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            claimant_name: "Sam Rivera".to_string(),
            claimant_email: email.to_string(),
            quantity_kg,
            status,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn completed_on(email: &str, quantity_kg: f64, on: NaiveDate) -> FoodClaim {
        let at = on.and_hms_opt(14, 30, 0).expect("valid time").and_utc();
        FoodClaim {
            created_at: at - Duration::days(2),
            completed_at: Some(at),
            ..claim(email, quantity_kg, Status::Completed)
        }
    }

    #[test]
    fn cutoff_date_respects_since_days() {
        assert_eq!(cutoff_date(14), Utc::now().date_naive() - Duration::days(14));
        assert_eq!(cutoff_date(0), Utc::now().date_naive() - Duration::days(1));
    }

    #[test]
    fn empty_input_yields_zero_totals() {
        let totals = aggregate(&[]);
        assert_eq!(totals, ImpactTotals::default());
        assert_eq!(totals.food_saved_kg, 0.0);
        assert!(totals.first_date.is_none());
    }

    #[test]
    fn sums_additive_fields_and_maxes_partners() {
        let records = vec![
            record(date(1, 10), 12.5, 3),
            record(date(1, 3), 7.25, 5),
            record(date(2, 1), 0.25, 2),
        ];

        let totals = aggregate(&records);
        assert_eq!(totals.record_count, 3);
        assert!((totals.food_saved_kg - 20.0).abs() < 1e-9);
        assert!((totals.co2_reduced_kg - 40.0).abs() < 1e-9);
        assert_eq!(totals.people_helped, 12);
        assert_eq!(totals.meals_provided, 30);
        assert!((totals.volunteer_hours - 4.5).abs() < 1e-9);
        assert_eq!(totals.partner_organizations, 5);
        assert_eq!(totals.first_date, Some(date(1, 3)));
        assert_eq!(totals.last_date, Some(date(2, 1)));
    }

    #[test]
    fn huge_counts_saturate_instead_of_overflowing() {
        let csv = "date,people_helped,mealsProvided\n2026-01-05,1e19,9223372036854775000\n2026-01-06,1e19,9223372036854775000\n";
        let records = read_impact_csv(csv.as_bytes()).expect("csv parses");
        assert_eq!(records[0].people_helped, i64::MAX);

        let totals = aggregate(&records);
        assert_eq!(totals.people_helped, i64::MAX);
        assert_eq!(totals.meals_provided, i64::MAX);
    }

    #[test]
    fn estimates_ignore_non_positive_weight() {
        assert_eq!(estimate_co2_kg(4.0), 10.0);
        assert_eq!(estimate_co2_kg(-1.0), 0.0);
        assert_eq!(estimate_co2_kg(f64::NAN), 0.0);
        assert_eq!(estimate_meals(4.2), 10);
        assert_eq!(estimate_meals(0.3), 0);
        assert_eq!(estimate_meals(-3.0), 0);
    }

    #[test]
    fn derives_impact_from_completed_claims_only() {
        let claims = vec![
            claim("sam@example.com", 4.0, Status::Completed),
            claim("SAM@example.com ", 2.0, Status::Completed),
            claim("lee@example.com", 2.3, Status::Completed),
            claim("kim@example.com", 50.0, Status::Approved),
            claim("ana@example.com", 9.0, Status::Declined),
        ];

        let derived = derive_from_claims(date(3, 1), &claims);
        assert!((derived.food_saved_kg - 8.3).abs() < 1e-9);
        assert_eq!(derived.waste_diverted_kg, derived.food_saved_kg);
        assert_eq!(derived.people_helped, 2);
        assert_eq!(derived.meals_provided, 19);
        assert!((derived.co2_reduced_kg - 20.75).abs() < 1e-9);
        assert_eq!(derived.partner_organizations, 0);
    }

    #[test]
    fn completed_claims_become_one_record_per_day() {
        let claims = vec![
            completed_on("sam@example.com", 4.0, date(1, 10)),
            completed_on("lee@example.com", 2.0, date(1, 10)),
            completed_on("sam@example.com", 1.0, date(2, 3)),
            claim("kim@example.com", 50.0, Status::Approved),
        ];

        let days = derive_daily_from_claims(&claims);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, date(1, 10));
        assert!((days[0].food_saved_kg - 6.0).abs() < 1e-9);
        assert_eq!(days[0].people_helped, 2);
        assert_eq!(days[1].date, date(2, 3));
        assert_eq!(days[1].people_helped, 1);
    }

    #[test]
    fn claim_impact_lands_in_the_month_it_happened() {
        let sources = ImpactSources {
            records: vec![record(date(2, 14), 5.0, 1)],
            claims: vec![completed_on("sam@example.com", 4.2, date(1, 10))],
        };

        let months = summarize_by_month(&combine(&sources));
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2026-01");
        assert!((months[0].totals.food_saved_kg - 4.2).abs() < 1e-9);
        assert_eq!(months[0].totals.meals_provided, 10);
        assert_eq!(months[1].month, "2026-02");
    }

    #[test]
    fn source_totals_count_stored_records_and_claims_separately() {
        let sources = ImpactSources {
            records: vec![record(date(1, 3), 2.0, 1), record(date(1, 4), 3.0, 2)],
            claims: vec![
                completed_on("sam@example.com", 4.0, date(1, 5)),
                completed_on("lee@example.com", 1.0, date(1, 6)),
                claim("kim@example.com", 9.0, Status::Pending),
            ],
        };

        let totals = aggregate_sources(&sources);
        assert_eq!(totals.record_count, 2);
        assert_eq!(totals.claim_count, 2);
        assert!((totals.food_saved_kg - 10.0).abs() < 1e-9);
        assert_eq!(totals.last_date, Some(date(1, 6)));
    }

    #[test]
    fn camel_case_csv_headers_are_accepted() {
        let csv = "\
date,foodSavedKg,peopleHelped,mealsProvided,co2ReducedKg,wasteDivertedKg,volunteerHours,partnerOrganizations
2026-01-05,12.5,8,30,31.25,12.5,3,4
";
        let records = read_impact_csv(csv.as_bytes()).expect("csv parses");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.food_saved_kg, 12.5);
        assert_eq!(record.people_helped, 8);
        assert_eq!(record.meals_provided, 30);
        assert_eq!(record.co2_reduced_kg, 31.25);
        assert_eq!(record.waste_diverted_kg, 12.5);
        assert_eq!(record.volunteer_hours, 3.0);
        assert_eq!(record.partner_organizations, 4);
    }

    #[test]
    fn groups_by_month_in_order() {
        let records = vec![
            record(date(2, 14), 5.0, 1),
            record(date(1, 2), 1.0, 4),
            record(date(1, 20), 2.0, 2),
        ];

        let months = summarize_by_month(&records);
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2026-01");
        assert_eq!(months[0].totals.record_count, 2);
        assert!((months[0].totals.food_saved_kg - 3.0).abs() < 1e-9);
        assert_eq!(months[0].totals.partner_organizations, 4);
        assert_eq!(months[1].month, "2026-02");
    }

    #[test]
    fn csv_rows_with_missing_or_bad_numbers_count_as_zero() {
        let csv = "\
date,food_saved_kg,people_helped,meals_provided,co2_reduced_kg,volunteer_hours,partner_organizations
2026-01-05,12.5,8,30,31.25,,4
2026-01-12,n/a,3,,7.5,2.5,6
";
        let records = read_impact_csv(csv.as_bytes()).expect("csv parses");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].volunteer_hours, 0.0);
        assert_eq!(records[0].waste_diverted_kg, 0.0);
        assert_eq!(records[1].food_saved_kg, 0.0);
        assert_eq!(records[1].meals_provided, 0);

        let totals = aggregate(&records);
        assert!((totals.food_saved_kg - 12.5).abs() < 1e-9);
        assert_eq!(totals.people_helped, 11);
        assert_eq!(totals.partner_organizations, 6);
    }

    #[test]
    fn csv_row_with_bad_date_is_rejected() {
        let csv = "date,food_saved_kg\n2026-01-05,1\nlast tuesday,2\n";
        let err = read_impact_csv(csv.as_bytes()).expect_err("bad date must fail");
        assert!(err.to_string().contains("data row 2"));
    }
}
