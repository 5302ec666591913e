use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::impact;
use crate::models::{FoodListing, ImpactSources, ImpactTotals, Status};

pub fn count_by_status(listings: &[FoodListing]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();

    for listing in listings {
        *counts.entry(listing.status.as_str()).or_insert(0) += 1;
    }

    counts
}

pub fn write_totals(output: &mut String, totals: &ImpactTotals) {
    let _ = writeln!(output, "- Food saved: {:.1} kg", totals.food_saved_kg);
    let _ = writeln!(output, "- Meals provided: {}", totals.meals_provided);
    let _ = writeln!(output, "- People helped: {}", totals.people_helped);
    let _ = writeln!(output, "- CO2 reduced: {:.1} kg", totals.co2_reduced_kg);
    let _ = writeln!(output, "- Waste diverted: {:.1} kg", totals.waste_diverted_kg);
    let _ = writeln!(output, "- Volunteer hours: {:.1}", totals.volunteer_hours);
    let _ = writeln!(output, "- Partner organizations: {}", totals.partner_organizations);
}

pub fn build_report(
    cutoff: Option<NaiveDate>,
    sources: &ImpactSources,
    listings: &[FoodListing],
) -> String {
    let totals = impact::aggregate_sources(sources);
    let months = impact::summarize_by_month(&impact::combine(sources));
    let statuses = count_by_status(listings);

    let mut output = String::new();
    let window = match cutoff {
        Some(date) => format!("since {date}"),
        None => "all time".to_string(),
    };

    let _ = writeln!(output, "# Food Sharing Impact Report");
    let _ = writeln!(
        output,
        "Covering {} across {} stored records and {} completed claims",
        window, totals.record_count, totals.claim_count
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Totals");

    if totals.record_count == 0 && totals.claim_count == 0 {
        let _ = writeln!(output, "No impact recorded for this window.");
    } else {
        write_totals(&mut output, &totals);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Breakdown");

    if months.is_empty() {
        let _ = writeln!(output, "No impact recorded for this window.");
    } else {
        for month in months.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.1} kg saved, {} meals, {:.1} kg CO2 reduced",
                month.month,
                month.totals.food_saved_kg,
                month.totals.meals_provided,
                month.totals.co2_reduced_kg
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Listings");

    if statuses.is_empty() {
        let _ = writeln!(output, "No listings posted yet.");
    } else {
        for (status, count) in statuses.iter() {
            let _ = writeln!(output, "- {status}: {count}");
        }
    }

    let mut open: Vec<&FoodListing> = listings
        .iter()
        .filter(|listing| listing.status == Status::Approved)
        .collect();
    // Listings without a pickup deadline sort last.
    open.sort_by_key(|listing| (listing.pickup_by.is_none(), listing.pickup_by));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Listings");

    if open.is_empty() {
        let _ = writeln!(output, "No listings are waiting to be claimed.");
    } else {
        for listing in open.iter().take(5) {
            let pickup = listing
                .pickup_by
                .map(|date| date.to_string())
                .unwrap_or_else(|| "no deadline".to_string());
            let _ = writeln!(
                output,
                "- {} from {} ({:.1} kg, pick up by {})",
                listing.title, listing.donor_name, listing.quantity_kg, pickup
            );
        }
    }

    output
}
