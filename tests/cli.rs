//! Command line surface checks that need no database.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("foodshare-impact").unwrap();
    cmd.env_remove("DATABASE_URL").env("RUST_LOG", "off");
    cmd
}

#[test]
fn help_lists_marketplace_commands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("moderate"))
        .stdout(predicate::str::contains("nearby"))
        .stdout(predicate::str::contains("impact"));
}

#[test]
fn missing_database_url_is_reported() {
    cli()
        .arg("impact")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL must be set"));
}

#[test]
fn invalid_pool_size_names_the_variable() {
    cli()
        .env("DATABASE_URL", "postgres://localhost/food_share")
        .env("DB_MAX_CONNECTIONS", "many")
        .arg("seed")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DB_MAX_CONNECTIONS"));
}

#[test]
fn unknown_status_is_rejected_before_connecting() {
    cli()
        .args(["listings", "--status", "archived"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown status `archived`"));
}

#[test]
fn latitude_requires_longitude() {
    cli()
        .args([
            "post",
            "--title",
            "Bagels",
            "--donor",
            "Corner Bakery",
            "--quantity-kg",
            "2",
            "--lat",
            "40.7",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--lon"));
}
