// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use course_ledger::adapters::memory::{InMemoryCatalog, InMemoryUserDirectory};
use course_ledger::ports::catalog::{Course, CourseCatalog, CourseStatus};
use course_ledger::ports::users::UserDirectory;
use course_ledger::{CourseId, LedgerConfig, LedgerError, LedgerStore, PurchaseOrchestrator, UserId};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Course Ledger - Replay wallet recharges and course purchases
///
/// Loads a course catalog, applies recharge and purchase commands from a CSV
/// file and writes the resulting account balances to stdout.
#[derive(Parser, Debug)]
#[command(name = "course-ledger")]
#[command(about = "Replays recharge and purchase CSVs against a course catalog", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: type,user,course,amount,remark
    /// Example: cargo run -- --catalog courses.csv commands.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Path to course catalog CSV
    ///
    /// Expected format: id,title,price,instructor,status,cover_image
    #[arg(long, value_name = "FILE")]
    catalog: PathBuf,

    /// Fraction of each sale kept by the platform
    #[arg(long, env = "COURSE_LEDGER_FEE_RATE", default_value = "0.05")]
    fee_rate: Decimal,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("course_ledger=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match LedgerConfig::new(args.fee_rate) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            process::exit(2);
        }
    };

    let catalog = match open(&args.catalog).and_then(|file| Ok(load_catalog(file)?)) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("error loading catalog '{}': {}", args.catalog.display(), e);
            process::exit(1);
        }
    };

    let orchestrator = PurchaseOrchestrator::new(
        config,
        Arc::new(catalog),
        Arc::new(InMemoryUserDirectory::new()),
    );

    let file = match open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!("error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    match process_commands(&orchestrator, file) {
        Ok(skipped) if !skipped.is_empty() => {
            info!(count = skipped.len(), lines = ?skipped, "some commands were skipped");
        }
        Ok(_) => {}
        Err(e) => {
            error!("error processing commands: {}", e);
            process::exit(1);
        }
    }

    if let Err(e) = write_balances(orchestrator.ledger(), std::io::stdout()) {
        error!("error writing output: {}", e);
        process::exit(1);
    }
}

fn open(path: &Path) -> Result<BufReader<File>, Box<dyn std::error::Error>> {
    Ok(BufReader::new(File::open(path)?))
}

/// Raw catalog row.
///
/// Fields: `id, title, price, instructor, status, cover_image`
#[derive(Debug, Deserialize)]
struct CourseRow {
    id: u32,
    title: String,
    price: Decimal,
    instructor: u32,
    status: CourseStatus,
    cover_image: Option<String>,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Course {
            id: CourseId(row.id),
            title: row.title,
            price: row.price,
            instructor_id: UserId(row.instructor),
            status: row.status,
            cover_image: row.cover_image.filter(|cover| !cover.is_empty()),
        }
    }
}

/// Loads a course catalog, skipping malformed rows.
pub fn load_catalog<R: Read>(reader: R) -> Result<InMemoryCatalog, csv::Error> {
    let catalog = InMemoryCatalog::new();
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CourseRow>() {
        match result {
            Ok(row) => catalog.insert_course(row.into()),
            Err(e) => warn!("skipping malformed catalog row: {}", e),
        }
    }
    Ok(catalog)
}

/// Raw command row.
///
/// Fields: `type, user, course, amount, remark`
#[derive(Debug, Deserialize)]
struct CommandRow {
    #[serde(rename = "type")]
    command: String,
    user: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    course: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    remark: Option<String>,
}

/// Applies commands in file order.
///
/// `recharge` needs `amount`, `purchase` needs `course`. Malformed rows,
/// unknown commands and rejected commands are logged with their CSV line
/// number and skipped. Returns the line numbers of the skipped rows.
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header row is unreadable.
pub fn process_commands<R, C, U>(
    orchestrator: &PurchaseOrchestrator<C, U>,
    reader: R,
) -> Result<Vec<u64>, csv::Error>
where
    R: Read,
    C: CourseCatalog,
    U: UserDirectory,
{
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut skipped = Vec::new();

    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|pos| pos.line());
                warn!(line, "skipping unreadable row: {}", e);
                skipped.extend(line);
                continue;
            }
        };
        let line = record.position().map_or(0, |pos| pos.line());
        let row = match record.deserialize::<CommandRow>(Some(&headers)) {
            Ok(row) => row,
            Err(e) => {
                warn!(line, "skipping malformed row: {}", e);
                skipped.push(line);
                continue;
            }
        };
        match apply(orchestrator, row) {
            Ok(true) => {}
            Ok(false) => skipped.push(line),
            Err(e) => {
                warn!(line, code = e.code(), "skipping command: {}", e);
                skipped.push(line);
            }
        }
    }
    Ok(skipped)
}

/// Runs one command. `Ok(false)` means the row named nothing to do.
fn apply<C, U>(orchestrator: &PurchaseOrchestrator<C, U>, row: CommandRow) -> Result<bool, LedgerError>
where
    C: CourseCatalog,
    U: UserDirectory,
{
    let user_id = UserId(row.user);
    match row.command.to_lowercase().as_str() {
        "recharge" => {
            let amount = row.amount.ok_or(LedgerError::InvalidAmount)?;
            let remark = row.remark.filter(|remark| !remark.is_empty());
            orchestrator.recharge(user_id, amount, remark)?;
        }
        "purchase" => {
            let Some(course) = row.course else {
                warn!(user_id = %user_id, "purchase without course id");
                return Ok(false);
            };
            orchestrator.purchase_course(user_id, CourseId(course))?;
        }
        other => {
            warn!(command = other, "unknown command");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Writes account balances as CSV, one row per user in id order.
///
/// # CSV Format
///
/// Columns: `user, available, frozen, total_credited, total_debited`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_balances<W: Write>(ledger: &LedgerStore, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for balance in ledger.balances() {
        wtr.serialize(&balance)?;
    }
    wtr.flush()?;
    Ok(())
}
