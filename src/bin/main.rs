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

use clap::{Parser, Subcommand, ValueEnum};
use credit_ledger_rs::{
    DistributionId, DistributionStatus, Engine, EntryKind, InvoiceId, JsonFileStore, LineRequest,
    ManagerId, NewDistribution, NewInvoice, NewOutlet, NewProduct, OutletId, OutletType,
    PaymentType, ProductId, StoreId, TracingActivitySink,
};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Decimal places used for money columns in CSV reports.
const DECIMAL_PRECISION: u32 = 2;

/// Credit Ledger - administer outlet credit, invoices and stock distributions
///
/// State is kept as JSON documents in the data directory. Reports are
/// written to stdout as CSV; logs go to stderr (`RUST_LOG` controls verbosity).
#[derive(Parser, Debug)]
#[command(name = "credit-ledger")]
#[command(about = "Outlet credit and stock fulfillment ledger", long_about = None)]
struct Cli {
    /// Directory holding the ledger documents
    #[arg(long, env = "LEDGER_DATA_DIR", default_value = "./ledger-data")]
    data_dir: PathBuf,

    /// Name recorded as the actor on activity events
    #[arg(long, env = "LEDGER_ACTOR", default_value = "admin")]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new outlet
    AddOutlet {
        name: String,
        #[arg(long = "type", value_enum, default_value_t = OutletKind::Official)]
        kind: OutletKind,
        #[arg(long)]
        limit: Decimal,
    },
    /// Register a new product
    AddProduct {
        name: String,
        #[arg(long)]
        sku: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long, default_value_t = 0)]
        stock: u32,
        #[arg(long, default_value_t = 0)]
        min_stock: u32,
    },
    /// Add received stock to a product
    Restock { product: u32, quantity: u32 },
    /// Change an outlet's credit limit
    SetLimit { outlet: u32, limit: Decimal },
    /// Charge an outlet's credit directly
    Charge {
        outlet: u32,
        reference: String,
        amount: Decimal,
        #[arg(long, value_enum, default_value_t = ChargeKind::Invoice)]
        kind: ChargeKind,
    },
    /// Record a payment from an outlet
    Pay {
        outlet: u32,
        amount: Decimal,
        /// Clamp overpayments at zero instead of rejecting them
        #[arg(long)]
        clamp: bool,
    },
    /// Block an active outlet
    Block { outlet: u32, reason: String },
    /// Unblock a blocked outlet
    Unblock { outlet: u32 },
    /// Raise a pending invoice
    Invoice {
        outlet: u32,
        #[arg(long, default_value_t = 1)]
        manager: u32,
        #[arg(long, default_value_t = 1)]
        store: u32,
        /// Charge the invoice to the outlet's credit
        #[arg(long)]
        credit: bool,
        /// Product line as PRODUCT:QUANTITY, repeatable
        #[arg(long = "line", value_parser = parse_line, required = true)]
        lines: Vec<LineRequest>,
    },
    /// Approve a pending invoice
    Approve { invoice: u32 },
    /// Reject a pending invoice
    Reject { invoice: u32 },
    /// Create a stock distribution
    Distribute {
        outlet: u32,
        #[arg(long, default_value_t = 1)]
        manager: u32,
        #[arg(long, default_value_t = 1)]
        store: u32,
        #[arg(long)]
        credit: bool,
        /// Discount percentage, applied to credit distributions only
        #[arg(long, default_value = "0")]
        discount: Decimal,
        #[arg(long = "line", value_parser = parse_line, required = true)]
        lines: Vec<LineRequest>,
    },
    /// Move a distribution to its next status
    Advance { distribution: u32, status: DistributionStatus },
    /// Delete a pending distribution and return its stock
    DeleteDistribution { distribution: u32 },
    /// Print outlets as CSV
    Outlets,
    /// Print products as CSV
    Products,
    /// Print an outlet's credit history as CSV
    History { outlet: u32 },
    /// Apply credit operations from a CSV file
    ///
    /// Expected format: type,outlet,reference,amount,reason
    Replay {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutletKind {
    Official,
    Dummy,
}

impl From<OutletKind> for OutletType {
    fn from(kind: OutletKind) -> Self {
        match kind {
            OutletKind::Official => OutletType::Official,
            OutletKind::Dummy => OutletType::Dummy,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ChargeKind {
    Invoice,
    Distribution,
}

impl From<ChargeKind> for EntryKind {
    fn from(kind: ChargeKind) -> Self {
        match kind {
            ChargeKind::Invoice => EntryKind::Invoice,
            ChargeKind::Distribution => EntryKind::Distribution,
        }
    }
}

fn parse_line(s: &str) -> Result<LineRequest, String> {
    let (product, quantity) = s
        .split_once(':')
        .ok_or_else(|| format!("expected PRODUCT:QUANTITY, got '{s}'"))?;
    let product_id = product
        .trim()
        .parse()
        .map_err(|e| format!("invalid product id '{product}': {e}"))?;
    let quantity = quantity
        .trim()
        .parse()
        .map_err(|e| format!("invalid quantity '{quantity}': {e}"))?;
    Ok(LineRequest {
        product_id: ProductId(product_id),
        quantity,
    })
}

fn payment_type(credit: bool) -> PaymentType {
    if credit {
        PaymentType::Credit
    } else {
        PaymentType::Paid
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let store = match JsonFileStore::open(&cli.data_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening data directory '{}': {}", cli.data_dir.display(), e);
            process::exit(1);
        }
    };

    let engine = match Engine::open(Arc::new(store), Arc::new(TracingActivitySink)) {
        Ok(engine) => engine.with_actor(cli.actor),
        Err(e) => {
            eprintln!("Error loading ledger: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&engine, cli.command, std::io::stdout()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Logs to stderr so CSV reports on stdout stay machine readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run<W: Write>(engine: &Engine, command: Command, mut out: W) -> Result<(), Box<dyn Error>> {
    match command {
        Command::AddOutlet { name, kind, limit } => {
            let outlet = engine.register_outlet(NewOutlet {
                name,
                outlet_type: kind.into(),
                credit_limit: limit,
            })?;
            print_json(&mut out, &outlet)
        }
        Command::AddProduct {
            name,
            sku,
            price,
            stock,
            min_stock,
        } => {
            let product = engine.register_product(NewProduct {
                name,
                sku,
                price,
                stock,
                min_stock,
            })?;
            print_json(&mut out, &product)
        }
        Command::Restock { product, quantity } => {
            print_json(&mut out, &engine.restock_product(ProductId(product), quantity)?)
        }
        Command::SetLimit { outlet, limit } => {
            print_json(&mut out, &engine.update_credit_limit(OutletId(outlet), limit)?)
        }
        Command::Charge {
            outlet,
            reference,
            amount,
            kind,
        } => {
            let settled = engine.charge_credit(OutletId(outlet), kind.into(), reference, amount)?;
            if let Some(warning) = settled.warning {
                warn!(%warning, "credit warning");
            }
            print_json(&mut out, &settled.entity)
        }
        Command::Pay {
            outlet,
            amount,
            clamp,
        } => {
            let outlet = if clamp {
                engine.credit_payment(OutletId(outlet), amount)?
            } else {
                engine.receive_payment(OutletId(outlet), amount)?
            };
            print_json(&mut out, &outlet)
        }
        Command::Block { outlet, reason } => {
            print_json(&mut out, &engine.block_outlet(OutletId(outlet), reason)?)
        }
        Command::Unblock { outlet } => {
            print_json(&mut out, &engine.unblock_outlet(OutletId(outlet))?)
        }
        Command::Invoice {
            outlet,
            manager,
            store,
            credit,
            lines,
        } => {
            let invoice = engine.create_invoice(NewInvoice {
                outlet_id: OutletId(outlet),
                manager_id: ManagerId(manager),
                store_id: StoreId(store),
                payment_type: payment_type(credit),
                products: lines,
                date: None,
            })?;
            print_json(&mut out, &invoice)
        }
        Command::Approve { invoice } => {
            let settled = engine.approve_invoice(InvoiceId(invoice))?;
            if let Some(warning) = settled.warning {
                warn!(%warning, "credit warning");
            }
            print_json(&mut out, &settled.entity)
        }
        Command::Reject { invoice } => {
            print_json(&mut out, &engine.reject_invoice(InvoiceId(invoice))?)
        }
        Command::Distribute {
            outlet,
            manager,
            store,
            credit,
            discount,
            lines,
        } => {
            let settled = engine.create_distribution(NewDistribution {
                outlet_id: OutletId(outlet),
                manager_id: ManagerId(manager),
                store_id: StoreId(store),
                payment_type: payment_type(credit),
                discount,
                products: lines,
                date: None,
            })?;
            if let Some(warning) = settled.warning {
                warn!(%warning, "credit warning");
            }
            print_json(&mut out, &settled.entity)
        }
        Command::Advance {
            distribution,
            status,
        } => print_json(
            &mut out,
            &engine.advance_distribution_status(DistributionId(distribution), status)?,
        ),
        Command::DeleteDistribution { distribution } => print_json(
            &mut out,
            &engine.delete_distribution(DistributionId(distribution))?,
        ),
        Command::Outlets => Ok(write_outlets(engine, out)?),
        Command::Products => Ok(write_products(engine, out)?),
        Command::History { outlet } => Ok(write_history(engine, OutletId(outlet), out)?),
        Command::Replay { input } => {
            let file = File::open(&input)?;
            let applied = process_credit_operations(engine, BufReader::new(file))?;
            writeln!(out, "applied {applied} operations")?;
            Ok(())
        }
    }
}

fn print_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), Box<dyn Error>> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Raw CSV record for the replay format.
///
/// Fields: `type, outlet, reference, amount, reason`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op_type: String,
    outlet: u32,
    #[serde(default)]
    reference: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    reason: String,
}

/// Process credit operations from a CSV reader.
///
/// Rows are streamed, so arbitrarily large files are fine. Malformed rows
/// and rejected operations are skipped and logged.
///
/// # CSV Format
///
/// Expected columns: `type, outlet, reference, amount, reason`
/// - `type`: `invoice`, `distribution` (charges), `payment`, `block`, `unblock`
/// - `outlet`: Outlet id
/// - `reference`: Document reference for charges
/// - `amount`: Decimal amount (charges and payments)
/// - `reason`: Block reason
///
/// # Example
///
/// ```csv
/// type,outlet,reference,amount,reason
/// invoice,1,INV-1001,3000,
/// payment,1,,2000,
/// block,2,,,Disputed balance
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails. Individual operation errors are
/// logged but don't stop processing.
pub fn process_credit_operations<R: Read>(engine: &Engine, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut applied = 0;
    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(row, error = %e, "skipping malformed row");
                continue;
            }
        };

        match apply_record(engine, record) {
            Ok(()) => applied += 1,
            Err(e) => warn!(row, error = %e, "skipping rejected operation"),
        }
    }

    Ok(applied)
}

fn apply_record(engine: &Engine, record: CsvRecord) -> Result<(), Box<dyn Error>> {
    let outlet = OutletId(record.outlet);
    let amount = || record.amount.ok_or("missing amount");

    match record.op_type.to_lowercase().as_str() {
        "invoice" => {
            engine.charge_credit(outlet, EntryKind::Invoice, record.reference.clone(), amount()?)?;
        }
        "distribution" => {
            engine.charge_credit(
                outlet,
                EntryKind::Distribution,
                record.reference.clone(),
                amount()?,
            )?;
        }
        "payment" => {
            engine.receive_payment(outlet, amount()?)?;
        }
        "block" => {
            engine.block_outlet(outlet, record.reason.clone())?;
        }
        "unblock" => {
            engine.unblock_outlet(outlet)?;
        }
        other => return Err(format!("unknown operation '{other}'").into()),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct OutletRow {
    id: u32,
    name: String,
    #[serde(rename = "type")]
    outlet_type: OutletType,
    credit_limit: Decimal,
    credit_used: Decimal,
    usage_pct: u32,
    status: String,
    blocked_reason: String,
}

/// Write outlet credit states as CSV.
///
/// # CSV Format
///
/// Columns: `id, name, type, credit_limit, credit_used, usage_pct, status, blocked_reason`
pub fn write_outlets<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for outlet in engine.outlets() {
        wtr.serialize(OutletRow {
            id: outlet.id.0,
            usage_pct: outlet.usage_percentage(),
            name: outlet.name,
            outlet_type: outlet.outlet_type,
            credit_limit: outlet.credit_limit.round_dp(DECIMAL_PRECISION),
            credit_used: outlet.credit_used.round_dp(DECIMAL_PRECISION),
            status: outlet.status.to_string(),
            blocked_reason: outlet.blocked_reason.unwrap_or_default(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ProductRow {
    id: u32,
    name: String,
    sku: String,
    price: Decimal,
    stock: u32,
    min_stock: u32,
    status: String,
}

/// Write products with their derived stock status as CSV.
pub fn write_products<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for product in engine.products() {
        wtr.serialize(ProductRow {
            id: product.id.0,
            status: product.status().to_string(),
            name: product.name,
            sku: product.sku,
            price: product.price.round_dp(DECIMAL_PRECISION),
            stock: product.stock,
            min_stock: product.min_stock,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    date: String,
    kind: EntryKind,
    reference: String,
    amount: Decimal,
    balance_after: Decimal,
}

/// Write an outlet's credit history, oldest first, as CSV.
pub fn write_history<W: Write>(
    engine: &Engine,
    outlet_id: OutletId,
    writer: W,
) -> Result<(), Box<dyn Error>> {
    let outlet = engine
        .outlet(outlet_id)
        .ok_or_else(|| format!("outlet {outlet_id} not found"))?;
    let mut wtr = Writer::from_writer(writer);
    for entry in outlet.credit_history {
        wtr.serialize(HistoryRow {
            date: entry.date.to_rfc3339(),
            kind: entry.kind,
            reference: entry.reference_id,
            amount: entry.amount.round_dp(DECIMAL_PRECISION),
            balance_after: entry.balance_after.round_dp(DECIMAL_PRECISION),
        })?;
    }
    wtr.flush()?;
    Ok(())
}
