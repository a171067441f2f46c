use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use boxstash_ledger::{Account, InMemoryLedger};
use boxstash_plan::{chunks_for, partition, BatchPlanner, CostBreakdown, CostModel};
use boxstash_sdk::{BoxStash, ClientConfig, DeleteReport, UploadReport};
use boxstash_types::OwnerKey;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Estimate(args) => cmd_estimate(args, &config, cli.format),
        Command::Plan(args) => cmd_plan(args, &config, cli.format),
        Command::Simulate(args) => cmd_simulate(args, config, cli.format),
        Command::Config(args) => cmd_config(args, &config, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ClientConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            ClientConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))
        }
        None => Ok(ClientConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_estimate(args: EstimateArgs, config: &ClientConfig, format: OutputFormat) -> anyhow::Result<()> {
    let len = match (args.size, &args.file) {
        (Some(size), _) => size,
        (None, Some(file)) => std::fs::metadata(file)
            .with_context(|| format!("reading {}", file.display()))?
            .len(),
        (None, None) => anyhow::bail!("either a file or --size is required"),
    };
    let cost = CostModel::from_limits(&config.limits).breakdown(len)?;
    if format == OutputFormat::Json {
        return print_json(&cost);
    }
    println!(
        "{} bytes → {} slot(s), tail {} bytes",
        len.to_string().bold(),
        cost.num_slots.to_string().cyan(),
        cost.tail_size
    );
    print_breakdown(&cost);
    Ok(())
}

fn print_breakdown(cost: &CostBreakdown) {
    println!("  slot boxes   {:>14}", cost.slot_boxes);
    println!("  full slots   {:>14}", cost.full_slots);
    println!("  slot keys    {:>14}", cost.slot_keys);
    println!("  tail slot    {:>14}", cost.tail_slot);
    println!("  metadata     {:>14}", cost.metadata);
    println!("  {}        {:>14}", "total".bold(), cost.total().to_string().green().bold());
}

#[derive(Debug, Serialize)]
struct SlotPlan {
    /// Index relative to the blob's first slot.
    index: u64,
    size: u64,
    chunks: usize,
    /// Calls in each write batch, in submission order.
    write_batches: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct PlanSummary {
    blob_len: u64,
    tail_size: u64,
    write_payload: u64,
    slots: Vec<SlotPlan>,
    delete_batches: usize,
    calls_per_delete_batch: usize,
    total_batches: usize,
    cost: CostBreakdown,
}

fn build_plan(blob: &[u8], config: &ClientConfig) -> anyhow::Result<PlanSummary> {
    let limits = &config.limits;
    let planner = BatchPlanner::new(limits.clone(), config.call_params)?;
    let cost = CostModel::from_limits(limits).breakdown(blob.len() as u64)?;
    let layout = partition(blob, limits.slot_capacity)?;
    // Slot indices are assigned by the store; plan against a fresh one.
    let owner = OwnerKey::from_bytes([0; 32]);

    let mut slots = Vec::with_capacity(layout.slots.len());
    for (index, data) in (0u64..).zip(&layout.slots) {
        let chunks = chunks_for(data, limits.write_payload())?;
        let batches = planner.plan_write_batches(owner, index, data.len() as u64, &chunks)?;
        slots.push(SlotPlan {
            index,
            size: data.len() as u64,
            chunks: chunks.len(),
            write_batches: batches.iter().map(|b| b.len()).collect(),
        });
    }
    let padding = limits.delete_padding();
    let deletes = planner.plan_delete_batches(owner, 0..=layout.num_slots() - 1, padding)?;
    let writes: usize = slots.iter().map(|s| s.write_batches.len()).sum();

    Ok(PlanSummary {
        blob_len: blob.len() as u64,
        tail_size: layout.tail_size,
        write_payload: limits.write_payload(),
        // allocate + writes + finalize
        total_batches: 1 + writes + 1,
        delete_batches: deletes.len(),
        calls_per_delete_batch: 1 + padding,
        slots,
        cost,
    })
}

fn cmd_plan(args: PlanArgs, config: &ClientConfig, format: OutputFormat) -> anyhow::Result<()> {
    let blob = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let plan = build_plan(&blob, config)?;
    if format == OutputFormat::Json {
        return print_json(&plan);
    }
    println!(
        "{} bytes in {} slot(s), {}-byte writes",
        plan.blob_len.to_string().bold(),
        plan.slots.len().to_string().cyan(),
        plan.write_payload
    );
    for slot in &plan.slots {
        let sizes: Vec<String> = slot.write_batches.iter().map(ToString::to_string).collect();
        println!(
            "  slot {:<4} {:>6} bytes  {:>3} chunks  batches [{}]",
            slot.index.to_string().yellow(),
            slot.size,
            slot.chunks,
            sizes.join(", ")
        );
    }
    println!("Upload: {} batches", plan.total_batches.to_string().bold());
    println!(
        "Delete: {} batches of {} calls",
        plan.delete_batches.to_string().bold(),
        plan.calls_per_delete_batch
    );
    print_breakdown(&plan.cost);
    Ok(())
}

#[derive(Debug, Serialize)]
struct SimulationSummary {
    locator: String,
    verified: bool,
    upload: UploadReport,
    delete: Option<DeleteReport>,
    /// Uploader balance once funded, and after the run.
    balance_before: u64,
    balance_after: u64,
}

fn parse_seed(hex_seed: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_seed).context("seed is not hex")?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("seed must be 32 bytes, got {}", b.len()))
}

/// Fee allowance generous enough for every batch of an upload and delete.
fn fee_allowance(blob_len: u64, config: &ClientConfig) -> u64 {
    let limits = &config.limits;
    let slots = blob_len.div_ceil(limits.slot_capacity);
    let writes = blob_len.div_ceil(limits.write_payload()) + slots;
    let erases = slots * (1 + limits.delete_padding() as u64);
    2 * config.call_params.fee * (writes + erases + 4)
}

async fn simulate(
    blob: &[u8],
    account: Account,
    args: &SimulateArgs,
    config: ClientConfig,
) -> anyhow::Result<SimulationSummary> {
    let ledger = Arc::new(InMemoryLedger::new(args.app_id, config.limits.clone()));
    let allowance = fee_allowance(blob.len() as u64, &config);
    let stash = BoxStash::new(ledger.clone(), account.clone(), args.app_id, config)?;
    let rent = stash.estimate(blob.len() as u64)?.total();
    let balance_before = rent + allowance;
    ledger.fund(account.address(), balance_before)?;

    let upload = stash.upload(blob).await?;
    let locator = stash.locator();
    let resolved = stash.resolve_locator(&locator).await?;
    anyhow::ensure!(resolved == blob, "resolved document differs from the uploaded file");

    let delete = if args.keep {
        None
    } else {
        Some(stash.delete().await?)
    };
    Ok(SimulationSummary {
        locator: locator.to_string(),
        verified: true,
        upload,
        delete,
        balance_before,
        balance_after: ledger.balance(&account.address())?,
    })
}

fn cmd_simulate(args: SimulateArgs, config: ClientConfig, format: OutputFormat) -> anyhow::Result<()> {
    let blob = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let account = match &args.seed {
        Some(seed) => Account::from_seed(parse_seed(seed)?),
        None => Account::generate(),
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(simulate(&blob, account, &args, config))?;
    if format == OutputFormat::Json {
        return print_json(&summary);
    }

    let upload = &summary.upload;
    println!("{} Uploaded {} bytes", "✓".green().bold(), blob.len());
    println!("  Locator: {}", summary.locator.cyan());
    println!(
        "  Slots: {}..={} ({} bytes in the last)",
        upload.record.start, upload.record.end, upload.record.tail_size
    );
    println!("  Rent: {}", upload.cost.total().to_string().yellow());
    println!(
        "  Batches: {} ({} transactions)",
        upload.batches.len(),
        upload.tx_count()
    );
    println!("  Digest: {}", upload.digest.dimmed());
    println!("{} Resolved document matches", "✓".green().bold());
    match &summary.delete {
        Some(delete) => {
            println!(
                "{} Deleted {} slot(s) in {} batches, metadata gone",
                "✓".green().bold(),
                delete.slots_erased,
                delete.batches.len()
            );
            let spent = summary.balance_before - summary.balance_after;
            println!("  Fees paid: {}", spent.to_string().yellow());
        }
        None => println!("  Blob kept ({})", "--keep".dimmed()),
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs, config: &ClientConfig, format: OutputFormat) -> anyhow::Result<()> {
    if let Some(path) = &args.write {
        config.save(path)?;
        println!("{} Wrote {}", "✓".green().bold(), path.display());
        return Ok(());
    }
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Text => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
