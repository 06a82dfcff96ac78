// Parking Access - Operator CLI
//
// Every command goes through the same AccessController the HTTP server uses.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use parking_access::{
    apply_layout, load_layout_csv, seed_demo_facility, AccessController, ParkingConfig,
    ParkingError, PlateStatus, SpotCategory, SystemClock,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "parking-access")]
#[command(about = "Residential parking access control: entries, exits, visitor billing")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "PARKING_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed the demo facility (5 resident spots, 5 visitor spots) into an empty store
    Init,
    /// Provision spots and residents from a layout CSV (spot,category,name,unit,plates)
    Import { csv: PathBuf },
    /// Register a resident arriving
    ResidentIn { plate: String },
    /// Register a resident leaving
    ResidentOut { plate: String },
    /// Admit a visitor to the first free visitor spot
    VisitorIn { plate: String },
    /// Charge a visitor and release their spot
    Settle { plate: String },
    /// Show what a visitor would pay right now
    Quote { plate: String },
    /// Look up a plate
    Status { plate: String },
    /// List every spot
    Spots,
    /// Visitors currently parked
    Active,
    /// Occupancy and revenue summary
    Stats,
    /// Recently settled visitor sessions
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parking_access=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ParkingConfig::load(args.config.as_deref())?;

    // Provisioning commands start from the raw store, never the auto-seeded one
    match &args.command {
        Command::Init => {
            let store = config.connect_store()?;
            if seed_demo_facility(store.as_ref())? {
                println!("✓ Demo facility created");
            } else {
                println!("⚠️  Store already has spots, nothing to do");
            }
            return Ok(());
        }
        Command::Import { csv } => {
            let store = config.connect_store()?;
            let rows = load_layout_csv(csv)?;
            let (residents, visitors) = apply_layout(store.as_ref(), &rows)?;
            println!(
                "✓ Provisioned {} resident spots and {} visitor spots",
                residents, visitors
            );
            return Ok(());
        }
        _ => {}
    }

    let controller = AccessController::bootstrap(
        config.open_store()?,
        config.tariff.calculator(),
        Arc::new(SystemClock),
    )
    .context("Failed to load parking state")?;
    info!(backend = controller.backend(), "parking state loaded");

    match run(&controller, args.command) {
        Ok(()) => Ok(()),
        Err(err) => {
            // Typed rejections are normal outcomes: report and exit non-zero
            eprintln!("❌ {}", err);
            std::process::exit(match err {
                ParkingError::PersistenceFailure(_) | ParkingError::StatePoisoned => 3,
                _ => 2,
            });
        }
    }
}

fn run(controller: &AccessController, command: Command) -> parking_access::Result<()> {
    match command {
        Command::Init | Command::Import { .. } => {}
        Command::ResidentIn { plate } => {
            let access = controller.resident_entry(&plate)?;
            println!(
                "✓ Welcome {} (unit {}), spot {} now OCCUPIED",
                access.resident.name, access.resident.unit, access.spot_id
            );
        }
        Command::ResidentOut { plate } => {
            let access = controller.resident_exit(&plate)?;
            println!(
                "✓ Goodbye {} (unit {}), spot {} now FREE",
                access.resident.name, access.resident.unit, access.spot_id
            );
        }
        Command::VisitorIn { plate } => {
            let ticket = controller.visitor_entry(&plate)?;
            println!(
                "✓ Visitor {} assigned spot {} at {}",
                ticket.plate,
                ticket.spot_id,
                ticket.entry_time.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Command::Settle { plate } => {
            let receipt = controller.visitor_settle(&plate)?;
            println!("🧾 Receipt for {}", receipt.plate);
            println!("   Spot:    {}", receipt.spot_id);
            println!("   Entry:   {}", receipt.entry_time.format("%Y-%m-%d %H:%M:%S"));
            println!("   Exit:    {}", receipt.exit_time.format("%Y-%m-%d %H:%M:%S"));
            println!("   Hours:   {:.2}", receipt.elapsed_hours);
            println!("   Amount:  ${}", receipt.amount);
        }
        Command::Quote { plate } => {
            let quote = controller.quote(&plate)?;
            println!(
                "💵 {} has been parked {:.2} h, amount due ${}",
                quote.plate, quote.elapsed_hours, quote.amount
            );
        }
        Command::Status { plate } => match controller.plate_status(&plate)? {
            PlateStatus::Resident {
                resident,
                spot_id,
                state,
            } => {
                println!("👤 Resident {} (unit {})", resident.name, resident.unit);
                println!("   Spot {} is {}", spot_id, state.as_str());
            }
            PlateStatus::ActiveVisitor {
                session,
                elapsed_hours,
                fare_so_far,
            } => {
                println!("🚗 Active visitor {} on spot {}", session.plate, session.spot_id);
                println!("   Parked {:.2} h", elapsed_hours);
                if let Some(fare) = fare_so_far {
                    println!("   Amount due so far ${}", fare);
                }
            }
            PlateStatus::Unregistered { plate } => {
                println!("❔ {} is not registered; use visitor-in to admit", plate);
            }
        },
        Command::Spots => {
            for spot in controller.snapshot()? {
                let owner = spot
                    .owner
                    .map(|id| format!("resident #{}", id))
                    .unwrap_or_default();
                let marker = match spot.category {
                    SpotCategory::Resident => "R",
                    SpotCategory::Visitor => "V",
                };
                println!("{:>4} [{}] {:<9} {}", spot.id, marker, spot.state.as_str(), owner);
            }
        }
        Command::Active => {
            let now = controller.now();
            for session in controller.stats().active_visitors()? {
                let due = controller
                    .tariff()
                    .fare(session.entry_time, now)
                    .unwrap_or_default();
                println!(
                    "{:<10} spot {:>3}  since {}  ${} so far",
                    session.plate,
                    session.spot_id,
                    session.entry_time.format("%m-%d %H:%M"),
                    due
                );
            }
        }
        Command::Stats => {
            let stats = controller.stats().summary(controller.now())?;
            let occ = stats.occupancy;
            println!("📊 Parking summary ({})", stats.day);
            println!(
                "   Resident spots: {} total, {} occupied, {} free",
                occ.resident.total, occ.resident.occupied, occ.resident.free
            );
            println!(
                "   Visitor spots:  {} total, {} occupied, {} free",
                occ.visitor.total, occ.visitor.occupied, occ.visitor.free
            );
            println!("   Active visitors: {}", stats.open_sessions);
            println!("   Revenue today:   ${}", stats.revenue_today);
            println!("   Revenue total:   ${}", stats.revenue_total);
        }
        Command::History { limit } => {
            for session in controller.stats().recent_sessions(limit)? {
                println!(
                    "{:<10} spot {:>3}  {} → {}  {:>6.2} h  ${}",
                    session.plate,
                    session.spot_id,
                    session.entry_time.format("%m-%d %H:%M"),
                    session
                        .exit_time
                        .map(|t| t.format("%m-%d %H:%M").to_string())
                        .unwrap_or_default(),
                    session.elapsed_hours.unwrap_or_default(),
                    session.amount.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
