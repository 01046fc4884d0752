//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `zoneblocks_core` linkage.
//! - Exercise one create/move round against a throwaway in-memory store.

use std::process::ExitCode;
use zoneblocks_core::db::open_db_in_memory;
use zoneblocks_core::{BlockKind, BlockService, MoveTarget, SqliteBlockStore, Zone};

fn main() -> ExitCode {
    println!("zoneblocks_core version={}", zoneblocks_core::core_version());
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("zoneblocks smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_db_in_memory()?;
    let service = BlockService::new(SqliteBlockStore::try_new(&conn)?);

    service.create_block(Zone::Permanent, "You are a careful reviewer.", BlockKind::Instruction)?;
    let notes = service.create_block(Zone::Stable, "Project notes and conventions.", BlockKind::Text)?;
    let draft = service.create_block(Zone::Working, "fn main() {}", BlockKind::Code)?;
    service.move_block(notes.block.id, Zone::Working, MoveTarget::before(draft.block.id))?;

    for zone in Zone::ALL {
        let utilization = service.zone_utilization(zone)?;
        println!(
            "zone={} used={} budget={} level={}",
            zone,
            utilization.used,
            utilization.budget,
            utilization.level.as_str()
        );
        for block in service.zone_view(zone)? {
            println!("  {:>6} {} {:?}", block.position, block.id, block.content);
        }
    }
    Ok(())
}
