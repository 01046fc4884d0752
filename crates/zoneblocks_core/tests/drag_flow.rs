use zoneblocks_core::db::open_db_in_memory;
use zoneblocks_core::{
    BlockKind, BlockService, BlockStore, DragError, DragInteractionAdapter, DragState, HoverTarget,
    MoveError, SqliteBlockStore, Zone,
};

#[test]
fn release_applies_only_the_final_hover() {
    let conn = open_db_in_memory().unwrap();
    let service = BlockService::new(SqliteBlockStore::try_new(&conn).unwrap());

    let dragged = service.create_block(Zone::Stable, "d", BlockKind::Text).unwrap().block;
    let first = service.create_block(Zone::Working, "w1", BlockKind::Text).unwrap().block;
    let second = service.create_block(Zone::Working, "w2", BlockKind::Text).unwrap().block;
    let versions: Vec<u64> = Zone::ALL
        .iter()
        .map(|zone| service.store().zone(*zone).unwrap().version)
        .collect();

    let mut adapter = DragInteractionAdapter::new();
    adapter.begin(dragged.id, Zone::Stable).unwrap();
    adapter.hover(Some(HoverTarget::ZoneEnd(Zone::Permanent))).unwrap();
    adapter
        .hover(Some(HoverTarget::Block {
            zone: Zone::Working,
            block_id: first.id,
            insert_before: true,
        }))
        .unwrap();
    adapter
        .hover(Some(HoverTarget::Block {
            zone: Zone::Working,
            block_id: second.id,
            insert_before: true,
        }))
        .unwrap();

    let unchanged: Vec<u64> = Zone::ALL
        .iter()
        .map(|zone| service.store().zone(*zone).unwrap().version)
        .collect();
    assert_eq!(unchanged, versions);

    let outcome = adapter.release(&service).unwrap().unwrap();
    assert_eq!(outcome.block.zone, Zone::Working);
    assert_eq!(outcome.block.position, 1.5);
    let order: Vec<_> = service
        .zone_view(Zone::Working)
        .unwrap()
        .iter()
        .map(|block| block.id)
        .collect();
    assert_eq!(order, vec![first.id, dragged.id, second.id]);
    assert!(service.zone_view(Zone::Permanent).unwrap().is_empty());
    assert_eq!(adapter.state(), &DragState::Idle);
}

#[test]
fn cancelled_gesture_leaves_store_untouched() {
    let conn = open_db_in_memory().unwrap();
    let service = BlockService::new(SqliteBlockStore::try_new(&conn).unwrap());

    let dragged = service.create_block(Zone::Working, "d", BlockKind::Text).unwrap().block;
    let version = service.store().zone(Zone::Working).unwrap().version;

    let mut adapter = DragInteractionAdapter::new();
    adapter.begin(dragged.id, Zone::Working).unwrap();
    adapter.hover(Some(HoverTarget::ZoneEnd(Zone::Stable))).unwrap();
    adapter.cancel();

    assert_eq!(adapter.state(), &DragState::Idle);
    assert_eq!(service.get_block(dragged.id).unwrap().unwrap(), dragged);
    assert_eq!(service.store().zone(Zone::Working).unwrap().version, version);
    assert_eq!(service.store().zone(Zone::Stable).unwrap().version, 0);
}

#[test]
fn failed_release_returns_to_idle_with_the_move_error() {
    let conn = open_db_in_memory().unwrap();
    let service = BlockService::new(SqliteBlockStore::try_new(&conn).unwrap());

    let dragged = service.create_block(Zone::Working, "d", BlockKind::Text).unwrap().block;
    let target = service.create_block(Zone::Working, "t", BlockKind::Text).unwrap().block;

    let mut adapter = DragInteractionAdapter::new();
    adapter.begin(dragged.id, Zone::Working).unwrap();
    adapter
        .hover(Some(HoverTarget::Block {
            zone: Zone::Working,
            block_id: target.id,
            insert_before: false,
        }))
        .unwrap();
    service.delete_block(target.id).unwrap();

    let err = adapter.release(&service).unwrap_err();
    assert!(matches!(
        err,
        DragError::Move(MoveError::TargetNotFound(id)) if id == target.id
    ));
    assert_eq!(adapter.state(), &DragState::Idle);
    assert_eq!(service.get_block(dragged.id).unwrap().unwrap(), dragged);
}

#[test]
fn release_moves_block_from_its_stored_zone() {
    let conn = open_db_in_memory().unwrap();
    let service = BlockService::new(SqliteBlockStore::try_new(&conn).unwrap());

    let dragged = service.create_block(Zone::Stable, "d", BlockKind::Text).unwrap().block;

    let mut adapter = DragInteractionAdapter::new();
    adapter.begin(dragged.id, Zone::Permanent).unwrap();
    adapter.hover(Some(HoverTarget::ZoneEnd(Zone::Working))).unwrap();
    let outcome = adapter.release(&service).unwrap().unwrap();

    let zones: Vec<Zone> = outcome.utilization.iter().map(|u| u.zone).collect();
    assert_eq!(zones, vec![Zone::Stable, Zone::Working]);
    assert!(service.zone_view(Zone::Stable).unwrap().is_empty());
    assert_eq!(service.get_block(dragged.id).unwrap().unwrap().zone, Zone::Working);
}
