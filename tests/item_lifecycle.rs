//! Integration tests for item creation, the save queue and load-time repairs.

mod common;

use std::collections::HashMap;

use realmcore::realm::{
    save_queued_items, CharacterDb, CreateOptions, Item, ItemGuid, ItemGuidGenerator, ItemUpdateState,
    Lifecycle, NoHooks, SledCharacterStore, Statement,
};

#[test]
fn queued_items_are_saved_updated_and_deleted() {
    let catalog = common::catalog();
    let store = SledCharacterStore::temporary().unwrap();
    let mut owner = common::player(7);
    let mut guids = ItemGuidGenerator::new(1000);

    let mut cloth = Item::create_item(
        100,
        50,
        Some(&mut owner),
        CreateOptions::default(),
        &catalog,
        &NoHooks,
        &mut guids,
    )
    .unwrap();
    assert_eq!(cloth.count(), 20, "count is clamped to the stack size");
    assert_eq!(cloth.state(), ItemUpdateState::New);

    let guid = cloth.guid();
    let _ = cloth.set_state(ItemUpdateState::Changed, Some(&mut owner));
    assert_eq!(cloth.state(), ItemUpdateState::New);
    assert!(cloth.is_in_update_queue_of(&owner));

    let mut items = HashMap::from([(guid, cloth)]);
    assert_eq!(save_queued_items(&mut owner, &mut items, &store).unwrap(), 1);
    assert_eq!(items[&guid].state(), ItemUpdateState::Unchanged);
    assert_eq!(store.item_row(guid).unwrap().map(|r| r.count), Some(20));
    assert!(owner.item_update_queue().is_empty());

    let cloth = items.get_mut(&guid).unwrap();
    cloth.set_count(5);
    let _ = cloth.set_state(ItemUpdateState::Changed, Some(&mut owner));
    save_queued_items(&mut owner, &mut items, &store).unwrap();
    assert_eq!(store.item_row(guid).unwrap().map(|r| r.count), Some(5));

    let cloth = items.get_mut(&guid).unwrap();
    assert_eq!(cloth.set_state(ItemUpdateState::Removed, Some(&mut owner)), Lifecycle::Alive);
    save_queued_items(&mut owner, &mut items, &store).unwrap();
    assert!(items.is_empty());
    assert!(store.item_row(guid).unwrap().is_none());
}

#[test]
fn removing_an_unsaved_item_discards_it_at_once() {
    let catalog = common::catalog();
    let mut owner = common::player(7);
    let mut guids = ItemGuidGenerator::new(1);

    let mut item = Item::create_item(100, 1, Some(&mut owner), CreateOptions::default(), &catalog, &NoHooks, &mut guids)
        .unwrap();
    let _ = item.set_state(ItemUpdateState::Changed, Some(&mut owner));
    assert_eq!(owner.item_update_queue().len(), 1);

    assert_eq!(item.set_state(ItemUpdateState::Removed, Some(&mut owner)), Lifecycle::Discarded);
    assert!(owner.item_update_queue().is_empty());
}

#[test]
fn load_repairs_duration_and_durability_and_persists_the_fix() {
    let catalog = common::catalog();
    let store = SledCharacterStore::temporary().unwrap();
    let owner = common::player(7);

    let timer = Item::create(ItemGuid(1), 200, Some(&owner), &catalog, &NoHooks).unwrap();
    let mut timer_row = timer.to_row();
    timer_row.duration = 0;

    let sword = Item::create(ItemGuid(2), 300, Some(&owner), &catalog, &NoHooks).unwrap();
    let mut sword_row = sword.to_row();
    sword_row.durability = 999;

    store.execute(Statement::ReplaceItemInstance(timer_row.clone())).unwrap();
    store.execute(Statement::ReplaceItemInstance(sword_row.clone())).unwrap();

    let timer = Item::load_from_db(&timer_row, Some(owner.guid()), &catalog, &NoHooks, &store).unwrap();
    assert_eq!(timer.duration(), 3600);
    assert_eq!(timer.state(), ItemUpdateState::Unchanged);
    assert_eq!(store.item_row(ItemGuid(1)).unwrap().map(|r| r.duration), Some(3600));

    let sword = Item::load_from_db(&sword_row, Some(owner.guid()), &catalog, &NoHooks, &store).unwrap();
    assert_eq!(sword.durability(), 50);
    assert_eq!(store.item_row(ItemGuid(2)).unwrap().map(|r| r.durability), Some(50));

    let rows = store.load_item_rows(owner.guid()).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn unknown_template_refuses_to_load() {
    let catalog = common::catalog();
    let store = SledCharacterStore::temporary().unwrap();
    let owner = common::player(7);
    let mut row = Item::create(ItemGuid(9), 100, Some(&owner), &catalog, &NoHooks)
        .unwrap()
        .to_row();
    row.entry = 424242;
    assert!(Item::load_from_db(&row, Some(owner.guid()), &catalog, &NoHooks, &store).is_none());
}

#[test]
fn timed_items_count_down_then_expire() {
    let catalog = common::catalog();
    let mut owner = common::player(7);
    let mut timer = Item::create(ItemGuid(3), 200, Some(&owner), &catalog, &NoHooks).unwrap();

    assert!(!timer.update_duration(&mut owner, 3000, &NoHooks));
    assert_eq!(timer.duration(), 600);
    assert!(timer.is_in_update_queue_of(&owner));

    assert!(timer.update_duration(&mut owner, 600, &NoHooks));
}
