use clap::Parser;

use super::*;
use crate::test_support::{FakeDeviceLink, FakePrinter};

fn test_config() -> Config {
    crate::config::Config::parse_from(["ace-core"])
}

fn surface_with(link: FakeDeviceLink) -> CommandSurface<FakeDeviceLink> {
    CommandSurface::new(Orchestrator::new(link, test_config()))
}

fn args(pairs: &[(&str, &str)]) -> CommandArgs {
    CommandArgs::new(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
}

#[tokio::test]
async fn start_drying_defaults_duration_and_rejects_bad_temp() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);

    let result = surface
        .dispatch("ACE_START_DRYING", &args(&[("TEMP", "50")]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap();
    assert_eq!(result["temp"], 50);
    assert_eq!(result["duration"], 240);

    let err = surface
        .dispatch("ACE_START_DRYING", &args(&[("TEMP", "0")]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap_err();
    assert!(matches!(err, AceError::InvalidArgument(_)));
}

#[tokio::test]
async fn disable_feed_assist_defaults_to_the_currently_enabled_index() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState {
        feed_assist_index: 2,
        ..CoreState::default()
    };
    let mut inventory = Inventory::load(&printer);

    let result = surface
        .dispatch("ACE_DISABLE_FEED_ASSIST", &args(&[]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap();

    assert_eq!(result["index"], 2);
    assert_eq!(state.feed_assist_index, -1);
}

#[tokio::test]
async fn disable_feed_assist_rejects_when_none_active() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);

    let err = surface
        .dispatch("ACE_DISABLE_FEED_ASSIST", &args(&[]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap_err();

    assert!(matches!(err, AceError::InvalidArgument(_)));
}

#[tokio::test]
async fn feed_defaults_speed_from_config() {
    let link = FakeDeviceLink::new_ready();
    let surface = surface_with(link.clone());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);
    let config = test_config();

    let result = surface
        .dispatch(
            "ACE_FEED",
            &args(&[("INDEX", "1"), ("LENGTH", "100")]),
            &mut printer,
            &mut state,
            &mut inventory,
        )
        .await
        .unwrap();

    assert_eq!(result["speed"], config.feed_speed);
    let (_, params) = link.calls().into_iter().find(|(m, _)| m == "feed_filament").unwrap();
    assert_eq!(params["speed"], config.feed_speed);
}

#[tokio::test]
async fn change_tool_delegates_to_the_orchestrator() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().toolhead_triggered(true).extruder_present(true).build();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);

    let result = surface
        .dispatch("ACE_CHANGE_TOOL", &args(&[("TOOL", "2")]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap();

    assert_eq!(result["current_index"], 2);
    assert_eq!(state.current_loaded_index, 2);
}

#[tokio::test]
async fn set_slot_empty_clears_and_persists() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);
    inventory
        .set_slot(&mut printer, 1, InventoryRecord::ready([1, 2, 3], "PLA", 200))
        .unwrap();

    let result = surface
        .dispatch(
            "ACE_SET_SLOT",
            &args(&[("INDEX", "1"), ("EMPTY", "1")]),
            &mut printer,
            &mut state,
            &mut inventory,
        )
        .await
        .unwrap();

    assert_eq!(result["status"], "empty");
    assert!(inventory.get(1).unwrap().is_empty());

    let persisted: [InventoryRecord; 4] = printer.get(crate::persist::KEY_INVENTORY).unwrap();
    assert!(persisted[1].is_empty());
}

#[tokio::test]
async fn set_slot_ready_parses_color_and_rejects_bad_shape() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);

    let result = surface
        .dispatch(
            "ACE_SET_SLOT",
            &args(&[("INDEX", "0"), ("COLOR", "255,0,128"), ("MATERIAL", "PETG"), ("TEMP", "240")]),
            &mut printer,
            &mut state,
            &mut inventory,
        )
        .await
        .unwrap();
    assert_eq!(result["status"], "ready");
    let slot = inventory.get(0).unwrap();
    assert_eq!(slot.color, [255, 0, 128]);
    assert_eq!(slot.material, "PETG");
    assert_eq!(slot.temp, 240);

    let err = surface
        .dispatch(
            "ACE_SET_SLOT",
            &args(&[("INDEX", "0"), ("COLOR", "255,0"), ("MATERIAL", "PETG"), ("TEMP", "240")]),
            &mut printer,
            &mut state,
            &mut inventory,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AceError::InvalidArgument(_)));
}

#[tokio::test]
async fn query_slots_reports_all_four_records() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);
    inventory
        .set_slot(&mut printer, 3, InventoryRecord::ready([9, 9, 9], "ABS", 260))
        .unwrap();

    let result = surface
        .dispatch("ACE_QUERY_SLOTS", &args(&[]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap();

    let slots = result.as_array().expect("query_slots returns a JSON array");
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[3]["material"], "ABS");
}

#[tokio::test]
async fn enable_and_disable_endless_spool_persist_and_reset_runout() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState {
        endless_spool_runout_detected: true,
        ..CoreState::default()
    };
    let mut inventory = Inventory::load(&printer);

    surface
        .dispatch("ACE_ENABLE_ENDLESS_SPOOL", &args(&[]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap();
    assert!(state.endless_spool_enabled);
    let persisted: bool = printer.get(crate::persist::KEY_ENDLESS_SPOOL_ENABLED).unwrap();
    assert!(persisted);

    surface
        .dispatch("ACE_DISABLE_ENDLESS_SPOOL", &args(&[]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap();
    assert!(!state.endless_spool_enabled);
    assert!(!state.endless_spool_runout_detected);
    let persisted: bool = printer.get(crate::persist::KEY_ENDLESS_SPOOL_ENABLED).unwrap();
    assert!(!persisted);
}

#[tokio::test]
async fn get_current_index_and_save_inventory_and_runout_sensor() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().extruder_present(true).build();
    let mut state = CoreState {
        current_loaded_index: 3,
        ..CoreState::default()
    };
    let mut inventory = Inventory::load(&printer);

    let result = surface
        .dispatch("ACE_GET_CURRENT_INDEX", &args(&[]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap();
    assert_eq!(result["current_index"], 3);

    let result = surface
        .dispatch("ACE_SAVE_INVENTORY", &args(&[]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap();
    assert_eq!(result["saved"], true);
    assert!(printer.get_raw(crate::persist::KEY_INVENTORY).is_some());

    let result = surface
        .dispatch("ACE_TEST_RUNOUT_SENSOR", &args(&[]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap();
    assert_eq!(result["extruder_switch_present"], true);
    assert_eq!(result["predicted_runout"], false);
}

#[tokio::test]
async fn debug_passes_method_and_params_through_unmodified() {
    let link = FakeDeviceLink::new_ready();
    let surface = surface_with(link.clone());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);

    let result = surface
        .dispatch(
            "ACE_DEBUG",
            &args(&[("METHOD", "get_info"), ("PARAMS", r#"{"foo":1}"#)]),
            &mut printer,
            &mut state,
            &mut inventory,
        )
        .await
        .unwrap();

    assert_eq!(result["code"], 0);
    let (method, params) = link.calls().into_iter().find(|(m, _)| m == "get_info").unwrap();
    assert_eq!(method, "get_info");
    assert_eq!(params["foo"], 1);
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let surface = surface_with(FakeDeviceLink::new_ready());
    let mut printer = FakePrinter::builder().build();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);

    let err = surface
        .dispatch("ACE_NOT_A_REAL_COMMAND", &args(&[]), &mut printer, &mut state, &mut inventory)
        .await
        .unwrap_err();

    assert!(matches!(err, AceError::InvalidArgument(_)));
}
