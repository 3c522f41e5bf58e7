//! Smoke tests against a real driver. No window is created.
//!
//! Run with `cargo test -- --ignored`.

use geck::{ContextConfig, DeviceContext, DeviceState, Error};

fn load() -> Option<DeviceContext> {
    let config = ContextConfig {
        validation: false,
        ..ContextConfig::default()
    };

    match DeviceContext::new(config) {
        Ok(device) => Some(device),
        Err(Error::Loading(err)) => {
            eprintln!("skipping, no Vulkan loader: {err}");
            None
        }
        Err(err) => panic!("{err}"),
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn unused_context_destroys_cleanly() {
    let Some(mut device) = load() else { return };
    assert_eq!(device.state(), DeviceState::Uninitialized);
    device.destroy().unwrap();
    device.destroy().unwrap();
    assert_eq!(device.state(), DeviceState::Destroyed);
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn steps_run_in_order() {
    let Some(mut device) = load() else { return };

    assert!(matches!(
        device.choose_adapter(),
        Err(Error::OutOfOrder {
            state: DeviceState::Uninitialized,
            ..
        })
    ));

    device.create_top_level_handle(&[], false).unwrap();
    assert_eq!(device.state(), DeviceState::InstanceCreated);

    assert!(matches!(
        device.create_logical_device(),
        Err(Error::OutOfOrder { .. })
    ));
    assert!(device.logical().is_err());

    let adapters = device.enumerate_adapters().unwrap();
    match device.choose_adapter() {
        Ok(adapter) => assert!(adapters.iter().any(|a| a.name == adapter.name)),
        Err(Error::NoSuitableAdapter { candidates }) => assert_eq!(candidates, adapters.len()),
        Err(err) => panic!("{err}"),
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn dependents_block_destruction() {
    let Some(mut device) = load() else { return };
    device.create_top_level_handle(&[], false).unwrap();

    let swap_chain = device.tether().unwrap();
    let err = device.destroy().unwrap_err();
    assert_eq!(err.dependents, 1);
    assert_eq!(device.state(), DeviceState::InstanceCreated);

    drop(swap_chain);
    device.destroy().unwrap();
    assert_eq!(device.state(), DeviceState::Destroyed);
    assert!(device.tether().is_none());
}
