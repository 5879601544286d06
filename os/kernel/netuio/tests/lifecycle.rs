use netuio::fake::{FAKE_BAR_LENGTH, FakeBus, FakeMemory};
use netuio::{Caller, DeviceState, DriverError, NetuioDevice, ProcessId, ResourceDescriptor};
use netuio_abi::{NetuioStatus, PhysicalAddress, USER_MEMORY_SEGMENT_SIZE};

fn attached() -> (NetuioDevice<FakeBus, FakeMemory>, FakeBus, FakeMemory) {
    let bus = FakeBus::new(5, 0, 0).with_numa_node(1);
    let memory = FakeMemory::new();
    let device = NetuioDevice::attach(bus.clone(), memory.clone()).unwrap();
    (device, bus, memory)
}

#[test]
fn attach_captures_identity_and_allocates_pool() {
    let (device, _, memory) = attached();

    assert_eq!(device.state(), DeviceState::Attached);
    assert_eq!(device.address().bus_num, 5);
    assert_eq!(device.numa_node(), 1);
    assert_eq!(device.name().to_string(), "netuio_00050000");
    assert_eq!(memory.live_allocations(), 1);
}

#[test]
fn attach_fails_without_pool() {
    let memory = FakeMemory::new().failing_allocation();
    let err = NetuioDevice::attach(FakeBus::new(5, 0, 0), memory).err();
    assert_eq!(
        err,
        Some(DriverError::PoolAllocation {
            size: USER_MEMORY_SEGMENT_SIZE
        })
    );
    assert_eq!(err.map(|e| e.status()), Some(NetuioStatus::NoMemory));
}

#[test]
fn attach_fails_without_bus_number() {
    let bus = FakeBus::new(5, 0, 0).without_bus_number();
    let err = NetuioDevice::attach(bus, FakeMemory::new()).err();
    assert_eq!(err, Some(DriverError::Property("bus number")));
}

#[test]
fn prepare_maps_present_bars_only() {
    let (device, bus, memory) = attached();

    device.prepare_hardware(&bus.resources()).unwrap();

    assert_eq!(device.state(), DeviceState::HardwarePrepared);
    // BAR 0 is a 64-bit pair, BAR 3 a plain 32-bit BAR.
    assert_eq!(memory.live_io_mappings(), 2);
}

#[test]
fn short_header_read_is_not_supported() {
    let bus = FakeBus::new(5, 0, 0).with_readable_config(32);
    let device = NetuioDevice::attach(bus.clone(), FakeMemory::new()).unwrap();

    let err = device.prepare_hardware(&bus.resources()).unwrap_err();
    assert_eq!(err.status(), NetuioStatus::NotSupported);
    assert_eq!(device.state(), DeviceState::Attached);
}

#[test]
fn missing_memory_resource_is_a_configuration_error() {
    let (device, _, memory) = attached();
    let only_one = [ResourceDescriptor::Memory {
        start: PhysicalAddress::new(0xF7E0_0000),
        length: FAKE_BAR_LENGTH,
    }];

    let err = device.prepare_hardware(&only_one).unwrap_err();

    assert_eq!(err, DriverError::MissingMemoryResource { bar: 3 });
    assert_eq!(err.status(), NetuioStatus::DeviceConfigurationError);
    assert_eq!(memory.live_io_mappings(), 0, "partial mappings are undone");
}

#[test]
fn failed_kernel_mapping_unwinds() {
    let bus = FakeBus::new(5, 0, 0);
    let memory = FakeMemory::new().failing_io_mapping(1);
    let device = NetuioDevice::attach(bus.clone(), memory.clone()).unwrap();

    let err = device.prepare_hardware(&bus.resources()).unwrap_err();

    assert_eq!(err, DriverError::IoSpaceMapping { bar: 3 });
    assert_eq!(memory.live_io_mappings(), 0);
    assert_eq!(device.state(), DeviceState::Attached);
}

#[test]
fn release_and_remove_return_everything() {
    let (device, bus, memory) = attached();
    device.prepare_hardware(&bus.resources()).unwrap();

    device.release_hardware();
    assert_eq!(memory.live_io_mappings(), 0);
    assert_eq!(memory.live_allocations(), 1);
    assert_eq!(device.state(), DeviceState::Attached);

    device.remove();
    assert_eq!(memory.live_allocations(), 0);
    assert_eq!(memory.live_user_mappings(ProcessId(1)), 0);
    assert_eq!(device.state(), DeviceState::Released);
}

#[test]
fn removed_device_refuses_further_use() {
    let (device, bus, memory) = attached();
    device.prepare_hardware(&bus.resources()).unwrap();

    device.remove();
    device.remove();

    assert_eq!(device.state(), DeviceState::Released);
    assert_eq!(memory.live_allocations(), 0);
    assert_eq!(memory.live_io_mappings(), 0);
    assert_eq!(
        device.prepare_hardware(&bus.resources()),
        Err(DriverError::Released)
    );
    assert_eq!(memory.live_io_mappings(), 0);

    device.release_hardware();
    assert_eq!(device.state(), DeviceState::Released);
    assert_eq!(device.file_cleanup(Caller::new(1, 10)), Ok(false));
}

#[test]
fn cleanup_of_unmapped_handle_is_a_no_op() {
    let (device, bus, _) = attached();
    device.prepare_hardware(&bus.resources()).unwrap();

    assert_eq!(device.file_cleanup(Caller::new(1, 10)), Ok(false));
    assert_eq!(device.state(), DeviceState::HardwarePrepared);
}
