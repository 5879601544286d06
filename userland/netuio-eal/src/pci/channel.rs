//! Client side of the device-control protocol.

use log::error;
use netuio_abi::{
    AccessWidth, ConfigIo, ControlCode, DevAddr, HardwareInfo, NetuioStatus, Request, Response,
};

/// An open handle on one driver instance.
///
/// Dropping the channel closes the handle, which makes the driver undo every
/// mapping it made into this process.
pub trait ControlChannel: Send {
    /// Issue a device-control request and return the number of output bytes
    /// the driver produced.
    fn device_control(
        &self,
        code: ControlCode,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, NetuioStatus>;
}

fn call(channel: &dyn ControlChannel, request: &Request) -> Result<Response, NetuioStatus> {
    let kind = request.kind();
    let mut input = [0u8; HardwareInfo::SIZE];
    let input = &mut input[..kind.input_size()];
    request.encode(input)?;

    let mut output = [0u8; HardwareInfo::SIZE];
    let output = &mut output[..kind.output_size()];
    let information = channel
        .device_control(kind.control_code(), input, output)
        .inspect_err(|status| {
            if *status != NetuioStatus::NotSameDevice {
                error!("device control {kind:?} failed: {status}");
            }
        })?;
    Ok(Response::decode(kind.control_code(), output, information)?)
}

/// Ask the driver to map its scratch pool and BARs into this process.
pub fn map_hardware(
    channel: &dyn ControlChannel,
    dev_addr: DevAddr,
    dev_id: u16,
) -> Result<HardwareInfo, NetuioStatus> {
    match call(channel, &Request::MapHardware(HardwareInfo::request(dev_addr, dev_id)))? {
        Response::MapHardware(info) => Ok(info),
        Response::ConfigIo { .. } => Err(NetuioStatus::InvalidDeviceRequest),
    }
}

/// Read `width` bytes of configuration space at `offset`.
pub fn config_read(
    channel: &dyn ControlChannel,
    dev_addr: DevAddr,
    offset: u32,
    width: AccessWidth,
) -> Result<u64, NetuioStatus> {
    match call(channel, &Request::ConfigIo(ConfigIo::read(dev_addr, offset, width)))? {
        Response::ConfigIo { data, .. } => Ok(data),
        Response::MapHardware(_) => Err(NetuioStatus::InvalidDeviceRequest),
    }
}

/// Write the low `width` bytes of `data` to configuration space at `offset`
/// and return the number of bytes written.
pub fn config_write(
    channel: &dyn ControlChannel,
    dev_addr: DevAddr,
    offset: u32,
    width: AccessWidth,
    data: u64,
) -> Result<usize, NetuioStatus> {
    match call(channel, &Request::ConfigIo(ConfigIo::write(dev_addr, offset, width, data)))? {
        Response::ConfigIo { bytes, .. } => Ok(bytes),
        Response::MapHardware(_) => Err(NetuioStatus::InvalidDeviceRequest),
    }
}
