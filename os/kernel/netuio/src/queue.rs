//! Device-control dispatch.
//!
//! Requests first pass through [`NetuioDevice::in_caller_context`], which the
//! framework invokes synchronously in the requesting process. Request kinds
//! flagged [`RequestCapabilities::IN_CALLER_CONTEXT`] are served right there;
//! everything else is forwarded to the parallel queue and ends up in
//! [`NetuioDevice::evt_device_control`].

use crate::device::NetuioDevice;
use crate::platform::{Caller, KernelMemory, PciBus};
use log::{debug, error};
use netuio_abi::{
    ConfigIo, ConfigOp, ControlCode, DevAddr, HardwareInfo, NetuioStatus, RequestCapabilities,
    RequestKind,
};

/// A device-control request with its buffered input and output.
#[derive(Debug)]
pub struct IoRequest<'a> {
    pub code: ControlCode,
    pub input: &'a [u8],
    pub output: &'a mut [u8],
}

impl<'a> IoRequest<'a> {
    #[must_use]
    pub const fn new(code: ControlCode, input: &'a [u8], output: &'a mut [u8]) -> Self {
        Self {
            code,
            input,
            output,
        }
    }
}

/// Final status of a request and the number of output bytes it produced.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Completion {
    pub status: NetuioStatus,
    pub information: usize,
}

impl Completion {
    #[must_use]
    pub const fn success(information: usize) -> Self {
        Self {
            status: NetuioStatus::Success,
            information,
        }
    }

    #[must_use]
    pub const fn failed(status: NetuioStatus) -> Self {
        Self {
            status,
            information: 0,
        }
    }

    fn from_result(result: Result<usize, NetuioStatus>) -> Self {
        match result {
            Ok(information) => Self::success(information),
            Err(status) => Self::failed(status),
        }
    }
}

/// Outcome of the caller-context preprocessing step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dispatch {
    /// The request was served in the caller's context.
    Completed(Completion),
    /// The request must be queued for [`NetuioDevice::evt_device_control`].
    Forwarded,
}

impl<B: PciBus, M: KernelMemory> NetuioDevice<B, M> {
    /// Preprocess a request in the context of the process that issued it.
    pub fn in_caller_context(&self, caller: Caller, request: &mut IoRequest<'_>) -> Dispatch {
        let needs_caller = request
            .code
            .kind()
            .is_some_and(|kind| {
                kind.capabilities()
                    .contains(RequestCapabilities::IN_CALLER_CONTEXT)
            });
        if !needs_caller {
            return Dispatch::Forwarded;
        }

        let result = self.map_hardware(caller, request);
        if let Err(status) = result {
            if status == NetuioStatus::NotSameDevice {
                debug!("{}: map request for another device", self.name());
            } else {
                error!("{}: map hardware failed: {status}", self.name());
            }
        }
        Dispatch::Completed(Completion::from_result(result))
    }

    /// Serve a request from the parallel queue.
    pub fn evt_device_control(&self, request: &mut IoRequest<'_>) -> Completion {
        Completion::from_result(self.config_io(request))
    }

    /// Run a request through both dispatch stages.
    pub fn device_control(&self, caller: Caller, request: &mut IoRequest<'_>) -> Completion {
        match self.in_caller_context(caller, request) {
            Dispatch::Completed(completion) => completion,
            Dispatch::Forwarded => self.evt_device_control(request),
        }
    }

    fn map_hardware(
        &self,
        caller: Caller,
        request: &mut IoRequest<'_>,
    ) -> Result<usize, NetuioStatus> {
        let info = HardwareInfo::decode(request.input)?;
        self.check_address(info.dev_addr)?;
        self.map_into_caller(caller, request.output)
    }

    fn config_io(&self, request: &mut IoRequest<'_>) -> Result<usize, NetuioStatus> {
        if request.code.kind() != Some(RequestKind::ConfigIo) {
            return Err(NetuioStatus::InvalidDeviceRequest);
        }

        let io = ConfigIo::decode(request.input)?;
        self.check_address(io.dev_addr)?;
        let width = io.width()?.bytes();

        let out = request
            .output
            .get_mut(..RequestKind::ConfigIo.output_size())
            .ok_or(NetuioStatus::InvalidBufferSize)?;

        match io.operation()? {
            ConfigOp::Read => {
                out.fill(0);
                Ok(self.bus.get_bus_data(io.offset, &mut out[..width]))
            }
            ConfigOp::Write => {
                let data = io.data.to_le_bytes();
                Ok(self.bus.set_bus_data(io.offset, &data[..width]))
            }
        }
    }

    fn check_address(&self, requested: DevAddr) -> Result<(), NetuioStatus> {
        if requested == self.address() {
            Ok(())
        } else {
            Err(NetuioStatus::NotSameDevice)
        }
    }
}
