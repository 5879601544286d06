//! Parsers for the two registry strings describing a PCI function.
//!
//! | Property | Example |
//! |----------|---------|
//! | location | `PCI bus 5, device 0, function 0` |
//! | hardware id | `PCI\VEN_8086&DEV_153A&SUBSYS_00008086&REV_04` |
//!
//! Both formats are positional. The location carries bus, device and function
//! as the first decimal number of each comma-separated token. The hardware id
//! carries vendor, device and subsystem as the first hex number after the `_`
//! of each `&`-separated segment.

use netuio_abi::DeviceAddress;

/// Marker a location string must contain to describe a PCI function.
pub const PCI_LOCATION_MARKER: &str = "PCI";

/// Vendor, device and subsystem identifiers of a PCI function.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct PciId {
    pub vendor_id: u16,
    pub device_id: u16,
    pub subsystem_vendor_id: u16,
    pub subsystem_device_id: u16,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("location {0:?} does not describe a PCI function")]
    NotPci(String),
    #[error("{what} is missing from {input:?}")]
    MissingField { what: &'static str, input: String },
    #[error("{what} in {input:?} is not a number")]
    NotANumber { what: &'static str, input: String },
    #[error("{what} {value} in {input:?} is out of range")]
    OutOfRange {
        what: &'static str,
        value: u64,
        input: String,
    },
}

/// Parse a location string such as `PCI bus 5, device 0, function 0`.
///
/// The domain is always `0`.
pub fn parse_location(location: &str) -> Result<DeviceAddress, ParseError> {
    if !location.contains(PCI_LOCATION_MARKER) {
        return Err(ParseError::NotPci(location.to_owned()));
    }

    let mut tokens = location.split(',');
    let mut field = |what: &'static str| -> Result<u8, ParseError> {
        let token = tokens.next().ok_or_else(|| ParseError::MissingField {
            what,
            input: location.to_owned(),
        })?;
        let digits = token.trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == ' ');
        let value = leading_number(digits, 10).ok_or_else(|| ParseError::NotANumber {
            what,
            input: location.to_owned(),
        })?;
        u8::try_from(value).map_err(|_| ParseError::OutOfRange {
            what,
            value,
            input: location.to_owned(),
        })
    };

    let bus = field("bus")?;
    let device = field("device")?;
    let function = field("function")?;
    Ok(DeviceAddress::new(0, bus, device, function))
}

/// Parse a hardware id such as `PCI\VEN_8086&DEV_153A&SUBSYS_00008086&REV_04`.
///
/// A subsystem value of exactly eight hex digits is the subsystem device id
/// followed by the subsystem vendor id. Any other length is taken as the
/// subsystem device id alone.
pub fn parse_hardware_id(hardware_id: &str) -> Result<PciId, ParseError> {
    let missing = |what| ParseError::MissingField {
        what,
        input: hardware_id.to_owned(),
    };

    let ids = hardware_id.split('\\').nth(1).ok_or_else(|| missing("id list"))?;
    let mut segments = ids.split('&');
    let mut value_of = |what: &'static str| -> Result<&str, ParseError> {
        segments
            .next()
            .and_then(|segment| segment.split('_').nth(1))
            .ok_or_else(|| missing(what))
    };

    let vendor = value_of("vendor id")?;
    let device = value_of("device id")?;
    let subsys = value_of("subsystem id")?;

    let hex16 = |what: &'static str, text: &str| -> Result<u16, ParseError> {
        let digits = text.trim_start_matches(|c: char| !c.is_ascii_hexdigit());
        let value = leading_number(digits, 16).ok_or_else(|| ParseError::NotANumber {
            what,
            input: hardware_id.to_owned(),
        })?;
        u16::try_from(value).map_err(|_| ParseError::OutOfRange {
            what,
            value,
            input: hardware_id.to_owned(),
        })
    };

    let (subsystem_device_id, subsystem_vendor_id) = match (subsys.get(..4), subsys.get(4..)) {
        (Some(high), Some(low)) if subsys.len() == 8 => (
            hex16("subsystem device id", high)?,
            hex16("subsystem vendor id", low)?,
        ),
        _ => (hex16("subsystem device id", subsys)?, 0),
    };

    Ok(PciId {
        vendor_id: hex16("vendor id", vendor)?,
        device_id: hex16("device id", device)?,
        subsystem_vendor_id,
        subsystem_device_id,
    })
}

/// The run of digits at the start of `text`, `None` if there is none.
fn leading_number(text: &str, radix: u32) -> Option<u64> {
    let end = text
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(text.len());
    u64::from_str_radix(text.get(..end)?, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_of_a_real_device() {
        let addr = parse_location("PCI bus 5, device 0, function 0").unwrap();
        assert_eq!(addr, DeviceAddress::new(0, 5, 0, 0));
    }

    #[test]
    fn location_covers_full_byte_range() {
        for (b, d, f) in [(0u8, 0u8, 0u8), (255, 31, 7), (59, 255, 255), (128, 1, 3)] {
            let text = format!("PCI bus {b}, device {d}, function {f}");
            assert_eq!(parse_location(&text).unwrap(), DeviceAddress::new(0, b, d, f), "{text}");
        }
    }

    #[test]
    fn location_without_marker_is_not_pci() {
        assert!(matches!(
            parse_location("Port_#0001.Hub_#0004"),
            Err(ParseError::NotPci(_))
        ));
    }

    #[test]
    fn truncated_location_is_rejected() {
        assert!(matches!(
            parse_location("PCI bus 5, device 0"),
            Err(ParseError::MissingField { what: "function", .. })
        ));
        assert!(matches!(
            parse_location("PCI bus x, device 0, function 0"),
            Err(ParseError::NotANumber { what: "bus", .. })
        ));
        assert!(matches!(
            parse_location("PCI bus 256, device 0, function 0"),
            Err(ParseError::OutOfRange { value: 256, .. })
        ));
    }

    #[test]
    fn hardware_id_with_combined_subsystem() {
        let id = parse_hardware_id("PCI\\VEN_8086&DEV_153A&SUBSYS_00008086&REV_04").unwrap();
        assert_eq!(
            id,
            PciId {
                vendor_id: 0x8086,
                device_id: 0x153A,
                subsystem_vendor_id: 0x8086,
                subsystem_device_id: 0x0000,
            }
        );
    }

    #[test]
    fn hardware_id_subsystem_halves() {
        let id = parse_hardware_id("PCI\\VEN_15B3&DEV_1015&SUBSYS_000415B3&REV_00").unwrap();
        assert_eq!(id.subsystem_device_id, 0x0004);
        assert_eq!(id.subsystem_vendor_id, 0x15B3);
    }

    #[test]
    fn hardware_id_with_short_subsystem() {
        let id = parse_hardware_id("PCI\\VEN_1AF4&DEV_1000&SUBSYS_1&REV_00").unwrap();
        assert_eq!(id.subsystem_device_id, 1);
        assert_eq!(id.subsystem_vendor_id, 0);
    }

    #[test]
    fn malformed_hardware_ids() {
        assert!(matches!(
            parse_hardware_id("PCI"),
            Err(ParseError::MissingField { what: "id list", .. })
        ));
        assert!(matches!(
            parse_hardware_id("PCI\\VEN_8086&DEV_153A"),
            Err(ParseError::MissingField { what: "subsystem id", .. })
        ));
        assert!(matches!(
            parse_hardware_id("PCI\\VEN_8086&DEV&SUBSYS_00008086"),
            Err(ParseError::MissingField { what: "device id", .. })
        ));
        assert!(matches!(
            parse_hardware_id("PCI\\VEN_zz&DEV_153A&SUBSYS_00008086"),
            Err(ParseError::NotANumber { what: "vendor id", .. })
        ));
    }
}
