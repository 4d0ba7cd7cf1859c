use std::sync::Arc;

use log::{debug, warn};

use crate::Result;

/// USB class code for video devices.
pub const USB_CLASS_VIDEO: u8 = 0x0e;
/// USB video subclass for the VideoControl interface.
pub const USB_SUBCLASS_VIDEOCONTROL: u8 = 0x01;
/// USB video protocol code (`PC_PROTOCOL_15`).
pub const USB_PROTOCOL_VIDEO: u8 = 0x01;

/// One interface of a [`DeviceDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterfaceDescriptor {
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
}

/// Snapshot of one attached USB device, as reported by the platform.
///
/// Never cached: [`DeviceDiscovery::list_devices`] re-queries on every call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceDescriptor {
    /// Platform device path, e.g. `/dev/bus/usb/001/002`.
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x}, class {}/{}/{})",
            self.name, self.vendor_id, self.product_id, self.class, self.subclass, self.protocol
        )
    }
}

/// Platform hook returning the current USB inventory.
pub trait UsbEnumerator: Send + Sync {
    /// Lists attached devices. An error means the enumeration service itself failed.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;
}

/// Checks if `descriptor` looks like a video-capture device.
///
/// Either signal is enough: the device-level class triple, or any interface with
/// the video class. Firmware fills in one or the other unreliably.
pub fn matches_video_class(descriptor: &DeviceDescriptor) -> bool {
    let device_level = descriptor.class == USB_CLASS_VIDEO
        || descriptor.subclass == USB_SUBCLASS_VIDEOCONTROL
        || descriptor.protocol == USB_PROTOCOL_VIDEO;
    device_level
        || descriptor
            .interfaces
            .iter()
            .any(|intf| intf.class == USB_CLASS_VIDEO)
}

/// Queries the USB inventory and classifies it.
///
/// Absence of the enumeration service is a normal condition: every query then
/// reports no devices.
#[derive(Clone)]
pub struct DeviceDiscovery {
    enumerator: Option<Arc<dyn UsbEnumerator>>,
}

impl DeviceDiscovery {
    pub fn new(enumerator: Arc<dyn UsbEnumerator>) -> Self {
        Self {
            enumerator: Some(enumerator),
        }
    }

    /// A discovery without any enumeration service.
    pub fn unavailable() -> Self {
        Self { enumerator: None }
    }

    /// Enumerates the attached devices; never fails.
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        let Some(enumerator) = self.enumerator.as_ref() else {
            warn!("USB enumeration service is unavailable");
            return Vec::new();
        };
        match enumerator.enumerate() {
            Ok(devices) => {
                debug!("found {} USB device(s)", devices.len());
                for device in devices.iter() {
                    debug!("USB device: {device}");
                }
                devices
            }
            Err(e) => {
                warn!("USB enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    /// Returns the attached devices matching [`matches_video_class`].
    pub fn video_devices(&self) -> Vec<DeviceDescriptor> {
        self.list_devices()
            .into_iter()
            .filter(matches_video_class)
            .collect()
    }

    /// Checks if at least one attached device matches [`matches_video_class`].
    pub fn has_video_capable_device(&self) -> bool {
        let found = self.list_devices().iter().any(|device| {
            let matched = matches_video_class(device);
            if matched {
                debug!("video device detected: {}", device.name);
            }
            matched
        });
        debug!("USB video device present: {found}");
        found
    }
}

impl std::fmt::Debug for DeviceDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDiscovery")
            .field("available", &self.enumerator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, ErrorKind};

    struct FixedEnumerator(Result<Vec<DeviceDescriptor>>);

    impl UsbEnumerator for FixedEnumerator {
        fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
            self.0.clone()
        }
    }

    fn discovery(devices: Vec<DeviceDescriptor>) -> DeviceDiscovery {
        DeviceDiscovery::new(Arc::new(FixedEnumerator(Ok(devices))))
    }

    fn keyboard() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "/dev/bus/usb/001/002".into(),
            vendor_id: 0x046d,
            product_id: 0xc31c,
            interfaces: vec![InterfaceDescriptor {
                class: 0x03,
                subclass: 0x01,
                protocol: 0x01,
            }],
            ..Default::default()
        }
    }

    fn webcam_by_interface() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "/dev/bus/usb/001/003".into(),
            vendor_id: 0x0c45,
            product_id: 0x6366,
            interfaces: vec![
                InterfaceDescriptor {
                    class: 0x01,
                    subclass: 0x02,
                    protocol: 0x00,
                },
                InterfaceDescriptor {
                    class: USB_CLASS_VIDEO,
                    subclass: 0x02,
                    protocol: 0x00,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn device_class_alone_matches() {
        let device = DeviceDescriptor {
            class: USB_CLASS_VIDEO,
            ..Default::default()
        };
        assert!(matches_video_class(&device));
    }

    #[test]
    fn interface_class_alone_matches() {
        assert!(matches_video_class(&webcam_by_interface()));
    }

    #[test]
    fn device_subclass_or_protocol_matches() {
        let by_subclass = DeviceDescriptor {
            subclass: USB_SUBCLASS_VIDEOCONTROL,
            ..Default::default()
        };
        let by_protocol = DeviceDescriptor {
            protocol: USB_PROTOCOL_VIDEO,
            ..Default::default()
        };
        assert!(matches_video_class(&by_subclass));
        assert!(matches_video_class(&by_protocol));
    }

    #[test]
    fn hid_device_does_not_match() {
        assert!(!matches_video_class(&keyboard()));
    }

    #[test]
    fn empty_inventory_has_no_video_device() {
        assert!(!discovery(vec![]).has_video_capable_device());
    }

    #[test]
    fn mixed_inventory_has_video_device() {
        let discovery = discovery(vec![keyboard(), webcam_by_interface()]);
        assert!(discovery.has_video_capable_device());
        assert_eq!(discovery.video_devices(), vec![webcam_by_interface()]);
    }

    #[test]
    fn failures_become_empty_results() {
        let failing = DeviceDiscovery::new(Arc::new(FixedEnumerator(Err(Error::new(
            ErrorKind::Internal,
            "UsbManager threw",
        )))));
        assert!(failing.list_devices().is_empty());
        assert!(!failing.has_video_capable_device());

        let missing = DeviceDiscovery::unavailable();
        assert!(missing.list_devices().is_empty());
        assert!(!missing.has_video_capable_device());
    }
}
