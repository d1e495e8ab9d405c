//! Device identities and event tags.
//!
//! A tag byte travels with every event frame: the low 6 bits name the
//! device, the top 2 bits carry per-class event flags.

use bitflags::bitflags;

/// A source or sink of I/O: serial ports, loopbacks, pin interrupt lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Device(u8);

impl Device {
    pub const NONE: Device = Device(0);
    pub const LOOPBACK_A: Device = Device(1);
    pub const LOOPBACK_B: Device = Device(2);
    /// Console parking spot while no real console is attached.
    pub const LIMBO: Device = Device(3);
    pub const USB: Device = Device(4);
    pub const BLUETOOTH: Device = Device(5);
    pub const SWDCON: Device = Device(6);
    pub const SERIAL1: Device = Device(7);
    pub const SERIAL2: Device = Device(8);
    pub const SERIAL3: Device = Device(9);
    pub const SERIAL4: Device = Device(10);
    pub const SERIAL5: Device = Device(11);
    pub const SERIAL6: Device = Device(12);
    pub const SERIAL1_STATUS: Device = Device(13);
    pub const SERIAL2_STATUS: Device = Device(14);
    pub const SERIAL3_STATUS: Device = Device(15);
    pub const SERIAL4_STATUS: Device = Device(16);
    pub const SERIAL5_STATUS: Device = Device(17);
    pub const SERIAL6_STATUS: Device = Device(18);
    pub const EXTI0: Device = Device(19);
    pub const EXTI1: Device = Device(20);
    pub const EXTI2: Device = Device(21);
    pub const EXTI3: Device = Device(22);
    pub const EXTI4: Device = Device(23);
    pub const EXTI5: Device = Device(24);
    pub const EXTI6: Device = Device(25);
    pub const EXTI7: Device = Device(26);
    pub const EXTI8: Device = Device(27);
    pub const EXTI9: Device = Device(28);
    pub const EXTI10: Device = Device(29);
    pub const EXTI11: Device = Device(30);
    pub const EXTI12: Device = Device(31);
    pub const EXTI13: Device = Device(32);
    pub const EXTI14: Device = Device(33);
    pub const EXTI15: Device = Device(34);
    /// Application-defined events.
    pub const CUSTOM: Device = Device(35);

    /// Number of pin interrupt channels.
    pub const EXTI_COUNT: u8 = 16;
    /// Number of devices that carry flow-control state (USB..=SERIAL6).
    pub const FLOW_DEVICE_COUNT: usize = (Self::SERIAL6.0 - Self::USB.0 + 1) as usize;

    const ID_MASK: u8 = 0x3F;

    /// Device from a raw id. Ids outside the table map to `NONE`.
    pub const fn from_raw(raw: u8) -> Device {
        let id = raw & Self::ID_MASK;
        if id > Self::CUSTOM.0 {
            Self::NONE
        } else {
            Device(id)
        }
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The n-th hardware serial port (1-based).
    pub const fn serial(n: u8) -> Option<Device> {
        if n >= 1 && n <= 6 {
            Some(Device(Self::SERIAL1.0 + n - 1))
        } else {
            None
        }
    }

    /// The pin interrupt device for a channel.
    pub const fn exti(channel: u8) -> Option<Device> {
        if channel < Self::EXTI_COUNT {
            Some(Device(Self::EXTI0.0 + channel))
        } else {
            None
        }
    }

    /// Byte-stream devices: loopbacks, limbo, USB, Bluetooth, SWD console, UARTs.
    #[inline]
    pub const fn is_serial(self) -> bool {
        self.0 >= Self::LOOPBACK_A.0 && self.0 <= Self::SERIAL6.0
    }

    #[inline]
    pub const fn is_serial_status(self) -> bool {
        self.0 >= Self::SERIAL1_STATUS.0 && self.0 <= Self::SERIAL6_STATUS.0
    }

    /// The UART a status device reports on.
    pub const fn status_to_serial(self) -> Option<Device> {
        if self.is_serial_status() {
            Some(Device(self.0 - Self::SERIAL1_STATUS.0 + Self::SERIAL1.0))
        } else {
            None
        }
    }

    #[inline]
    pub const fn is_exti(self) -> bool {
        self.0 >= Self::EXTI0.0 && self.0 <= Self::EXTI15.0
    }

    pub const fn exti_channel(self) -> Option<u8> {
        if self.is_exti() {
            Some(self.0 - Self::EXTI0.0)
        } else {
            None
        }
    }

    #[inline]
    pub const fn is_loopback(self) -> bool {
        self.0 == Self::LOOPBACK_A.0 || self.0 == Self::LOOPBACK_B.0
    }

    /// The other end of a loopback pair.
    pub const fn loopback_partner(self) -> Option<Device> {
        match self.0 {
            1 => Some(Self::LOOPBACK_B),
            2 => Some(Self::LOOPBACK_A),
            _ => None,
        }
    }

    /// Whether the device has XON/XOFF and CTS state.
    #[inline]
    pub const fn has_flow_state(self) -> bool {
        self.0 >= Self::USB.0 && self.0 <= Self::SERIAL6.0
    }

    /// Index into per-device flow-control tables.
    pub const fn flow_index(self) -> Option<usize> {
        if self.has_flow_state() {
            Some((self.0 - Self::USB.0) as usize)
        } else {
            None
        }
    }

    /// Inverse of [`flow_index`](Self::flow_index).
    pub const fn from_flow_index(idx: usize) -> Device {
        Device(Self::USB.0 + idx as u8)
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        const SERIALS: [&str; 6] = ["Serial1", "Serial2", "Serial3", "Serial4", "Serial5", "Serial6"];
        const STATUS: [&str; 6] = [
            "Serial1Status",
            "Serial2Status",
            "Serial3Status",
            "Serial4Status",
            "Serial5Status",
            "Serial6Status",
        ];
        const EXTI: [&str; 16] = [
            "EXTI0", "EXTI1", "EXTI2", "EXTI3", "EXTI4", "EXTI5", "EXTI6", "EXTI7", "EXTI8",
            "EXTI9", "EXTI10", "EXTI11", "EXTI12", "EXTI13", "EXTI14", "EXTI15",
        ];
        match self {
            Self::NONE => "null",
            Self::LOOPBACK_A => "LoopbackA",
            Self::LOOPBACK_B => "LoopbackB",
            Self::LIMBO => "Limbo",
            Self::USB => "USB",
            Self::BLUETOOTH => "Bluetooth",
            Self::SWDCON => "SWDCON",
            Self::CUSTOM => "Custom",
            d if d.0 >= Self::SERIAL1.0 && d.0 <= Self::SERIAL6.0 => {
                SERIALS[(d.0 - Self::SERIAL1.0) as usize]
            }
            d if d.is_serial_status() => STATUS[(d.0 - Self::SERIAL1_STATUS.0) as usize],
            d if d.is_exti() => EXTI[(d.0 - Self::EXTI0.0) as usize],
            _ => "?",
        }
    }

    /// Look a device up by its [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Device> {
        (0..=Self::CUSTOM.0)
            .map(Device)
            .find(|d| d.name() == name)
    }
}

impl core::fmt::Display for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Event-class flags stored in the top bits of a tag.
    ///
    /// Pin events use `PIN_HIGH`/`DATA_PIN_HIGH`; serial status events
    /// reuse the same bits as `FRAMING_ERROR`/`PARITY_ERROR`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EventFlags: u8 {
        const PIN_HIGH = 0x80;
        const DATA_PIN_HIGH = 0x40;
        const FRAMING_ERROR = 0x80;
        const PARITY_ERROR = 0x40;
    }
}

/// Device identity plus event flags, as stored in an event frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventTag(u8);

impl EventTag {
    pub const fn new(device: Device, flags: EventFlags) -> Self {
        Self(device.raw() | flags.bits())
    }

    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn device(self) -> Device {
        Device::from_raw(self.0)
    }

    #[inline]
    pub const fn flags(self) -> EventFlags {
        EventFlags::from_bits_truncate(self.0)
    }
}

impl From<Device> for EventTag {
    fn from(device: Device) -> Self {
        Self::new(device, EventFlags::empty())
    }
}
