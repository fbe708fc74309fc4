use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Ordered (label, value) pairs, exactly the shape a pin-selector dropdown
/// consumes. The value is what ends up in generated code.
pub type PinList = Vec<(String, String)>;

/// Pin groupings a profile exposes. `PinField` capability declarations on
/// generators name one of these classes per pin-backed block field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinClass {
    Digital,
    Analog,
    Pwm,
    Serial,
    Spi,
    I2c,
    Interrupt,
    BuiltinLed,
}

/// One logical actuator of a legged-robot profile.
#[derive(Debug, Clone)]
pub struct Joint {
    pub constant: String,
    pub name: String,
    pub init_angle: i32,
    pub flipped: bool,
}

/// Immutable hardware capability descriptor. Constructed once at catalog
/// build time, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct BoardProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub compiler_flag: String,
    pub digital_pins: PinList,
    pub analog_pins: PinList,
    pub pwm_pins: PinList,
    pub serial_pins: PinList,
    pub spi_pins: PinList,
    pub i2c_pins: PinList,
    pub interrupt_pins: PinList,
    pub builtin_led: PinList,
    pub serial_speeds: PinList,
    /// AllBot model tag (VR204/VR408) for robot profiles.
    pub allbot_model: Option<String>,
    pub joints: Vec<Joint>,
}

impl BoardProfile {
    pub fn pin_class(&self, class: PinClass) -> &PinList {
        match class {
            PinClass::Digital => &self.digital_pins,
            PinClass::Analog => &self.analog_pins,
            PinClass::Pwm => &self.pwm_pins,
            PinClass::Serial => &self.serial_pins,
            PinClass::Spi => &self.spi_pins,
            PinClass::I2c => &self.i2c_pins,
            PinClass::Interrupt => &self.interrupt_pins,
            PinClass::BuiltinLed => &self.builtin_led,
        }
    }

    pub fn has_pin(&self, class: PinClass, value: &str) -> bool {
        self.pin_class(class).iter().any(|(_, v)| v == value)
    }

    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.joints.iter().find(|joint| joint.name == name)
    }

    /// Copy-with-overrides constructor; near-identical boards share their pin
    /// tables this way instead of re-declaring them.
    pub fn derive(
        &self,
        id: &str,
        name: &str,
        description: &str,
        compiler_flag: Option<&str>,
    ) -> BoardProfile {
        let mut profile = self.clone();
        profile.id = id.to_string();
        profile.name = name.to_string();
        profile.description = description.to_string();
        if let Some(flag) = compiler_flag {
            profile.compiler_flag = flag.to_string();
        }
        profile
    }

    fn with_joints(mut self, model: &str, joints: &[(&str, &str, i32, bool)]) -> BoardProfile {
        self.allbot_model = Some(model.to_string());
        self.joints = joints
            .iter()
            .map(|&(constant, name, init_angle, flipped)| Joint {
                constant: constant.to_string(),
                name: name.to_string(),
                init_angle,
                flipped,
            })
            .collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct UnknownBoardError {
    pub id: String,
}

impl Display for UnknownBoardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown board profile '{}'.", self.id)
    }
}

impl Error for UnknownBoardError {}

/// Registry of every known profile plus the currently selected one. Owned by
/// the assembly session rather than living in a process-wide slot, so
/// parallel sessions stay independent.
#[derive(Debug)]
pub struct Catalog {
    profiles: HashMap<String, BoardProfile>,
    order: Vec<String>,
    selected: String,
}

impl Catalog {
    /// Builds the built-in profile set. The Uno is the default selection.
    pub fn builtin() -> Catalog {
        let mut catalog = Catalog {
            profiles: HashMap::new(),
            order: Vec::new(),
            selected: "uno".to_string(),
        };

        let uno = uno_profile();
        let nano = uno.derive(
            "nano_328",
            "Arduino Nano 328",
            "Arduino Nano with ATmega328 compatible board",
            Some("arduino:avr:nano:cpu=atmega328"),
        );
        let leonardo = leonardo_profile(&uno);
        let mega = mega_profile(&uno);
        let nodemcu = nodemcu_profile();

        let allbot_vr204_uno = uno
            .derive(
                "allbot_vr204_uno",
                "AllBot VR204 Uno",
                "AllBot with 2 legs, 4 servo, with uno",
                None,
            )
            .with_joints("VR204", VR204_JOINTS);
        let allbot_vr204_mega = mega
            .derive(
                "allbot_vr204_mega",
                "AllBot VR204 Mega",
                "AllBot with 2 legs, 4 servo, with mega",
                None,
            )
            .with_joints("VR204", VR204_JOINTS);
        let allbot_vr408_uno = uno
            .derive(
                "allbot_vr408_uno",
                "AllBot VR408 Uno",
                "AllBot with 4 legs, 8 servo, with uno",
                None,
            )
            .with_joints("VR408", VR408_JOINTS);
        let allbot_vr408_mega = mega
            .derive(
                "allbot_vr408_mega",
                "AllBot VR408 Mega",
                "AllBot with 4 legs, 8 servo, with mega",
                None,
            )
            .with_joints("VR408", VR408_JOINTS);

        for profile in [
            uno,
            nano,
            leonardo,
            mega,
            nodemcu,
            allbot_vr204_uno,
            allbot_vr204_mega,
            allbot_vr408_uno,
            allbot_vr408_mega,
        ] {
            catalog.register(profile);
        }
        catalog
    }

    pub fn register(&mut self, profile: BoardProfile) {
        if !self.profiles.contains_key(&profile.id) {
            self.order.push(profile.id.clone());
        }
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn lookup(&self, id: &str) -> Option<&BoardProfile> {
        self.profiles.get(id)
    }

    /// Registered profile ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn selected(&self) -> &BoardProfile {
        &self.profiles[&self.selected]
    }

    pub fn selected_id(&self) -> &str {
        &self.selected
    }

    /// Swaps the selection. On an unknown id the previous selection stays
    /// active. Returns whether the selection actually changed; pin-field
    /// refresh on the loaded program is the caller's follow-up.
    pub fn select(&mut self, id: &str) -> Result<bool, UnknownBoardError> {
        if !self.profiles.contains_key(id) {
            return Err(UnknownBoardError { id: id.to_string() });
        }
        if self.selected == id {
            return Ok(false);
        }
        self.selected = id.to_string();
        Ok(true)
    }
}

fn numbered(start: u32, end: u32, prefix: &str) -> PinList {
    (start..=end)
        .map(|n| (format!("{}{}", prefix, n), format!("{}{}", prefix, n)))
        .collect()
}

fn digital_io(start: u32, end: u32) -> PinList {
    numbered(start, end, "")
}

fn analog_io(start: u32, end: u32) -> PinList {
    numbered(start, end, "A")
}

fn pairs(items: &[(&str, &str)]) -> PinList {
    items
        .iter()
        .map(|&(label, value)| (label.to_string(), value.to_string()))
        .collect()
}

const SERIAL_SPEEDS: &[(&str, &str)] = &[
    ("300", "300"),
    ("600", "600"),
    ("1200", "1200"),
    ("2400", "2400"),
    ("4800", "4800"),
    ("9600", "9600"),
    ("14400", "14400"),
    ("19200", "19200"),
    ("28800", "28800"),
    ("31250", "31250"),
    ("38400", "38400"),
    ("57600", "57600"),
    ("115200", "115200"),
];

const VR204_JOINTS: &[(&str, &str, i32, bool)] = &[
    ("ARD_ALLBOT_HIPLEFT", "hipLeft", 90, true),
    ("ARD_ALLBOT_HIPRIGHT", "hipRight", 90, false),
    ("ARD_ALLBOT_ANKLELEFT", "ankleLeft", 90, true),
    ("ARD_ALLBOT_ANKLERIGHT", "ankleRight", 90, false),
];

const VR408_JOINTS: &[(&str, &str, i32, bool)] = &[
    ("ARD_ALLBOT_HIPFRONTLEFT", "hipFrontLeft", 45, false),
    ("ARD_ALLBOT_HIPFRONTRIGHT", "hipFrontRight", 45, true),
    ("ARD_ALLBOT_HIPREARLEFT", "hipRearLeft", 45, true),
    ("ARD_ALLBOT_HIPREARRIGHT", "hipRearRight", 45, false),
    ("ARD_ALLBOT_KNEEFRONTLEFT", "kneeFrontLeft", 45, true),
    ("ARD_ALLBOT_KNEEFRONTRIGHT", "kneeFrontRight", 45, false),
    ("ARD_ALLBOT_KNEEREARLEFT", "kneeRearLeft", 45, true),
    ("ARD_ALLBOT_KNEEREARRIGHT", "kneeRearRight", 45, false),
];

fn uno_profile() -> BoardProfile {
    let mut digital = digital_io(0, 13);
    digital.extend(analog_io(0, 5));
    BoardProfile {
        id: "uno".to_string(),
        name: "Arduino Uno".to_string(),
        description: "Arduino Uno standard compatible board".to_string(),
        compiler_flag: "arduino:avr:uno".to_string(),
        digital_pins: digital,
        analog_pins: analog_io(0, 5),
        pwm_pins: pairs(&[
            ("3", "3"),
            ("5", "5"),
            ("6", "6"),
            ("9", "9"),
            ("10", "10"),
            ("11", "11"),
        ]),
        serial_pins: pairs(&[("RX", "0"), ("TX", "1")]),
        spi_pins: pairs(&[("MOSI", "11"), ("MISO", "12"), ("SCK", "13")]),
        i2c_pins: pairs(&[("SDA", "A4"), ("SCL", "A5")]),
        interrupt_pins: pairs(&[("interrupt0", "2"), ("interrupt1", "3")]),
        builtin_led: pairs(&[("BUILTIN_LED", "13")]),
        serial_speeds: pairs(SERIAL_SPEEDS),
        allbot_model: None,
        joints: Vec::new(),
    }
}

fn leonardo_profile(uno: &BoardProfile) -> BoardProfile {
    let mut profile = uno.derive(
        "leonardo",
        "Arduino Leonardo",
        "Arduino Leonardo with ATmega32u4 compatible board",
        Some("arduino:avr:leonardo"),
    );
    profile.pwm_pins.push(("13".to_string(), "13".to_string()));
    profile.spi_pins = pairs(&[("MOSI", "16"), ("MISO", "14"), ("SCK", "15")]);
    profile.i2c_pins = pairs(&[("SDA", "2"), ("SCL", "3")]);
    profile.interrupt_pins = pairs(&[
        ("interrupt0", "3"),
        ("interrupt1", "2"),
        ("interrupt2", "0"),
        ("interrupt3", "1"),
        ("interrupt4", "7"),
    ]);
    profile
}

fn mega_profile(uno: &BoardProfile) -> BoardProfile {
    let mut digital = digital_io(0, 53);
    digital.extend(analog_io(0, 15));
    let mut pwm = digital_io(2, 13);
    pwm.extend(digital_io(44, 46));
    BoardProfile {
        id: "mega".to_string(),
        name: "Arduino Mega".to_string(),
        description: "Arduino Mega-compatible board".to_string(),
        compiler_flag: "arduino:avr:mega".to_string(),
        digital_pins: digital,
        analog_pins: analog_io(0, 15),
        pwm_pins: pwm,
        serial_pins: pairs(&[("RX", "0"), ("TX", "1")]),
        spi_pins: pairs(&[("MOSI", "51"), ("MISO", "50"), ("SCK", "52")]),
        i2c_pins: pairs(&[("SDA", "20"), ("SCL", "21")]),
        interrupt_pins: pairs(&[
            ("interrupt0", "2"),
            ("interrupt1", "3"),
            ("interrupt2", "21"),
            ("interrupt3", "20"),
            ("interrupt4", "19"),
            ("interrupt5", "18"),
        ]),
        builtin_led: uno.builtin_led.clone(),
        serial_speeds: uno.serial_speeds.clone(),
        allbot_model: None,
        joints: Vec::new(),
    }
}

fn nodemcu_profile() -> BoardProfile {
    let digital = numbered(0, 10, "D");
    BoardProfile {
        id: "nodemcu".to_string(),
        name: "NodeMCU".to_string(),
        description: "NodeMCU board with ESP8266".to_string(),
        compiler_flag: "esp8266:esp8266:nodemcuv2".to_string(),
        digital_pins: digital.clone(),
        analog_pins: analog_io(0, 0),
        pwm_pins: digital.clone(),
        serial_pins: pairs(&[("RX", "D9"), ("TX", "D10")]),
        spi_pins: pairs(&[("MOSI", "D7"), ("MISO", "D6"), ("SCK", "D5")]),
        i2c_pins: pairs(&[("SDA", "D2"), ("SCL", "D1")]),
        interrupt_pins: digital,
        builtin_led: pairs(&[("BUILTIN_1", "D0")]),
        serial_speeds: pairs(SERIAL_SPEEDS),
        allbot_model: None,
        joints: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_builtin_profiles() {
        let catalog = Catalog::builtin();
        assert!(catalog.lookup("uno").is_some());
        assert!(catalog.lookup("mega").is_some());
        assert!(catalog.lookup("teensy").is_none());
    }

    #[test]
    fn uno_is_default_selection() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.selected_id(), "uno");
        assert_eq!(catalog.selected().name, "Arduino Uno");
    }

    #[test]
    fn select_unknown_board_keeps_previous_selection() {
        let mut catalog = Catalog::builtin();
        let err = catalog.select("atmega4809").unwrap_err();
        assert_eq!(err.id, "atmega4809");
        assert_eq!(catalog.selected_id(), "uno");
    }

    #[test]
    fn select_same_board_reports_no_change() {
        let mut catalog = Catalog::builtin();
        assert!(!catalog.select("uno").unwrap());
        assert!(catalog.select("mega").unwrap());
        assert_eq!(catalog.selected_id(), "mega");
    }

    #[test]
    fn derive_shares_tables_and_overrides_identity() {
        let catalog = Catalog::builtin();
        let uno = catalog.lookup("uno").unwrap();
        let nano = catalog.lookup("nano_328").unwrap();
        assert_eq!(nano.digital_pins, uno.digital_pins);
        assert_ne!(nano.compiler_flag, uno.compiler_flag);
        assert_eq!(nano.name, "Arduino Nano 328");
    }

    #[test]
    fn allbot_profiles_carry_joint_tables() {
        let catalog = Catalog::builtin();
        let vr204 = catalog.lookup("allbot_vr204_uno").unwrap();
        assert_eq!(vr204.allbot_model.as_deref(), Some("VR204"));
        assert_eq!(vr204.joints.len(), 4);
        assert!(vr204.joint("ankleLeft").is_some());
        let vr408 = catalog.lookup("allbot_vr408_mega").unwrap();
        assert_eq!(vr408.joints.len(), 8);
        // Derived from the mega, so the big pin table came along.
        assert!(vr408.has_pin(PinClass::Digital, "53"));
    }

    #[test]
    fn joint_flip_flags_follow_the_servo_mounting() {
        let catalog = Catalog::builtin();
        let vr204 = catalog.lookup("allbot_vr204_uno").unwrap();
        let flips: Vec<bool> = vr204.joints.iter().map(|j| j.flipped).collect();
        // Left-side servos of the two-legged bot are mounted mirrored.
        assert_eq!(flips, [true, false, true, false]);
        let vr408 = catalog.lookup("allbot_vr408_mega").unwrap();
        let flips: Vec<bool> = vr408.joints.iter().map(|j| j.flipped).collect();
        assert_eq!(flips, [false, true, true, false, true, false, true, false]);
    }

    #[test]
    fn mega_has_pins_the_uno_lacks() {
        let catalog = Catalog::builtin();
        let uno = catalog.lookup("uno").unwrap();
        let mega = catalog.lookup("mega").unwrap();
        assert!(!uno.has_pin(PinClass::Digital, "22"));
        assert!(mega.has_pin(PinClass::Digital, "22"));
        assert!(uno.has_pin(PinClass::Digital, "A3"));
    }
}
