use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Electrical role a reservation claims for a pin. Mirrors the Arduino
/// `pinMode` vocabulary plus the peripheral classes that bypass `pinMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinType {
    Input,
    Output,
    Pwm,
    Servo,
    Stepper,
    Serial,
    Spi,
    I2c,
}

impl Display for PinType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PinType::Input => "INPUT",
            PinType::Output => "OUTPUT",
            PinType::Pwm => "PWM",
            PinType::Servo => "SERVO",
            PinType::Stepper => "STEPPER",
            PinType::Serial => "SERIAL",
            PinType::Spi => "SPI",
            PinType::I2c => "I2C",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub pin: String,
    pub pin_type: PinType,
    pub purpose: String,
    pub block_id: String,
}

/// Raised when a second block claims a pin already held by another block.
/// Conflicts are reported, never fatal; the sketch is still emitted.
#[derive(Debug, Clone)]
pub struct PinConflict {
    pub pin: String,
    pub holder_id: String,
    pub holder_purpose: String,
    pub claimant_id: String,
    pub claimant_purpose: String,
}

impl PinConflict {
    /// Warning text shown on both contending blocks.
    pub fn message(&self) -> String {
        format!(
            "Pin {} needed for {} is already used as {}.",
            self.pin, self.claimant_purpose, self.holder_purpose
        )
    }
}

/// Tracks which physical pins have been claimed during one assembly pass.
/// Cleared and rebuilt from scratch on every pass.
#[derive(Debug, Default)]
pub struct ReservationLedger {
    by_pin: HashMap<String, usize>,
    entries: Vec<Reservation>,
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `pin` for `block_id`. Returns the conflict description when the
    /// pin is already held by a different block; re-claiming a pin from the
    /// same block just records the newest purpose.
    pub fn reserve(
        &mut self,
        pin: &str,
        pin_type: PinType,
        purpose: &str,
        block_id: &str,
    ) -> Option<PinConflict> {
        if let Some(&slot) = self.by_pin.get(pin) {
            let holder = &mut self.entries[slot];
            if holder.block_id == block_id {
                holder.pin_type = pin_type;
                holder.purpose = purpose.to_string();
                return None;
            }
            return Some(PinConflict {
                pin: pin.to_string(),
                holder_id: holder.block_id.clone(),
                holder_purpose: holder.purpose.clone(),
                claimant_id: block_id.to_string(),
                claimant_purpose: purpose.to_string(),
            });
        }
        self.by_pin.insert(pin.to_string(), self.entries.len());
        self.entries.push(Reservation {
            pin: pin.to_string(),
            pin_type,
            purpose: purpose.to_string(),
            block_id: block_id.to_string(),
        });
        None
    }

    /// Reservations in first-claim order.
    pub fn reservations(&self) -> &[Reservation] {
        &self.entries
    }

    pub fn holder(&self, pin: &str) -> Option<&Reservation> {
        self.by_pin.get(pin).map(|&slot| &self.entries[slot])
    }

    pub fn reset(&mut self) {
        self.by_pin.clear();
        self.entries.clear();
    }
}
