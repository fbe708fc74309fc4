//! Built-in per-block generators. Each generator is a unit struct wired into
//! the registry by kind; translation feeds the session's fragment registry
//! and reservation ledger and returns the block's own code contribution.

use crate::assembler::{
    AssemblyError, BlockGen, Code, GenRegistry, Order, PinField, Session,
};
use crate::boards::PinClass;
use crate::pins::PinType;
use crate::workspace::BlockNode;
use regex::Regex;
use std::sync::OnceLock;

const NO_ALLBOT: &str = "// No AllBot on the workspace. Add it to generate code";

/// Turns a user-chosen name into a valid C identifier.
pub fn sanitize_name(raw: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("static pattern"));
    let cleaned = invalid.replace_all(raw.trim(), "_").to_string();
    if cleaned.is_empty() {
        "var".to_string()
    } else if cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}

fn field<'a>(block: &'a BlockNode, name: &str) -> Result<&'a str, AssemblyError> {
    block.field(name).ok_or_else(|| {
        AssemblyError::new(format!(
            "Block '{}' ('{}') is missing its '{}' field.",
            block.kind, block.id, name
        ))
    })
}

fn pin_mode_setup(ctx: &mut Session<'_>, pin: &str, mode: &str) {
    ctx.add_setup(&format!("io_{}", pin), &format!("pinMode({}, {});", pin, mode), false);
}

struct DigitalWrite;

impl BlockGen for DigitalWrite {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = field(block, "PIN")?.to_string();
        let state = ctx.value_or(block, "STATE", Order::Atomic, "LOW")?;
        ctx.reserve_pin(block, &pin, PinType::Output, "Digital Write");
        pin_mode_setup(ctx, &pin, "OUTPUT");
        Ok(Code::Statement(format!("digitalWrite({}, {});", pin, state)))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "PIN",
            class: PinClass::Digital,
        }]
    }
}

struct DigitalRead;

impl BlockGen for DigitalRead {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = field(block, "PIN")?.to_string();
        ctx.reserve_pin(block, &pin, PinType::Input, "Digital Read");
        pin_mode_setup(ctx, &pin, "INPUT");
        Ok(Code::Value(format!("digitalRead({})", pin), Order::Atomic))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "PIN",
            class: PinClass::Digital,
        }]
    }
}

struct BuiltinLed;

impl BlockGen for BuiltinLed {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = ctx
            .board()
            .builtin_led
            .first()
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| "13".to_string());
        let state = ctx.value_or(block, "STATE", Order::Atomic, "LOW")?;
        ctx.reserve_pin(block, &pin, PinType::Output, "Set LED");
        pin_mode_setup(ctx, &pin, "OUTPUT");
        Ok(Code::Statement(format!("digitalWrite({}, {});", pin, state)))
    }
}

struct AnalogWrite;

impl BlockGen for AnalogWrite {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = field(block, "PIN")?.to_string();
        let value = ctx.value_or(block, "NUM", Order::Atomic, "0")?;
        ctx.reserve_pin(block, &pin, PinType::Pwm, "Analogue Write");
        pin_mode_setup(ctx, &pin, "OUTPUT");
        Ok(Code::Statement(format!("analogWrite({}, {});", pin, value)))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "PIN",
            class: PinClass::Pwm,
        }]
    }
}

struct AnalogRead;

impl BlockGen for AnalogRead {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = field(block, "PIN")?.to_string();
        ctx.reserve_pin(block, &pin, PinType::Input, "Analogue Read");
        pin_mode_setup(ctx, &pin, "INPUT");
        Ok(Code::Value(format!("analogRead({})", pin), Order::Atomic))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "PIN",
            class: PinClass::Analog,
        }]
    }
}

struct HighLow;

impl BlockGen for HighLow {
    fn translate(&self, block: &BlockNode, _ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let state = if field(block, "STATE")? == "HIGH" {
            "HIGH"
        } else {
            "LOW"
        };
        Ok(Code::Value(state.to_string(), Order::Atomic))
    }
}

struct Tone;

impl BlockGen for Tone {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = field(block, "TONEPIN")?.to_string();
        let freq = ctx.value_or(block, "FREQUENCY", Order::Atomic, "0")?;
        ctx.reserve_pin(block, &pin, PinType::Output, "Tone Pin");
        pin_mode_setup(ctx, &pin, "OUTPUT");
        Ok(Code::Statement(format!("tone({}, {});", pin, freq)))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "TONEPIN",
            class: PinClass::Digital,
        }]
    }
}

struct NoTone;

impl BlockGen for NoTone {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = field(block, "TONEPIN")?.to_string();
        ctx.reserve_pin(block, &pin, PinType::Output, "Tone Pin");
        pin_mode_setup(ctx, &pin, "OUTPUT");
        Ok(Code::Statement(format!("noTone({});", pin)))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "TONEPIN",
            class: PinClass::Digital,
        }]
    }
}

struct ToneDuration;

impl BlockGen for ToneDuration {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = field(block, "TONEPIN")?.to_string();
        let freq = ctx.value_or(block, "FREQUENCY", Order::Atomic, "0")?;
        let duration = ctx.value_or(block, "DURATION", Order::Atomic, "0")?;
        ctx.reserve_pin(block, &pin, PinType::Output, "Tone Pin");
        pin_mode_setup(ctx, &pin, "OUTPUT");
        Ok(Code::Statement(format!(
            "tone({}, {}, {});",
            pin, freq, duration
        )))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "TONEPIN",
            class: PinClass::Digital,
        }]
    }
}

struct Delay;

impl BlockGen for Delay {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let millis = ctx.value_or(block, "DELAY_TIME_MILI", Order::Atomic, "0")?;
        Ok(Code::Statement(format!("delay({});", millis)))
    }
}

struct Millis;

impl BlockGen for Millis {
    fn translate(&self, _block: &BlockNode, _ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        Ok(Code::Value("millis()".to_string(), Order::Atomic))
    }
}

struct If;

impl BlockGen for If {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let mut code = String::new();
        let mut branch = 0;
        loop {
            let condition_socket = format!("IF{}", branch);
            if branch > 0 && block.value(&condition_socket).is_none() {
                break;
            }
            let condition = ctx.value_or(block, &condition_socket, Order::None, "false")?;
            let body = ctx.statement_to_code(block, &format!("DO{}", branch))?;
            if branch > 0 {
                code.push_str(" else ");
            }
            code.push_str(&branch_chunk(&format!("if ({})", condition), &body));
            branch += 1;
        }
        if block.statements.iter().any(|(name, _)| name == "ELSE") {
            let body = ctx.statement_to_code(block, "ELSE")?;
            code.push_str(" else ");
            code.push_str(&branch_chunk("", &body));
        }
        Ok(Code::Statement(code))
    }
}

fn branch_chunk(head: &str, body: &str) -> String {
    let brace = if head.is_empty() {
        "{".to_string()
    } else {
        format!("{} {{", head)
    };
    if body.is_empty() {
        format!("{}\n}}", brace)
    } else {
        format!("{}\n{}\n}}", brace, body)
    }
}

struct RepeatExt;

impl BlockGen for RepeatExt {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let times = ctx.value_or(block, "TIMES", Order::Assignment, "10")?;
        let body = ctx.statement_to_code(block, "DO")?;
        Ok(Code::Statement(branch_chunk(
            &format!("for (int count = 0; count < {}; count++)", times),
            &body,
        )))
    }
}

struct LogicCompare;

impl BlockGen for LogicCompare {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let (operator, order) = match field(block, "OP")? {
            "EQ" => ("==", Order::Equality),
            "NEQ" => ("!=", Order::Equality),
            "LT" => ("<", Order::Relational),
            "LTE" => ("<=", Order::Relational),
            "GT" => (">", Order::Relational),
            "GTE" => (">=", Order::Relational),
            other => {
                return Err(AssemblyError::new(format!(
                    "Unknown comparison operator '{}' in block '{}'.",
                    other, block.id
                )))
            }
        };
        let left = ctx.value_or(block, "A", order, "0")?;
        let right = ctx.value_or(block, "B", order, "0")?;
        Ok(Code::Value(
            format!("{} {} {}", left, operator, right),
            order,
        ))
    }
}

struct LogicBoolean;

impl BlockGen for LogicBoolean {
    fn translate(&self, block: &BlockNode, _ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let value = if field(block, "BOOL")? == "TRUE" {
            "true"
        } else {
            "false"
        };
        Ok(Code::Value(value.to_string(), Order::Atomic))
    }
}

struct MathNumber;

impl BlockGen for MathNumber {
    fn translate(&self, block: &BlockNode, _ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let raw = field(block, "NUM")?.trim().to_string();
        let order = if raw.starts_with('-') {
            Order::UnaryPrefix
        } else {
            Order::Atomic
        };
        Ok(Code::Value(raw, order))
    }
}

struct MathArithmetic;

impl BlockGen for MathArithmetic {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        match field(block, "OP")? {
            "POWER" => {
                let base = ctx.value_or(block, "A", Order::None, "0")?;
                let exponent = ctx.value_or(block, "B", Order::None, "0")?;
                Ok(Code::Value(
                    format!("pow({}, {})", base, exponent),
                    Order::UnaryPostfix,
                ))
            }
            op => {
                let (operator, order) = match op {
                    "ADD" => ("+", Order::Additive),
                    "MINUS" => ("-", Order::Additive),
                    "MULTIPLY" => ("*", Order::Multiplicative),
                    "DIVIDE" => ("/", Order::Multiplicative),
                    other => {
                        return Err(AssemblyError::new(format!(
                            "Unknown arithmetic operator '{}' in block '{}'.",
                            other, block.id
                        )))
                    }
                };
                let left = ctx.value_or(block, "A", order, "0")?;
                let right = ctx.value_or(block, "B", order, "0")?;
                Ok(Code::Value(
                    format!("{} {} {}", left, operator, right),
                    order,
                ))
            }
        }
    }
}

struct TextString;

impl BlockGen for TextString {
    fn translate(&self, block: &BlockNode, _ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let text = block.field("TEXT").unwrap_or_default();
        let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
        Ok(Code::Value(format!("\"{}\"", escaped), Order::Atomic))
    }
}

struct DeclareVariable {
    c_type: &'static str,
    default: &'static str,
}

impl BlockGen for DeclareVariable {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let name = sanitize_name(field(block, "NAME")?);
        let value = ctx.value_or(block, "NUM", Order::Atomic, self.default)?;
        ctx.add_variable(
            &name,
            &format!("{} {} = {};", self.c_type, name, value),
            true,
        );
        Ok(Code::Statement(String::new()))
    }
}

struct VariableGet;

impl BlockGen for VariableGet {
    fn translate(&self, block: &BlockNode, _ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let name = sanitize_name(field(block, "VAR")?);
        Ok(Code::Value(name, Order::Atomic))
    }
}

struct VariableSet;

impl BlockGen for VariableSet {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let name = sanitize_name(field(block, "VAR")?);
        let value = ctx.value_or(block, "VALUE", Order::Assignment, "0")?;
        // A declare block may already own this slot; first write wins.
        ctx.add_variable(&name, &format!("int {} = 0;", name), false);
        Ok(Code::Statement(format!("{} = {};", name, value)))
    }
}

fn servo_plumbing(ctx: &mut Session<'_>, block: &BlockNode, pin: &str) {
    ctx.add_include("servo", "#include <Servo.h>");
    ctx.add_declaration(
        &format!("servo_{}", pin),
        &format!("Servo myServo{};", pin),
    );
    ctx.add_setup(
        &format!("servo_{}", pin),
        &format!("myServo{}.attach({});", pin, pin),
        false,
    );
    ctx.reserve_pin(block, pin, PinType::Servo, "Servo Write");
}

struct ServoWrite;

impl BlockGen for ServoWrite {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = field(block, "SERVO_PIN")?.to_string();
        let angle = ctx.value_or(block, "SERVO_ANGLE", Order::Atomic, "90")?;
        servo_plumbing(ctx, block, &pin);
        Ok(Code::Statement(format!("myServo{}.write({});", pin, angle)))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "SERVO_PIN",
            class: PinClass::Pwm,
        }]
    }
}

struct ServoRead;

impl BlockGen for ServoRead {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let pin = field(block, "SERVO_PIN")?.to_string();
        servo_plumbing(ctx, block, &pin);
        Ok(Code::Value(format!("myServo{}.read()", pin), Order::Atomic))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "SERVO_PIN",
            class: PinClass::Pwm,
        }]
    }
}

struct SerialSetup;

impl BlockGen for SerialSetup {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let speed = field(block, "SPEED")?.to_string();
        // Config blocks own this slot; the last one placed wins.
        ctx.add_setup("serial_Serial", &format!("Serial.begin({});", speed), true);
        Ok(Code::Statement(String::new()))
    }
}

struct SerialPrint;

impl BlockGen for SerialPrint {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let content = ctx.value_or(block, "CONTENT", Order::Atomic, "\"\"")?;
        // Default speed when no serial setup block is placed.
        ctx.add_setup("serial_Serial", "Serial.begin(9600);", false);
        Ok(Code::Statement(format!("Serial.println({});", content)))
    }
}

fn allbot_enum_declaration(joints: &[crate::boards::Joint]) -> String {
    let mut decl = format!("ALLBOT BOT({});   // Number of motors\n\nenum MotorName {{\n", joints.len());
    for joint in joints {
        decl.push_str(&format!("  {},\n", joint.name));
    }
    decl.push_str("};");
    decl
}

struct AllbotServoHub;

impl BlockGen for AllbotServoHub {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let servo = field(block, "NAMESERVO")?.to_string();
        let pin = field(block, "PIN")?.to_string();
        if ctx.board().joints.is_empty() {
            ctx.add_declaration("allbot", NO_ALLBOT);
            ctx.warn(block, "allbot", "No AllBot board profile is selected.");
            return Ok(Code::Statement(String::new()));
        }
        let joint = ctx.board().joint(&servo).cloned();
        let Some(joint) = joint else {
            ctx.add_declaration("allbot_joint", "// Unknown AllBot joint selected");
            ctx.warn(
                block,
                "allbot",
                &format!("Joint '{}' does not exist on this AllBot.", servo),
            );
            return Ok(Code::Statement(String::new()));
        };
        let enum_decl = allbot_enum_declaration(&ctx.board().joints);
        ctx.add_include("servo", "#include <Servo.h>");
        ctx.add_include("allbot", "#include <ALLBOT.h>");
        ctx.add_variable("ALLBOT", &enum_decl, true);
        ctx.add_variable(
            &servo,
            &format!("int pin{} = {};", servo, pin),
            true,
        );
        ctx.reserve_pin(block, &pin, PinType::Servo, "Servo Write");
        ctx.add_setup(
            &format!("allbot1_{}", servo),
            &format!(
                "BOT.attach({}, {}, {}, {}, 0);",
                servo, pin, joint.init_angle, joint.flipped
            ),
            true,
        );
        ctx.add_setup(
            "allbot2_init",
            "// Wait for joints to be initialized\ndelay(500);",
            true,
        );
        Ok(Code::Statement(String::new()))
    }

    fn board_requirement(&self, block: &BlockNode) -> Option<String> {
        block.field("MODEL").map(str::to_string)
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "PIN",
            class: PinClass::Pwm,
        }]
    }
}

const ALLBOT_CHIRP: &str = r#"
void chirp(int beeps, int speedms) {
  for (int i = 0; i < beeps; i++) {
    for (int j = 0; j < 255; j++) {
      digitalWrite(sounderPin, HIGH);
      delayMicroseconds((355 - j) + (speedms * 2));
      digitalWrite(sounderPin, LOW);
      delayMicroseconds((355 - j) + (speedms * 2));
    }
    delay(30);
  }
}"#;

const VR204_WALKFORWARD: &str = r#"
void walkforward(int steps, int speedms) {
  BOT.move(hipLeft, 130);
  BOT.move(hipRight, 40);
  BOT.animate(speedms);
  for (int i = 0; i < steps; i++) {
    BOT.move(ankleLeft, 45);
    BOT.animate(speedms * 2);
    BOT.move(ankleRight, 135);
    BOT.animate(speedms * 2);
    BOT.move(ankleLeft, 90);
    BOT.animate(speedms * 2);
    BOT.move(ankleRight, 90);
    BOT.animate(speedms * 2);
  }
  BOT.move(hipLeft, 90);
  BOT.move(hipRight, 90);
  BOT.animate(speedms);
}"#;

const VR204_WALKBACKWARD: &str = r#"
void walkbackward(int steps, int speedms) {
  BOT.move(hipLeft, 130);
  BOT.move(hipRight, 40);
  BOT.animate(speedms);
  for (int i = 0; i < steps; i++) {
    BOT.move(ankleLeft, 135);
    BOT.animate(speedms * 2);
    BOT.move(ankleRight, 45);
    BOT.animate(speedms * 2);
    BOT.move(ankleLeft, 90);
    BOT.animate(speedms * 2);
    BOT.move(ankleRight, 90);
    BOT.animate(speedms * 2);
  }
  BOT.move(hipLeft, 90);
  BOT.move(hipRight, 90);
  BOT.animate(speedms);
}"#;

const VR204_WALKLEFT: &str = r#"
void walkleft(int steps, int speedms) {
  for (int i = 0; i < steps; i++) {
    BOT.move(ankleLeft, 45);
    BOT.animate(speedms);
    BOT.move(ankleRight, 135);
    BOT.animate(speedms);
    BOT.move(ankleLeft, 90);
    BOT.animate(speedms);
    BOT.move(ankleRight, 90);
    BOT.animate(speedms);
  }
}"#;

const VR204_WALKRIGHT: &str = r#"
void walkright(int steps, int speedms) {
  for (int i = 0; i < steps; i++) {
    BOT.move(ankleRight, 45);
    BOT.animate(speedms);
    BOT.move(ankleLeft, 135);
    BOT.animate(speedms);
    BOT.move(ankleRight, 90);
    BOT.animate(speedms);
    BOT.move(ankleLeft, 90);
    BOT.animate(speedms);
  }
}"#;

const VR204_LOOKLEFT: &str = r#"
void lookleft(int speedms) {
  BOT.move(hipLeft, 135);
  BOT.move(hipRight, 45);
  BOT.animate(speedms);
  delay(speedms / 2);
  BOT.move(hipLeft, 90);
  BOT.move(hipRight, 90);
  BOT.animate(speedms);
}"#;

const VR204_LOOKRIGHT: &str = r#"
void lookright(int speedms) {
  BOT.move(hipLeft, 45);
  BOT.move(hipRight, 135);
  BOT.animate(speedms);
  delay(speedms / 2);
  BOT.move(hipLeft, 90);
  BOT.move(hipRight, 90);
  BOT.animate(speedms);
}"#;

const VR204_SCARED: &str = r#"
void scared(int shakes, int beeps) {
  for (int i = 0; i < shakes; i++) {
    BOT.move(ankleLeft, 45);
    BOT.move(ankleRight, 45);
    BOT.animate(100);
    BOT.move(ankleLeft, 135);
    BOT.move(ankleRight, 135);
    BOT.animate(100);
  }
  BOT.move(ankleLeft, 90);
  BOT.move(ankleRight, 90);
  BOT.animate(100);
  chirp(beeps, 0);
}"#;

const VR408_WALKFORWARD: &str = r#"
void walkforward(int steps, int speedms) {
  for (int i = 0; i < steps; i++) {
    BOT.move(kneeRearRight, 80);
    BOT.move(kneeFrontLeft, 80);
    BOT.animate(speedms);
    BOT.move(hipRearRight, 80);
    BOT.move(hipFrontLeft, 20);
    BOT.animate(speedms);
    BOT.move(kneeRearRight, 30);
    BOT.move(kneeFrontLeft, 30);
    BOT.animate(speedms);
    BOT.move(hipRearRight, 45);
    BOT.move(hipFrontLeft, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearRight, 45);
    BOT.move(kneeFrontLeft, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 80);
    BOT.move(kneeFrontRight, 80);
    BOT.animate(speedms);
    BOT.move(hipRearLeft, 80);
    BOT.move(hipFrontRight, 20);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 30);
    BOT.move(kneeFrontRight, 30);
    BOT.animate(speedms);
    BOT.move(hipRearLeft, 45);
    BOT.move(hipFrontRight, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 45);
    BOT.move(kneeFrontRight, 45);
    BOT.animate(speedms);
  }
}"#;

const VR408_WALKBACKWARD: &str = r#"
void walkbackward(int steps, int speedms) {
  for (int i = 0; i < steps; i++) {
    BOT.move(kneeRearRight, 80);
    BOT.move(kneeFrontLeft, 80);
    BOT.animate(speedms);
    BOT.move(hipRearRight, 20);
    BOT.move(hipFrontLeft, 80);
    BOT.animate(speedms);
    BOT.move(kneeRearRight, 30);
    BOT.move(kneeFrontLeft, 30);
    BOT.animate(speedms);
    BOT.move(hipRearRight, 45);
    BOT.move(hipFrontLeft, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearRight, 45);
    BOT.move(kneeFrontLeft, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 80);
    BOT.move(kneeFrontRight, 80);
    BOT.animate(speedms);
    BOT.move(hipRearLeft, 20);
    BOT.move(hipFrontRight, 80);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 30);
    BOT.move(kneeFrontRight, 30);
    BOT.animate(speedms);
    BOT.move(hipRearLeft, 45);
    BOT.move(hipFrontRight, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 45);
    BOT.move(kneeFrontRight, 45);
    BOT.animate(speedms);
  }
}"#;

const VR408_WALKLEFT: &str = r#"
void walkleft(int steps, int speedms) {
  for (int i = 0; i < steps; i++) {
    BOT.move(kneeRearRight, 80);
    BOT.move(kneeFrontLeft, 80);
    BOT.animate(speedms);
    BOT.move(hipRearRight, 0);
    BOT.move(hipFrontLeft, 90);
    BOT.animate(speedms);
    BOT.move(kneeRearRight, 30);
    BOT.move(kneeFrontLeft, 30);
    BOT.animate(speedms);
    BOT.move(hipRearRight, 45);
    BOT.move(hipFrontLeft, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearRight, 45);
    BOT.move(kneeFrontLeft, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 80);
    BOT.move(kneeFrontRight, 80);
    BOT.animate(speedms);
    BOT.move(hipRearLeft, 90);
    BOT.move(hipFrontRight, 0);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 30);
    BOT.move(kneeFrontRight, 30);
    BOT.animate(speedms);
    BOT.move(hipRearLeft, 45);
    BOT.move(hipFrontRight, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 45);
    BOT.move(kneeFrontRight, 45);
    BOT.animate(speedms);
  }
}"#;

const VR408_WALKRIGHT: &str = r#"
void walkright(int steps, int speedms) {
  for (int i = 0; i < steps; i++) {
    BOT.move(kneeRearLeft, 80);
    BOT.move(kneeFrontRight, 80);
    BOT.animate(speedms);
    BOT.move(hipRearLeft, 0);
    BOT.move(hipFrontRight, 90);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 30);
    BOT.move(kneeFrontRight, 30);
    BOT.animate(speedms);
    BOT.move(hipRearLeft, 45);
    BOT.move(hipFrontRight, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearLeft, 45);
    BOT.move(kneeFrontRight, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearRight, 80);
    BOT.move(kneeFrontLeft, 80);
    BOT.animate(speedms);
    BOT.move(hipRearRight, 90);
    BOT.move(hipFrontLeft, 0);
    BOT.animate(speedms);
    BOT.move(kneeRearRight, 30);
    BOT.move(kneeFrontLeft, 30);
    BOT.animate(speedms);
    BOT.move(hipRearRight, 45);
    BOT.move(hipFrontLeft, 45);
    BOT.animate(speedms);
    BOT.move(kneeRearRight, 45);
    BOT.move(kneeFrontLeft, 45);
    BOT.animate(speedms);
  }
}"#;

const VR408_LOOKLEFT: &str = r#"
void lookleft(int speedms) {
  BOT.move(hipRearLeft, 80);
  BOT.move(hipRearRight, 10);
  BOT.move(hipFrontLeft, 10);
  BOT.move(hipFrontRight, 80);
  BOT.animate(speedms);
  delay(speedms / 2);
  BOT.move(hipRearRight, 45);
  BOT.move(hipRearLeft, 45);
  BOT.move(hipFrontRight, 45);
  BOT.move(hipFrontLeft, 45);
  BOT.animate(speedms);
}"#;

const VR408_LOOKRIGHT: &str = r#"
void lookright(int speedms) {
  BOT.move(hipRearRight, 80);
  BOT.move(hipRearLeft, 10);
  BOT.move(hipFrontRight, 10);
  BOT.move(hipFrontLeft, 80);
  BOT.animate(speedms);
  delay(speedms / 2);
  BOT.move(hipRearRight, 45);
  BOT.move(hipRearLeft, 45);
  BOT.move(hipFrontRight, 45);
  BOT.move(hipFrontLeft, 45);
  BOT.animate(speedms);
}"#;

const VR408_SCARED: &str = r#"
void scared(int shakes, int beeps) {
  BOT.move(kneeFrontRight, 0);
  BOT.move(kneeRearRight, 0);
  BOT.move(kneeFrontLeft, 0);
  BOT.move(kneeRearLeft, 0);
  BOT.animate(50);
  for (int i = 0; i < shakes; i++) {
    BOT.move(hipRearRight, 80);
    BOT.move(hipRearLeft, 10);
    BOT.move(hipFrontRight, 10);
    BOT.move(hipFrontLeft, 80);
    BOT.animate(100);
    BOT.move(hipRearLeft, 80);
    BOT.move(hipRearRight, 10);
    BOT.move(hipFrontLeft, 10);
    BOT.move(hipFrontRight, 80);
    BOT.animate(50);
  }
  BOT.move(hipRearRight, 45);
  BOT.move(hipRearLeft, 45);
  BOT.move(hipFrontRight, 45);
  BOT.move(hipFrontLeft, 45);
  BOT.animate(200);
  chirp(beeps, 0);
  BOT.move(kneeFrontRight, 45);
  BOT.move(kneeRearRight, 45);
  BOT.move(kneeFrontLeft, 45);
  BOT.move(kneeRearLeft, 45);
  BOT.animate(75);
}"#;

/// Canned AllBot motion routine, keyed by model. The bodies come from the
/// vendor motion library; only the models the catalog ships are carried.
fn allbot_motion_function(model: &str, name: &str) -> Option<&'static str> {
    let body = match (model, name) {
        (_, "chirp") => ALLBOT_CHIRP,
        ("VR204", "walkforward") => VR204_WALKFORWARD,
        ("VR204", "walkbackward") => VR204_WALKBACKWARD,
        ("VR204", "walkleft") => VR204_WALKLEFT,
        ("VR204", "walkright") => VR204_WALKRIGHT,
        ("VR204", "lookleft") => VR204_LOOKLEFT,
        ("VR204", "lookright") => VR204_LOOKRIGHT,
        ("VR204", "scared") => VR204_SCARED,
        ("VR408", "walkforward") => VR408_WALKFORWARD,
        ("VR408", "walkbackward") => VR408_WALKBACKWARD,
        ("VR408", "walkleft") => VR408_WALKLEFT,
        ("VR408", "walkright") => VR408_WALKRIGHT,
        ("VR408", "lookleft") => VR408_LOOKLEFT,
        ("VR408", "lookright") => VR408_LOOKRIGHT,
        ("VR408", "scared") => VR408_SCARED,
        _ => return None,
    };
    Some(body.trim_start())
}

/// Argument shape of one motion block, with the stock default per socket.
enum MotionArgs {
    /// walk* blocks: `f(steps, speedms)`.
    StepsAndSpeed,
    /// look* blocks: `f(speedms)`.
    SpeedOnly,
    /// chirp: `f(beeps, speedms)`.
    BeepsAndSpeed,
    /// scared: `f(shakes, beeps)`.
    ShakesAndBeeps,
}

struct AllbotMotion {
    function: &'static str,
    args: MotionArgs,
}

impl BlockGen for AllbotMotion {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let Some(model) = ctx.board().allbot_model.clone() else {
            ctx.warn(block, "allbot", "No AllBot board profile is selected.");
            return Ok(Code::Statement(format!("{}\n", NO_ALLBOT)));
        };
        let Some(body) = allbot_motion_function(&model, self.function) else {
            return Ok(Code::Statement(format!(
                "// This AllBot has no {} function !!",
                self.function
            )));
        };
        let call = match self.args {
            MotionArgs::StepsAndSpeed => {
                let steps = ctx.value_or(block, "STEPS", Order::Atomic, "1")?;
                let speed = ctx.value_or(block, "SPEED", Order::Atomic, "200")?;
                format!("{}({}, {});", self.function, steps, speed)
            }
            MotionArgs::SpeedOnly => {
                let speed = ctx.value_or(block, "SPEED", Order::Atomic, "200")?;
                format!("{}({});", self.function, speed)
            }
            MotionArgs::BeepsAndSpeed => {
                let beeps = ctx.value_or(block, "BEEPS", Order::Atomic, "1")?;
                let speed = ctx.value_or(block, "SPEED", Order::Atomic, "100")?;
                // The piezo sounder of the shield.
                ctx.add_variable("sounderPin", "int sounderPin = 13;", false);
                format!("{}({}, {});", self.function, beeps, speed)
            }
            MotionArgs::ShakesAndBeeps => {
                let beeps = ctx.value_or(block, "BEEPS", Order::Atomic, "3")?;
                let shakes = ctx.value_or(block, "SHAKES", Order::Atomic, "10")?;
                ctx.add_variable("sounderPin", "int sounderPin = 13;", false);
                if let Some(chirp) = allbot_motion_function(&model, "chirp") {
                    ctx.add_function("chirp", chirp);
                }
                format!("{}({}, {});", self.function, shakes, beeps)
            }
        };
        ctx.add_function(self.function, body);
        Ok(Code::Statement(call))
    }
}

struct StepperConfig;

impl BlockGen for StepperConfig {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let name = sanitize_name(field(block, "STEPPER_NAME")?);
        let steps = ctx.value_or(block, "STEPPER_STEPS", Order::Atomic, "360")?;
        let speed = ctx.value_or(block, "STEPPER_SPEED", Order::Atomic, "90")?;
        let mut pins = vec![
            field(block, "STEPPER_PIN1")?.to_string(),
            field(block, "STEPPER_PIN2")?.to_string(),
        ];
        if block.field("STEPPER_NUMBER_OF_PINS") == Some("FOUR") {
            pins.push(field(block, "STEPPER_PIN3")?.to_string());
            pins.push(field(block, "STEPPER_PIN4")?.to_string());
        }
        for pin in &pins {
            ctx.reserve_pin(block, pin, PinType::Stepper, "Stepper");
        }
        let pin_list = pins.join(", ");
        ctx.add_variable(
            &name,
            &format!("int {}[{}] = {{{}}};", name, pins.len(), pin_list),
            true,
        );
        let instance = format!("stepper_{}", name);
        ctx.add_include("stepper", "#include <Stepper.h>");
        ctx.add_declaration(
            &instance,
            &format!(
                "const long {0}_steps = {1};\nStepper {0}({0}_steps, {2});\nbool {0}_rotating = false;\nunsigned long {0}_stepsdone = 0;\nbool {0}_finished = false;",
                instance, steps, pin_list
            ),
        );
        ctx.add_setup(
            &instance,
            &format!("int {0}_rpm = {1};\n{0}.setSpeed({0}_rpm);", instance, speed),
            true,
        );
        ctx.add_function(
            &format!("{}Angle2Steps", instance),
            &format!(
                "unsigned long {0}_Angle2Steps(int angle) {{\n  if (angle < 0) {{\n    angle = -angle;\n  }}\n  return (angle * {0}_steps) / 360;\n}}",
                instance
            ),
        );
        Ok(Code::Statement(String::new()))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[
            PinField {
                field: "STEPPER_PIN1",
                class: PinClass::Digital,
            },
            PinField {
                field: "STEPPER_PIN2",
                class: PinClass::Digital,
            },
            PinField {
                field: "STEPPER_PIN3",
                class: PinClass::Digital,
            },
            PinField {
                field: "STEPPER_PIN4",
                class: PinClass::Digital,
            },
        ]
    }
}

struct StepperStep;

impl BlockGen for StepperStep {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let name = sanitize_name(field(block, "STEPPER_NAME")?);
        let steps = ctx.value_or(block, "STEPPER_STEPS", Order::Atomic, "0")?;
        Ok(Code::Statement(format!(
            "stepper_{}.step({});",
            name, steps
        )))
    }
}

struct StepperSpeed;

impl BlockGen for StepperSpeed {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let name = sanitize_name(field(block, "STEPPER_NAME")?);
        let rpm = ctx.value_or(block, "STEPPER_SPEED", Order::Atomic, "5")?;
        Ok(Code::Statement(format!(
            "stepper_{}.setSpeed({});",
            name, rpm
        )))
    }
}

struct DhtConfig;

impl BlockGen for DhtConfig {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let dht = sanitize_name(field(block, "NAMEDHT")?);
        let dht_type = field(block, "DHTTYPE")?.to_string();
        let pin = field(block, "PIN")?.to_string();
        ctx.add_variable(&dht, &format!("int {} = {};", dht, pin), true);
        ctx.add_include("dht", "#include <DHT.h>");
        let instance = format!("myDHT{}", dht);
        ctx.add_declaration(
            &format!("dht_{}", instance),
            &format!("DHT {}({}, {});", instance, dht, dht_type),
        );
        ctx.reserve_pin(block, &pin, PinType::Input, "DHT Read");
        ctx.add_setup(
            &format!("dht_{}", instance),
            &format!("{}.begin();", instance),
            true,
        );
        Ok(Code::Statement(String::new()))
    }

    fn pin_fields(&self) -> &'static [PinField] {
        &[PinField {
            field: "PIN",
            class: PinClass::Digital,
        }]
    }
}

struct DhtReadTemp;

impl BlockGen for DhtReadTemp {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let instance = format!("myDHT{}", sanitize_name(field(block, "DHT_NAME")?));
        let stored = format!("{}Temp", instance);
        let raw = format!("{}Temptmp", instance);
        ctx.add_declaration(&raw, &format!("float {} = 200;", raw));
        ctx.add_declaration(&stored, &format!("float {} = 200;", stored));
        // A failed reading returns NaN; the last good value is kept.
        ctx.add_function(
            &stored,
            &format!(
                "float {0}_readT() {{\n  {1} = {0}.readTemperature();\n  if (!isnan({1})) {{\n    {2} = {1};\n  }}\n  return {2};\n}}",
                instance, raw, stored
            ),
        );
        Ok(Code::Value(format!("{}_readT()", instance), Order::Atomic))
    }
}

struct DhtReadHumidity;

impl BlockGen for DhtReadHumidity {
    fn translate(&self, block: &BlockNode, ctx: &mut Session<'_>) -> Result<Code, AssemblyError> {
        let instance = format!("myDHT{}", sanitize_name(field(block, "DHT_NAME")?));
        let stored = format!("{}RH", instance);
        let raw = format!("{}RHtmp", instance);
        ctx.add_declaration(&raw, &format!("float {} = 0.0;", raw));
        ctx.add_declaration(&stored, &format!("float {} = 0.0;", stored));
        ctx.add_function(
            &stored,
            &format!(
                "float {0}_readRH() {{\n  {1} = {0}.readHumidity();\n  if (!isnan({1})) {{\n    {2} = {1};\n  }}\n  return {2};\n}}",
                instance, raw, stored
            ),
        );
        Ok(Code::Value(format!("{}_readRH()", instance), Order::Atomic))
    }
}

/// Registry of every built-in generator, keyed by block kind.
pub fn builtin_registry() -> GenRegistry {
    let mut registry = GenRegistry::new();
    registry.register("io_digitalwrite", Box::new(DigitalWrite));
    registry.register("io_digitalread", Box::new(DigitalRead));
    registry.register("io_builtin_led", Box::new(BuiltinLed));
    registry.register("io_analogwrite", Box::new(AnalogWrite));
    registry.register("io_analogread", Box::new(AnalogRead));
    registry.register("io_highlow", Box::new(HighLow));
    registry.register("io_tone", Box::new(Tone));
    registry.register("io_notone", Box::new(NoTone));
    registry.register("io_toneduration", Box::new(ToneDuration));
    registry.register("time_delay", Box::new(Delay));
    registry.register("time_millis", Box::new(Millis));
    registry.register("controls_if", Box::new(If));
    registry.register("controls_repeat_ext", Box::new(RepeatExt));
    registry.register("logic_compare", Box::new(LogicCompare));
    registry.register("logic_boolean", Box::new(LogicBoolean));
    registry.register("math_number", Box::new(MathNumber));
    registry.register("math_arithmetic", Box::new(MathArithmetic));
    registry.register("text_string", Box::new(TextString));
    registry.register(
        "variables_declare_int",
        Box::new(DeclareVariable {
            c_type: "int",
            default: "0",
        }),
    );
    registry.register(
        "variables_declare_float",
        Box::new(DeclareVariable {
            c_type: "float",
            default: "0",
        }),
    );
    registry.register("variables_get", Box::new(VariableGet));
    registry.register("variables_set", Box::new(VariableSet));
    registry.register("servo_write", Box::new(ServoWrite));
    registry.register("servo_read", Box::new(ServoRead));
    registry.register("serial_setup", Box::new(SerialSetup));
    registry.register("serial_print", Box::new(SerialPrint));
    registry.register("stepper_config", Box::new(StepperConfig));
    registry.register("stepper_step", Box::new(StepperStep));
    registry.register("stepper_speed", Box::new(StepperSpeed));
    registry.register("dht_config_hub", Box::new(DhtConfig));
    registry.register("dht_read_temp", Box::new(DhtReadTemp));
    registry.register("dht_read_rh", Box::new(DhtReadHumidity));
    registry.register("allbot_servo_hub", Box::new(AllbotServoHub));
    registry.register(
        "allbot_chirp",
        Box::new(AllbotMotion {
            function: "chirp",
            args: MotionArgs::BeepsAndSpeed,
        }),
    );
    registry.register(
        "allbot_scared",
        Box::new(AllbotMotion {
            function: "scared",
            args: MotionArgs::ShakesAndBeeps,
        }),
    );
    for (kind, function) in [
        ("allbot_walkforward", "walkforward"),
        ("allbot_walkbackward", "walkbackward"),
        ("allbot_walkleft", "walkleft"),
        ("allbot_walkright", "walkright"),
    ] {
        registry.register(
            kind,
            Box::new(AllbotMotion {
                function,
                args: MotionArgs::StepsAndSpeed,
            }),
        );
    }
    for (kind, function) in [
        ("allbot_lookleft", "lookleft"),
        ("allbot_lookright", "lookright"),
    ] {
        registry.register(
            kind,
            Box::new(AllbotMotion {
                function,
                args: MotionArgs::SpeedOnly,
            }),
        );
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{Assembler, AssemblyOutput};
    use crate::boards::Catalog;
    use crate::workspace::Program;

    fn assemble(source: &str) -> AssemblyOutput {
        let registry = builtin_registry();
        let program = Program::parse_str(source).unwrap();
        let mut catalog = Catalog::builtin();
        Assembler::new(&registry)
            .assemble(&program, &mut catalog)
            .unwrap()
    }

    #[test]
    fn sanitize_name_produces_c_identifiers() {
        assert_eq!(sanitize_name("my led"), "my_led");
        assert_eq!(sanitize_name("2nd pin"), "_2nd_pin");
        assert_eq!(sanitize_name(""), "var");
    }

    #[test]
    fn two_servo_blocks_share_include_and_declaration() {
        let output = assemble(
            r#"
<xml>
  <block type="servo_write" id="s1">
    <field name="SERVO_PIN">9</field>
    <value name="SERVO_ANGLE"><block type="math_number"><field name="NUM">45</field></block></value>
    <next>
      <block type="servo_write" id="s2">
        <field name="SERVO_PIN">9</field>
        <value name="SERVO_ANGLE"><block type="math_number"><field name="NUM">135</field></block></value>
      </block>
    </next>
  </block>
</xml>"#,
        );
        assert_eq!(output.code.matches("#include <Servo.h>").count(), 1);
        assert_eq!(output.code.matches("Servo myServo9;").count(), 1);
        assert_eq!(output.code.matches("myServo9.attach(9);").count(), 1);
        assert!(output.code.contains("myServo9.write(45);"));
        assert!(output.code.contains("myServo9.write(135);"));
        // Same pin, both times through the same block chain: two blocks, so
        // the second servo block conflicts with the first.
        assert_eq!(output.diagnostics.warnings_for("s2").len(), 1);
    }

    #[test]
    fn declare_block_overwrites_set_block_placeholder() {
        let output = assemble(
            r#"
<xml>
  <block type="variables_set" id="v1">
    <field name="VAR">speed</field>
    <value name="VALUE"><block type="math_number"><field name="NUM">3</field></block></value>
    <next>
      <block type="variables_declare_int" id="v2">
        <field name="NAME">speed</field>
        <value name="NUM"><block type="math_number"><field name="NUM">7</field></block></value>
      </block>
    </next>
  </block>
</xml>"#,
        );
        // The declare block is marked overwritable, so its initializer wins,
        // in the slot the set block created first.
        assert!(output.code.contains("int speed = 7;"));
        assert!(!output.code.contains("int speed = 0;"));
        assert!(output.code.contains("speed = 3;"));
    }

    #[test]
    fn if_else_chain_renders_all_branches() {
        let output = assemble(
            r#"
<xml>
  <block type="controls_if" id="i1">
    <value name="IF0">
      <block type="logic_compare">
        <field name="OP">GT</field>
        <value name="A"><block type="io_analogread"><field name="PIN">A0</field></block></value>
        <value name="B"><block type="math_number"><field name="NUM">512</field></block></value>
      </block>
    </value>
    <statement name="DO0">
      <block type="io_digitalwrite">
        <field name="PIN">13</field>
        <value name="STATE"><block type="io_highlow"><field name="STATE">HIGH</field></block></value>
      </block>
    </statement>
    <statement name="ELSE">
      <block type="io_digitalwrite">
        <field name="PIN">13</field>
        <value name="STATE"><block type="io_highlow"><field name="STATE">LOW</field></block></value>
      </block>
    </statement>
  </block>
</xml>"#,
        );
        assert!(output.code.contains("if (analogRead(A0) > 512) {"));
        assert!(output.code.contains("} else {") || output.code.contains("}\n else {") || output.code.contains(" else {"));
        assert!(output.code.contains("  digitalWrite(13, HIGH);"));
        assert!(output.code.contains("  digitalWrite(13, LOW);"));
    }

    #[test]
    fn arithmetic_nesting_parenthesizes_looser_operands() {
        let output = assemble(
            r#"
<xml>
  <block type="variables_set" id="v1">
    <field name="VAR">x</field>
    <value name="VALUE">
      <block type="math_arithmetic">
        <field name="OP">MULTIPLY</field>
        <value name="A">
          <block type="math_arithmetic">
            <field name="OP">ADD</field>
            <value name="A"><block type="math_number"><field name="NUM">1</field></block></value>
            <value name="B"><block type="math_number"><field name="NUM">2</field></block></value>
          </block>
        </value>
        <value name="B"><block type="math_number"><field name="NUM">3</field></block></value>
      </block>
    </value>
  </block>
</xml>"#,
        );
        assert!(output.code.contains("x = (1 + 2) * 3;"));
    }

    #[test]
    fn serial_setup_block_overrides_print_default_speed() {
        let output = assemble(
            r#"
<xml>
  <block type="serial_print" id="p1">
    <value name="CONTENT"><block type="text_string"><field name="TEXT">hello</field></block></value>
    <next>
      <block type="serial_setup" id="c1"><field name="SPEED">115200</field></block>
    </next>
  </block>
</xml>"#,
        );
        assert!(output.code.contains("Serial.begin(115200);"));
        assert!(!output.code.contains("Serial.begin(9600);"));
        assert!(output.code.contains("Serial.println(\"hello\");"));
    }

    #[test]
    fn allbot_hub_emits_attach_setup_and_motor_enum() {
        let registry = builtin_registry();
        let program = Program::parse_str(
            r#"
<xml>
  <block type="allbot_servo_hub" id="h1">
    <field name="MODEL">allbot_vr204_uno</field>
    <field name="NAMESERVO">hipLeft</field>
    <field name="PIN">9</field>
    <next>
      <block type="allbot_walkforward" id="w1">
        <value name="STEPS"><block type="math_number"><field name="NUM">4</field></block></value>
        <value name="SPEED"><block type="math_number"><field name="NUM">100</field></block></value>
      </block>
    </next>
  </block>
</xml>"#,
        )
        .unwrap();
        let mut catalog = Catalog::builtin();
        let output = Assembler::new(&registry)
            .assemble(&program, &mut catalog)
            .unwrap();
        assert!(output.code.contains("#include <ALLBOT.h>"));
        assert!(output.code.contains("ALLBOT BOT(4);"));
        assert!(output.code.contains("enum MotorName {"));
        assert!(output.code.contains("BOT.attach(hipLeft, 9, 90, true, 0);"));
        assert!(output.code.contains("void walkforward(int steps, int speedms) {"));
        assert!(output.code.contains("walkforward(4, 100);"));
        assert!(!output.code.contains(NO_ALLBOT));
    }

    #[test]
    fn allbot_motions_use_speed_socket_and_stock_defaults() {
        let output = assemble(
            r#"
<xml>
  <block type="allbot_servo_hub" id="h1">
    <field name="MODEL">allbot_vr408_uno</field>
    <field name="NAMESERVO">hipFrontLeft</field>
    <field name="PIN">9</field>
    <next>
      <block type="allbot_walkleft" id="w1">
        <value name="STEPS"><block type="math_number"><field name="NUM">2</field></block></value>
        <next>
          <block type="allbot_lookright" id="l1">
            <value name="SPEED"><block type="math_number"><field name="NUM">90</field></block></value>
            <next>
              <block type="allbot_scared" id="s1"/>
            </next>
          </block>
        </next>
      </block>
    </next>
  </block>
</xml>"#,
        );
        // The walk falls back to the stock 200 ms animation speed.
        assert!(output.code.contains("walkleft(2, 200);"));
        assert!(output.code.contains("void walkleft(int steps, int speedms) {"));
        // A wired SPEED socket wins over the default.
        assert!(output.code.contains("lookright(90);"));
        assert!(output.code.contains("void lookright(int speedms) {"));
        // scared(shakes, beeps) with both sockets empty, and it drags chirp in.
        assert!(output.code.contains("scared(10, 3);"));
        assert!(output.code.contains("void scared(int shakes, int beeps) {"));
        assert!(output.code.contains("void chirp(int beeps, int speedms) {"));
        assert!(output.code.contains("int sounderPin = 13;"));
    }

    #[test]
    fn stepper_config_emits_driver_plumbing_and_reserves_its_pins() {
        let output = assemble(
            r#"
<xml>
  <block type="stepper_config" id="sc1">
    <field name="STEPPER_NAME">motor</field>
    <field name="STEPPER_NUMBER_OF_PINS">FOUR</field>
    <field name="STEPPER_PIN1">8</field>
    <field name="STEPPER_PIN2">9</field>
    <field name="STEPPER_PIN3">10</field>
    <field name="STEPPER_PIN4">11</field>
    <value name="STEPPER_STEPS"><block type="math_number"><field name="NUM">200</field></block></value>
    <value name="STEPPER_SPEED"><block type="math_number"><field name="NUM">60</field></block></value>
    <next>
      <block type="stepper_step" id="st1">
        <field name="STEPPER_NAME">motor</field>
        <value name="STEPPER_STEPS"><block type="math_number"><field name="NUM">100</field></block></value>
        <next>
          <block type="io_digitalwrite" id="d1">
            <field name="PIN">11</field>
            <value name="STATE"><block type="io_highlow"><field name="STATE">HIGH</field></block></value>
          </block>
        </next>
      </block>
    </next>
  </block>
</xml>"#,
        );
        assert!(output.code.contains("#include <Stepper.h>"));
        assert!(output.code.contains("int motor[4] = {8, 9, 10, 11};"));
        assert!(output.code.contains("const long stepper_motor_steps = 200;"));
        assert!(output
            .code
            .contains("Stepper stepper_motor(stepper_motor_steps, 8, 9, 10, 11);"));
        assert!(output.code.contains("int stepper_motor_rpm = 60;"));
        assert!(output.code.contains("stepper_motor.setSpeed(stepper_motor_rpm);"));
        assert!(output
            .code
            .contains("unsigned long stepper_motor_Angle2Steps(int angle) {"));
        assert!(output.code.contains("stepper_motor.step(100);"));
        // All four pins are claimed, so the write on pin 11 collides.
        let warnings = output.diagnostics.warnings_for("d1");
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].message,
            "Pin 11 needed for Digital Write is already used as Stepper."
        );
    }

    #[test]
    fn dht_read_goes_through_a_nan_guarded_helper() {
        let output = assemble(
            r#"
<xml>
  <block type="dht_config_hub" id="dh1">
    <field name="NAMEDHT">dht1</field>
    <field name="DHTTYPE">DHT11</field>
    <field name="PIN">2</field>
    <next>
      <block type="variables_set" id="v1">
        <field name="VAR">temp</field>
        <value name="VALUE">
          <block type="dht_read_temp" id="r1"><field name="DHT_NAME">dht1</field></block>
        </value>
      </block>
    </next>
  </block>
</xml>"#,
        );
        assert!(output.code.contains("#include <DHT.h>"));
        assert!(output.code.contains("int dht1 = 2;"));
        assert!(output.code.contains("DHT myDHTdht1(dht1, DHT11);"));
        assert!(output.code.contains("myDHTdht1.begin();"));
        assert!(output.code.contains("float myDHTdht1_readT() {"));
        assert!(output.code.contains("temp = myDHTdht1_readT();"));
    }
}
